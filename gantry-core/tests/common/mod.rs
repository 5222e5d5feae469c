// Shared test support: a recording adapter that captures the installed
// route table and drives requests through it in-process.
#![allow(dead_code)]

use async_trait::async_trait;
use gantry_core::{
    AdapterRoute, Error, HttpApplicationAdapter, HttpContext, HttpRequest, Middleware,
    MiddlewareChain, ResponseWriter, StaticOptions,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct Dispatched {
    pub matched: bool,
    pub response: ResponseWriter,
    pub error: Option<Error>,
}

impl Dispatched {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.response.body()).into_owned()
    }

    pub fn body_json(&self) -> Value {
        serde_json::from_slice(&self.response.body()).unwrap_or(Value::Null)
    }
}

#[derive(Default)]
pub struct RecordingAdapter {
    routes: Mutex<Vec<AdapterRoute>>,
    installations: Mutex<usize>,
    globals: Mutex<Vec<Middleware>>,
}

impl RecordingAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn installed(&self) -> Vec<(String, String)> {
        self.routes
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.method.verb().to_string(), r.url.clone()))
            .collect()
    }

    pub fn installation_count(&self) -> usize {
        *self.installations.lock().unwrap()
    }

    pub async fn get(&self, path: &str) -> Dispatched {
        self.dispatch(HttpRequest::new("GET", path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Dispatched {
        let mut request = HttpRequest::new("POST", path);
        request.body = body;
        self.dispatch(request).await
    }

    pub async fn dispatch(&self, mut request: HttpRequest) -> Dispatched {
        let matched = {
            let routes = self.routes.lock().unwrap();
            routes.iter().find_map(|route| {
                if !route.method.matches(&request.method) {
                    return None;
                }
                match_path(&route.url, &request.path).map(|params| (route.clone(), params))
            })
        };

        let response = ResponseWriter::new();
        let Some((route, params)) = matched else {
            return Dispatched {
                matched: false,
                response,
                error: None,
            };
        };

        request.path_params = params;

        let forwarded: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));
        let slot = forwarded.clone();
        let ctx = HttpContext::new(
            Arc::new(request),
            response.clone(),
            Arc::new(move |err| {
                if let Some(err) = err {
                    *slot.lock().unwrap() = Some(err);
                }
            }),
        );

        let globals = self.globals.lock().unwrap().clone();
        let outcome = if globals.is_empty() {
            (route.handler)(ctx.clone()).await
        } else {
            MiddlewareChain::new(globals)
                .apply(ctx.clone(), route.handler.clone())
                .await
        };

        let error = match outcome {
            Err(err) => Some(err),
            Ok(()) => forwarded.lock().unwrap().take(),
        };

        Dispatched {
            matched: true,
            response,
            error,
        }
    }
}

#[async_trait]
impl HttpApplicationAdapter for RecordingAdapter {
    fn attach_server(&self, _server: tokio::net::TcpListener) {}

    async fn close(&self) {}

    async fn listen(&self, _port: u16) -> Result<(), Error> {
        Ok(())
    }

    async fn render(&self, template: &str, _data: &Value) -> Result<String, Error> {
        Ok(format!("<rendered:{template}>"))
    }

    fn routes(&self, routes: Vec<AdapterRoute>) {
        *self.installations.lock().unwrap() += 1;
        *self.routes.lock().unwrap() = routes;
    }

    fn serve_static(&self, _prefix: &str, _path: &str, _options: Option<StaticOptions>) {}

    fn set(&self, _setting: &str, _value: Value) {}

    fn use_middleware(&self, middleware: Middleware) {
        self.globals.lock().unwrap().push(middleware);
    }
}

fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut params = HashMap::new();

    for (i, pattern_part) in pattern_parts.iter().enumerate() {
        if *pattern_part == "*" {
            return Some(params);
        }

        let Some(path_part) = path_parts.get(i) else {
            return None;
        };

        if let Some(param_name) = pattern_part.strip_prefix(':') {
            params.insert(param_name.to_string(), path_part.to_string());
        } else if pattern_part != path_part {
            return None;
        }
    }

    if pattern_parts.len() == path_parts.len() {
        Some(params)
    } else {
        None
    }
}
