// Recording mock adapter: captures everything the core hands across the
// adapter boundary and drives installed routes in-process.

use async_trait::async_trait;
use gantry_core::{
    reply_with, AdapterRoute, Error, HttpApplicationAdapter, HttpContext, HttpRequest, Middleware,
    MiddlewareChain, ResponseWriter, StaticOptions,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Result of driving one request through the installed route table
pub struct DispatchOutcome {
    /// Whether any route matched
    pub matched: bool,
    pub response: ResponseWriter,
    /// Error forwarded to the adapter's error-handling path, if any
    pub error: Option<Error>,
}

impl DispatchOutcome {
    pub fn status(&self) -> Option<u16> {
        self.response.status().or(if self.response.is_sent() {
            Some(200)
        } else {
            None
        })
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.response.body()).into_owned()
    }

    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.response.body()).ok()
    }
}

/// Mock HTTP application adapter for tests
#[derive(Default)]
pub struct MockAdapter {
    routes: Mutex<Vec<AdapterRoute>>,
    /// Every `routes()` installation, newest last
    installations: Mutex<Vec<Vec<(String, String)>>>,
    replies: Mutex<Vec<(Value, Option<u16>)>>,
    rendered: Mutex<Vec<(String, Value)>>,
    settings: Mutex<HashMap<String, Value>>,
    static_mounts: Mutex<Vec<(String, String)>>,
    globals: Mutex<Vec<Middleware>>,
    closed: Mutex<bool>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(method, url)` pairs of the currently installed table, in order
    pub fn installed_routes(&self) -> Vec<(String, String)> {
        self.routes
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.method.verb().to_string(), r.url.clone()))
            .collect()
    }

    /// How many times `routes()` was called
    pub fn installation_count(&self) -> usize {
        self.installations.lock().unwrap().len()
    }

    /// Messages sent through `reply`, in order
    pub fn replies(&self) -> Vec<(Value, Option<u16>)> {
        self.replies.lock().unwrap().clone()
    }

    pub fn rendered(&self) -> Vec<(String, Value)> {
        self.rendered.lock().unwrap().clone()
    }

    pub fn static_mounts(&self) -> Vec<(String, String)> {
        self.static_mounts.lock().unwrap().clone()
    }

    pub fn setting(&self, name: &str) -> Option<Value> {
        self.settings.lock().unwrap().get(name).cloned()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }

    /// Drive a GET request through the installed table
    pub async fn get(&self, path: &str) -> DispatchOutcome {
        self.dispatch(HttpRequest::new("GET", path)).await
    }

    /// Drive a POST request with a JSON body
    pub async fn post(&self, path: &str, body: Value) -> DispatchOutcome {
        let mut request = HttpRequest::new("POST", path);
        request.body = body;
        self.dispatch(request).await
    }

    /// Drive an arbitrary request through the installed table, honoring
    /// registration order (first match wins) like a real router
    pub async fn dispatch(&self, mut request: HttpRequest) -> DispatchOutcome {
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
            return DispatchOutcome {
                matched: false,
                response,
                error: Some(Error::RouteNotFound(format!(
                    "{} {}",
                    request.method, request.path
                ))),
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

        DispatchOutcome {
            matched: true,
            response,
            error,
        }
    }
}

#[async_trait]
impl HttpApplicationAdapter for MockAdapter {
    fn attach_server(&self, _server: tokio::net::TcpListener) {}

    async fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }

    async fn listen(&self, _port: u16) -> Result<(), Error> {
        Ok(())
    }

    async fn render(&self, template: &str, data: &Value) -> Result<String, Error> {
        self.rendered
            .lock()
            .unwrap()
            .push((template.to_string(), data.clone()));
        Ok(format!("<rendered:{template}>"))
    }

    fn reply(
        &self,
        response: &ResponseWriter,
        message: &Value,
        status: Option<u16>,
    ) -> Result<(), Error> {
        self.replies.lock().unwrap().push((message.clone(), status));
        reply_with(response, message, status)
    }

    fn routes(&self, routes: Vec<AdapterRoute>) {
        self.installations.lock().unwrap().push(
            routes
                .iter()
                .map(|r| (r.method.verb().to_string(), r.url.clone()))
                .collect(),
        );
        *self.routes.lock().unwrap() = routes;
    }

    fn serve_static(&self, prefix: &str, path: &str, _options: Option<StaticOptions>) {
        self.static_mounts
            .lock()
            .unwrap()
            .push((prefix.to_string(), path.to_string()));
    }

    fn set(&self, setting: &str, value: Value) {
        self.settings
            .lock()
            .unwrap()
            .insert(setting.to_string(), value);
    }

    fn use_middleware(&self, middleware: Middleware) {
        self.globals.lock().unwrap().push(middleware);
    }
}

/// Pattern matching mirroring the hyper adapter: `:name` captures one
/// segment, a trailing `*` matches the remainder
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
