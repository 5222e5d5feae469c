// Hyper-backed implementation of the HTTP application adapter.
//
// Owns everything server-specific: the tokio accept loop, conversion
// between hyper types and the framework's request/response wrappers,
// registration-order route matching, static file serving, template
// rendering, and the error-handling tail that turns forwarded errors into
// JSON error responses.

use crate::adapter::{AdapterRoute, HttpApplicationAdapter, StaticOptions};
use crate::logging::{debug, error, info, trace};
use crate::middleware::{Middleware, MiddlewareChain};
use crate::{Error, HttpContext, HttpRequest, ResponseWriter};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming as IncomingBody;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::net::TcpListener;
use tokio::sync::Notify;

#[derive(Clone)]
struct StaticMount {
    prefix: String,
    dir: PathBuf,
    options: StaticOptions,
}

struct Inner {
    routes: RwLock<Vec<AdapterRoute>>,
    globals: RwLock<Vec<Middleware>>,
    settings: RwLock<HashMap<String, Value>>,
    statics: RwLock<Vec<StaticMount>>,
    attached: Mutex<Option<TcpListener>>,
    shutdown: Notify,
    listening: AtomicBool,
}

/// Adapter over hyper 1.x + tokio
#[derive(Clone)]
pub struct HyperAdapter {
    inner: Arc<Inner>,
}

impl Default for HyperAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperAdapter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                routes: RwLock::new(Vec::new()),
                globals: RwLock::new(Vec::new()),
                settings: RwLock::new(HashMap::new()),
                statics: RwLock::new(Vec::new()),
                attached: Mutex::new(None),
                shutdown: Notify::new(),
                listening: AtomicBool::new(false),
            }),
        }
    }

    /// Whether the accept loop is currently running
    pub fn is_listening(&self) -> bool {
        self.inner.listening.load(Ordering::SeqCst)
    }

    /// Installed route count (diagnostics)
    pub fn route_count(&self) -> usize {
        self.inner.routes.read().unwrap().len()
    }
}

#[async_trait]
impl HttpApplicationAdapter for HyperAdapter {
    fn attach_server(&self, server: TcpListener) {
        *self.inner.attached.lock().unwrap() = Some(server);
    }

    async fn close(&self) {
        if self.inner.listening.swap(false, Ordering::SeqCst) {
            self.inner.shutdown.notify_waiters();
        }
    }

    async fn listen(&self, port: u16) -> Result<(), Error> {
        let listener = match self.inner.attached.lock().unwrap().take() {
            Some(listener) => listener,
            None => {
                let addr = SocketAddr::from(([0, 0, 0, 0], port));
                // Bind synchronously relative to this call so errors fail listen
                let std_listener = std::net::TcpListener::bind(addr)?;
                std_listener.set_nonblocking(true)?;
                TcpListener::from_std(std_listener)?
            }
        };

        info!(addr = %listener.local_addr()?, "Server listening");
        self.inner.listening.store(true, Ordering::SeqCst);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    let io = TokioIo::new(stream);
                    let inner = self.inner.clone();

                    tokio::spawn(async move {
                        let service = service_fn(move |req: Request<IncomingBody>| {
                            let inner = inner.clone();
                            async move { handle_request(inner, req).await }
                        });

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                            error!(error = %err, "Error serving connection");
                        }
                    });
                }
                _ = self.inner.shutdown.notified() => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        self.inner.listening.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn render(&self, template: &str, data: &Value) -> Result<String, Error> {
        let views = self
            .inner
            .settings
            .read()
            .unwrap()
            .get("views")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "views".to_string());

        let path = PathBuf::from(views).join(template);
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::Template(format!("{}: {e}", path.display())))?;

        let env = minijinja::Environment::new();
        env.render_str(&source, minijinja::Value::from_serialize(data))
            .map_err(|e| Error::Template(e.to_string()))
    }

    fn routes(&self, routes: Vec<AdapterRoute>) {
        debug!(route_count = routes.len(), "Route table installed");
        *self.inner.routes.write().unwrap() = routes;
    }

    fn serve_static(&self, prefix: &str, path: &str, options: Option<StaticOptions>) {
        self.inner.statics.write().unwrap().push(StaticMount {
            prefix: normalize_prefix(prefix),
            dir: PathBuf::from(path),
            options: options.unwrap_or_default(),
        });
    }

    fn set(&self, setting: &str, value: Value) {
        self.inner
            .settings
            .write()
            .unwrap()
            .insert(setting.to_string(), value);
    }

    fn use_middleware(&self, middleware: Middleware) {
        self.inner.globals.write().unwrap().push(middleware);
    }
}

async fn handle_request(
    inner: Arc<Inner>,
    req: Request<IncomingBody>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let request = match build_request(req).await {
        Ok(request) => request,
        Err(err) => return Ok(error_response(&err)),
    };

    trace!(method = %request.method, path = %request.path, "Incoming request");

    // Static mounts take precedence; a miss falls through to the routes
    if request.method == "GET" || request.method == "HEAD" {
        let mounts = inner.statics.read().unwrap().clone();
        for mount in mounts {
            if let Some(response) = try_serve_static(&mount, &request.path).await {
                return Ok(response);
            }
        }
    }

    // First registered match wins; the resolver ordered the table so that
    // exact routes precede wildcards and specific wildcards precede
    // generic ones
    let matched = {
        let routes = inner.routes.read().unwrap();
        routes.iter().find_map(|route| {
            if !route.method.matches(&request.method) {
                return None;
            }
            match_path(&route.url, &request.path).map(|params| (route.clone(), params))
        })
    };

    let Some((route, path_params)) = matched else {
        return Ok(error_response(&Error::RouteNotFound(format!(
            "{} {}",
            request.method, request.path
        ))));
    };

    let mut request = request;
    request.path_params = path_params;

    let forwarded: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));
    let slot = forwarded.clone();
    let response = ResponseWriter::new();
    let ctx = HttpContext::new(
        Arc::new(request),
        response.clone(),
        Arc::new(move |err| {
            if let Some(err) = err {
                *slot.lock().unwrap() = Some(err);
            }
        }),
    );

    // Adapter-level middleware runs ahead of every route
    let globals = inner.globals.read().unwrap().clone();
    let outcome = if globals.is_empty() {
        (route.handler)(ctx.clone()).await
    } else {
        MiddlewareChain::new(globals)
            .apply(ctx.clone(), route.handler.clone())
            .await
    };

    if let Err(err) = outcome {
        return Ok(error_response(&err));
    }
    if let Some(err) = forwarded.lock().unwrap().take() {
        return Ok(error_response(&err));
    }

    let state = response.take();
    let status = state.status.unwrap_or(200);
    let mut builder = Response::builder().status(status);
    for (name, value) in state.headers {
        builder = builder.header(name, value);
    }

    Ok(builder
        .body(Full::new(Bytes::from(state.body)))
        .unwrap_or_else(|_| error_response(&Error::Internal("invalid response".into()))))
}

/// Convert a hyper request into the framework request wrapper
async fn build_request(req: Request<IncomingBody>) -> Result<HttpRequest, Error> {
    let method = req.method().to_string();
    let uri_path = req.uri().path().to_string();
    let query_string = req.uri().query().map(str::to_string);

    let mut request = HttpRequest::new(method, uri_path);

    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            request
                .headers
                .insert(name.as_str().to_lowercase(), value.to_string());
        }
    }

    if let Some(cookie_header) = request.headers.get("cookie").cloned() {
        request.cookies = parse_cookies(&cookie_header);
    }

    if let Some(query) = query_string {
        request.query_params = parse_query_string(&query);
    }

    let body_bytes = req
        .collect()
        .await
        .map_err(|e| Error::Http(e.to_string()))?
        .to_bytes();
    request.raw_body = body_bytes.to_vec();

    // JSON payloads are parsed at the edge; anything else stays raw
    let is_json = request
        .headers
        .get("content-type")
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);
    if is_json && !request.raw_body.is_empty() {
        request.body = serde_json::from_slice(&request.raw_body)
            .map_err(|e| Error::Deserialization(e.to_string()))?;
    }

    Ok(request)
}

/// Match a route pattern against a request path.
///
/// `:name` segments capture one path segment; a trailing `*` matches the
/// remainder (including nothing).
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

/// Parse a query string into a map of decoded parameters
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let mut split = part.splitn(2, '=');
            let key = split.next()?;
            let value = split.next().unwrap_or("");
            Some((decode(key), decode(value)))
        })
        .collect()
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

async fn try_serve_static(mount: &StaticMount, path: &str) -> Option<Response<Full<Bytes>>> {
    let rest = path.strip_prefix(&mount.prefix)?.trim_start_matches('/');

    // Reject traversal outside the mount
    if rest.split('/').any(|segment| segment == "..") {
        return None;
    }

    let mut file_path = mount.dir.join(rest);
    if rest.is_empty() {
        let index = mount
            .options
            .index_file
            .clone()
            .unwrap_or_else(|| "index.html".to_string());
        file_path = mount.dir.join(index);
    }

    let contents = tokio::fs::read(&file_path).await.ok()?;

    let mut builder = Response::builder()
        .status(200)
        .header("Content-Type", mime_type(&file_path));
    if let Some(cache_control) = &mount.options.cache_control {
        builder = builder.header("Cache-Control", cache_control.clone());
    }

    builder.body(Full::new(Bytes::from(contents))).ok()
}

fn mime_type(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Terminal error handling: forwarded and thrown errors become JSON error
/// responses, status taken from the error taxonomy
fn error_response(err: &Error) -> Response<Full<Bytes>> {
    let status = err.status_code();
    let body = serde_json::json!({
        "error": err.to_string(),
        "status": status,
    });

    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(bytes)))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_path_static() {
        assert!(match_path("/users", "/users").is_some());
        assert!(match_path("/users", "/posts").is_none());
        assert!(match_path("/", "/").is_some());
    }

    #[test]
    fn test_match_path_params() {
        let params = match_path("/users/:id/posts/:post_id", "/users/7/posts/42").unwrap();
        assert_eq!(params.get("id"), Some(&"7".to_string()));
        assert_eq!(params.get("post_id"), Some(&"42".to_string()));
    }

    #[test]
    fn test_match_path_length_mismatch() {
        assert!(match_path("/users/:id", "/users").is_none());
        assert!(match_path("/users", "/users/7").is_none());
    }

    #[test]
    fn test_match_path_wildcard() {
        assert!(match_path("/*", "/anything/at/all").is_some());
        assert!(match_path("/*", "/").is_some());
        assert!(match_path("/api/*", "/api/v2/users").is_some());
        assert!(match_path("/api/*", "/other").is_none());
    }

    #[test]
    fn test_wildcard_captures_prefix_params() {
        let params = match_path("/files/:bucket/*", "/files/media/a/b.png").unwrap();
        assert_eq!(params.get("bucket"), Some(&"media".to_string()));
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("name=john%20doe&age=30&flag");
        assert_eq!(params.get("name"), Some(&"john doe".to_string()));
        assert_eq!(params.get("age"), Some(&"30".to_string()));
        assert_eq!(params.get("flag"), Some(&"".to_string()));
    }

    #[test]
    fn test_parse_cookies() {
        let cookies = parse_cookies("session=abc123; theme=dark");
        assert_eq!(cookies.get("session"), Some(&"abc123".to_string()));
        assert_eq!(cookies.get("theme"), Some(&"dark".to_string()));
    }

    #[test]
    fn test_error_response_shape() {
        let response = error_response(&Error::RouteNotFound("GET /missing".into()));
        assert_eq!(response.status(), 404);
    }

    #[test]
    fn test_routes_install_replaces_table() {
        let adapter = HyperAdapter::new();
        assert_eq!(adapter.route_count(), 0);

        let route = AdapterRoute {
            handler: Arc::new(|_ctx| Box::pin(async { Ok(()) })),
            method: crate::HttpMethod::GET,
            url: "/health".into(),
        };
        adapter.routes(vec![route.clone(), route]);
        assert_eq!(adapter.route_count(), 2);
    }
}
