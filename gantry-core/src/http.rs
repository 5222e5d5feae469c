// HTTP request/response primitives shared by the core and its adapters

use crate::Error;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Boxed future alias used at every dynamic seam in the crate
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// HTTP methods recognized by the route resolver
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
    /// Matches every verb; used by catch-all routes
    ALL,
}

impl HttpMethod {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "HEAD" => Some(HttpMethod::HEAD),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            "ALL" => Some(HttpMethod::ALL),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::ALL => "ALL",
        }
    }

    /// Lowercase form used in method metadata (`"get"`, `"post"`, ...)
    pub fn verb(&self) -> &'static str {
        match self {
            HttpMethod::GET => "get",
            HttpMethod::POST => "post",
            HttpMethod::PUT => "put",
            HttpMethod::DELETE => "delete",
            HttpMethod::PATCH => "patch",
            HttpMethod::HEAD => "head",
            HttpMethod::OPTIONS => "options",
            HttpMethod::ALL => "all",
        }
    }

    /// Whether this method accepts a request of the given verb
    pub fn matches(&self, method: &str) -> bool {
        *self == HttpMethod::ALL || self.as_str().eq_ignore_ascii_case(method)
    }
}

/// HTTP request wrapper handed to route handlers by the adapter
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    /// Raw request payload as received from the wire
    pub raw_body: Vec<u8>,
    /// Payload parsed at the adapter edge; `Null` when the request had no body
    pub body: Value,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            body: Value::Null,
            ..Self::default()
        }
    }

    /// Deserialize the parsed body into a concrete type
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, Error> {
        serde_json::from_value(self.body.clone()).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Get a path parameter by name
    pub fn param(&self, name: &str) -> Option<&String> {
        self.path_params.get(name)
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    /// Get a header by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers.get(&name.to_lowercase())
    }

    /// Get a cookie by name
    pub fn cookie(&self, name: &str) -> Option<&String> {
        self.cookies.get(name)
    }
}

/// Accumulated response state behind a [`ResponseWriter`]
#[derive(Debug, Default)]
pub struct ResponseState {
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub sent: bool,
    /// How many transmissions actually happened; at most one per exchange
    pub send_count: usize,
}

/// Shared, mutable response handle.
///
/// Handlers, middleware and the adapter all hold clones of the same writer;
/// the first transmission wins and every later one is a no-op.
#[derive(Clone, Debug, Default)]
pub struct ResponseWriter {
    state: Arc<Mutex<ResponseState>>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, code: u16) {
        self.state.lock().unwrap().status = code.into();
    }

    pub fn status(&self) -> Option<u16> {
        self.state.lock().unwrap().status
    }

    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .headers
            .push((name.into(), value.into()));
    }

    /// Transmit a body. Returns `false` when a response was already sent.
    pub fn send_bytes(&self, body: Vec<u8>) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.sent {
            return false;
        }
        state.body = body;
        state.sent = true;
        state.send_count += 1;
        true
    }

    /// Transmit a text body. Returns `false` when a response was already sent.
    pub fn send_text(&self, body: impl Into<String>) -> bool {
        self.send_bytes(body.into().into_bytes())
    }

    /// Has a response already been initiated for this exchange
    pub fn is_sent(&self) -> bool {
        self.state.lock().unwrap().sent
    }

    pub fn send_count(&self) -> usize {
        self.state.lock().unwrap().send_count
    }

    pub fn body(&self) -> Vec<u8> {
        self.state.lock().unwrap().body.clone()
    }

    /// Drain the accumulated state; used by the adapter once the exchange ends
    pub fn take(&self) -> ResponseState {
        std::mem::take(&mut *self.state.lock().unwrap())
    }
}

/// Continuation handed to handlers; calling it with an error forwards the
/// error to the adapter's error-handling path
pub type NextFn = Arc<dyn Fn(Option<Error>) + Send + Sync>;

/// Per-request execution context flowing through middleware, pipes and the
/// generated route handler
#[derive(Clone)]
pub struct HttpContext {
    request: Arc<HttpRequest>,
    response: ResponseWriter,
    next: NextFn,
}

impl HttpContext {
    pub fn new(request: Arc<HttpRequest>, response: ResponseWriter, next: NextFn) -> Self {
        Self {
            request,
            response,
            next,
        }
    }

    pub fn request(&self) -> &Arc<HttpRequest> {
        &self.request
    }

    pub fn response(&self) -> &ResponseWriter {
        &self.response
    }

    pub fn next_fn(&self) -> NextFn {
        self.next.clone()
    }

    /// Forward control (or an error) to the adapter's continuation
    pub fn call_next(&self, error: Option<Error>) {
        (self.next)(error)
    }
}

impl std::fmt::Debug for HttpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpContext")
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_round_trip() {
        assert_eq!(HttpMethod::from_str("get"), Some(HttpMethod::GET));
        assert_eq!(HttpMethod::from_str("POST"), Some(HttpMethod::POST));
        assert_eq!(HttpMethod::GET.verb(), "get");
        assert!(HttpMethod::from_str("TRACE").is_none());
    }

    #[test]
    fn test_all_matches_everything() {
        assert!(HttpMethod::ALL.matches("GET"));
        assert!(HttpMethod::ALL.matches("delete"));
        assert!(HttpMethod::GET.matches("get"));
        assert!(!HttpMethod::GET.matches("POST"));
    }

    #[test]
    fn test_response_writer_sends_once() {
        let res = ResponseWriter::new();
        assert!(!res.is_sent());
        assert!(res.send_text("first"));
        assert!(!res.send_text("second"));
        assert!(res.is_sent());
        assert_eq!(res.send_count(), 1);
        assert_eq!(res.body(), b"first".to_vec());
    }

    #[test]
    fn test_request_json() {
        let mut req = HttpRequest::new("POST", "/login");
        req.body = serde_json::json!({ "login": "user" });
        let parsed: serde_json::Value = req.json().unwrap();
        assert_eq!(parsed["login"], "user");
    }
}
