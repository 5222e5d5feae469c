// The seam between the core and a concrete web server library.
//
// The route resolver and the route handler factory only ever talk to this
// capability interface; everything server-specific lives behind it.

use crate::middleware::Middleware;
use crate::{BoxFuture, Error, HttpContext, HttpMethod, HttpRequest, NextFn, ResponseWriter};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// The closed set of parameter extraction kinds.
///
/// This enumeration is part of the wire-level contract; every match over it
/// is exhaustive on purpose: adding a kind must be a deliberate, visible
/// change at every extraction site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Body,
    Cookie,
    Header,
    Path,
    Query,
    Request,
    Response,
    Next,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::Body => "body",
            ParameterKind::Cookie => "cookie",
            ParameterKind::Header => "header",
            ParameterKind::Path => "path",
            ParameterKind::Query => "query",
            ParameterKind::Request => "request",
            ParameterKind::Response => "response",
            ParameterKind::Next => "next",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "body" => Some(ParameterKind::Body),
            "cookie" => Some(ParameterKind::Cookie),
            "header" => Some(ParameterKind::Header),
            "path" => Some(ParameterKind::Path),
            "query" => Some(ParameterKind::Query),
            "request" => Some(ParameterKind::Request),
            "response" => Some(ParameterKind::Response),
            "next" => Some(ParameterKind::Next),
            _ => None,
        }
    }
}

/// A value produced for one declared controller-method parameter
pub enum ParamValue {
    /// An extracted (or absent) data value: body, cookie, header, path,
    /// query, or a custom factory result
    Value(Option<Value>),
    /// The live request object
    Request(Arc<HttpRequest>),
    /// The live response writer
    Response(ResponseWriter),
    /// The continuation callback
    Next(NextFn),
}

impl ParamValue {
    /// The extracted data value, if this is a data parameter
    pub fn into_value(self) -> Option<Value> {
        match self {
            ParamValue::Value(v) => v,
            _ => None,
        }
    }

    /// Borrowing variant of [`ParamValue::into_value`]
    pub fn clone_value(&self) -> Option<Value> {
        match self {
            ParamValue::Value(v) => v.clone(),
            _ => None,
        }
    }

    pub fn as_request(&self) -> Option<&Arc<HttpRequest>> {
        match self {
            ParamValue::Request(req) => Some(req),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&ResponseWriter> {
        match self {
            ParamValue::Response(res) => Some(res),
            _ => None,
        }
    }

    pub fn as_next(&self) -> Option<&NextFn> {
        match self {
            ParamValue::Next(next) => Some(next),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ParamValue::Request(_) => f.write_str("Request"),
            ParamValue::Response(_) => f.write_str("Response"),
            ParamValue::Next(_) => f.write_str("Next"),
        }
    }
}

/// Zero-argument accessor producing the value for one declared parameter
pub type ParamLocator = Box<dyn FnOnce() -> ParamValue + Send>;

/// Handler closure compatible with the adapter boundary.
///
/// Errors never escape through the returned future; they are forwarded to
/// the adapter's error-handling path via the context's `next` continuation.
pub type RouteFn = Arc<dyn Fn(HttpContext) -> BoxFuture<Result<(), Error>> + Send + Sync>;

/// The final, immutable unit handed to the adapter, and the only route
/// representation the server boundary understands
#[derive(Clone)]
pub struct AdapterRoute {
    pub handler: RouteFn,
    pub method: HttpMethod,
    pub url: String,
}

impl std::fmt::Debug for AdapterRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRoute")
            .field("method", &self.method)
            .field("url", &self.url)
            .finish()
    }
}

/// Options for static file mounts
#[derive(Clone, Debug, Default)]
pub struct StaticOptions {
    /// File served when a directory is requested
    pub index_file: Option<String>,
    /// Value for the `Cache-Control` header
    pub cache_control: Option<String>,
}

/// Capability interface over the underlying web server library.
///
/// `get_param`, `is_headers_sent` and `reply` have default implementations
/// in terms of the adapter-agnostic request/response types; adapters with
/// richer native representations may override them.
#[async_trait]
pub trait HttpApplicationAdapter: Send + Sync {
    /// Bind to an already-created network listener
    fn attach_server(&self, server: tokio::net::TcpListener);

    /// Stop accepting connections if currently listening
    async fn close(&self);

    /// Return a zero-argument accessor producing the value for one
    /// extraction kind. When `name` is absent the whole namespace is
    /// produced (e.g. the entire query object) rather than one field.
    fn get_param(
        &self,
        kind: ParameterKind,
        name: Option<&str>,
        ctx: &HttpContext,
    ) -> ParamLocator {
        extract_param(kind, name, ctx)
    }

    /// Has a response already been initiated for this exchange
    fn is_headers_sent(&self, response: &ResponseWriter) -> bool {
        response.is_sent()
    }

    /// Begin serving. Runs until `close` is called.
    async fn listen(&self, port: u16) -> Result<(), Error>;

    /// Render a template to markup
    async fn render(&self, template: &str, data: &Value) -> Result<String, Error>;

    /// Send `message`, applying `status` first if provided and choosing a
    /// JSON content type when the message is structured data
    fn reply(
        &self,
        response: &ResponseWriter,
        message: &Value,
        status: Option<u16>,
    ) -> Result<(), Error> {
        reply_with(response, message, status)
    }

    /// Install a finalized, ordered route table in one call
    fn routes(&self, routes: Vec<AdapterRoute>);

    /// Mount a static file tree under a url prefix
    fn serve_static(&self, prefix: &str, path: &str, options: Option<StaticOptions>);

    /// Passthrough configuration to the underlying server
    fn set(&self, setting: &str, value: Value);

    /// Register middleware ahead of every route
    fn use_middleware(&self, middleware: Middleware);
}

/// Default parameter extraction over the adapter-agnostic context.
///
/// Absent optional fields resolve to `None`; extraction itself never fails.
pub fn extract_param(kind: ParameterKind, name: Option<&str>, ctx: &HttpContext) -> ParamLocator {
    let request = ctx.request().clone();
    let name = name.map(str::to_string);

    match kind {
        ParameterKind::Body => Box::new(move || {
            ParamValue::Value(match name {
                Some(field) => request.body.get(&field).cloned(),
                None => match &request.body {
                    Value::Null => None,
                    body => Some(body.clone()),
                },
            })
        }),
        ParameterKind::Cookie => Box::new(move || {
            ParamValue::Value(pluck_string_map(&request.cookies, name.as_deref()))
        }),
        ParameterKind::Header => Box::new(move || {
            let name = name.map(|n| n.to_lowercase());
            ParamValue::Value(pluck_string_map(&request.headers, name.as_deref()))
        }),
        ParameterKind::Path => Box::new(move || {
            ParamValue::Value(pluck_string_map(&request.path_params, name.as_deref()))
        }),
        ParameterKind::Query => Box::new(move || {
            ParamValue::Value(pluck_string_map(&request.query_params, name.as_deref()))
        }),
        ParameterKind::Request => Box::new(move || ParamValue::Request(request)),
        ParameterKind::Response => {
            let response = ctx.response().clone();
            Box::new(move || ParamValue::Response(response))
        }
        ParameterKind::Next => {
            let next = ctx.next_fn();
            Box::new(move || ParamValue::Next(next))
        }
    }
}

/// One field of a string map, or the whole map when no name was given
fn pluck_string_map(map: &HashMap<String, String>, name: Option<&str>) -> Option<Value> {
    match name {
        Some(key) => map.get(key).map(|v| Value::String(v.clone())),
        None => Some(Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )),
    }
}

/// Shared reply behavior: status first, content type by payload shape,
/// at most one transmission per exchange
pub fn reply_with(
    response: &ResponseWriter,
    message: &Value,
    status: Option<u16>,
) -> Result<(), Error> {
    if let Some(code) = status {
        response.set_status(code);
    }

    if response.is_sent() {
        return Ok(());
    }

    match message {
        Value::Object(_) | Value::Array(_) => {
            response.set_header("Content-Type", "application/json");
            response.send_bytes(serde_json::to_vec(message)?);
        }
        Value::String(text) => {
            response.set_header("Content-Type", "text/html; charset=utf-8");
            response.send_text(text.clone());
        }
        other => {
            response.set_header("Content-Type", "text/html; charset=utf-8");
            response.send_text(other.to_string());
        }
    }

    Ok(())
}
