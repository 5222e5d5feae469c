// Pipes: processing units wrapping a route's handler with pre/post logic.
//
// A pipe receives the request context and a continuation; it may
// short-circuit by returning without calling the continuation, rewrite the
// result, or reject by returning an error.

use crate::container::{Container, InjectionToken};
use crate::{BoxFuture, Error, HttpContext};
use async_trait::async_trait;
use serde_json::Value;
use std::any::TypeId;
use std::sync::Arc;

/// Token under which application-wide pipes are registered (multi-provider)
pub const GLOBAL_PIPE: InjectionToken = InjectionToken::new("__server__:global-pipe");

/// Continuation invoking the remaining pipes and finally the controller
/// method; resolves to the method result (`None` when the method produced
/// no value)
pub type PipeHandle = Box<dyn FnOnce() -> BoxFuture<Result<Option<Value>, Error>> + Send>;

/// A processing-pipeline unit running before the controller method
#[async_trait]
pub trait ProcessPipe: Send + Sync {
    async fn run(&self, ctx: &HttpContext, handle: PipeHandle) -> Result<Option<Value>, Error>;
}

/// Factory resolving a pipe instance from a DI scope
pub type PipeFactory = Arc<dyn Fn(&Container) -> Result<Arc<dyn ProcessPipe>, Error> + Send + Sync>;

/// A declared pipe binding recorded in controller metadata
#[derive(Clone)]
pub struct PipeRef {
    pub type_id: TypeId,
    pub type_name: &'static str,
    /// Restricts the pipe to one method; `None` covers the whole controller
    pub method: Option<&'static str>,
    pub factory: PipeFactory,
}

impl PipeRef {
    pub fn new<P, F>(factory: F) -> Self
    where
        P: ProcessPipe + 'static,
        F: Fn(&Container) -> Result<P, Error> + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<P>(),
            type_name: std::any::type_name::<P>(),
            method: None,
            factory: Arc::new(move |container| {
                Ok(Arc::new(factory(container)?) as Arc<dyn ProcessPipe>)
            }),
        }
    }

    /// Scope this pipe to a single method
    pub fn for_method(mut self, method: &'static str) -> Self {
        self.method = Some(method);
        self
    }

    /// Whether this pipe applies to the given method
    pub fn applies_to(&self, method: &str) -> bool {
        self.method.is_none() || self.method == Some(method)
    }
}

impl std::fmt::Debug for PipeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeRef")
            .field("type_name", &self.type_name)
            .field("method", &self.method)
            .finish()
    }
}

/// Run `handle` wrapped in `pipes`, first pipe outermost
pub fn run_pipes(
    pipes: Vec<Arc<dyn ProcessPipe>>,
    ctx: HttpContext,
    handle: PipeHandle,
) -> BoxFuture<Result<Option<Value>, Error>> {
    if pipes.is_empty() {
        return handle();
    }

    let first = pipes[0].clone();
    let rest = pipes[1..].to_vec();
    let inner_ctx = ctx.clone();

    Box::pin(async move {
        let next: PipeHandle = Box::new(move || run_pipes(rest, inner_ctx, handle));
        first.run(&ctx, next).await
    })
}
