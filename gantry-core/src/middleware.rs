// Middleware system for request/response processing

use crate::{BoxFuture, Error, HttpContext, RouteFn};
use std::future::Future;
use std::sync::Arc;

/// Type alias for the next handler in the middleware chain
pub type Next = Box<dyn FnOnce(HttpContext) -> BoxFuture<Result<(), Error>> + Send>;

/// A middleware function.
///
/// Middleware may short-circuit by writing to the response and not calling
/// `next`, or reject by returning an error, which travels the adapter's
/// error-handling path, never the success path.
pub type Middleware = Arc<dyn Fn(HttpContext, Next) -> BoxFuture<Result<(), Error>> + Send + Sync>;

/// Wrap an async function as a [`Middleware`]
pub fn middleware<F, Fut>(f: F) -> Middleware
where
    F: Fn(HttpContext, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Arc::new(move |ctx, next| Box::pin(f(ctx, next)))
}

/// Middleware chain executor.
///
/// Runs each middleware in list order; the terminal handler executes only
/// when every middleware called its continuation.
#[derive(Clone)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Middleware>>,
}

impl MiddlewareChain {
    pub fn new(middlewares: Vec<Middleware>) -> Self {
        Self {
            middlewares: Arc::new(middlewares),
        }
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Execute the middleware chain with a terminal handler
    pub fn apply(&self, ctx: HttpContext, handler: RouteFn) -> BoxFuture<Result<(), Error>> {
        tracing::trace!(
            middleware_count = self.middlewares.len(),
            path = %ctx.request().path,
            "executing middleware chain"
        );
        self.execute_from(0, ctx, handler)
    }

    fn execute_from(
        &self,
        index: usize,
        ctx: HttpContext,
        handler: RouteFn,
    ) -> BoxFuture<Result<(), Error>> {
        if index >= self.middlewares.len() {
            return handler(ctx);
        }

        let middleware = self.middlewares[index].clone();
        let chain = self.clone();

        Box::pin(async move {
            let next: Next =
                Box::new(move |ctx| chain.execute_from(index + 1, ctx, handler.clone()));
            middleware(ctx, next).await
        })
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HttpRequest, ResponseWriter};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn test_context() -> HttpContext {
        HttpContext::new(
            Arc::new(HttpRequest::new("GET", "/test")),
            ResponseWriter::new(),
            Arc::new(|_| {}),
        )
    }

    fn terminal(counter: Arc<AtomicUsize>) -> RouteFn {
        Arc::new(move |_ctx| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_empty_chain_calls_handler() {
        let called = Arc::new(AtomicUsize::new(0));
        let chain = MiddlewareChain::default();
        chain.apply(test_context(), terminal(called.clone())).await.unwrap();
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_chain_runs_in_list_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let mw = |tag: &'static str, order: Arc<Mutex<Vec<&'static str>>>| {
            middleware(move |ctx, next: Next| {
                let order = order.clone();
                async move {
                    order.lock().unwrap().push(tag);
                    next(ctx).await
                }
            })
        };

        let chain = MiddlewareChain::new(vec![
            mw("first", order.clone()),
            mw("second", order.clone()),
        ]);

        let called = Arc::new(AtomicUsize::new(0));
        chain.apply(test_context(), terminal(called.clone())).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let deny = middleware(|ctx: HttpContext, _next: Next| async move {
            ctx.response().send_text("ACCESS DENIED");
            Ok(())
        });

        let chain = MiddlewareChain::new(vec![deny]);
        let called = Arc::new(AtomicUsize::new(0));
        let ctx = test_context();
        chain.apply(ctx.clone(), terminal(called.clone())).await.unwrap();

        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.response().body(), b"ACCESS DENIED".to_vec());
    }

    #[tokio::test]
    async fn test_error_propagates() {
        let reject = middleware(|_ctx: HttpContext, _next: Next| async move {
            Err(Error::Unauthorized("unauthorized".into()))
        });

        let chain = MiddlewareChain::new(vec![reject]);
        let called = Arc::new(AtomicUsize::new(0));
        let result = chain.apply(test_context(), terminal(called.clone())).await;

        assert!(matches!(result, Err(Error::Unauthorized(_))));
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }
}
