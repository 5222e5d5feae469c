// Route handler factory: builds the per-route invocation closure.
//
// At request time the closure extracts the declared parameters, runs the
// pipe chain around the controller method, and maps the result into a
// response. Errors, whether synchronous or from awaited futures, are forwarded
// to the adapter's error-handling path, never the success path.

use crate::adapter::{HttpApplicationAdapter, ParamValue, RouteFn};
use crate::metadata::{MethodAction, ParamMetadata};
use crate::pipe::{run_pipes, PipeHandle, ProcessPipe};
use crate::{Error, HttpContext};
use serde_json::{Map, Value};
use std::any::Any;
use std::sync::Arc;

#[derive(Clone)]
pub struct RouteHandler {
    adapter: Arc<dyn HttpApplicationAdapter>,
}

impl RouteHandler {
    pub fn new(adapter: Arc<dyn HttpApplicationAdapter>) -> Self {
        Self { adapter }
    }

    /// Build the request closure for one resolved route
    pub fn create_handler(
        &self,
        controller: Arc<dyn Any + Send + Sync>,
        action: MethodAction,
        params: Vec<ParamMetadata>,
        pipes: Vec<Arc<dyn ProcessPipe>>,
        status: Option<u16>,
        template: Option<String>,
    ) -> RouteFn {
        let adapter = self.adapter.clone();

        let mut params = params;
        params.sort_by_key(|p| p.index);
        let params = Arc::new(params);
        let pipes = Arc::new(pipes);

        Arc::new(move |ctx: HttpContext| {
            let adapter = adapter.clone();
            let controller = controller.clone();
            let action = action.clone();
            let params = params.clone();
            let pipes = pipes.clone();
            let template = template.clone();

            Box::pin(async move {
                let outcome = invoke(
                    adapter.as_ref(),
                    controller,
                    action,
                    &params,
                    (*pipes).clone(),
                    status,
                    template,
                    &ctx,
                )
                .await;

                // Failures travel the error path, never the success path
                if let Err(error) = outcome {
                    ctx.call_next(Some(error));
                }
                Ok(())
            })
        })
    }
}

impl std::fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RouteHandler")
    }
}

#[allow(clippy::too_many_arguments)]
async fn invoke(
    adapter: &dyn HttpApplicationAdapter,
    controller: Arc<dyn Any + Send + Sync>,
    action: MethodAction,
    params: &[ParamMetadata],
    pipes: Vec<Arc<dyn ProcessPipe>>,
    status: Option<u16>,
    template: Option<String>,
    ctx: &HttpContext,
) -> Result<(), Error> {
    // Parameter extraction happens before the method is invoked, in
    // declaration-index order
    let mut args = Vec::with_capacity(params.len());
    for param in params {
        let value = if let Some(factory) = &param.factory {
            ParamValue::Value(Some(factory(ctx).await?))
        } else if let Some(kind) = param.param_type {
            adapter.get_param(kind, param.param_name.as_deref(), ctx)()
        } else {
            ParamValue::Value(None)
        };

        if let Some(validator) = &param.param_validator {
            if let ParamValue::Value(Some(extracted)) = &value {
                validator(extracted)?;
            }
        }

        args.push(value);
    }

    // Pipes wrap the method invocation, first pipe outermost
    let handle: PipeHandle = Box::new(move || action(controller, args));
    let result = run_pipes(pipes, ctx.clone(), handle).await?;

    if let Some(template) = &template {
        // A declared template always renders; a method that produced no
        // value renders with an empty model
        let model = result.unwrap_or_else(|| Value::Object(Map::new()));
        let html = adapter.render(template, &model).await?;
        if !adapter.is_headers_sent(ctx.response()) {
            adapter.reply(ctx.response(), &Value::String(html), status)?;
        }
    } else if let Some(value) = result {
        if !adapter.is_headers_sent(ctx.response()) {
            adapter.reply(ctx.response(), &value, status)?;
        }
    }
    // A `None` result means the handler wrote the response itself; no
    // automatic response is sent

    Ok(())
}
