// Registration layer: the decorator families expressed as explicit
// registration calls against the metadata store.
//
// Four families mirror the class / method / parameter / middleware
// decorators of metadata-driven frameworks: controller registration merges
// into the class record, route registration appends method entries,
// parameter registration renumbers call indices, middleware registration
// prepends into the per-method bucket. Registration order across families
// does not matter; every call works against the same shared records.

use crate::adapter::{ParamValue, ParameterKind};
use crate::metadata::{
    keys, ControllerMetadata, ControllerOptions, MetadataStore, MetadataTarget, MethodAction,
    MethodMetadata, MiddlewareMap, ParamFactory, ParamMetadata, ParamValidator, SOURCE_HTTP,
};
use crate::middleware::Middleware;
use crate::module::ModuleDefinition;
use crate::pipe::PipeRef;
use crate::{BoxFuture, Error, HttpContext, HttpMethod};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Class-level registration payload
#[derive(Default)]
pub struct ControllerSpec {
    url: Option<String>,
    middleware: Vec<Middleware>,
    options: Option<ControllerOptions>,
}

impl ControllerSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn middleware(mut self, middleware: Vec<Middleware>) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn options(mut self, options: ControllerOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Method-level registration payload: one (verb, url) route bound to a
/// controller method
pub struct RouteSpec {
    method_name: &'static str,
    verb: String,
    url: String,
    status: Option<u16>,
    return_type: Option<&'static str>,
    action: MethodAction,
}

impl RouteSpec {
    /// New route for `method_name`; defaults to `GET /`
    pub fn new(method_name: &'static str, action: MethodAction) -> Self {
        Self {
            method_name,
            verb: HttpMethod::GET.verb().to_string(),
            url: "/".to_string(),
            status: None,
            return_type: None,
            action,
        }
    }

    pub fn verb(mut self, verb: HttpMethod) -> Self {
        self.verb = verb.verb().to_string();
        self
    }

    /// Raw verb tag for non-HTTP route sources; entries whose tag is not a
    /// recognized HTTP verb are skipped by the route resolver
    pub fn verb_tag(mut self, tag: impl Into<String>) -> Self {
        self.verb = tag.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn get(self, url: impl Into<String>) -> Self {
        self.verb(HttpMethod::GET).url(url)
    }

    pub fn post(self, url: impl Into<String>) -> Self {
        self.verb(HttpMethod::POST).url(url)
    }

    pub fn put(self, url: impl Into<String>) -> Self {
        self.verb(HttpMethod::PUT).url(url)
    }

    pub fn delete(self, url: impl Into<String>) -> Self {
        self.verb(HttpMethod::DELETE).url(url)
    }

    pub fn patch(self, url: impl Into<String>) -> Self {
        self.verb(HttpMethod::PATCH).url(url)
    }

    pub fn options_verb(self, url: impl Into<String>) -> Self {
        self.verb(HttpMethod::OPTIONS).url(url)
    }

    pub fn all(self, url: impl Into<String>) -> Self {
        self.verb(HttpMethod::ALL).url(url)
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Record the method's declared return type
    pub fn returning<T: 'static>(mut self) -> Self {
        self.return_type = Some(std::any::type_name::<T>());
        self
    }
}

/// Build a [`MethodAction`] from a typed controller method closure
pub fn action<C, F, Fut>(f: F) -> MethodAction
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, Vec<ParamValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, Error>> + Send + 'static,
{
    Arc::new(
        move |instance, args| -> BoxFuture<Result<Option<Value>, Error>> {
            match instance.downcast::<C>() {
                Ok(controller) => Box::pin(f(controller, args)),
                Err(_) => {
                    let name = std::any::type_name::<C>();
                    Box::pin(async move {
                        Err(Error::Internal(format!(
                            "controller instance is not a {name}"
                        )))
                    })
                }
            }
        },
    )
}

/// Parameter-level registration payload
pub struct ParamSpec {
    index: usize,
    param_type: Option<ParameterKind>,
    param_name: Option<String>,
    validator: Option<ParamValidator>,
    factory: Option<ParamFactory>,
    arg_name: Option<&'static str>,
    arg_type: Option<&'static str>,
}

impl ParamSpec {
    fn kind(index: usize, kind: ParameterKind) -> Self {
        Self {
            index,
            param_type: Some(kind),
            param_name: None,
            validator: None,
            factory: None,
            arg_name: None,
            arg_type: None,
        }
    }

    pub fn body(index: usize) -> Self {
        Self::kind(index, ParameterKind::Body)
    }

    pub fn cookies(index: usize) -> Self {
        Self::kind(index, ParameterKind::Cookie)
    }

    pub fn headers(index: usize) -> Self {
        Self::kind(index, ParameterKind::Header)
    }

    /// Path parameter extraction
    pub fn params(index: usize) -> Self {
        Self::kind(index, ParameterKind::Path)
    }

    pub fn query(index: usize) -> Self {
        Self::kind(index, ParameterKind::Query)
    }

    pub fn request(index: usize) -> Self {
        Self::kind(index, ParameterKind::Request)
    }

    pub fn response(index: usize) -> Self {
        Self::kind(index, ParameterKind::Response)
    }

    pub fn next(index: usize) -> Self {
        Self::kind(index, ParameterKind::Next)
    }

    /// Custom parameter backed by a context factory instead of an
    /// extraction kind
    pub fn custom<F, Fut>(index: usize, factory: F) -> Self
    where
        F: Fn(HttpContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Error>> + Send + 'static,
    {
        Self {
            index,
            param_type: None,
            param_name: None,
            validator: None,
            factory: Some(Arc::new(move |ctx: &HttpContext| {
                Box::pin(factory(ctx.clone())) as BoxFuture<Result<Value, Error>>
            })),
            arg_name: None,
            arg_type: None,
        }
    }

    /// Extract a single named sub-value instead of the whole namespace
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.param_name = Some(name.into());
        self
    }

    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Record the signature parameter name, best effort
    pub fn arg_name(mut self, name: &'static str) -> Self {
        self.arg_name = Some(name);
        self
    }

    /// Record the signature parameter type, best effort
    pub fn arg_type<T: 'static>(mut self) -> Self {
        self.arg_type = Some(std::any::type_name::<T>());
        self
    }
}

impl MetadataStore {
    /// Class-level registration: merge `{url, middleware, options}` into
    /// the controller record. Middleware lists concatenate in application
    /// order, never replace.
    pub fn register_controller<C: 'static>(&self, spec: ControllerSpec) {
        let meta = self.get_or_init::<ControllerMetadata>(
            MetadataTarget::class::<C>(),
            keys::CONTROLLER_METADATA,
        );
        let mut meta = meta.write().unwrap();

        if let Some(url) = spec.url {
            meta.url = url;
        }
        meta.middleware.extend(spec.middleware);
        if let Some(options) = spec.options {
            meta.options = options;
        }
    }

    /// Method-level registration: append one method entry. Re-registering
    /// the same (verb, url) pair replaces the earlier entry; different
    /// pairs on one method accumulate.
    pub fn register_route<C: 'static>(&self, spec: RouteSpec) {
        let methods = self
            .get_or_init::<Vec<MethodMetadata>>(MetadataTarget::class::<C>(), keys::METHOD_METADATA);
        let mut methods = methods.write().unwrap();

        let entry = MethodMetadata {
            method_name: spec.method_name,
            verb: spec.verb,
            url: spec.url,
            status: spec.status,
            return_type: spec.return_type,
            source: SOURCE_HTTP,
            action: spec.action,
        };

        if let Some(existing) = methods
            .iter_mut()
            .find(|m| m.verb == entry.verb && m.url == entry.url)
        {
            *existing = entry;
        } else {
            methods.push(entry);
        }
    }

    /// Parameter-level registration: write the entry at its index, then
    /// renumber `call_index` for all parameters of the same kind in
    /// ascending index order
    pub fn register_param<C: 'static>(&self, method_name: &'static str, spec: ParamSpec) {
        let params = self.get_or_init::<Vec<ParamMetadata>>(
            MetadataTarget::method::<C>(method_name),
            keys::PARAMS_METADATA,
        );
        let mut params = params.write().unwrap();

        let entry = ParamMetadata {
            index: spec.index,
            param_type: spec.param_type,
            param_name: spec.param_name,
            param_validator: spec.validator,
            factory: spec.factory,
            arg_name: spec.arg_name,
            arg_type: spec.arg_type,
            call_index: 0,
            method_name,
        };

        // params[index] is unique per method
        if let Some(existing) = params.iter_mut().find(|p| p.index == entry.index) {
            *existing = entry;
        } else {
            params.push(entry);
        }
        params.sort_by_key(|p| p.index);

        let mut counters: HashMap<Option<ParameterKind>, usize> = HashMap::new();
        for param in params.iter_mut() {
            let counter = counters.entry(param.param_type).or_insert(0);
            param.call_index = *counter;
            *counter += 1;
        }
    }

    /// Middleware registration: prepend into the method's bucket, so the
    /// most recently attached middleware runs first within the bucket
    pub fn attach_middleware<C: 'static>(&self, method_name: &'static str, middleware: Middleware) {
        let map =
            self.get_or_init::<MiddlewareMap>(MetadataTarget::class::<C>(), keys::MIDDLEWARE_METADATA);
        let mut map = map.write().unwrap();
        map.entry(method_name).or_default().insert(0, middleware);
    }

    /// Bind a pipe to a controller, optionally scoped to one method
    pub fn register_pipe<C: 'static>(&self, pipe: PipeRef) {
        let pipes =
            self.get_or_init::<Vec<PipeRef>>(MetadataTarget::class::<C>(), keys::PIPES_METADATA);
        pipes.write().unwrap().push(pipe);
    }

    /// Declare a response template for one method
    pub fn register_render_template<C: 'static>(
        &self,
        method_name: &'static str,
        template: impl Into<String>,
    ) {
        let slot = self.get_or_init::<String>(
            MetadataTarget::method::<C>(method_name),
            keys::METHOD_TEMPLATE_METADATA,
        );
        *slot.write().unwrap() = template.into();
    }

    /// Record module metadata for the application bootstrap
    pub fn register_module<M: 'static>(&self, definition: ModuleDefinition) {
        let slot = self
            .get_or_init::<Option<ModuleDefinition>>(MetadataTarget::class::<M>(), keys::MODULE_METADATA);
        *slot.write().unwrap() = Some(definition);
    }
}

// Convenience wrappers over the process-wide store, mirroring how
// decorators apply against ambient metadata.

pub fn register_controller<C: 'static>(spec: ControllerSpec) {
    MetadataStore::global().register_controller::<C>(spec);
}

pub fn register_route<C: 'static>(spec: RouteSpec) {
    MetadataStore::global().register_route::<C>(spec);
}

pub fn register_param<C: 'static>(method_name: &'static str, spec: ParamSpec) {
    MetadataStore::global().register_param::<C>(method_name, spec);
}

pub fn attach_middleware<C: 'static>(method_name: &'static str, middleware: Middleware) {
    MetadataStore::global().attach_middleware::<C>(method_name, middleware);
}

pub fn register_pipe<C: 'static>(pipe: PipeRef) {
    MetadataStore::global().register_pipe::<C>(pipe);
}

pub fn register_render_template<C: 'static>(method_name: &'static str, template: impl Into<String>) {
    MetadataStore::global().register_render_template::<C>(method_name, template);
}

pub fn register_module<M: 'static>(definition: ModuleDefinition) {
    MetadataStore::global().register_module::<M>(definition);
}
