// Read-only facade over the metadata store.
//
// Consumers (route resolver, OpenAPI generation, tests) read through this
// facade instead of touching storage keys; it has no mutation capability
// and returns safe defaults when nothing was ever written.

use crate::metadata::{
    keys, ControllerMetadata, ControllerOptions, MetadataStore, MetadataTarget, MethodMetadata,
    MiddlewareMap, ParamMetadata,
};
use crate::pipe::PipeRef;
use std::any::TypeId;
use std::sync::Arc;

/// Controller metadata joined with its method and pipe lists
#[derive(Clone, Default)]
pub struct ControllerView {
    pub url: String,
    pub options: ControllerOptions,
    pub middleware: Vec<crate::middleware::Middleware>,
    pub methods: Vec<MethodMetadata>,
    pub pipes: Vec<PipeRef>,
}

impl std::fmt::Debug for ControllerView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerView")
            .field("url", &self.url)
            .field("options", &self.options)
            .field("middleware", &self.middleware.len())
            .field("methods", &self.methods)
            .field("pipes", &self.pipes)
            .finish()
    }
}

/// The merged per-class view: controller, methods, params and middleware
#[derive(Default)]
pub struct TargetMetadata {
    pub controller: ControllerMetadata,
    pub methods: Vec<MethodMetadata>,
    pub params: Vec<ParamMetadata>,
    pub middleware: MiddlewareMap,
}

#[derive(Clone)]
pub struct Reflector {
    store: Arc<MetadataStore>,
}

impl Default for Reflector {
    fn default() -> Self {
        Self::new()
    }
}

impl Reflector {
    /// Reflector over the process-wide store
    pub fn new() -> Self {
        Self {
            store: MetadataStore::global(),
        }
    }

    /// Reflector over an explicit store (tests, isolated applications)
    pub fn with_store(store: Arc<MetadataStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    /// Controller metadata plus method and pipe lists for a class
    pub fn get_controller_metadata<C: 'static>(&self) -> ControllerView {
        self.controller_metadata_by_id(TypeId::of::<C>())
    }

    pub fn controller_metadata_by_id(&self, controller: TypeId) -> ControllerView {
        let target = MetadataTarget::class_id(controller);

        let (url, options, middleware) = self
            .store
            .get::<ControllerMetadata>(target, keys::CONTROLLER_METADATA)
            .map(|meta| {
                let meta = meta.read().unwrap();
                (meta.url.clone(), meta.options.clone(), meta.middleware.clone())
            })
            .unwrap_or_default();

        let methods = self
            .store
            .get::<Vec<MethodMetadata>>(target, keys::METHOD_METADATA)
            .map(|methods| methods.read().unwrap().clone())
            .unwrap_or_default();

        let pipes = self
            .store
            .get::<Vec<PipeRef>>(target, keys::PIPES_METADATA)
            .map(|pipes| pipes.read().unwrap().clone())
            .unwrap_or_default();

        ControllerView {
            url,
            options,
            middleware,
            methods,
            pipes,
        }
    }

    /// Raw metadata lookup by key; `None` when nothing was written
    pub fn get_metadata<T: Clone + Send + Sync + 'static>(
        &self,
        key: &'static str,
        target: MetadataTarget,
    ) -> Option<T> {
        self.store
            .get::<T>(target, key)
            .map(|slot| slot.read().unwrap().clone())
    }

    /// Module metadata for a class, if the module was registered
    pub fn get_module_metadata<M: 'static>(&self) -> Option<crate::module::ModuleDefinition> {
        self.module_metadata_by_id(TypeId::of::<M>())
    }

    pub fn module_metadata_by_id(
        &self,
        module: TypeId,
    ) -> Option<crate::module::ModuleDefinition> {
        self.store
            .get::<Option<crate::module::ModuleDefinition>>(
                MetadataTarget::class_id(module),
                keys::MODULE_METADATA,
            )
            .and_then(|slot| slot.read().unwrap().clone())
    }

    /// Parameter metadata for one method, in declaration-index order
    pub fn get_params_metadata<C: 'static>(&self, method_name: &'static str) -> Vec<ParamMetadata> {
        self.params_metadata_by_id(TypeId::of::<C>(), method_name)
    }

    pub fn params_metadata_by_id(
        &self,
        controller: TypeId,
        method_name: &'static str,
    ) -> Vec<ParamMetadata> {
        self.store
            .get::<Vec<ParamMetadata>>(
                MetadataTarget::method_id(controller, method_name),
                keys::PARAMS_METADATA,
            )
            .map(|params| {
                let mut params = params.read().unwrap().clone();
                params.sort_by_key(|p| p.index);
                params
            })
            .unwrap_or_default()
    }

    /// Middleware buckets for a class
    pub fn get_middleware_metadata<C: 'static>(&self) -> MiddlewareMap {
        self.middleware_metadata_by_id(TypeId::of::<C>())
    }

    pub fn middleware_metadata_by_id(&self, controller: TypeId) -> MiddlewareMap {
        self.store
            .get::<MiddlewareMap>(MetadataTarget::class_id(controller), keys::MIDDLEWARE_METADATA)
            .map(|map| map.read().unwrap().clone())
            .unwrap_or_default()
    }

    /// The merged view of everything recorded against a class
    pub fn get_target_metadata<C: 'static>(&self) -> TargetMetadata {
        let target = MetadataTarget::class::<C>();

        let controller = self
            .store
            .get::<ControllerMetadata>(target, keys::CONTROLLER_METADATA)
            .map(|meta| meta.read().unwrap().clone())
            .unwrap_or_default();

        let methods = self
            .store
            .get::<Vec<MethodMetadata>>(target, keys::METHOD_METADATA)
            .map(|methods| methods.read().unwrap().clone())
            .unwrap_or_default();

        // A method carrying several route registrations still has one
        // parameter list
        let mut seen = std::collections::HashSet::new();
        let mut params = Vec::new();
        for method in &methods {
            if seen.insert(method.method_name) {
                params.extend(self.get_params_metadata::<C>(method.method_name));
            }
        }

        TargetMetadata {
            controller,
            methods,
            params,
            middleware: self.get_middleware_metadata::<C>(),
        }
    }
}
