// Application bootstrapper.
//
// Walks the registered module graph depth-first (imports before the
// importing module), creates each module's DI scope, runs provider
// registrations, and records module order for the route resolver.

use crate::adapter::HttpApplicationAdapter;
use crate::container::{Container, ContainerManager, InjectionToken, Provider};
use crate::logging::{debug, info, trace};
use crate::metadata::MetadataStore;
use crate::middleware::Middleware;
use crate::module::ModuleRef;
use crate::reflector::Reflector;
use crate::resolver::RouteResolver;
use crate::Error;
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashSet;
use std::sync::Arc;

/// Token carrying the application version used as a route prefix
pub const APP_VERSION: InjectionToken = InjectionToken::new("__server__:app-version");

/// Token under which the active HTTP adapter is registered
pub const HTTP_ADAPTER: InjectionToken = InjectionToken::new("__server_http__:adapter");

/// The bootstrapped application: module graph walked, DI scopes populated
pub struct Application {
    containers: Arc<ContainerManager>,
    reflector: Reflector,
    /// Modules in registration order, imports first
    modules: Vec<ModuleRef>,
}

impl Application {
    /// Bootstrap from a root module registered in the process-wide store
    pub fn create<M: 'static>() -> Result<Self, Error> {
        Self::bootstrap::<M>(Reflector::new())
    }

    /// Bootstrap against an explicit metadata store
    pub fn with_store<M: 'static>(store: Arc<MetadataStore>) -> Result<Self, Error> {
        Self::bootstrap::<M>(Reflector::with_store(store))
    }

    fn bootstrap<M: 'static>(reflector: Reflector) -> Result<Self, Error> {
        let containers = Arc::new(ContainerManager::new());
        let mut modules = Vec::new();
        let mut seen = HashSet::new();

        register_module_tree(
            &containers,
            &reflector,
            ModuleRef::of::<M>(),
            TypeId::of::<M>(),
            &mut modules,
            &mut seen,
        )?;

        info!(module_count = modules.len(), "Application bootstrap complete");

        Ok(Self {
            containers,
            reflector,
            modules,
        })
    }

    /// The application-wide root DI scope
    pub fn container(&self) -> Container {
        self.containers.root()
    }

    pub fn containers(&self) -> Arc<ContainerManager> {
        self.containers.clone()
    }

    pub fn reflector(&self) -> &Reflector {
        &self.reflector
    }

    /// Registered modules, imports first
    pub fn modules(&self) -> &[ModuleRef] {
        &self.modules
    }

    /// Resolve a provider from the root scope
    pub fn inject<T: Provider>(&self) -> Result<Arc<T>, Error> {
        self.containers.root().resolve::<T>()
    }
}

fn register_module_tree(
    containers: &Arc<ContainerManager>,
    reflector: &Reflector,
    module: ModuleRef,
    root: TypeId,
    order: &mut Vec<ModuleRef>,
    seen: &mut HashSet<TypeId>,
) -> Result<(), Error> {
    if !seen.insert(module.type_id) {
        return Ok(());
    }

    let definition = reflector
        .module_metadata_by_id(module.type_id)
        .ok_or_else(|| Error::ModuleNotRegistered(module.type_name.to_string()))?;

    debug!(module = definition.name, "Registering module");

    // Imported modules register first
    for child in &definition.modules {
        register_module_tree(containers, reflector, *child, root, order, seen)?;
    }

    // The root module owns the root scope; every other module gets a
    // child scope falling back to it
    let scope = if module.type_id == root {
        let scope = containers.root();
        containers.bind(module.type_id, scope.clone());
        scope
    } else {
        containers.scope(module.type_id)
    };

    for provider in &definition.providers {
        (provider.register_fn)(&scope);
        trace!(
            module = definition.name,
            provider = provider.type_name,
            "Provider registered"
        );
    }

    debug!(module = definition.name, "Module registration complete");
    order.push(module);
    Ok(())
}

/// The HTTP-facing module surface: binds an adapter to a bootstrapped
/// application and drives route resolution and serving.
pub struct HttpModule {
    adapter: Arc<dyn HttpApplicationAdapter>,
    resolver: RouteResolver,
}

impl HttpModule {
    pub fn create(app: &Application, adapter: Arc<dyn HttpApplicationAdapter>) -> Self {
        app.container().register_token(HTTP_ADAPTER, adapter.clone());

        let resolver = RouteResolver::new(
            adapter.clone(),
            app.containers(),
            app.reflector().clone(),
            app.modules().to_vec(),
        );

        Self { adapter, resolver }
    }

    pub fn adapter(&self) -> Arc<dyn HttpApplicationAdapter> {
        self.adapter.clone()
    }

    pub fn resolver(&self) -> &RouteResolver {
        &self.resolver
    }

    /// Bind to an already-created listener instead of opening one
    pub fn attach_server(&self, server: tokio::net::TcpListener) {
        self.adapter.attach_server(server);
    }

    /// Resolve all routes, then begin serving. Exactly one resolution per
    /// listen call; no partial route table is ever installed.
    pub async fn listen(&self, port: u16) -> Result<(), Error> {
        self.resolver.resolve().await?;
        self.adapter.listen(port).await
    }

    /// Resolve routes without serving (tests, offline route inspection)
    pub async fn resolve(&self) -> Result<(), Error> {
        self.resolver.resolve().await
    }

    pub async fn close(&self) {
        self.adapter.close().await;
    }

    /// Passthrough configuration to the underlying server
    pub fn set(&self, setting: &str, value: Value) {
        self.adapter.set(setting, value);
    }

    /// Register middleware ahead of every route
    pub fn use_middleware(&self, middleware: Middleware) {
        self.adapter.use_middleware(middleware);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Provider;
    use crate::module::{ModuleDefinition, ProviderRegistration};

    struct MessagesService {
        greeting: &'static str,
    }

    impl Provider for MessagesService {}

    #[test]
    fn test_bootstrap_walks_imports_first() {
        struct ChildModule;
        struct RootModule;

        let store = Arc::new(MetadataStore::new());
        store.register_module::<ChildModule>(ModuleDefinition::new("ChildModule"));
        store.register_module::<RootModule>(
            ModuleDefinition::new("RootModule").import::<ChildModule>(),
        );

        let app = Application::with_store::<RootModule>(store).unwrap();
        assert_eq!(
            app.modules(),
            &[ModuleRef::of::<ChildModule>(), ModuleRef::of::<RootModule>()]
        );
    }

    #[test]
    fn test_bootstrap_fails_for_unregistered_module() {
        struct UnknownModule;

        let store = Arc::new(MetadataStore::new());
        let result = Application::with_store::<UnknownModule>(store);
        assert!(matches!(result, Err(Error::ModuleNotRegistered(_))));
    }

    #[test]
    fn test_root_providers_visible_to_module_scopes() {
        struct FeatureModule;
        struct RootModule;

        let store = Arc::new(MetadataStore::new());
        store.register_module::<FeatureModule>(ModuleDefinition::new("FeatureModule"));
        store.register_module::<RootModule>(
            ModuleDefinition::new("RootModule")
                .import::<FeatureModule>()
                .provider(ProviderRegistration::class(|_c| MessagesService {
                    greeting: "hello",
                })),
        );

        let app = Application::with_store::<RootModule>(store).unwrap();

        // Root scope resolves directly
        assert_eq!(app.inject::<MessagesService>().unwrap().greeting, "hello");

        // Feature scope falls back to root
        let scope = app
            .containers()
            .get(TypeId::of::<FeatureModule>(), "FeatureModule")
            .unwrap();
        assert_eq!(scope.resolve::<MessagesService>().unwrap().greeting, "hello");
    }

    #[test]
    fn test_shared_import_registers_once() {
        struct SharedModule;
        struct LeftModule;
        struct RightModule;
        struct RootModule;

        let store = Arc::new(MetadataStore::new());
        store.register_module::<SharedModule>(ModuleDefinition::new("SharedModule"));
        store.register_module::<LeftModule>(
            ModuleDefinition::new("LeftModule").import::<SharedModule>(),
        );
        store.register_module::<RightModule>(
            ModuleDefinition::new("RightModule").import::<SharedModule>(),
        );
        store.register_module::<RootModule>(
            ModuleDefinition::new("RootModule")
                .import::<LeftModule>()
                .import::<RightModule>(),
        );

        let app = Application::with_store::<RootModule>(store).unwrap();
        let shared_count = app
            .modules()
            .iter()
            .filter(|m| m.type_id == TypeId::of::<SharedModule>())
            .count();
        assert_eq!(shared_count, 1);
        assert_eq!(app.modules().len(), 4);
    }

    #[test]
    fn test_version_token_provider() {
        struct RootModule;

        let store = Arc::new(MetadataStore::new());
        store.register_module::<RootModule>(
            ModuleDefinition::new("RootModule")
                .provider(ProviderRegistration::value(APP_VERSION, "v1".to_string())),
        );

        let app = Application::with_store::<RootModule>(store).unwrap();
        let version = app.container().resolve_token::<String>(APP_VERSION).unwrap();
        assert_eq!(*version, "v1");
    }
}
