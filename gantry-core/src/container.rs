// Dependency injection container

use crate::logging::{debug, trace};
use crate::module::ControllerDef;
use crate::Error;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Trait for types that can be provided by the DI container
pub trait Provider: Send + Sync + 'static {}

/// Opaque key for providers that are not identified by a concrete type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InjectionToken {
    id: &'static str,
}

impl InjectionToken {
    pub const fn new(id: &'static str) -> Self {
        Self { id }
    }

    pub fn id(&self) -> &'static str {
        self.id
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum ProviderKey {
    Type(TypeId),
    Token(&'static str),
}

/// The dependency injection container.
///
/// Providers are keyed by class identity (`TypeId`) or by injection token;
/// lookups fall back to the parent scope when one exists.
#[derive(Clone, Default)]
pub struct Container {
    providers: Arc<RwLock<HashMap<ProviderKey, Arc<dyn Any + Send + Sync>>>>,
    multi: Arc<RwLock<HashMap<&'static str, Vec<Arc<dyn Any + Send + Sync>>>>>,
    parent: Option<Arc<Container>>,
}

impl Container {
    pub fn new() -> Self {
        debug!("Creating new DI container");
        Self::default()
    }

    /// Create a scope that falls back to `parent` for unknown providers
    pub fn with_parent(parent: Container) -> Self {
        Self {
            parent: Some(Arc::new(parent)),
            ..Self::default()
        }
    }

    /// Register a provider instance
    pub fn register<T: Provider>(&self, instance: T) {
        let type_name = std::any::type_name::<T>();
        trace!(provider = type_name, "Acquiring write lock for registration");

        let mut providers = self.providers.write().unwrap();
        providers.insert(ProviderKey::Type(TypeId::of::<T>()), Arc::new(instance));

        debug!(provider = type_name, "Provider registered in DI container");
    }

    /// Register a provider by TypeId and Arc (internal use)
    pub fn register_by_id(&self, type_id: TypeId, instance: Arc<dyn Any + Send + Sync>) {
        trace!(type_id = ?type_id, "Registering provider by TypeId");
        let mut providers = self.providers.write().unwrap();
        providers.insert(ProviderKey::Type(type_id), instance);
    }

    /// Register a provider using a factory function
    pub fn register_factory<T: Provider, F>(&self, factory: F)
    where
        F: FnOnce() -> T,
    {
        debug!(provider = std::any::type_name::<T>(), "Creating provider from factory");
        self.register(factory());
    }

    /// Register a value under an injection token
    pub fn register_token<T: Send + Sync + 'static>(&self, token: InjectionToken, value: T) {
        trace!(token = token.id(), "Registering token provider");
        let mut providers = self.providers.write().unwrap();
        providers.insert(ProviderKey::Token(token.id()), Arc::new(value));
    }

    /// Append a value to a multi-provider token
    pub fn register_multi_token<T: Send + Sync + 'static>(&self, token: InjectionToken, value: T) {
        trace!(token = token.id(), "Appending multi-token provider");
        let mut multi = self.multi.write().unwrap();
        multi.entry(token.id()).or_default().push(Arc::new(value));
    }

    /// Resolve a provider by type
    pub fn resolve<T: Provider>(&self) -> Result<Arc<T>, Error> {
        let type_name = std::any::type_name::<T>();
        trace!(provider = type_name, "Attempting to resolve provider");

        let result = self
            .lookup(&ProviderKey::Type(TypeId::of::<T>()))
            .and_then(|any| any.downcast::<T>().ok())
            .ok_or_else(|| Error::ProviderNotFound(format!("Provider not found: {type_name}")));

        match &result {
            Ok(_) => debug!(provider = type_name, "Provider resolved successfully"),
            Err(_) => debug!(provider = type_name, "Provider not found in container"),
        }

        result
    }

    /// Resolve a raw provider by TypeId
    pub fn resolve_by_id(&self, type_id: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.lookup(&ProviderKey::Type(type_id))
    }

    /// Resolve a token-keyed value
    pub fn resolve_token<T: Send + Sync + 'static>(
        &self,
        token: InjectionToken,
    ) -> Result<Arc<T>, Error> {
        self.lookup(&ProviderKey::Token(token.id()))
            .and_then(|any| any.downcast::<T>().ok())
            .ok_or_else(|| Error::ProviderNotFound(format!("Provider not found: {}", token.id())))
    }

    /// Resolve every value registered under a multi-provider token, parent
    /// scope contributions first
    pub fn resolve_multi<T: Clone + Send + Sync + 'static>(&self, token: InjectionToken) -> Vec<T> {
        let mut values = match &self.parent {
            Some(parent) => parent.resolve_multi(token),
            None => Vec::new(),
        };

        let multi = self.multi.read().unwrap();
        if let Some(entries) = multi.get(token.id()) {
            values.extend(
                entries
                    .iter()
                    .filter_map(|any| any.downcast_ref::<T>().cloned()),
            );
        }

        values
    }

    /// Check if a provider is registered
    pub fn has<T: Provider>(&self) -> bool {
        let exists = self.lookup(&ProviderKey::Type(TypeId::of::<T>())).is_some();
        trace!(provider = std::any::type_name::<T>(), exists = exists, "Checked provider existence");
        exists
    }

    /// Check if a token is registered
    pub fn has_token(&self, token: InjectionToken) -> bool {
        self.lookup(&ProviderKey::Token(token.id())).is_some()
    }

    /// Fetch a controller instance, lazily constructing and caching it on
    /// first use
    pub fn get_or_create(&self, def: &ControllerDef) -> Result<Arc<dyn Any + Send + Sync>, Error> {
        if let Some(existing) = self.lookup(&ProviderKey::Type(def.type_id)) {
            return Ok(existing);
        }

        debug!(controller = def.type_name, "Constructing controller instance");
        let instance = (def.factory)(self)?;
        self.register_by_id(def.type_id, instance.clone());
        Ok(instance)
    }

    /// Clear all providers
    pub fn clear(&self) {
        let mut providers = self.providers.write().unwrap();
        let count = providers.len();
        providers.clear();
        self.multi.write().unwrap().clear();

        debug!(provider_count = count, "Cleared all providers from container");
    }

    fn lookup(&self, key: &ProviderKey) -> Option<Arc<dyn Any + Send + Sync>> {
        if let Some(found) = self.providers.read().unwrap().get(key) {
            return Some(found.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(key))
    }
}

/// Tracks the DI scope owned by each registered module
#[derive(Default)]
pub struct ContainerManager {
    root: Container,
    scopes: RwLock<HashMap<TypeId, Container>>,
}

impl ContainerManager {
    pub fn new() -> Self {
        Self {
            root: Container::new(),
            scopes: RwLock::new(HashMap::new()),
        }
    }

    /// The application-wide root scope
    pub fn root(&self) -> Container {
        self.root.clone()
    }

    /// Bind an explicit container to a module (used for the root module)
    pub fn bind(&self, module: TypeId, container: Container) {
        self.scopes.write().unwrap().insert(module, container);
    }

    /// Get or create the scope owned by a module
    pub fn scope(&self, module: TypeId) -> Container {
        let mut scopes = self.scopes.write().unwrap();
        scopes
            .entry(module)
            .or_insert_with(|| Container::with_parent(self.root.clone()))
            .clone()
    }

    /// Get the scope of an already-registered module
    pub fn get(&self, module: TypeId, module_name: &str) -> Result<Container, Error> {
        self.scopes
            .read()
            .unwrap()
            .get(&module)
            .cloned()
            .ok_or_else(|| Error::ModuleNotRegistered(module_name.to_string()))
    }
}
