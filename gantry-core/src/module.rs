// Module system: modules group controllers and providers, own a DI scope,
// and compose through imports.

use crate::container::Container;
use crate::Error;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Registration information for a provider
#[derive(Clone)]
pub struct ProviderRegistration {
    pub type_name: &'static str,
    pub register_fn: Arc<dyn Fn(&Container) + Send + Sync>,
}

impl ProviderRegistration {
    /// Register a provider built by a factory; the factory may resolve its
    /// own dependencies from the container
    pub fn class<T, F>(factory: F) -> Self
    where
        T: crate::container::Provider,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        Self {
            type_name: std::any::type_name::<T>(),
            register_fn: Arc::new(move |container| container.register(factory(container))),
        }
    }

    /// Register a value under an injection token
    pub fn value<T>(token: crate::container::InjectionToken, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self {
            type_name: token.id(),
            register_fn: Arc::new(move |container| container.register_token(token, value.clone())),
        }
    }

    /// Append a value to a multi-provider token
    pub fn multi<T>(token: crate::container::InjectionToken, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self {
            type_name: token.id(),
            register_fn: Arc::new(move |container| {
                container.register_multi_token(token, value.clone())
            }),
        }
    }
}

impl std::fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Factory constructing a controller instance from its module's DI scope
pub type ControllerFactory =
    Arc<dyn Fn(&Container) -> Result<Arc<dyn Any + Send + Sync>, Error> + Send + Sync>;

/// Registration information for a controller
#[derive(Clone)]
pub struct ControllerDef {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub factory: ControllerFactory,
}

impl ControllerDef {
    pub fn new<C, F>(factory: F) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(&Container) -> Result<C, Error> + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<C>(),
            type_name: std::any::type_name::<C>(),
            factory: Arc::new(move |container| {
                Ok(Arc::new(factory(container)?) as Arc<dyn Any + Send + Sync>)
            }),
        }
    }
}

impl std::fmt::Debug for ControllerDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerDef")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Reference to a module type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModuleRef {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl ModuleRef {
    pub fn of<M: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
        }
    }
}

/// Metadata describing one module: its imports, controllers and providers
#[derive(Clone, Debug, Default)]
pub struct ModuleDefinition {
    pub name: &'static str,
    pub modules: Vec<ModuleRef>,
    pub controllers: Vec<ControllerDef>,
    pub providers: Vec<ProviderRegistration>,
}

impl ModuleDefinition {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Import another module; imported modules register before this one
    pub fn import<M: 'static>(mut self) -> Self {
        self.modules.push(ModuleRef::of::<M>());
        self
    }

    pub fn controller(mut self, controller: ControllerDef) -> Self {
        self.controllers.push(controller);
        self
    }

    pub fn provider(mut self, provider: ProviderRegistration) -> Self {
        self.providers.push(provider);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{Container, InjectionToken, Provider};

    struct CounterService {
        start: u32,
    }

    impl Provider for CounterService {}

    #[test]
    fn test_provider_registration_class() {
        let container = Container::new();
        let registration = ProviderRegistration::class(|_c| CounterService { start: 5 });
        (registration.register_fn)(&container);

        assert_eq!(container.resolve::<CounterService>().unwrap().start, 5);
    }

    #[test]
    fn test_provider_registration_value() {
        let container = Container::new();
        let token = InjectionToken::new("app:version");
        let registration = ProviderRegistration::value(token, "v2".to_string());
        (registration.register_fn)(&container);

        assert_eq!(*container.resolve_token::<String>(token).unwrap(), "v2");
    }

    #[test]
    fn test_controller_def_constructs_instances() {
        struct HomeController;

        let container = Container::new();
        let def = ControllerDef::new(|_c| Ok(HomeController));
        let instance = (def.factory)(&container).unwrap();
        assert!(instance.downcast::<HomeController>().is_ok());
    }

    #[test]
    fn test_module_definition_builder() {
        struct ChildModule;

        let def = ModuleDefinition::new("AppModule")
            .import::<ChildModule>()
            .provider(ProviderRegistration::class(|_c| CounterService { start: 0 }));

        assert_eq!(def.name, "AppModule");
        assert_eq!(def.modules, vec![ModuleRef::of::<ChildModule>()]);
        assert_eq!(def.providers.len(), 1);
        assert!(def.controllers.is_empty());
    }
}
