// Metadata store: associates structured metadata with classes and methods.
//
// Decorator-equivalent registration calls scatter across a program (a
// controller registration, several route registrations, several parameter
// registrations), all mutating the same per-class records. The store hands
// every caller a view of the *same* shared record, so a write made through
// one view is immediately visible through every other view and through
// direct store inspection. All writes happen during single-threaded
// bootstrap, before traffic.

use crate::adapter::{ParamValue, ParameterKind};
use crate::middleware::Middleware;
use crate::{BoxFuture, Error, HttpContext};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Well-known metadata keys.
///
/// Consumers never touch these directly; the reflector hides them.
pub mod keys {
    pub const CONTROLLER_METADATA: &str = "__server__:controller";
    pub const METHOD_METADATA: &str = "__server__:method";
    pub const PARAMS_METADATA: &str = "__server__:params";
    pub const MIDDLEWARE_METADATA: &str = "__server__:middleware";
    pub const PIPES_METADATA: &str = "__server__:pipes";
    pub const MODULE_METADATA: &str = "__server__:module";
    pub const METHOD_TEMPLATE_METADATA: &str = "__server__:method:template";
}

/// Origin discriminator for HTTP route metadata
pub const SOURCE_HTTP: &str = "http";

/// What a piece of metadata is attached to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetadataTarget {
    Class(TypeId),
    Method(TypeId, &'static str),
}

impl MetadataTarget {
    pub fn class<C: 'static>() -> Self {
        MetadataTarget::Class(TypeId::of::<C>())
    }

    pub fn class_id(type_id: TypeId) -> Self {
        MetadataTarget::Class(type_id)
    }

    pub fn method<C: 'static>(name: &'static str) -> Self {
        MetadataTarget::Method(TypeId::of::<C>(), name)
    }

    pub fn method_id(type_id: TypeId, name: &'static str) -> Self {
        MetadataTarget::Method(type_id, name)
    }
}

/// Process-wide registry mapping `(target, key)` to a live, shared record
#[derive(Default)]
pub struct MetadataStore {
    entries: RwLock<HashMap<(MetadataTarget, &'static str), Arc<dyn Any + Send + Sync>>>,
}

static GLOBAL: Lazy<Arc<MetadataStore>> = Lazy::new(|| Arc::new(MetadataStore::new()));

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide store used by the registration functions
    pub fn global() -> Arc<MetadataStore> {
        GLOBAL.clone()
    }

    /// Fetch the record for `(target, key)`, creating it from `Default`
    /// on first access. Every call returns a view of the same record.
    pub fn get_or_init<T>(&self, target: MetadataTarget, key: &'static str) -> Arc<RwLock<T>>
    where
        T: Default + Send + Sync + 'static,
    {
        self.get_or_init_with(target, key, T::default)
    }

    /// Fetch the record for `(target, key)`, creating it with `init` on
    /// first access
    pub fn get_or_init_with<T, F>(
        &self,
        target: MetadataTarget,
        key: &'static str,
        init: F,
    ) -> Arc<RwLock<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let mut entries = self.entries.write().unwrap();

        if let Some(slot) = entries.get(&(target, key)) {
            if let Ok(view) = slot.clone().downcast::<RwLock<T>>() {
                return view;
            }
        }

        let fresh = Arc::new(RwLock::new(init()));
        entries.insert((target, key), fresh.clone() as Arc<dyn Any + Send + Sync>);
        fresh
    }

    /// Read the record for `(target, key)` if one was ever written
    pub fn get<T>(&self, target: MetadataTarget, key: &'static str) -> Option<Arc<RwLock<T>>>
    where
        T: Send + Sync + 'static,
    {
        self.entries
            .read()
            .unwrap()
            .get(&(target, key))
            .and_then(|slot| slot.clone().downcast::<RwLock<T>>().ok())
    }

    pub fn contains(&self, target: MetadataTarget, key: &'static str) -> bool {
        self.entries.read().unwrap().contains_key(&(target, key))
    }

    /// Drop every record; only meaningful in tests
    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}

// ---------------------------------------------------------------------------
// Metadata record shapes
// ---------------------------------------------------------------------------

/// Free-form controller configuration
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Skip the application version prefix for this controller's routes
    pub ignore_version: bool,
}

/// One per controller class; mutated by every class-level registration
#[derive(Clone, Default)]
pub struct ControllerMetadata {
    /// Mount path prefix, default empty
    pub url: String,
    /// Middleware attached at class level, in application order
    pub middleware: Vec<Middleware>,
    pub options: ControllerOptions,
}

impl std::fmt::Debug for ControllerMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerMetadata")
            .field("url", &self.url)
            .field("middleware", &self.middleware.len())
            .field("options", &self.options)
            .finish()
    }
}

/// Type-erased controller method invoker: receives the controller instance
/// and the extracted positional arguments, resolves to the method result
/// (`None` when the method produced no value and handled the response
/// itself)
pub type MethodAction =
    Arc<dyn Fn(Arc<dyn Any + Send + Sync>, Vec<ParamValue>) -> BoxFuture<Result<Option<Value>, Error>> + Send + Sync>;

/// One per route registration, collected into an ordered list on the
/// owning class. A method may appear more than once with distinct
/// (verb, url) pairs.
#[derive(Clone)]
pub struct MethodMetadata {
    pub method_name: &'static str,
    /// Lowercase verb tag (`"get"`, `"post"`, ...); non-HTTP sources use
    /// other tags and are filtered out at resolution time
    pub verb: String,
    pub url: String,
    /// Response status override
    pub status: Option<u16>,
    /// Declared return type, best effort; `None` for async result wrappers
    pub return_type: Option<&'static str>,
    /// Origin discriminator, e.g. "http"
    pub source: &'static str,
    pub action: MethodAction,
}

impl std::fmt::Debug for MethodMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodMetadata")
            .field("method_name", &self.method_name)
            .field("verb", &self.verb)
            .field("url", &self.url)
            .field("status", &self.status)
            .field("return_type", &self.return_type)
            .field("source", &self.source)
            .finish()
    }
}

/// Optional validation hook applied to an extracted parameter value
pub type ParamValidator = Arc<dyn Fn(&Value) -> Result<(), Error> + Send + Sync>;

/// Custom parameter factory producing a value from the request context
pub type ParamFactory = Arc<dyn Fn(&HttpContext) -> BoxFuture<Result<Value, Error>> + Send + Sync>;

/// One per declared parameter
#[derive(Clone)]
pub struct ParamMetadata {
    /// Declaration position in the method's parameter list
    pub index: usize,
    /// Extraction kind; `None` for factory-based custom parameters
    pub param_type: Option<ParameterKind>,
    /// Sub-key extraction (a single query field, one header, ...)
    pub param_name: Option<String>,
    pub param_validator: Option<ParamValidator>,
    pub factory: Option<ParamFactory>,
    /// Parameter name in the method signature, best effort
    pub arg_name: Option<&'static str>,
    /// Parameter type in the method signature, best effort
    pub arg_type: Option<&'static str>,
    /// 0-based position among parameters of the same kind on this method
    pub call_index: usize,
    pub method_name: &'static str,
}

impl std::fmt::Debug for ParamMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamMetadata")
            .field("index", &self.index)
            .field("param_type", &self.param_type)
            .field("param_name", &self.param_name)
            .field("arg_name", &self.arg_name)
            .field("arg_type", &self.arg_type)
            .field("call_index", &self.call_index)
            .field("method_name", &self.method_name)
            .finish()
    }
}

/// Method name → ordered middleware list, stored independently of the
/// method metadata because middleware registrations compose across calls
pub type MiddlewareMap = HashMap<&'static str, Vec<Middleware>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Nested {
        label: String,
        tags: Vec<String>,
    }

    #[derive(Default)]
    struct Record {
        count: usize,
        nested: Nested,
    }

    struct Target;

    #[test]
    fn test_same_record_across_calls() {
        let store = MetadataStore::new();
        let target = MetadataTarget::class::<Target>();

        let first = store.get_or_init::<Record>(target, "k");
        first.write().unwrap().count = 3;

        let second = store.get_or_init::<Record>(target, "k");
        assert_eq!(second.read().unwrap().count, 3);
    }

    #[test]
    fn test_nested_mutation_visible_through_store() {
        let store = MetadataStore::new();
        let target = MetadataTarget::class::<Target>();

        let view = store.get_or_init::<Record>(target, "k");
        {
            let mut record = view.write().unwrap();
            record.nested.label = "updated".into();
            record.nested.tags.push("deep".into());
        }

        // Direct inspection through the storage key sees the nested write
        let direct = store.get::<Record>(target, "k").unwrap();
        let record = direct.read().unwrap();
        assert_eq!(record.nested.label, "updated");
        assert_eq!(record.nested.tags, vec!["deep".to_string()]);
    }

    #[test]
    fn test_initializer_runs_once() {
        let store = MetadataStore::new();
        let target = MetadataTarget::class::<Target>();

        store.get_or_init_with(target, "k", || Record {
            count: 7,
            ..Record::default()
        });
        let again = store.get_or_init_with(target, "k", || Record {
            count: 99,
            ..Record::default()
        });

        assert_eq!(again.read().unwrap().count, 7);
    }

    #[test]
    fn test_absent_metadata_is_none() {
        let store = MetadataStore::new();
        assert!(store.get::<Record>(MetadataTarget::class::<Target>(), "missing").is_none());
        assert!(!store.contains(MetadataTarget::class::<Target>(), "missing"));
    }

    #[test]
    fn test_class_and_method_targets_are_distinct() {
        let store = MetadataStore::new();
        let class = MetadataTarget::class::<Target>();
        let method = MetadataTarget::method::<Target>("index");

        store.get_or_init::<Record>(class, "k").write().unwrap().count = 1;
        store.get_or_init::<Record>(method, "k").write().unwrap().count = 2;

        assert_eq!(store.get::<Record>(class, "k").unwrap().read().unwrap().count, 1);
        assert_eq!(store.get::<Record>(method, "k").unwrap().read().unwrap().count, 2);
    }
}
