//! Module loading and type resolution
//!
//! - [`ModuleLoader`]: the contract of an external module loader, with a
//!   synchronous `require` that fails when a module is not loaded yet and an
//!   asynchronous `require_async` that loads it first
//! - [`ModuleRegistry`]: in-process module loader with immediately defined and
//!   deferred (asynchronously produced) modules
//! - [`Loader`]: resolves type references and instance specifications into
//!   types and values, on top of a module loader

pub mod reference;
pub mod resolve;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use pentype_core::{Error, Result};
use serde_json::Value as Json;
use tracing::debug;

use crate::types::{normalize_id, Type};
use crate::value::Value;

pub use reference::TypeReference;
pub use resolve::Loader;

/// Factory of an instance module
pub type FactoryFn = Arc<dyn Fn(FactoryContext) -> Result<Value> + Send + Sync>;

/// Future producing a deferred module
pub type ModuleFuture = Pin<Box<dyn Future<Output = Result<Module>> + Send>>;

/// Producer of a deferred module
pub type ModuleProvider = Arc<dyn Fn() -> ModuleFuture + Send + Sync>;

/// One part of the `[...dependencies, factory]` form of an instance module
#[derive(Clone)]
pub enum FactoryPart {
    /// Id of a module the factory depends on
    Dependency(String),
    /// The factory itself
    Function(FactoryFn),
}

impl fmt::Debug for FactoryPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactoryPart::Dependency(id) => write!(f, "Dependency({})", id),
            FactoryPart::Function(_) => f.write_str("Function"),
        }
    }
}

/// What a module id resolves to
#[derive(Debug, Clone)]
pub enum Module {
    /// A type
    Type(Type),
    /// An instance factory in `[...dependencies, factory]` form
    Factory(Vec<FactoryPart>),
    /// Plain data
    Data(Json),
}

impl Module {
    /// Factory module with dependencies
    pub fn factory<I, S>(
        dependencies: I,
        factory: impl Fn(FactoryContext) -> Result<Value> + Send + Sync + 'static,
    ) -> Module
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts: Vec<FactoryPart> = dependencies
            .into_iter()
            .map(|id| FactoryPart::Dependency(id.into()))
            .collect();
        parts.push(FactoryPart::Function(Arc::new(factory)));
        Module::Factory(parts)
    }
}

/// Arguments handed to an instance factory
#[derive(Debug, Clone)]
pub struct FactoryContext {
    /// Id of the instance being created
    pub id: String,
    /// Type the instance must be an instance of
    pub instance_type: Type,
    /// Resolved dependency modules, in declaration order
    pub dependencies: Vec<Module>,
    /// Merged configuration of the instance
    pub config: Json,
}

/// External module loader contract
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// Get an already loaded module
    ///
    /// Fails with operation-invalid when the module exists but is not loaded.
    fn require(&self, id: &str) -> Result<Module>;

    /// Get a module, loading it first if needed
    async fn require_async(&self, id: &str) -> Result<Module>;
}

enum Entry {
    Ready(Module),
    Deferred(ModuleProvider),
}

/// In-process module loader
///
/// # Example
///
/// ```ignore
/// let registry = ModuleRegistry::new();
/// registry.define("my/type", Module::Type(my_type));
/// registry.define_deferred("my/lazy", || async { Ok(Module::Data(json!(1))) });
/// ```
#[derive(Default)]
pub struct ModuleRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

static GLOBAL_REGISTRY: Lazy<Arc<ModuleRegistry>> = Lazy::new(|| Arc::new(ModuleRegistry::new()));

impl ModuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by the global loader
    pub fn global() -> Arc<ModuleRegistry> {
        GLOBAL_REGISTRY.clone()
    }

    /// Define a loaded module, replacing any previous definition
    pub fn define(&self, id: impl Into<String>, module: Module) {
        let id = normalize_id(&id.into());
        self.entries.write().insert(id, Entry::Ready(module));
    }

    /// Define a type module under the type's permanent id
    pub fn define_type(&self, ty: &Type) -> Result<()> {
        let id = ty
            .id()
            .ok_or_else(|| Error::argument_required("id"))?
            .to_string();
        self.define(id, Module::Type(ty.clone()));
        Ok(())
    }

    /// Define a module produced asynchronously on first `require_async`
    pub fn define_deferred<F, Fut>(&self, id: impl Into<String>, provider: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Module>> + Send + 'static,
    {
        let id = normalize_id(&id.into());
        let provider: ModuleProvider = Arc::new(move || Box::pin(provider()));
        self.entries.write().insert(id, Entry::Deferred(provider));
    }

    /// Whether a module is defined and loaded
    pub fn is_loaded(&self, id: &str) -> bool {
        matches!(
            self.entries.read().get(&normalize_id(id)),
            Some(Entry::Ready(_))
        )
    }

    /// Whether a module is defined
    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(&normalize_id(id))
    }
}

fn not_defined(id: &str) -> Error {
    Error::argument_invalid("id", format!("module '{}' is not defined", id))
}

#[async_trait]
impl ModuleLoader for ModuleRegistry {
    fn require(&self, id: &str) -> Result<Module> {
        let id = normalize_id(id);
        match self.entries.read().get(&id) {
            Some(Entry::Ready(module)) => Ok(module.clone()),
            Some(Entry::Deferred(_)) => Err(Error::operation_invalid(format!(
                "Module '{}' has not been loaded yet",
                id
            ))),
            None => Err(not_defined(&id)),
        }
    }

    async fn require_async(&self, id: &str) -> Result<Module> {
        let id = normalize_id(id);
        let provider = match self.entries.read().get(&id) {
            Some(Entry::Ready(module)) => return Ok(module.clone()),
            Some(Entry::Deferred(provider)) => provider.clone(),
            None => return Err(not_defined(&id)),
        };

        let module = provider().await?;
        debug!(target: "pentype::loader", module = %id, "Module loaded");

        let mut entries = self.entries.write();
        match entries.get(&id) {
            // A concurrent load finished first
            Some(Entry::Ready(existing)) => Ok(existing.clone()),
            _ => {
                entries.insert(id, Entry::Ready(module.clone()));
                Ok(module)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::standard;
    use pentype_core::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_require_defined_module() {
        let registry = ModuleRegistry::new();
        registry.define("my/data", Module::Data(json!({"a": 1})));
        match registry.require("my/data").unwrap() {
            Module::Data(data) => assert_eq!(data, json!({"a": 1})),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_require_unknown_module() {
        let registry = ModuleRegistry::new();
        let err = registry.require("nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentInvalid);
    }

    #[test]
    fn test_define_type_requires_permanent_id() {
        let registry = ModuleRegistry::new();
        let anonymous = standard().complex.extend().build().unwrap();
        assert_eq!(
            registry.define_type(&anonymous).unwrap_err().kind(),
            ErrorKind::ArgumentRequired
        );
        let named = standard().complex.extend().id("my/named").build().unwrap();
        registry.define_type(&named).unwrap();
        assert!(registry.is_loaded("my/named"));
    }

    #[tokio::test]
    async fn test_deferred_module_sync_before_async_after() {
        let registry = ModuleRegistry::new();
        registry.define_deferred("my/lazy", || async { Ok(Module::Data(json!(42))) });
        assert!(registry.contains("my/lazy"));
        assert!(!registry.is_loaded("my/lazy"));
        let err = registry.require("my/lazy").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationInvalid);

        registry.require_async("my/lazy").await.unwrap();
        assert!(registry.is_loaded("my/lazy"));
        assert!(registry.require("my/lazy").is_ok());
    }

    #[tokio::test]
    async fn test_deferred_failure_is_propagated() {
        let registry = ModuleRegistry::new();
        registry.define_deferred("my/broken", || async { Err(Error::user("load failed")) });
        let err = registry.require_async("my/broken").await.unwrap_err();
        assert_eq!(err, Error::user("load failed"));
        assert!(!registry.is_loaded("my/broken"));
    }

    #[test]
    fn test_factory_module_form() {
        let module = Module::factory(["a", "b"], |ctx| ctx.instance_type.create(&ctx.config));
        match module {
            Module::Factory(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(parts[0], FactoryPart::Dependency(ref id) if id == "a"));
                assert!(matches!(parts[2], FactoryPart::Function(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
