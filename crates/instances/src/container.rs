//! Instances container
//!
//! A registry of named singleton instances. Each registration (a holder) names
//! the module that produces the instance and the type the instance must be
//! of. Instances are created lazily, on the first asynchronous request, by the
//! factory of their module:
//!
//! ```text
//! unresolved ──get_*_async──> resolving ──> finished (instance | error)
//! ```
//!
//! A finished holder never changes again: a failure is captured once and
//! returned on every later request.
//!
//! Holders of one type are ordered by descending priority, ties broken by
//! definition order. The order is computed when a type bucket is first read
//! after a change.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pentype_core::{Error, Result};
use pentype_model::{
    normalize_id, FactoryContext, FactoryPart, Loader, Module, ModuleRegistry, TypeReference,
    Value,
};
use serde_json::{Map, Value as Json};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::InstancesConfig;

/// Key of the type of a registration
pub const TYPE_KEY: &str = "type";
/// Key of the priority of a registration
pub const PRIORITY_KEY: &str = "priority";
/// Key of the configuration of a registration
pub const CONFIG_KEY: &str = "config";

/// Predicate over instances
pub type InstanceFilter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Options of the by-type lookups
#[derive(Clone, Default)]
pub struct GetOptions {
    /// Fail with operation-invalid when nothing matches
    pub is_required: bool,
    /// Only consider instances accepted by the predicate
    pub filter: Option<InstanceFilter>,
}

impl GetOptions {
    /// Options requiring a match
    pub fn required() -> Self {
        Self {
            is_required: true,
            filter: None,
        }
    }

    /// The same options with a predicate
    pub fn filter(mut self, filter: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    fn accepts(&self, value: &Value) -> bool {
        self.filter.as_ref().map_or(true, |f| f(value))
    }
}

impl fmt::Debug for GetOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetOptions")
            .field("is_required", &self.is_required)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// InstanceHolder
// ============================================================================

struct Definition {
    priority: i64,
    config: Json,
}

/// One registration of the container
pub(crate) struct InstanceHolder {
    id: String,
    type_id: String,
    index: usize,
    definition: Mutex<Definition>,
    started: AtomicBool,
    result: OnceCell<Result<Value>>,
}

impl InstanceHolder {
    fn priority(&self) -> i64 {
        self.definition.lock().priority
    }

    fn config(&self) -> Json {
        self.definition.lock().config.clone()
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// The terminal result, if finished
    fn finished(&self) -> Option<Result<Value>> {
        self.result.get().cloned()
    }

    async fn resolve(&self, container: &InstancesContainer) -> Result<Value> {
        self.result
            .get_or_init(|| async {
                self.started.store(true, Ordering::Release);
                let result = container.create(self).await;
                match &result {
                    Ok(_) => debug!(
                        target: "pentype::instances",
                        id = %self.id,
                        type_id = %self.type_id,
                        "Instance created"
                    ),
                    Err(e) => warn!(
                        target: "pentype::instances",
                        id = %self.id,
                        error = %e,
                        "Instance creation failed"
                    ),
                }
                result
            })
            .await
            .clone()
    }
}

// ============================================================================
// InstancesContainer
// ============================================================================

#[derive(Default)]
struct TypeBucket {
    holders: Vec<Arc<InstanceHolder>>,
    sorted: bool,
}

#[derive(Default)]
struct Registry {
    by_id: HashMap<String, Arc<InstanceHolder>>,
    by_type: HashMap<String, TypeBucket>,
    next_index: usize,
}

/// Registry of lazily created singleton instances
///
/// # Example
///
/// ```ignore
/// let container = InstancesContainer::new(loader);
/// container.configure(&json!({
///     "acme/palette/dark": {"type": "acme/palette", "priority": 10},
///     "acme/palette/light": {"type": "acme/palette"}
/// }))?;
/// let palette = container.get_by_type_async("acme/palette", &GetOptions::required()).await?;
/// ```
pub struct InstancesContainer {
    loader: Arc<Loader>,
    registry: Mutex<Registry>,
}

impl InstancesContainer {
    /// Create an empty container over a loader
    pub fn new(loader: Arc<Loader>) -> Self {
        Self {
            loader,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Create an empty container over the global module registry
    pub fn with_global_registry() -> Self {
        Self::new(Arc::new(Loader::new(ModuleRegistry::global())))
    }

    /// The loader used to resolve types and modules
    pub fn loader(&self) -> &Arc<Loader> {
        &self.loader
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Define many instances from `{id: {type, priority, config}}`
    pub fn configure(&self, spec: &Json) -> Result<()> {
        let entries = match spec {
            Json::Null => return Ok(()),
            Json::Object(entries) => entries,
            _ => return Err(Error::argument_invalid_type("spec", "an object")),
        };
        let mut registry = self.registry.lock();
        for (id, entry) in entries {
            let entry = match entry {
                Json::Object(entry) => entry,
                _ => return Err(Error::argument_invalid_type(id.as_str(), "an object")),
            };
            let type_id = match entry.get(TYPE_KEY) {
                Some(Json::String(t)) if !t.is_empty() => Some(t.as_str()),
                None | Some(Json::Null) => None,
                Some(_) => return Err(Error::argument_invalid_type(TYPE_KEY, "a string")),
            };
            let priority = match entry.get(PRIORITY_KEY) {
                None | Some(Json::Null) => None,
                Some(p) => Some(
                    whole_number(p)
                        .ok_or_else(|| Error::argument_invalid_type(PRIORITY_KEY, "an integer"))?,
                ),
            };
            let config = entry.get(CONFIG_KEY).cloned().unwrap_or(Json::Null);
            Self::define_locked(&mut registry, id, type_id, priority, config)?;
        }
        Ok(())
    }

    /// Define the instances of a parsed configuration file
    pub fn configure_from(&self, config: &InstancesConfig) -> Result<()> {
        self.configure(&config.to_spec())
    }

    /// Define one instance
    pub fn define(&self, id: &str, type_id: &str, priority: i64, config: Json) -> Result<()> {
        let mut registry = self.registry.lock();
        Self::define_locked(&mut registry, id, Some(type_id), Some(priority), config)
    }

    fn define_locked(
        registry: &mut Registry,
        id: &str,
        type_id: Option<&str>,
        priority: Option<i64>,
        config: Json,
    ) -> Result<()> {
        if id.is_empty() {
            return Err(Error::argument_required("id"));
        }
        if let Some(holder) = registry.by_id.get(id) {
            if let Some(type_id) = type_id {
                if normalize_id(type_id) != holder.type_id {
                    return Err(Error::argument_invalid(
                        TYPE_KEY,
                        format!(
                            "instance '{}' is already defined with type '{}'",
                            id, holder.type_id
                        ),
                    ));
                }
            }
            if holder.is_started() || holder.result.initialized() {
                return Err(Error::operation_invalid(format!(
                    "Instance '{}' is already being created",
                    id
                )));
            }
            let mut definition = holder.definition.lock();
            if let Some(priority) = priority {
                definition.priority = priority;
            }
            merge_config(&mut definition.config, config);
            let type_id = holder.type_id.clone();
            drop(definition);
            if let Some(bucket) = registry.by_type.get_mut(&type_id) {
                bucket.sorted = false;
            }
            return Ok(());
        }

        let type_id = normalize_id(type_id.ok_or_else(|| Error::argument_required(TYPE_KEY))?);
        let index = registry.next_index;
        registry.next_index += 1;
        let holder = Arc::new(InstanceHolder {
            id: id.to_string(),
            type_id: type_id.clone(),
            index,
            definition: Mutex::new(Definition {
                priority: priority.unwrap_or(0),
                config: if config.is_null() {
                    Json::Object(Map::new())
                } else {
                    config
                },
            }),
            started: AtomicBool::new(false),
            result: OnceCell::new(),
        });
        registry.by_id.insert(id.to_string(), holder.clone());
        let bucket = registry.by_type.entry(type_id).or_default();
        bucket.holders.push(holder);
        bucket.sorted = false;
        Ok(())
    }

    /// Whether an instance is defined
    pub fn contains(&self, id: &str) -> bool {
        self.registry.lock().by_id.contains_key(id)
    }

    fn holder(&self, id: &str) -> Result<Arc<InstanceHolder>> {
        if id.is_empty() {
            return Err(Error::argument_required("id"));
        }
        self.registry
            .lock()
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| {
                Error::argument_invalid("id", format!("instance '{}' is not defined", id))
            })
    }

    fn holders_of_type(&self, type_id: &str) -> Result<Vec<Arc<InstanceHolder>>> {
        if type_id.is_empty() {
            return Err(Error::argument_required("typeId"));
        }
        let mut registry = self.registry.lock();
        let Some(bucket) = registry.by_type.get_mut(&normalize_id(type_id)) else {
            return Ok(Vec::new());
        };
        if !bucket.sorted {
            bucket.holders.sort_by(|a, b| {
                b.priority()
                    .cmp(&a.priority())
                    .then_with(|| a.index.cmp(&b.index))
            });
            bucket.sorted = true;
        }
        Ok(bucket.holders.clone())
    }

    // ------------------------------------------------------------------------
    // Lookup by id
    // ------------------------------------------------------------------------

    /// Get an instance that has finished loading
    pub fn get_by_id(&self, id: &str) -> Result<Value> {
        let holder = self.holder(id)?;
        holder.finished().unwrap_or_else(|| {
            Err(Error::operation_invalid(format!(
                "Instance '{}' has not been loaded yet",
                holder.id
            )))
        })
    }

    /// Get an instance, creating it if needed
    pub async fn get_by_id_async(&self, id: &str) -> Result<Value> {
        let holder = self.holder(id)?;
        holder.resolve(self).await
    }

    // ------------------------------------------------------------------------
    // Lookup by type
    // ------------------------------------------------------------------------

    /// First loaded instance of a type, in priority order
    ///
    /// Holders that have not finished loading are skipped; a captured failure
    /// is returned.
    pub fn get_by_type(&self, type_id: &str, options: &GetOptions) -> Result<Option<Value>> {
        for holder in self.holders_of_type(type_id)? {
            if let Some(result) = holder.finished() {
                let value = result?;
                if options.accepts(&value) {
                    return Ok(Some(value));
                }
            }
        }
        self.none_found(type_id, options).map(|_| None)
    }

    /// All loaded instances of a type, in priority order
    pub fn get_all_by_type(&self, type_id: &str, options: &GetOptions) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        for holder in self.holders_of_type(type_id)? {
            if let Some(result) = holder.finished() {
                let value = result?;
                if options.accepts(&value) {
                    values.push(value);
                }
            }
        }
        if values.is_empty() {
            self.none_found(type_id, options)?;
        }
        Ok(values)
    }

    /// First instance of a type, in priority order, creating instances as needed
    pub async fn get_by_type_async(
        &self,
        type_id: &str,
        options: &GetOptions,
    ) -> Result<Option<Value>> {
        for holder in self.holders_of_type(type_id)? {
            let value = holder.resolve(self).await?;
            if options.accepts(&value) {
                return Ok(Some(value));
            }
        }
        self.none_found(type_id, options).map(|_| None)
    }

    /// All instances of a type, in priority order, creating them as needed
    pub async fn get_all_by_type_async(
        &self,
        type_id: &str,
        options: &GetOptions,
    ) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        for holder in self.holders_of_type(type_id)? {
            let value = holder.resolve(self).await?;
            if options.accepts(&value) {
                values.push(value);
            }
        }
        if values.is_empty() {
            self.none_found(type_id, options)?;
        }
        Ok(values)
    }

    fn none_found(&self, type_id: &str, options: &GetOptions) -> Result<()> {
        if options.is_required {
            Err(Error::operation_invalid(format!(
                "No instance of type '{}' is defined",
                type_id
            )))
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------------

    async fn create(&self, holder: &InstanceHolder) -> Result<Value> {
        let modules = self.loader.modules().clone();
        let parts = match modules.require_async(&holder.id).await? {
            Module::Factory(parts) => parts,
            _ => {
                return Err(Error::operation_invalid(format!(
                    "Module '{}' is not an instance factory",
                    holder.id
                )))
            }
        };
        let Some((FactoryPart::Function(factory), dependency_parts)) = parts.split_last() else {
            return Err(Error::operation_invalid(format!(
                "The last element of module '{}' must be a factory function",
                holder.id
            )));
        };

        let mut dependencies = Vec::with_capacity(dependency_parts.len());
        for part in dependency_parts {
            match part {
                FactoryPart::Dependency(id) => dependencies.push(modules.require_async(id).await?),
                FactoryPart::Function(_) => {
                    return Err(Error::operation_invalid(format!(
                        "Module '{}' has more than one factory function",
                        holder.id
                    )))
                }
            }
        }

        let instance_type = self
            .loader
            .resolve_type_async(&TypeReference::Id(holder.type_id.clone()))
            .await?;

        let value = factory(FactoryContext {
            id: holder.id.clone(),
            instance_type: instance_type.clone(),
            dependencies,
            config: holder.config(),
        })?;

        if !instance_type.is_instance(&value) {
            return Err(Error::operation_invalid(format!(
                "The factory of '{}' did not return an instance of '{}'",
                holder.id,
                instance_type.label()
            )));
        }
        Ok(value)
    }
}

/// An integer, or a number with no fractional part such as `1.0`
fn whole_number(value: &Json) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// Merge `source` into `target`: objects merge key by key, anything else replaces
pub(crate) fn merge_config(target: &mut Json, source: Json) {
    match (target, source) {
        (_, Json::Null) => {}
        (Json::Object(target), Json::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => merge_config(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pentype_core::ErrorKind;
    use pentype_model::{standard, Type};
    use serde_json::json;

    fn widget_type() -> Type {
        standard()
            .complex
            .extend()
            .id("acme/widget")
            .property(pentype_model::PropertyType::builder("name"))
            .build()
            .unwrap()
    }

    fn container() -> (Arc<ModuleRegistry>, InstancesContainer) {
        let registry = Arc::new(ModuleRegistry::new());
        registry.define_type(&widget_type()).unwrap();
        let loader = Arc::new(Loader::new(registry.clone()));
        (registry, InstancesContainer::new(loader))
    }

    fn widget_factory() -> Module {
        Module::factory(Vec::<String>::new(), |ctx| ctx.instance_type.create(&ctx.config))
    }

    #[test]
    fn test_merge_config() {
        let mut target = json!({"a": {"x": 1, "y": 2}, "b": 1});
        merge_config(&mut target, json!({"a": {"y": 3}, "c": [1]}));
        assert_eq!(target, json!({"a": {"x": 1, "y": 3}, "b": 1, "c": [1]}));
        merge_config(&mut target, Json::Null);
        assert_eq!(target["b"], 1);
    }

    #[test]
    fn test_configure_validation() {
        let (_, container) = container();
        let err = container.configure(&json!({"x": {"priority": 1}})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentRequired);
        let err = container
            .configure(&json!({"x": {"type": "acme/widget", "priority": "high"}}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentInvalidType);
        let err = container.configure(&json!(["x"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentInvalidType);
    }

    #[test]
    fn test_whole_number_priorities() {
        let (_, container) = container();
        container
            .configure(&json!({
                "a": {"type": "acme/widget", "priority": 1.0},
                "b": {"type": "acme/widget", "priority": -3}
            }))
            .unwrap();
        assert_eq!(container.holder("a").unwrap().priority(), 1);
        assert_eq!(container.holder("b").unwrap().priority(), -3);

        let err = container
            .configure(&json!({"c": {"type": "acme/widget", "priority": 1.5}}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentInvalidType);
        assert_eq!(whole_number(&json!(2e3)), Some(2000));
        assert_eq!(whole_number(&json!(1e300)), None);
    }

    #[test]
    fn test_redefinition_merges_and_keeps_type() {
        let (_, container) = container();
        container.define("w", "acme/widget", 1, json!({"name": "a"})).unwrap();
        container.configure(&json!({"w": {"priority": 5, "config": {"extra": true}}})).unwrap();
        let holder = container.holder("w").unwrap();
        assert_eq!(holder.priority(), 5);
        assert_eq!(holder.config(), json!({"name": "a", "extra": true}));

        let err = container.define("w", "acme/other", 0, Json::Null).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentInvalid);
    }

    #[test]
    fn test_unknown_id() {
        let (_, container) = container();
        assert_eq!(
            container.get_by_id("nope").unwrap_err().kind(),
            ErrorKind::ArgumentInvalid
        );
        assert_eq!(container.get_by_id("").unwrap_err().kind(), ErrorKind::ArgumentRequired);
    }

    #[tokio::test]
    async fn test_factory_receives_config() {
        let (registry, container) = container();
        registry.define("w", widget_factory());
        container.define("w", "acme/widget", 0, json!({"name": "main"})).unwrap();
        let value = container.get_by_id_async("w").await.unwrap();
        let name = value.as_complex().unwrap().get_primitive("name").unwrap();
        assert_eq!(name.and_then(|p| p.as_str().map(str::to_string)), Some("main".to_string()));
    }

    #[tokio::test]
    async fn test_wrong_instance_type_is_terminal() {
        let (registry, container) = container();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        registry.define(
            "bad",
            Module::factory(Vec::<String>::new(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                standard().string.create(&json!("not a widget"))
            }),
        );
        container.define("bad", "acme/widget", 0, Json::Null).unwrap();

        let err = container.get_by_id_async("bad").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationInvalid);
        let again = container.get_by_id_async("bad").await.unwrap_err();
        assert_eq!(again, err);
        assert_eq!(container.get_by_id("bad").unwrap_err(), err);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_module_without_factory() {
        let (registry, container) = container();
        registry.define("data", Module::Data(json!(1)));
        registry.define("deps-only", Module::Factory(vec![FactoryPart::Dependency("data".into())]));
        container.define("data", "acme/widget", 0, Json::Null).unwrap();
        container.define("deps-only", "acme/widget", 0, Json::Null).unwrap();

        for id in ["data", "deps-only"] {
            let err = container.get_by_id_async(id).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::OperationInvalid);
        }
    }
}
