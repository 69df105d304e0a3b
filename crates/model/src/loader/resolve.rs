//! Type and instance resolution
//!
//! [`Loader`] turns type references into [`Type`]s and instance
//! specifications into [`Value`]s. Ids are looked up, in order, among the
//! temporary ids of the ambient specification context, the standard types,
//! the loader's class cache and finally the module loader.
//!
//! The synchronous operations only see modules that are already loaded. The
//! `_async` variants first walk the reference (or specification) for module
//! ids, load them through [`ModuleLoader::require_async`], and then resolve
//! synchronously.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use pentype_core::{wire, Error, Primitive, Result};
use serde_json::{Map, Value as Json};
use tracing::{debug, trace};

use super::{Module, ModuleLoader, ModuleRegistry, TypeReference};
use crate::spec::{SpecificationContext, SpecificationScope};
use crate::types::{normalize_id, standard, PropertyBuilder, PropertyType, Type};
use crate::value::Value;

/// Resolver of type references and instance specifications
///
/// Clones share the module loader and the class cache.
#[derive(Clone)]
pub struct Loader {
    modules: Arc<dyn ModuleLoader>,
    class_cache: Arc<RwLock<HashMap<String, Type>>>,
}

static GLOBAL_LOADER: Lazy<Loader> = Lazy::new(|| Loader::new(ModuleRegistry::global()));

impl Loader {
    /// Create a loader over a module loader
    pub fn new(modules: Arc<dyn ModuleLoader>) -> Self {
        Self {
            modules,
            class_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The process-wide loader, over the global module registry
    pub fn global() -> &'static Loader {
        &GLOBAL_LOADER
    }

    /// The module loader
    pub fn modules(&self) -> &Arc<dyn ModuleLoader> {
        &self.modules
    }

    /// Register a type in the class cache under its id and alias
    pub fn define_type(&self, ty: &Type) -> Result<()> {
        let id = ty.id().ok_or_else(|| Error::argument_required("id"))?;
        let mut cache = self.class_cache.write();
        cache.insert(id.to_string(), ty.clone());
        if let Some(alias) = ty.alias() {
            cache.insert(alias.to_string(), ty.clone());
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    /// Resolve a type reference
    pub fn resolve_type(&self, reference: &TypeReference) -> Result<Type> {
        match reference {
            TypeReference::Id(id) => self.resolve_id(id),
            TypeReference::Type(ty) => Ok(ty.clone()),
            TypeReference::List(items) => self.resolve_list_shorthand(items),
            TypeReference::Spec(spec) => self.resolve_generic(spec),
            TypeReference::Instance(_) => Err(Error::argument_invalid(
                "typeRef",
                "an instance is not a type reference",
            )),
        }
    }

    /// Resolve a type reference given as JSON
    pub fn resolve_type_json(&self, spec: &Json) -> Result<Type> {
        self.resolve_type(&TypeReference::from_json(spec)?)
    }

    /// Resolve a type reference, loading the modules it refers to first
    pub async fn resolve_type_async(&self, reference: &TypeReference) -> Result<Type> {
        let mut ids = Vec::new();
        self.collect_reference_ids(reference, &mut ids);
        self.preload(ids).await?;
        self.resolve_type(reference)
    }

    fn resolve_id(&self, id: &str) -> Result<Type> {
        if id.is_empty() {
            return Err(Error::argument_required("typeRef"));
        }
        if SpecificationContext::is_id_temporary(Some(id)) {
            return SpecificationContext::current()
                .and_then(|context| context.get(id))
                .ok_or_else(|| {
                    Error::argument_invalid(
                        "typeRef",
                        format!("temporary id '{}' is not defined", id),
                    )
                });
        }
        let id = normalize_id(id);
        if let Some(ty) = standard().get(&id) {
            return Ok(ty.clone());
        }
        if let Some(ty) = self.class_cache.read().get(&id) {
            return Ok(ty.clone());
        }
        let module = self.modules.require(&id)?;
        self.register_module(&id, module)
    }

    fn register_module(&self, id: &str, module: Module) -> Result<Type> {
        match module {
            Module::Type(ty) => {
                if !ty.is_subtype_of(&standard().instance) {
                    return Err(Error::operation_invalid(format!(
                        "module '{}' is not a type of the type system",
                        id
                    )));
                }
                self.class_cache.write().insert(id.to_string(), ty.clone());
                debug!(target: "pentype::loader", id = %id, "Type loaded");
                Ok(ty)
            }
            _ => Err(Error::operation_invalid(format!(
                "module '{}' is not a type",
                id
            ))),
        }
    }

    fn resolve_list_shorthand(&self, items: &[TypeReference]) -> Result<Type> {
        match items {
            [element] => {
                let element = self.resolve_type(element)?;
                standard().list.extend().of(element).build()
            }
            _ => Err(Error::argument_invalid(
                "typeRef",
                "list shorthand must have exactly one element type",
            )),
        }
    }

    fn resolve_generic(&self, spec: &Map<String, Json>) -> Result<Type> {
        let tid = match spec.get(wire::ID) {
            None | Some(Json::Null) => None,
            Some(Json::String(id)) => Some(id.as_str()),
            Some(_) => return Err(Error::argument_invalid_type("id", "a string")),
        };
        if let Some(id) = tid {
            if !SpecificationContext::is_id_temporary(Some(id)) {
                return Err(Error::argument_invalid(
                    "typeRef",
                    format!("a generic type specification cannot define the permanent id '{}'", id),
                ));
            }
        }

        let scope = SpecificationScope::new();
        let result = self.build_generic(scope.context(), tid, spec);
        scope.dispose();
        result
    }

    fn build_generic(
        &self,
        context: &SpecificationContext,
        tid: Option<&str>,
        spec: &Map<String, Json>,
    ) -> Result<Type> {
        if let Some(id) = tid {
            if context.get(id).is_some() {
                return Err(Error::argument_invalid(
                    "typeRef",
                    format!("temporary id '{}' is already defined", id),
                ));
            }
        }

        let base = match spec.get(wire::BASE) {
            Some(base) if !base.is_null() => self.resolve_type_json(base)?,
            _ if spec.contains_key(wire::OF) => standard().list.clone(),
            _ => standard().complex.clone(),
        };

        let mut builder = base.extend();
        if let Some(alias) = string_attr(spec, wire::ALIAS)? {
            builder = builder.alias(alias);
        }
        if let Some(label) = string_attr(spec, wire::LABEL)? {
            builder = builder.label(label);
        }
        if let Some(value) = bool_attr(spec, wire::IS_ABSTRACT)? {
            builder = builder.is_abstract(value);
        }
        if let Some(value) = bool_attr(spec, wire::IS_READ_ONLY)? {
            builder = builder.is_read_only(value);
        }
        if let Some(value) = bool_attr(spec, wire::IS_ENTITY)? {
            builder = builder.is_entity(value);
        }
        if let Some(of) = spec.get(wire::OF).filter(|of| !of.is_null()) {
            builder = builder.of(self.resolve_type_json(of)?);
        }
        match spec.get(wire::MIXINS) {
            None | Some(Json::Null) => {}
            Some(Json::Array(mixins)) => {
                for mixin in mixins {
                    builder = builder.mixin(self.resolve_type_json(mixin)?);
                }
            }
            Some(mixin) => builder = builder.mixin(self.resolve_type_json(mixin)?),
        }
        match spec.get(wire::PROPS) {
            None | Some(Json::Null) => {}
            Some(Json::Array(props)) => {
                for prop in props {
                    builder = builder.property(self.property_from_spec(prop)?);
                }
            }
            Some(_) => return Err(Error::argument_invalid_type("props", "an array")),
        }

        let ty = builder.build()?;
        if let Some(id) = tid {
            context.add(&ty, Some(id))?;
        }
        trace!(
            target: "pentype::loader",
            tid = tid.unwrap_or("<none>"),
            base = %base,
            "Generic type specification resolved"
        );
        Ok(ty)
    }

    fn property_from_spec(&self, spec: &Json) -> Result<PropertyBuilder> {
        let map = match spec {
            Json::String(name) => return Ok(PropertyType::builder(name.as_str())),
            Json::Object(map) => map,
            _ => return Err(Error::argument_invalid_type("props", "a string or an object")),
        };
        let name = string_attr(map, wire::NAME)?.ok_or_else(|| Error::argument_required("name"))?;
        let mut builder = PropertyType::builder(name);
        if let Some(value_type) = map.get(wire::VALUE_TYPE).filter(|v| !v.is_null()) {
            builder = builder.value_type(self.resolve_type_json(value_type)?);
        }
        if let Some(label) = string_attr(map, wire::LABEL)? {
            builder = builder.label(label);
        }
        if let Some(value) = bool_attr(map, wire::IS_REQUIRED)? {
            builder = builder.required(value);
        }
        if let Some(value) = count_attr(map, wire::COUNT_MIN)? {
            builder = builder.count_min(value);
        }
        if let Some(value) = count_attr(map, wire::COUNT_MAX)? {
            builder = builder.count_max(value);
        }
        if let Some(value) = bool_attr(map, wire::IS_READ_ONLY)? {
            builder = builder.read_only(value);
        }
        if let Some(value) = bool_attr(map, wire::IS_APPLICABLE)? {
            builder = builder.applicable(value);
        }
        if let Some(default) = map.get(wire::DEFAULT_VALUE).filter(|v| !v.is_null()) {
            builder = builder.default_value(default.clone());
        }
        Ok(builder)
    }

    // ------------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------------

    /// Determine the type of the instance an instance specification describes
    ///
    /// An inline type (`"_"`) must be a concrete subtype of `base`. Without
    /// one, a bare string, number or boolean maps to its standard type when
    /// `base` is absent or abstract and admits it; otherwise a concrete
    /// `base` is used as is.
    pub fn resolve_instance(&self, spec: &Json, base: Option<&Type>) -> Result<Type> {
        if let Some(inline) = spec.as_object().and_then(|map| map.get(wire::TYPE)) {
            let ty = self.resolve_type_json(inline)?;
            if let Some(base) = base {
                if !ty.is_subtype_of(base) {
                    return Err(Error::operation_invalid(format!(
                        "Type '{}' is not a subtype of '{}'",
                        ty.label(),
                        base.label()
                    )));
                }
            }
            if ty.is_abstract() {
                return Err(Error::operation_invalid(format!(
                    "Cannot create an instance of abstract type '{}'",
                    ty.label()
                )));
            }
            return Ok(ty);
        }

        match base {
            Some(base) if !base.is_abstract() => Ok(base.clone()),
            _ => {
                let std = standard();
                Primitive::from_json(spec)
                    .as_ref()
                    .and_then(|value| std.for_primitive(value))
                    .filter(|ty| base.map_or(true, |base| ty.is_subtype_of(base)))
                    .cloned()
                    .ok_or_else(|| {
                        Error::operation_invalid(
                            "Cannot create an instance of an unspecified or abstract type",
                        )
                    })
            }
        }
    }

    /// Resolve an instance specification, loading the modules it refers to first
    pub async fn resolve_instance_async(&self, spec: &Json, base: Option<&Type>) -> Result<Type> {
        let mut ids = Vec::new();
        self.collect_instance_ids(spec, &mut ids);
        self.preload(ids).await?;
        self.resolve_instance(spec, base)
    }

    /// Create an instance from a specification
    ///
    /// Temporary ids defined by inline types anywhere in the specification
    /// are visible to the rest of it.
    pub fn create_instance(&self, spec: &Json, base: Option<&Type>) -> Result<Value> {
        if spec.is_null() {
            return Err(Error::argument_required("value"));
        }
        let scope = SpecificationScope::new();
        let result = self
            .resolve_instance(spec, base)
            .and_then(|ty| ty.create_in(self, spec));
        scope.dispose();
        result
    }

    /// Create an instance, loading the modules it refers to first
    pub async fn create_instance_async(&self, spec: &Json, base: Option<&Type>) -> Result<Value> {
        let mut ids = Vec::new();
        self.collect_instance_ids(spec, &mut ids);
        self.preload(ids).await?;
        self.create_instance(spec, base)
    }

    // ------------------------------------------------------------------------
    // Preloading
    // ------------------------------------------------------------------------

    async fn preload(&self, ids: Vec<String>) -> Result<()> {
        for id in ids {
            if self.class_cache.read().contains_key(&id) {
                continue;
            }
            let module = self.modules.require_async(&id).await?;
            self.register_module(&id, module)?;
        }
        Ok(())
    }

    fn push_module_id(&self, id: &str, out: &mut Vec<String>) {
        if id.is_empty() || SpecificationContext::is_id_temporary(Some(id)) {
            return;
        }
        let id = normalize_id(id);
        if standard().get(&id).is_some()
            || self.class_cache.read().contains_key(&id)
            || out.contains(&id)
        {
            return;
        }
        out.push(id);
    }

    fn collect_reference_ids(&self, reference: &TypeReference, out: &mut Vec<String>) {
        match reference {
            TypeReference::Id(id) => self.push_module_id(id, out),
            TypeReference::List(items) => {
                for item in items {
                    self.collect_reference_ids(item, out);
                }
            }
            TypeReference::Spec(spec) => self.collect_spec_ids(spec, out),
            TypeReference::Type(_) | TypeReference::Instance(_) => {}
        }
    }

    fn collect_json_ids(&self, reference: &Json, out: &mut Vec<String>) {
        if let Ok(reference) = TypeReference::from_json(reference) {
            self.collect_reference_ids(&reference, out);
        }
    }

    fn collect_spec_ids(&self, spec: &Map<String, Json>, out: &mut Vec<String>) {
        for key in [wire::BASE, wire::OF] {
            if let Some(reference) = spec.get(key) {
                self.collect_json_ids(reference, out);
            }
        }
        match spec.get(wire::MIXINS) {
            Some(Json::Array(mixins)) => {
                for mixin in mixins {
                    self.collect_json_ids(mixin, out);
                }
            }
            Some(mixin) => self.collect_json_ids(mixin, out),
            None => {}
        }
        if let Some(Json::Array(props)) = spec.get(wire::PROPS) {
            for prop in props {
                if let Some(value_type) = prop.get(wire::VALUE_TYPE) {
                    self.collect_json_ids(value_type, out);
                }
            }
        }
    }

    fn collect_instance_ids(&self, spec: &Json, out: &mut Vec<String>) {
        match spec {
            Json::Object(map) => {
                for (key, value) in map {
                    if key == wire::TYPE {
                        self.collect_json_ids(value, out);
                    } else {
                        self.collect_instance_ids(value, out);
                    }
                }
            }
            Json::Array(items) => {
                for item in items {
                    self.collect_instance_ids(item, out);
                }
            }
            _ => {}
        }
    }
}

fn string_attr(map: &Map<String, Json>, name: &str) -> Result<Option<String>> {
    match map.get(name) {
        None | Some(Json::Null) => Ok(None),
        Some(Json::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(Error::argument_invalid_type(name, "a string")),
    }
}

fn bool_attr(map: &Map<String, Json>, name: &str) -> Result<Option<bool>> {
    match map.get(name) {
        None | Some(Json::Null) => Ok(None),
        Some(Json::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(Error::argument_invalid_type(name, "a boolean")),
    }
}

fn count_attr(map: &Map<String, Json>, name: &str) -> Result<Option<usize>> {
    match map.get(name) {
        None | Some(Json::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| Error::argument_invalid_type(name, "a non-negative integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pentype_core::{ErrorKind, Primitive};
    use serde_json::json;

    fn loader() -> Loader {
        Loader::new(Arc::new(ModuleRegistry::new()))
    }

    #[test]
    fn test_resolve_standard_aliases() {
        let loader = loader();
        let std = standard();
        assert_eq!(loader.resolve_type_json(&json!("number")).unwrap(), std.number);
        assert_eq!(
            loader.resolve_type_json(&json!("pentaho/type/complex")).unwrap(),
            std.complex
        );
    }

    #[test]
    fn test_resolve_list_shorthand() {
        let loader = loader();
        let ty = loader.resolve_type_json(&json!(["string"])).unwrap();
        assert!(ty.is_list());
        assert_eq!(ty.element_type(), Some(&standard().string));
        let err = loader.resolve_type_json(&json!(["string", "number"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentInvalid);
    }

    #[test]
    fn test_resolve_instance_is_rejected() {
        let loader = loader();
        let value = standard().number.create(&json!(1)).unwrap();
        let err = loader.resolve_type(&TypeReference::from(value)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentInvalid);
    }

    #[test]
    fn test_resolve_module_type_and_cache() {
        let registry = Arc::new(ModuleRegistry::new());
        let person = standard().complex.extend().id("my/person").build().unwrap();
        registry.define_type(&person).unwrap();
        registry.define("my/data", Module::Data(json!(1)));
        let loader = Loader::new(registry);

        assert_eq!(loader.resolve_type_json(&json!("my/person")).unwrap(), person);
        assert_eq!(loader.resolve_type_json(&json!("my/person")).unwrap(), person);
        let err = loader.resolve_type_json(&json!("my/data")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationInvalid);
        let err = loader.resolve_type_json(&json!("my/missing")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentInvalid);
    }

    #[test]
    fn test_generic_spec_defaults() {
        let loader = loader();
        let complex = loader.resolve_type_json(&json!({"props": ["a"]})).unwrap();
        assert!(complex.is_complex());
        assert_eq!(complex.get_property("a").unwrap().value_type(), &standard().string);

        let list = loader.resolve_type_json(&json!({"of": "number"})).unwrap();
        assert!(list.is_list());
        assert_eq!(list.element_type(), Some(&standard().number));
    }

    #[test]
    fn test_generic_spec_rejects_permanent_id() {
        let err = loader()
            .resolve_type_json(&json!({"id": "my/thing", "base": "complex"}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentInvalid);
    }

    #[test]
    fn test_generic_spec_temporary_ids_are_scoped() {
        let loader = loader();
        let ty = loader
            .resolve_type_json(&json!({
                "props": [
                    {"name": "a", "valueType": {"id": "_:2", "base": "complex"}},
                    {"name": "b", "valueType": "_:2"},
                    {"name": "c", "valueType": ["_:2"]}
                ]
            }))
            .unwrap();
        let a = ty.get_property("a").unwrap().value_type();
        assert_eq!(ty.get_property("b").unwrap().value_type(), a);
        assert_eq!(ty.get_property("c").unwrap().element_type(), *a);
        // Not visible outside the resolution
        assert!(loader.resolve_type_json(&json!("_:2")).is_err());
    }

    #[test]
    fn test_generic_spec_duplicate_temporary_id() {
        let loader = loader();
        let scope = SpecificationScope::new();
        loader.resolve_type_json(&json!({"id": "_:7"})).unwrap();
        let err = loader.resolve_type_json(&json!({"id": "_:7"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentInvalid);
        scope.dispose();
    }

    #[test]
    fn test_property_spec_attributes() {
        let ty = loader()
            .resolve_type_json(&json!({
                "props": [{
                    "name": "tags",
                    "valueType": ["string"],
                    "label": "Tags",
                    "isRequired": true,
                    "countMin": 1,
                    "countMax": 3,
                    "defaultValue": ["a"]
                }]
            }))
            .unwrap();
        let prop = ty.get_property("tags").unwrap();
        assert_eq!(prop.label(), "Tags");
        assert!(prop.is_list());
        assert_eq!(prop.attributes().count_max().constant(), Some(3));
        assert_eq!(prop.default_value(), Some(&json!(["a"])));

        let err = loader()
            .resolve_type_json(&json!({"props": [{"name": "a", "countMin": -1}]}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentInvalidType);
    }

    #[test]
    fn test_type_spec_round_trip() {
        let std = standard();
        let original = std
            .complex
            .extend()
            .label("Pair")
            .property(PropertyType::builder("left").value_type(std.number.clone()))
            .property(PropertyType::builder("right").value_type(std.number.clone()).required(true))
            .build()
            .unwrap();
        let spec = original.to_spec();
        let loaded = loader().resolve_type_json(&spec).unwrap();
        assert_ne!(loaded, original);
        assert_eq!(loaded.to_spec(), spec);
    }

    #[test]
    fn test_resolve_instance_rules() {
        let loader = loader();
        let std = standard();
        assert_eq!(loader.resolve_instance(&json!("a"), None).unwrap(), std.string);
        assert_eq!(loader.resolve_instance(&json!(1), Some(&std.simple)).unwrap(), std.number);
        assert_eq!(loader.resolve_instance(&json!("1"), Some(&std.number)).unwrap(), std.number);
        assert_eq!(
            loader.resolve_instance(&json!({"_": "boolean", "v": true}), Some(&std.element)).unwrap(),
            std.boolean
        );

        let err = loader.resolve_instance(&json!({"a": 1}), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationInvalid);
        let err = loader
            .resolve_instance(&json!({"_": "number", "v": 1}), Some(&std.string))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationInvalid);
        let err = loader.resolve_instance(&json!({"_": "simple", "v": 1}), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationInvalid);
        // A string does not satisfy an abstract base it is not a subtype of
        let abstract_complex = std.complex.extend().is_abstract(true).build().unwrap();
        let err = loader
            .resolve_instance(&json!("a"), Some(&abstract_complex))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationInvalid);
    }

    #[test]
    fn test_resolve_instance_infers_by_primitive_kind() {
        let loader = loader();
        let std = standard();
        assert_eq!(loader.resolve_instance(&json!(true), None).unwrap(), std.boolean);
        assert_eq!(loader.resolve_instance(&json!(2.5), Some(&std.element)).unwrap(), std.number);
        assert_eq!(loader.resolve_instance(&json!("x"), Some(&std.simple)).unwrap(), std.string);
        for spec in [Json::Null, json!([1, 2]), json!({"v": 1})] {
            let err = loader.resolve_instance(&spec, Some(&std.simple)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::OperationInvalid);
        }
    }

    #[test]
    fn test_create_instance_with_inline_list_type() {
        let value = loader()
            .create_instance(&json!({"_": ["number"], "d": [1, 2, 3]}), None)
            .unwrap();
        let list = value.as_list().unwrap();
        assert_eq!(list.count(), 3);
        assert_eq!(list.at(0).and_then(|v| v.primitive().cloned()), Some(Primitive::from(1)));
    }

    #[test]
    fn test_create_instance_requires_spec() {
        let err = loader().create_instance(&Json::Null, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentRequired);
    }

    #[tokio::test]
    async fn test_async_resolution_loads_deferred_modules() {
        let registry = Arc::new(ModuleRegistry::new());
        registry.define_deferred("my/point", || async {
            let std = standard();
            std.complex
                .extend()
                .id("my/point")
                .property(PropertyType::builder("x").value_type(std.number.clone()))
                .build()
                .map(Module::Type)
        });
        let loader = Loader::new(registry);

        let err = loader.resolve_type_json(&json!("my/point")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationInvalid);

        let value = loader
            .create_instance_async(&json!({"_": "my/point", "x": 1}), None)
            .await
            .unwrap();
        assert_eq!(value.ty().id(), Some("my/point"));
        assert!(loader.resolve_type_json(&json!("my/point")).is_ok());
    }
}
