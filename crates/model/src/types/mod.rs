//! Type descriptors
//!
//! A [`Type`] is a runtime descriptor, not a language-level type. Types form a
//! single-inheritance tree rooted at the standard `instance` type:
//!
//! ```text
//! instance
//! └── value
//!     ├── element
//!     │   ├── simple
//!     │   │   ├── string, number, boolean, date, object
//!     │   └── complex
//!     └── list
//! ```
//!
//! Types are immutable once built and cheap to clone (`Arc`). Identity is the
//! handle itself: two independently built types with identical contents are
//! different types.

pub mod property;
pub mod standard;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pentype_core::{wire, Error, Primitive, PrimitiveKind, Result};
use serde_json::{Map, Value as Json};

use crate::loader::Loader;
use crate::spec::{SpecificationContext, SpecificationScope};
use crate::value::{Complex, InstanceInput, List, Simple, Value};

pub use property::{
    CountRange, DynamicAttribute, Evaluator, OwnerFn, PropertyBuilder, PropertyType, UNBOUNDED,
};
pub use standard::{normalize_id, standard, StandardTypes};

static NEXT_TYPE_UID: AtomicU64 = AtomicU64::new(1);

/// Conversion of a primitive into the canonical primitive of a simple type
///
/// Returning `Ok(None)` means "cannot convert"; returning an error surfaces it
/// verbatim.
pub type CastFn = Arc<dyn Fn(&Primitive) -> Result<Option<Primitive>> + Send + Sync>;

/// Family of a type, fixed by its root lineage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    /// The root `instance` type
    Instance,
    /// The abstract `value` type
    Value,
    /// The abstract `element` type
    Element,
    /// Primitive-wrapping types
    Simple,
    /// Property-bearing types
    Complex,
    /// Ordered collections of elements
    List,
}

/// Handle to a type descriptor
#[derive(Clone)]
pub struct Type(Arc<TypeInner>);

pub(crate) struct TypeInner {
    uid: u64,
    id: Option<String>,
    alias: Option<String>,
    label: Option<String>,
    base: Option<Type>,
    is_abstract: bool,
    is_read_only: bool,
    is_entity: bool,
    family: TypeFamily,
    primitive: Option<PrimitiveKind>,
    cast: Option<CastFn>,
    element_type: Option<Type>,
    props: Vec<PropertyType>,
    own_props: Vec<String>,
    key_property: Option<String>,
}

pub(crate) struct RootSpec {
    pub name: &'static str,
    pub base: Option<Type>,
    pub family: TypeFamily,
    pub is_abstract: bool,
    pub primitive: Option<PrimitiveKind>,
    pub element_type: Option<Type>,
}

impl Type {
    pub(crate) fn standard_type(spec: RootSpec) -> Type {
        Type(Arc::new(TypeInner {
            uid: NEXT_TYPE_UID.fetch_add(1, Ordering::Relaxed),
            id: Some(format!("{}{}", standard::ID_PREFIX, spec.name)),
            alias: Some(spec.name.to_string()),
            label: None,
            base: spec.base,
            is_abstract: spec.is_abstract,
            is_read_only: false,
            is_entity: false,
            family: spec.family,
            primitive: spec.primitive,
            cast: None,
            element_type: spec.element_type,
            props: Vec::new(),
            own_props: Vec::new(),
            key_property: None,
        }))
    }

    /// Unique number of this type within the process
    pub fn uid(&self) -> u64 {
        self.0.uid
    }

    /// Permanent identifier, if any
    pub fn id(&self) -> Option<&str> {
        self.0.id.as_deref()
    }

    /// Short alias, if any
    pub fn alias(&self) -> Option<&str> {
        self.0.alias.as_deref()
    }

    /// Alias if defined, else permanent id
    pub fn short_id(&self) -> Option<&str> {
        self.alias().or_else(|| self.id())
    }

    /// Whether the type is anonymous (has no permanent id)
    pub fn is_anonymous(&self) -> bool {
        self.0.id.is_none()
    }

    /// Display label
    pub fn label(&self) -> String {
        match (&self.0.label, self.short_id()) {
            (Some(label), _) => label.clone(),
            (None, Some(id)) => id.to_string(),
            (None, None) => format!("#{}", self.0.uid),
        }
    }

    /// Direct ancestor
    pub fn base(&self) -> Option<&Type> {
        self.0.base.as_ref()
    }

    /// Whether the type cannot be instantiated
    pub fn is_abstract(&self) -> bool {
        self.0.is_abstract
    }

    /// Whether instances of the type cannot be modified
    pub fn is_read_only(&self) -> bool {
        self.0.is_read_only
    }

    /// Whether instances are entities (identified by key)
    pub fn is_entity(&self) -> bool {
        self.0.is_entity
    }

    /// Family of the type
    pub fn family(&self) -> TypeFamily {
        self.0.family
    }

    /// Whether the type is a simple type
    pub fn is_simple(&self) -> bool {
        self.0.family == TypeFamily::Simple
    }

    /// Whether the type is a complex type
    pub fn is_complex(&self) -> bool {
        self.0.family == TypeFamily::Complex
    }

    /// Whether the type is a list type
    pub fn is_list(&self) -> bool {
        self.0.family == TypeFamily::List
    }

    /// Whether values of the type can be list elements
    pub fn is_element(&self) -> bool {
        matches!(
            self.0.family,
            TypeFamily::Element | TypeFamily::Simple | TypeFamily::Complex
        )
    }

    /// Primitive kind of a simple type
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        self.ancestors().find_map(|t| t.0.primitive)
    }

    /// Element type of a list type
    pub fn element_type(&self) -> Option<&Type> {
        self.0.element_type.as_ref()
    }

    /// Properties of a complex type, inherited ones included
    pub fn props(&self) -> &[PropertyType] {
        &self.0.props
    }

    /// Property by name
    pub fn get_property(&self, name: &str) -> Option<&PropertyType> {
        self.0.props.iter().find(|p| p.name == name)
    }

    /// Key property of an entity complex type
    pub fn key_property(&self) -> Option<String> {
        self.ancestors().find_map(|t| t.0.key_property.clone())
    }

    /// This type followed by all its ancestors
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: Some(self.clone()),
        }
    }

    /// Whether this type is `other` or descends from it
    pub fn is_subtype_of(&self, other: &Type) -> bool {
        self.ancestors().any(|t| t == *other)
    }

    /// Whether a value is an instance of this type
    pub fn is_instance(&self, value: &Value) -> bool {
        value.ty().is_subtype_of(self)
    }

    /// Start building a subtype
    pub fn extend(&self) -> TypeBuilder {
        TypeBuilder::new(self.clone())
    }

    // ------------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------------

    /// Create an instance from a specification, resolving inline types with the global loader
    pub fn create(&self, spec: &Json) -> Result<Value> {
        self.create_in(Loader::global(), spec)
    }

    /// Create an instance from a specification using the given loader
    pub fn create_in(&self, loader: &Loader, spec: &Json) -> Result<Value> {
        if self.is_abstract() {
            return Err(Error::operation_invalid(format!(
                "Cannot create an instance of abstract type '{}'",
                self.label()
            )));
        }
        match self.family() {
            TypeFamily::Simple => Ok(Value::Simple(Simple::from_spec(self, spec)?)),
            TypeFamily::Complex => Ok(Value::Complex(Complex::from_spec_in(loader, self, spec)?)),
            TypeFamily::List => Ok(Value::List(List::from_spec_in(loader, self, spec)?)),
            _ => Err(Error::operation_invalid(format!(
                "Cannot create an instance of type '{}'",
                self.label()
            ))),
        }
    }

    /// Convert an input into an instance of this type, using the global loader
    pub fn to(&self, input: impl Into<InstanceInput>) -> Result<Value> {
        self.to_in(Loader::global(), input.into())
    }

    /// Convert an input into an instance of this type
    ///
    /// Instances of this type are returned as is; simple instances of other
    /// types are converted through their primitive; specifications are
    /// resolved (honoring inline types) and created.
    pub fn to_in(&self, loader: &Loader, input: InstanceInput) -> Result<Value> {
        match input {
            InstanceInput::Value(value) => {
                if self.is_instance(&value) {
                    return Ok(value);
                }
                match (&value, self.is_simple() && !self.is_abstract()) {
                    (Value::Simple(s), true) => {
                        Ok(Value::Simple(Simple::new(self, s.value().clone())?))
                    }
                    _ => Err(Error::argument_invalid_type(
                        "value",
                        format!("an instance of '{}'", self.label()),
                    )),
                }
            }
            InstanceInput::Spec(spec) => loader.create_instance(&spec, Some(self)),
        }
    }

    /// Convert a raw JSON value into the canonical primitive of a simple type
    ///
    /// `null` is rejected as a missing argument. A cast that cannot convert
    /// yields an argument-invalid error; a cast that raises a user error
    /// propagates it.
    pub fn to_primitive(&self, raw: &Json) -> Result<Primitive> {
        if raw.is_null() {
            return Err(Error::argument_required("value"));
        }
        let primitive = Primitive::from_json(raw).ok_or_else(|| self.cannot_convert(raw))?;
        self.cast(&primitive)?
            .ok_or_else(|| self.cannot_convert(raw))
    }

    /// Cast a primitive through the nearest custom cast, or the default one of the primitive kind
    pub fn cast(&self, value: &Primitive) -> Result<Option<Primitive>> {
        if let Some(cast) = self.ancestors().find_map(|t| t.0.cast.clone()) {
            return cast(value);
        }
        match self.primitive_kind() {
            Some(kind) => Ok(standard::default_cast(kind, value)),
            None => Ok(Some(value.clone())),
        }
    }

    fn cannot_convert(&self, raw: &Json) -> Error {
        Error::argument_invalid(
            "value",
            format!("cannot convert {} to type '{}'", raw, self.label()),
        )
    }

    // ------------------------------------------------------------------------
    // Specification
    // ------------------------------------------------------------------------

    /// Reference to this type within the current specification context
    ///
    /// Permanent types are referenced by short id; anonymous types already
    /// emitted in the context by temporary id; others by a full specification.
    pub fn to_ref_in_context(&self) -> Json {
        if let Some(id) = self.short_id() {
            return Json::String(id.to_string());
        }
        let scope = SpecificationScope::new();
        let reference = match scope.context().get_id_of(self) {
            Some(tid) => Json::String(tid),
            None => self.to_spec_in_context(scope.context()),
        };
        scope.dispose();
        reference
    }

    /// Full specification of this type, registering anonymous types in a new context
    pub fn to_spec(&self) -> Json {
        let scope = SpecificationScope::new();
        let spec = self.to_spec_in_context(scope.context());
        scope.dispose();
        spec
    }

    /// Full specification of this type within a specification context
    pub fn to_spec_in_context(&self, context: &SpecificationContext) -> Json {
        let mut map = Map::new();
        let id = match self.id() {
            Some(id) => id.to_string(),
            None => context.add_anonymous(self),
        };
        map.insert(wire::ID.to_string(), Json::String(id));
        if let Some(alias) = &self.0.alias {
            map.insert(wire::ALIAS.to_string(), Json::String(alias.clone()));
        }
        if let Some(base) = self.base() {
            map.insert(wire::BASE.to_string(), base.to_ref_in_context());
        }
        if let Some(label) = &self.0.label {
            map.insert(wire::LABEL.to_string(), Json::String(label.clone()));
        }
        if self.is_abstract() {
            map.insert(wire::IS_ABSTRACT.to_string(), Json::Bool(true));
        }
        if self.is_read_only() {
            map.insert(wire::IS_READ_ONLY.to_string(), Json::Bool(true));
        }
        if self.is_entity() {
            map.insert(wire::IS_ENTITY.to_string(), Json::Bool(true));
        }
        if let Some(of) = self.element_type() {
            let inherited = self.base().and_then(|b| b.element_type());
            if inherited != Some(of) {
                map.insert(wire::OF.to_string(), of.to_ref_in_context());
            }
        }
        if !self.0.own_props.is_empty() {
            let props = self
                .0
                .own_props
                .iter()
                .filter_map(|name| self.get_property(name))
                .map(property_spec)
                .collect();
            map.insert(wire::PROPS.to_string(), Json::Array(props));
        }
        Json::Object(map)
    }
}

fn property_spec(prop: &PropertyType) -> Json {
    let mut map = Map::new();
    map.insert(wire::NAME.to_string(), Json::String(prop.name.clone()));
    map.insert(wire::VALUE_TYPE.to_string(), prop.value_type.to_ref_in_context());
    if let Some(label) = &prop.label {
        map.insert(wire::LABEL.to_string(), Json::String(label.clone()));
    }
    let attrs = prop.attributes();
    if let Some(true) = attrs.is_required().constant() {
        map.insert(wire::IS_REQUIRED.to_string(), Json::Bool(true));
    }
    if let Some(min) = attrs.count_min().constant().filter(|m| *m > 0) {
        map.insert(wire::COUNT_MIN.to_string(), Json::from(min));
    }
    if let Some(max) = attrs.count_max().constant().filter(|m| *m != UNBOUNDED) {
        map.insert(wire::COUNT_MAX.to_string(), Json::from(max));
    }
    if let Some(true) = attrs.is_read_only().constant() {
        map.insert(wire::IS_READ_ONLY.to_string(), Json::Bool(true));
    }
    if let Some(default) = &prop.default_value {
        map.insert(wire::DEFAULT_VALUE.to_string(), default.clone());
    }
    Json::Object(map)
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.uid.hash(state);
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "Type({})", id),
            None => write!(f, "Type(<anonymous #{}>)", self.0.uid),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Iterator over a type and its ancestors
pub struct Ancestors {
    next: Option<Type>,
}

impl Iterator for Ancestors {
    type Item = Type;

    fn next(&mut self) -> Option<Type> {
        let current = self.next.take()?;
        self.next = current.base().cloned();
        Some(current)
    }
}

// ============================================================================
// TypeBuilder
// ============================================================================

/// Builder of a subtype
///
/// # Example
///
/// ```ignore
/// let person = standard().complex.extend()
///     .id("my/person")
///     .property(PropertyType::builder("name").value_type(standard().string.clone()).required(true))
///     .property(PropertyType::builder("age").value_type(standard().number.clone()))
///     .build()?;
/// ```
pub struct TypeBuilder {
    base: Type,
    id: Option<String>,
    alias: Option<String>,
    label: Option<String>,
    is_abstract: bool,
    is_read_only: Option<bool>,
    is_entity: Option<bool>,
    element_type: Option<Type>,
    mixins: Vec<Type>,
    props: Vec<PropertyBuilder>,
    cast: Option<CastFn>,
    key_property: Option<String>,
}

impl TypeBuilder {
    fn new(base: Type) -> Self {
        Self {
            base,
            id: None,
            alias: None,
            label: None,
            is_abstract: false,
            is_read_only: None,
            is_entity: None,
            element_type: None,
            mixins: Vec::new(),
            props: Vec::new(),
            cast: None,
            key_property: None,
        }
    }

    /// Permanent identifier
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Short alias
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Display label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Mark the type abstract (not inherited)
    pub fn is_abstract(mut self, value: bool) -> Self {
        self.is_abstract = value;
        self
    }

    /// Mark instances read-only (inherited unless overridden)
    pub fn is_read_only(mut self, value: bool) -> Self {
        self.is_read_only = Some(value);
        self
    }

    /// Mark instances as entities (inherited unless overridden)
    pub fn is_entity(mut self, value: bool) -> Self {
        self.is_entity = Some(value);
        self
    }

    /// Element type of a list type
    pub fn of(mut self, element_type: Type) -> Self {
        self.element_type = Some(element_type);
        self
    }

    /// Merge the properties of a complex mixin type
    pub fn mixin(mut self, mixin: Type) -> Self {
        self.mixins.push(mixin);
        self
    }

    /// Declare a property, or override an inherited one
    pub fn property(mut self, prop: PropertyBuilder) -> Self {
        self.props.push(prop);
        self
    }

    /// Custom cast of a simple type
    pub fn cast(
        mut self,
        cast: impl Fn(&Primitive) -> Result<Option<Primitive>> + Send + Sync + 'static,
    ) -> Self {
        self.cast = Some(Arc::new(cast));
        self
    }

    /// Key property of an entity complex type
    pub fn key_property(mut self, name: impl Into<String>) -> Self {
        self.key_property = Some(name.into());
        self
    }

    /// Build the type
    pub fn build(self) -> Result<Type> {
        let base = self.base;
        let family = base.family();

        if let Some(id) = &self.id {
            if id.is_empty() {
                return Err(Error::argument_required("id"));
            }
            if SpecificationContext::is_id_temporary(Some(id)) {
                return Err(Error::argument_invalid(
                    "id",
                    "temporary ids are assigned by a specification context",
                ));
            }
        }

        if !self.is_abstract
            && matches!(
                family,
                TypeFamily::Instance | TypeFamily::Value | TypeFamily::Element
            )
        {
            return Err(Error::argument_invalid(
                "base",
                format!("a concrete type cannot derive directly from '{}'", base.label()),
            ));
        }

        let element_type = match self.element_type {
            Some(of) => {
                if family != TypeFamily::List {
                    return Err(Error::argument_invalid("of", "only list types have an element type"));
                }
                if !of.is_element() {
                    return Err(Error::argument_invalid(
                        "of",
                        format!("'{}' is not an element type", of.label()),
                    ));
                }
                if let Some(inherited) = base.element_type() {
                    if !of.is_subtype_of(inherited) {
                        return Err(Error::argument_invalid(
                            "of",
                            format!(
                                "'{}' is not a subtype of the inherited element type '{}'",
                                of.label(),
                                inherited.label()
                            ),
                        ));
                    }
                }
                Some(of)
            }
            None => base.element_type().cloned(),
        };

        if self.cast.is_some() && family != TypeFamily::Simple {
            return Err(Error::argument_invalid("cast", "only simple types can be cast"));
        }

        let mut props: Vec<PropertyType> = base.props().to_vec();
        let mut own_props: Vec<String> = Vec::new();
        if (!self.mixins.is_empty() || !self.props.is_empty()) && family != TypeFamily::Complex {
            return Err(Error::argument_invalid("props", "only complex types have properties"));
        }

        for mixin in &self.mixins {
            if !mixin.is_complex() {
                return Err(Error::argument_invalid(
                    "mixins",
                    format!("'{}' is not a complex type", mixin.label()),
                ));
            }
            for prop in mixin.props() {
                if props.iter().any(|p| p.name == prop.name) {
                    continue;
                }
                props.push(prop.clone());
                own_props.push(prop.name.clone());
            }
        }

        for builder in self.props {
            if builder.name.is_empty() {
                return Err(Error::argument_required("name"));
            }
            match props.iter().position(|p| p.name == builder.name) {
                Some(pos) => {
                    let inherited = props[pos].clone();
                    if let Some(vt) = &builder.value_type {
                        if !vt.is_subtype_of(&inherited.value_type) {
                            return Err(Error::argument_invalid(
                                "valueType",
                                format!(
                                    "property '{}' can only be overridden with a subtype of '{}'",
                                    builder.name,
                                    inherited.value_type.label()
                                ),
                            ));
                        }
                    }
                    if !own_props.contains(&builder.name) {
                        own_props.push(builder.name.clone());
                    }
                    props[pos] = builder.apply_to(inherited);
                }
                None => {
                    let value_type = builder
                        .value_type
                        .clone()
                        .unwrap_or_else(|| standard().string.clone());
                    if !value_type.is_element() && !value_type.is_list() {
                        return Err(Error::argument_invalid(
                            "valueType",
                            format!("'{}' cannot be the value type of a property", value_type.label()),
                        ));
                    }
                    let name = builder.name.clone();
                    props.push(builder.apply_to(PropertyType::new(name.clone(), value_type)));
                    own_props.push(name);
                }
            }
        }
        for (index, prop) in props.iter_mut().enumerate() {
            prop.index = index;
        }

        let mut is_entity = self.is_entity.unwrap_or(base.is_entity());
        if let Some(key) = &self.key_property {
            if !props.iter().any(|p| &p.name == key && !p.is_list()) {
                return Err(Error::argument_invalid(
                    "keyProperty",
                    format!("'{}' is not an element property", key),
                ));
            }
            is_entity = true;
        }

        Ok(Type(Arc::new(TypeInner {
            uid: NEXT_TYPE_UID.fetch_add(1, Ordering::Relaxed),
            id: self.id,
            alias: self.alias,
            label: self.label,
            is_read_only: self.is_read_only.unwrap_or(base.is_read_only()),
            base: Some(base),
            is_abstract: self.is_abstract,
            is_entity,
            family,
            primitive: None,
            cast: self.cast,
            element_type,
            props,
            own_props,
            key_property: self.key_property,
        })))
    }
}
