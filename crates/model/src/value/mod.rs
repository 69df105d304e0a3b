//! Values
//!
//! Instances of the type system:
//! - [`Simple`]: one immutable primitive plus an optional formatted string
//! - [`Complex`]: a bag of typed properties
//! - [`List`]: an ordered collection of elements, unique by key
//!
//! Complex and list values are shared handles; mutations go through the
//! ambient transaction and are visible to other handles once committed.

pub mod complex;
pub mod list;
pub mod simple;

use std::cmp::Ordering;
use std::fmt;

use pentype_core::{Error, Primitive, Result};
use serde_json::{Map, Value as Json};

use crate::spec::SpecificationScope;
use crate::types::Type;

pub use complex::Complex;
pub(crate) use list::ListState;
pub use list::List;
pub use simple::Simple;

/// An instance of a value type
#[derive(Clone)]
pub enum Value {
    /// Primitive-wrapping value
    Simple(Simple),
    /// Property-bearing value
    Complex(Complex),
    /// Ordered collection
    List(List),
}

impl Value {
    /// Type of the value
    pub fn ty(&self) -> &Type {
        match self {
            Value::Simple(v) => v.ty(),
            Value::Complex(v) => v.ty(),
            Value::List(v) => v.ty(),
        }
    }

    /// Identity of the value among values of the same type
    pub fn key(&self) -> String {
        match self {
            Value::Simple(v) => v.key(),
            Value::Complex(v) => v.key(),
            Value::List(v) => v.uid().to_string(),
        }
    }

    /// Unique number of a complex or list value
    pub fn uid(&self) -> Option<u64> {
        match self {
            Value::Simple(_) => None,
            Value::Complex(v) => Some(v.uid()),
            Value::List(v) => Some(v.uid()),
        }
    }

    /// Identity equality: same type and same key
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Simple(a), Value::Simple(b)) => a.is_equal(b),
            (Value::Complex(a), Value::Complex(b)) => {
                a.ptr_eq(b) || (a.ty() == b.ty() && a.ty().is_entity() && a.key() == b.key())
            }
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Content equality: same type and equal contents
    pub fn equals_content(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Simple(a), Value::Simple(b)) => {
                a.is_equal(b) && a.formatted() == b.formatted()
            }
            (Value::Complex(a), Value::Complex(b)) => a.equals_content(b),
            (Value::List(a), Value::List(b)) => a.equals_content(b),
            _ => false,
        }
    }

    /// Ordering of simple values; other values are unordered
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Simple(a), Value::Simple(b)) => a.compare(b),
            _ => Ordering::Equal,
        }
    }

    /// Primitive of a simple value
    pub fn primitive(&self) -> Option<&Primitive> {
        match self {
            Value::Simple(v) => Some(v.value()),
            _ => None,
        }
    }

    /// As a simple value
    pub fn as_simple(&self) -> Option<&Simple> {
        match self {
            Value::Simple(v) => Some(v),
            _ => None,
        }
    }

    /// As a complex value
    pub fn as_complex(&self) -> Option<&Complex> {
        match self {
            Value::Complex(v) => Some(v),
            _ => None,
        }
    }

    /// As a list value
    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Collect validation errors; `None` when valid
    pub fn validate(&self) -> Option<Vec<Error>> {
        match self {
            Value::Simple(_) => None,
            Value::Complex(v) => v.validate(),
            Value::List(v) => v.validate(),
        }
    }

    /// Whether the value is valid
    pub fn is_valid(&self) -> bool {
        self.validate().is_none()
    }

    /// Fail with the first validation error
    pub fn assert_valid(&self) -> Result<()> {
        match self.validate().and_then(|errors| errors.into_iter().next()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Merge a specification into a complex or list value
    pub fn configure(&self, spec: &Json) -> Result<()> {
        match self {
            Value::Simple(_) => Err(Error::operation_invalid(
                "Simple values are immutable",
            )),
            Value::Complex(v) => v.configure(spec),
            Value::List(v) => v.configure(spec.clone()),
        }
    }

    /// Specification of the value with default options
    pub fn to_spec(&self) -> Json {
        self.to_spec_with(&SpecOptions::default())
    }

    /// Specification of the value in a new or the ambient specification scope
    pub fn to_spec_with(&self, options: &SpecOptions) -> Json {
        let scope = SpecificationScope::new();
        let spec = self.to_spec_in_context(options);
        scope.dispose();
        spec
    }

    /// Specification of the value within the ambient specification context
    pub fn to_spec_in_context(&self, options: &SpecOptions) -> Json {
        match self {
            Value::Simple(v) => v.to_spec_in_context(options),
            Value::Complex(v) => v.to_spec_in_context(options),
            Value::List(v) => v.to_spec_in_context(options),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Simple(v) => write!(f, "Simple({}: {})", v.ty().label(), v.value()),
            Value::Complex(v) => write!(f, "Complex({} #{})", v.ty().label(), v.uid()),
            Value::List(v) => write!(f, "List({} #{}, {} elements)", v.ty().label(), v.uid(), v.count()),
        }
    }
}

impl From<Simple> for Value {
    fn from(v: Simple) -> Self {
        Value::Simple(v)
    }
}

impl From<Complex> for Value {
    fn from(v: Complex) -> Self {
        Value::Complex(v)
    }
}

impl From<List> for Value {
    fn from(v: List) -> Self {
        Value::List(v)
    }
}

// ============================================================================
// Inputs
// ============================================================================

/// Input convertible into an instance of a type
#[derive(Debug, Clone)]
pub enum InstanceInput {
    /// An existing value
    Value(Value),
    /// A value specification
    Spec(Json),
}

impl From<Value> for InstanceInput {
    fn from(v: Value) -> Self {
        InstanceInput::Value(v)
    }
}

impl From<Simple> for InstanceInput {
    fn from(v: Simple) -> Self {
        InstanceInput::Value(Value::Simple(v))
    }
}

impl From<Complex> for InstanceInput {
    fn from(v: Complex) -> Self {
        InstanceInput::Value(Value::Complex(v))
    }
}

impl From<List> for InstanceInput {
    fn from(v: List) -> Self {
        InstanceInput::Value(Value::List(v))
    }
}

impl From<Json> for InstanceInput {
    fn from(v: Json) -> Self {
        InstanceInput::Spec(v)
    }
}

impl From<Primitive> for InstanceInput {
    fn from(v: Primitive) -> Self {
        InstanceInput::Spec(v.to_json())
    }
}

impl From<&str> for InstanceInput {
    fn from(v: &str) -> Self {
        InstanceInput::Spec(Json::from(v))
    }
}

impl From<String> for InstanceInput {
    fn from(v: String) -> Self {
        InstanceInput::Spec(Json::from(v))
    }
}

impl From<bool> for InstanceInput {
    fn from(v: bool) -> Self {
        InstanceInput::Spec(Json::from(v))
    }
}

impl From<i32> for InstanceInput {
    fn from(v: i32) -> Self {
        InstanceInput::Spec(Json::from(v))
    }
}

impl From<i64> for InstanceInput {
    fn from(v: i64) -> Self {
        InstanceInput::Spec(Json::from(v))
    }
}

impl From<f64> for InstanceInput {
    fn from(v: f64) -> Self {
        InstanceInput::Spec(Json::from(v))
    }
}

/// Zero or more element inputs of a list operation
#[derive(Debug, Clone, Default)]
pub struct Fragment(pub(crate) Vec<InstanceInput>);

impl Fragment {
    /// Number of inputs
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there is no input
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<InstanceInput> for Fragment {
    /// Lists contribute their elements, arrays their items, typed list
    /// specifications (`_` and an array `d` only) their data; `null` is empty;
    /// anything else is one element.
    fn from(input: InstanceInput) -> Self {
        match input {
            InstanceInput::Value(Value::List(list)) => {
                Fragment(list.to_vec().into_iter().map(InstanceInput::Value).collect())
            }
            InstanceInput::Value(v) => Fragment(vec![InstanceInput::Value(v)]),
            InstanceInput::Spec(spec) => Fragment::from(spec),
        }
    }
}

impl From<Json> for Fragment {
    fn from(spec: Json) -> Self {
        match spec {
            Json::Null => Fragment::default(),
            Json::Array(items) => Fragment(items.into_iter().map(InstanceInput::Spec).collect()),
            Json::Object(mut map) if is_typed_list_spec(&map) => {
                match map.remove(pentype_core::wire::DATA) {
                    Some(data) => Fragment::from(data),
                    None => Fragment::default(),
                }
            }
            other => Fragment(vec![InstanceInput::Spec(other)]),
        }
    }
}

/// `{"_": type, "d": [...]}`; objects with other keys are element specifications
fn is_typed_list_spec(map: &Map<String, Json>) -> bool {
    map.len() == 2
        && map.contains_key(pentype_core::wire::TYPE)
        && matches!(map.get(pentype_core::wire::DATA), Some(Json::Array(_)))
}

impl From<Value> for Fragment {
    fn from(v: Value) -> Self {
        Fragment::from(InstanceInput::Value(v))
    }
}

impl From<Vec<Value>> for Fragment {
    fn from(values: Vec<Value>) -> Self {
        Fragment(values.into_iter().map(InstanceInput::Value).collect())
    }
}

impl From<Vec<InstanceInput>> for Fragment {
    fn from(inputs: Vec<InstanceInput>) -> Self {
        Fragment(inputs)
    }
}

impl From<&str> for Fragment {
    fn from(v: &str) -> Self {
        Fragment(vec![v.into()])
    }
}

// ============================================================================
// Serialization options
// ============================================================================

/// Options of value serialization
#[derive(Debug, Clone, Default)]
pub struct SpecOptions {
    /// Statically known type of the value; the inline type is omitted when it can be inferred
    pub declared_type: Option<Type>,
    /// Always emit the inline type
    pub force_type: bool,
    /// Never emit formatted strings
    pub omit_formatted: bool,
    /// Emit empty properties too
    pub include_defaults: bool,
}

impl SpecOptions {
    /// The same options with another declared type
    pub fn declared(&self, ty: &Type) -> SpecOptions {
        SpecOptions {
            declared_type: Some(ty.clone()),
            force_type: false,
            ..self.clone()
        }
    }

    /// Whether a value of type `ty` needs an inline type reference
    pub(crate) fn needs_type(&self, ty: &Type) -> bool {
        self.force_type
            || self
                .declared_type
                .as_ref()
                .is_some_and(|declared| declared != ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::standard;
    use serde_json::json;

    #[test]
    fn test_fragment_from_json() {
        assert_eq!(Fragment::from(json!(null)).len(), 0);
        assert_eq!(Fragment::from(json!([1, 2, 3])).len(), 3);
        assert_eq!(Fragment::from(json!({"_": ["number"], "d": [1, 2]})).len(), 2);
        assert_eq!(Fragment::from(json!({"a": 1})).len(), 1);
        assert_eq!(Fragment::from(json!(5)).len(), 1);
    }

    #[test]
    fn test_simple_equality_requires_same_type() {
        let std = standard();
        let a = std.number.to(5).unwrap();
        let b = std.number.to(5).unwrap();
        let c = std.string.to("5").unwrap();
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
        assert_eq!(a.key(), c.key());
    }

    #[test]
    fn test_complex_identity_vs_content() {
        let ty = standard()
            .complex
            .extend()
            .property(crate::types::PropertyType::builder("name"))
            .build()
            .unwrap();
        let a = ty.create(&json!({"name": "x"})).unwrap();
        let b = ty.create(&json!({"name": "x"})).unwrap();
        assert!(!a.equals(&b));
        assert!(a.equals(&a.clone()));
        assert!(a.equals_content(&b));
    }

    #[test]
    fn test_assert_valid_returns_first_error() {
        let ty = standard()
            .complex
            .extend()
            .property(crate::types::PropertyType::builder("a").required(true))
            .property(crate::types::PropertyType::builder("b").required(true))
            .build()
            .unwrap();
        let v = ty.create(&json!({})).unwrap();
        let errors = v.validate().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(v.assert_valid().unwrap_err(), errors[0]);
        assert!(!v.is_valid());
    }

    #[test]
    fn test_simple_values_cannot_be_configured() {
        let v = standard().number.to(1).unwrap();
        assert!(v.configure(&json!(2)).is_err());
    }
}
