//! Type references
//!
//! The shapes a type can be referred to by:
//!
//! | shape | JSON | meaning |
//! |-------|------|---------|
//! | id | `"number"`, `"my/type"`, `"_:1"` | alias, permanent or temporary id |
//! | type | n/a | an already resolved type |
//! | list shorthand | `["number"]` | `{"base": "list", "of": "number"}` |
//! | generic spec | `{"base": "complex", "props": [...]}` | an inline type definition |
//! | instance | n/a | never a valid reference, always rejected |

use pentype_core::{Error, Result};
use serde_json::{Map, Value as Json};

use crate::types::Type;
use crate::value::Value;

/// Reference to a type
#[derive(Debug, Clone)]
pub enum TypeReference {
    /// Alias, permanent id or temporary id
    Id(String),
    /// An already resolved type
    Type(Type),
    /// List shorthand: exactly one element type reference
    List(Vec<TypeReference>),
    /// Generic type specification
    Spec(Map<String, Json>),
    /// An instance; not a type reference
    Instance(Value),
}

impl TypeReference {
    /// Read a type reference from JSON
    pub fn from_json(spec: &Json) -> Result<TypeReference> {
        match spec {
            Json::Null => Err(Error::argument_required("typeRef")),
            Json::String(id) if id.is_empty() => Err(Error::argument_required("typeRef")),
            Json::String(id) => Ok(TypeReference::Id(id.clone())),
            Json::Array(items) => Ok(TypeReference::List(
                items
                    .iter()
                    .map(TypeReference::from_json)
                    .collect::<Result<Vec<_>>>()?,
            )),
            Json::Object(map) => Ok(TypeReference::Spec(map.clone())),
            Json::Bool(_) | Json::Number(_) => Err(Error::argument_invalid_type(
                "typeRef",
                "a string, array or object",
            )),
        }
    }
}

impl From<&str> for TypeReference {
    fn from(id: &str) -> Self {
        TypeReference::Id(id.to_string())
    }
}

impl From<String> for TypeReference {
    fn from(id: String) -> Self {
        TypeReference::Id(id)
    }
}

impl From<Type> for TypeReference {
    fn from(ty: Type) -> Self {
        TypeReference::Type(ty)
    }
}

impl From<&Type> for TypeReference {
    fn from(ty: &Type) -> Self {
        TypeReference::Type(ty.clone())
    }
}

impl From<Value> for TypeReference {
    fn from(value: Value) -> Self {
        TypeReference::Instance(value)
    }
}
