//! Simple values
//!
//! A simple value wraps one primitive converted by its type's cast, plus an
//! optional formatted display string. The primitive is set once: assigning
//! an equal value again is a no-op, assigning a different one fails.

use std::cmp::Ordering;

use pentype_core::{wire, Error, Primitive, Result};
use serde_json::{Map, Value as Json};

use super::SpecOptions;
use crate::types::{standard, Type};

/// Primitive-wrapping value
#[derive(Debug, Clone)]
pub struct Simple {
    ty: Type,
    value: Primitive,
    formatted: Option<String>,
}

impl Simple {
    /// Create a simple value, casting the primitive through the type
    pub fn new(ty: &Type, value: impl Into<Primitive>) -> Result<Simple> {
        check_type(ty)?;
        let value = cast(ty, value.into())?;
        Ok(Simple {
            ty: ty.clone(),
            value,
            formatted: None,
        })
    }

    /// Create a simple value from a specification
    ///
    /// Accepts a bare primitive or the wrapped form `{"v": value, "f": formatted}`.
    pub fn from_spec(ty: &Type, spec: &Json) -> Result<Simple> {
        check_type(ty)?;
        let (raw, formatted) = match spec {
            Json::Object(map) if map.contains_key(wire::VALUE) => (
                map.get(wire::VALUE).unwrap_or(&Json::Null),
                map.get(wire::FORMATTED)
                    .and_then(Json::as_str)
                    .map(str::to_string),
            ),
            other => (other, None),
        };
        Ok(Simple {
            ty: ty.clone(),
            value: ty.to_primitive(raw)?,
            formatted,
        })
    }

    /// Type of the value
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// The primitive
    pub fn value(&self) -> &Primitive {
        &self.value
    }

    /// Formatted display string
    pub fn formatted(&self) -> Option<&str> {
        self.formatted.as_deref()
    }

    /// Replace the formatted display string
    pub fn set_formatted(&mut self, formatted: Option<String>) {
        self.formatted = formatted;
    }

    /// The same value with a formatted display string
    pub fn with_formatted(mut self, formatted: impl Into<String>) -> Self {
        self.formatted = Some(formatted.into());
        self
    }

    /// Assign the primitive again; only an equal value is accepted
    pub fn assign_value(&mut self, value: impl Into<Primitive>) -> Result<()> {
        let value = cast(&self.ty, value.into())?;
        if value == self.value {
            Ok(())
        } else {
            Err(Error::operation_invalid(format!(
                "Cannot change the value of a simple value from '{}' to '{}'",
                self.value, value
            )))
        }
    }

    /// Key: the string form of the primitive
    pub fn key(&self) -> String {
        self.value.key()
    }

    /// Equal when of the same type and with equal primitives
    pub fn is_equal(&self, other: &Simple) -> bool {
        self.ty == other.ty && self.value == other.value
    }

    /// Order by primitive; values of different types are unordered
    pub fn compare(&self, other: &Simple) -> Ordering {
        if self.ty != other.ty {
            return Ordering::Equal;
        }
        self.value.compare(&other.value)
    }

    /// Specification of the value
    ///
    /// The bare primitive, unless the type cannot be inferred from the
    /// declared type, a formatted string is present, or the primitive is an
    /// object; then `{"_": type, "v": value, "f": formatted}` with absent
    /// keys omitted.
    pub fn to_spec_in_context(&self, options: &SpecOptions) -> Json {
        let needs_type = options.force_type
            || options.declared_type.as_ref().is_some_and(|declared| {
                *declared != self.ty
                    && !(declared.is_abstract()
                        && standard().is_inferable(&self.ty)
                        && self.ty.is_subtype_of(declared))
            });
        let formatted = self
            .formatted
            .as_ref()
            .filter(|f| !f.is_empty() && !options.omit_formatted);

        if !needs_type && formatted.is_none() && !self.value.is_object() {
            return self.value.to_json();
        }

        let mut map = Map::new();
        if needs_type {
            map.insert(wire::TYPE.to_string(), self.ty.to_ref_in_context());
        }
        map.insert(wire::VALUE.to_string(), self.value.to_json());
        if let Some(formatted) = formatted {
            map.insert(wire::FORMATTED.to_string(), Json::String(formatted.clone()));
        }
        Json::Object(map)
    }
}

fn check_type(ty: &Type) -> Result<()> {
    if !ty.is_simple() {
        return Err(Error::argument_invalid_type("type", "a simple type"));
    }
    if ty.is_abstract() {
        return Err(Error::operation_invalid(format!(
            "Cannot create an instance of abstract type '{}'",
            ty.label()
        )));
    }
    Ok(())
}

fn cast(ty: &Type, value: Primitive) -> Result<Primitive> {
    ty.cast(&value)?.ok_or_else(|| {
        Error::argument_invalid(
            "value",
            format!("cannot convert '{}' to type '{}'", value, ty.label()),
        )
    })
}
