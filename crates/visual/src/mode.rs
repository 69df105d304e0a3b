//! Visual role modes
//!
//! A mode is one way of mapping fields to a visual role: the data type the
//! mapped fields must have and whether the role treats them as continuous or
//! categorical. A mode whose data type is a list accepts any number of fields;
//! other modes accept at most one.

use std::fmt;

use pentype_core::{Error, Result};
use pentype_model::{standard, Loader, Type};
use serde_json::{json, Map, Value as Json};

/// Key of the data type of a mode specification
pub const DATA_TYPE: &str = "dataType";
/// Key of the continuity of a mode specification
pub const IS_CONTINUOUS: &str = "isContinuous";

/// Mode of a visual role
#[derive(Clone)]
pub struct Mode {
    data_type: Type,
    is_continuous: bool,
}

impl Mode {
    /// Create a mode; continuity defaults to that of the element data type
    pub fn new(data_type: Type, is_continuous: Option<bool>) -> Self {
        let is_continuous = is_continuous.unwrap_or_else(|| is_continuous_type(&data_type));
        Self {
            data_type,
            is_continuous,
        }
    }

    /// Categorical mode over strings
    pub fn categorical() -> Self {
        Self::new(standard().string.clone(), Some(false))
    }

    /// Create a mode from `"type"`, `["type"]` or `{dataType, isContinuous}`
    pub fn from_spec(loader: &Loader, spec: &Json) -> Result<Self> {
        match spec {
            Json::Object(map) => {
                let data_type = map
                    .get(DATA_TYPE)
                    .filter(|t| !t.is_null())
                    .ok_or_else(|| Error::argument_required(DATA_TYPE))?;
                let is_continuous = match map.get(IS_CONTINUOUS) {
                    None | Some(Json::Null) => None,
                    Some(Json::Bool(b)) => Some(*b),
                    Some(_) => return Err(Error::argument_invalid_type(IS_CONTINUOUS, "a boolean")),
                };
                Ok(Self::new(loader.resolve_type_json(data_type)?, is_continuous))
            }
            Json::Null => Err(Error::argument_required("mode")),
            other => Ok(Self::new(loader.resolve_type_json(other)?, None)),
        }
    }

    /// The data type
    pub fn data_type(&self) -> &Type {
        &self.data_type
    }

    /// Whether the mapped fields are treated as measures
    pub fn is_continuous(&self) -> bool {
        self.is_continuous
    }

    /// Whether any number of fields can be mapped
    pub fn is_list(&self) -> bool {
        self.data_type.is_list()
    }

    /// Type each mapped field must have
    pub fn element_type(&self) -> &Type {
        self.data_type.element_type().unwrap_or(&self.data_type)
    }

    /// Whether fields of the given types can be mapped with this mode
    pub fn can_apply_to_field_types(&self, field_types: &[&Type]) -> bool {
        if !self.is_list() && field_types.len() > 1 {
            return false;
        }
        let element = self.element_type();
        field_types.iter().all(|t| t.is_subtype_of(element))
    }

    /// Whether both modes map the same kind of fields the same way
    ///
    /// List data types are compared by element type.
    pub fn matches(&self, other: &Mode) -> bool {
        self.is_continuous == other.is_continuous
            && self.is_list() == other.is_list()
            && self.element_type() == other.element_type()
    }

    /// Specification of the mode
    ///
    /// Anonymous lists of the standard list type use the `["element"]` shorthand.
    pub fn to_spec(&self) -> Json {
        let data_type = match self.data_type.element_type() {
            Some(element)
                if self.data_type.is_anonymous()
                    && self.data_type.base() == Some(&standard().list) =>
            {
                json!([element.to_ref_in_context()])
            }
            _ => self.data_type.to_ref_in_context(),
        };
        let mut spec = Map::new();
        spec.insert(DATA_TYPE.to_string(), data_type);
        spec.insert(IS_CONTINUOUS.to_string(), json!(self.is_continuous));
        Json::Object(spec)
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mode")
            .field("data_type", &self.data_type.label())
            .field("is_continuous", &self.is_continuous)
            .finish()
    }
}

fn is_continuous_type(data_type: &Type) -> bool {
    let std = standard();
    let element = data_type.element_type().unwrap_or(data_type);
    element.is_subtype_of(&std.number) || element.is_subtype_of(&std.date)
}

/// Resolve a list of mode specifications
pub(crate) fn modes_from_spec(loader: &Loader, spec: &Json) -> Result<Vec<Mode>> {
    match spec {
        Json::Null => Ok(Vec::new()),
        Json::Array(items) => items.iter().map(|m| Mode::from_spec(loader, m)).collect(),
        _ => Err(Error::argument_invalid_type("modes", "an array")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pentype_model::ModuleRegistry;
    use std::sync::Arc;

    fn loader() -> Loader {
        Loader::new(Arc::new(ModuleRegistry::new()))
    }

    #[test]
    fn test_default_continuity() {
        let loader = loader();
        assert!(Mode::from_spec(&loader, &json!("number")).unwrap().is_continuous());
        assert!(!Mode::from_spec(&loader, &json!("string")).unwrap().is_continuous());
        let list = Mode::from_spec(&loader, &json!({"dataType": ["date"]})).unwrap();
        assert!(list.is_list());
        assert!(list.is_continuous());
        let forced = Mode::from_spec(&loader, &json!({"dataType": "number", "isContinuous": false}))
            .unwrap();
        assert!(!forced.is_continuous());
    }

    #[test]
    fn test_field_types() {
        let std = standard();
        let loader = loader();
        let single = Mode::from_spec(&loader, &json!("number")).unwrap();
        assert!(single.can_apply_to_field_types(&[]));
        assert!(single.can_apply_to_field_types(&[&std.number]));
        assert!(!single.can_apply_to_field_types(&[&std.number, &std.number]));
        assert!(!single.can_apply_to_field_types(&[&std.string]));

        let any = Mode::from_spec(&loader, &json!(["element"])).unwrap();
        assert!(any.can_apply_to_field_types(&[&std.string, &std.number, &std.date]));
    }

    #[test]
    fn test_invalid_specs() {
        let loader = loader();
        assert_eq!(
            Mode::from_spec(&loader, &json!({"isContinuous": true})).unwrap_err().kind(),
            pentype_core::ErrorKind::ArgumentRequired
        );
        assert_eq!(
            Mode::from_spec(&loader, &json!({"dataType": "string", "isContinuous": 1}))
                .unwrap_err()
                .kind(),
            pentype_core::ErrorKind::ArgumentInvalidType
        );
    }

    #[test]
    fn test_spec_round_trip() {
        let loader = loader();
        let mode = Mode::from_spec(&loader, &json!({"dataType": ["number"]})).unwrap();
        let spec = mode.to_spec();
        assert_eq!(spec, json!({"dataType": ["number"], "isContinuous": true}));
        let back = Mode::from_spec(&loader, &spec).unwrap();
        assert!(back.matches(&mode));
        assert!(!back.matches(&Mode::from_spec(&loader, &json!("number")).unwrap()));
    }
}
