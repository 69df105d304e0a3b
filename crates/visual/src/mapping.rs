//! Mapping types
//!
//! The value of a visual role property is a mapping: the list of data table
//! fields mapped to the role and, optionally, the mode the role must use.
//!
//! ```text
//! mapping
//! ├── fields: [mappingField { name }]
//! └── modeFixed: mode        (simple, object-valued)
//! ```

use once_cell::sync::Lazy;
use pentype_core::{Error, Primitive, Result};
use pentype_model::{standard, Complex, Loader, PropertyType, Type, Value};
use serde_json::{json, Map, Value as Json};

use crate::mode::{Mode, DATA_TYPE};

/// Id prefix of the visual role types
pub const ROLE_ID_PREFIX: &str = "pentaho/visual/role/";

/// Name of the fields property of a mapping
pub const FIELDS: &str = "fields";
/// Name of the fixed mode property of a mapping
pub const MODE_FIXED: &str = "modeFixed";
/// Name of the name property of a mapping field
pub const FIELD_NAME: &str = "name";

/// The types of the mapping layer
pub struct MappingTypes {
    /// One mapped field
    pub field: Type,
    /// Mode specifications, as simple object values
    pub mode: Type,
    /// Fields and fixed mode of a visual role
    pub mapping: Type,
}

static MAPPING_TYPES: Lazy<Option<MappingTypes>> = Lazy::new(|| MappingTypes::create().ok());

/// The mapping types of this process
pub fn mapping_types() -> Result<&'static MappingTypes> {
    MAPPING_TYPES
        .as_ref()
        .ok_or_else(|| Error::operation_invalid("The mapping types could not be built"))
}

impl MappingTypes {
    fn create() -> Result<Self> {
        let std = standard();
        let field = std
            .complex
            .extend()
            .id(format!("{}mappingField", ROLE_ID_PREFIX))
            .property(
                PropertyType::builder(FIELD_NAME)
                    .value_type(std.string.clone())
                    .required(true),
            )
            .build()?;
        let mode = std
            .object
            .extend()
            .id(format!("{}mode", ROLE_ID_PREFIX))
            .cast(|value| match value {
                Primitive::Object(map) if map.get(DATA_TYPE).map_or(false, |t| !t.is_null()) => {
                    Ok(Some(value.clone()))
                }
                _ => Ok(None),
            })
            .build()?;
        let mapping = std
            .complex
            .extend()
            .id(format!("{}mapping", ROLE_ID_PREFIX))
            .property(
                PropertyType::builder(FIELDS)
                    .value_type(std.list.extend().of(field.clone()).build()?),
            )
            .property(PropertyType::builder(MODE_FIXED).value_type(mode.clone()))
            .build()?;
        Ok(Self {
            field,
            mode,
            mapping,
        })
    }
}

/// Expand the shorthand forms of a mapping specification
///
/// `"a"` and `["a", "b"]` stand for the listed fields; field entries may be
/// names instead of `{"name": ...}` objects.
pub fn normalize_mapping_spec(spec: &Json) -> Json {
    match spec {
        Json::String(_) => normalize_mapping_spec(&json!({ FIELDS: [spec] })),
        Json::Array(_) => normalize_mapping_spec(&json!({ FIELDS: spec })),
        Json::Object(map) => {
            let mut map = map.clone();
            if let Some(Json::Array(fields)) = map.get(FIELDS) {
                let fields = fields
                    .iter()
                    .map(|f| match f {
                        Json::String(name) => json!({ FIELD_NAME: name }),
                        other => other.clone(),
                    })
                    .collect();
                map.insert(FIELDS.to_string(), Json::Array(fields));
            }
            Json::Object(map)
        }
        other => other.clone(),
    }
}

/// Read access to a mapping value
#[derive(Debug, Clone)]
pub struct Mapping(Complex);

impl Mapping {
    /// Wrap a mapping value
    pub fn new(value: Complex) -> Result<Self> {
        if !value.ty().is_subtype_of(&mapping_types()?.mapping) {
            return Err(Error::argument_invalid_type("mapping", "a mapping value"));
        }
        Ok(Self(value))
    }

    /// The mapping value
    pub fn value(&self) -> &Complex {
        &self.0
    }

    /// Names of the mapped fields, in order
    pub fn field_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for field in self.0.get_list(FIELDS)?.to_vec() {
            let name = match &field {
                Value::Complex(c) => c.get_primitive(FIELD_NAME)?,
                _ => None,
            };
            if let Some(name) = name.as_ref().and_then(Primitive::as_str) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Whether any field is mapped
    pub fn has_fields(&self) -> Result<bool> {
        Ok(!self.0.get_list(FIELDS)?.is_empty())
    }

    /// The fixed mode, if any
    pub fn mode_fixed(&self, loader: &Loader) -> Result<Option<Mode>> {
        match self.0.get_primitive(MODE_FIXED)? {
            Some(Primitive::Object(spec)) => Ok(Some(Mode::from_spec(loader, &Json::Object(spec))?)),
            Some(_) => Err(Error::argument_invalid_type(MODE_FIXED, "a mode")),
            None => Ok(None),
        }
    }

    /// Fix the mode of the mapping; `None` restores automatic selection
    pub fn set_mode_fixed(&self, mode: Option<&Mode>) -> Result<()> {
        let spec = mode.map_or(Json::Null, Mode::to_spec);
        self.0.set(MODE_FIXED, spec)
    }

    /// Replace the mapped fields
    pub fn set_field_names<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<Json> = names
            .into_iter()
            .map(|n| {
                let mut field = Map::new();
                field.insert(FIELD_NAME.to_string(), Json::String(n.into()));
                Json::Object(field)
            })
            .collect();
        self.0.set(FIELDS, Json::Array(fields))
    }
}
