//! Visual roles
//!
//! A visual role is a property of a visual model whose value is a mapping. The
//! role declares the modes it supports, how many fields it accepts and
//! whether its fields identify the visual elements (the visual key).

use pentype_core::{Error, Result};
use pentype_model::types::UNBOUNDED;
use pentype_model::{CountRange, Loader, Type};
use serde_json::Value as Json;

use crate::mode::{modes_from_spec, Mode};

/// Visual role of a visual model
///
/// # Example
///
/// ```ignore
/// let role = VisualRole::builder("measures")
///     .mode(Mode::from_spec(loader, &json!(["number"]))?)
///     .required(true)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct VisualRole {
    name: String,
    label: Option<String>,
    modes: Vec<Mode>,
    is_required: bool,
    is_visual_key: Option<bool>,
    count_min: usize,
    count_max: usize,
}

impl VisualRole {
    /// Start building a role
    pub fn builder(name: impl Into<String>) -> VisualRoleBuilder {
        VisualRoleBuilder {
            role: VisualRole {
                name: name.into(),
                label: None,
                modes: Vec::new(),
                is_required: false,
                is_visual_key: None,
                count_min: 0,
                count_max: UNBOUNDED,
            },
        }
    }

    /// Create a role from
    /// `{name, label, modes, isRequired, isVisualKey, fields: {countMin, countMax}}`
    pub fn from_spec(loader: &Loader, spec: &Json) -> Result<Self> {
        let map = spec
            .as_object()
            .ok_or_else(|| Error::argument_invalid_type("role", "an object"))?;
        let name = map
            .get("name")
            .and_then(Json::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::argument_required("name"))?;
        let mut builder = VisualRole::builder(name);
        if let Some(label) = map.get("label").and_then(Json::as_str) {
            builder = builder.label(label);
        }
        for mode in modes_from_spec(loader, map.get("modes").unwrap_or(&Json::Null))? {
            builder = builder.mode(mode);
        }
        if let Some(required) = bool_attr(map.get("isRequired"), "isRequired")? {
            builder = builder.required(required);
        }
        if let Some(key) = bool_attr(map.get("isVisualKey"), "isVisualKey")? {
            builder = builder.visual_key(key);
        }
        if let Some(fields) = map.get("fields").and_then(Json::as_object) {
            if let Some(min) = count_attr(fields.get("countMin"), "countMin")? {
                builder = builder.fields_count_min(min);
            }
            if let Some(max) = count_attr(fields.get("countMax"), "countMax")? {
                builder = builder.fields_count_max(max);
            }
        }
        builder.build()
    }

    /// Name of the model property
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display label
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Supported modes, in preference order
    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    /// Whether at least one field must be mapped
    pub fn is_required(&self) -> bool {
        self.is_required
    }

    /// Whether any mode accepts several fields
    pub fn has_any_list_modes(&self) -> bool {
        self.modes.iter().any(Mode::is_list)
    }

    /// Whether any mode is continuous
    pub fn has_any_continuous_modes(&self) -> bool {
        self.modes.iter().any(Mode::is_continuous)
    }

    /// Whether any mode is categorical
    pub fn has_any_categorical_modes(&self) -> bool {
        self.modes.iter().any(|m| !m.is_continuous())
    }

    /// Whether the fields of the role identify visual elements when mapped with `mode`
    ///
    /// Unless declared, a role is a visual key when its mode is categorical.
    pub fn is_visual_key(&self, mode: Option<&Mode>) -> bool {
        match (self.is_visual_key, mode) {
            (Some(declared), _) => declared,
            (None, Some(mode)) => !mode.is_continuous(),
            (None, None) => self.has_any_categorical_modes(),
        }
    }

    /// Accepted number of fields
    ///
    /// Roles without list modes accept at most one field; required roles at
    /// least one.
    pub fn fields_count_range(&self) -> CountRange {
        let max = if self.has_any_list_modes() {
            self.count_max
        } else {
            self.count_max.min(1)
        };
        let min = if self.is_required {
            self.count_min.max(1)
        } else {
            self.count_min
        };
        CountRange {
            min: min.min(max),
            max,
        }
    }

    /// First mode, in preference order, that accepts fields of the given types
    pub fn mode_for_field_types(&self, field_types: &[&Type]) -> Option<&Mode> {
        self.modes
            .iter()
            .find(|m| m.can_apply_to_field_types(field_types))
    }

    /// The declared mode matching `mode`, if any
    pub fn find_mode(&self, mode: &Mode) -> Option<&Mode> {
        self.modes.iter().find(|m| m.matches(mode))
    }
}

/// Builder of [`VisualRole`]
#[derive(Debug)]
pub struct VisualRoleBuilder {
    role: VisualRole,
}

impl VisualRoleBuilder {
    /// Set the label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.role.label = Some(label.into());
        self
    }

    /// Add a mode
    pub fn mode(mut self, mode: Mode) -> Self {
        self.role.modes.push(mode);
        self
    }

    /// Require at least one field
    pub fn required(mut self, value: bool) -> Self {
        self.role.is_required = value;
        self
    }

    /// Declare whether the role is a visual key
    pub fn visual_key(mut self, value: bool) -> Self {
        self.role.is_visual_key = Some(value);
        self
    }

    /// Minimum number of fields
    pub fn fields_count_min(mut self, value: usize) -> Self {
        self.role.count_min = value;
        self
    }

    /// Maximum number of fields
    pub fn fields_count_max(mut self, value: usize) -> Self {
        self.role.count_max = value;
        self
    }

    /// Build the role; roles without modes get a categorical string mode
    pub fn build(mut self) -> Result<VisualRole> {
        if self.role.name.is_empty() {
            return Err(Error::argument_required("name"));
        }
        if self.role.modes.is_empty() {
            self.role.modes.push(Mode::categorical());
        }
        if self.role.count_max < self.role.count_min {
            return Err(Error::argument_invalid(
                "fields",
                format!(
                    "countMax {} is less than countMin {}",
                    self.role.count_max, self.role.count_min
                ),
            ));
        }
        Ok(self.role)
    }
}

fn bool_attr(value: Option<&Json>, name: &str) -> Result<Option<bool>> {
    match value {
        None | Some(Json::Null) => Ok(None),
        Some(Json::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(Error::argument_invalid_type(name, "a boolean")),
    }
}

fn count_attr(value: Option<&Json>, name: &str) -> Result<Option<usize>> {
    match value {
        None | Some(Json::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| Error::argument_invalid_type(name, "a non-negative integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pentype_model::{standard, ModuleRegistry};
    use serde_json::json;
    use std::sync::Arc;

    fn loader() -> Loader {
        Loader::new(Arc::new(ModuleRegistry::new()))
    }

    #[test]
    fn test_defaults() {
        let role = VisualRole::builder("color").build().unwrap();
        assert_eq!(role.modes().len(), 1);
        assert!(role.has_any_categorical_modes());
        assert!(role.is_visual_key(None));
        assert_eq!(role.fields_count_range(), CountRange { min: 0, max: 1 });
        assert_eq!(role.label(), "color");
    }

    #[test]
    fn test_count_range() {
        let loader = loader();
        let role = VisualRole::from_spec(
            &loader,
            &json!({
                "name": "rows",
                "modes": [["string"]],
                "isRequired": true,
                "fields": {"countMax": 3}
            }),
        )
        .unwrap();
        assert!(role.has_any_list_modes());
        assert_eq!(role.fields_count_range(), CountRange { min: 1, max: 3 });

        let err = VisualRole::from_spec(
            &loader,
            &json!({"name": "x", "fields": {"countMin": 2, "countMax": 1}}),
        )
        .unwrap_err();
        assert_eq!(err.kind(), pentype_core::ErrorKind::ArgumentInvalid);
    }

    #[test]
    fn test_visual_key_follows_mode() {
        let loader = loader();
        let role = VisualRole::from_spec(
            &loader,
            &json!({"name": "x", "modes": ["number", "string"]}),
        )
        .unwrap();
        let std = standard();
        let numeric = role.mode_for_field_types(&[&std.number]).unwrap();
        assert!(numeric.is_continuous());
        assert!(!role.is_visual_key(Some(numeric)));
        let text = role.mode_for_field_types(&[&std.string]).unwrap();
        assert!(role.is_visual_key(Some(text)));
        assert!(role.mode_for_field_types(&[&std.boolean]).is_none());

        let declared = VisualRole::from_spec(
            &loader,
            &json!({"name": "y", "modes": ["number"], "isVisualKey": true}),
        )
        .unwrap();
        assert!(declared.is_visual_key(declared.modes().first()));
    }

    #[test]
    fn test_invalid_specs() {
        let loader = loader();
        assert!(VisualRole::from_spec(&loader, &json!({"modes": []})).is_err());
        assert!(VisualRole::from_spec(&loader, &json!({"name": "a", "isRequired": "yes"})).is_err());
        assert!(VisualRole::from_spec(&loader, &json!({"name": "a", "modes": "string"})).is_err());
    }
}
