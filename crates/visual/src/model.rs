//! Visual models
//!
//! A visual model is a complex value whose visual role properties hold
//! mappings of data table fields. Validation checks every role against the
//! data: field existence, field counts, duplicates and mode compatibility.
//! All problems are collected so that they can be shown at once.

use std::fmt;
use std::sync::Arc;

use pentype_core::{Error, Result};
use pentype_model::{
    standard, Complex, Loader, ModuleRegistry, PropertyBuilder, PropertyType, Type, Value,
};
use serde_json::{json, Value as Json};
use tracing::debug;

use crate::mapping::{mapping_types, normalize_mapping_spec, Mapping};
use crate::mode::Mode;
use crate::role::VisualRole;
use crate::table::DataTable;

/// Type of visual models: a complex type plus its visual roles
pub struct VisualModelType {
    ty: Type,
    roles: Vec<VisualRole>,
    loader: Arc<Loader>,
}

impl VisualModelType {
    /// Start building a model type
    pub fn builder(id: impl Into<String>) -> VisualModelTypeBuilder {
        VisualModelTypeBuilder {
            id: id.into(),
            label: None,
            roles: Vec::new(),
            props: Vec::new(),
            loader: None,
        }
    }

    /// Create a model type from `{id, label, roles: [...]}`
    pub fn from_spec(loader: Arc<Loader>, spec: &Json) -> Result<Self> {
        let map = spec
            .as_object()
            .ok_or_else(|| Error::argument_invalid_type("spec", "an object"))?;
        let id = map
            .get("id")
            .and_then(Json::as_str)
            .ok_or_else(|| Error::argument_required("id"))?;
        let mut builder = VisualModelType::builder(id);
        if let Some(label) = map.get("label").and_then(Json::as_str) {
            builder = builder.label(label);
        }
        match map.get("roles") {
            None | Some(Json::Null) => {}
            Some(Json::Array(roles)) => {
                for role in roles {
                    builder = builder.role(VisualRole::from_spec(&loader, role)?);
                }
            }
            Some(_) => return Err(Error::argument_invalid_type("roles", "an array")),
        }
        builder.loader(loader).build()
    }

    /// The complex type of the model values
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// The visual roles, in declaration order
    pub fn roles(&self) -> &[VisualRole] {
        &self.roles
    }

    /// A visual role by name
    pub fn role(&self, name: &str) -> Option<&VisualRole> {
        self.roles.iter().find(|r| r.name() == name)
    }

    /// Loader used to resolve mode data types
    pub fn loader(&self) -> &Arc<Loader> {
        &self.loader
    }

    /// Expand mapping shorthands of the visual role entries of a model specification
    pub fn normalize_spec(&self, spec: &Json) -> Json {
        match spec {
            Json::Object(map) => {
                let mut map = map.clone();
                for role in &self.roles {
                    if let Some(mapping) = map.get_mut(role.name()) {
                        *mapping = normalize_mapping_spec(mapping);
                    }
                }
                Json::Object(map)
            }
            other => other.clone(),
        }
    }
}

impl fmt::Debug for VisualModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualModelType")
            .field("ty", &self.ty)
            .field("roles", &self.roles)
            .finish()
    }
}

/// Builder of [`VisualModelType`]
pub struct VisualModelTypeBuilder {
    id: String,
    label: Option<String>,
    roles: Vec<VisualRole>,
    props: Vec<PropertyBuilder>,
    loader: Option<Arc<Loader>>,
}

impl VisualModelTypeBuilder {
    /// Set the label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Add a visual role
    pub fn role(mut self, role: VisualRole) -> Self {
        self.roles.push(role);
        self
    }

    /// Add a property that is not a visual role
    pub fn property(mut self, prop: PropertyBuilder) -> Self {
        self.props.push(prop);
        self
    }

    /// Loader used to resolve mode data types; the global registry by default
    pub fn loader(mut self, loader: Arc<Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Build the model type
    pub fn build(self) -> Result<VisualModelType> {
        let mapping = &mapping_types()?.mapping;
        let mut builder = standard().complex.extend().id(self.id);
        if let Some(label) = self.label {
            builder = builder.label(label);
        }
        for (i, role) in self.roles.iter().enumerate() {
            if self.roles[..i].iter().any(|r| r.name() == role.name()) {
                return Err(Error::argument_invalid(
                    "roles",
                    format!("duplicate visual role '{}'", role.name()),
                ));
            }
            builder = builder.property(
                PropertyType::builder(role.name())
                    .label(role.label())
                    .value_type(mapping.clone())
                    .default_value(json!({})),
            );
        }
        for prop in self.props {
            builder = builder.property(prop);
        }
        Ok(VisualModelType {
            ty: builder.build()?,
            roles: self.roles,
            loader: self
                .loader
                .unwrap_or_else(|| Arc::new(Loader::new(ModuleRegistry::global()))),
        })
    }
}

// ============================================================================
// VisualModel
// ============================================================================

/// A visual model value and the data it is mapped against
#[derive(Clone)]
pub struct VisualModel {
    ty: Arc<VisualModelType>,
    value: Complex,
    data: Option<Arc<dyn DataTable>>,
}

impl VisualModel {
    /// Create a model from a specification
    ///
    /// Visual role entries accept the mapping shorthands.
    pub fn new(ty: Arc<VisualModelType>, spec: &Json) -> Result<Self> {
        let spec = ty.normalize_spec(spec);
        let value = Complex::from_spec_in(&ty.loader, &ty.ty, &spec)?;
        Ok(Self {
            ty,
            value,
            data: None,
        })
    }

    /// The model type
    pub fn model_type(&self) -> &Arc<VisualModelType> {
        &self.ty
    }

    /// The model value
    pub fn value(&self) -> &Complex {
        &self.value
    }

    /// The data table
    pub fn data(&self) -> Option<&Arc<dyn DataTable>> {
        self.data.as_ref()
    }

    /// Set the data table
    pub fn set_data(&mut self, data: Option<Arc<dyn DataTable>>) {
        self.data = data;
    }

    /// Builder-style [`VisualModel::set_data`]
    pub fn with_data(mut self, data: Arc<dyn DataTable>) -> Self {
        self.data = Some(data);
        self
    }

    /// Merge a specification into the model
    pub fn configure(&self, spec: &Json) -> Result<()> {
        self.value.configure(&self.ty.normalize_spec(spec))
    }

    /// Specification of the model value
    pub fn to_spec(&self) -> Json {
        Value::Complex(self.value.clone()).to_spec()
    }

    fn role(&self, name: &str) -> Result<&VisualRole> {
        self.ty.role(name).ok_or_else(|| {
            Error::argument_invalid("name", format!("'{}' is not a visual role", name))
        })
    }

    /// Mapping of a visual role; `None` when cleared
    pub fn mapping(&self, role: &str) -> Result<Option<Mapping>> {
        let role = self.role(role)?;
        match self.value.get(role.name())? {
            Some(Value::Complex(c)) => Ok(Some(Mapping::new(c)?)),
            _ => Ok(None),
        }
    }

    /// Current mode of a visual role
    ///
    /// The fixed mode when set, else the first mode accepting the mapped
    /// fields. `None` when no mode applies or the fields cannot be typed.
    pub fn role_mode(&self, role: &str) -> Result<Option<Mode>> {
        let role = self.role(role)?;
        let Some(mapping) = self.mapping(role.name())? else {
            return Ok(None);
        };
        if let Some(fixed) = mapping.mode_fixed(&self.ty.loader)? {
            return Ok(role.find_mode(&fixed).cloned());
        }
        let Some(field_types) = self.field_types(&mapping.field_names()?)? else {
            return Ok(None);
        };
        Ok(role.mode_for_field_types(&field_types).cloned())
    }

    /// Types of the named fields; `None` without data or if a field is unknown
    fn field_types(&self, names: &[String]) -> Result<Option<Vec<&'static Type>>> {
        let Some(data) = &self.data else {
            return Ok(None);
        };
        let mut types = Vec::with_capacity(names.len());
        for name in names {
            match data.column_index(name) {
                Some(i) => types.push(data.column_type(i)?.value_type()),
                None => return Ok(None),
            }
        }
        Ok(Some(types))
    }

    /// Mapped visual roles whose fields identify the visual elements
    pub fn visual_key_roles(&self) -> Result<Vec<&VisualRole>> {
        let mut roles = Vec::new();
        for role in self.ty.roles() {
            let mapped = match self.mapping(role.name())? {
                Some(mapping) => mapping.has_fields()?,
                None => false,
            };
            if mapped && role.is_visual_key(self.role_mode(role.name())?.as_ref()) {
                roles.push(role);
            }
        }
        Ok(roles)
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    /// Collect every validation error; `None` when valid
    pub fn validate(&self) -> Option<Vec<Error>> {
        let mut errors = self.value.validate().unwrap_or_default();
        for role in self.ty.roles() {
            if let Err(e) = self.validate_role(role, &mut errors) {
                errors.push(e);
            }
        }
        if errors.is_empty() {
            None
        } else {
            debug!(
                target: "pentype::visual",
                model = %self.ty.ty.label(),
                errors = errors.len(),
                "Visual model is invalid"
            );
            Some(errors)
        }
    }

    /// Whether the model has no validation errors
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

    fn validate_role(&self, role: &VisualRole, errors: &mut Vec<Error>) -> Result<()> {
        let mapping = self.mapping(role.name())?;
        let names = match &mapping {
            Some(mapping) => mapping.field_names()?,
            None => Vec::new(),
        };

        let range = role.fields_count_range();
        let count_ok = range.contains(names.len());
        if names.len() < range.min {
            if names.is_empty() {
                errors.push(Error::user(format!("Visual role '{}' is required.", role.label())));
            } else {
                errors.push(Error::user(format!(
                    "Visual role '{}' should have at least {} fields.",
                    role.label(),
                    range.min
                )));
            }
        } else if names.len() > range.max {
            errors.push(Error::user(format!(
                "Visual role '{}' should have at most {} fields.",
                role.label(),
                range.max
            )));
        }

        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                errors.push(Error::user(format!(
                    "Field '{}' is mapped more than once to visual role '{}'.",
                    name,
                    role.label()
                )));
            }
        }

        let Some(mapping) = mapping else {
            return Ok(());
        };
        let fixed = mapping.mode_fixed(&self.ty.loader)?;
        if let Some(fixed) = &fixed {
            if role.find_mode(fixed).is_none() {
                errors.push(Error::user(format!(
                    "The fixed mode of visual role '{}' is not one of its modes.",
                    role.label()
                )));
                return Ok(());
            }
        }
        if names.is_empty() {
            return Ok(());
        }

        let Some(data) = &self.data else {
            errors.push(Error::user(format!(
                "Visual role '{}' is mapped but the model has no data.",
                role.label()
            )));
            return Ok(());
        };
        let mut field_types = Vec::with_capacity(names.len());
        for name in &names {
            match data.column_index(name) {
                Some(i) => field_types.push(data.column_type(i)?.value_type()),
                None => errors.push(Error::user(format!(
                    "Field '{}' of visual role '{}' is not defined in the data.",
                    name,
                    role.label()
                ))),
            }
        }
        if field_types.len() < names.len() || !count_ok {
            return Ok(());
        }

        let compatible = match &fixed {
            Some(fixed) => fixed.can_apply_to_field_types(&field_types),
            None => role.mode_for_field_types(&field_types).is_some(),
        };
        if !compatible {
            errors.push(Error::user(format!(
                "The fields of visual role '{}' are not compatible with its {}.",
                role.label(),
                if fixed.is_some() { "fixed mode" } else { "modes" }
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for VisualModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualModel")
            .field("value", &self.value)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pentype_core::ErrorKind;

    fn bar_type() -> Arc<VisualModelType> {
        Arc::new(
            VisualModelType::builder("acme/bar")
                .role(VisualRole::builder("category").required(true).build().unwrap())
                .property(PropertyType::builder("title"))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_roles_become_mapping_properties() {
        let ty = bar_type();
        let prop = ty.ty().get_property("category").unwrap();
        assert_eq!(prop.value_type(), &mapping_types().unwrap().mapping);
        assert!(ty.ty().get_property("title").is_some());
        assert!(ty.role("title").is_none());
    }

    #[test]
    fn test_duplicate_roles() {
        let err = VisualModelType::builder("acme/dup")
            .role(VisualRole::builder("a").build().unwrap())
            .role(VisualRole::builder("a").build().unwrap())
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentInvalid);
    }

    #[test]
    fn test_mapping_shorthand_and_unknown_role() {
        let model = VisualModel::new(bar_type(), &json!({"category": "country", "title": "t"}))
            .unwrap();
        let mapping = model.mapping("category").unwrap().unwrap();
        assert_eq!(mapping.field_names().unwrap(), vec!["country"]);
        assert_eq!(
            model.mapping("title").unwrap_err().kind(),
            ErrorKind::ArgumentInvalid
        );
    }

    #[test]
    fn test_mapped_role_without_data() {
        let model = VisualModel::new(bar_type(), &json!({"category": "country"})).unwrap();
        let errors = model.validate().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::User);
        assert!(model.role_mode("category").unwrap().is_none());
    }
}
