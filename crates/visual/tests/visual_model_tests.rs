//! Visual model validation tests
//!
//! A scatter-like model validated against an in-memory sales table:
//! - field existence, counts and duplicates
//! - automatic and fixed modes
//! - visual key roles

use std::sync::Arc;

use pentype_core::ErrorKind;
use pentype_model::{Loader, ModuleRegistry};
use pentype_visual::{DataTable, MemoryTable, Mode, VisualModel, VisualModelType};
use serde_json::json;

fn sales() -> Arc<dyn DataTable> {
    Arc::new(
        MemoryTable::from_json(&json!({
            "model": [
                {"name": "country", "type": "string"},
                {"name": "product", "type": "string"},
                {"name": "sales", "type": "number"},
                {"name": "quantity", "type": "number"},
                {"name": "closed", "type": "boolean"}
            ],
            "rows": [
                ["PT", "bikes", 1200, 4, true],
                ["ES", "cars", 800, 1, false]
            ]
        }))
        .unwrap(),
    )
}

fn scatter_type() -> Arc<VisualModelType> {
    let loader = Arc::new(Loader::new(Arc::new(ModuleRegistry::new())));
    Arc::new(
        VisualModelType::from_spec(
            loader,
            &json!({
                "id": "acme/scatter",
                "roles": [
                    {"name": "rows", "modes": [["string"]], "isRequired": true},
                    {"name": "x", "modes": ["number"], "isRequired": true},
                    {"name": "color", "modes": ["string", "number"]},
                    {"name": "size", "modes": [["number"]], "fields": {"countMax": 2}}
                ]
            }),
        )
        .unwrap(),
    )
}

fn model(spec: serde_json::Value) -> VisualModel {
    VisualModel::new(scatter_type(), &spec).unwrap().with_data(sales())
}

#[test]
fn test_valid_model() {
    let model = model(json!({"rows": ["country", "product"], "x": "sales"}));
    assert!(model.validate().is_none(), "{:?}", model.validate());
    assert!(model.assert_valid().is_ok());
}

#[test]
fn test_all_problems_are_collected() {
    let model = model(json!({
        "rows": ["country", "country"],
        "color": ["country", "product"],
        "size": ["sales", "quantity", "missing"]
    }));
    let errors = model.validate().unwrap();
    // rows duplicate, x required, color too many, size too many, size unknown field
    assert_eq!(errors.len(), 5, "{:?}", errors);
    assert!(errors.iter().all(|e| e.kind() == ErrorKind::User));
    assert_eq!(model.assert_valid().unwrap_err(), errors[0]);
    assert!(!model.is_valid());
}

#[test]
fn test_incompatible_field_types() {
    let model = model(json!({"rows": ["closed"], "x": "country"}));
    let errors = model.validate().unwrap();
    assert_eq!(errors.len(), 2, "{:?}", errors);
}

#[test]
fn test_automatic_mode_follows_fields() {
    let model = model(json!({"rows": "country", "x": "sales", "color": "quantity"}));
    let mode = model.role_mode("color").unwrap().unwrap();
    assert!(mode.is_continuous());

    model.configure(&json!({"color": "product"})).unwrap();
    let mode = model.role_mode("color").unwrap().unwrap();
    assert!(!mode.is_continuous());
}

#[test]
fn test_fixed_mode() {
    let model = model(json!({"rows": "country", "x": "sales", "color": "quantity"}));
    let loader = model.model_type().loader().clone();
    let mapping = model.mapping("color").unwrap().unwrap();

    let text = Mode::from_spec(&loader, &json!("string")).unwrap();
    mapping.set_mode_fixed(Some(&text)).unwrap();
    let errors = model.validate().unwrap();
    assert_eq!(errors.len(), 1, "{:?}", errors);

    let unknown = Mode::from_spec(&loader, &json!("boolean")).unwrap();
    mapping.set_mode_fixed(Some(&unknown)).unwrap();
    assert_eq!(model.validate().unwrap().len(), 1);
    assert!(model.role_mode("color").unwrap().is_none());

    let numeric = Mode::from_spec(&loader, &json!("number")).unwrap();
    mapping.set_mode_fixed(Some(&numeric)).unwrap();
    assert!(model.is_valid());
    assert!(model.role_mode("color").unwrap().unwrap().is_continuous());
}

#[test]
fn test_visual_key_roles() {
    let model = model(json!({
        "rows": ["country"],
        "x": "sales",
        "color": "product",
        "size": ["quantity"]
    }));
    let names: Vec<&str> = model
        .visual_key_roles()
        .unwrap()
        .iter()
        .map(|r| r.name())
        .collect();
    assert_eq!(names, vec!["rows", "color"]);

    model.configure(&json!({"color": "quantity"})).unwrap();
    let names: Vec<&str> = model
        .visual_key_roles()
        .unwrap()
        .iter()
        .map(|r| r.name())
        .collect();
    assert_eq!(names, vec!["rows"]);
}

#[test]
fn test_model_spec_round_trip() {
    let model = model(json!({"rows": ["country"], "x": "sales"}));
    let spec = model.to_spec();
    assert_eq!(spec["rows"]["fields"][0]["name"], "country");
    let again = VisualModel::new(model.model_type().clone(), &spec)
        .unwrap()
        .with_data(sales());
    assert!(again.is_valid());
    assert_eq!(again.to_spec(), spec);
}

#[test]
fn test_bad_model_type_specs() {
    let loader = Arc::new(Loader::new(Arc::new(ModuleRegistry::new())));
    let err = VisualModelType::from_spec(loader.clone(), &json!({"roles": []})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentRequired);
    let err = VisualModelType::from_spec(loader, &json!({"id": "a", "roles": {}})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentInvalidType);
}
