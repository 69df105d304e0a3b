//! A visual model whose roles come from a registered instance

use std::sync::Arc;

use pentype::visual::{DataTable, MemoryTable, VisualModel, VisualModelType};
use pentype::{
    standard, GetOptions, InstancesContainer, Loader, Module, ModuleRegistry, PropertyType,
    Transaction, Value,
};
use serde_json::json;

fn chart_spec_type() -> pentype::Type {
    standard()
        .complex
        .extend()
        .id("acme/chartSpec")
        .property(PropertyType::builder("roles").value_type(
            standard().list.extend().of(standard().object.clone()).build().unwrap(),
        ))
        .build()
        .unwrap()
}

#[tokio::test]
async fn visual_model_from_container_configuration() {
    let registry = Arc::new(ModuleRegistry::new());
    registry.define_type(&chart_spec_type()).unwrap();
    registry.define(
        "acme/chartSpec/bar",
        Module::factory(Vec::<String>::new(), |ctx| ctx.instance_type.create(&ctx.config)),
    );
    let loader = Arc::new(Loader::new(registry));
    let container = InstancesContainer::new(loader.clone());
    container
        .configure(&json!({
            "acme/chartSpec/bar": {
                "type": "acme/chartSpec",
                "config": {"roles": [
                    {"name": "category", "modes": [["string"]], "isRequired": true},
                    {"name": "measure", "modes": ["number"], "isRequired": true}
                ]}
            }
        }))
        .unwrap();

    let chart = container
        .get_by_type_async("acme/chartSpec", &GetOptions::required())
        .await
        .unwrap()
        .unwrap();
    let roles: Vec<serde_json::Value> = chart
        .as_complex()
        .unwrap()
        .get_list("roles")
        .unwrap()
        .to_vec()
        .iter()
        .filter_map(Value::primitive)
        .map(|p| p.to_json())
        .collect();
    assert_eq!(roles.len(), 2);

    let model_type = Arc::new(
        VisualModelType::from_spec(loader, &json!({"id": "acme/bar", "roles": roles})).unwrap(),
    );
    let table: Arc<dyn DataTable> = Arc::new(
        MemoryTable::from_json(&json!({
            "model": [{"name": "region", "type": "string"}, {"name": "total", "type": "number"}],
            "rows": [["north", 10], ["south", 7]]
        }))
        .unwrap(),
    );
    let model = VisualModel::new(model_type, &json!({"category": "region"}))
        .unwrap()
        .with_data(table);
    assert_eq!(model.validate().unwrap().len(), 1);

    // Staged edits are visible to validation inside the transaction
    let scope = Transaction::enter();
    model.configure(&json!({"measure": "total"})).unwrap();
    assert!(model.is_valid());
    scope.accept().unwrap();
    assert!(model.is_valid());
    assert_eq!(model.visual_key_roles().unwrap().len(), 1);
}
