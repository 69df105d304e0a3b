//! End-to-end scenarios

use std::sync::Arc;

use pentype::{
    standard, ErrorKind, GetOptions, InstancesContainer, List, ListChange, ListSetOptions, Loader,
    Module, ModuleRegistry, SpecificationContext, Transaction, TypeReference,
};
use serde_json::json;

// ============================================================================
// Specification context
// ============================================================================

#[test]
fn anonymous_type_round_trips_through_context() {
    let context = SpecificationContext::new();
    let derived = standard().string.extend().build().unwrap();
    let id = context.add(&derived, None).unwrap();
    assert_eq!(context.get(&id), Some(derived));
    assert!(!SpecificationContext::is_id_temporary(Some("pentaho/type/boolean")));
    assert!(SpecificationContext::is_id_temporary(Some("_:7")));
}

// ============================================================================
// Lists
// ============================================================================

#[test]
fn entity_list_set_records_minimal_changes() {
    let item = standard()
        .complex
        .extend()
        .id("acme/item")
        .property(pentype::PropertyType::builder("key"))
        .key_property("key")
        .build()
        .unwrap();
    let items = standard().list.extend().of(item).build().unwrap();
    let list = List::from_spec(&items, &json!([{"key": "1"}, {"key": "2"}])).unwrap();

    let scope = Transaction::enter();
    list.set(
        json!([{"key": "2"}, {"key": "3"}]),
        ListSetOptions {
            add: true,
            remove: true,
            ..Default::default()
        },
    )
    .unwrap();
    let changeset = scope.transaction().get_changeset(list.uid()).unwrap();
    let changes = changeset.as_list().unwrap().changes();
    assert_eq!(changes.len(), 2);
    assert!(matches!(&changes[0], ListChange::Remove { index: 0, elements } if elements[0].key() == "1"));
    assert!(matches!(&changes[1], ListChange::Add { index: 1, elements } if elements[0].key() == "3"));
    scope.accept().unwrap();

    let keys: Vec<String> = list.to_vec().iter().map(|v| v.key()).collect();
    assert_eq!(keys, vec!["2", "3"]);
}

// ============================================================================
// Loader and instances
// ============================================================================

#[test]
fn loader_rejects_instances_as_type_references() {
    let loader = Loader::new(Arc::new(ModuleRegistry::new()));
    let five = standard().number.create(&json!(5)).unwrap();
    let err = loader.resolve_type(&TypeReference::from(five)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentInvalid);
}

#[tokio::test]
async fn instance_is_available_synchronously_after_async_load() {
    let registry = Arc::new(ModuleRegistry::new());
    registry.define_deferred("x", || async {
        Ok(Module::factory(Vec::<String>::new(), |ctx| {
            ctx.instance_type.create(&json!(ctx.config["n"]))
        }))
    });
    let container = InstancesContainer::new(Arc::new(Loader::new(registry)));
    container
        .configure(&json!({"x": {"type": "number", "config": {"n": 42}}}))
        .unwrap();

    assert_eq!(
        container.get_by_id("x").unwrap_err().kind(),
        ErrorKind::OperationInvalid
    );
    let loaded = container.get_by_id_async("x").await.unwrap();
    assert!(container.get_by_id("x").unwrap().equals(&loaded));

    let by_type = container
        .get_by_type("pentaho/type/number", &GetOptions::required())
        .unwrap()
        .unwrap();
    assert!(by_type.equals(&loaded));
}

#[tokio::test]
async fn priorities_order_instances_of_a_type() {
    let registry = Arc::new(ModuleRegistry::new());
    let container = InstancesContainer::new(Arc::new(Loader::new(registry.clone())));
    for (id, priority) in [("a", 3), ("b", 1), ("c", 2)] {
        registry.define(
            id,
            Module::factory(Vec::<String>::new(), move |ctx| {
                ctx.instance_type.create(&json!(priority))
            }),
        );
        container.define(id, "number", priority, json!(null)).unwrap();
    }

    let values = container
        .get_all_by_type_async("number", &GetOptions::default())
        .await
        .unwrap();
    let priorities: Vec<f64> = values
        .iter()
        .filter_map(|v| v.primitive().and_then(|p| p.as_number()))
        .collect();
    assert_eq!(priorities, vec![3.0, 2.0, 1.0]);
}
