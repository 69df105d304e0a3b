//! Loader tests
//!
//! Type reference resolution (sync and async) and instance creation from
//! specifications, against a private module registry per test.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pentype_model::{
    standard, ErrorKind, Loader, Module, ModuleRegistry, PropertyType, TypeReference, Value,
};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn registry_with_person() -> Arc<ModuleRegistry> {
    let std = standard();
    let registry = Arc::new(ModuleRegistry::new());
    let person = std
        .complex
        .extend()
        .id("acme/person")
        .property(PropertyType::builder("name").required(true))
        .property(PropertyType::builder("age").value_type(std.number.clone()))
        .key_property("name")
        .build()
        .unwrap();
    registry.define_type(&person).unwrap();
    registry
}

#[test]
fn test_array_shorthand_matches_generic_list_spec() {
    let loader = Loader::new(Arc::new(ModuleRegistry::new()));
    let shorthand = loader.resolve_type_json(&json!(["number"])).unwrap();
    let generic = loader
        .resolve_type_json(&json!({"base": "pentaho/type/list", "of": "number"}))
        .unwrap();

    assert_eq!(shorthand.base(), generic.base());
    assert_eq!(shorthand.element_type(), generic.element_type());
    assert_eq!(shorthand.to_spec(), generic.to_spec());
}

#[test]
fn test_instance_is_not_a_type_reference() {
    let loader = Loader::new(Arc::new(ModuleRegistry::new()));
    let instance = standard().string.create(&json!("x")).unwrap();
    let err = loader.resolve_type(&TypeReference::Instance(instance)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentInvalid);
}

#[test]
fn test_missing_and_malformed_references() {
    let loader = Loader::new(Arc::new(ModuleRegistry::new()));
    assert_eq!(
        loader.resolve_type_json(&json!(null)).unwrap_err().kind(),
        ErrorKind::ArgumentRequired
    );
    assert_eq!(
        loader.resolve_type_json(&json!(true)).unwrap_err().kind(),
        ErrorKind::ArgumentInvalidType
    );
    assert_eq!(
        loader.resolve_type_json(&json!("_:42")).unwrap_err().kind(),
        ErrorKind::ArgumentInvalid
    );
}

#[test]
fn test_create_entity_instances_from_module_type() {
    init_tracing();
    let loader = Loader::new(registry_with_person());
    let people_type = loader.resolve_type_json(&json!(["acme/person"])).unwrap();

    let people = loader
        .create_instance(
            &json!({"_": people_type.to_ref_in_context(), "d": [
                {"name": "ann", "age": 30},
                {"name": "bob"},
                {"name": "ann", "age": 99}
            ]}),
            None,
        )
        .unwrap();
    let people = people.as_list().unwrap();
    assert_eq!(people.count(), 2);
    let ann = people.get("ann").unwrap();
    let ann = ann.as_complex().unwrap();
    assert_eq!(ann.get_primitive("age").unwrap().and_then(|p| p.as_number()), Some(30.0));
}

#[test]
fn test_values_keep_the_loader_they_were_created_with() {
    let std = standard();
    let loader = Loader::new(registry_with_person());
    let members = std.list.extend().of(std.complex.clone()).build().unwrap();
    let group_type = std
        .complex
        .extend()
        .property(PropertyType::builder("lead").value_type(std.complex.clone()))
        .property(PropertyType::builder("members").value_type(members))
        .build()
        .unwrap();

    let group = group_type.create_in(&loader, &json!({})).unwrap();
    let group = group.as_complex().unwrap();
    group.set("lead", json!({"_": "acme/person", "name": "ann"})).unwrap();
    let lead = group.get("lead").unwrap().unwrap();
    assert_eq!(lead.ty().id(), Some("acme/person"));

    let members = group.get_list("members").unwrap();
    members.add(json!({"_": "acme/person", "name": "bob"})).unwrap();
    assert!(members.has("bob"));

    // The global registry does not know the module
    let detached = group_type.create(&json!({})).unwrap();
    let detached = detached.as_complex().unwrap();
    assert!(detached.set("lead", json!({"_": "acme/person", "name": "ann"})).is_err());
}

#[test]
fn test_value_spec_round_trip_through_loader() {
    let loader = Loader::new(registry_with_person());
    let person_type = loader.resolve_type_json(&json!("acme/person")).unwrap();
    let ann = person_type.create_in(&loader, &json!({"name": "ann", "age": 30})).unwrap();

    let spec = ann.to_spec();
    assert_eq!(spec, json!({"name": "ann", "age": 30}));

    let typed = ann.to_spec_with(&pentype_model::SpecOptions {
        force_type: true,
        ..Default::default()
    });
    assert_eq!(typed["_"], "acme/person");
    let back = loader.create_instance(&typed, None).unwrap();
    assert!(back.equals_content(&ann));
    // Entities are equal by key
    assert!(back.equals(&ann));
}

#[test]
fn test_anonymous_inline_types_round_trip() {
    let loader = Loader::new(Arc::new(ModuleRegistry::new()));
    let spec = json!({
        "_": {"id": "_:1", "props": [{"name": "x", "valueType": "number"}]},
        "x": 1
    });
    let value = loader.create_instance(&spec, None).unwrap();
    assert!(value.ty().is_anonymous());
    let x = value.as_complex().unwrap().get_primitive("x").unwrap();
    assert_eq!(x.and_then(|p| p.as_number()), Some(1.0));

    let out = value.to_spec_with(&pentype_model::SpecOptions {
        force_type: true,
        ..Default::default()
    });
    assert_eq!(out["_"]["id"], "_:1");
    let again = loader.create_instance(&out, None).unwrap();
    assert_ne!(again.ty(), value.ty());
    assert_eq!(again.ty().to_spec(), value.ty().to_spec());
    assert_eq!(again.to_spec(), json!({"x": 1}));
}

#[tokio::test]
async fn test_sync_fails_until_async_load() {
    let registry = Arc::new(ModuleRegistry::new());
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    registry.define_deferred("acme/score", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            standard()
                .number
                .extend()
                .id("acme/score")
                .build()
                .map(Module::Type)
        }
    });
    let loader = Loader::new(registry);

    let err = loader.resolve_type_json(&json!("acme/score")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationInvalid);

    let reference =
        TypeReference::from_json(&json!({"props": [{"name": "s", "valueType": "acme/score"}]}))
            .unwrap();
    let ty = loader.resolve_type_async(&reference).await.unwrap();
    assert_eq!(ty.get_property("s").unwrap().value_type().id(), Some("acme/score"));

    let score = loader.resolve_type_json(&json!("acme/score")).unwrap();
    let value = score.create_in(&loader, &json!("12")).unwrap();
    assert!(matches!(value, Value::Simple(_)));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_async_failures_resolve_to_errors() {
    let registry = Arc::new(ModuleRegistry::new());
    registry.define_deferred("acme/broken", || async {
        Err(pentype_model::Error::user("network down"))
    });
    registry.define("acme/data", Module::Data(json!({"not": "a type"})));
    let loader = Loader::new(registry);

    let err = loader
        .resolve_type_async(&TypeReference::from("acme/broken"))
        .await
        .unwrap_err();
    assert_eq!(err, pentype_model::Error::user("network down"));

    let err = loader
        .create_instance_async(&json!({"_": "acme/data"}), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationInvalid);
}
