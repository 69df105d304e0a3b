//! Value and transaction tests
//!
//! End-to-end edits of complex values: staging through transactions,
//! observers, nested configuration, validation and serialization.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pentype_model::{
    standard, ChangeObserver, Changeset, Complex, Error, ErrorKind, InstanceInput, Primitive,
    PropertyType, Simple, SpecOptions, Transaction, TransactionStatus, Type, Value,
};
use serde_json::json;

fn address_type() -> Type {
    let std = standard();
    std.complex
        .extend()
        .id("acme/address")
        .property(PropertyType::builder("city").required(true))
        .property(PropertyType::builder("zip"))
        .build()
        .unwrap()
}

fn customer_type() -> Type {
    let std = standard();
    std.complex
        .extend()
        .id("acme/customer")
        .property(PropertyType::builder("name").required(true))
        .property(PropertyType::builder("address").value_type(address_type()))
        .property(
            PropertyType::builder("tags")
                .value_type(std.list.extend().of(std.string.clone()).build().unwrap())
                .count_max(2),
        )
        .build()
        .unwrap()
}

fn customer() -> Complex {
    Complex::from_spec(
        &customer_type(),
        &json!({"name": "ann", "address": {"city": "Lisbon"}, "tags": ["a"]}),
    )
    .unwrap()
}

struct Guard {
    calls: AtomicUsize,
    veto: bool,
}

impl ChangeObserver for Guard {
    fn will_change(&self, _changeset: &Changeset) -> pentype_model::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.veto {
            Err(Error::user("Changes are locked."))
        } else {
            Ok(())
        }
    }
}

#[test]
fn test_simple_value_is_set_once() {
    let mut five = Simple::new(&standard().number, 5).unwrap();
    assert!(five.assign_value(5).is_ok());
    let err = five.assign_value(6).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationInvalid);
    assert_eq!(five.value(), &Primitive::from(5));
}

#[test]
fn test_simple_spec_round_trip() {
    let std = standard();
    let five = Value::Simple(Simple::new(&std.number, 5).unwrap());
    let spec = five.to_spec_with(&SpecOptions::default().declared(&std.number));
    assert_eq!(spec, json!(5));
    let back = std.number.create(&spec).unwrap();
    assert!(back.equals(&five));
}

#[test]
fn test_set_stages_until_accept() {
    let c = customer();
    let scope = Transaction::enter();
    c.set("name", "bob").unwrap();
    assert_eq!(c.get_primitive("name").unwrap(), Some(Primitive::from("bob")));
    let txn = scope.transaction().clone();

    // A different thread sees the committed state
    let other = c.clone();
    let seen = std::thread::spawn(move || other.get_primitive("name").unwrap())
        .join()
        .unwrap();
    assert_eq!(seen, Some(Primitive::from("ann")));

    scope.accept().unwrap();
    assert_eq!(txn.status(), TransactionStatus::Committed);
    assert_eq!(c.get_primitive("name").unwrap(), Some(Primitive::from("bob")));
    assert_eq!(c.version(), 1);
}

#[test]
fn test_veto_rejects_whole_transaction() {
    let c = customer();
    let guard = Arc::new(Guard {
        calls: AtomicUsize::new(0),
        veto: true,
    });
    c.observe(guard.clone());

    let result = Transaction::run(|| {
        c.set("name", "bob")?;
        c.get_list("tags")?.add(json!(["b"]))?;
        Ok(())
    });
    assert_eq!(result.unwrap_err(), Error::user("Changes are locked."));
    assert_eq!(guard.calls.load(Ordering::SeqCst), 1);
    assert_eq!(c.get_primitive("name").unwrap(), Some(Primitive::from("ann")));
    assert_eq!(c.get_list("tags").unwrap().count(), 1);
}

#[test]
fn test_configure_merges_nested_values() {
    let c = customer();
    let address_before = c.get("address").unwrap().unwrap();

    let scope = Transaction::enter();
    c.configure(&json!({"address": {"zip": "1000"}, "tags": ["a", "b"]}))
        .unwrap();
    let changeset = scope.transaction().get_changeset(c.uid()).unwrap();
    assert!(changeset.has_changes());
    scope.accept().unwrap();

    let address = c.get("address").unwrap().unwrap();
    assert!(address.equals(&address_before));
    let address = address.as_complex().unwrap();
    assert_eq!(address.get_primitive("city").unwrap(), Some(Primitive::from("Lisbon")));
    assert_eq!(address.get_primitive("zip").unwrap(), Some(Primitive::from("1000")));
    assert_eq!(c.get_list("tags").unwrap().count(), 2);
}

#[test]
fn test_set_replaces_nested_values() {
    let c = customer();
    let before = c.get("address").unwrap().unwrap();
    c.set("address", json!({"city": "Porto"})).unwrap();
    let after = c.get("address").unwrap().unwrap();
    assert!(!after.equals(&before));
    c.set("address", InstanceInput::Spec(json!(null))).unwrap();
    assert!(c.get("address").unwrap().is_none());
}

#[test]
fn test_validation_collects_all_errors() {
    let c = Complex::from_spec(
        &customer_type(),
        &json!({"address": {"zip": "1"}, "tags": ["a", "b", "c"]}),
    )
    .unwrap();
    let value = Value::Complex(c);
    let errors = value.validate().unwrap();
    assert_eq!(errors.len(), 3, "{:?}", errors);
    assert_eq!(value.assert_valid().unwrap_err(), errors[0]);
    assert!(!value.is_valid());

    assert!(Value::Complex(customer()).is_valid());
}

#[test]
fn test_read_only_type_rejects_writes() {
    let frozen = customer_type().extend().is_read_only(true).build().unwrap();
    let c = Complex::from_spec(&frozen, &json!({"name": "ann"})).unwrap();
    let err = c.set("name", "bob").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationInvalid);
}

#[test]
fn test_spec_omits_empty_properties() {
    let c = Complex::from_spec(&customer_type(), &json!({"name": "ann"})).unwrap();
    assert_eq!(Value::Complex(c.clone()).to_spec(), json!({"name": "ann"}));

    let all = Value::Complex(c).to_spec_with(&SpecOptions {
        include_defaults: true,
        ..Default::default()
    });
    assert_eq!(all, json!({"name": "ann", "address": null, "tags": []}));
}

#[test]
fn test_inline_type_must_match_property_type() {
    let std = standard();
    let abstract_simple = std.simple.extend().is_abstract(true).build().unwrap();
    let holder = std
        .complex
        .extend()
        .property(PropertyType::builder("v").value_type(abstract_simple))
        .build()
        .unwrap();
    let spec = json!({"v": {"_": "date", "v": "2020-01-01T00:00:00Z"}});
    let err = Complex::from_spec(&holder, &spec).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationInvalid);

    // Bare primitives infer their standard type only when it fits
    assert_eq!(
        Complex::from_spec(&holder, &json!({"v": 1})).unwrap_err().kind(),
        ErrorKind::OperationInvalid
    );
}
