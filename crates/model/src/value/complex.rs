//! Complex values
//!
//! A complex value holds one slot per property of its type. Element
//! properties hold zero or one value; list properties hold a list value
//! created with the owner and kept for its whole life.
//!
//! Reads inside a transaction observe the projected state of that
//! transaction's changeset; writes always go through a transaction.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use pentype_core::{wire, Error, Primitive, Result};
use serde_json::{Map, Value as Json};

use super::{Fragment, InstanceInput, List, SpecOptions, Value};
use crate::changeset::{ChangeObserver, Changeset, ListSetOptions, Observers, Replace};
use crate::loader::Loader;
use crate::transaction::{ambient_changeset, Transaction};
use crate::types::{PropertyType, Type};

pub(crate) static NEXT_VALUE_UID: AtomicU64 = AtomicU64::new(1);

enum Slot {
    Element(Option<Value>),
    List(List),
}

struct ComplexState {
    slots: Vec<Slot>,
    version: u64,
}

pub(crate) struct ComplexInner {
    uid: u64,
    ty: Type,
    loader: Loader,
    state: RwLock<ComplexState>,
    observers: Observers,
}

/// Property-bearing value
#[derive(Clone)]
pub struct Complex(Arc<ComplexInner>);

impl Complex {
    /// Create a value with every property at its default
    pub fn new(ty: &Type) -> Result<Complex> {
        Self::from_spec(ty, &Json::Null)
    }

    /// Create a value from a specification, resolving inline types with the global loader
    pub fn from_spec(ty: &Type, spec: &Json) -> Result<Complex> {
        Self::from_spec_in(Loader::global(), ty, spec)
    }

    /// Create a value from a specification
    ///
    /// The specification is an object keyed by property name (unknown keys are
    /// ignored) or an array of property values in property order. Missing
    /// properties take their default value.
    pub fn from_spec_in(loader: &Loader, ty: &Type, spec: &Json) -> Result<Complex> {
        if !ty.is_complex() {
            return Err(Error::argument_invalid_type("type", "a complex type"));
        }
        if ty.is_abstract() {
            return Err(Error::operation_invalid(format!(
                "Cannot create an instance of abstract type '{}'",
                ty.label()
            )));
        }

        let given = |prop: &PropertyType| -> Result<Option<Json>> {
            Ok(match spec {
                Json::Null => None,
                Json::Object(map) => map.get(prop.name()).cloned(),
                Json::Array(items) => items.get(prop.index()).cloned(),
                _ => {
                    return Err(Error::argument_invalid_type(
                        "spec",
                        format!("an object or array for complex type '{}'", ty.label()),
                    ))
                }
            })
        };

        let mut slots = Vec::with_capacity(ty.props().len());
        for prop in ty.props() {
            let raw = given(prop)?.or_else(|| prop.default_value().cloned());
            let slot = if prop.is_list() {
                let list = match raw {
                    None | Some(Json::Null) => List::new_in(loader, prop.value_type())?,
                    Some(raw) => match loader.create_instance(&raw, Some(prop.value_type()))? {
                        Value::List(list) => list,
                        other => {
                            return Err(Error::argument_invalid_type(
                                prop.name(),
                                format!("a list, got {:?}", other),
                            ))
                        }
                    },
                };
                Slot::List(list)
            } else {
                match raw {
                    None | Some(Json::Null) => Slot::Element(None),
                    Some(raw) => Slot::Element(Some(
                        prop.value_type().to_in(loader, InstanceInput::Spec(raw))?,
                    )),
                }
            };
            slots.push(slot);
        }

        let complex = Complex(Arc::new(ComplexInner {
            uid: NEXT_VALUE_UID.fetch_add(1, Ordering::Relaxed),
            ty: ty.clone(),
            loader: loader.clone(),
            state: RwLock::new(ComplexState { slots, version: 0 }),
            observers: RwLock::new(Vec::new()),
        }));
        for (index, slot) in complex.0.state.read().slots.iter().enumerate() {
            if let Slot::List(list) = slot {
                list.set_owner(&complex, index);
            }
        }
        Ok(complex)
    }

    pub(crate) fn from_inner(inner: Arc<ComplexInner>) -> Complex {
        Complex(inner)
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<ComplexInner> {
        Arc::downgrade(&self.0)
    }

    /// Unique number of this value
    pub fn uid(&self) -> u64 {
        self.0.uid
    }

    /// Type of the value
    pub fn ty(&self) -> &Type {
        &self.0.ty
    }

    /// Number of committed transactions that changed this value
    pub fn version(&self) -> u64 {
        self.0.state.read().version
    }

    /// Whether two handles refer to the same value
    pub fn ptr_eq(&self, other: &Complex) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Register an observer of committed and rejected changes
    pub fn observe(&self, observer: Arc<dyn ChangeObserver>) {
        self.0.observers.write().push(observer);
    }

    pub(crate) fn observers(&self) -> Vec<Arc<dyn ChangeObserver>> {
        self.0.observers.read().clone()
    }

    /// Key: the value of the key property of an entity, else the unique number
    pub fn key(&self) -> String {
        if let Some(key_property) = self.0.ty.key_property() {
            if let Ok(Some(value)) = self.get(&key_property) {
                return value.key();
            }
        }
        self.0.uid.to_string()
    }

    fn property(&self, name: &str) -> Result<&PropertyType> {
        self.0.ty.get_property(name).ok_or_else(|| {
            Error::argument_invalid(
                "name",
                format!("property '{}' is not defined in type '{}'", name, self.0.ty.label()),
            )
        })
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Value of a property; list properties always have a list
    pub fn get(&self, name: &str) -> Result<Option<Value>> {
        let prop = self.property(name)?;
        Ok(self.slot_value(prop.index()))
    }

    /// List of a list property
    pub fn get_list(&self, name: &str) -> Result<List> {
        let prop = self.property(name)?;
        if !prop.is_list() {
            return Err(Error::argument_invalid(
                "name",
                format!("property '{}' is not a list property", name),
            ));
        }
        match self.slot_value(prop.index()) {
            Some(Value::List(list)) => Ok(list),
            _ => Err(Error::operation_invalid(format!(
                "list of property '{}' is missing",
                name
            ))),
        }
    }

    /// Primitive of a simple-valued property
    pub fn get_primitive(&self, name: &str) -> Result<Option<Primitive>> {
        match self.get(name)? {
            None => Ok(None),
            Some(Value::Simple(simple)) => Ok(Some(simple.value().clone())),
            Some(_) => Err(Error::argument_invalid(
                "name",
                format!("property '{}' does not hold a simple value", name),
            )),
        }
    }

    fn slot_value(&self, index: usize) -> Option<Value> {
        if let Some(Changeset::Complex(cs)) = ambient_changeset(self.0.uid) {
            if let Some(projected) = cs.projected(index) {
                return projected;
            }
        }
        match self.0.state.read().slots.get(index)? {
            Slot::Element(value) => value.clone(),
            Slot::List(list) => Some(Value::List(list.clone())),
        }
    }

    pub(crate) fn committed_element(&self, index: usize) -> Option<Value> {
        match self.0.state.read().slots.get(index)? {
            Slot::Element(value) => value.clone(),
            Slot::List(list) => Some(Value::List(list.clone())),
        }
    }

    pub(crate) fn commit(&self, changes: impl Iterator<Item = Replace>) {
        let mut state = self.0.state.write();
        let mut changed = false;
        for change in changes {
            if let Some(Slot::Element(slot)) = state.slots.get_mut(change.index) {
                *slot = change.value;
                changed = true;
            }
        }
        if changed {
            state.version += 1;
        }
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Set the value of a property
    ///
    /// Element properties convert the input to their value type (`null`
    /// clears them). List properties take the input as their new elements.
    pub fn set(&self, name: &str, input: impl Into<InstanceInput>) -> Result<()> {
        let prop = self.property(name)?.clone();
        let input = input.into();
        Transaction::run(|| self.set_property(&prop, input, false))
    }

    /// Merge a specification into this value
    ///
    /// Nested complex values are configured in place from untyped object
    /// specifications; lists are updated by key.
    pub fn configure(&self, spec: &Json) -> Result<()> {
        Transaction::run(|| match spec {
            Json::Null => Ok(()),
            Json::Object(map) => {
                for (name, value) in map {
                    if name == wire::TYPE {
                        continue;
                    }
                    if let Some(prop) = self.0.ty.get_property(name) {
                        let prop = prop.clone();
                        self.set_property(&prop, InstanceInput::Spec(value.clone()), true)?;
                    }
                }
                Ok(())
            }
            Json::Array(items) => {
                let props: Vec<PropertyType> = self.0.ty.props().to_vec();
                for (prop, value) in props.iter().zip(items) {
                    self.set_property(prop, InstanceInput::Spec(value.clone()), true)?;
                }
                Ok(())
            }
            _ => Err(Error::argument_invalid_type("spec", "an object or array")),
        })
    }

    /// Copy the properties shared with another complex value
    pub fn configure_from(&self, other: &Complex) -> Result<()> {
        if self.ptr_eq(other) {
            return Ok(());
        }
        Transaction::run(|| {
            let props: Vec<PropertyType> = self.0.ty.props().to_vec();
            for prop in &props {
                let Some(source) = other.ty().get_property(prop.name()) else {
                    continue;
                };
                let input = match other.slot_value(source.index()) {
                    Some(value) => InstanceInput::Value(value),
                    None => InstanceInput::Spec(Json::Null),
                };
                self.set_property(prop, input, true)?;
            }
            Ok(())
        })
    }

    fn set_property(&self, prop: &PropertyType, input: InstanceInput, merge: bool) -> Result<()> {
        self.ensure_writable(prop)?;
        let txn = Transaction::current()
            .ok_or_else(|| Error::operation_invalid("No ambient transaction"))?;

        if prop.is_list() {
            let list = self.get_list(prop.name())?;
            let options = if merge {
                ListSetOptions::all()
            } else {
                ListSetOptions {
                    add: true,
                    remove: true,
                    move_: true,
                    ..Default::default()
                }
            };
            return list.set(Fragment::from(input), options);
        }

        let value = match input {
            InstanceInput::Spec(Json::Null) => None,
            InstanceInput::Spec(Json::Object(spec)) if merge && !spec.contains_key(wire::TYPE) => {
                if let Some(Value::Complex(current)) = self.slot_value(prop.index()) {
                    current.configure(&Json::Object(spec))?;
                    if let Some(child) = txn.get_changeset(current.uid()) {
                        txn.ensure_complex_changeset(self)?.add_child(child);
                    }
                    return Ok(());
                }
                let spec = InstanceInput::Spec(Json::Object(spec));
                Some(prop.value_type().to_in(&self.0.loader, spec)?)
            }
            other => Some(prop.value_type().to_in(&self.0.loader, other)?),
        };
        txn.ensure_complex_changeset(self)?.set_element(prop, value)
    }

    fn ensure_writable(&self, prop: &PropertyType) -> Result<()> {
        if self.0.ty.is_read_only() {
            return Err(Error::operation_invalid(format!(
                "Value of type '{}' is read-only",
                self.0.ty.label()
            )));
        }
        if prop.is_read_only(self) {
            return Err(Error::operation_invalid(format!(
                "Property '{}' is read-only",
                prop.label()
            )));
        }
        Ok(())
    }

    pub(crate) fn check_list_writable(&self, index: usize) -> Result<()> {
        match self.0.ty.props().get(index) {
            Some(prop) => self.ensure_writable(prop),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Validation and comparison
    // ------------------------------------------------------------------------

    /// Collect the errors of every applicable property; `None` when valid
    pub fn validate(&self) -> Option<Vec<Error>> {
        let mut errors = Vec::new();
        for prop in self.0.ty.props() {
            if !prop.is_applicable(self) {
                continue;
            }
            let value = self.slot_value(prop.index());
            let count = match &value {
                None => 0,
                Some(Value::List(list)) => list.count(),
                Some(_) => 1,
            };
            let range = prop.count_range(self);
            if count < range.min {
                if count == 0 && prop.is_required(self) {
                    errors.push(Error::user(format!("'{}' is required.", prop.label())));
                } else {
                    errors.push(Error::user(format!(
                        "'{}' should have at least {} values.",
                        prop.label(),
                        range.min
                    )));
                }
            } else if count > range.max {
                errors.push(Error::user(format!(
                    "'{}' should have at most {} values.",
                    prop.label(),
                    range.max
                )));
            }
            if let Some(nested) = value.as_ref().and_then(Value::validate) {
                errors.extend(nested);
            }
        }
        if errors.is_empty() {
            None
        } else {
            Some(errors)
        }
    }

    /// Same type and content-equal property values
    pub fn equals_content(&self, other: &Complex) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if self.0.ty != other.0.ty {
            return false;
        }
        self.0.ty.props().iter().all(|prop| {
            match (self.slot_value(prop.index()), other.slot_value(prop.index())) {
                (None, None) => true,
                (Some(a), Some(b)) => a.equals_content(&b),
                _ => false,
            }
        })
    }

    // ------------------------------------------------------------------------
    // Specification
    // ------------------------------------------------------------------------

    /// Specification of the value: an object keyed by property name
    pub fn to_spec_in_context(&self, options: &SpecOptions) -> Json {
        let mut map = Map::new();
        if options.needs_type(&self.0.ty) {
            map.insert(wire::TYPE.to_string(), self.0.ty.to_ref_in_context());
        }
        for prop in self.0.ty.props() {
            let declared = options.declared(prop.value_type());
            match self.slot_value(prop.index()) {
                None => {
                    if options.include_defaults {
                        map.insert(prop.name().to_string(), Json::Null);
                    }
                }
                Some(Value::List(list)) if list.is_empty() && !options.include_defaults => {}
                Some(value) => {
                    map.insert(prop.name().to_string(), value.to_spec_in_context(&declared));
                }
            }
        }
        Json::Object(map)
    }
}

impl fmt::Debug for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Complex")
            .field("type", &self.0.ty)
            .field("uid", &self.0.uid)
            .finish()
    }
}
