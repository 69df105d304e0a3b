//! List values
//!
//! An ordered collection of element values, unique by key. Structural edits
//! are recorded in the list's changeset within the ambient transaction (one
//! is created when none is ambient) and applied on commit.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use pentype_core::{wire, Error, Result};
use serde_json::{Map, Value as Json};

use super::complex::{ComplexInner, NEXT_VALUE_UID};
use super::{Complex, Fragment, InstanceInput, SpecOptions, Value};
use crate::changeset::{
    ChangeObserver, Changeset, Comparer, ListChangeset, ListSetOptions, Observers,
};
use crate::loader::Loader;
use crate::transaction::{ambient_changeset, Transaction};
use crate::types::{standard, Type};

/// Elements of a list, indexed by key
#[derive(Clone, Default)]
pub(crate) struct ListState {
    pub(crate) elements: Vec<Value>,
    keys: HashMap<String, Value>,
}

impl ListState {
    /// Build from values, keeping the first of each key
    fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let mut state = ListState::default();
        for value in values {
            let key = value.key();
            if !state.keys.contains_key(&key) {
                state.keys.insert(key, value.clone());
                state.elements.push(value);
            }
        }
        state
    }

    pub(crate) fn len(&self) -> usize {
        self.elements.len()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Value> {
        self.keys.get(key)
    }

    pub(crate) fn index_of_key(&self, key: &str) -> Option<usize> {
        if !self.keys.contains_key(key) {
            return None;
        }
        self.elements.iter().position(|e| e.key() == key)
    }

    pub(crate) fn insert(&mut self, index: usize, values: impl IntoIterator<Item = Value>) {
        let index = index.min(self.elements.len());
        let values: Vec<Value> = values.into_iter().collect();
        for value in &values {
            self.keys.insert(value.key(), value.clone());
        }
        self.elements.splice(index..index, values);
    }

    pub(crate) fn remove_range(&mut self, index: usize, count: usize) -> Vec<Value> {
        let start = index.min(self.elements.len());
        let end = start.saturating_add(count).min(self.elements.len());
        let removed: Vec<Value> = self.elements.drain(start..end).collect();
        for value in &removed {
            self.keys.remove(&value.key());
        }
        removed
    }

    pub(crate) fn relocate(&mut self, index_old: usize, index_new: usize) {
        if index_old >= self.elements.len() {
            return;
        }
        let value = self.elements.remove(index_old);
        let index_new = index_new.min(self.elements.len());
        self.elements.insert(index_new, value);
    }

    pub(crate) fn clear(&mut self) {
        self.elements.clear();
        self.keys.clear();
    }
}

struct Committed {
    state: ListState,
    version: u64,
}

pub(crate) struct ListInner {
    uid: u64,
    ty: Type,
    loader: Loader,
    committed: RwLock<Committed>,
    observers: Observers,
    owner: OnceCell<(Weak<ComplexInner>, usize)>,
}

/// Ordered collection of element values
#[derive(Clone)]
pub struct List(Arc<ListInner>);

impl List {
    /// Create an empty list that resolves later elements with the global loader
    pub fn new(ty: &Type) -> Result<List> {
        Self::new_in(Loader::global(), ty)
    }

    /// Create an empty list that resolves later elements with `loader`
    pub fn new_in(loader: &Loader, ty: &Type) -> Result<List> {
        if !ty.is_list() {
            return Err(Error::argument_invalid_type("type", "a list type"));
        }
        if ty.is_abstract() {
            return Err(Error::operation_invalid(format!(
                "Cannot create an instance of abstract type '{}'",
                ty.label()
            )));
        }
        Ok(List(Arc::new(ListInner {
            uid: NEXT_VALUE_UID.fetch_add(1, AtomicOrdering::Relaxed),
            ty: ty.clone(),
            loader: loader.clone(),
            committed: RwLock::new(Committed {
                state: ListState::default(),
                version: 0,
            }),
            observers: RwLock::new(Vec::new()),
            owner: OnceCell::new(),
        })))
    }

    /// Create a list from a specification, resolving inline types with the global loader
    pub fn from_spec(ty: &Type, spec: &Json) -> Result<List> {
        Self::from_spec_in(Loader::global(), ty, spec)
    }

    /// Create a list from a specification
    ///
    /// Accepts an array, a typed `{"_": type, "d": [...]}` object, `null`
    /// (empty) or a single element. Later duplicates are dropped.
    pub fn from_spec_in(loader: &Loader, ty: &Type, spec: &Json) -> Result<List> {
        let list = List::new_in(loader, ty)?;
        let element_type = list.element_type();
        let values = Fragment::from(spec.clone())
            .0
            .into_iter()
            .map(|input| element_type.to_in(loader, input))
            .collect::<Result<Vec<_>>>()?;
        list.0.committed.write().state = ListState::from_values(values);
        Ok(list)
    }

    /// Unique number of this value
    pub fn uid(&self) -> u64 {
        self.0.uid
    }

    /// Type of the list
    pub fn ty(&self) -> &Type {
        &self.0.ty
    }

    /// Type of the elements
    pub fn element_type(&self) -> Type {
        self.0
            .ty
            .element_type()
            .cloned()
            .unwrap_or_else(|| standard().element.clone())
    }

    /// Number of committed transactions that changed this list
    pub fn version(&self) -> u64 {
        self.0.committed.read().version
    }

    /// Whether two handles refer to the same list
    pub fn ptr_eq(&self, other: &List) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Register an observer of committed and rejected changes
    pub fn observe(&self, observer: Arc<dyn ChangeObserver>) {
        self.0.observers.write().push(observer);
    }

    pub(crate) fn observers(&self) -> Vec<Arc<dyn ChangeObserver>> {
        self.0.observers.read().clone()
    }

    /// The complex value holding this list in a property, if any
    pub fn owner(&self) -> Option<Complex> {
        let (weak, _) = self.0.owner.get()?;
        weak.upgrade().map(Complex::from_inner)
    }

    pub(crate) fn set_owner(&self, owner: &Complex, index: usize) {
        let _ = self.0.owner.set((owner.downgrade(), index));
    }

    pub(crate) fn committed(&self) -> ListState {
        self.0.committed.read().state.clone()
    }

    pub(crate) fn commit(&self, state: ListState) {
        let mut committed = self.0.committed.write();
        committed.state = state;
        committed.version += 1;
    }

    fn read<R>(&self, f: impl FnOnce(&ListState) -> R) -> R {
        if let Some(Changeset::List(cs)) = ambient_changeset(self.0.uid) {
            return cs.with_projected(f);
        }
        f(&self.0.committed.read().state)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Number of elements
    pub fn count(&self) -> usize {
        self.read(ListState::len)
    }

    /// Whether the list has no elements
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Element at a position
    pub fn at(&self, index: usize) -> Option<Value> {
        self.read(|s| s.elements.get(index).cloned())
    }

    /// Element by key
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read(|s| s.get(key).cloned())
    }

    /// Whether an element with the key exists
    pub fn has(&self, key: &str) -> bool {
        self.read(|s| s.get(key).is_some())
    }

    /// Position of an element, matched by key
    pub fn index_of(&self, element: &Value) -> Option<usize> {
        let key = element.key();
        self.read(|s| s.index_of_key(&key))
    }

    /// Snapshot of the elements
    pub fn to_vec(&self) -> Vec<Value> {
        self.read(|s| s.elements.clone())
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Append elements, updating existing ones
    pub fn add(&self, fragment: impl Into<Fragment>) -> Result<()> {
        self.set(fragment, ListSetOptions::append())
    }

    /// Insert elements at a position, updating existing ones
    pub fn insert(&self, fragment: impl Into<Fragment>, index: isize) -> Result<()> {
        self.set(fragment, ListSetOptions::append().at(index))
    }

    /// Bulk set, as controlled by the options
    pub fn set(&self, fragment: impl Into<Fragment>, options: ListSetOptions) -> Result<()> {
        let values = self.convert(fragment.into())?;
        self.mutate(|cs| cs.set(values, options))
    }

    /// Make the list follow a fragment: add, update, remove and reorder
    pub fn configure(&self, fragment: impl Into<Fragment>) -> Result<()> {
        self.set(fragment, ListSetOptions::all())
    }

    /// Remove elements, matched by key
    pub fn remove(&self, fragment: impl Into<Fragment>) -> Result<()> {
        let values = self.convert(fragment.into())?;
        self.mutate(|cs| cs.remove(&values))
    }

    /// Remove `count` elements starting at `start`; a negative start counts from the end
    pub fn remove_at(&self, start: isize, count: usize) -> Result<()> {
        self.mutate(|cs| cs.remove_at(start, count))
    }

    /// Move an element to a position
    pub fn move_to(&self, element: &Value, index: isize) -> Result<()> {
        self.mutate(|cs| cs.move_to(element, index))
    }

    /// Sort the elements
    pub fn sort(
        &self,
        comparer: impl Fn(&Value, &Value) -> Ordering + Send + Sync + 'static,
    ) -> Result<()> {
        let comparer: Comparer = Arc::new(comparer);
        self.mutate(|cs| cs.sort(comparer))
    }

    /// Remove every element
    pub fn clear(&self) -> Result<()> {
        self.mutate(ListChangeset::clear)
    }

    fn convert(&self, fragment: Fragment) -> Result<Vec<Value>> {
        let element_type = self.element_type();
        fragment
            .0
            .into_iter()
            .map(|input: InstanceInput| element_type.to_in(&self.0.loader, input))
            .collect()
    }

    fn mutate(&self, f: impl FnOnce(&ListChangeset) -> Result<()>) -> Result<()> {
        self.ensure_writable()?;
        Transaction::run(|| {
            let txn = Transaction::current()
                .ok_or_else(|| Error::operation_invalid("No ambient transaction"))?;
            let changeset = txn.ensure_list_changeset(self)?;
            f(&changeset)
        })
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.0.ty.is_read_only() {
            return Err(Error::operation_invalid(format!(
                "List of type '{}' is read-only",
                self.0.ty.label()
            )));
        }
        if let Some((weak, index)) = self.0.owner.get() {
            if let Some(owner) = weak.upgrade().map(Complex::from_inner) {
                owner.check_list_writable(*index)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Validation, comparison and specification
    // ------------------------------------------------------------------------

    /// Collect the errors of the elements; `None` when valid
    pub fn validate(&self) -> Option<Vec<Error>> {
        let errors: Vec<Error> = self
            .to_vec()
            .iter()
            .filter_map(Value::validate)
            .flatten()
            .collect();
        if errors.is_empty() {
            None
        } else {
            Some(errors)
        }
    }

    /// Same type and pairwise content-equal elements
    pub fn equals_content(&self, other: &List) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if self.0.ty != other.0.ty {
            return false;
        }
        let (a, b) = (self.to_vec(), other.to_vec());
        a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| x.equals_content(y))
    }

    /// Specification of the list: an array, or `{"_": type, "d": [...]}` when typed
    pub fn to_spec_in_context(&self, options: &SpecOptions) -> Json {
        let element_options = options.declared(&self.element_type());
        let data: Vec<Json> = self
            .to_vec()
            .iter()
            .map(|e| e.to_spec_in_context(&element_options))
            .collect();
        if !options.needs_type(&self.0.ty) {
            return Json::Array(data);
        }
        let mut map = Map::new();
        map.insert(wire::TYPE.to_string(), self.0.ty.to_ref_in_context());
        map.insert(wire::DATA.to_string(), Json::Array(data));
        Json::Object(map)
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("type", &self.0.ty)
            .field("uid", &self.0.uid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PropertyType;
    use pentype_core::{ErrorKind, Primitive};
    use serde_json::json;

    fn strings(spec: Json) -> List {
        let ty = standard().list.extend().of(standard().string.clone()).build().unwrap();
        List::from_spec(&ty, &spec).unwrap()
    }

    fn keys(list: &List) -> Vec<String> {
        list.to_vec().iter().map(Value::key).collect()
    }

    #[test]
    fn test_from_spec_shapes() {
        assert_eq!(keys(&strings(json!(["a", "b"]))), vec!["a", "b"]);
        assert_eq!(keys(&strings(json!({"_": ["string"], "d": ["c"]}))), vec!["c"]);
        assert_eq!(keys(&strings(json!("x"))), vec!["x"]);
        assert!(strings(Json::Null).is_empty());
        assert_eq!(keys(&strings(json!(["a", "a", "b"]))), vec!["a", "b"]);
    }

    #[test]
    fn test_element_with_data_named_property() {
        let note = standard()
            .complex
            .extend()
            .property(PropertyType::builder("d"))
            .build()
            .unwrap();
        let notes = standard().list.extend().of(note).build().unwrap();
        let list = List::new(&notes).unwrap();

        list.add(json!({"d": "x"})).unwrap();
        assert_eq!(list.count(), 1);
        let first = list.at(0).unwrap();
        let d = first.as_complex().unwrap().get_primitive("d").unwrap();
        assert_eq!(d, Some(Primitive::from("x")));

        let from_spec = List::from_spec(&notes, &json!([{"d": "y"}, {"d": "z"}])).unwrap();
        assert_eq!(from_spec.count(), 2);
    }

    #[test]
    fn test_elements_are_converted() {
        let list = strings(json!([1, true]));
        assert_eq!(keys(&list), vec!["1", "true"]);
        assert!(list.at(0).unwrap().ty() == &standard().string);
    }

    #[test]
    fn test_reads() {
        let list = strings(json!(["a", "b", "c"]));
        assert_eq!(list.count(), 3);
        assert!(list.has("b"));
        assert!(!list.has("z"));
        assert_eq!(list.get("c").unwrap().key(), "c");
        let b = list.get("b").unwrap();
        assert_eq!(list.index_of(&b), Some(1));
        assert!(list.at(3).is_none());
    }

    #[test]
    fn test_remove_by_key() {
        let list = strings(json!(["a", "b", "c", "d"]));
        list.remove(json!(["d", "b", "b", "zz"])).unwrap();
        assert_eq!(keys(&list), vec!["a", "c"]);
        assert_eq!(list.version(), 1);
    }

    #[test]
    fn test_configure_replaces_contents() {
        let list = strings(json!(["a", "b"]));
        list.configure(json!(["c", "a"])).unwrap();
        assert_eq!(keys(&list), vec!["c", "a"]);
    }

    #[test]
    fn test_element_type_enforced() {
        let ty = standard().list.extend().of(standard().number.clone()).build().unwrap();
        let list = List::new(&ty).unwrap();
        let err = list.add(json!("abc")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentInvalid);
        assert!(list.is_empty());
    }

    #[test]
    fn test_read_only_list_type() {
        let ty = standard()
            .list
            .extend()
            .of(standard().string.clone())
            .is_read_only(true)
            .build()
            .unwrap();
        let list = List::from_spec(&ty, &json!(["a"])).unwrap();
        assert_eq!(list.clear().unwrap_err().kind(), ErrorKind::OperationInvalid);
    }

    #[test]
    fn test_owner_is_tracked() {
        let ty = standard()
            .complex
            .extend()
            .property(PropertyType::builder("items").value_type(standard().list.clone()))
            .build()
            .unwrap();
        let owner = Complex::new(&ty).unwrap();
        let items = owner.get_list("items").unwrap();
        assert!(items.owner().unwrap().ptr_eq(&owner));
        assert!(strings(json!([])).owner().is_none());
    }

    #[test]
    fn test_to_spec_typed_wrapper() {
        let list = strings(json!(["a"]));
        assert_eq!(Value::List(list.clone()).to_spec(), json!(["a"]));
        let forced = Value::List(list).to_spec_with(&SpecOptions {
            force_type: true,
            ..Default::default()
        });
        assert_eq!(forced["d"], json!(["a"]));
        assert_eq!(forced["_"]["base"], json!("list"));
        assert_eq!(forced["_"]["of"], json!("string"));
    }

    #[test]
    fn test_list_of_complex_validates_elements() {
        let std = standard();
        let item = std
            .complex
            .extend()
            .property(PropertyType::builder("name").required(true))
            .build()
            .unwrap();
        let ty = std.list.extend().of(item).build().unwrap();
        let list = List::from_spec(&ty, &json!([{"name": "a"}, {}])).unwrap();
        assert_eq!(list.count(), 2);
        assert_eq!(list.validate().unwrap().len(), 1);
    }
}
