//! Specification context and scope
//!
//! A [`SpecificationContext`] lives for one serialization or deserialization
//! pass. It assigns temporary ids (`"_:1"`, `"_:2"`, ...) to anonymous types so
//! that each is written out once and referenced by id afterwards, and resolves
//! those ids back to types when reading.
//!
//! One context at most is ambient per thread. A [`SpecificationScope`] makes a
//! context ambient for its lifetime and restores the previous one on dispose.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use pentype_core::{wire, Error, Result};

use crate::types::Type;

/// Prefix of temporary type ids
pub const ID_TEMPORARY_PREFIX: &str = wire::ID_TEMPORARY_PREFIX;

thread_local! {
    static CURRENT: RefCell<Option<SpecificationContext>> = const { RefCell::new(None) };
}

#[derive(Default)]
struct ContextState {
    ids_by_type: HashMap<u64, String>,
    types_by_id: HashMap<String, Type>,
    next_id: u64,
}

impl ContextState {
    /// Next temporary id not taken by an explicitly registered type
    fn fresh_id(&mut self) -> String {
        loop {
            self.next_id += 1;
            let candidate = format!("{}{}", ID_TEMPORARY_PREFIX, self.next_id);
            if !self.types_by_id.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn register(&mut self, ty: &Type, tid: String) {
        self.ids_by_type.insert(ty.uid(), tid.clone());
        self.types_by_id.insert(tid, ty.clone());
    }
}

/// Registry of anonymous types and their temporary ids
#[derive(Clone, Default)]
pub struct SpecificationContext(Arc<Mutex<ContextState>>);

impl SpecificationContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// The ambient context, if any
    pub fn current() -> Option<SpecificationContext> {
        CURRENT.with(|c| c.borrow().clone())
    }

    /// Replace the ambient context, returning the previous one
    pub fn set_current(context: Option<SpecificationContext>) -> Option<SpecificationContext> {
        CURRENT.with(|c| std::mem::replace(&mut *c.borrow_mut(), context))
    }

    /// Whether an id is a temporary id
    pub fn is_id_temporary(id: Option<&str>) -> bool {
        match id {
            Some(id) => !id.is_empty() && id.starts_with(ID_TEMPORARY_PREFIX),
            None => false,
        }
    }

    /// Register a type, returning the id by which it is referenced
    ///
    /// Permanent types return their id and are not registered. Anonymous
    /// types already registered keep their id. Otherwise `tid` is honored
    /// when given, or a fresh temporary id is minted.
    pub fn add(&self, ty: &Type, tid: Option<&str>) -> Result<String> {
        if let Some(id) = ty.id() {
            return Ok(id.to_string());
        }
        let mut state = self.0.lock();
        if let Some(existing) = state.ids_by_type.get(&ty.uid()) {
            return Ok(existing.clone());
        }
        let tid = match tid {
            Some(tid) => {
                if !Self::is_id_temporary(Some(tid)) {
                    return Err(Error::argument_invalid(
                        "id",
                        format!("'{}' is not a temporary id", tid),
                    ));
                }
                if state.types_by_id.contains_key(tid) {
                    return Err(Error::argument_invalid(
                        "id",
                        format!("temporary id '{}' is already used by another type", tid),
                    ));
                }
                tid.to_string()
            }
            None => state.fresh_id(),
        };
        state.register(ty, tid.clone());
        Ok(tid)
    }

    /// Id of an anonymous type, registering it under a fresh temporary id if needed
    pub(crate) fn add_anonymous(&self, ty: &Type) -> String {
        let mut state = self.0.lock();
        if let Some(existing) = state.ids_by_type.get(&ty.uid()) {
            return existing.clone();
        }
        let tid = state.fresh_id();
        state.register(ty, tid.clone());
        tid
    }

    /// Id of a type: permanent id, or temporary id if registered
    pub fn get_id_of(&self, ty: &Type) -> Option<String> {
        if let Some(id) = ty.id() {
            return Some(id.to_string());
        }
        self.0.lock().ids_by_type.get(&ty.uid()).cloned()
    }

    /// Type registered under a temporary id
    pub fn get(&self, tid: &str) -> Option<Type> {
        self.0.lock().types_by_id.get(tid).cloned()
    }

    /// Number of registered anonymous types
    pub fn len(&self) -> usize {
        self.0.lock().types_by_id.len()
    }

    /// Whether no anonymous type is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop being the ambient context, if this is it
    pub fn dispose(&self) {
        CURRENT.with(|c| {
            let mut current = c.borrow_mut();
            if current.as_ref().is_some_and(|cur| cur.ptr_eq(self)) {
                *current = None;
            }
        });
    }

    /// Whether two handles refer to the same context
    pub fn ptr_eq(&self, other: &SpecificationContext) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SpecificationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecificationContext")
            .field("types", &self.len())
            .finish()
    }
}

/// Scope making a specification context ambient
///
/// Disposing (or dropping) the scope restores the context that was ambient
/// when it was created.
pub struct SpecificationScope {
    context: SpecificationContext,
    previous: Option<SpecificationContext>,
    disposed: bool,
}

impl SpecificationScope {
    /// Enter a scope over the ambient context, or a new one if none is ambient
    pub fn new() -> Self {
        let context = SpecificationContext::current().unwrap_or_default();
        Self::with_context(context)
    }

    /// Enter a scope over a given context
    pub fn with_context(context: SpecificationContext) -> Self {
        let previous = SpecificationContext::set_current(Some(context.clone()));
        Self {
            context,
            previous,
            disposed: false,
        }
    }

    /// The context of this scope
    pub fn context(&self) -> &SpecificationContext {
        &self.context
    }

    /// Whether this scope created the outermost ambient context
    pub fn is_root(&self) -> bool {
        self.previous.is_none()
    }

    /// Exit the scope
    pub fn dispose(mut self) {
        self.exit();
    }

    fn exit(&mut self) {
        if !self.disposed {
            self.disposed = true;
            SpecificationContext::set_current(self.previous.take());
        }
    }
}

impl Default for SpecificationScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SpecificationScope {
    fn drop(&mut self) {
        self.exit();
    }
}
