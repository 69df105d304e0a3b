//! Complex changeset
//!
//! Records `Replace` changes of element properties, at most one per property.
//! A replace that restores the committed value is dropped. List properties
//! keep the same list value for the life of their owner, so their changes
//! live in the list's own changeset, registered here as a child.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use pentype_core::Result;

use super::{ensure_proposed, Changeset, ChangesetStatus};
use crate::transaction::{Transaction, WeakTransaction};
use crate::types::PropertyType;
use crate::value::{Complex, Value};

/// Replacement of the value of an element property
#[derive(Debug, Clone)]
pub struct Replace {
    /// Name of the property
    pub property: String,
    /// Index of the property within the owner's type
    pub index: usize,
    /// New value, `None` clearing the property
    pub value: Option<Value>,
}

struct State {
    status: ChangesetStatus,
    changes: BTreeMap<usize, Replace>,
    children: Vec<Changeset>,
}

struct ComplexChangesetInner {
    owner: Complex,
    transaction: WeakTransaction,
    state: Mutex<State>,
}

/// Changeset of a complex value
#[derive(Clone)]
pub struct ComplexChangeset(Arc<ComplexChangesetInner>);

impl ComplexChangeset {
    pub(crate) fn new(owner: Complex, transaction: &Transaction) -> Self {
        Self(Arc::new(ComplexChangesetInner {
            owner,
            transaction: transaction.downgrade(),
            state: Mutex::new(State {
                status: ChangesetStatus::Proposed,
                changes: BTreeMap::new(),
                children: Vec::new(),
            }),
        }))
    }

    /// The complex value whose changes are recorded
    pub fn owner(&self) -> &Complex {
        &self.0.owner
    }

    /// Current status
    pub fn status(&self) -> ChangesetStatus {
        self.0.state.lock().status
    }

    /// The transaction this changeset belongs to
    pub fn transaction(&self) -> Option<Transaction> {
        self.0.transaction.upgrade()
    }

    /// Own changes, in property order
    pub fn changes(&self) -> Vec<Replace> {
        self.0.state.lock().changes.values().cloned().collect()
    }

    /// Change of one property, if any
    pub fn get_change(&self, property: &str) -> Option<Replace> {
        let index = self.0.owner.ty().get_property(property)?.index();
        self.0.state.lock().changes.get(&index).cloned()
    }

    /// Nested changesets (list properties and updated element values)
    pub fn children(&self) -> Vec<Changeset> {
        self.0.state.lock().children.clone()
    }

    /// Whether own changes exist or any nested changeset has changes
    pub fn has_changes(&self) -> bool {
        let children = {
            let st = self.0.state.lock();
            if !st.changes.is_empty() {
                return true;
            }
            st.children.clone()
        };
        children.iter().any(Changeset::has_changes)
    }

    /// Projected value of an element property, when it has been replaced
    pub(crate) fn projected(&self, index: usize) -> Option<Option<Value>> {
        self.0
            .state
            .lock()
            .changes
            .get(&index)
            .map(|change| change.value.clone())
    }

    /// Record the new value of an element property
    pub fn set_element(&self, property: &PropertyType, value: Option<Value>) -> Result<()> {
        let mut st = self.0.state.lock();
        ensure_proposed(st.status)?;
        let committed = self.0.owner.committed_element(property.index());
        let unchanged = match (&committed, &value) {
            (None, None) => true,
            (Some(a), Some(b)) => a.equals(b),
            _ => false,
        };
        if unchanged {
            st.changes.remove(&property.index());
        } else {
            st.changes.insert(
                property.index(),
                Replace {
                    property: property.name().to_string(),
                    index: property.index(),
                    value,
                },
            );
        }
        Ok(())
    }

    /// Whether two handles refer to the same changeset
    pub fn ptr_eq(&self, other: &ComplexChangeset) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn add_child(&self, child: Changeset) {
        let mut st = self.0.state.lock();
        if !st.children.iter().any(|c| c.ptr_eq(&child)) {
            st.children.push(child);
        }
    }

    pub(crate) fn apply(&self) {
        let mut st = self.0.state.lock();
        if st.status != ChangesetStatus::Proposed {
            return;
        }
        st.status = ChangesetStatus::Applied;
        let changes = std::mem::take(&mut st.changes);
        self.0.owner.commit(changes.into_values());
    }

    pub(crate) fn cancel(&self) {
        let mut st = self.0.state.lock();
        if st.status == ChangesetStatus::Proposed {
            st.status = ChangesetStatus::Canceled;
        }
    }
}

impl fmt::Debug for ComplexChangeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.0.state.lock();
        f.debug_struct("ComplexChangeset")
            .field("owner", &self.0.owner.uid())
            .field("status", &st.status)
            .field("changes", &st.changes.len())
            .finish()
    }
}
