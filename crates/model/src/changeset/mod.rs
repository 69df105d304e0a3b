//! Changesets
//!
//! A changeset records the changes made to one value within one transaction.
//! It is the delta from the committed state of its owner to the projected
//! state seen from inside the transaction.
//!
//! ## Lifecycle
//!
//! ```text
//! Proposed ──accept──> Applied
//!     │
//!     └──reject──> Canceled
//! ```
//!
//! Once applied or canceled, every mutating operation fails with
//! operation-invalid. Reads of the owner inside the transaction see the
//! projected state; reads outside see the committed state.

pub mod complex;
pub mod list;

use std::fmt;
use std::sync::Arc;

use pentype_core::{Error, Result};

use crate::transaction::Transaction;
use crate::value::Value;

pub use complex::{ComplexChangeset, Replace};
pub use list::{Comparer, ListChange, ListChangeset, ListSetOptions};

/// Status of a changeset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangesetStatus {
    /// Still accepting changes
    Proposed,
    /// Applied to its owner
    Applied,
    /// Discarded
    Canceled,
}

/// Observer of the changes of a value
///
/// All methods have empty defaults.
pub trait ChangeObserver: Send + Sync {
    /// Called before the transaction applies the changeset; an error vetoes the whole transaction
    fn will_change(&self, _changeset: &Changeset) -> Result<()> {
        Ok(())
    }

    /// Called after the changeset has been applied
    fn did_change(&self, _changeset: &Changeset) {}

    /// Called when the transaction owning the changeset is rejected
    fn rejected_change(&self, _changeset: &Changeset, _reason: &Error) {}
}

/// Shared list of observers of one value
pub(crate) type Observers = parking_lot::RwLock<Vec<Arc<dyn ChangeObserver>>>;

/// Changeset of a complex or list value
#[derive(Clone)]
pub enum Changeset {
    /// Property replacements of a complex value
    Complex(ComplexChangeset),
    /// Structural changes of a list value
    List(ListChangeset),
}

impl Changeset {
    /// The value whose changes are recorded
    pub fn owner(&self) -> Value {
        match self {
            Changeset::Complex(cs) => Value::Complex(cs.owner().clone()),
            Changeset::List(cs) => Value::List(cs.owner().clone()),
        }
    }

    /// Unique number of the owner
    pub fn owner_uid(&self) -> u64 {
        match self {
            Changeset::Complex(cs) => cs.owner().uid(),
            Changeset::List(cs) => cs.owner().uid(),
        }
    }

    /// Current status
    pub fn status(&self) -> ChangesetStatus {
        match self {
            Changeset::Complex(cs) => cs.status(),
            Changeset::List(cs) => cs.status(),
        }
    }

    /// The transaction this changeset belongs to, while it is alive
    pub fn transaction(&self) -> Option<Transaction> {
        match self {
            Changeset::Complex(cs) => cs.transaction(),
            Changeset::List(cs) => cs.transaction(),
        }
    }

    /// Whether own changes exist or any nested changeset has changes
    pub fn has_changes(&self) -> bool {
        match self {
            Changeset::Complex(cs) => cs.has_changes(),
            Changeset::List(cs) => cs.has_changes(),
        }
    }

    /// As a complex changeset
    pub fn as_complex(&self) -> Option<&ComplexChangeset> {
        match self {
            Changeset::Complex(cs) => Some(cs),
            Changeset::List(_) => None,
        }
    }

    /// As a list changeset
    pub fn as_list(&self) -> Option<&ListChangeset> {
        match self {
            Changeset::List(cs) => Some(cs),
            Changeset::Complex(_) => None,
        }
    }

    pub(crate) fn observers(&self) -> Vec<Arc<dyn ChangeObserver>> {
        match self {
            Changeset::Complex(cs) => cs.owner().observers(),
            Changeset::List(cs) => cs.owner().observers(),
        }
    }

    pub(crate) fn add_child(&self, child: Changeset) {
        match self {
            Changeset::Complex(cs) => cs.add_child(child),
            Changeset::List(cs) => cs.add_child(child),
        }
    }

    pub(crate) fn apply(&self) {
        match self {
            Changeset::Complex(cs) => cs.apply(),
            Changeset::List(cs) => cs.apply(),
        }
    }

    pub(crate) fn cancel(&self) {
        match self {
            Changeset::Complex(cs) => cs.cancel(),
            Changeset::List(cs) => cs.cancel(),
        }
    }

    /// Whether two handles refer to the same changeset
    pub fn ptr_eq(&self, other: &Changeset) -> bool {
        match (self, other) {
            (Changeset::Complex(a), Changeset::Complex(b)) => a.ptr_eq(b),
            (Changeset::List(a), Changeset::List(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Changeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Changeset::Complex(cs) => cs.fmt(f),
            Changeset::List(cs) => cs.fmt(f),
        }
    }
}

pub(crate) fn ensure_proposed(status: ChangesetStatus) -> Result<()> {
    match status {
        ChangesetStatus::Proposed => Ok(()),
        ChangesetStatus::Applied => Err(Error::operation_invalid(
            "Changeset has already been applied",
        )),
        ChangesetStatus::Canceled => Err(Error::operation_invalid(
            "Changeset has already been canceled",
        )),
    }
}
