//! Transactions
//!
//! A transaction groups the changesets created during one logical edit.
//! Entering a transaction while one is ambient on the current thread nests a
//! scope over the existing one instead of creating a new transaction, so
//! operations that mutate values compose without double-transacting.
//!
//! ## Commit
//!
//! Accepting a transaction:
//!
//! 1. Calls `will_change` on the observers of every owner, in changeset order;
//!    the first error rejects the transaction and is returned
//! 2. Applies every changeset, in the order the changesets were created
//! 3. Calls `did_change` on the observers
//!
//! Rejecting cancels every changeset and calls `rejected_change`; owners are
//! left in their pre-transaction state.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pentype_core::{Error, Result};
use tracing::{debug, warn};

use crate::changeset::{Changeset, ComplexChangeset, ListChangeset};
use crate::value::{Complex, List};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<Transaction>> = const { RefCell::new(None) };
}

/// Status of a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionStatus {
    /// Recording changes
    Proposed,
    /// Changes applied
    Committed,
    /// Changes discarded
    Rejected {
        /// Why the transaction was rejected
        reason: Error,
    },
}

struct State {
    status: TransactionStatus,
    changesets: Vec<Changeset>,
    by_owner: HashMap<u64, usize>,
}

pub(crate) struct TransactionInner {
    id: u64,
    state: Mutex<State>,
}

/// Handle to a transaction
#[derive(Clone)]
pub struct Transaction(Arc<TransactionInner>);

/// Weak handle held by changesets
pub(crate) struct WeakTransaction(Weak<TransactionInner>);

impl WeakTransaction {
    pub(crate) fn upgrade(&self) -> Option<Transaction> {
        self.0.upgrade().map(Transaction)
    }
}

impl Transaction {
    fn new() -> Self {
        let id = NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(target: "pentype::txn", txn_id = id, "Transaction begin");
        Self(Arc::new(TransactionInner {
            id,
            state: Mutex::new(State {
                status: TransactionStatus::Proposed,
                changesets: Vec::new(),
                by_owner: HashMap::new(),
            }),
        }))
    }

    /// The ambient transaction of the current thread
    pub fn current() -> Option<Transaction> {
        CURRENT.with(|c| c.borrow().clone())
    }

    /// Enter a transaction scope
    ///
    /// Nests over the ambient transaction if there is one; otherwise starts
    /// a new transaction, owned by the returned root scope.
    pub fn enter() -> TransactionScope {
        match Self::current() {
            Some(txn) if txn.is_proposed() => TransactionScope::nested(txn),
            _ => TransactionScope::root(Transaction::new()),
        }
    }

    /// Run a closure inside a transaction scope
    ///
    /// A root scope accepts on `Ok` and rejects on `Err`. A nested scope
    /// leaves the decision to the enclosing one.
    pub fn run<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
        let scope = Self::enter();
        match f() {
            Ok(value) => {
                scope.accept()?;
                Ok(value)
            }
            Err(e) => {
                if scope.is_root() {
                    scope.reject(e.clone());
                } else {
                    scope.exit();
                }
                Err(e)
            }
        }
    }

    /// Unique number of this transaction
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        self.0.state.lock().status.clone()
    }

    /// Whether the transaction still records changes
    pub fn is_proposed(&self) -> bool {
        self.0.state.lock().status == TransactionStatus::Proposed
    }

    /// All changesets, in creation order
    pub fn changesets(&self) -> Vec<Changeset> {
        self.0.state.lock().changesets.clone()
    }

    /// Changeset of a value, by the value's unique number
    pub fn get_changeset(&self, owner_uid: u64) -> Option<Changeset> {
        let st = self.0.state.lock();
        st.by_owner.get(&owner_uid).map(|&i| st.changesets[i].clone())
    }

    /// Get or create the changeset of a complex value
    pub fn ensure_complex_changeset(&self, owner: &Complex) -> Result<ComplexChangeset> {
        let changeset = self.ensure(owner.uid(), || {
            Changeset::Complex(ComplexChangeset::new(owner.clone(), self))
        })?;
        match changeset {
            Changeset::Complex(cs) => Ok(cs),
            Changeset::List(_) => Err(Error::operation_invalid(
                "Owner already has a list changeset",
            )),
        }
    }

    /// Get or create the changeset of a list value
    ///
    /// A list held by a property also gets its owner's changeset, which
    /// records the list changeset as a child.
    pub fn ensure_list_changeset(&self, owner: &List) -> Result<ListChangeset> {
        let changeset = self.ensure(owner.uid(), || {
            Changeset::List(ListChangeset::new(owner.clone(), self))
        })?;
        let Changeset::List(cs) = changeset else {
            return Err(Error::operation_invalid(
                "Owner already has a complex changeset",
            ));
        };
        if let Some(parent) = owner.owner() {
            self.ensure_complex_changeset(&parent)?
                .add_child(Changeset::List(cs.clone()));
        }
        Ok(cs)
    }

    fn ensure(&self, uid: u64, create: impl FnOnce() -> Changeset) -> Result<Changeset> {
        let mut st = self.0.state.lock();
        if st.status != TransactionStatus::Proposed {
            return Err(Error::operation_invalid(
                "Transaction is no longer proposed",
            ));
        }
        if let Some(&i) = st.by_owner.get(&uid) {
            return Ok(st.changesets[i].clone());
        }
        let changeset = create();
        let index = st.changesets.len();
        st.changesets.push(changeset.clone());
        st.by_owner.insert(uid, index);
        Ok(changeset)
    }

    /// Commit: apply every changeset to its owner
    pub fn accept(&self) -> Result<()> {
        let changesets = {
            let st = self.0.state.lock();
            match &st.status {
                TransactionStatus::Proposed => {}
                TransactionStatus::Committed => return Ok(()),
                TransactionStatus::Rejected { reason } => return Err(reason.clone()),
            }
            st.changesets.clone()
        };

        for changeset in &changesets {
            for observer in changeset.observers() {
                if let Err(reason) = observer.will_change(changeset) {
                    self.reject(reason.clone());
                    return Err(reason);
                }
            }
        }

        {
            let mut st = self.0.state.lock();
            if st.status != TransactionStatus::Proposed {
                return Err(Error::operation_invalid(
                    "Transaction changed status while committing",
                ));
            }
            st.status = TransactionStatus::Committed;
        }
        for changeset in &changesets {
            changeset.apply();
        }
        debug!(
            target: "pentype::txn",
            txn_id = self.0.id,
            changesets = changesets.len(),
            "Transaction committed"
        );
        for changeset in &changesets {
            for observer in changeset.observers() {
                observer.did_change(changeset);
            }
        }
        Ok(())
    }

    /// Discard every changeset; no-op once committed or rejected
    pub fn reject(&self, reason: Error) {
        let changesets = {
            let mut st = self.0.state.lock();
            if st.status != TransactionStatus::Proposed {
                return;
            }
            st.status = TransactionStatus::Rejected {
                reason: reason.clone(),
            };
            st.changesets.clone()
        };
        for changeset in &changesets {
            changeset.cancel();
        }
        warn!(target: "pentype::txn", txn_id = self.0.id, reason = %reason, "Transaction rejected");
        for changeset in &changesets {
            for observer in changeset.observers() {
                observer.rejected_change(changeset, &reason);
            }
        }
    }

    /// Whether two handles refer to the same transaction
    pub fn ptr_eq(&self, other: &Transaction) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakTransaction {
        WeakTransaction(Arc::downgrade(&self.0))
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.0.id)
            .field("status", &self.status())
            .finish()
    }
}

/// Changeset of a value in the ambient transaction, if it is still proposed
pub(crate) fn ambient_changeset(owner_uid: u64) -> Option<Changeset> {
    let txn = Transaction::current()?;
    if !txn.is_proposed() {
        return None;
    }
    txn.get_changeset(owner_uid)
}

// ============================================================================
// TransactionScope
// ============================================================================

/// Scope making a transaction ambient on the current thread
///
/// Dropping a root scope that was neither accepted nor rejected rejects its
/// transaction.
#[must_use = "dropping a root scope rejects its transaction"]
pub struct TransactionScope {
    transaction: Transaction,
    previous: Option<Transaction>,
    is_root: bool,
    exited: bool,
}

impl TransactionScope {
    fn root(transaction: Transaction) -> Self {
        let previous = CURRENT.with(|c| c.borrow_mut().replace(transaction.clone()));
        Self {
            transaction,
            previous,
            is_root: true,
            exited: false,
        }
    }

    fn nested(transaction: Transaction) -> Self {
        let previous = CURRENT.with(|c| c.borrow_mut().replace(transaction.clone()));
        Self {
            transaction,
            previous,
            is_root: false,
            exited: false,
        }
    }

    /// The transaction of this scope
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Whether this scope owns its transaction
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Exit the scope; a root scope commits its transaction
    pub fn accept(mut self) -> Result<()> {
        self.restore();
        if self.is_root {
            self.transaction.accept()
        } else {
            Ok(())
        }
    }

    /// Exit the scope and reject the transaction
    pub fn reject(mut self, reason: Error) {
        self.restore();
        self.transaction.reject(reason);
    }

    /// Exit the scope; a root scope rejects its transaction unless already settled
    pub fn dispose(self) {}

    /// Exit without settling the transaction
    fn exit(mut self) {
        self.restore();
        self.is_root = false;
    }

    fn restore(&mut self) {
        if !self.exited {
            self.exited = true;
            let previous = self.previous.take();
            CURRENT.with(|c| *c.borrow_mut() = previous);
        }
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        self.restore();
        if self.is_root && self.transaction.is_proposed() {
            self.transaction
                .reject(Error::operation_invalid("Transaction scope disposed without accept"));
        }
    }
}
