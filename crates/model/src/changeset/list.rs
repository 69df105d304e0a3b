//! List changeset
//!
//! Records the structural changes of a list as a log of primitive changes
//! (`Add`, `Remove`, `Move`, `Sort`, `Clear`) and keeps a projected mock of the
//! list, rebuilt lazily by replaying the log over the committed elements.
//!
//! Replay always starts at the most recent `Clear`: everything recorded
//! before it has no effect on the projected state.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;
use pentype_core::Result;

use super::{ensure_proposed, Changeset, ChangesetStatus};
use crate::transaction::{Transaction, WeakTransaction};
use crate::value::{List, ListState, Value};

/// Ordering of list elements used by a `Sort` change
pub type Comparer = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;

/// Primitive change of a list
#[derive(Clone)]
pub enum ListChange {
    /// Insert `elements` starting at `index`
    Add {
        /// Inserted elements, in order
        elements: Vec<Value>,
        /// Position of the first inserted element
        index: usize,
    },
    /// Remove the contiguous run `elements` starting at `index`
    Remove {
        /// Removed elements, in order
        elements: Vec<Value>,
        /// Position of the first removed element
        index: usize,
    },
    /// Relocate one element
    Move {
        /// Moved element
        element: Value,
        /// Position before the move
        index_old: usize,
        /// Position after the move
        index_new: usize,
    },
    /// Stable sort, applied when the list is materialized
    Sort {
        /// Element ordering
        comparer: Comparer,
    },
    /// Remove every element
    Clear,
}

impl ListChange {
    /// Name of the change kind
    pub fn kind(&self) -> &'static str {
        match self {
            ListChange::Add { .. } => "add",
            ListChange::Remove { .. } => "remove",
            ListChange::Move { .. } => "move",
            ListChange::Sort { .. } => "sort",
            ListChange::Clear => "clear",
        }
    }

    pub(crate) fn apply_to(&self, state: &mut ListState) {
        match self {
            ListChange::Add { elements, index } => state.insert(*index, elements.iter().cloned()),
            ListChange::Remove { elements, index } => {
                state.remove_range(*index, elements.len());
            }
            ListChange::Move {
                index_old,
                index_new,
                ..
            } => state.relocate(*index_old, *index_new),
            ListChange::Sort { comparer } => state.elements.sort_by(|a, b| comparer(a, b)),
            ListChange::Clear => state.clear(),
        }
    }
}

impl fmt::Debug for ListChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListChange::Add { elements, index } => f
                .debug_struct("Add")
                .field("elements", elements)
                .field("index", index)
                .finish(),
            ListChange::Remove { elements, index } => f
                .debug_struct("Remove")
                .field("elements", elements)
                .field("index", index)
                .finish(),
            ListChange::Move {
                element,
                index_old,
                index_new,
            } => f
                .debug_struct("Move")
                .field("element", element)
                .field("index_old", index_old)
                .field("index_new", index_new)
                .finish(),
            ListChange::Sort { .. } => f.write_str("Sort"),
            ListChange::Clear => f.write_str("Clear"),
        }
    }
}

/// Toggles of a bulk `set` operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListSetOptions {
    /// Add elements not yet in the list
    pub add: bool,
    /// Update existing elements in place from the new ones
    pub update: bool,
    /// Remove elements absent from the new fragment
    pub remove: bool,
    /// Reorder existing elements to follow the fragment
    pub move_: bool,
    /// Insertion point of added elements; negative counts from the end, `None` appends
    pub index: Option<isize>,
}

impl ListSetOptions {
    /// Every toggle set: the list becomes the fragment
    pub fn all() -> Self {
        Self {
            add: true,
            update: true,
            remove: true,
            move_: true,
            index: None,
        }
    }

    /// Add and update, keeping everything else
    pub fn append() -> Self {
        Self {
            add: true,
            update: true,
            ..Self::default()
        }
    }

    /// Set the insertion point
    pub fn at(mut self, index: isize) -> Self {
        self.index = Some(index);
        self
    }

    fn is_noop(&self) -> bool {
        !(self.add || self.update || self.remove || self.move_)
    }
}

struct State {
    status: ChangesetStatus,
    changes: Vec<ListChange>,
    last_clear: Option<usize>,
    mock: Option<ListState>,
    children: Vec<Changeset>,
}

struct ListChangesetInner {
    owner: List,
    transaction: WeakTransaction,
    state: Mutex<State>,
}

/// Changeset of a list value
#[derive(Clone)]
pub struct ListChangeset(Arc<ListChangesetInner>);

impl ListChangeset {
    pub(crate) fn new(owner: List, transaction: &Transaction) -> Self {
        Self(Arc::new(ListChangesetInner {
            owner,
            transaction: transaction.downgrade(),
            state: Mutex::new(State {
                status: ChangesetStatus::Proposed,
                changes: Vec::new(),
                last_clear: None,
                mock: None,
                children: Vec::new(),
            }),
        }))
    }

    /// The list whose changes are recorded
    pub fn owner(&self) -> &List {
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

    /// Effective primitive changes, starting at the most recent `Clear`
    pub fn changes(&self) -> Vec<ListChange> {
        let st = self.0.state.lock();
        st.changes[st.last_clear.unwrap_or(0)..].to_vec()
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

    /// Projected elements of the owner
    pub fn projected(&self) -> Vec<Value> {
        let mut st = self.0.state.lock();
        mock(&mut st, &self.0.owner).elements.clone()
    }

    /// Run `f` on the projected state without copying it
    ///
    /// The changeset lock is held while `f` runs.
    pub(crate) fn with_projected<R>(&self, f: impl FnOnce(&ListState) -> R) -> R {
        let mut st = self.0.state.lock();
        f(mock(&mut st, &self.0.owner))
    }

    /// Bulk set: add, update, remove and reorder elements to follow a fragment
    ///
    /// Elements are matched by key; later duplicates within the fragment are
    /// dropped. Contiguous removals are batched into one `Remove` each, all
    /// new elements go into one `Add`, and moves are emitted only for
    /// elements out of fragment order.
    pub fn set(&self, elements: Vec<Value>, options: ListSetOptions) -> Result<()> {
        let mut updates = Vec::new();
        {
            let mut st = self.0.state.lock();
            ensure_proposed(st.status)?;
            if options.is_noop() {
                return Ok(());
            }
            let current = mock(&mut st, &self.0.owner).clone();

            let mut seen: HashSet<String> = HashSet::new();
            let mut targets: Vec<Value> = Vec::new();
            let mut added: Vec<Value> = Vec::new();
            for element in elements {
                let key = element.key();
                if !seen.insert(key.clone()) {
                    continue;
                }
                match current.get(&key) {
                    Some(existing) => {
                        if options.update {
                            if let (Value::Complex(existing), Value::Complex(source)) =
                                (existing, &element)
                            {
                                if !existing.ptr_eq(source) {
                                    updates.push((existing.clone(), source.clone()));
                                }
                            }
                        }
                        targets.push(existing.clone());
                    }
                    None => {
                        added.push(element.clone());
                        targets.push(element);
                    }
                }
            }

            let mut index = normalize_insert_index(options.index, current.len());

            if options.remove {
                let removed: Vec<usize> = current
                    .elements
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| !seen.contains(&e.key()))
                    .map(|(i, _)| i)
                    .collect();
                index -= removed.iter().filter(|&&i| i < index).count();
                for run in contiguous_runs(&removed).into_iter().rev() {
                    let elements = current.elements[run.clone()].to_vec();
                    push(
                        &mut st,
                        ListChange::Remove {
                            elements,
                            index: run.start,
                        },
                    );
                }
            }

            if options.add && !added.is_empty() {
                push(
                    &mut st,
                    ListChange::Add {
                        elements: added,
                        index,
                    },
                );
            }

            if options.move_ {
                let mut last: Option<usize> = None;
                for target in &targets {
                    let Some(current_index) = mock(&mut st, &self.0.owner).index_of_key(&target.key())
                    else {
                        continue;
                    };
                    match last {
                        Some(last) if current_index < last => push(
                            &mut st,
                            ListChange::Move {
                                element: target.clone(),
                                index_old: current_index,
                                index_new: last,
                            },
                        ),
                        _ => last = Some(current_index),
                    }
                }
            }
        }

        // Nested updates take their own locks
        for (existing, source) in updates {
            existing.configure_from(&source)?;
            if let Some(child) = self
                .transaction()
                .and_then(|txn| txn.get_changeset(existing.uid()))
            {
                self.add_child(child);
            }
        }
        Ok(())
    }

    /// Remove elements by key, in batches of contiguous runs
    pub fn remove(&self, elements: &[Value]) -> Result<()> {
        let mut st = self.0.state.lock();
        ensure_proposed(st.status)?;
        let current = mock(&mut st, &self.0.owner);
        let mut seen: HashSet<String> = HashSet::new();
        let mut indexes: Vec<usize> = elements
            .iter()
            .map(Value::key)
            .filter(|key| seen.insert(key.clone()))
            .filter_map(|key| current.index_of_key(&key))
            .collect();
        indexes.sort_unstable();
        let runs: Vec<(Vec<Value>, usize)> = contiguous_runs(&indexes)
            .into_iter()
            .rev()
            .map(|run| (current.elements[run.clone()].to_vec(), run.start))
            .collect();
        for (elements, index) in runs {
            push(&mut st, ListChange::Remove { elements, index });
        }
        Ok(())
    }

    /// Remove `count` elements starting at `start`; a negative start counts from the end
    pub fn remove_at(&self, start: isize, count: usize) -> Result<()> {
        let mut st = self.0.state.lock();
        ensure_proposed(st.status)?;
        let current = mock(&mut st, &self.0.owner);
        let len = current.len();
        let start = normalize_insert_index(Some(start), len);
        let end = start.saturating_add(count).min(len);
        if start >= end {
            return Ok(());
        }
        let elements = current.elements[start..end].to_vec();
        push(&mut st, ListChange::Remove { elements, index: start });
        Ok(())
    }

    /// Relocate an element; no-op when absent or already in place
    pub fn move_to(&self, element: &Value, index: isize) -> Result<()> {
        let mut st = self.0.state.lock();
        ensure_proposed(st.status)?;
        let current = mock(&mut st, &self.0.owner);
        let Some(index_old) = current.index_of_key(&element.key()) else {
            return Ok(());
        };
        let len = current.len();
        let index_new = normalize_insert_index(Some(index), len).min(len - 1);
        if index_new == index_old {
            return Ok(());
        }
        let element = current.elements[index_old].clone();
        push(
            &mut st,
            ListChange::Move {
                element,
                index_old,
                index_new,
            },
        );
        Ok(())
    }

    /// Record a sort, applied when the list is next materialized
    pub fn sort(&self, comparer: Comparer) -> Result<()> {
        let mut st = self.0.state.lock();
        ensure_proposed(st.status)?;
        push(&mut st, ListChange::Sort { comparer });
        Ok(())
    }

    /// Record the removal of every element
    pub fn clear(&self) -> Result<()> {
        let mut st = self.0.state.lock();
        ensure_proposed(st.status)?;
        push(&mut st, ListChange::Clear);
        Ok(())
    }

    /// Whether two handles refer to the same changeset
    pub fn ptr_eq(&self, other: &ListChangeset) -> bool {
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
        let projected = match st.mock.take() {
            Some(mock) => mock,
            None => replay(&st, &self.0.owner),
        };
        st.status = ChangesetStatus::Applied;
        self.0.owner.commit(projected);
    }

    pub(crate) fn cancel(&self) {
        let mut st = self.0.state.lock();
        if st.status == ChangesetStatus::Proposed {
            st.status = ChangesetStatus::Canceled;
            st.mock = None;
        }
    }
}

impl fmt::Debug for ListChangeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.0.state.lock();
        f.debug_struct("ListChangeset")
            .field("owner", &self.0.owner.uid())
            .field("status", &st.status)
            .field("changes", &st.changes.len())
            .finish()
    }
}

fn replay(st: &State, owner: &List) -> ListState {
    let (mut state, from) = match st.last_clear {
        Some(clear) => (ListState::default(), clear + 1),
        None => (owner.committed(), 0),
    };
    for change in &st.changes[from..] {
        change.apply_to(&mut state);
    }
    state
}

fn mock<'a>(st: &'a mut State, owner: &List) -> &'a mut ListState {
    if st.mock.is_none() {
        st.mock = Some(replay(st, owner));
    }
    st.mock.get_or_insert_with(ListState::default)
}

fn push(st: &mut State, change: ListChange) {
    match &change {
        ListChange::Clear => {
            st.last_clear = Some(st.changes.len());
            st.mock = Some(ListState::default());
        }
        ListChange::Sort { .. } => st.mock = None,
        other => {
            if let Some(mock) = st.mock.as_mut() {
                other.apply_to(mock);
            }
        }
    }
    st.changes.push(change);
}

/// Insertion point within a list of `len` elements
fn normalize_insert_index(index: Option<isize>, len: usize) -> usize {
    match index {
        None => len,
        Some(i) if i < 0 => len.saturating_sub(i.unsigned_abs()),
        Some(i) => (i as usize).min(len),
    }
}

/// Group sorted indexes into ranges of consecutive values
fn contiguous_runs(indexes: &[usize]) -> Vec<Range<usize>> {
    let mut runs: Vec<Range<usize>> = Vec::new();
    for &i in indexes {
        match runs.last_mut() {
            Some(run) if run.end == i => run.end = i + 1,
            _ => runs.push(i..i + 1),
        }
    }
    runs
}
