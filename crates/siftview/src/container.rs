//! Observable record containers.
//!
//! [`Container`] is the contract a container-bound source needs from the
//! collection it mirrors: a snapshot of the records, insert/remove signals,
//! and a way to observe a consistent snapshot while no mutation can slip in.
//! [`RecordList`] is a ready-made implementation.

use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};
use siftview_core::Signal;

use crate::record::record_key;

/// A live ordered collection of shared records.
pub trait Container<T>: Send + Sync {
    /// Returns a snapshot of the current records, in order.
    fn records(&self) -> Vec<Arc<T>>;

    /// Emitted after a record was inserted. Args: (record, before index)
    fn inserted(&self) -> &Signal<(Arc<T>, usize)>;

    /// Emitted after a record was removed. Args: (record, former index)
    fn removed(&self) -> &Signal<(Arc<T>, usize)>;

    /// Runs `f` over the current records while mutations are held off.
    ///
    /// Connections made inside `f` observe exactly the mutations that follow
    /// the snapshot `f` was given.
    fn with_exclusive(&self, f: &mut dyn FnMut(&[Arc<T>]));
}

/// An observable list of shared records.
///
/// Each mutation and the emission of its signal happen under one reentrant
/// mutation lock, so observers see mutations in the order they were applied
/// even when several threads mutate the list. Slots may mutate the list
/// again from the same thread.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use siftview::{Container, RecordList};
///
/// let list = RecordList::new();
/// list.inserted().connect(|(record, index): &(Arc<String>, usize)| {
///     println!("{} inserted at {}", record, index);
/// });
///
/// list.push(Arc::new("Spectrum".to_string()));
/// list.insert(0, Arc::new("Survey".to_string()));
/// assert_eq!(list.len(), 2);
/// ```
pub struct RecordList<T> {
    mutation: ReentrantMutex<()>,
    items: RwLock<Vec<Arc<T>>>,
    inserted: Signal<(Arc<T>, usize)>,
    removed: Signal<(Arc<T>, usize)>,
}

impl<T: Send + Sync + 'static> Default for RecordList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> RecordList<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::from_records(Vec::new())
    }

    /// Creates a list holding `records`. No signals are emitted.
    pub fn from_records(records: Vec<Arc<T>>) -> Self {
        Self {
            mutation: ReentrantMutex::new(()),
            items: RwLock::new(records),
            inserted: Signal::new(),
            removed: Signal::new(),
        }
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns `true` if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Returns the record at `index`.
    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.items.read().get(index).cloned()
    }

    /// Returns the index of `record`, compared by identity.
    pub fn index_of(&self, record: &Arc<T>) -> Option<usize> {
        let key = record_key(record);
        self.items.read().iter().position(|r| record_key(r) == key)
    }

    /// Inserts a record before `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len()`.
    pub fn insert(&self, index: usize, record: Arc<T>) {
        let _mutating = self.mutation.lock();
        self.items.write().insert(index, record.clone());
        self.inserted.emit((record, index));
    }

    /// Appends a record.
    pub fn push(&self, record: Arc<T>) {
        let _mutating = self.mutation.lock();
        let index = self.items.read().len();
        self.insert(index, record);
    }

    /// Removes and returns the record at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn remove(&self, index: usize) -> Arc<T> {
        let _mutating = self.mutation.lock();
        let record = self.items.write().remove(index);
        self.removed.emit((record.clone(), index));
        record
    }

    /// Removes `record` if present and returns its former index.
    pub fn remove_record(&self, record: &Arc<T>) -> Option<usize> {
        let _mutating = self.mutation.lock();
        let index = self.index_of(record)?;
        self.remove(index);
        Some(index)
    }

    /// Removes every record, last first.
    pub fn clear(&self) {
        let _mutating = self.mutation.lock();
        loop {
            let len = self.items.read().len();
            if len == 0 {
                break;
            }
            self.remove(len - 1);
        }
    }
}

impl<T: Send + Sync + 'static> Container<T> for RecordList<T> {
    fn records(&self) -> Vec<Arc<T>> {
        self.items.read().clone()
    }

    fn inserted(&self) -> &Signal<(Arc<T>, usize)> {
        &self.inserted
    }

    fn removed(&self) -> &Signal<(Arc<T>, usize)> {
        &self.removed
    }

    fn with_exclusive(&self, f: &mut dyn FnMut(&[Arc<T>])) {
        let _mutating = self.mutation.lock();
        let snapshot = self.items.read().clone();
        f(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn record(title: &str) -> Arc<String> {
        Arc::new(title.to_string())
    }

    #[test]
    fn test_insert_and_remove_emit() {
        let list = RecordList::new();
        let events = Arc::new(Mutex::new(Vec::new()));

        let events_clone = events.clone();
        list.inserted().connect(move |(r, i): &(Arc<String>, usize)| {
            events_clone.lock().push(format!("+{r}@{i}"));
        });
        let events_clone = events.clone();
        list.removed().connect(move |(r, i): &(Arc<String>, usize)| {
            events_clone.lock().push(format!("-{r}@{i}"));
        });

        list.push(record("A"));
        list.insert(0, record("B"));
        let removed = list.remove(1);
        assert_eq!(*removed, "A");

        assert_eq!(*events.lock(), vec!["+A@0", "+B@0", "-A@1"]);
    }

    #[test]
    fn test_remove_record_by_identity() {
        let a = record("same");
        let b = record("same");
        let list = RecordList::from_records(vec![a.clone(), b.clone()]);

        assert_eq!(list.remove_record(&b), Some(1));
        assert_eq!(list.remove_record(&b), None);
        assert_eq!(list.index_of(&a), Some(0));
    }

    #[test]
    fn test_clear_removes_from_the_back() {
        let list = RecordList::from_records(vec![record("A"), record("B"), record("C")]);
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_clone = order.clone();
        list.removed().connect(move |(r, i): &(Arc<String>, usize)| {
            order_clone.lock().push((r.to_string(), *i));
        });

        list.clear();
        assert!(list.is_empty());
        assert_eq!(
            *order.lock(),
            vec![("C".to_string(), 2), ("B".to_string(), 1), ("A".to_string(), 0)]
        );
    }

    #[test]
    fn test_slot_may_mutate_the_list() {
        let list = Arc::new(RecordList::new());

        let list_clone = list.clone();
        list.inserted().connect(move |(r, _): &(Arc<String>, usize)| {
            if r.as_str() == "first" {
                list_clone.push(record("echo"));
            }
        });

        list.push(record("first"));
        assert_eq!(list.len(), 2);
        assert_eq!(*list.get(1).unwrap(), "echo");
    }

    #[test]
    fn test_with_exclusive_sees_snapshot() {
        let list = RecordList::from_records(vec![record("A"), record("B")]);
        let mut seen = Vec::new();
        list.with_exclusive(&mut |records| {
            seen = records.iter().map(|r| r.to_string()).collect();
        });
        assert_eq!(seen, vec!["A", "B"]);
    }
}
