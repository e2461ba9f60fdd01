//! The incremental view engine.
//!
//! A [`ViewEngine`] mirrors a master ordered list of records and maintains a
//! derived list: the master records passing the current filter, in the order
//! of the current sort (or in master order without one). Every change to the
//! derived list is published to listeners as a sequence of single-record
//! removals and insertions, each valid against the list as it stands at that
//! moment.
//!
//! # Threading
//!
//! All state lives behind one reentrant lock. Predicates, sort keys,
//! listeners and tracker observers run with the lock held but without any
//! outstanding mutable borrow, so they may read the view (`items`, `len`,
//! `get`) or open a change batch from the same thread. Other threads wait.
//! Changes made from inside a notification are deferred until every
//! listener and tracker has seen the current edit, then settled at once.
//!
//! # Notification order
//!
//! For every derived-list edit, listeners run first in registration order,
//! then index trackers are shifted.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use siftview_core::PerfSpan;
use siftview_core::logging::targets;
use slotmap::{SlotMap, new_key_type};

use crate::config::ViewConfig;
use crate::error::{ConfigError, Result, ViewError};
use crate::predicate::Predicate;
use crate::reconcile::{self, Edit};
use crate::record::{Record, Value, record_key};
use crate::sort::SortSpec;
use crate::source::{ChainedSource, ChangeSink, ContainerSource, SourceAdapter, SourceConnection};
use crate::container::Container;
use crate::tracker::{IndexTracker, SelectionStyle};

new_key_type! {
    /// Token returned by [`ViewEngine::subscribe`].
    pub struct ListenerId;
}

/// Logs a broken structural invariant and panics.
macro_rules! invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            tracing::error!(target: targets::ENGINE, $($arg)+);
            panic!($($arg)+);
        }
    };
}

/// Observer of a view's derived list.
///
/// `inserted` and `removed` describe one edit each, with the index valid
/// against the derived list immediately before (for removals) or after (for
/// insertions) that edit.
pub trait ViewListener<T>: Send + Sync {
    /// `record` now sits at `index`.
    fn inserted(&self, record: &Arc<T>, index: usize);

    /// `record` was taken out of `index`.
    fn removed(&self, record: &Arc<T>, index: usize);

    /// `record`, still at `index`, reported a content change that did not
    /// affect its membership or position.
    fn content_changed(&self, _record: &Arc<T>, _index: usize) {}
}

type EditFn<T> = Box<dyn Fn(&Arc<T>, usize) + Send + Sync>;

/// Adapts a pair of closures into a [`ViewListener`].
struct FnListener<T> {
    on_insert: EditFn<T>,
    on_remove: EditFn<T>,
}

impl<T> ViewListener<T> for FnListener<T> {
    fn inserted(&self, record: &Arc<T>, index: usize) {
        (self.on_insert)(record, index);
    }

    fn removed(&self, record: &Arc<T>, index: usize) {
        (self.on_remove)(record, index);
    }
}

struct Listeners<T> {
    slots: SlotMap<ListenerId, Arc<dyn ViewListener<T>>>,
    order: Vec<ListenerId>,
}

struct Attachment<T> {
    // Held so the source outlives its connection.
    _source: Arc<dyn SourceAdapter<T>>,
    connection: SourceConnection,
}

struct EngineState<T> {
    master: Vec<Arc<T>>,
    master_keys: HashSet<usize>,
    derived: Vec<Arc<T>>,
    derived_keys: HashSet<usize>,
    filter: Option<Arc<Predicate<T>>>,
    sort: Option<SortSpec<T>>,
    change_level: usize,
    /// Set when something happened during a batch that the derived list has
    /// not caught up with.
    dirty: bool,
    pending_updates: Vec<Arc<T>>,
    epoch: u64,
}

impl<T> EngineState<T> {
    fn new() -> Self {
        Self {
            master: Vec::new(),
            master_keys: HashSet::new(),
            derived: Vec::new(),
            derived_keys: HashSet::new(),
            filter: None,
            sort: None,
            change_level: 0,
            dirty: false,
            pending_updates: Vec::new(),
            epoch: 0,
        }
    }

    fn derived_position(&self, key: usize) -> Option<usize> {
        if !self.derived_keys.contains(&key) {
            return None;
        }
        self.derived.iter().position(|r| record_key(r) == key)
    }

    fn master_position(&self, key: usize) -> Option<usize> {
        if !self.master_keys.contains(&key) {
            return None;
        }
        self.master.iter().position(|r| record_key(r) == key)
    }
}

/// A live filtered and sorted view over a master list of records.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use siftview::{Predicate, RecordList, Record, SortSpec, Value, ViewEngine};
///
/// struct Title(String);
///
/// impl Record for Title {
///     fn field(&self, name: &str) -> Option<Value> {
///         (name == "title").then(|| Value::from(self.0.as_str()))
///     }
/// }
///
/// let list = Arc::new(RecordList::<Title>::new());
/// for title in ["DEF", "ABC", "GHI"] {
///     list.push(Arc::new(Title(title.into())));
/// }
///
/// let view = ViewEngine::<Title>::new();
/// view.set_sort(SortSpec::by_field("title"));
/// view.set_filter(Predicate::not_eq("title", "GHI"));
/// view.attach_container(list.clone());
///
/// let titles: Vec<_> = view.items().iter().map(|t| t.0.clone()).collect();
/// assert_eq!(titles, ["ABC", "DEF"]);
/// ```
pub struct ViewEngine<T: Record> {
    this: Weak<Self>,
    state: ReentrantMutex<RefCell<EngineState<T>>>,
    listeners: Mutex<Listeners<T>>,
    trackers: Mutex<Vec<Weak<IndexTracker>>>,
    attachment: Mutex<Option<Attachment<T>>>,
}

impl<T: Record> ViewEngine<T> {
    /// Creates an empty, unattached view with no filter and no sort.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            state: ReentrantMutex::new(RefCell::new(EngineState::new())),
            listeners: Mutex::new(Listeners {
                slots: SlotMap::with_key(),
                order: Vec::new(),
            }),
            trackers: Mutex::new(Vec::new()),
            attachment: Mutex::new(None),
        })
    }

    /// Creates a view configured from `config`.
    pub fn with_config(config: &ViewConfig) -> std::result::Result<Arc<Self>, ConfigError> {
        let engine = Self::new();
        engine.apply_config(config)?;
        Ok(engine)
    }

    fn read<R>(&self, f: impl FnOnce(&EngineState<T>) -> R) -> R {
        let guard = self.state.lock();
        let state = guard.borrow();
        f(&state)
    }

    // Never call user code from `f`.
    fn write<R>(&self, f: impl FnOnce(&mut EngineState<T>) -> R) -> R {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    /// Runs `f` with the view locked against other threads.
    pub(crate) fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _lock = self.state.lock();
        f()
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Returns a snapshot of the derived list.
    pub fn items(&self) -> Vec<Arc<T>> {
        self.read(|s| s.derived.clone())
    }

    /// Returns the number of records in the derived list.
    pub fn len(&self) -> usize {
        self.read(|s| s.derived.len())
    }

    /// Returns `true` if no record passes the filter.
    pub fn is_empty(&self) -> bool {
        self.read(|s| s.derived.is_empty())
    }

    /// Returns the derived record at `index`.
    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.read(|s| s.derived.get(index).cloned())
    }

    /// Returns the derived index of `record`, compared by identity.
    pub fn index_of(&self, record: &Arc<T>) -> Option<usize> {
        self.read(|s| s.derived_position(record_key(record)))
    }

    /// Returns the number of records in the mirrored master list.
    pub fn master_len(&self) -> usize {
        self.read(|s| s.master.len())
    }

    /// Returns a snapshot of the mirrored master list.
    pub fn master_items(&self) -> Vec<Arc<T>> {
        self.read(|s| s.master.clone())
    }

    /// Returns the current filter, if any.
    pub fn filter(&self) -> Option<Predicate<T>> {
        self.read(|s| s.filter.as_deref().cloned())
    }

    /// Returns the current sort, if any.
    pub fn sort(&self) -> Option<SortSpec<T>> {
        self.read(|s| s.sort.clone())
    }

    /// Returns the current batch nesting depth.
    pub fn change_level(&self) -> usize {
        self.read(|s| s.change_level)
    }

    // =========================================================================
    // Source attachment
    // =========================================================================

    /// Binds the view to `source`, replacing any previous source.
    ///
    /// The old source's records are removed and the new source's records are
    /// inserted inside one batch, so listeners see a single reconciliation
    /// wave. Events from a replaced source that arrive late are dropped.
    pub fn attach(&self, source: Arc<dyn SourceAdapter<T>>) {
        let _span = PerfSpan::new("attach");
        let _batch = self.change_scope();
        self.teardown_source();

        let epoch = self.write(|s| {
            s.epoch += 1;
            s.epoch
        });
        let sink: Arc<dyn ChangeSink<T>> = Arc::new(EngineSink {
            engine: self.this.clone(),
            epoch,
        });

        // Bind without holding the view lock: the source takes its own lock
        // first and then calls back into the sink.
        let connection = source.bind(sink);
        tracing::debug!(
            target: targets::ENGINE,
            epoch,
            records = self.master_len(),
            "attached source"
        );
        *self.attachment.lock() = Some(Attachment {
            _source: source,
            connection,
        });
    }

    /// Binds the view to a live container.
    pub fn attach_container(&self, container: Arc<dyn Container<T>>) {
        self.attach(Arc::new(ContainerSource::new(container)));
    }

    /// Binds the view to another view's derived list.
    pub fn chain_from(&self, upstream: &Arc<ViewEngine<T>>) {
        self.attach(Arc::new(ChainedSource::new(upstream.clone())));
    }

    /// Unbinds the view from its source, removing every mirrored record.
    pub fn detach(&self) {
        let _batch = self.change_scope();
        self.teardown_source();
        tracing::debug!(target: targets::ENGINE, "detached source");
    }

    /// Returns `true` while a source is attached.
    pub fn is_attached(&self) -> bool {
        self.attachment.lock().is_some()
    }

    /// Detaches the source and drops every listener and tracker.
    pub fn close(&self) {
        self.detach();
        let listener_count = {
            let mut listeners = self.listeners.lock();
            let count = listeners.order.len();
            listeners.slots.clear();
            listeners.order.clear();
            count
        };
        self.trackers.lock().clear();
        tracing::debug!(target: targets::ENGINE, listener_count, "closed view");
    }

    fn teardown_source(&self) {
        // Taken out first so the connection runs without the slot locked.
        let attachment = self.attachment.lock().take();
        let was_attached = attachment.is_some();
        if let Some(attachment) = attachment {
            attachment.connection.close();
        }

        let _lock = self.state.lock();
        self.write(|s| s.epoch += 1);
        let leftover = self.master_len();
        if was_attached && leftover > 0 {
            tracing::warn!(
                target: targets::SOURCE,
                leftover,
                "source did not replay every removal; clearing the rest"
            );
        }
        for index in (0..leftover).rev() {
            let record = self.read(|s| s.master[index].clone());
            self.notify_removed(index, &record);
        }
    }

    // =========================================================================
    // Filter and sort
    // =========================================================================

    /// Replaces the filter.
    pub fn set_filter(&self, filter: Predicate<T>) {
        tracing::debug!(target: targets::ENGINE, ?filter, "set filter");
        self.replace_filter(Some(Arc::new(filter)));
    }

    /// Removes the filter; every master record passes.
    pub fn clear_filter(&self) {
        tracing::debug!(target: targets::ENGINE, "cleared filter");
        self.replace_filter(None);
    }

    fn replace_filter(&self, filter: Option<Arc<Predicate<T>>>) {
        let _lock = self.state.lock();
        let batching = self.write(|s| {
            s.filter = filter;
            s.dirty = true;
            s.change_level > 0
        });
        if !batching {
            self.settle();
        }
    }

    /// Replaces the sort.
    pub fn set_sort(&self, sort: SortSpec<T>) {
        tracing::debug!(target: targets::ENGINE, reverse = sort.is_reversed(), "set sort");
        self.replace_sort(Some(sort));
    }

    /// Sorts on the value `key` extracts.
    pub fn set_sort_key<F>(&self, key: F, reverse: bool)
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        self.set_sort(SortSpec::new(key).reversed(reverse));
    }

    /// Removes the sort; the derived list follows master order.
    pub fn clear_sort(&self) {
        tracing::debug!(target: targets::ENGINE, "cleared sort");
        self.replace_sort(None);
    }

    fn replace_sort(&self, sort: Option<SortSpec<T>>) {
        let _lock = self.state.lock();
        let batching = self.write(|s| {
            s.sort = sort;
            s.dirty = true;
            s.change_level > 0
        });
        if !batching {
            self.settle();
        }
    }

    /// Applies a loaded configuration as one batch.
    pub fn apply_config(&self, config: &ViewConfig) -> std::result::Result<(), ConfigError> {
        let filter = config.filter_predicate()?;
        let sort = config.sort_spec();

        let _batch = self.change_scope();
        match filter {
            Some(filter) => self.set_filter(filter),
            None => self.clear_filter(),
        }
        match sort {
            Some(sort) => self.set_sort(sort),
            None => self.clear_sort(),
        }
        Ok(())
    }

    // =========================================================================
    // Batching
    // =========================================================================

    /// Opens a change batch.
    ///
    /// While any batch is open, master mutations and filter/sort changes only
    /// update bookkeeping. Closing the outermost batch reconciles once.
    pub fn begin_change(&self) {
        self.write(|s| s.change_level += 1);
    }

    /// Closes a change batch. Unbalanced calls are logged and ignored.
    pub fn end_change(&self) {
        let _lock = self.state.lock();
        let settle = self.write(|s| {
            if s.change_level == 0 {
                return None;
            }
            s.change_level -= 1;
            Some(s.change_level == 0 && (s.dirty || !s.pending_updates.is_empty()))
        });
        match settle {
            None => tracing::warn!(target: targets::ENGINE, "end_change without matching begin_change"),
            Some(true) => self.settle(),
            Some(false) => {}
        }
    }

    /// Opens a change batch that closes when the guard drops.
    pub fn change_scope(&self) -> ChangeGuard<'_, T> {
        self.begin_change();
        ChangeGuard { engine: self }
    }

    fn settle(&self) {
        while self.read(|s| s.change_level == 0 && (s.dirty || !s.pending_updates.is_empty())) {
            if self.read(|s| s.dirty) {
                self.reconcile();
            }
            let pending = self.write(|s| std::mem::take(&mut s.pending_updates));
            let deferring = Applying::defer(self);
            for record in &pending {
                self.announce_content_changed(record);
            }
            drop(deferring);
        }
    }

    /// Runs the incremental edits in `f`, deferring anything listeners change
    /// meanwhile to one settle afterwards.
    fn publish(&self, f: impl FnOnce()) {
        let deferring = Applying::defer(self);
        f();
        drop(deferring);
        self.settle();
    }

    // =========================================================================
    // Master mutations
    // =========================================================================

    /// `record` was inserted into the master list before `before_index`.
    ///
    /// # Panics
    ///
    /// Panics if the record is already mirrored or the index is past the end.
    pub fn notify_inserted(&self, before_index: usize, record: Arc<T>) {
        let _lock = self.state.lock();
        let key = record_key(&record);
        let batching = self.write(|s| {
            invariant!(
                !s.master_keys.contains(&key),
                "record inserted twice into the master list"
            );
            invariant!(
                before_index <= s.master.len(),
                "master insert index {} out of range for length {}",
                before_index,
                s.master.len()
            );
            s.master.insert(before_index, record.clone());
            s.master_keys.insert(key);
            if s.change_level > 0 {
                s.dirty = true;
            }
            s.change_level > 0
        });
        if batching {
            return;
        }
        self.publish(|| {
            if self.passes_filter(&record) {
                let index = self.read(|s| self.target_index(s, &record, before_index));
                self.insert_derived(index, record);
            }
        });
    }

    /// `record` was removed from master index `index`.
    ///
    /// # Panics
    ///
    /// Panics if the master list does not hold `record` at `index`.
    pub fn notify_removed(&self, index: usize, record: &Arc<T>) {
        let _lock = self.state.lock();
        let key = record_key(record);
        let batching = self.write(|s| {
            invariant!(
                s.master.get(index).is_some_and(|r| record_key(r) == key),
                "removed record is not at master index {}",
                index
            );
            s.master.remove(index);
            s.master_keys.remove(&key);
            if s.change_level > 0 {
                s.dirty = true;
            }
            s.change_level > 0
        });
        if batching {
            return;
        }
        self.publish(|| {
            if let Some(position) = self.read(|s| s.derived_position(key)) {
                self.remove_derived(position);
            }
        });
    }

    /// `record`'s content changed; re-evaluates its membership and position.
    ///
    /// Updates for records outside the master list are ignored.
    pub fn notify_updated(&self, record: &Arc<T>) {
        let _lock = self.state.lock();
        let key = record_key(record);
        let (known, batching) = self.read(|s| (s.master_keys.contains(&key), s.change_level > 0));
        if !known {
            tracing::trace!(target: targets::ENGINE, "ignored update for unknown record");
            return;
        }
        if batching {
            self.write(|s| {
                if !s.pending_updates.iter().any(|r| record_key(r) == key) {
                    s.pending_updates.push(record.clone());
                }
                s.dirty = true;
            });
            return;
        }
        self.publish(|| {
            self.apply_update(record);
            self.announce_content_changed(record);
        });
    }

    fn apply_update(&self, record: &Arc<T>) {
        let key = record_key(record);
        let passes = self.passes_filter(record);
        let position = self.read(|s| s.derived_position(key));

        match (position, passes) {
            (None, true) => {
                let Some(index) = self.read(|s| {
                    s.master_position(key)
                        .map(|master_index| self.target_index(s, record, master_index))
                }) else {
                    return;
                };
                self.insert_derived(index, record.clone());
            }
            (Some(position), false) => {
                self.remove_derived(position);
            }
            (Some(position), true) => {
                if let Some(target) = self.read(|s| self.moved_index(s, record, position)) {
                    self.remove_derived(position);
                    self.insert_derived(target, record.clone());
                }
            }
            (None, false) => {}
        }
    }

    fn passes_filter(&self, record: &Arc<T>) -> bool {
        let filter = self.read(|s| s.filter.clone());
        filter.is_none_or(|filter| filter.matches(record))
    }

    /// Derived index for a record entering the view from `master_index`.
    fn target_index(&self, s: &EngineState<T>, record: &Arc<T>, master_index: usize) -> usize {
        match &s.sort {
            Some(sort) => sorted_index(s, sort, record, master_index, None),
            None => s.master[..master_index]
                .iter()
                .filter(|r| s.derived_keys.contains(&record_key(r)))
                .count(),
        }
    }

    /// New derived index for the record at `position` if it is out of order.
    fn moved_index(&self, s: &EngineState<T>, record: &Arc<T>, position: usize) -> Option<usize> {
        let sort = s.sort.as_ref()?;
        let master_index = s.master_position(record_key(record))?;
        let target = sorted_index(s, sort, record, master_index, Some(position));
        (target != position).then_some(target)
    }

    fn announce_content_changed(&self, record: &Arc<T>) {
        let Some(index) = self.read(|s| s.derived_position(record_key(record))) else {
            return;
        };
        for listener in self.listener_snapshot() {
            listener.content_changed(record, index);
        }
    }

    // =========================================================================
    // Derived edits
    // =========================================================================

    fn insert_derived(&self, index: usize, record: Arc<T>) {
        self.write(|s| {
            invariant!(
                s.derived_keys.insert(record_key(&record)),
                "record inserted twice into the derived list"
            );
            s.derived.insert(index, record.clone());
        });
        tracing::trace!(target: targets::ENGINE, index, "derived insert");
        for listener in self.listener_snapshot() {
            listener.inserted(&record, index);
        }
        for tracker in self.tracker_snapshot() {
            tracker.insert_index(index);
        }
    }

    fn remove_derived(&self, index: usize) {
        let record = self.write(|s| {
            let record = s.derived.remove(index);
            s.derived_keys.remove(&record_key(&record));
            record
        });
        tracing::trace!(target: targets::ENGINE, index, "derived remove");
        for listener in self.listener_snapshot() {
            listener.removed(&record, index);
        }
        for tracker in self.tracker_snapshot() {
            tracker.remove_index(index);
        }
    }

    /// Brings the derived list in line with the master list, filter and
    /// sort using the fewest removals and insertions.
    fn reconcile(&self) {
        let _lock = self.state.lock();
        let _span = PerfSpan::new("reconcile");

        loop {
            let (filter, sort, mut candidates, old) = self.read(|s| {
                (
                    s.filter.clone(),
                    s.sort.clone(),
                    s.master.clone(),
                    s.derived.iter().map(record_key).collect::<Vec<_>>(),
                )
            });

            if let Some(filter) = &filter {
                candidates.retain(|record| filter.matches(record));
            }
            if let Some(sort) = &sort {
                let mut keyed: Vec<(Value, Arc<T>)> =
                    candidates.into_iter().map(|r| (sort.key(&r), r)).collect();
                keyed.sort_by(|a, b| sort.compare_keys(&a.0, &b.0));
                candidates = keyed.into_iter().map(|(_, r)| r).collect();
            }

            let new: Vec<usize> = candidates.iter().map(record_key).collect();
            let edits = reconcile::plan(&old, &new);
            tracing::debug!(
                target: targets::ENGINE,
                before = old.len(),
                after = new.len(),
                edits = edits.len(),
                "reconciled view"
            );

            // Listener re-entry during the edits is deferred to another pass.
            let applying = Applying::enter(self);
            for edit in edits {
                match edit {
                    Edit::Remove { index } => self.remove_derived(index),
                    Edit::Insert { index } => self.insert_derived(index, candidates[index].clone()),
                }
            }
            drop(applying);

            if !self.read(|s| s.dirty && s.change_level == 0) {
                break;
            }
        }
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Registers a listener. Listeners are notified in registration order.
    pub fn subscribe(&self, listener: Arc<dyn ViewListener<T>>) -> ListenerId {
        let mut listeners = self.listeners.lock();
        let id = listeners.slots.insert(listener);
        listeners.order.push(id);
        id
    }

    /// Registers a pair of closures as a listener.
    pub fn subscribe_fn<I, R>(&self, on_insert: I, on_remove: R) -> ListenerId
    where
        I: Fn(&Arc<T>, usize) + Send + Sync + 'static,
        R: Fn(&Arc<T>, usize) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnListener {
            on_insert: Box::new(on_insert),
            on_remove: Box::new(on_remove),
        }))
    }

    /// Unregisters a listener.
    pub fn unsubscribe(&self, id: ListenerId) -> Result<()> {
        let mut listeners = self.listeners.lock();
        if listeners.slots.remove(id).is_none() {
            tracing::warn!(target: targets::ENGINE, ?id, "unsubscribe with unknown listener");
            return Err(ViewError::UnknownListener);
        }
        listeners.order.retain(|&other| other != id);
        Ok(())
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().order.len()
    }

    fn listener_snapshot(&self) -> Vec<Arc<dyn ViewListener<T>>> {
        let listeners = self.listeners.lock();
        listeners
            .order
            .iter()
            .filter_map(|id| listeners.slots.get(*id).cloned())
            .collect()
    }

    // =========================================================================
    // Index trackers
    // =========================================================================

    /// Creates a tracker whose indices follow this view's edits.
    ///
    /// The view only holds the tracker weakly; dropping every handle
    /// releases it.
    pub fn make_tracker(&self, style: SelectionStyle) -> Arc<IndexTracker> {
        let tracker = Arc::new(IndexTracker::new(style));
        self.register_tracker(&tracker);
        tracker
    }

    /// Starts shifting an existing tracker with this view's edits.
    pub fn register_tracker(&self, tracker: &Arc<IndexTracker>) {
        self.trackers.lock().push(Arc::downgrade(tracker));
    }

    /// Stops shifting `tracker`.
    pub fn release_tracker(&self, tracker: &Arc<IndexTracker>) -> Result<()> {
        let mut trackers = self.trackers.lock();
        let before = trackers.len();
        trackers.retain(|weak| !std::ptr::eq(weak.as_ptr(), Arc::as_ptr(tracker)));
        if trackers.len() == before {
            tracing::warn!(target: targets::TRACKER, "release of unknown tracker");
            return Err(ViewError::UnknownTracker);
        }
        Ok(())
    }

    /// Returns the number of live trackers.
    pub fn tracker_count(&self) -> usize {
        let mut trackers = self.trackers.lock();
        trackers.retain(|weak| weak.strong_count() > 0);
        trackers.len()
    }

    fn tracker_snapshot(&self) -> Vec<Arc<IndexTracker>> {
        let mut trackers = self.trackers.lock();
        trackers.retain(|weak| weak.strong_count() > 0);
        trackers.iter().filter_map(Weak::upgrade).collect()
    }
}

/// Derived index at which `record` belongs under `sort`, leaving the derived
/// index `skip` out of the comparison. Equal keys are ranked by master
/// position, which keeps the derived list equal to a stable sort of the
/// filtered master list.
fn sorted_index<T>(
    s: &EngineState<T>,
    sort: &SortSpec<T>,
    record: &Arc<T>,
    master_index: usize,
    skip: Option<usize>,
) -> usize {
    let len = s.derived.len() - usize::from(skip.is_some());
    let shift = |i: usize| match skip {
        Some(k) if i >= k => i + 1,
        _ => i,
    };
    let at = |i: usize| &s.derived[shift(i)];

    let ties = sort.equal_range(len, &sort.key(record), |i| &**at(i));
    if ties.is_empty() {
        return ties.start;
    }
    let tied: HashSet<usize> = ties.clone().map(|i| record_key(at(i))).collect();
    let earlier = s.master[..master_index]
        .iter()
        .filter(|r| tied.contains(&record_key(r)))
        .count();
    ties.start + earlier
}

impl<T: Record> fmt::Debug for ViewEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.state.lock();
        let state = guard.borrow();
        f.debug_struct("ViewEngine")
            .field("master_len", &state.master.len())
            .field("len", &state.derived.len())
            .field("filtered", &state.filter.is_some())
            .field("sorted", &state.sort.is_some())
            .field("change_level", &state.change_level)
            .finish_non_exhaustive()
    }
}

/// Keeps the view batching while edits are published, so listener
/// re-entry only marks the view dirty.
struct Applying<'a, T: Record> {
    engine: &'a ViewEngine<T>,
}

impl<'a, T: Record> Applying<'a, T> {
    /// Starts a reconciliation pass; whatever was dirty is now handled.
    fn enter(engine: &'a ViewEngine<T>) -> Self {
        engine.write(|s| {
            s.dirty = false;
            s.change_level += 1;
        });
        Self { engine }
    }

    fn defer(engine: &'a ViewEngine<T>) -> Self {
        engine.write(|s| s.change_level += 1);
        Self { engine }
    }
}

impl<T: Record> Drop for Applying<'_, T> {
    fn drop(&mut self) {
        self.engine.write(|s| s.change_level -= 1);
    }
}

/// Closes a change batch when dropped, including during unwinding.
///
/// Created by [`ViewEngine::change_scope`].
#[must_use = "the batch closes as soon as the guard is dropped"]
pub struct ChangeGuard<'a, T: Record> {
    engine: &'a ViewEngine<T>,
}

impl<T: Record> Drop for ChangeGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            // Restore the level only; publishing edits mid-unwind could panic
            // again and abort.
            self.engine.write(|s| s.change_level = s.change_level.saturating_sub(1));
        } else {
            self.engine.end_change();
        }
    }
}

/// The sink a source delivers into. Stale once the view re-attaches.
struct EngineSink<T: Record> {
    engine: Weak<ViewEngine<T>>,
    epoch: u64,
}

impl<T: Record> EngineSink<T> {
    fn forward(&self, f: impl FnOnce(&ViewEngine<T>)) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        let _lock = engine.state.lock();
        let current = engine.read(|s| s.epoch);
        if current != self.epoch {
            tracing::warn!(
                target: targets::SOURCE,
                event_epoch = self.epoch,
                current,
                "dropped event from a detached source"
            );
            return;
        }
        f(&engine);
    }
}

impl<T: Record> ChangeSink<T> for EngineSink<T> {
    fn notify_inserted(&self, before_index: usize, record: Arc<T>) {
        self.forward(|engine| engine.notify_inserted(before_index, record));
    }

    fn notify_removed(&self, index: usize, record: &Arc<T>) {
        self.forward(|engine| engine.notify_removed(index, record));
    }

    fn notify_updated(&self, record: &Arc<T>) {
        self.forward(|engine| engine.notify_updated(record));
    }
}
