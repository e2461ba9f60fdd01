//! Companion index trackers.
//!
//! An [`IndexTracker`] holds a set of indices into a view (typically the
//! selection of a list widget) and keeps it valid while the view changes:
//! the view engine reports every primitive insert and remove, and the
//! tracker shifts its indices accordingly.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use siftview::{Record, SelectionStyle, ViewEngine};
//!
//! struct Row;
//! impl Record for Row {}
//!
//! let view = ViewEngine::<Row>::new();
//! for index in 0..6 {
//!     view.notify_inserted(index, Arc::new(Row));
//! }
//!
//! let selection = view.make_tracker(SelectionStyle::Multiple);
//! selection.set(2);
//! selection.extend(4); // selects 2..=4, anchor stays at 2
//! selection.changed.connect(|_| println!("selection changed"));
//!
//! // A record inserted in front shifts the selection to 3..=5.
//! view.notify_inserted(0, Arc::new(Row));
//! assert_eq!(selection.indices(), vec![3, 4, 5]);
//! assert_eq!(selection.anchor(), Some(3));
//!
//! assert!(view.release_tracker(&selection).is_ok());
//! ```

use std::collections::BTreeSet;

use parking_lot::Mutex;
use siftview_core::logging::targets;
use siftview_core::Signal;

/// How many indices a tracker may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStyle {
    /// Nothing can be selected.
    None,
    /// At most one index.
    SingleOrNone,
    /// Any number of indices (default).
    #[default]
    Multiple,
}

#[derive(Debug, Default)]
struct TrackerState {
    style: SelectionStyle,
    indices: BTreeSet<usize>,
    /// Anchor index for range extension.
    anchor: Option<usize>,
    /// Whether indices inserted into the view join the set.
    track_new_arrivals: bool,
}

impl TrackerState {
    /// Applies `style` to a candidate set; returns the set that may be held.
    fn constrain(&self, mut indices: BTreeSet<usize>, preferred: Option<usize>) -> BTreeSet<usize> {
        match self.style {
            SelectionStyle::None => BTreeSet::new(),
            SelectionStyle::SingleOrNone if indices.len() > 1 => {
                let keep = preferred
                    .filter(|i| indices.contains(i))
                    .or_else(|| indices.iter().next().copied());
                indices.clear();
                indices.extend(keep);
                indices
            }
            _ => indices,
        }
    }
}

/// Keeps a set of view indices valid across view mutations.
///
/// All methods take `&self`; the tracker is shared between the view engine
/// that drives it and the consumer that reads or edits it.
///
/// # Signals
///
/// - `changed`: Emitted after the held index set changed
pub struct IndexTracker {
    state: Mutex<TrackerState>,

    /// Emitted after the held index set changed.
    pub changed: Signal<()>,
}

impl Default for IndexTracker {
    fn default() -> Self {
        Self::new(SelectionStyle::default())
    }
}

impl IndexTracker {
    /// Creates an empty tracker.
    pub fn new(style: SelectionStyle) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                style,
                ..TrackerState::default()
            }),
            changed: Signal::new(),
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Gets the selection style.
    pub fn style(&self) -> SelectionStyle {
        self.state.lock().style
    }

    /// Sets the selection style, trimming the held set if it no longer fits.
    pub fn set_style(&self, style: SelectionStyle) {
        self.update(|state| {
            state.style = style;
            let current = std::mem::take(&mut state.indices);
            let anchor = state.anchor;
            state.indices = state.constrain(current, anchor);
        });
    }

    /// Returns whether indices inserted into the view join the set.
    pub fn tracks_new_arrivals(&self) -> bool {
        self.state.lock().track_new_arrivals
    }

    /// Sets whether indices inserted into the view join the set.
    pub fn set_track_new_arrivals(&self, track: bool) {
        self.state.lock().track_new_arrivals = track;
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns the held indices in ascending order.
    pub fn indices(&self) -> Vec<usize> {
        self.state.lock().indices.iter().copied().collect()
    }

    /// Checks if an index is held.
    pub fn contains(&self, index: usize) -> bool {
        self.state.lock().indices.contains(&index)
    }

    /// Returns the number of held indices.
    pub fn len(&self) -> usize {
        self.state.lock().indices.len()
    }

    /// Returns `true` if no index is held.
    pub fn is_empty(&self) -> bool {
        self.state.lock().indices.is_empty()
    }

    /// Gets the anchor index for range extension.
    pub fn anchor(&self) -> Option<usize> {
        self.state.lock().anchor
    }

    /// The index a single-item consumer should focus: the anchor if it is
    /// held, otherwise the lowest held index.
    pub fn current_index(&self) -> Option<usize> {
        let state = self.state.lock();
        state
            .anchor
            .filter(|a| state.indices.contains(a))
            .or_else(|| state.indices.iter().next().copied())
    }

    // =========================================================================
    // Editing
    // =========================================================================

    /// Clears the held set and the anchor.
    pub fn clear(&self) {
        self.update(|state| {
            state.indices.clear();
            state.anchor = None;
        });
    }

    /// Adds an index; in single style this replaces the held index.
    pub fn add(&self, index: usize) {
        self.update(|state| {
            let mut indices = state.indices.clone();
            indices.insert(index);
            state.indices = state.constrain(indices, Some(index));
            if state.anchor.is_none() {
                state.anchor = Some(index);
            }
        });
    }

    /// Removes an index.
    pub fn remove(&self, index: usize) {
        self.update(|state| {
            state.indices.remove(&index);
        });
    }

    /// Adds every index in `start..=end`.
    pub fn add_range(&self, start: usize, end: usize) {
        let (low, high) = if start <= end { (start, end) } else { (end, start) };
        self.update(|state| {
            let mut indices = state.indices.clone();
            indices.extend(low..=high);
            state.indices = state.constrain(indices, Some(start));
        });
    }

    /// Replaces the held set with `index` and anchors on it.
    pub fn set(&self, index: usize) {
        self.update(|state| {
            state.indices = state.constrain(BTreeSet::from([index]), Some(index));
            state.anchor = Some(index);
        });
    }

    /// Replaces the held set with `indices`; the anchor moves to the lowest.
    pub fn set_multiple(&self, indices: impl IntoIterator<Item = usize>) {
        let indices: BTreeSet<usize> = indices.into_iter().collect();
        self.update(|state| {
            let first = indices.iter().next().copied();
            state.indices = state.constrain(indices, first);
            state.anchor = first;
        });
    }

    /// Toggles an index and anchors on it.
    pub fn toggle(&self, index: usize) {
        self.update(|state| {
            let mut indices = state.indices.clone();
            if !indices.remove(&index) {
                indices.insert(index);
            }
            state.indices = state.constrain(indices, Some(index));
            state.anchor = Some(index);
        });
    }

    /// Selects the range from the anchor to `index`, keeping the anchor.
    ///
    /// Without an anchor this behaves like [`set`](Self::set).
    pub fn extend(&self, index: usize) {
        self.update(|state| match state.anchor {
            Some(anchor) => {
                let (low, high) = if anchor <= index { (anchor, index) } else { (index, anchor) };
                state.indices = state.constrain((low..=high).collect(), Some(index));
            }
            None => {
                state.indices = state.constrain(BTreeSet::from([index]), Some(index));
                state.anchor = Some(index);
            }
        });
    }

    // =========================================================================
    // View notifications
    // =========================================================================

    /// A record was inserted into the view at `index`.
    ///
    /// Held indices at or after `index` shift up by one. When tracking new
    /// arrivals, `index` itself joins the set.
    pub fn insert_index(&self, index: usize) {
        self.update(|state| {
            let mut shifted: BTreeSet<usize> = state
                .indices
                .iter()
                .map(|&i| if i >= index { i + 1 } else { i })
                .collect();
            if let Some(anchor) = state.anchor.as_mut() {
                if index <= *anchor {
                    *anchor += 1;
                }
            }
            if state.track_new_arrivals {
                shifted.insert(index);
                state.indices = state.constrain(shifted, Some(index));
            } else {
                state.indices = shifted;
            }
        });
    }

    /// A record was removed from the view at `index`.
    ///
    /// `index` leaves the set and held indices after it shift down by one.
    /// A removed anchor is cleared.
    pub fn remove_index(&self, index: usize) {
        self.update(|state| {
            state.indices = state
                .indices
                .iter()
                .filter(|&&i| i != index)
                .map(|&i| if i > index { i - 1 } else { i })
                .collect();
            state.anchor = match state.anchor {
                Some(anchor) if anchor == index => None,
                Some(anchor) if anchor > index => Some(anchor - 1),
                other => other,
            };
        });
    }

    /// Applies `f` and emits `changed` if the held set differs afterwards.
    fn update(&self, f: impl FnOnce(&mut TrackerState)) {
        let changed = {
            let mut state = self.state.lock();
            let before = state.indices.clone();
            f(&mut state);
            state.indices != before
        };
        if changed {
            tracing::trace!(target: targets::TRACKER, "tracked indices changed");
            self.changed.emit(());
        }
    }
}
