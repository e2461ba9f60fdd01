//! Source adapters: where a view's master list comes from.
//!
//! A [`SourceAdapter`] supplies a master ordered sequence plus a feed of raw
//! insert/remove/update events, delivered to a [`ChangeSink`]. Two adapters
//! are provided:
//!
//! - [`ContainerSource`] mirrors a live [`Container`](crate::Container) and
//!   the content-changed signals of the records in it
//! - [`ChainedSource`] mirrors the derived list of another
//!   [`ViewEngine`](crate::ViewEngine), so views compose
//!
//! # Binding Contract
//!
//! [`SourceAdapter::bind`] subscribes to the source and replays its current
//! records as inserts in order. Closing the returned [`SourceConnection`]
//! replays removals in reverse order and unsubscribes. Both happen without
//! any source mutation slipping in between, and without the view's own lock
//! held, so the lock order is always source first, view second.

mod chained;
mod container;

pub use chained::ChainedSource;
pub use container::ContainerSource;

use std::fmt;
use std::sync::Arc;

/// Receiver of raw master-list mutations.
///
/// Implemented by the view engine's attachment handle; adapters never see
/// the engine itself.
pub trait ChangeSink<T>: Send + Sync {
    /// `record` was inserted into the master list before `before_index`.
    fn notify_inserted(&self, before_index: usize, record: Arc<T>);

    /// `record` was removed from master index `index`.
    fn notify_removed(&self, index: usize, record: &Arc<T>);

    /// `record`'s content changed; membership or order may be affected.
    fn notify_updated(&self, record: &Arc<T>);
}

/// Supplies a master list and its mutation feed.
pub trait SourceAdapter<T>: Send + Sync {
    /// Returns a snapshot of the source's current records.
    fn records(&self) -> Vec<Arc<T>>;

    /// Subscribes `sink` and replays the current records into it.
    fn bind(&self, sink: Arc<dyn ChangeSink<T>>) -> SourceConnection;
}

/// A live subscription created by [`SourceAdapter::bind`].
///
/// Closing (or dropping) the connection replays removals into the sink and
/// unsubscribes from the source. This happens exactly once.
pub struct SourceConnection {
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl SourceConnection {
    /// Creates a connection that runs `teardown` when closed.
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Tears the subscription down now.
    pub fn close(mut self) {
        self.run_teardown();
    }

    fn run_teardown(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for SourceConnection {
    fn drop(&mut self) {
        self.run_teardown();
    }
}

impl fmt::Debug for SourceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConnection")
            .field("open", &self.teardown.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_connection_tears_down_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let connection = SourceConnection::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(format!("{connection:?}").contains("open: true"));
        connection.close();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropping_connection_tears_down() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count_clone = count.clone();
            let _connection = SourceConnection::new(move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
