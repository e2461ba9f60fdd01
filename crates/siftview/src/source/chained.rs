//! Source adapter over another view's derived list.

use std::sync::Arc;

use siftview_core::logging::targets;

use super::{ChangeSink, SourceAdapter, SourceConnection};
use crate::engine::{ViewEngine, ViewListener};
use crate::record::Record;

/// Uses an upstream view's derived list as the master list.
///
/// Upstream edits and content-changed pass-throughs arrive downstream as
/// inserts, removals and updates, so a chain of views settles in one pass.
pub struct ChainedSource<T: Record> {
    upstream: Arc<ViewEngine<T>>,
}

impl<T: Record> ChainedSource<T> {
    /// Creates a source over `upstream`.
    pub fn new(upstream: Arc<ViewEngine<T>>) -> Self {
        Self { upstream }
    }

    /// Returns the upstream view.
    pub fn upstream(&self) -> &Arc<ViewEngine<T>> {
        &self.upstream
    }
}

impl<T: Record> SourceAdapter<T> for ChainedSource<T> {
    fn records(&self) -> Vec<Arc<T>> {
        self.upstream.items()
    }

    fn bind(&self, sink: Arc<dyn ChangeSink<T>>) -> SourceConnection {
        let forwarder = Arc::new(Forwarder { sink: sink.clone() });
        let id = self.upstream.exclusive(|| {
            let id = self.upstream.subscribe(forwarder);
            let records = self.upstream.items();
            for (index, record) in records.iter().enumerate() {
                sink.notify_inserted(index, record.clone());
            }
            tracing::debug!(target: targets::SOURCE, records = records.len(), "bound upstream view");
            id
        });

        let upstream = self.upstream.clone();
        SourceConnection::new(move || {
            upstream.exclusive(|| {
                for (index, record) in upstream.items().iter().enumerate().rev() {
                    sink.notify_removed(index, record);
                }
                if upstream.unsubscribe(id).is_err() {
                    tracing::warn!(target: targets::SOURCE, "upstream view already dropped the forwarder");
                }
            });
            tracing::debug!(target: targets::SOURCE, "unbound upstream view");
        })
    }
}

struct Forwarder<T> {
    sink: Arc<dyn ChangeSink<T>>,
}

impl<T: Record> ViewListener<T> for Forwarder<T> {
    fn inserted(&self, record: &Arc<T>, index: usize) {
        self.sink.notify_inserted(index, record.clone());
    }

    fn removed(&self, record: &Arc<T>, index: usize) {
        self.sink.notify_removed(index, record);
    }

    fn content_changed(&self, record: &Arc<T>, _index: usize) {
        self.sink.notify_updated(record);
    }
}
