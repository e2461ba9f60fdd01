//! Source adapter over a live [`Container`].

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use siftview_core::ConnectionId;
use siftview_core::logging::targets;

use super::{ChangeSink, SourceAdapter, SourceConnection};
use crate::container::Container;
use crate::record::{Record, record_key};

/// Mirrors a container's records and forwards the content-changed signal of
/// every record while it is in the container.
pub struct ContainerSource<T: Record> {
    container: Arc<dyn Container<T>>,
}

impl<T: Record> ContainerSource<T> {
    /// Creates a source over `container`.
    pub fn new(container: Arc<dyn Container<T>>) -> Self {
        Self { container }
    }

    /// Returns the mirrored container.
    pub fn container(&self) -> &Arc<dyn Container<T>> {
        &self.container
    }
}

impl<T: Record> SourceAdapter<T> for ContainerSource<T> {
    fn records(&self) -> Vec<Arc<T>> {
        self.container.records()
    }

    fn bind(&self, sink: Arc<dyn ChangeSink<T>>) -> SourceConnection {
        let watches = Arc::new(ContentWatches::new(sink.clone()));
        let mut connections = None;

        self.container.with_exclusive(&mut |records: &[Arc<T>]| {
            let inserted = {
                let sink = sink.clone();
                let watches = watches.clone();
                self.container
                    .inserted()
                    .connect(move |(record, index): &(Arc<T>, usize)| {
                        watches.watch(record);
                        sink.notify_inserted(*index, record.clone());
                    })
            };
            let removed = {
                let sink = sink.clone();
                let watches = watches.clone();
                self.container
                    .removed()
                    .connect(move |(record, index): &(Arc<T>, usize)| {
                        watches.unwatch(record);
                        sink.notify_removed(*index, record);
                    })
            };

            for (index, record) in records.iter().enumerate() {
                watches.watch(record);
                sink.notify_inserted(index, record.clone());
            }
            tracing::debug!(target: targets::SOURCE, records = records.len(), "bound container");
            connections = Some((inserted, removed));
        });

        let container = self.container.clone();
        SourceConnection::new(move || {
            container.with_exclusive(&mut |records: &[Arc<T>]| {
                for (index, record) in records.iter().enumerate().rev() {
                    watches.unwatch(record);
                    sink.notify_removed(index, record);
                }
                if let Some((inserted, removed)) = connections {
                    container.inserted().disconnect(inserted);
                    container.removed().disconnect(removed);
                }
            });
            watches.clear();
            tracing::debug!(target: targets::SOURCE, "unbound container");
        })
    }
}

/// Content-changed connections of the records currently in the container,
/// keyed by record identity.
struct ContentWatches<T: Record> {
    sink: Arc<dyn ChangeSink<T>>,
    connections: Mutex<HashMap<usize, (Weak<T>, ConnectionId)>>,
}

impl<T: Record> ContentWatches<T> {
    fn new(sink: Arc<dyn ChangeSink<T>>) -> Self {
        Self {
            sink,
            connections: Mutex::new(HashMap::new()),
        }
    }

    fn watch(&self, record: &Arc<T>) {
        let Some(signal) = record.content_changed() else {
            return;
        };
        let weak = Arc::downgrade(record);
        let sink = self.sink.clone();
        let id = signal.connect(move |_| {
            if let Some(record) = weak.upgrade() {
                sink.notify_updated(&record);
            }
        });
        self.connections
            .lock()
            .insert(record_key(record), (Arc::downgrade(record), id));
    }

    fn unwatch(&self, record: &Arc<T>) {
        let Some((_, id)) = self.connections.lock().remove(&record_key(record)) else {
            return;
        };
        if let Some(signal) = record.content_changed() {
            signal.disconnect(id);
        }
    }

    fn clear(&self) {
        let connections: Vec<_> = self.connections.lock().drain().map(|(_, entry)| entry).collect();
        for (weak, id) in connections {
            if let Some(record) = weak.upgrade() {
                if let Some(signal) = record.content_changed() {
                    signal.disconnect(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::RecordList;
    use crate::record::Value;
    use siftview_core::Signal;

    struct Note {
        text: &'static str,
        changed: Signal<()>,
    }

    impl Record for Note {
        fn field(&self, name: &str) -> Option<Value> {
            (name == "text").then(|| Value::from(self.text))
        }

        fn content_changed(&self) -> Option<&Signal<()>> {
            Some(&self.changed)
        }
    }

    fn note(text: &'static str) -> Arc<Note> {
        Arc::new(Note {
            text,
            changed: Signal::new(),
        })
    }

    #[derive(Default)]
    struct Sink {
        events: Mutex<Vec<String>>,
    }

    impl ChangeSink<Note> for Sink {
        fn notify_inserted(&self, before_index: usize, record: Arc<Note>) {
            self.events.lock().push(format!("+{}@{}", record.text, before_index));
        }

        fn notify_removed(&self, index: usize, record: &Arc<Note>) {
            self.events.lock().push(format!("-{}@{}", record.text, index));
        }

        fn notify_updated(&self, record: &Arc<Note>) {
            self.events.lock().push(format!("~{}", record.text));
        }
    }

    impl Sink {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    #[test]
    fn test_bind_replays_and_forwards() {
        let list = Arc::new(RecordList::from_records(vec![note("a"), note("b")]));
        let source = ContainerSource::<Note>::new(list.clone());
        assert_eq!(source.records().len(), 2);

        let sink = Arc::new(Sink::default());
        let connection = source.bind(sink.clone());
        assert_eq!(sink.take(), vec!["+a@0", "+b@1"]);

        let c = note("c");
        list.insert(1, c.clone());
        c.changed.emit(());
        list.remove(0);
        assert_eq!(sink.take(), vec!["+c@1", "~c", "-a@0"]);

        connection.close();
        assert_eq!(sink.take(), vec!["-b@1", "-c@0"]);
        assert_eq!(list.inserted().connection_count(), 0);
        assert_eq!(list.removed().connection_count(), 0);
    }

    #[test]
    fn test_removed_record_is_no_longer_watched() {
        let a = note("a");
        let list = Arc::new(RecordList::from_records(vec![a.clone()]));
        let sink = Arc::new(Sink::default());
        let _connection = ContainerSource::<Note>::new(list.clone()).bind(sink.clone());
        assert_eq!(a.changed.connection_count(), 1);

        list.remove(0);
        sink.take();
        a.changed.emit(());
        assert!(sink.take().is_empty());
        assert_eq!(a.changed.connection_count(), 0);
    }

    #[test]
    fn test_close_disconnects_content_watches() {
        let a = note("a");
        let list = Arc::new(RecordList::from_records(vec![a.clone()]));
        let sink = Arc::new(Sink::default());
        let connection = ContainerSource::<Note>::new(list).bind(sink.clone());
        connection.close();
        assert_eq!(a.changed.connection_count(), 0);
    }
}
