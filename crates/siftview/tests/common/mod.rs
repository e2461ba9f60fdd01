//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use siftview::{Record, Signal, Value, ViewEngine, ViewListener};

/// A mutable record with a title, a rank and a creation date.
pub struct Item {
    title: RwLock<String>,
    rank: RwLock<i64>,
    created: NaiveDate,
    pub changed: Signal<()>,
}

impl Item {
    pub fn new(title: &str) -> Arc<Self> {
        Self::with_rank(title, 0)
    }

    pub fn with_rank(title: &str, rank: i64) -> Arc<Self> {
        Arc::new(Self {
            title: RwLock::new(title.to_string()),
            rank: RwLock::new(rank),
            created: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap_or_default(),
            changed: Signal::new(),
        })
    }

    pub fn dated(title: &str, created: NaiveDate) -> Arc<Self> {
        Arc::new(Self {
            title: RwLock::new(title.to_string()),
            rank: RwLock::new(0),
            created,
            changed: Signal::new(),
        })
    }

    pub fn title(&self) -> String {
        self.title.read().clone()
    }

    pub fn rank(&self) -> i64 {
        *self.rank.read()
    }

    /// Changes the title and emits the content-changed signal.
    pub fn retitle(&self, title: &str) {
        *self.title.write() = title.to_string();
        self.changed.emit(());
    }

    /// Changes the rank and emits the content-changed signal.
    pub fn rerank(&self, rank: i64) {
        *self.rank.write() = rank;
        self.changed.emit(());
    }
}

impl Record for Item {
    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "title" => Some(Value::from(self.title())),
            "rank" => Some(Value::from(self.rank())),
            "created" => Some(Value::from(self.created)),
            _ => None,
        }
    }

    fn content_changed(&self) -> Option<&Signal<()>> {
        Some(&self.changed)
    }
}

/// Records every notification as text.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl ViewListener<Item> for EventLog {
    fn inserted(&self, record: &Arc<Item>, index: usize) {
        self.events.lock().push(format!("+{}@{}", record.title(), index));
    }

    fn removed(&self, record: &Arc<Item>, index: usize) {
        self.events.lock().push(format!("-{}@{}", record.title(), index));
    }

    fn content_changed(&self, record: &Arc<Item>, index: usize) {
        self.events.lock().push(format!("~{}@{}", record.title(), index));
    }
}

/// Replays notifications onto a plain vector, the way a list widget would.
#[derive(Default)]
pub struct Replica {
    items: Mutex<Vec<Arc<Item>>>,
}

impl Replica {
    pub fn titles(&self) -> Vec<String> {
        self.items.lock().iter().map(|r| r.title()).collect()
    }

    pub fn records(&self) -> Vec<Arc<Item>> {
        self.items.lock().clone()
    }
}

impl ViewListener<Item> for Replica {
    fn inserted(&self, record: &Arc<Item>, index: usize) {
        self.items.lock().insert(index, record.clone());
    }

    fn removed(&self, record: &Arc<Item>, index: usize) {
        let removed = self.items.lock().remove(index);
        assert!(Arc::ptr_eq(&removed, record), "removal index points at another record");
    }
}

pub const TITLES: [&str; 6] = ["DEF", "ABC", "GHI", "DFG", "ACD", "GIJ"];

pub fn titles(view: &ViewEngine<Item>) -> Vec<String> {
    view.items().iter().map(|r| r.title()).collect()
}

pub fn same_records(a: &[Arc<Item>], b: &[Arc<Item>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
}
