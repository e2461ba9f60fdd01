//! siftview - incremental filtered and sorted views over live record
//! collections.
//!
//! A [`ViewEngine`] mirrors a master list of shared records (a live
//! [`Container`], or another view) and keeps a derived list of the records
//! that pass a [`Predicate`], ordered by a [`SortSpec`]. Whenever the source
//! changes, a record's content changes, or the filter or sort is replaced,
//! the view publishes the smallest sequence of single-record removals and
//! insertions that carries its listeners from the old derived list to the
//! new one.
//!
//! - **Records**: [`Record`] exposes named [`Value`] fields and an optional
//!   content-changed signal
//! - **Sources**: [`ContainerSource`] and [`ChainedSource`] feed a view
//! - **Batching**: [`ViewEngine::change_scope`] defers work to one
//!   reconciliation
//! - **Index tracking**: [`IndexTracker`] keeps a set of derived indices
//!   pointing at the same records across edits
//! - **Configuration**: [`ViewConfig`] restores a filter and sort from TOML
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use siftview::{Predicate, Record, RecordList, SortSpec, Value, ViewEngine};
//!
//! struct Survey {
//!     title: String,
//! }
//!
//! impl Record for Survey {
//!     fn field(&self, name: &str) -> Option<Value> {
//!         (name == "title").then(|| Value::from(self.title.as_str()))
//!     }
//! }
//!
//! let surveys = Arc::new(RecordList::<Survey>::new());
//! let view = ViewEngine::<Survey>::new();
//! view.set_sort(SortSpec::by_field("title"));
//! view.set_filter(Predicate::starts_with("title", "North"));
//! view.attach_container(surveys.clone());
//!
//! view.subscribe_fn(
//!     |survey, index| println!("{} shown at {}", survey.title, index),
//!     |survey, index| println!("{} hidden from {}", survey.title, index),
//! );
//!
//! surveys.push(Arc::new(Survey { title: "North ridge".into() }));
//! surveys.push(Arc::new(Survey { title: "South flank".into() }));
//! surveys.push(Arc::new(Survey { title: "North basin".into() }));
//!
//! let titles: Vec<_> = view.items().iter().map(|s| s.title.clone()).collect();
//! assert_eq!(titles, ["North basin", "North ridge"]);
//! ```

pub use siftview_core::*;

pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod predicate;
mod reconcile;
pub mod record;
pub mod sort;
pub mod source;
pub mod tracker;

pub use config::{ConfigValue, PredicateConfig, ViewConfig};
pub use container::{Container, RecordList};
pub use engine::{ChangeGuard, ListenerId, ViewEngine, ViewListener};
pub use error::{ConfigError, Result, ViewError};
pub use predicate::{Predicate, PredicateFn};
pub use record::{Record, Value};
pub use sort::{KeyFn, SortSpec};
pub use source::{ChainedSource, ChangeSink, ContainerSource, SourceAdapter, SourceConnection};
pub use tracker::{IndexTracker, SelectionStyle};
