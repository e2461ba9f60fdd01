//! Core systems for siftview.
//!
//! This crate provides the infrastructure shared by every siftview
//! component:
//!
//! - **Signal/Slot System**: Type-safe change notification used by
//!   containers and records
//! - **Logging**: `tracing` target names and scoped performance spans
//!
//! # Signal/Slot Example
//!
//! ```
//! use siftview_core::Signal;
//!
//! let count_changed = Signal::<usize>::new();
//!
//! let conn_id = count_changed.connect(|count| {
//!     println!("Count changed to: {}", count);
//! });
//!
//! count_changed.emit(3);
//! count_changed.disconnect(conn_id);
//! ```

pub mod logging;
pub mod signal;

pub use logging::PerfSpan;
pub use signal::{ConnectionId, Signal};
