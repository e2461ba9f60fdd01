//! Logging and tracing facilities for siftview.
//!
//! siftview uses the `tracing` crate for instrumentation. The library never
//! installs a subscriber; to see logs, install one in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("siftview::engine=debug")
//!         .init();
//! }
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Signal/slot system target.
    pub const SIGNAL: &str = "siftview_core::signal";
    /// View engine target (reconciliation, incremental updates, batching).
    pub const ENGINE: &str = "siftview::engine";
    /// Source adapter target (attach, detach, replay).
    pub const SOURCE: &str = "siftview::source";
    /// Companion index tracker target.
    pub const TRACKER: &str = "siftview::tracker";
    /// Configuration loading target.
    pub const CONFIG: &str = "siftview::config";
    /// Performance spans.
    pub const PERF: &str = "siftview::perf";
}

/// A guard that keeps a tracing span entered until it is dropped.
///
/// Useful for tracking the duration of reconciliation and attachment.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    ///
    /// The span will be active until the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: targets::PERF, "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}
