//! Error types for siftview.
//!
//! Broken structural invariants (a duplicate insert, removing a record the
//! master list does not hold at that index, an inconsistent reconciliation)
//! are programming errors and panic where they are detected. The types here
//! cover the conditions a caller can reasonably recover from.

use std::path::PathBuf;

/// Result type alias for view operations.
pub type Result<T> = std::result::Result<T, ViewError>;

/// Recoverable misuse of a view engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    /// The listener token is unknown or was already unsubscribed.
    #[error("Unknown or already unsubscribed listener")]
    UnknownListener,

    /// The tracker was never created by this engine or was already released.
    #[error("Unknown or already released index tracker")]
    UnknownTracker,
}

/// Errors that can occur while loading a view configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("Failed to read view configuration '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parse or shape error.
    #[error("Invalid view configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("Failed to serialize view configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A partial-date predicate names an impossible month or day.
    #[error("Invalid {part} {value} in partial date filter on '{key}'")]
    InvalidDatePart {
        key: String,
        part: &'static str,
        value: u32,
    },
}

impl ConfigError {
    /// Create an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ViewError::UnknownListener.to_string(),
            "Unknown or already unsubscribed listener"
        );
        let err = ConfigError::InvalidDatePart {
            key: "created".into(),
            part: "month",
            value: 13,
        };
        assert_eq!(
            err.to_string(),
            "Invalid month 13 in partial date filter on 'created'"
        );
    }

    #[test]
    fn test_io_error_keeps_source() {
        use std::error::Error as _;

        let err = ConfigError::io(
            "views.toml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().contains("views.toml"));
        assert!(err.source().is_some());
    }
}
