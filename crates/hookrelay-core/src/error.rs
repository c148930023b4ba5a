//! Error types for domain model parsing.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while interpreting domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Event type name is not part of the supported set.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
}
