//! Error types for the cardinality guard.
//!
//! Cardinality denials are **not** errors: they are ordinary verdicts
//! communicated through return values so that a runaway label can never fail
//! a production request. The only failure surfaced through `Err` is a
//! malformed label set, which indicates a bug at the instrumentation call
//! site rather than organic cardinality growth.

use thiserror::Error;

/// Errors produced by the guard's input validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// The label input could not be canonicalized: a dangling key with no
    /// value, an empty key, or the same key bound to two different values
    /// within a single call.
    #[error("invalid label set: {reason}")]
    InvalidLabelSet {
        /// Human-readable description of what was malformed.
        reason: String,
    },
}

impl GuardError {
    /// Build an [`GuardError::InvalidLabelSet`] from any printable reason.
    pub fn invalid_label_set(reason: impl Into<String>) -> Self {
        Self::InvalidLabelSet { reason: reason.into() }
    }
}

/// Result alias for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;
