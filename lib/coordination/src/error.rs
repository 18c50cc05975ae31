//! Error types for the coordination crate.

use std::fmt;

/// Errors from leader election and execution-bus operations.
#[derive(Debug)]
pub enum CoordinationError {
    /// The underlying database returned an error.
    Database { reason: String },
    /// A row failed to serialize before being written.
    SerializationFailed { reason: String },
}

impl fmt::Display for CoordinationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database { reason } => write!(f, "database error: {reason}"),
            Self::SerializationFailed { reason } => write!(f, "serialization failed: {reason}"),
        }
    }
}

impl std::error::Error for CoordinationError {}

impl From<sqlx::Error> for CoordinationError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoordinationError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed {
            reason: err.to_string(),
        }
    }
}
