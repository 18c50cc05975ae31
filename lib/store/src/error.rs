//! Error types for the store crate.

use std::fmt;

/// Errors from store operations.
#[derive(Debug)]
pub enum StoreError {
    /// `createTask` was called with an id that already exists.
    TaskAlreadyExists { id: String },
    /// The requested task does not exist.
    TaskNotFound { id: String },
    /// The requested execution does not exist.
    ExecutionNotFound { id: String },
    /// A row failed to serialize before being written.
    SerializationFailed { reason: String },
    /// The underlying database returned an error.
    Database { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaskAlreadyExists { id } => write!(f, "task already exists: {id}"),
            Self::TaskNotFound { id } => write!(f, "task not found: {id}"),
            Self::ExecutionNotFound { id } => write!(f, "execution not found: {id}"),
            Self::SerializationFailed { reason } => write!(f, "serialization failed: {reason}"),
            Self::Database { reason } => write!(f, "database error: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed {
            reason: err.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_id() {
        let err = StoreError::TaskNotFound {
            id: "task_123".to_string(),
        };
        assert!(err.to_string().contains("task_123"));
    }
}
