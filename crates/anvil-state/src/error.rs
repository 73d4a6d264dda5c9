//! Error types for the anvil-state persistence layer.

use thiserror::Error;

/// Errors produced by storage backends and the records they guard.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection failed
    #[error("database connection failed: {0}")]
    Connection(String),

    /// Backend query failed
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A referenced row does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A row exists but is not in the state the operation requires
    #[error("{entity} {id} is {status}, expected {expected}")]
    InvalidState {
        entity: &'static str,
        id: String,
        status: String,
        expected: String,
    },

    /// A write lost a race against another writer and must not be retried blindly
    #[error("{entity} {id} already decided")]
    Conflict { entity: &'static str, id: String },

    /// A digest string is not 64 lowercase hex characters
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Row (de)serialization failed
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_entity() {
        let err = StorageError::NotFound {
            entity: "commit",
            id: "abc123".to_string(),
        };
        assert_eq!(err.to_string(), "commit not found: abc123");
    }

    #[test]
    fn conflict_display() {
        let err = StorageError::Conflict {
            entity: "deployment",
            id: "dep-1".to_string(),
        };
        assert!(err.to_string().contains("already decided"));
    }
}
