//! Domain-level error taxonomy for Anvil.

use anvil_state::StorageError;

/// Anvil domain errors.
///
/// The variants mirror the user-visible failure classes: the HTTP boundary
/// maps `NotFound`/`Forbidden`/`Conflict`/`Validation` to 404/403/409/400 and
/// everything else to a 5xx.
#[derive(Debug, thiserror::Error)]
pub enum AnvilError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for AnvilError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => AnvilError::NotFound(format!("{entity} {id}")),
            StorageError::Conflict { entity, id } => {
                AnvilError::Conflict(format!("{entity} {id} already decided"))
            }
            other => AnvilError::Storage(other),
        }
    }
}

/// Result type for Anvil domain operations.
pub type Result<T> = std::result::Result<T, AnvilError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_not_found_maps_to_domain_not_found() {
        let err: AnvilError = StorageError::NotFound {
            entity: "commit",
            id: "r1/abc".to_string(),
        }
        .into();
        assert!(matches!(err, AnvilError::NotFound(_)));
        assert!(err.to_string().contains("commit r1/abc"));
    }

    #[test]
    fn storage_conflict_maps_to_domain_conflict() {
        let err: AnvilError = StorageError::Conflict {
            entity: "deployment",
            id: "d1".to_string(),
        }
        .into();
        assert!(matches!(err, AnvilError::Conflict(_)));
    }

    #[test]
    fn backend_errors_stay_storage() {
        let err: AnvilError = StorageError::Backend("boom".to_string()).into();
        assert!(matches!(err, AnvilError::Storage(_)));
    }
}
