use super::store::StorageError;

/// Outcome of a rejected manager operation. `Storage` carries any backend
/// failure that is not a recognised uniqueness conflict, unchanged.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RecordError {
    pub(crate) fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        RecordError::NotFound(format!("{kind} with ID {id} not found."))
    }

    pub(crate) fn missing_reference(kind: &str, id: impl std::fmt::Display) -> Self {
        RecordError::BadRequest(format!("{kind} with ID {id} does not exist."))
    }

    pub(crate) fn id_mismatch() -> Self {
        RecordError::BadRequest("ID mismatch.".to_string())
    }
}
