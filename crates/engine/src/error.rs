use contactlink_core::{ContactId, CoreError};
use contactlink_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The caller supplied neither an email nor a phone number.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The transaction could not be read or committed; nothing was written.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StorageError),

    #[error("contact not found: {0}")]
    ContactNotFound(ContactId),
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        Self::StoreUnavailable(err)
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidRequest(msg) => Self::InvalidRequest(msg),
            other => Self::StoreUnavailable(StorageError::Core(other)),
        }
    }
}
