use contactlink_core::ContactId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("contact not found: {0}")]
    NotFound(ContactId),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("core error: {0}")]
    Core(#[from] contactlink_core::CoreError),
}

impl StorageError {
    /// Whether rerunning the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_is_retryable() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(StorageError::Sqlite(busy).is_retryable());
        assert!(StorageError::Conflict("x".into()).is_retryable());
        assert!(!StorageError::Unavailable("x".into()).is_retryable());
        assert!(!StorageError::NotFound(ContactId::new(1)).is_retryable());
    }
}
