//! Error types for the storage layer.

use thiserror::Error;

/// Result type alias using the storage layer's error type.
pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    /// Underlying SQLite failure.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Referenced entity absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write rejected by a domain invariant.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Unrecoverable state (poisoned lock, corrupted data).
    #[error("Fatal: {0}")]
    Fatal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_reason() {
        let err = DbError::Validation("receiver is not a participant".into());
        assert_eq!(
            err.to_string(),
            "Validation failed: receiver is not a participant"
        );

        let err = DbError::NotFound("conversation".into());
        assert_eq!(err.to_string(), "Not found: conversation");
    }

    #[test]
    fn from_rusqlite_error() {
        let err: DbError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, DbError::Storage(_)));
    }
}
