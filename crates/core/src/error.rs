//! Unified error types for docshelf.
//!
//! Store failures are classified so callers can tell a lost race
//! (`Conflict`) from a retryable outage (`Transient`) or a broken
//! precondition (`Integrity`).

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the document store and its read API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty domain).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Another crawl already holds the lease for this domain.
    #[error("CRAWL_CONFLICT: {0}")]
    Conflict(String),

    /// Lookup by url, id or generation missed.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// A constraint or generation precondition was violated.
    #[error("INTEGRITY_ERROR: {0}")]
    Integrity(String),

    /// The backing store is busy, locked or unreachable.
    #[error("STORE_UNAVAILABLE: {0}")]
    Transient(String),

    /// Database operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Transient("connection closed".into()),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Transient("connection closed".into()),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e.into(),
            tokio_rusqlite::Error::ConnectionClosed => Error::Transient("connection closed".into()),
            other => Error::Database(other),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => Error::Integrity(err.to_string()),
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
                Error::Transient(err.to_string())
            }
            _ => Error::Database(tokio_rusqlite::Error::Error(err)),
        }
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::Conflict(msg) => (-32010, msg.clone()),
            Error::NotFound(msg) => (-32001, msg.clone()),
            Error::Integrity(msg) => (-32011, msg.clone()),
            Error::Transient(msg) => (-32012, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Conflict("react.dev".to_string());
        assert!(err.to_string().contains("CRAWL_CONFLICT"));
        assert!(err.to_string().contains("react.dev"));
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::NotFound("https://react.dev/learn".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32001);
    }

    #[test]
    fn test_busy_is_transient() {
        let err: Error = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        )
        .into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_constraint_is_integrity() {
        let err: Error = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed: documents.url".into()),
        )
        .into();
        assert!(matches!(err, Error::Integrity(_)));
        assert!(!err.is_transient());
    }
}
