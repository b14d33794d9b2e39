//! Common error types for StylePick

use thiserror::Error;

/// Common result type for StylePick operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across StylePick crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON column encode/decode error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Competing write won: duplicate open session, stale matchup,
    /// or lock contention that outlived the retry budget
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not allowed in the session's current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not enough material to satisfy the request (e.g. too few candidates)
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for transient SQLite contention (`SQLITE_BUSY` / `SQLITE_LOCKED`)
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => {
                let code_busy = matches!(
                    db_err.code().as_deref(),
                    Some("5") | Some("6") | Some("517") | Some("261")
                );
                code_busy || db_err.message().contains("database is locked")
            }
            Error::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }

    /// True when a write hit a UNIQUE constraint
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_category() {
        let err = Error::Conflict("stale matchup".to_string());
        assert_eq!(err.to_string(), "Conflict: stale matchup");

        let err = Error::ResourceExhausted("only 3 candidates".to_string());
        assert_eq!(err.to_string(), "Resource exhausted: only 3 candidates");
    }

    #[test]
    fn test_non_database_errors_are_not_contention() {
        assert!(!Error::Internal("database is locked".to_string()).is_lock_contention());
        assert!(!Error::Conflict("x".to_string()).is_unique_violation());
    }

    #[test]
    fn test_pool_timeout_counts_as_contention() {
        assert!(Error::Database(sqlx::Error::PoolTimedOut).is_lock_contention());
    }
}
