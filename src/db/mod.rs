pub mod repository;
pub mod sqlite;

pub use repository::*;
pub use sqlite::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Invalid source value in storage: {0}")]
    InvalidSource(String),

    #[error("Uniqueness conflict: {0}")]
    Conflict(String),
}

impl DatabaseError {
    /// Map an insert error, turning constraint violations into
    /// [`DatabaseError::Conflict`] so callers can treat them as
    /// retryable instead of as opaque storage failures.
    pub(crate) fn from_insert(e: rusqlite::Error, what: &str) -> Self {
        if let rusqlite::Error::SqliteFailure(inner, _) = &e {
            if inner.code == rusqlite::ErrorCode::ConstraintViolation {
                return Self::Conflict(format!("{what}: {e}"));
            }
        }
        Self::Sqlite(e)
    }
}
