//! Metadata store error types.

use thiserror::Error;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<shipwright_core::Error> for MetadataError {
    fn from(err: shipwright_core::Error) -> Self {
        match err {
            shipwright_core::Error::InvalidTransition { from, to } => {
                Self::InvalidStateTransition { from, to }
            }
            shipwright_core::Error::InvalidInstallState(s)
            | shipwright_core::Error::InvalidStatus(s) => Self::Corrupt(s),
            other => Self::Invalid(other.to_string()),
        }
    }
}

impl MetadataError {
    /// Whether a database error is a UNIQUE or PRIMARY KEY violation.
    pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
    }

    /// Whether a database error means another writer won a race and the
    /// whole transaction can be retried: a uniqueness violation, or
    /// `SQLITE_BUSY`/`SQLITE_LOCKED` and their extended codes.
    pub(crate) fn is_write_conflict(err: &sqlx::Error) -> bool {
        if Self::is_unique_violation(err) {
            return true;
        }
        let sqlx::Error::Database(db_err) = err else {
            return false;
        };
        db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
