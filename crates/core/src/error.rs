//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid install state: {0}")]
    InvalidInstallState(String),

    #[error("invalid install state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid downstream status: {0}")]
    InvalidStatus(String),

    #[error("invalid task id: {0}")]
    InvalidTaskId(String),

    #[error("invalid gitops provider: {0}")]
    InvalidProvider(String),

    #[error("invalid slug source: {0}")]
    InvalidSlug(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
