//! GitOps and resource error types.

use thiserror::Error;

/// Key/value resource backend errors.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid resource name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt resource {name}: {message}")]
    Corrupt { name: String, message: String },
}

/// Result type for resource backend operations.
pub type ResourceResult<T> = std::result::Result<T, ResourceError>;

/// GitOps configuration store errors.
#[derive(Debug, Error)]
pub enum GitOpsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid value for {key}: {message}")]
    Encoding { key: String, message: String },

    #[error("invalid gitops request: {0}")]
    Invalid(String),

    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("core error: {0}")]
    Core(#[from] shipwright_core::Error),
}

/// Result type for GitOps operations.
pub type GitOpsResult<T> = std::result::Result<T, GitOpsError>;
