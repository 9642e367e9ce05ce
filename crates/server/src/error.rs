//! API error types.

use crate::registry::RegistryError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use shipwright_gitops::{GitOpsError, ResourceError};
use shipwright_metadata::MetadataError;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message, carrying the underlying cause.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("gitops error: {0}")]
    GitOps(#[from] GitOpsError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("core error: {0}")]
    Core(#[from] shipwright_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
            Self::Metadata(_) => "metadata_error",
            Self::GitOps(_) => "gitops_error",
            Self::Registry(_) => "registry_error",
            Self::Core(_) => "core_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Metadata(e) => metadata_status(e),
            Self::GitOps(e) => match e {
                GitOpsError::NotFound(_) => StatusCode::NOT_FOUND,
                GitOpsError::Invalid(_) | GitOpsError::Core(_) => StatusCode::BAD_REQUEST,
                GitOpsError::Resource(ResourceError::InvalidName(_)) => StatusCode::BAD_REQUEST,
                GitOpsError::Resource(_) | GitOpsError::Encoding { .. } => StatusCode::BAD_GATEWAY,
            },
            Self::Registry(e) => match e {
                RegistryError::Metadata(e) => metadata_status(e),
                RegistryError::Crypto(_) | RegistryError::MissingKey => StatusCode::BAD_GATEWAY,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }
}

fn metadata_status(err: &MetadataError) -> StatusCode {
    match err {
        MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
        MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
        MetadataError::Constraint(_) => StatusCode::CONFLICT,
        MetadataError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
        MetadataError::Invalid(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Metadata(MetadataError::NotFound("app".to_string())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Metadata(MetadataError::Constraint("seq".to_string())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::GitOps(GitOpsError::NotFound("dest".to_string())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::GitOps(GitOpsError::Resource(ResourceError::Io(std::io::Error::other(
                "disk"
            ))))
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Registry(RegistryError::MissingKey).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_message_keeps_underlying_cause() {
        let err = ApiError::GitOps(GitOpsError::Resource(ResourceError::Io(
            std::io::Error::other("permission denied"),
        )));
        assert!(err.to_string().contains("permission denied"));
    }
}
