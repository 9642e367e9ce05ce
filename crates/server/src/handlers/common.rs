//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Request, State};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shipwright_metadata::models::AppRow;
use shipwright_metadata::repos::AppRepo;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Maximum request body size (1 MiB). Midstream versions carry rendered specs.
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Read and decode a JSON request body.
pub async fn read_json<T: DeserializeOwned>(req: Request) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

pub fn parse_cluster_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("invalid cluster ID: {e}")))
}

pub fn parse_sequence(raw: &str) -> ApiResult<i64> {
    let sequence: i64 = raw
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid sequence '{raw}': {e}")))?;
    if sequence < 0 {
        return Err(ApiError::BadRequest(format!(
            "sequence must not be negative, got {sequence}"
        )));
    }
    Ok(sequence)
}

/// Look up an application by slug.
pub async fn resolve_app(state: &AppState, slug: &str) -> ApiResult<AppRow> {
    state
        .metadata
        .get_app_by_slug(slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("app '{slug}' not found")))
}

pub fn format_timestamp(ts: OffsetDateTime, field: &str) -> ApiResult<String> {
    ts.format(&Rfc3339)
        .map_err(|e| ApiError::Internal(format!("failed to format {field}: {e}")))
}

pub fn format_optional_timestamp(
    ts: Option<OffsetDateTime>,
    field: &str,
) -> ApiResult<Option<String>> {
    ts.map(|ts| format_timestamp(ts, field)).transpose()
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /v1/health - Health check.
///
/// Returns only non-sensitive information (status and version).
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;
    state.gitops.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}
