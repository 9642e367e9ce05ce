//! Midstream and downstream version endpoints.

use super::common::{
    format_optional_timestamp, format_timestamp, parse_cluster_id, parse_sequence, read_json,
    resolve_app,
};
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use shipwright_core::DownstreamStatus;
use shipwright_metadata::models::{
    DownstreamOutputRow, DownstreamVersionRow, MidstreamVersionRow, NewDownstreamVersion,
};
use shipwright_metadata::repos::{DownstreamRepo, OutputRepo, VersionRepo};
use time::OffsetDateTime;

// =============================================================================
// Types
// =============================================================================

/// Rendered release for `PUT /v1/apps/{slug}/versions/{sequence}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MidstreamVersionRequest {
    pub update_cursor: Option<String>,
    pub channel_name: Option<String>,
    pub version_label: Option<String>,
    pub release_notes: Option<String>,
    pub encryption_key: Option<String>,
    pub supportbundle_spec: Option<String>,
    pub analyzer_spec: Option<String>,
    pub preflight_spec: Option<String>,
    pub app_spec: Option<String>,
    pub kots_app_spec: Option<String>,
    pub kots_installation_spec: Option<String>,
    pub config_spec: Option<String>,
    pub config_values: Option<String>,
    pub backup_spec: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDownstreamVersionRequest {
    pub parent_sequence: Option<i64>,
    #[serde(default = "default_status")]
    pub status: DownstreamStatus,
    pub status_info: Option<String>,
    pub source: String,
    pub diff_summary: Option<String>,
    pub diff_summary_error: Option<String>,
    #[serde(default)]
    pub git_deployable: bool,
}

fn default_status() -> DownstreamStatus {
    DownstreamStatus::Pending
}

#[derive(Debug, Serialize)]
pub struct CreateDownstreamVersionResponse {
    pub sequence: i64,
}

#[derive(Debug, Serialize)]
pub struct DownstreamVersionResponse {
    pub sequence: i64,
    pub parent_sequence: Option<i64>,
    pub version_label: Option<String>,
    /// Effective status, projected from the stored status and the apply output.
    pub status: DownstreamStatus,
    pub status_info: Option<String>,
    pub source: Option<String>,
    pub diff_summary: Option<String>,
    pub diff_summary_error: Option<String>,
    pub created_at: String,
    pub applied_at: Option<String>,
    pub preflight_result: Option<String>,
    pub preflight_result_created_at: Option<String>,
    pub git_commit_url: Option<String>,
    pub git_deployable: bool,
}

/// Versions for one downstream, split around the deployed sequence.
#[derive(Debug, Serialize)]
pub struct DownstreamVersionsResponse {
    pub current: Option<DownstreamVersionResponse>,
    pub pending: Vec<DownstreamVersionResponse>,
    pub past: Vec<DownstreamVersionResponse>,
}

#[derive(Debug, Serialize)]
pub struct PreviousVersionResponse {
    pub sequence: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApplyOutputRequest {
    pub dryrun_stdout: Option<String>,
    pub dryrun_stderr: Option<String>,
    pub apply_stdout: Option<String>,
    pub apply_stderr: Option<String>,
    pub is_error: bool,
}

fn version_row_to_response(version: DownstreamVersionRow) -> ApiResult<DownstreamVersionResponse> {
    let status = version.effective_status();
    let created_at = format_timestamp(version.created_at, "created_at")?;
    let applied_at = format_optional_timestamp(version.applied_at, "applied_at")?;
    let preflight_result_created_at = format_optional_timestamp(
        version.preflight_result_created_at,
        "preflight_result_created_at",
    )?;

    Ok(DownstreamVersionResponse {
        sequence: version.sequence,
        parent_sequence: version.parent_sequence,
        version_label: version.version_label,
        status,
        status_info: version.status_info,
        source: version.source,
        diff_summary: version.diff_summary,
        diff_summary_error: version.diff_summary_error,
        created_at,
        applied_at,
        preflight_result: version.preflight_result,
        preflight_result_created_at,
        git_commit_url: version.git_commit_url,
        git_deployable: version.git_deployable,
    })
}

fn version_rows_to_response(
    versions: Vec<DownstreamVersionRow>,
) -> ApiResult<Vec<DownstreamVersionResponse>> {
    versions.into_iter().map(version_row_to_response).collect()
}

// =============================================================================
// Handlers
// =============================================================================

/// PUT /v1/apps/{slug}/versions/{sequence} - Create or replace a midstream version.
pub async fn put_midstream_version(
    State(state): State<AppState>,
    Path((slug, sequence)): Path<(String, String)>,
    req: Request,
) -> ApiResult<StatusCode> {
    let app = resolve_app(&state, &slug).await?;
    let sequence = parse_sequence(&sequence)?;
    let body: MidstreamVersionRequest = read_json(req).await?;

    let version = MidstreamVersionRow {
        app_id: app.id,
        sequence,
        update_cursor: body.update_cursor,
        channel_name: body.channel_name,
        version_label: body.version_label,
        release_notes: body.release_notes,
        encryption_key: body.encryption_key,
        supportbundle_spec: body.supportbundle_spec,
        analyzer_spec: body.analyzer_spec,
        preflight_spec: body.preflight_spec,
        app_spec: body.app_spec,
        kots_app_spec: body.kots_app_spec,
        kots_installation_spec: body.kots_installation_spec,
        config_spec: body.config_spec,
        config_values: body.config_values,
        backup_spec: body.backup_spec,
        created_at: Some(OffsetDateTime::now_utc()),
    };
    state
        .metadata
        .create_or_replace_midstream_version(&version)
        .await?;
    metrics::MIDSTREAM_VERSIONS_RECORDED.inc();

    tracing::info!(app_id = %app.id, sequence, "recorded midstream version");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/apps/{slug}/downstreams/{cluster_id}/versions - Allocate the next sequence.
pub async fn create_downstream_version(
    State(state): State<AppState>,
    Path((slug, cluster_id)): Path<(String, String)>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CreateDownstreamVersionResponse>)> {
    let app = resolve_app(&state, &slug).await?;
    let cluster_id = parse_cluster_id(&cluster_id)?;
    let body: CreateDownstreamVersionRequest = read_json(req).await?;

    if let Some(parent) = body.parent_sequence
        && state
            .metadata
            .get_midstream_version(app.id, parent)
            .await?
            .is_none()
    {
        return Err(ApiError::BadRequest(format!(
            "parent sequence {parent} has no midstream version"
        )));
    }

    let sequence = state
        .metadata
        .create_downstream_version(&NewDownstreamVersion {
            app_id: app.id,
            cluster_id,
            parent_sequence: body.parent_sequence,
            status: body.status,
            status_info: body.status_info,
            source: body.source,
            diff_summary: body.diff_summary,
            diff_summary_error: body.diff_summary_error,
            git_deployable: body.git_deployable,
            created_at: OffsetDateTime::now_utc(),
        })
        .await?;
    metrics::DOWNSTREAM_VERSIONS_CREATED.inc();

    tracing::info!(app_id = %app.id, cluster_id = %cluster_id, sequence, "created downstream version");
    Ok((
        StatusCode::CREATED,
        Json(CreateDownstreamVersionResponse { sequence }),
    ))
}

/// GET /v1/apps/{slug}/downstreams/{cluster_id}/versions - Current, pending and past.
pub async fn list_downstream_versions(
    State(state): State<AppState>,
    Path((slug, cluster_id)): Path<(String, String)>,
) -> ApiResult<Json<DownstreamVersionsResponse>> {
    let app = resolve_app(&state, &slug).await?;
    let cluster_id = parse_cluster_id(&cluster_id)?;

    let current = state
        .metadata
        .get_current_version(app.id, cluster_id)
        .await?
        .map(version_row_to_response)
        .transpose()?;
    let pending = state
        .metadata
        .list_pending_versions(app.id, cluster_id)
        .await?;
    let past = state.metadata.list_past_versions(app.id, cluster_id).await?;

    Ok(Json(DownstreamVersionsResponse {
        current,
        pending: version_rows_to_response(pending)?,
        past: version_rows_to_response(past)?,
    }))
}

/// GET /v1/apps/{slug}/downstreams/{cluster_id}/versions/previous - Rollback target.
pub async fn get_previous_version(
    State(state): State<AppState>,
    Path((slug, cluster_id)): Path<(String, String)>,
) -> ApiResult<Json<PreviousVersionResponse>> {
    let app = resolve_app(&state, &slug).await?;
    let cluster_id = parse_cluster_id(&cluster_id)?;

    let downstream = state
        .metadata
        .get_downstream(app.id, cluster_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("downstream {cluster_id} not found")))?;

    let sequence = state
        .metadata
        .get_previously_deployed_sequence(app.id, cluster_id, downstream.current_sequence)
        .await?;
    Ok(Json(PreviousVersionResponse { sequence }))
}

/// POST /v1/apps/{slug}/downstreams/{cluster_id}/versions/{sequence}/deploy
pub async fn deploy_downstream_version(
    State(state): State<AppState>,
    Path((slug, cluster_id, sequence)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    let app = resolve_app(&state, &slug).await?;
    let cluster_id = parse_cluster_id(&cluster_id)?;
    let sequence = parse_sequence(&sequence)?;

    state
        .metadata
        .mark_downstream_version_deployed(app.id, cluster_id, sequence, OffsetDateTime::now_utc())
        .await?;
    metrics::DEPLOYS_MARKED.inc();

    tracing::info!(app_id = %app.id, cluster_id = %cluster_id, sequence, "marked version deployed");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /v1/apps/{slug}/downstreams/{cluster_id}/versions/{sequence}/output
pub async fn put_apply_output(
    State(state): State<AppState>,
    Path((slug, cluster_id, sequence)): Path<(String, String, String)>,
    req: Request,
) -> ApiResult<StatusCode> {
    let app = resolve_app(&state, &slug).await?;
    let cluster_id = parse_cluster_id(&cluster_id)?;
    let sequence = parse_sequence(&sequence)?;
    let body: ApplyOutputRequest = read_json(req).await?;

    state
        .metadata
        .record_apply_output(&DownstreamOutputRow {
            app_id: app.id,
            cluster_id,
            downstream_sequence: sequence,
            dryrun_stdout: body.dryrun_stdout,
            dryrun_stderr: body.dryrun_stderr,
            apply_stdout: body.apply_stdout,
            apply_stderr: body.apply_stderr,
            is_error: body.is_error,
            created_at: OffsetDateTime::now_utc(),
        })
        .await?;
    metrics::record_apply_output(body.is_error);

    if body.is_error {
        tracing::warn!(app_id = %app.id, cluster_id = %cluster_id, sequence, "apply reported an error");
    }
    Ok(StatusCode::NO_CONTENT)
}
