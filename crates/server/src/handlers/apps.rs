//! Application, install state and downstream endpoints.

use super::common::{format_timestamp, parse_cluster_id, read_json, resolve_app};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use shipwright_core::{InstallEvent, InstallState, TaskStatus};
use shipwright_metadata::models::{AppRow, DownstreamRow};
use shipwright_metadata::repos::{AppRepo, DownstreamRepo, TaskStatusRepo};
use time::OffsetDateTime;

// =============================================================================
// Types
// =============================================================================

/// Request to create an application.
#[derive(Debug, Deserialize)]
pub struct CreateAppRequest {
    pub name: String,
    pub upstream_uri: String,
    #[serde(default)]
    pub is_airgap: bool,
}

#[derive(Debug, Serialize)]
pub struct AppResponse {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub icon_uri: Option<String>,
    pub upstream_uri: String,
    pub current_sequence: Option<i64>,
    pub install_state: InstallState,
    pub is_airgap: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct ListAppsResponse {
    pub apps: Vec<AppResponse>,
}

#[derive(Debug, Serialize)]
pub struct DownstreamResponse {
    pub cluster_id: String,
    pub name: String,
    pub current_sequence: Option<i64>,
}

/// Application with its downstreams and, while an upload runs, its task progress.
#[derive(Debug, Serialize)]
pub struct AppDetailResponse {
    #[serde(flatten)]
    pub app: AppResponse,
    pub downstreams: Vec<DownstreamResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_task: Option<TaskStatus>,
}

#[derive(Debug, Serialize)]
pub struct DeleteAppResponse {
    pub slug: String,
    pub midstream_versions: u64,
    pub downstreams: u64,
    pub downstream_versions: u64,
    pub downstream_outputs: u64,
}

/// Either a direct state write or an event to run through the state machine.
#[derive(Debug, Deserialize)]
pub struct InstallStateRequest {
    pub state: Option<InstallState>,
    pub event: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InstallStateResponse {
    pub install_state: InstallState,
}

#[derive(Debug, Deserialize)]
pub struct AddDownstreamRequest {
    pub cluster_id: String,
    pub name: String,
}

fn parse_install_event(raw: &str) -> ApiResult<InstallEvent> {
    match raw {
        "begin" => Ok(InstallEvent::Begin),
        "succeed" => Ok(InstallEvent::Succeed),
        "fail" => Ok(InstallEvent::Fail),
        "reset" => Ok(InstallEvent::Reset),
        other => Err(ApiError::BadRequest(format!(
            "unknown install event '{other}', expected begin, succeed, fail or reset"
        ))),
    }
}

fn app_install_state(app: &AppRow) -> ApiResult<InstallState> {
    app.install_state()
        .map_err(|e| ApiError::Internal(format!("app {} has {e}", app.slug)))
}

fn app_row_to_response(app: AppRow) -> ApiResult<AppResponse> {
    let install_state = app_install_state(&app)?;
    let created_at = format_timestamp(app.created_at, "created_at")?;
    let updated_at = format_timestamp(app.updated_at, "updated_at")?;

    Ok(AppResponse {
        id: app.id.to_string(),
        name: app.name,
        slug: app.slug,
        icon_uri: app.icon_uri,
        upstream_uri: app.upstream_uri,
        current_sequence: app.current_sequence,
        install_state,
        is_airgap: app.is_airgap,
        created_at,
        updated_at,
    })
}

fn downstream_row_to_response(downstream: DownstreamRow) -> DownstreamResponse {
    DownstreamResponse {
        cluster_id: downstream.cluster_id.to_string(),
        name: downstream.downstream_name,
        current_sequence: downstream.current_sequence,
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /v1/apps - Create an application.
pub async fn create_app(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<AppResponse>)> {
    let body: CreateAppRequest = read_json(req).await?;
    if body.upstream_uri.trim().is_empty() {
        return Err(ApiError::BadRequest("upstream_uri must not be empty".to_string()));
    }

    let app = state
        .metadata
        .create_app(
            &body.name,
            &body.upstream_uri,
            body.is_airgap,
            OffsetDateTime::now_utc(),
        )
        .await?;

    tracing::info!(
        app_id = %app.id,
        slug = %app.slug,
        install_state = %app.install_state,
        "created app"
    );

    Ok((StatusCode::CREATED, Json(app_row_to_response(app)?)))
}

/// GET /v1/apps - List applications.
pub async fn list_apps(State(state): State<AppState>) -> ApiResult<Json<ListAppsResponse>> {
    let apps = state
        .metadata
        .list_apps()
        .await?
        .into_iter()
        .map(app_row_to_response)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(ListAppsResponse { apps }))
}

/// GET /v1/apps/{slug} - Application detail.
pub async fn get_app(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<AppDetailResponse>> {
    let app = resolve_app(&state, &slug).await?;

    let downstreams = state
        .metadata
        .list_downstreams(app.id)
        .await?
        .into_iter()
        .map(downstream_row_to_response)
        .collect();

    let install_task = match app_install_state(&app)?.mode() {
        Some(mode) => Some(
            state
                .metadata
                .get_task_status(mode.task_id(), OffsetDateTime::now_utc())
                .await?,
        ),
        None => None,
    };

    Ok(Json(AppDetailResponse {
        app: app_row_to_response(app)?,
        downstreams,
        install_task,
    }))
}

/// DELETE /v1/apps/{slug} - Delete an application and everything under it.
///
/// GitOps destinations for its downstreams are removed first since they live
/// outside the metadata store.
pub async fn delete_app(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<DeleteAppResponse>> {
    let app = resolve_app(&state, &slug).await?;

    for downstream in state.metadata.list_downstreams(app.id).await? {
        state
            .gitops
            .disable_downstream_gitops(app.id, downstream.cluster_id)
            .await?;
    }

    let stats = state.metadata.delete_app(app.id).await?;
    tracing::info!(
        app_id = %app.id,
        slug = %app.slug,
        midstream_versions = stats.midstream_versions,
        downstreams = stats.downstreams,
        downstream_versions = stats.downstream_versions,
        downstream_outputs = stats.downstream_outputs,
        "deleted app"
    );

    Ok(Json(DeleteAppResponse {
        slug: app.slug,
        midstream_versions: stats.midstream_versions,
        downstreams: stats.downstreams,
        downstream_versions: stats.downstream_versions,
        downstream_outputs: stats.downstream_outputs,
    }))
}

/// PUT /v1/apps/{slug}/install-state - Set the install state or apply an event.
pub async fn update_install_state(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    req: Request,
) -> ApiResult<Json<InstallStateResponse>> {
    let app = resolve_app(&state, &slug).await?;
    let body: InstallStateRequest = read_json(req).await?;
    let now = OffsetDateTime::now_utc();

    let install_state = match (body.state, body.event.as_deref()) {
        (Some(target), None) => {
            state.metadata.set_install_state(app.id, target, now).await?;
            target
        }
        (None, Some(event)) => {
            let event = parse_install_event(event)?;
            state
                .metadata
                .transition_install_state(app.id, event, now)
                .await?
        }
        _ => {
            return Err(ApiError::BadRequest(
                "exactly one of 'state' or 'event' must be provided".to_string(),
            ));
        }
    };

    tracing::info!(app_id = %app.id, install_state = %install_state.as_str(), "install state updated");
    Ok(Json(InstallStateResponse { install_state }))
}

/// POST /v1/apps/{slug}/install-state/reset - Retry after an upload error.
pub async fn reset_install_state(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<InstallStateResponse>> {
    let app = resolve_app(&state, &slug).await?;
    let install_state = state
        .metadata
        .reset_install_state(app.id, OffsetDateTime::now_utc())
        .await?;

    tracing::info!(app_id = %app.id, install_state = %install_state.as_str(), "install state reset");
    Ok(Json(InstallStateResponse { install_state }))
}

/// POST /v1/apps/{slug}/downstreams - Register a cluster.
pub async fn add_downstream(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    req: Request,
) -> ApiResult<(StatusCode, Json<DownstreamResponse>)> {
    let app = resolve_app(&state, &slug).await?;
    let body: AddDownstreamRequest = read_json(req).await?;
    let cluster_id = parse_cluster_id(&body.cluster_id)?;
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }

    let downstream = state
        .metadata
        .add_downstream(app.id, cluster_id, &body.name)
        .await?;
    tracing::info!(app_id = %app.id, cluster_id = %cluster_id, "added downstream");

    Ok((
        StatusCode::CREATED,
        Json(downstream_row_to_response(downstream)),
    ))
}
