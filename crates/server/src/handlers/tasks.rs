//! Background task heartbeat endpoints.

use super::common::read_json;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use serde::Deserialize;
use shipwright_core::{TaskId, TaskStatus};
use shipwright_metadata::repos::TaskStatusRepo;
use time::OffsetDateTime;

#[derive(Debug, Deserialize)]
pub struct TaskStatusRequest {
    pub status: String,
    #[serde(default)]
    pub current_message: String,
}

fn parse_task_id(raw: &str) -> ApiResult<TaskId> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))
}

/// GET /v1/tasks/{task_id} - Latest heartbeat, or empty when absent or stale.
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskStatus>> {
    let task_id = parse_task_id(&task_id)?;
    let status = state
        .metadata
        .get_task_status(task_id, OffsetDateTime::now_utc())
        .await?;
    Ok(Json(status))
}

/// PUT /v1/tasks/{task_id} - Record a heartbeat.
pub async fn put_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let task_id = parse_task_id(&task_id)?;
    let body: TaskStatusRequest = read_json(req).await?;

    state
        .metadata
        .set_task_status(
            task_id,
            &body.status,
            &body.current_message,
            OffsetDateTime::now_utc(),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
