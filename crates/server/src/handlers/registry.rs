//! Registry credential endpoints. Passwords are accepted but never returned.

use super::common::{read_json, resolve_app};
use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct RegistryResponse {
    pub hostname: Option<String>,
    pub username: Option<String>,
    pub namespace: Option<String>,
    pub has_password: bool,
}

#[derive(Deserialize)]
pub struct UpdateRegistryRequest {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub username: String,
    /// Omit to keep the stored password.
    pub password: Option<String>,
    #[serde(default)]
    pub namespace: String,
}

/// GET /v1/apps/{slug}/registry
///
/// Reading is also what moves a legacy plaintext password to ciphertext.
pub async fn get_registry(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<RegistryResponse>> {
    let app = resolve_app(&state, &slug).await?;
    let details = state.registry.get_registry_details(app.id).await?;

    Ok(Json(RegistryResponse {
        hostname: details.hostname,
        username: details.username,
        namespace: details.namespace,
        has_password: details.password.is_some_and(|p| !p.is_empty()),
    }))
}

/// PUT /v1/apps/{slug}/registry
pub async fn put_registry(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let app = resolve_app(&state, &slug).await?;
    let body: UpdateRegistryRequest = read_json(req).await?;

    state
        .registry
        .update_registry_details(
            app.id,
            &body.hostname,
            &body.username,
            body.password.as_deref(),
            &body.namespace,
        )
        .await?;

    tracing::info!(app_id = %app.id, hostname = %body.hostname, "updated registry details");
    Ok(StatusCode::NO_CONTENT)
}
