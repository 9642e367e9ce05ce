//! GitOps provider and destination endpoints.

use super::common::{parse_cluster_id, read_json, resolve_app};
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use shipwright_core::{GitOpsDestination, ProviderType};
use shipwright_gitops::ProviderRegistration;

#[derive(Debug, Deserialize)]
pub struct ProviderRequest {
    pub provider: ProviderType,
    pub repo_uri: String,
    pub hostname: Option<String>,
    pub private_key: String,
    pub public_key: String,
}

#[derive(Debug, Serialize)]
pub struct ProviderResponse {
    pub index: u32,
}

#[derive(Debug, Deserialize)]
pub struct GitOpsErrorRequest {
    pub message: String,
}

/// Destination joined with its provider. The private key is never returned.
#[derive(Debug, Serialize)]
pub struct DownstreamGitOpsResponse {
    #[serde(flatten)]
    pub destination: GitOpsDestination,
    pub provider: ProviderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "cloneUri")]
    pub clone_uri: String,
}

/// PUT /v1/gitops/provider - Register or refresh a provider.
pub async fn put_provider(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<ProviderResponse>> {
    let body: ProviderRequest = read_json(req).await?;

    let index = state
        .gitops
        .set_up_gitops_repo(&ProviderRegistration {
            provider: body.provider,
            repo_uri: body.repo_uri,
            hostname: body.hostname,
            private_key: body.private_key,
            public_key: body.public_key,
        })
        .await?;
    Ok(Json(ProviderResponse { index }))
}

/// DELETE /v1/gitops - Remove all providers and destinations.
pub async fn reset_gitops(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.gitops.reset().await?;
    tracing::info!("gitops configuration reset");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/apps/{slug}/downstreams/{cluster_id}/gitops
///
/// 404 when the downstream has no destination or no provider is registered for its repo.
pub async fn get_downstream_gitops(
    State(state): State<AppState>,
    Path((slug, cluster_id)): Path<(String, String)>,
) -> ApiResult<Json<DownstreamGitOpsResponse>> {
    let app = resolve_app(&state, &slug).await?;
    let cluster_id = parse_cluster_id(&cluster_id)?;

    let info = state.gitops.get_gitops_info(app.id, cluster_id).await?;
    let clone_uri = info.clone_uri();

    Ok(Json(DownstreamGitOpsResponse {
        destination: info.destination,
        provider: info.provider,
        hostname: info.hostname,
        public_key: info.public_key,
        clone_uri,
    }))
}

/// PUT /v1/apps/{slug}/downstreams/{cluster_id}/gitops
pub async fn put_downstream_gitops(
    State(state): State<AppState>,
    Path((slug, cluster_id)): Path<(String, String)>,
    req: Request,
) -> ApiResult<Json<GitOpsDestination>> {
    let app = resolve_app(&state, &slug).await?;
    let cluster_id = parse_cluster_id(&cluster_id)?;
    let destination: GitOpsDestination = read_json(req).await?;
    if destination.repo_uri.trim().is_empty() || destination.branch.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "repoUri and branch must not be empty".to_string(),
        ));
    }

    let stored = state
        .gitops
        .set_downstream_gitops(app.id, cluster_id, destination)
        .await?;
    Ok(Json(stored))
}

/// DELETE /v1/apps/{slug}/downstreams/{cluster_id}/gitops
pub async fn delete_downstream_gitops(
    State(state): State<AppState>,
    Path((slug, cluster_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let app = resolve_app(&state, &slug).await?;
    let cluster_id = parse_cluster_id(&cluster_id)?;

    if !state
        .gitops
        .disable_downstream_gitops(app.id, cluster_id)
        .await?
    {
        return Err(ApiError::NotFound(
            "gitops is not enabled for downstream".to_string(),
        ));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/apps/{slug}/downstreams/{cluster_id}/gitops/error
///
/// Reports against a downstream without GitOps are accepted and dropped.
pub async fn post_gitops_error(
    State(state): State<AppState>,
    Path((slug, cluster_id)): Path<(String, String)>,
    req: Request,
) -> ApiResult<StatusCode> {
    let app = resolve_app(&state, &slug).await?;
    let cluster_id = parse_cluster_id(&cluster_id)?;
    let body: GitOpsErrorRequest = read_json(req).await?;

    if state
        .gitops
        .set_gitops_error(app.id, cluster_id, &body.message)
        .await?
    {
        metrics::GITOPS_ERRORS_RECORDED.inc();
    }
    Ok(StatusCode::NO_CONTENT)
}
