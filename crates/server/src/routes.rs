//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::{delete, get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check (unauthenticated for load balancers/k8s probes)
        .route("/v1/health", get(handlers::health_check))
        // Applications
        .route(
            "/v1/apps",
            post(handlers::create_app).get(handlers::list_apps),
        )
        .route(
            "/v1/apps/{slug}",
            get(handlers::get_app).delete(handlers::delete_app),
        )
        .route(
            "/v1/apps/{slug}/install-state",
            put(handlers::update_install_state),
        )
        .route(
            "/v1/apps/{slug}/install-state/reset",
            post(handlers::reset_install_state),
        )
        .route(
            "/v1/apps/{slug}/registry",
            get(handlers::get_registry).put(handlers::put_registry),
        )
        // Versions
        .route(
            "/v1/apps/{slug}/versions/{sequence}",
            put(handlers::put_midstream_version),
        )
        .route(
            "/v1/apps/{slug}/downstreams",
            post(handlers::add_downstream),
        )
        .route(
            "/v1/apps/{slug}/downstreams/{cluster_id}/versions",
            get(handlers::list_downstream_versions).post(handlers::create_downstream_version),
        )
        .route(
            "/v1/apps/{slug}/downstreams/{cluster_id}/versions/previous",
            get(handlers::get_previous_version),
        )
        .route(
            "/v1/apps/{slug}/downstreams/{cluster_id}/versions/{sequence}/deploy",
            post(handlers::deploy_downstream_version),
        )
        .route(
            "/v1/apps/{slug}/downstreams/{cluster_id}/versions/{sequence}/output",
            put(handlers::put_apply_output),
        )
        // GitOps
        .route("/v1/gitops", delete(handlers::reset_gitops))
        .route("/v1/gitops/provider", put(handlers::put_provider))
        .route(
            "/v1/apps/{slug}/downstreams/{cluster_id}/gitops",
            get(handlers::get_downstream_gitops)
                .put(handlers::put_downstream_gitops)
                .delete(handlers::delete_downstream_gitops),
        )
        .route(
            "/v1/apps/{slug}/downstreams/{cluster_id}/gitops/error",
            post(handlers::post_gitops_error),
        )
        // Task heartbeats
        .route(
            "/v1/tasks/{task_id}",
            get(handlers::get_task_status).put(handlers::put_task_status),
        );

    let mut router = Router::new().merge(api_routes);

    // When enabled, /metrics must be network-restricted to the scrapers.
    if state.config.server.metrics_enabled {
        router = router.merge(Router::new().route("/metrics", get(metrics_handler)));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
