//! Route table.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod artifacts;
pub mod deployments;
pub mod environments;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/repos/{repo_id}/commits/{sha}/artifacts",
            post(artifacts::upload_artifact),
        )
        .route(
            "/deployments/{id}/approve",
            post(deployments::approve_deployment),
        )
        .route(
            "/repositories/{repo_id}/environments",
            get(environments::list_environments),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
