//! Deployment approval endpoint.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use anvil_state::ReviewDecision;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub status: ReviewDecision,
    pub comment: Option<String>,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub message: String,
}

/// `POST /deployments/{id}/approve`
///
/// 404 unknown deployment, 403 non-reviewer, 409 already decided.
pub async fn approve_deployment(
    State(state): State<AppState>,
    Path(deployment_id): Path<String>,
    Json(request): Json<ApproveRequest>,
) -> ApiResult<Json<ApproveResponse>> {
    let outcome = state
        .gate
        .submit(
            &deployment_id,
            &request.user_id,
            request.status,
            request.comment,
        )
        .await?;

    let verb = match request.status {
        ReviewDecision::Approved => "approved",
        ReviewDecision::Rejected => "rejected",
    };
    Ok(Json(ApproveResponse {
        message: format!(
            "deployment {} {verb}; {} job(s) transitioned",
            outcome.deployment.deployment_id,
            outcome.transitioned_jobs.len()
        ),
    }))
}
