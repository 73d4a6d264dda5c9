//! Environment listing endpoint.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use anvil_state::{DeploymentRecord, EnvironmentRecord};

use crate::error::ApiResult;
use crate::state::AppState;

/// Deployments shown per environment in the listing.
const RECENT_DEPLOYMENTS: usize = 5;

#[derive(Debug, Serialize)]
pub struct EnvironmentView {
    #[serde(flatten)]
    pub environment: EnvironmentRecord,
    pub recent_deployments: Vec<DeploymentRecord>,
}

#[derive(Debug, Serialize)]
pub struct EnvironmentsResponse {
    pub environments: Vec<EnvironmentView>,
}

/// `GET /repositories/{repo_id}/environments`
///
/// Environments with their reviewers and each one's last five deployments.
pub async fn list_environments(
    State(state): State<AppState>,
    Path(repo_id): Path<String>,
) -> ApiResult<Json<EnvironmentsResponse>> {
    let mut environments = Vec::new();
    for environment in state.deployments.environments_for_repo(&repo_id).await? {
        let recent = state
            .deployments
            .recent_deployments(&environment.environment_id, RECENT_DEPLOYMENTS)
            .await?;
        environments.push(EnvironmentView {
            environment,
            recent_deployments: recent,
        });
    }
    Ok(Json(EnvironmentsResponse { environments }))
}
