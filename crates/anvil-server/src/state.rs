//! Shared handler state.

use std::sync::Arc;

use anvil_ci::ApprovalGate;
use anvil_core::ArtifactStore;
use anvil_state::{CommitStore, DeploymentStore};

#[derive(Clone)]
pub struct AppState {
    pub commits: Arc<dyn CommitStore>,
    pub deployments: Arc<dyn DeploymentStore>,
    pub artifacts: Arc<ArtifactStore>,
    pub gate: Arc<ApprovalGate>,
}
