//! Deployment approval gate.
//!
//! Validates reviewer authorization, records the decision, and reactively
//! unblocks or skips the gated jobs via the orchestrator.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use anvil_core::domain::error::{AnvilError, Result};
use anvil_core::obs;
use anvil_state::{
    ApprovalRecord, DeploymentRecord, DeploymentStatus, DeploymentStore, ReviewDecision,
    WorkflowJobRecord,
};

use crate::orchestrator::WorkflowOrchestrator;

/// Result of a submitted decision: the decided deployment and the jobs it
/// transitioned.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub deployment: DeploymentRecord,
    pub transitioned_jobs: Vec<WorkflowJobRecord>,
}

/// Validates and applies reviewer decisions on gated deployments.
pub struct ApprovalGate {
    deployments: Arc<dyn DeploymentStore>,
    orchestrator: Arc<WorkflowOrchestrator>,
}

impl ApprovalGate {
    pub fn new(
        deployments: Arc<dyn DeploymentStore>,
        orchestrator: Arc<WorkflowOrchestrator>,
    ) -> Self {
        Self {
            deployments,
            orchestrator,
        }
    }

    /// Submit one reviewer decision.
    ///
    /// Order of checks:
    /// 1. the deployment must exist (NotFound),
    /// 2. the user must be in the environment's reviewer set (Forbidden),
    /// 3. the deployment must still be WAITING — enforced by the store's
    ///    compare-and-set, so the second of two racers gets Conflict and
    ///    the recorded decision is untouched.
    ///
    /// A single APPROVED decision unlocks the gated job; REJECTED skips
    /// every ACTION_REQUIRED job for the (run, environment) pair.
    pub async fn submit(
        &self,
        deployment_id: &str,
        user_id: &str,
        decision: ReviewDecision,
        comment: Option<String>,
    ) -> Result<ApprovalOutcome> {
        let deployment = self.deployments.get_deployment(deployment_id).await?;
        let environment = self
            .deployments
            .get_environment(&deployment.environment_id)
            .await?;

        if !environment.reviewers.iter().any(|r| r == user_id) {
            return Err(AnvilError::Forbidden(format!(
                "user {user_id} is not a reviewer for environment {}",
                environment.name
            )));
        }

        let status = match decision {
            ReviewDecision::Approved => DeploymentStatus::Approved,
            ReviewDecision::Rejected => DeploymentStatus::Rejected,
        };
        let deployment = self
            .deployments
            .decide_deployment(deployment_id, status)
            .await?;

        self.deployments
            .record_approval(ApprovalRecord {
                deployment_id: deployment_id.to_string(),
                reviewer: user_id.to_string(),
                decision,
                comment,
                created_at: Utc::now(),
            })
            .await?;

        obs::emit_deployment_decided(deployment_id, status, user_id);

        let transitioned_jobs = match decision {
            ReviewDecision::Approved => {
                self.orchestrator
                    .resume_gated_jobs(&deployment.run_id, &deployment.environment_id)
                    .await?
            }
            ReviewDecision::Rejected => {
                self.orchestrator
                    .skip_gated_jobs(&deployment.run_id, &deployment.environment_id)
                    .await?
            }
        };

        info!(
            deployment_id = %deployment_id,
            decision = ?decision,
            jobs = transitioned_jobs.len(),
            "deployment decision applied"
        );

        Ok(ApprovalOutcome {
            deployment,
            transitioned_jobs,
        })
    }
}
