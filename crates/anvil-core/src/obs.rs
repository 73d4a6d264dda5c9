//! Structured observability hooks for commit-trust lifecycle events.
//!
//! Emission helpers keep the field names consistent across call sites so
//! log pipelines can index on `event`.

use tracing::info;

use anvil_state::{ArtifactRecord, CommitRecord, DeploymentStatus};

/// Emit event: a commit was ingested (or re-ingested).
pub fn emit_commit_ingested(repo_id: &str, sha: &str, record: &CommitRecord) {
    info!(
        event = "commit.ingested",
        repo = %repo_id,
        sha = %sha,
        status = ?record.signature_status,
        hash = %record.verification_hash.short(),
    );
}

/// Emit event: an artifact finished uploading and was bound to its commit.
pub fn emit_artifact_stored(record: &ArtifactRecord) {
    info!(
        event = "artifact.stored",
        artifact_id = %record.artifact_id,
        commit = %record.commit_sha,
        size_bytes = record.size_bytes,
        hash = %record.content_hash.short(),
    );
}

/// Emit event: a deployment reached a terminal decision.
pub fn emit_deployment_decided(deployment_id: &str, status: DeploymentStatus, reviewer: &str) {
    info!(
        event = "deployment.decided",
        deployment_id = %deployment_id,
        status = ?status,
        reviewer = %reviewer,
    );
}

/// Emit event: a CI backend refused or failed to trigger a job (warning level).
pub fn emit_trigger_failed(job_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "engine.trigger_failed", job_id = %job_id, error = %error);
}
