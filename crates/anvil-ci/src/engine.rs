//! The CI engine contract.
//!
//! The orchestrator depends only on this interface; concrete backends (an
//! external build-automation server, a mock for tests) plug in behind it
//! without touching orchestration logic.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Log bytes from a backend. Possibly live: consumers read until the stream
/// closes and must not assume a bounded size.
pub type LogStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Everything a backend needs to start executing a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub repo_id: String,
    pub commit_sha: String,
    pub branch: String,
    pub workflow_id: String,
    /// Deployment environment, when the job is gated.
    pub environment_id: Option<String>,
}

/// Opaque handle the backend returns for a triggered run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalRunId(pub String);

impl std::fmt::Display for ExternalRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An artifact the backend produced, addressable by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineArtifact {
    pub name: String,
    pub url: String,
}

/// Errors surfaced by engine adapters.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The backend refused or failed to start a run. The orchestrator maps
    /// this to a job-level FAILURE and does not retry; backends own their
    /// own queueing.
    #[error("trigger failed: {0}")]
    Trigger(String),

    /// A backend call other than the trigger failed.
    #[error("backend error: {0}")]
    Backend(String),

    /// The external id does not correspond to a run the backend knows.
    #[error("unknown run: {0}")]
    UnknownRun(String),
}

/// Uniform contract implemented by every CI backend adapter.
#[async_trait]
pub trait CiEngine: Send + Sync {
    /// Trigger execution on the backend. Called at most once per job
    /// transition into IN_PROGRESS.
    async fn create_run(&self, request: &RunRequest) -> Result<ExternalRunId, EngineError>;

    /// Best-effort cancellation; returns whether the backend accepted it.
    async fn cancel_run(&self, external_id: &ExternalRunId) -> Result<bool, EngineError>;

    /// Artifacts the backend produced. Backends without artifact listing
    /// return an empty vec.
    async fn artifacts(&self, external_id: &ExternalRunId)
        -> Result<Vec<EngineArtifact>, EngineError>;

    /// Stream log bytes for one job of a run.
    async fn logs(
        &self,
        external_id: &ExternalRunId,
        job_name: &str,
    ) -> Result<LogStream, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_request_serde_round_trip() {
        let request = RunRequest {
            repo_id: "r1".to_string(),
            commit_sha: "abc123".to_string(),
            branch: "main".to_string(),
            workflow_id: "wf-build".to_string(),
            environment_id: Some("env-prod".to_string()),
        };
        let json = serde_json::to_string(&request).unwrap();
        let back: RunRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(request, back);
    }

    #[test]
    fn trigger_error_display() {
        let err = EngineError::Trigger("connection refused".to_string());
        assert!(err.to_string().contains("trigger failed"));
    }
}
