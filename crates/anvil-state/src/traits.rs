//! Storage trait definitions for Anvil
//!
//! These traits define the core storage abstractions:
//! - `CommitStore`: ingested commit rows (idempotent upsert)
//! - `ArtifactIndex`: immutable artifact-to-commit bindings
//! - `WorkflowStore`: workflow run/job lifecycle rows
//! - `DeploymentStore`: environments, gated deployments, reviewer decisions
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// HexDigest — SHA-256 digests as validated lowercase hex
// ---------------------------------------------------------------------------

/// A SHA-256 digest rendered as 64 lowercase hex characters.
///
/// The inner string is private so every value is either produced by
/// `from_bytes` or validated through `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HexDigest(String);

impl HexDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        HexDigest(hex::encode(hasher.finalize()))
    }

    /// Wrap an already-finalized SHA-256 from a running hasher.
    pub fn from_hasher(hasher: Sha256) -> Self {
        use sha2::Digest;
        HexDigest(hex::encode(hasher.finalize()))
    }

    /// Full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for HexDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(HexDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for HexDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status enums (wire values are the UPPERCASE strings)
// ---------------------------------------------------------------------------

/// Outcome of signature verification during commit ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignatureStatus {
    Unsigned,
    Verified,
    Invalid,
}

/// Classification of a stored artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArtifactKind {
    Log,
    Archive,
    Report,
    Other,
}

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
}

/// Conclusion of a completed workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunConclusion {
    Success,
    Failure,
    Cancelled,
}

/// Status of a single workflow job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    ActionRequired,
    InProgress,
    Completed,
}

impl JobStatus {
    /// Whether the job can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed)
    }
}

/// Conclusion of a completed workflow job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobConclusion {
    Success,
    Failure,
    Skipped,
    Cancelled,
}

/// Status of a gated deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeploymentStatus {
    Waiting,
    Approved,
    Rejected,
}

impl DeploymentStatus {
    /// Whether the deployment has been decided.
    pub fn is_terminal(self) -> bool {
        matches!(self, DeploymentStatus::Approved | DeploymentStatus::Rejected)
    }
}

/// A reviewer's decision on a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

// ---------------------------------------------------------------------------
// CommitStore — ingested commits
// ---------------------------------------------------------------------------

/// Fields written on first ingestion of a commit.
///
/// The git-derived fields (tree, parents, identities, message) are immutable
/// once the row exists; only the verification fields may be refreshed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCommit {
    pub repo_id: String,
    pub sha: String,
    pub tree_sha: String,
    /// Parent shas in the order recorded in the commit object.
    pub parent_shas: Vec<String>,
    pub author_name: String,
    pub author_email: String,
    pub authored_at: DateTime<Utc>,
    pub committer_name: String,
    pub committer_email: String,
    pub committed_at: DateTime<Utc>,
    pub verification_hash: HexDigest,
    pub author_user_id: Option<String>,
    pub signer_fingerprint: Option<String>,
    pub signature_status: SignatureStatus,
    /// Message truncated by the ingestor before it reaches storage.
    pub message: String,
}

/// A persisted commit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub repo_id: String,
    pub sha: String,
    pub tree_sha: String,
    pub parent_shas: Vec<String>,
    pub author_name: String,
    pub author_email: String,
    pub authored_at: DateTime<Utc>,
    pub committer_name: String,
    pub committer_email: String,
    pub committed_at: DateTime<Utc>,
    pub verification_hash: HexDigest,
    pub author_user_id: Option<String>,
    pub signer_fingerprint: Option<String>,
    pub signature_status: SignatureStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Commit persistence keyed by `(repo_id, sha)`.
///
/// Guarantees:
/// - `upsert_commit` is atomic: two concurrent ingestions of the same commit
///   produce exactly one row (UNIQUE constraint, conflict-then-update).
/// - On conflict only `verification_hash`, `signer_fingerprint` and
///   `signature_status` are refreshed; git-derived fields keep their
///   first-ingestion values.
/// - Rows are never deleted (append-only audit trail).
#[async_trait]
pub trait CommitStore: Send + Sync {
    /// Insert or refresh a commit row, returning the stored state.
    async fn upsert_commit(&self, commit: NewCommit) -> StorageResult<CommitRecord>;

    /// Look up a commit by natural key. `StorageError::NotFound` if absent.
    async fn get_commit(&self, repo_id: &str, sha: &str) -> StorageResult<CommitRecord>;
}

// ---------------------------------------------------------------------------
// ArtifactIndex — artifact-to-commit bindings
// ---------------------------------------------------------------------------

/// An immutable artifact row binding a content hash to one commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub artifact_id: String,
    pub repo_id: String,
    pub commit_sha: String,
    pub name: String,
    pub kind: ArtifactKind,
    pub content_hash: HexDigest,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Build a row for a freshly completed upload.
    pub fn new(
        repo_id: impl Into<String>,
        commit_sha: impl Into<String>,
        name: impl Into<String>,
        kind: ArtifactKind,
        content_hash: HexDigest,
        size_bytes: u64,
    ) -> Self {
        Self {
            artifact_id: Uuid::new_v4().to_string(),
            repo_id: repo_id.into(),
            commit_sha: commit_sha.into(),
            name: name.into(),
            kind,
            content_hash,
            size_bytes,
            created_at: Utc::now(),
        }
    }
}

/// Artifact metadata persistence.
///
/// Rows are written exactly once per successful upload and never mutated;
/// corrections require a new artifact under a fresh identifier.
#[async_trait]
pub trait ArtifactIndex: Send + Sync {
    /// Persist a completed upload.
    async fn insert_artifact(&self, artifact: ArtifactRecord) -> StorageResult<()>;

    /// Fetch one artifact row. `StorageError::NotFound` if absent.
    async fn get_artifact(&self, artifact_id: &str) -> StorageResult<ArtifactRecord>;

    /// All artifacts bound to a commit, newest first.
    async fn artifacts_for_commit(
        &self,
        repo_id: &str,
        commit_sha: &str,
    ) -> StorageResult<Vec<ArtifactRecord>>;
}

// ---------------------------------------------------------------------------
// WorkflowStore — runs and jobs
// ---------------------------------------------------------------------------

/// One execution of a workflow against a commit/branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunRecord {
    pub run_id: String,
    pub workflow_id: String,
    pub repo_id: String,
    pub commit_sha: String,
    pub branch: String,
    pub trigger_event: String,
    pub status: RunStatus,
    pub conclusion: Option<RunConclusion>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRunRecord {
    /// Create a queued run.
    pub fn new(
        workflow_id: impl Into<String>,
        repo_id: impl Into<String>,
        commit_sha: impl Into<String>,
        branch: impl Into<String>,
        trigger_event: impl Into<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            repo_id: repo_id.into(),
            commit_sha: commit_sha.into(),
            branch: branch.into(),
            trigger_event: trigger_event.into(),
            status: RunStatus::Queued,
            conclusion: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// One unit of execution within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowJobRecord {
    pub job_id: String,
    pub run_id: String,
    pub name: String,
    pub environment_id: Option<String>,
    pub status: JobStatus,
    pub conclusion: Option<JobConclusion>,
    /// Handle returned by the CI backend once the job was triggered.
    pub external_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowJobRecord {
    /// Create a job for a run. A job tied to an environment starts in
    /// `ActionRequired` and needs an approved deployment to become `Queued`;
    /// an ungated job starts `Queued` directly.
    pub fn new(
        run_id: impl Into<String>,
        name: impl Into<String>,
        environment_id: Option<String>,
    ) -> Self {
        let status = if environment_id.is_some() {
            JobStatus::ActionRequired
        } else {
            JobStatus::Queued
        };
        Self {
            job_id: Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            name: name.into(),
            environment_id,
            status,
            conclusion: None,
            external_id: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Workflow run/job persistence.
///
/// Guarantees:
/// - A completed job or run is immutable: status setters fail with
///   `InvalidState` once `Completed` has been reached.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Persist a new run.
    async fn insert_run(&self, run: WorkflowRunRecord) -> StorageResult<()>;

    /// Persist a new job.
    async fn insert_job(&self, job: WorkflowJobRecord) -> StorageResult<()>;

    /// Fetch a run. `StorageError::NotFound` if absent.
    async fn get_run(&self, run_id: &str) -> StorageResult<WorkflowRunRecord>;

    /// Fetch a job. `StorageError::NotFound` if absent.
    async fn get_job(&self, job_id: &str) -> StorageResult<WorkflowJobRecord>;

    /// All jobs belonging to a run.
    async fn jobs_for_run(&self, run_id: &str) -> StorageResult<Vec<WorkflowJobRecord>>;

    /// Jobs a run has gated on the given environment that still await a
    /// decision (`ActionRequired`).
    async fn gated_jobs(
        &self,
        run_id: &str,
        environment_id: &str,
    ) -> StorageResult<Vec<WorkflowJobRecord>>;

    /// All QUEUED jobs across runs. Scan surface for the external runner
    /// picker, which hands each one to the orchestrator.
    async fn queued_jobs(&self) -> StorageResult<Vec<WorkflowJobRecord>>;

    /// Move a job to a new status. `conclusion` must be `Some` exactly when
    /// `status` is `Completed`. Fails with `InvalidState` if the job is
    /// already completed.
    async fn set_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        conclusion: Option<JobConclusion>,
    ) -> StorageResult<WorkflowJobRecord>;

    /// Record the backend handle for a triggered job.
    async fn set_job_external_id(&self, job_id: &str, external_id: &str) -> StorageResult<()>;

    /// Move a run to a new status. Fails with `InvalidState` if the run is
    /// already completed.
    async fn set_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        conclusion: Option<RunConclusion>,
    ) -> StorageResult<WorkflowRunRecord>;
}

// ---------------------------------------------------------------------------
// DeploymentStore — environments, deployments, approvals
// ---------------------------------------------------------------------------

/// A named deployment target with its authorized reviewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    pub environment_id: String,
    pub repo_id: String,
    pub name: String,
    /// User ids allowed to approve or reject deployments to this target.
    pub reviewers: Vec<String>,
}

/// One gated deployment attempt tied to a run + environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployment_id: String,
    pub run_id: String,
    pub environment_id: String,
    pub status: DeploymentStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl DeploymentRecord {
    /// Create a deployment awaiting review.
    pub fn new(run_id: impl Into<String>, environment_id: impl Into<String>) -> Self {
        Self {
            deployment_id: Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            environment_id: environment_id.into(),
            status: DeploymentStatus::Waiting,
            created_at: Utc::now(),
            decided_at: None,
        }
    }
}

/// An individual reviewer's decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub deployment_id: String,
    pub reviewer: String,
    pub decision: ReviewDecision,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Deployment gating persistence.
///
/// Guarantees:
/// - `decide_deployment` is a compare-and-set on `Waiting`: the first caller
///   wins, every later caller gets `StorageError::Conflict` and the stored
///   decision is untouched. Concurrent racers are serialized here, not in
///   application code.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Persist an environment definition.
    async fn insert_environment(&self, environment: EnvironmentRecord) -> StorageResult<()>;

    /// Fetch an environment. `StorageError::NotFound` if absent.
    async fn get_environment(&self, environment_id: &str) -> StorageResult<EnvironmentRecord>;

    /// All environments configured for a repository.
    async fn environments_for_repo(&self, repo_id: &str)
        -> StorageResult<Vec<EnvironmentRecord>>;

    /// Persist a new waiting deployment.
    async fn insert_deployment(&self, deployment: DeploymentRecord) -> StorageResult<()>;

    /// Fetch a deployment. `StorageError::NotFound` if absent.
    async fn get_deployment(&self, deployment_id: &str) -> StorageResult<DeploymentRecord>;

    /// Atomically move a deployment from `Waiting` to a terminal status.
    async fn decide_deployment(
        &self,
        deployment_id: &str,
        status: DeploymentStatus,
    ) -> StorageResult<DeploymentRecord>;

    /// Append a reviewer decision to the deployment's audit trail.
    async fn record_approval(&self, approval: ApprovalRecord) -> StorageResult<()>;

    /// All recorded decisions for a deployment, oldest first.
    async fn approvals_for_deployment(
        &self,
        deployment_id: &str,
    ) -> StorageResult<Vec<ApprovalRecord>>;

    /// Most recent deployments for an environment, newest first.
    async fn recent_deployments(
        &self,
        environment_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<DeploymentRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_digest_from_bytes_is_64_hex() {
        let digest = HexDigest::from_bytes(b"anvil");
        assert_eq!(digest.as_str().len(), 64);
        assert!(digest.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hex_digest_rejects_malformed_strings() {
        assert!(HexDigest::try_from("zz".to_string()).is_err());
        assert!(HexDigest::try_from("a".repeat(63)).is_err());
        assert!(HexDigest::try_from("A".repeat(64)).is_ok());
    }

    #[test]
    fn hex_digest_try_from_lowercases() {
        let digest = HexDigest::try_from("AB".repeat(32)).unwrap();
        assert_eq!(digest.as_str(), "ab".repeat(32));
    }

    #[test]
    fn gated_job_starts_action_required() {
        let job = WorkflowJobRecord::new("run-1", "deploy", Some("env-prod".to_string()));
        assert_eq!(job.status, JobStatus::ActionRequired);
    }

    #[test]
    fn ungated_job_starts_queued() {
        let job = WorkflowJobRecord::new("run-1", "build", None);
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn new_deployment_is_waiting() {
        let dep = DeploymentRecord::new("run-1", "env-prod");
        assert_eq!(dep.status, DeploymentStatus::Waiting);
        assert!(dep.decided_at.is_none());
    }

    #[test]
    fn status_wire_values_are_uppercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::ActionRequired).unwrap(),
            "\"ACTION_REQUIRED\""
        );
        assert_eq!(
            serde_json::to_string(&RunStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        assert_eq!(
            serde_json::to_string(&SignatureStatus::Unsigned).unwrap(),
            "\"UNSIGNED\""
        );
        assert_eq!(
            serde_json::to_string(&DeploymentStatus::Waiting).unwrap(),
            "\"WAITING\""
        );
    }

    #[test]
    fn terminal_checks() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(!JobStatus::ActionRequired.is_terminal());
        assert!(DeploymentStatus::Approved.is_terminal());
        assert!(DeploymentStatus::Rejected.is_terminal());
        assert!(!DeploymentStatus::Waiting.is_terminal());
    }
}
