//! Row definitions for the Anvil SurrealDB tables
//!
//! Tables:
//! - commits: ingested commits (UNIQUE on (repo_id, sha))
//! - artifacts: immutable artifact-to-commit bindings
//! - workflow_runs / workflow_jobs: orchestration state
//! - environments / deployments / approvals: gating state
//!
//! Statuses are stored as their UPPERCASE wire strings; conversion to the
//! typed enums happens at the `surreal` module boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::traits::{
    DeploymentStatus, JobConclusion, JobStatus, ReviewDecision, RunConclusion, RunStatus,
    SignatureStatus,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
pub(crate) mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
pub(crate) mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

// ---------------------------------------------------------------------------
// Status string helpers
// ---------------------------------------------------------------------------

fn unknown(entity: &'static str, value: &str) -> StorageError {
    StorageError::Serialization(format!("unknown {entity} value: {value}"))
}

pub(crate) fn signature_status_str(s: SignatureStatus) -> &'static str {
    match s {
        SignatureStatus::Unsigned => "UNSIGNED",
        SignatureStatus::Verified => "VERIFIED",
        SignatureStatus::Invalid => "INVALID",
    }
}

pub(crate) fn parse_signature_status(s: &str) -> Result<SignatureStatus, StorageError> {
    match s {
        "UNSIGNED" => Ok(SignatureStatus::Unsigned),
        "VERIFIED" => Ok(SignatureStatus::Verified),
        "INVALID" => Ok(SignatureStatus::Invalid),
        other => Err(unknown("signature status", other)),
    }
}

pub(crate) fn run_status_str(s: RunStatus) -> &'static str {
    match s {
        RunStatus::Queued => "QUEUED",
        RunStatus::InProgress => "IN_PROGRESS",
        RunStatus::Completed => "COMPLETED",
    }
}

pub(crate) fn parse_run_status(s: &str) -> Result<RunStatus, StorageError> {
    match s {
        "QUEUED" => Ok(RunStatus::Queued),
        "IN_PROGRESS" => Ok(RunStatus::InProgress),
        "COMPLETED" => Ok(RunStatus::Completed),
        other => Err(unknown("run status", other)),
    }
}

pub(crate) fn run_conclusion_str(c: RunConclusion) -> &'static str {
    match c {
        RunConclusion::Success => "SUCCESS",
        RunConclusion::Failure => "FAILURE",
        RunConclusion::Cancelled => "CANCELLED",
    }
}

pub(crate) fn parse_run_conclusion(s: &str) -> Result<RunConclusion, StorageError> {
    match s {
        "SUCCESS" => Ok(RunConclusion::Success),
        "FAILURE" => Ok(RunConclusion::Failure),
        "CANCELLED" => Ok(RunConclusion::Cancelled),
        other => Err(unknown("run conclusion", other)),
    }
}

pub(crate) fn job_status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Queued => "QUEUED",
        JobStatus::ActionRequired => "ACTION_REQUIRED",
        JobStatus::InProgress => "IN_PROGRESS",
        JobStatus::Completed => "COMPLETED",
    }
}

pub(crate) fn parse_job_status(s: &str) -> Result<JobStatus, StorageError> {
    match s {
        "QUEUED" => Ok(JobStatus::Queued),
        "ACTION_REQUIRED" => Ok(JobStatus::ActionRequired),
        "IN_PROGRESS" => Ok(JobStatus::InProgress),
        "COMPLETED" => Ok(JobStatus::Completed),
        other => Err(unknown("job status", other)),
    }
}

pub(crate) fn job_conclusion_str(c: JobConclusion) -> &'static str {
    match c {
        JobConclusion::Success => "SUCCESS",
        JobConclusion::Failure => "FAILURE",
        JobConclusion::Skipped => "SKIPPED",
        JobConclusion::Cancelled => "CANCELLED",
    }
}

pub(crate) fn parse_job_conclusion(s: &str) -> Result<JobConclusion, StorageError> {
    match s {
        "SUCCESS" => Ok(JobConclusion::Success),
        "FAILURE" => Ok(JobConclusion::Failure),
        "SKIPPED" => Ok(JobConclusion::Skipped),
        "CANCELLED" => Ok(JobConclusion::Cancelled),
        other => Err(unknown("job conclusion", other)),
    }
}

pub(crate) fn deployment_status_str(s: DeploymentStatus) -> &'static str {
    match s {
        DeploymentStatus::Waiting => "WAITING",
        DeploymentStatus::Approved => "APPROVED",
        DeploymentStatus::Rejected => "REJECTED",
    }
}

pub(crate) fn parse_deployment_status(s: &str) -> Result<DeploymentStatus, StorageError> {
    match s {
        "WAITING" => Ok(DeploymentStatus::Waiting),
        "APPROVED" => Ok(DeploymentStatus::Approved),
        "REJECTED" => Ok(DeploymentStatus::Rejected),
        other => Err(unknown("deployment status", other)),
    }
}

pub(crate) fn review_decision_str(d: ReviewDecision) -> &'static str {
    match d {
        ReviewDecision::Approved => "APPROVED",
        ReviewDecision::Rejected => "REJECTED",
    }
}

pub(crate) fn parse_review_decision(s: &str) -> Result<ReviewDecision, StorageError> {
    match s {
        "APPROVED" => Ok(ReviewDecision::Approved),
        "REJECTED" => Ok(ReviewDecision::Rejected),
        other => Err(unknown("review decision", other)),
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Commit row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbCommit {
    pub id: Option<surrealdb::sql::Thing>,
    pub repo_id: String,
    pub sha: String,
    pub tree_sha: String,
    pub parent_shas: Vec<String>,
    pub author_name: String,
    pub author_email: String,
    #[serde(with = "surreal_datetime")]
    pub authored_at: DateTime<Utc>,
    pub committer_name: String,
    pub committer_email: String,
    #[serde(with = "surreal_datetime")]
    pub committed_at: DateTime<Utc>,
    pub verification_hash: String,
    pub author_user_id: Option<String>,
    pub signer_fingerprint: Option<String>,
    pub signature_status: String,
    pub message: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

/// Artifact row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbArtifact {
    pub id: Option<surrealdb::sql::Thing>,
    pub artifact_id: String,
    pub repo_id: String,
    pub commit_sha: String,
    pub name: String,
    pub kind: String,
    pub content_hash: String,
    pub size_bytes: u64,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

/// Workflow run row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbRun {
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: String,
    pub workflow_id: String,
    pub repo_id: String,
    pub commit_sha: String,
    pub branch: String,
    pub trigger_event: String,
    pub status: String,
    pub conclusion: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime_opt", default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Workflow job row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbJob {
    pub id: Option<surrealdb::sql::Thing>,
    pub job_id: String,
    pub run_id: String,
    pub name: String,
    pub environment_id: Option<String>,
    pub status: String,
    pub conclusion: Option<String>,
    pub external_id: Option<String>,
    #[serde(with = "surreal_datetime_opt", default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(with = "surreal_datetime_opt", default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Environment row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbEnvironment {
    pub id: Option<surrealdb::sql::Thing>,
    pub environment_id: String,
    pub repo_id: String,
    pub name: String,
    pub reviewers: Vec<String>,
}

/// Deployment row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbDeployment {
    pub id: Option<surrealdb::sql::Thing>,
    pub deployment_id: String,
    pub run_id: String,
    pub environment_id: String,
    pub status: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime_opt", default)]
    pub decided_at: Option<DateTime<Utc>>,
}

/// Approval row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbApproval {
    pub id: Option<surrealdb::sql::Thing>,
    pub deployment_id: String,
    pub reviewer: String,
    pub decision: String,
    pub comment: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}
