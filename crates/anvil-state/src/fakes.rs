//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryCommitStore`, `MemoryArtifactIndex`, `MemoryWorkflowStore`
//! and `MemoryDeploymentStore` that satisfy the trait contracts without any
//! external dependencies.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::traits::*;

// ---------------------------------------------------------------------------
// MemoryCommitStore
// ---------------------------------------------------------------------------

/// In-memory commit store keyed by `(repo_id, sha)`.
#[derive(Debug, Default)]
pub struct MemoryCommitStore {
    commits: Mutex<HashMap<(String, String), CommitRecord>>,
}

impl MemoryCommitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommitStore for MemoryCommitStore {
    async fn upsert_commit(&self, commit: NewCommit) -> StorageResult<CommitRecord> {
        let key = (commit.repo_id.clone(), commit.sha.clone());
        let mut commits = self.commits.lock().unwrap();
        match commits.get_mut(&key) {
            Some(existing) => {
                // Refresh only the verification fields; the git-derived
                // fields keep their first-ingestion values.
                existing.verification_hash = commit.verification_hash;
                existing.signer_fingerprint = commit.signer_fingerprint;
                existing.signature_status = commit.signature_status;
                Ok(existing.clone())
            }
            None => {
                let record = CommitRecord {
                    repo_id: commit.repo_id,
                    sha: commit.sha,
                    tree_sha: commit.tree_sha,
                    parent_shas: commit.parent_shas,
                    author_name: commit.author_name,
                    author_email: commit.author_email,
                    authored_at: commit.authored_at,
                    committer_name: commit.committer_name,
                    committer_email: commit.committer_email,
                    committed_at: commit.committed_at,
                    verification_hash: commit.verification_hash,
                    author_user_id: commit.author_user_id,
                    signer_fingerprint: commit.signer_fingerprint,
                    signature_status: commit.signature_status,
                    message: commit.message,
                    created_at: Utc::now(),
                };
                commits.insert(key, record.clone());
                Ok(record)
            }
        }
    }

    async fn get_commit(&self, repo_id: &str, sha: &str) -> StorageResult<CommitRecord> {
        let commits = self.commits.lock().unwrap();
        commits
            .get(&(repo_id.to_string(), sha.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                entity: "commit",
                id: format!("{repo_id}/{sha}"),
            })
    }
}

// ---------------------------------------------------------------------------
// MemoryArtifactIndex
// ---------------------------------------------------------------------------

/// In-memory artifact index keyed by artifact id.
#[derive(Debug, Default)]
pub struct MemoryArtifactIndex {
    artifacts: Mutex<HashMap<String, ArtifactRecord>>,
}

impl MemoryArtifactIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactIndex for MemoryArtifactIndex {
    async fn insert_artifact(&self, artifact: ArtifactRecord) -> StorageResult<()> {
        let mut artifacts = self.artifacts.lock().unwrap();
        artifacts.insert(artifact.artifact_id.clone(), artifact);
        Ok(())
    }

    async fn get_artifact(&self, artifact_id: &str) -> StorageResult<ArtifactRecord> {
        let artifacts = self.artifacts.lock().unwrap();
        artifacts
            .get(artifact_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                entity: "artifact",
                id: artifact_id.to_string(),
            })
    }

    async fn artifacts_for_commit(
        &self,
        repo_id: &str,
        commit_sha: &str,
    ) -> StorageResult<Vec<ArtifactRecord>> {
        let artifacts = self.artifacts.lock().unwrap();
        let mut rows: Vec<ArtifactRecord> = artifacts
            .values()
            .filter(|a| a.repo_id == repo_id && a.commit_sha == commit_sha)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// MemoryWorkflowStore
// ---------------------------------------------------------------------------

/// In-memory workflow store backed by two maps (runs, jobs).
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    runs: Mutex<HashMap<String, WorkflowRunRecord>>,
    jobs: Mutex<HashMap<String, WorkflowJobRecord>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn insert_run(&self, run: WorkflowRunRecord) -> StorageResult<()> {
        let mut runs = self.runs.lock().unwrap();
        runs.insert(run.run_id.clone(), run);
        Ok(())
    }

    async fn insert_job(&self, job: WorkflowJobRecord) -> StorageResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> StorageResult<WorkflowRunRecord> {
        let runs = self.runs.lock().unwrap();
        runs.get(run_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                entity: "workflow run",
                id: run_id.to_string(),
            })
    }

    async fn get_job(&self, job_id: &str) -> StorageResult<WorkflowJobRecord> {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(job_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                entity: "workflow job",
                id: job_id.to_string(),
            })
    }

    async fn jobs_for_run(&self, run_id: &str) -> StorageResult<Vec<WorkflowJobRecord>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .values()
            .filter(|j| j.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn gated_jobs(
        &self,
        run_id: &str,
        environment_id: &str,
    ) -> StorageResult<Vec<WorkflowJobRecord>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .values()
            .filter(|j| {
                j.run_id == run_id
                    && j.status == JobStatus::ActionRequired
                    && j.environment_id.as_deref() == Some(environment_id)
            })
            .cloned()
            .collect())
    }

    async fn queued_jobs(&self) -> StorageResult<Vec<WorkflowJobRecord>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .cloned()
            .collect())
    }

    async fn set_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        conclusion: Option<JobConclusion>,
    ) -> StorageResult<WorkflowJobRecord> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(job_id).ok_or_else(|| StorageError::NotFound {
            entity: "workflow job",
            id: job_id.to_string(),
        })?;
        if job.status.is_terminal() {
            return Err(StorageError::InvalidState {
                entity: "workflow job",
                id: job_id.to_string(),
                status: format!("{:?}", job.status),
                expected: "non-terminal".to_string(),
            });
        }
        job.status = status;
        job.conclusion = conclusion;
        match status {
            JobStatus::InProgress => job.started_at = Some(Utc::now()),
            JobStatus::Completed => job.completed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(job.clone())
    }

    async fn set_job_external_id(&self, job_id: &str, external_id: &str) -> StorageResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(job_id).ok_or_else(|| StorageError::NotFound {
            entity: "workflow job",
            id: job_id.to_string(),
        })?;
        job.external_id = Some(external_id.to_string());
        Ok(())
    }

    async fn set_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        conclusion: Option<RunConclusion>,
    ) -> StorageResult<WorkflowRunRecord> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.get_mut(run_id).ok_or_else(|| StorageError::NotFound {
            entity: "workflow run",
            id: run_id.to_string(),
        })?;
        if run.status == RunStatus::Completed {
            return Err(StorageError::InvalidState {
                entity: "workflow run",
                id: run_id.to_string(),
                status: format!("{:?}", run.status),
                expected: "non-terminal".to_string(),
            });
        }
        run.status = status;
        run.conclusion = conclusion;
        if status == RunStatus::Completed {
            run.completed_at = Some(Utc::now());
        }
        Ok(run.clone())
    }
}

// ---------------------------------------------------------------------------
// MemoryDeploymentStore
// ---------------------------------------------------------------------------

/// In-memory deployment store.
#[derive(Debug, Default)]
pub struct MemoryDeploymentStore {
    environments: Mutex<HashMap<String, EnvironmentRecord>>,
    deployments: Mutex<HashMap<String, DeploymentRecord>>,
    approvals: Mutex<Vec<ApprovalRecord>>,
}

impl MemoryDeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentStore for MemoryDeploymentStore {
    async fn insert_environment(&self, environment: EnvironmentRecord) -> StorageResult<()> {
        let mut environments = self.environments.lock().unwrap();
        environments.insert(environment.environment_id.clone(), environment);
        Ok(())
    }

    async fn get_environment(&self, environment_id: &str) -> StorageResult<EnvironmentRecord> {
        let environments = self.environments.lock().unwrap();
        environments
            .get(environment_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                entity: "environment",
                id: environment_id.to_string(),
            })
    }

    async fn environments_for_repo(
        &self,
        repo_id: &str,
    ) -> StorageResult<Vec<EnvironmentRecord>> {
        let environments = self.environments.lock().unwrap();
        let mut rows: Vec<EnvironmentRecord> = environments
            .values()
            .filter(|e| e.repo_id == repo_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn insert_deployment(&self, deployment: DeploymentRecord) -> StorageResult<()> {
        let mut deployments = self.deployments.lock().unwrap();
        deployments.insert(deployment.deployment_id.clone(), deployment);
        Ok(())
    }

    async fn get_deployment(&self, deployment_id: &str) -> StorageResult<DeploymentRecord> {
        let deployments = self.deployments.lock().unwrap();
        deployments
            .get(deployment_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                entity: "deployment",
                id: deployment_id.to_string(),
            })
    }

    async fn decide_deployment(
        &self,
        deployment_id: &str,
        status: DeploymentStatus,
    ) -> StorageResult<DeploymentRecord> {
        let mut deployments = self.deployments.lock().unwrap();
        let deployment =
            deployments
                .get_mut(deployment_id)
                .ok_or_else(|| StorageError::NotFound {
                    entity: "deployment",
                    id: deployment_id.to_string(),
                })?;
        // Compare-and-set under the map lock: the second racer sees a
        // terminal status and loses.
        if deployment.status.is_terminal() {
            return Err(StorageError::Conflict {
                entity: "deployment",
                id: deployment_id.to_string(),
            });
        }
        deployment.status = status;
        deployment.decided_at = Some(Utc::now());
        Ok(deployment.clone())
    }

    async fn record_approval(&self, approval: ApprovalRecord) -> StorageResult<()> {
        let mut approvals = self.approvals.lock().unwrap();
        approvals.push(approval);
        Ok(())
    }

    async fn approvals_for_deployment(
        &self,
        deployment_id: &str,
    ) -> StorageResult<Vec<ApprovalRecord>> {
        let approvals = self.approvals.lock().unwrap();
        Ok(approvals
            .iter()
            .filter(|a| a.deployment_id == deployment_id)
            .cloned()
            .collect())
    }

    async fn recent_deployments(
        &self,
        environment_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<DeploymentRecord>> {
        let deployments = self.deployments.lock().unwrap();
        let mut rows: Vec<DeploymentRecord> = deployments
            .values()
            .filter(|d| d.environment_id == environment_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }
}
