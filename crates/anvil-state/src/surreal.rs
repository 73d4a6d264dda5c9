//! SurrealDB-backed implementations of the Anvil storage traits
//!
//! Uses the `schema` row types for persistence, converting to/from the
//! `traits` record types at the boundary. One `SurrealStore` implements all
//! four traits so a single connection backs the whole subsystem.

use async_trait::async_trait;
use chrono::Utc;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::migrations;
use crate::schema::*;
use crate::traits::*;

/// SurrealDB-backed store for commits, artifacts, workflows and deployments.
pub struct SurrealStore {
    db: Surreal<Any>,
}

impl SurrealStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `anvil/main`, and runs `init_schema`.
    pub async fn in_memory() -> Result<Self, StorageError> {
        Self::connect("mem://").await
    }

    /// Connect to an explicit endpoint and initialize the schema.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        db.use_ns("anvil")
            .use_db("main")
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!(endpoint = %url, "surreal store connected");
        Ok(Self { db })
    }

    /// Create from the environment.
    ///
    /// Uses `ANVIL_DB_URL` when set, otherwise falls back to embedded
    /// SurrealKV persistence under `data_dir`.
    pub async fn from_env(data_dir: &std::path::Path) -> Result<Self, StorageError> {
        if let Ok(url) = std::env::var("ANVIL_DB_URL") {
            return Self::connect(&url).await;
        }

        let path = data_dir.join("db");
        std::fs::create_dir_all(&path).map_err(|e| {
            StorageError::Connection(format!(
                "failed to create database directory {}: {e}",
                path.display()
            ))
        })?;
        let url = format!("surrealkv://{}", path.display());
        Self::connect(&url).await
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_commit(&self, repo_id: &str, sha: &str) -> Result<Option<DbCommit>, StorageError> {
        let mut res = self
            .db
            .query("SELECT * FROM commits WHERE repo_id = $repo AND sha = $sha")
            .bind(("repo", repo_id.to_string()))
            .bind(("sha", sha.to_string()))
            .await?;
        let rows: Vec<DbCommit> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Refresh the verification fields of an existing commit row.
    async fn refresh_commit(&self, commit: &NewCommit) -> Result<DbCommit, StorageError> {
        let mut res = self
            .db
            .query(
                "UPDATE commits SET \
                     verification_hash = $hash, \
                     signer_fingerprint = $fp, \
                     signature_status = $status \
                 WHERE repo_id = $repo AND sha = $sha RETURN AFTER",
            )
            .bind(("hash", commit.verification_hash.as_str().to_string()))
            .bind(("fp", commit.signer_fingerprint.clone()))
            .bind((
                "status",
                signature_status_str(commit.signature_status).to_string(),
            ))
            .bind(("repo", commit.repo_id.clone()))
            .bind(("sha", commit.sha.clone()))
            .await?;
        let rows: Vec<DbCommit> = res.take(0)?;
        rows.into_iter().next().ok_or_else(|| StorageError::NotFound {
            entity: "commit",
            id: format!("{}/{}", commit.repo_id, commit.sha),
        })
    }

    fn commit_row(commit: &NewCommit) -> DbCommit {
        DbCommit {
            id: None,
            repo_id: commit.repo_id.clone(),
            sha: commit.sha.clone(),
            tree_sha: commit.tree_sha.clone(),
            parent_shas: commit.parent_shas.clone(),
            author_name: commit.author_name.clone(),
            author_email: commit.author_email.clone(),
            authored_at: commit.authored_at,
            committer_name: commit.committer_name.clone(),
            committer_email: commit.committer_email.clone(),
            committed_at: commit.committed_at,
            verification_hash: commit.verification_hash.as_str().to_string(),
            author_user_id: commit.author_user_id.clone(),
            signer_fingerprint: commit.signer_fingerprint.clone(),
            signature_status: signature_status_str(commit.signature_status).to_string(),
            message: commit.message.clone(),
            created_at: Utc::now(),
        }
    }

    fn commit_record(row: DbCommit) -> Result<CommitRecord, StorageError> {
        Ok(CommitRecord {
            repo_id: row.repo_id,
            sha: row.sha,
            tree_sha: row.tree_sha,
            parent_shas: row.parent_shas,
            author_name: row.author_name,
            author_email: row.author_email,
            authored_at: row.authored_at,
            committer_name: row.committer_name,
            committer_email: row.committer_email,
            committed_at: row.committed_at,
            verification_hash: HexDigest::try_from(row.verification_hash)?,
            author_user_id: row.author_user_id,
            signer_fingerprint: row.signer_fingerprint,
            signature_status: parse_signature_status(&row.signature_status)?,
            message: row.message,
            created_at: row.created_at,
        })
    }

    fn artifact_record(row: DbArtifact) -> Result<ArtifactRecord, StorageError> {
        let kind = match row.kind.as_str() {
            "LOG" => ArtifactKind::Log,
            "ARCHIVE" => ArtifactKind::Archive,
            "REPORT" => ArtifactKind::Report,
            "OTHER" => ArtifactKind::Other,
            other => {
                return Err(StorageError::Serialization(format!(
                    "unknown artifact kind: {other}"
                )))
            }
        };
        Ok(ArtifactRecord {
            artifact_id: row.artifact_id,
            repo_id: row.repo_id,
            commit_sha: row.commit_sha,
            name: row.name,
            kind,
            content_hash: HexDigest::try_from(row.content_hash)?,
            size_bytes: row.size_bytes,
            created_at: row.created_at,
        })
    }

    fn artifact_kind_str(kind: ArtifactKind) -> &'static str {
        match kind {
            ArtifactKind::Log => "LOG",
            ArtifactKind::Archive => "ARCHIVE",
            ArtifactKind::Report => "REPORT",
            ArtifactKind::Other => "OTHER",
        }
    }

    fn run_record(row: DbRun) -> Result<WorkflowRunRecord, StorageError> {
        Ok(WorkflowRunRecord {
            run_id: row.run_id,
            workflow_id: row.workflow_id,
            repo_id: row.repo_id,
            commit_sha: row.commit_sha,
            branch: row.branch,
            trigger_event: row.trigger_event,
            status: parse_run_status(&row.status)?,
            conclusion: row
                .conclusion
                .as_deref()
                .map(parse_run_conclusion)
                .transpose()?,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }

    fn job_record(row: DbJob) -> Result<WorkflowJobRecord, StorageError> {
        Ok(WorkflowJobRecord {
            job_id: row.job_id,
            run_id: row.run_id,
            name: row.name,
            environment_id: row.environment_id,
            status: parse_job_status(&row.status)?,
            conclusion: row
                .conclusion
                .as_deref()
                .map(parse_job_conclusion)
                .transpose()?,
            external_id: row.external_id,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }

    fn deployment_record(row: DbDeployment) -> Result<DeploymentRecord, StorageError> {
        Ok(DeploymentRecord {
            deployment_id: row.deployment_id,
            run_id: row.run_id,
            environment_id: row.environment_id,
            status: parse_deployment_status(&row.status)?,
            created_at: row.created_at,
            decided_at: row.decided_at,
        })
    }

    async fn fetch_job(&self, job_id: &str) -> Result<DbJob, StorageError> {
        let mut res = self
            .db
            .query("SELECT * FROM workflow_jobs WHERE job_id = $id")
            .bind(("id", job_id.to_string()))
            .await?;
        let rows: Vec<DbJob> = res.take(0)?;
        rows.into_iter().next().ok_or_else(|| StorageError::NotFound {
            entity: "workflow job",
            id: job_id.to_string(),
        })
    }

    async fn fetch_run(&self, run_id: &str) -> Result<DbRun, StorageError> {
        let mut res = self
            .db
            .query("SELECT * FROM workflow_runs WHERE run_id = $id")
            .bind(("id", run_id.to_string()))
            .await?;
        let rows: Vec<DbRun> = res.take(0)?;
        rows.into_iter().next().ok_or_else(|| StorageError::NotFound {
            entity: "workflow run",
            id: run_id.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// CommitStore
// ---------------------------------------------------------------------------

#[async_trait]
impl CommitStore for SurrealStore {
    async fn upsert_commit(&self, commit: NewCommit) -> StorageResult<CommitRecord> {
        if self.fetch_commit(&commit.repo_id, &commit.sha).await?.is_some() {
            let row = self.refresh_commit(&commit).await?;
            return Self::commit_record(row);
        }

        debug!(repo = %commit.repo_id, sha = %commit.sha, "creating commit row");

        let row = Self::commit_row(&commit);
        let created: Result<Option<DbCommit>, surrealdb::Error> =
            self.db.create("commits").content(row).await;

        match created {
            Ok(Some(row)) => Self::commit_record(row),
            Ok(None) => Err(StorageError::Backend(
                "commit create returned no row".to_string(),
            )),
            // A racing ingestion won the CREATE; the UNIQUE index on
            // (repo_id, sha) rejected ours. Degrade to the refresh path.
            Err(_) => {
                let row = self.refresh_commit(&commit).await?;
                Self::commit_record(row)
            }
        }
    }

    async fn get_commit(&self, repo_id: &str, sha: &str) -> StorageResult<CommitRecord> {
        match self.fetch_commit(repo_id, sha).await? {
            Some(row) => Self::commit_record(row),
            None => Err(StorageError::NotFound {
                entity: "commit",
                id: format!("{repo_id}/{sha}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ArtifactIndex
// ---------------------------------------------------------------------------

#[async_trait]
impl ArtifactIndex for SurrealStore {
    async fn insert_artifact(&self, artifact: ArtifactRecord) -> StorageResult<()> {
        let row = DbArtifact {
            id: None,
            artifact_id: artifact.artifact_id,
            repo_id: artifact.repo_id,
            commit_sha: artifact.commit_sha,
            name: artifact.name,
            kind: Self::artifact_kind_str(artifact.kind).to_string(),
            content_hash: artifact.content_hash.as_str().to_string(),
            size_bytes: artifact.size_bytes,
            created_at: artifact.created_at,
        };
        let _created: Option<DbArtifact> = self.db.create("artifacts").content(row).await?;
        Ok(())
    }

    async fn get_artifact(&self, artifact_id: &str) -> StorageResult<ArtifactRecord> {
        let mut res = self
            .db
            .query("SELECT * FROM artifacts WHERE artifact_id = $id")
            .bind(("id", artifact_id.to_string()))
            .await?;
        let rows: Vec<DbArtifact> = res.take(0)?;
        let row = rows.into_iter().next().ok_or_else(|| StorageError::NotFound {
            entity: "artifact",
            id: artifact_id.to_string(),
        })?;
        Self::artifact_record(row)
    }

    async fn artifacts_for_commit(
        &self,
        repo_id: &str,
        commit_sha: &str,
    ) -> StorageResult<Vec<ArtifactRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM artifacts \
                 WHERE repo_id = $repo AND commit_sha = $sha \
                 ORDER BY created_at DESC",
            )
            .bind(("repo", repo_id.to_string()))
            .bind(("sha", commit_sha.to_string()))
            .await?;
        let rows: Vec<DbArtifact> = res.take(0)?;
        rows.into_iter().map(Self::artifact_record).collect()
    }
}

// ---------------------------------------------------------------------------
// WorkflowStore
// ---------------------------------------------------------------------------

#[async_trait]
impl WorkflowStore for SurrealStore {
    async fn insert_run(&self, run: WorkflowRunRecord) -> StorageResult<()> {
        let row = DbRun {
            id: None,
            run_id: run.run_id,
            workflow_id: run.workflow_id,
            repo_id: run.repo_id,
            commit_sha: run.commit_sha,
            branch: run.branch,
            trigger_event: run.trigger_event,
            status: run_status_str(run.status).to_string(),
            conclusion: run.conclusion.map(|c| run_conclusion_str(c).to_string()),
            created_at: run.created_at,
            completed_at: run.completed_at,
        };
        let _created: Option<DbRun> = self.db.create("workflow_runs").content(row).await?;
        Ok(())
    }

    async fn insert_job(&self, job: WorkflowJobRecord) -> StorageResult<()> {
        let row = DbJob {
            id: None,
            job_id: job.job_id,
            run_id: job.run_id,
            name: job.name,
            environment_id: job.environment_id,
            status: job_status_str(job.status).to_string(),
            conclusion: job.conclusion.map(|c| job_conclusion_str(c).to_string()),
            external_id: job.external_id,
            started_at: job.started_at,
            completed_at: job.completed_at,
        };
        let _created: Option<DbJob> = self.db.create("workflow_jobs").content(row).await?;
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> StorageResult<WorkflowRunRecord> {
        let row = self.fetch_run(run_id).await?;
        Self::run_record(row)
    }

    async fn get_job(&self, job_id: &str) -> StorageResult<WorkflowJobRecord> {
        let row = self.fetch_job(job_id).await?;
        Self::job_record(row)
    }

    async fn jobs_for_run(&self, run_id: &str) -> StorageResult<Vec<WorkflowJobRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM workflow_jobs WHERE run_id = $id")
            .bind(("id", run_id.to_string()))
            .await?;
        let rows: Vec<DbJob> = res.take(0)?;
        rows.into_iter().map(Self::job_record).collect()
    }

    async fn gated_jobs(
        &self,
        run_id: &str,
        environment_id: &str,
    ) -> StorageResult<Vec<WorkflowJobRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM workflow_jobs \
                 WHERE run_id = $run AND environment_id = $env \
                   AND status = 'ACTION_REQUIRED'",
            )
            .bind(("run", run_id.to_string()))
            .bind(("env", environment_id.to_string()))
            .await?;
        let rows: Vec<DbJob> = res.take(0)?;
        rows.into_iter().map(Self::job_record).collect()
    }

    async fn queued_jobs(&self) -> StorageResult<Vec<WorkflowJobRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM workflow_jobs WHERE status = 'QUEUED'")
            .await?;
        let rows: Vec<DbJob> = res.take(0)?;
        rows.into_iter().map(Self::job_record).collect()
    }

    async fn set_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        conclusion: Option<JobConclusion>,
    ) -> StorageResult<WorkflowJobRecord> {
        let current = self.fetch_job(job_id).await?;
        if current.status == "COMPLETED" {
            return Err(StorageError::InvalidState {
                entity: "workflow job",
                id: job_id.to_string(),
                status: current.status,
                expected: "non-terminal".to_string(),
            });
        }

        let mut updated = current;
        updated.status = job_status_str(status).to_string();
        updated.conclusion = conclusion.map(|c| job_conclusion_str(c).to_string());
        match status {
            JobStatus::InProgress => updated.started_at = Some(Utc::now()),
            JobStatus::Completed => updated.completed_at = Some(Utc::now()),
            _ => {}
        }

        self.db
            .query("UPDATE workflow_jobs CONTENT $row WHERE job_id = $id")
            .bind(("row", updated.clone()))
            .bind(("id", job_id.to_string()))
            .await?;

        Self::job_record(updated)
    }

    async fn set_job_external_id(&self, job_id: &str, external_id: &str) -> StorageResult<()> {
        self.fetch_job(job_id).await?;
        self.db
            .query("UPDATE workflow_jobs SET external_id = $ext WHERE job_id = $id")
            .bind(("ext", external_id.to_string()))
            .bind(("id", job_id.to_string()))
            .await?;
        Ok(())
    }

    async fn set_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        conclusion: Option<RunConclusion>,
    ) -> StorageResult<WorkflowRunRecord> {
        let current = self.fetch_run(run_id).await?;
        if current.status == "COMPLETED" {
            return Err(StorageError::InvalidState {
                entity: "workflow run",
                id: run_id.to_string(),
                status: current.status,
                expected: "non-terminal".to_string(),
            });
        }

        let mut updated = current;
        updated.status = run_status_str(status).to_string();
        updated.conclusion = conclusion.map(|c| run_conclusion_str(c).to_string());
        if status == RunStatus::Completed {
            updated.completed_at = Some(Utc::now());
        }

        self.db
            .query("UPDATE workflow_runs CONTENT $row WHERE run_id = $id")
            .bind(("row", updated.clone()))
            .bind(("id", run_id.to_string()))
            .await?;

        Self::run_record(updated)
    }
}

// ---------------------------------------------------------------------------
// DeploymentStore
// ---------------------------------------------------------------------------

#[async_trait]
impl DeploymentStore for SurrealStore {
    async fn insert_environment(&self, environment: EnvironmentRecord) -> StorageResult<()> {
        let row = DbEnvironment {
            id: None,
            environment_id: environment.environment_id,
            repo_id: environment.repo_id,
            name: environment.name,
            reviewers: environment.reviewers,
        };
        let _created: Option<DbEnvironment> = self.db.create("environments").content(row).await?;
        Ok(())
    }

    async fn get_environment(&self, environment_id: &str) -> StorageResult<EnvironmentRecord> {
        let mut res = self
            .db
            .query("SELECT * FROM environments WHERE environment_id = $id")
            .bind(("id", environment_id.to_string()))
            .await?;
        let rows: Vec<DbEnvironment> = res.take(0)?;
        let row = rows.into_iter().next().ok_or_else(|| StorageError::NotFound {
            entity: "environment",
            id: environment_id.to_string(),
        })?;
        Ok(EnvironmentRecord {
            environment_id: row.environment_id,
            repo_id: row.repo_id,
            name: row.name,
            reviewers: row.reviewers,
        })
    }

    async fn environments_for_repo(
        &self,
        repo_id: &str,
    ) -> StorageResult<Vec<EnvironmentRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM environments WHERE repo_id = $repo ORDER BY name ASC")
            .bind(("repo", repo_id.to_string()))
            .await?;
        let rows: Vec<DbEnvironment> = res.take(0)?;
        Ok(rows
            .into_iter()
            .map(|row| EnvironmentRecord {
                environment_id: row.environment_id,
                repo_id: row.repo_id,
                name: row.name,
                reviewers: row.reviewers,
            })
            .collect())
    }

    async fn insert_deployment(&self, deployment: DeploymentRecord) -> StorageResult<()> {
        let row = DbDeployment {
            id: None,
            deployment_id: deployment.deployment_id,
            run_id: deployment.run_id,
            environment_id: deployment.environment_id,
            status: deployment_status_str(deployment.status).to_string(),
            created_at: deployment.created_at,
            decided_at: deployment.decided_at,
        };
        let _created: Option<DbDeployment> = self.db.create("deployments").content(row).await?;
        Ok(())
    }

    async fn get_deployment(&self, deployment_id: &str) -> StorageResult<DeploymentRecord> {
        let mut res = self
            .db
            .query("SELECT * FROM deployments WHERE deployment_id = $id")
            .bind(("id", deployment_id.to_string()))
            .await?;
        let rows: Vec<DbDeployment> = res.take(0)?;
        let row = rows.into_iter().next().ok_or_else(|| StorageError::NotFound {
            entity: "deployment",
            id: deployment_id.to_string(),
        })?;
        Self::deployment_record(row)
    }

    async fn decide_deployment(
        &self,
        deployment_id: &str,
        status: DeploymentStatus,
    ) -> StorageResult<DeploymentRecord> {
        // Compare-and-set: only a WAITING row is updated, so exactly one of
        // two racing deciders gets a row back.
        let mut res = self
            .db
            .query(
                "UPDATE deployments SET status = $st, decided_at = time::now() \
                 WHERE deployment_id = $id AND status = 'WAITING' RETURN AFTER",
            )
            .bind(("st", deployment_status_str(status).to_string()))
            .bind(("id", deployment_id.to_string()))
            .await?;
        let rows: Vec<DbDeployment> = res.take(0)?;

        match rows.into_iter().next() {
            Some(row) => Self::deployment_record(row),
            None => {
                // Either the deployment is unknown or it was already decided.
                self.get_deployment(deployment_id).await?;
                Err(StorageError::Conflict {
                    entity: "deployment",
                    id: deployment_id.to_string(),
                })
            }
        }
    }

    async fn record_approval(&self, approval: ApprovalRecord) -> StorageResult<()> {
        let row = DbApproval {
            id: None,
            deployment_id: approval.deployment_id,
            reviewer: approval.reviewer,
            decision: review_decision_str(approval.decision).to_string(),
            comment: approval.comment,
            created_at: approval.created_at,
        };
        let _created: Option<DbApproval> = self.db.create("approvals").content(row).await?;
        Ok(())
    }

    async fn approvals_for_deployment(
        &self,
        deployment_id: &str,
    ) -> StorageResult<Vec<ApprovalRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM approvals WHERE deployment_id = $id ORDER BY created_at ASC",
            )
            .bind(("id", deployment_id.to_string()))
            .await?;
        let rows: Vec<DbApproval> = res.take(0)?;
        rows.into_iter()
            .map(|row| {
                Ok(ApprovalRecord {
                    deployment_id: row.deployment_id,
                    reviewer: row.reviewer,
                    decision: parse_review_decision(&row.decision)?,
                    comment: row.comment,
                    created_at: row.created_at,
                })
            })
            .collect()
    }

    async fn recent_deployments(
        &self,
        environment_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<DeploymentRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM deployments WHERE environment_id = $id \
                 ORDER BY created_at DESC LIMIT $limit",
            )
            .bind(("id", environment_id.to_string()))
            .bind(("limit", limit as i64))
            .await?;
        let rows: Vec<DbDeployment> = res.take(0)?;
        rows.into_iter().map(Self::deployment_record).collect()
    }
}
