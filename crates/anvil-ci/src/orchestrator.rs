//! Workflow run/job lifecycle.
//!
//! Per-job state machine:
//!
//! ```text
//! (no environment)        QUEUED -> IN_PROGRESS -> COMPLETED{SUCCESS|FAILURE|CANCELLED}
//! (has environment)  ACTION_REQUIRED -> QUEUED -> IN_PROGRESS -> COMPLETED{...}
//!                                    \-> COMPLETED{conclusion=SKIPPED}   (on rejection)
//! ```
//!
//! The orchestrator never polls: gated transitions happen when the approval
//! gate calls [`WorkflowOrchestrator::resume_gated_jobs`] or
//! [`WorkflowOrchestrator::skip_gated_jobs`], and QUEUED jobs are started by
//! an external runner picker calling [`WorkflowOrchestrator::start_job`].

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use anvil_core::domain::error::{AnvilError, Result};
use anvil_core::obs;
use anvil_state::{
    DeploymentRecord, DeploymentStore, JobConclusion, JobStatus, RunConclusion, RunStatus,
    WorkflowJobRecord, WorkflowRunRecord, WorkflowStore,
};

use crate::engine::{CiEngine, ExternalRunId, RunRequest};

/// One job requested as part of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    /// Gates the job behind a deployment approval when set.
    pub environment_id: Option<String>,
}

/// Everything needed to create a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    pub workflow_id: String,
    pub repo_id: String,
    pub commit_sha: String,
    pub branch: String,
    pub trigger_event: String,
    pub jobs: Vec<JobSpec>,
}

/// A created run with its jobs and the deployments gating them.
#[derive(Debug, Clone)]
pub struct CreatedRun {
    pub run: WorkflowRunRecord,
    pub jobs: Vec<WorkflowJobRecord>,
    pub deployments: Vec<DeploymentRecord>,
}

/// Drives workflow runs through their lifecycle against a pluggable engine.
pub struct WorkflowOrchestrator {
    workflows: Arc<dyn WorkflowStore>,
    deployments: Arc<dyn DeploymentStore>,
    engine: Arc<dyn CiEngine>,
}

impl WorkflowOrchestrator {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        deployments: Arc<dyn DeploymentStore>,
        engine: Arc<dyn CiEngine>,
    ) -> Self {
        Self {
            workflows,
            deployments,
            engine,
        }
    }

    /// Create a run with its jobs. Gated jobs start in ACTION_REQUIRED and a
    /// WAITING deployment is opened per distinct environment.
    pub async fn create_run(&self, spec: RunSpec) -> Result<CreatedRun> {
        if spec.jobs.is_empty() {
            return Err(AnvilError::Validation(
                "a workflow run needs at least one job".to_string(),
            ));
        }

        let run = WorkflowRunRecord::new(
            spec.workflow_id,
            spec.repo_id,
            spec.commit_sha,
            spec.branch,
            spec.trigger_event,
        );
        self.workflows.insert_run(run.clone()).await?;

        let mut jobs = Vec::with_capacity(spec.jobs.len());
        let mut gated_environments = BTreeSet::new();
        for job_spec in spec.jobs {
            if let Some(environment_id) = &job_spec.environment_id {
                gated_environments.insert(environment_id.clone());
            }
            let job =
                WorkflowJobRecord::new(&run.run_id, job_spec.name, job_spec.environment_id);
            self.workflows.insert_job(job.clone()).await?;
            jobs.push(job);
        }

        let mut deployments = Vec::new();
        for environment_id in gated_environments {
            let deployment = DeploymentRecord::new(&run.run_id, environment_id);
            self.deployments.insert_deployment(deployment.clone()).await?;
            deployments.push(deployment);
        }

        info!(
            run_id = %run.run_id,
            jobs = jobs.len(),
            gated = deployments.len(),
            "workflow run created"
        );

        Ok(CreatedRun {
            run,
            jobs,
            deployments,
        })
    }

    /// Start one QUEUED job: flips it to IN_PROGRESS and triggers the
    /// backend exactly once. A trigger failure marks this job
    /// COMPLETED/FAILURE and returns the failed record; it never bubbles up
    /// as an error, so sibling jobs are unaffected.
    pub async fn start_job(&self, job_id: &str) -> Result<WorkflowJobRecord> {
        let job = self.workflows.get_job(job_id).await?;
        if job.status != JobStatus::Queued {
            return Err(AnvilError::Conflict(format!(
                "job {job_id} is not queued"
            )));
        }

        let run = self.workflows.get_run(&job.run_id).await?;
        if run.status == RunStatus::Queued {
            self.workflows
                .set_run_status(&run.run_id, RunStatus::InProgress, None)
                .await?;
        }

        let job = self
            .workflows
            .set_job_status(job_id, JobStatus::InProgress, None)
            .await?;

        let request = RunRequest {
            repo_id: run.repo_id,
            commit_sha: run.commit_sha,
            branch: run.branch,
            workflow_id: run.workflow_id,
            environment_id: job.environment_id.clone(),
        };

        match self.engine.create_run(&request).await {
            Ok(external_id) => {
                self.workflows
                    .set_job_external_id(job_id, &external_id.0)
                    .await?;
                info!(job_id = %job_id, external_id = %external_id, "job triggered");
                self.workflows.get_job(job_id).await.map_err(Into::into)
            }
            Err(err) => {
                obs::emit_trigger_failed(job_id, &err);
                let failed = self
                    .workflows
                    .set_job_status(job_id, JobStatus::Completed, Some(JobConclusion::Failure))
                    .await?;
                self.finalize_run_if_done(&job.run_id).await?;
                Ok(failed)
            }
        }
    }

    /// Record the terminal conclusion of an IN_PROGRESS job and finalize the
    /// run when every job has reached a terminal state.
    pub async fn complete_job(
        &self,
        job_id: &str,
        conclusion: JobConclusion,
    ) -> Result<WorkflowJobRecord> {
        let job = self.workflows.get_job(job_id).await?;
        if job.status != JobStatus::InProgress {
            return Err(AnvilError::Conflict(format!(
                "job {job_id} is not in progress"
            )));
        }

        let job = self
            .workflows
            .set_job_status(job_id, JobStatus::Completed, Some(conclusion))
            .await?;
        self.finalize_run_if_done(&job.run_id).await?;
        Ok(job)
    }

    /// Cancel a run: best-effort backend cancellation for triggered jobs,
    /// then every non-terminal job and the run itself conclude CANCELLED.
    /// The run is marked optimistically; backends may keep executing.
    pub async fn cancel_run(&self, run_id: &str) -> Result<WorkflowRunRecord> {
        let run = self.workflows.get_run(run_id).await?;
        if run.status == RunStatus::Completed {
            return Err(AnvilError::Conflict(format!(
                "run {run_id} already completed"
            )));
        }

        for job in self.workflows.jobs_for_run(run_id).await? {
            if job.status.is_terminal() {
                continue;
            }
            if let Some(external_id) = &job.external_id {
                let accepted = self
                    .engine
                    .cancel_run(&ExternalRunId(external_id.clone()))
                    .await
                    .unwrap_or(false);
                info!(job_id = %job.job_id, accepted, "backend cancel requested");
            }
            self.workflows
                .set_job_status(&job.job_id, JobStatus::Completed, Some(JobConclusion::Cancelled))
                .await?;
        }

        self.workflows
            .set_run_status(run_id, RunStatus::Completed, Some(RunConclusion::Cancelled))
            .await
            .map_err(Into::into)
    }

    /// Reactive entry point for an approved deployment: the gated
    /// ACTION_REQUIRED job for this (run, environment) becomes QUEUED.
    pub async fn resume_gated_jobs(
        &self,
        run_id: &str,
        environment_id: &str,
    ) -> Result<Vec<WorkflowJobRecord>> {
        let mut gated = self.workflows.gated_jobs(run_id, environment_id).await?;
        gated.sort_by(|a, b| a.job_id.cmp(&b.job_id));

        // One approval unlocks one job; a second gated job on the same
        // environment needs its own deployment round.
        let Some(job) = gated.into_iter().next() else {
            return Ok(Vec::new());
        };
        let queued = self
            .workflows
            .set_job_status(&job.job_id, JobStatus::Queued, None)
            .await?;
        info!(run_id = %run_id, job_id = %queued.job_id, "gated job unlocked");
        Ok(vec![queued])
    }

    /// Reactive entry point for a rejected deployment: every matching
    /// ACTION_REQUIRED job concludes COMPLETED/SKIPPED.
    pub async fn skip_gated_jobs(
        &self,
        run_id: &str,
        environment_id: &str,
    ) -> Result<Vec<WorkflowJobRecord>> {
        let gated = self.workflows.gated_jobs(run_id, environment_id).await?;
        let mut skipped = Vec::with_capacity(gated.len());
        for job in gated {
            let job = self
                .workflows
                .set_job_status(&job.job_id, JobStatus::Completed, Some(JobConclusion::Skipped))
                .await?;
            skipped.push(job);
        }
        self.finalize_run_if_done(run_id).await?;
        info!(run_id = %run_id, skipped = skipped.len(), "gated jobs skipped");
        Ok(skipped)
    }

    /// When all jobs are terminal, complete the run. Conclusion rollup: any
    /// FAILURE makes the run FAILURE, otherwise SUCCESS (explicit
    /// cancellation is handled in `cancel_run`).
    async fn finalize_run_if_done(&self, run_id: &str) -> Result<Option<WorkflowRunRecord>> {
        let run = self.workflows.get_run(run_id).await?;
        if run.status == RunStatus::Completed {
            return Ok(None);
        }

        let jobs = self.workflows.jobs_for_run(run_id).await?;
        if jobs.iter().any(|j| !j.status.is_terminal()) {
            return Ok(None);
        }

        let conclusion = if jobs
            .iter()
            .any(|j| j.conclusion == Some(JobConclusion::Failure))
        {
            RunConclusion::Failure
        } else {
            RunConclusion::Success
        };

        let run = self
            .workflows
            .set_run_status(run_id, RunStatus::Completed, Some(conclusion))
            .await?;
        info!(run_id = %run_id, conclusion = ?conclusion, "workflow run completed");
        Ok(Some(run))
    }
}
