//! SurrealDB schema initialization
//!
//! Sets up all Anvil tables with their indexes. Safe to call multiple times:
//! redefining a table or index is an overwrite, not an error.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;

/// Initialize all Anvil tables.
///
/// Called once per connection before the stores are used.
pub async fn init_schema(db: &Surreal<Any>) -> Result<(), StorageError> {
    info!("initializing anvil schema");

    init_commits_table(db).await?;
    init_artifacts_table(db).await?;
    init_workflow_tables(db).await?;
    init_deployment_tables(db).await?;

    info!("anvil schema initialization complete");
    Ok(())
}

/// `commits` carries the idempotent-upsert guarantee: the UNIQUE index on
/// `(repo_id, sha)` makes the second of two racing ingestions fail its
/// CREATE and fall back to the verification-field UPDATE.
async fn init_commits_table(db: &Surreal<Any>) -> Result<(), StorageError> {
    debug!("initializing commits table");

    let sql = r#"
        DEFINE TABLE commits SCHEMALESS;

        -- Natural key: one row per (repository, git sha)
        DEFINE INDEX idx_commit_key ON TABLE commits COLUMNS repo_id, sha UNIQUE;

        -- Author lookups
        DEFINE INDEX idx_commit_author ON TABLE commits COLUMNS author_email;
    "#;

    db.query(sql).await?;
    Ok(())
}

async fn init_artifacts_table(db: &Surreal<Any>) -> Result<(), StorageError> {
    debug!("initializing artifacts table");

    let sql = r#"
        DEFINE TABLE artifacts SCHEMALESS;

        DEFINE INDEX idx_artifact_id ON TABLE artifacts COLUMNS artifact_id UNIQUE;

        -- Listing artifacts per commit
        DEFINE INDEX idx_artifact_commit ON TABLE artifacts COLUMNS repo_id, commit_sha;
    "#;

    db.query(sql).await?;
    Ok(())
}

async fn init_workflow_tables(db: &Surreal<Any>) -> Result<(), StorageError> {
    debug!("initializing workflow tables");

    let sql = r#"
        DEFINE TABLE workflow_runs SCHEMALESS;

        DEFINE INDEX idx_run_id ON TABLE workflow_runs COLUMNS run_id UNIQUE;
        DEFINE INDEX idx_run_repo ON TABLE workflow_runs COLUMNS repo_id, commit_sha;

        DEFINE TABLE workflow_jobs SCHEMALESS;

        DEFINE INDEX idx_job_id ON TABLE workflow_jobs COLUMNS job_id UNIQUE;
        DEFINE INDEX idx_job_run ON TABLE workflow_jobs COLUMNS run_id;

        -- Scan surfaces: runner picker (status) and gate resume/skip
        DEFINE INDEX idx_job_status ON TABLE workflow_jobs COLUMNS status;
        DEFINE INDEX idx_job_gate ON TABLE workflow_jobs COLUMNS run_id, environment_id, status;
    "#;

    db.query(sql).await?;
    Ok(())
}

async fn init_deployment_tables(db: &Surreal<Any>) -> Result<(), StorageError> {
    debug!("initializing deployment tables");

    let sql = r#"
        DEFINE TABLE environments SCHEMALESS;

        DEFINE INDEX idx_environment_id ON TABLE environments COLUMNS environment_id UNIQUE;
        DEFINE INDEX idx_environment_repo ON TABLE environments COLUMNS repo_id;

        DEFINE TABLE deployments SCHEMALESS;

        DEFINE INDEX idx_deployment_id ON TABLE deployments COLUMNS deployment_id UNIQUE;
        DEFINE INDEX idx_deployment_env ON TABLE deployments COLUMNS environment_id, created_at;

        -- Approvals are append-only audit rows
        DEFINE TABLE approvals SCHEMALESS;

        DEFINE INDEX idx_approval_deployment ON TABLE approvals COLUMNS deployment_id;
    "#;

    db.query(sql).await?;
    Ok(())
}
