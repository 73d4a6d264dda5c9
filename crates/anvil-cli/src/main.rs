//! Anvil CLI - operator tooling for the commit-trust subsystem.
//!
//! ## Commands
//!
//! - `ingest`: read a commit from a git repository and upsert its record
//! - `hash`: show the verification hash for a commit without persisting it
//! - `upload`: attach a file to an ingested commit as an artifact
//! - `approve`: submit a deployment decision
//! - `environments`: list a repository's environments and reviewers

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use anvil_ci::{ApprovalGate, BuildServerEngine, WorkflowOrchestrator};
use anvil_core::{
    verification_hash, ArtifactStore, CommitIngestor, GitObjectStore, MemoryIdentityDirectory,
    ToolVerifier,
};
use anvil_state::{ArtifactKind, ReviewDecision, SurrealStore};

#[derive(Parser)]
#[command(name = "anvil")]
#[command(author = "Anvil Forge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Anvil commit trust and CI gating", long_about = None)]
struct Cli {
    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Data directory for blobs and the embedded database
    #[arg(long, global = true, env = "ANVIL_DATA_DIR", default_value = ".anvil")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a commit: compute its verification hash and upsert the record
    Ingest {
        /// Repository identifier the commit belongs to
        #[arg(long)]
        repo_id: String,

        /// Path to the git repository
        #[arg(long, default_value = ".")]
        repo_path: PathBuf,

        /// Commit sha to ingest
        sha: String,
    },

    /// Compute the verification hash for a commit without persisting anything
    Hash {
        /// Path to the git repository
        #[arg(long, default_value = ".")]
        repo_path: PathBuf,

        /// Commit sha to hash
        sha: String,

        /// Signing-key fingerprint to bind into the material
        #[arg(long)]
        fingerprint: Option<String>,
    },

    /// Upload a file as an artifact of an ingested commit
    Upload {
        /// Repository identifier
        #[arg(long)]
        repo_id: String,

        /// Commit sha the artifact belongs to
        #[arg(long)]
        sha: String,

        /// File to upload
        file: PathBuf,
    },

    /// Submit a deployment approval decision
    Approve {
        /// Deployment identifier
        deployment_id: String,

        /// Reviewer user id
        #[arg(long)]
        user: String,

        /// Reject instead of approve
        #[arg(long)]
        reject: bool,

        /// Optional review comment
        #[arg(long)]
        comment: Option<String>,
    },

    /// List a repository's environments with reviewers and recent deployments
    Environments {
        /// Repository identifier
        repo_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    anvil_core::init_tracing(cli.json, Level::WARN);

    let store = Arc::new(
        SurrealStore::from_env(&cli.data_dir)
            .await
            .context("failed to open state store")?,
    );

    match cli.command {
        Commands::Ingest {
            repo_id,
            repo_path,
            sha,
        } => {
            let ingestor = CommitIngestor::new(
                Arc::new(GitObjectStore::new()),
                Arc::new(MemoryIdentityDirectory::new()),
                Arc::new(ToolVerifier::new()),
                store,
            );
            let record = ingestor
                .ingest(&repo_id, &repo_path, &sha)
                .await
                .context("ingestion failed")?;
            println!(
                "{} {} status={:?}",
                record.sha,
                record.verification_hash,
                record.signature_status
            );
        }

        Commands::Hash {
            repo_path,
            sha,
            fingerprint,
        } => {
            use anvil_core::CommitObjectStore;
            let objects = GitObjectStore::new();
            let raw = objects.read_commit(&repo_path, &sha).await?;
            let digest = verification_hash(&raw, fingerprint.as_deref());
            println!("{digest}");
        }

        Commands::Upload {
            repo_id,
            sha,
            file,
        } => {
            let artifacts = ArtifactStore::new(&cli.data_dir, store.clone(), store.clone())?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "artifact".to_string());
            let reader = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("failed to open {}", file.display()))?;
            let record = artifacts
                .upload(&repo_id, &sha, &name, ArtifactKind::Other, reader)
                .await
                .context("upload failed")?;
            println!("{} {} {} bytes", record.artifact_id, record.content_hash, record.size_bytes);
        }

        Commands::Approve {
            deployment_id,
            user,
            reject,
            comment,
        } => {
            let engine = Arc::new(BuildServerEngine::mock());
            let orchestrator = Arc::new(WorkflowOrchestrator::new(
                store.clone(),
                store.clone(),
                engine,
            ));
            let gate = ApprovalGate::new(store.clone(), orchestrator);
            let decision = if reject {
                ReviewDecision::Rejected
            } else {
                ReviewDecision::Approved
            };
            let outcome = gate
                .submit(&deployment_id, &user, decision, comment)
                .await
                .context("decision rejected")?;
            println!(
                "deployment {} -> {:?} ({} job(s) transitioned)",
                outcome.deployment.deployment_id,
                outcome.deployment.status,
                outcome.transitioned_jobs.len()
            );
        }

        Commands::Environments { repo_id } => {
            use anvil_state::DeploymentStore;
            for environment in store.environments_for_repo(&repo_id).await? {
                let recent = store
                    .recent_deployments(&environment.environment_id, 5)
                    .await?;
                println!(
                    "{} ({}) reviewers=[{}] recent_deployments={}",
                    environment.name,
                    environment.environment_id,
                    environment.reviewers.join(", "),
                    recent.len()
                );
            }
        }
    }

    Ok(())
}
