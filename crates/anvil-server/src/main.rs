use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};

use anvil_ci::{ApprovalGate, BuildServerConfig, BuildServerEngine, WorkflowOrchestrator};
use anvil_core::ArtifactStore;
use anvil_server::{router, AppState};
use anvil_state::SurrealStore;

#[derive(Debug, Parser)]
#[command(name = "anvil-server", version, about = "Anvil commit-trust and CI API")]
struct Args {
    /// Address to bind.
    #[arg(long, env = "ANVIL_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Data directory for artifact blobs and the embedded database.
    #[arg(long, env = "ANVIL_DATA_DIR", default_value = ".anvil")]
    data_dir: PathBuf,

    /// Emit JSON log lines.
    #[arg(long, env = "ANVIL_LOG_JSON")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    anvil_core::init_tracing(args.json_logs, Level::INFO);

    let store = Arc::new(SurrealStore::from_env(&args.data_dir).await?);
    let engine = Arc::new(BuildServerEngine::new(BuildServerConfig::from_env()));

    let orchestrator = Arc::new(WorkflowOrchestrator::new(
        store.clone(),
        store.clone(),
        engine,
    ));
    let gate = Arc::new(ApprovalGate::new(store.clone(), orchestrator));
    let artifacts = Arc::new(ArtifactStore::new(
        &args.data_dir,
        store.clone(),
        store.clone(),
    )?);

    let state = AppState {
        commits: store.clone(),
        deployments: store,
        artifacts,
        gate,
    };

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!(bind = %args.bind, "anvil-server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
