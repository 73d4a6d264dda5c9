//! Anvil CI - workflow orchestration over pluggable CI backends
//!
//! Provides:
//! - The [`CiEngine`] contract every backend adapter implements
//! - A reference build-server adapter with an offline mock mode
//! - The workflow orchestrator (run/job state machine)
//! - The deployment approval gate for environment-gated jobs

pub mod approval;
pub mod buildserver;
pub mod engine;
pub mod orchestrator;

// Re-export key types
pub use approval::{ApprovalGate, ApprovalOutcome};
pub use buildserver::{BuildServerConfig, BuildServerEngine};
pub use engine::{CiEngine, EngineArtifact, EngineError, ExternalRunId, LogStream, RunRequest};
pub use orchestrator::{CreatedRun, JobSpec, RunSpec, WorkflowOrchestrator};
