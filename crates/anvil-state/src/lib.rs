//! Anvil-State: persistence layer for the Anvil CI subsystem
//!
//! Defines the storage abstractions behind commit ingestion, artifact
//! binding, workflow orchestration and deployment gating, plus two
//! implementations: in-memory fakes for testing and a SurrealDB backend
//! for embedded or remote persistence.
//!
//! ## Key guarantees
//!
//! - Commit upsert is atomic per `(repo_id, sha)`: concurrent ingestions of
//!   the same commit never produce two rows.
//! - Deployment decisions are compare-and-set: the second of two racing
//!   reviewers observes `StorageError::Conflict`.
//! - Completed runs/jobs and stored artifacts are immutable.

mod error;
pub mod fakes;
mod migrations;
mod schema;
mod surreal;
pub mod traits;

pub use error::StorageError;
pub use surreal::SurrealStore;
pub use traits::{
    ApprovalRecord, ArtifactIndex, ArtifactKind, ArtifactRecord, CommitRecord, CommitStore,
    DeploymentRecord, DeploymentStatus, DeploymentStore, EnvironmentRecord, HexDigest,
    JobConclusion, JobStatus, NewCommit, ReviewDecision, RunConclusion, RunStatus,
    SignatureStatus, StorageResult, WorkflowJobRecord, WorkflowRunRecord, WorkflowStore,
};
