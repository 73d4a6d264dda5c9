//! Domain types shared across the Anvil commit-trust subsystem.

pub mod commit;
pub mod error;

pub use commit::{CommitIdentity, RawCommit, SignatureBlock, SignatureKind, SigningKey, UserRef};
pub use error::{AnvilError, Result};

// Persistent record types and their status enums live in anvil-state; they
// are re-exported here so callers see one domain surface.
pub use anvil_state::{
    ArtifactKind, ArtifactRecord, CommitRecord, DeploymentRecord, DeploymentStatus,
    EnvironmentRecord, HexDigest, JobConclusion, JobStatus, ReviewDecision, RunConclusion,
    RunStatus, SignatureStatus, WorkflowJobRecord, WorkflowRunRecord,
};
