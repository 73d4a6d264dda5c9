//! Anvil Core Library
//!
//! Commit trust for the Anvil forge: deterministic verification hashing,
//! SSH/PGP signature checks behind an injectable verifier boundary,
//! idempotent commit ingestion and the streaming artifact store.

pub mod artifacts;
pub mod domain;
pub mod hash;
pub mod ingest;
pub mod obs;
pub mod telemetry;
pub mod verify;

pub use artifacts::ArtifactStore;
pub use domain::{
    AnvilError, CommitIdentity, RawCommit, Result, SignatureBlock, SignatureKind, SigningKey,
    UserRef,
};
pub use hash::verification_hash;
pub use ingest::{
    parse_raw_commit, CommitIngestor, CommitObjectStore, GitObjectStore, IdentityDirectory,
    MemoryIdentityDirectory,
};
pub use telemetry::init_tracing;
pub use verify::{FixedVerifier, SignatureVerifier, ToolVerifier};

// Persistence surface re-exported for downstream crates.
pub use anvil_state::{
    ArtifactKind, ArtifactRecord, CommitRecord, HexDigest, SignatureStatus,
};

/// Anvil version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
