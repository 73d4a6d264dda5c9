//! Raw commit data as read from a repository's object store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author or committer identity with its normalized timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
    /// UTC instant derived from the commit's epoch seconds. The recorded
    /// timezone offset is parsed but discarded: hashing requires a single
    /// canonical representation across ingestion re-runs.
    pub timestamp: DateTime<Utc>,
}

impl CommitIdentity {
    /// Build an identity from raw commit fields, normalizing the timestamp.
    pub fn from_epoch(name: impl Into<String>, email: impl Into<String>, epoch_secs: i64) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            timestamp: DateTime::from_timestamp(epoch_secs, 0).unwrap_or_default(),
        }
    }

    /// Canonical line form used in the verification hash material:
    /// `name <email> 2024-03-01T12:00:00Z`.
    pub fn canonical_line(&self) -> String {
        format!(
            "{} <{}> {}",
            self.name,
            self.email,
            self.timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        )
    }
}

/// Kind of signature block embedded in a commit object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureKind {
    Ssh,
    Pgp,
}

/// An armored signature block lifted from a commit object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    pub kind: SignatureKind,
    pub armored: String,
}

impl SignatureBlock {
    /// Classify an armored block by its header line. Unrecognized armor is
    /// treated as PGP, which is what legacy commits carry.
    pub fn from_armored(armored: impl Into<String>) -> Self {
        let armored = armored.into();
        let kind = if armored.starts_with("-----BEGIN SSH SIGNATURE-----") {
            SignatureKind::Ssh
        } else {
            SignatureKind::Pgp
        };
        Self { kind, armored }
    }
}

/// A commit as read from the object store, before any persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCommit {
    pub sha: String,
    pub tree_sha: String,
    /// Parents in the order recorded in the commit object.
    pub parent_shas: Vec<String>,
    pub author: CommitIdentity,
    pub committer: CommitIdentity,
    pub message: String,
    pub signature: Option<SignatureBlock>,
    /// The exact bytes the signature covers (the commit object with the
    /// signature header removed). `None` when the commit is unsigned.
    pub signed_payload: Option<Vec<u8>>,
}

/// A platform user resolved from an email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub user_id: String,
    pub email: String,
}

/// A signing key registered by a platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
    /// Stable fingerprint bound into the verification hash.
    pub fingerprint: String,
    /// Public key material: an OpenSSH public key line for SSH keys, an
    /// armored key block for PGP keys.
    pub public_key: String,
}
