//! Commit ingestion: object-store read, identity resolution, verification
//! hash computation and the idempotent upsert.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use anvil_state::{CommitRecord, CommitStore, NewCommit, SignatureStatus};

use crate::domain::error::{AnvilError, Result};
use crate::domain::{CommitIdentity, RawCommit, SignatureBlock, SigningKey, UserRef};
use crate::hash::verification_hash;
use crate::obs;
use crate::verify::SignatureVerifier;

/// Commit messages are truncated to this many characters before storage.
const MAX_MESSAGE_CHARS: usize = 1024;

// ---------------------------------------------------------------------------
// Object store boundary
// ---------------------------------------------------------------------------

/// Read access to raw commit objects, keyed by sha.
///
/// This is an opaque external boundary: the reference implementation shells
/// out to git, but any object database that can produce a [`RawCommit`]
/// satisfies it.
#[async_trait]
pub trait CommitObjectStore: Send + Sync {
    async fn read_commit(&self, repo_path: &Path, sha: &str) -> Result<RawCommit>;
}

/// Object store reading commits with `git cat-file`.
#[derive(Debug, Default)]
pub struct GitObjectStore;

impl GitObjectStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommitObjectStore for GitObjectStore {
    async fn read_commit(&self, repo_path: &Path, sha: &str) -> Result<RawCommit> {
        let output = Command::new("git")
            .args(["cat-file", "commit", sha])
            .current_dir(repo_path)
            .output()
            .await
            .map_err(|e| AnvilError::Git(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnvilError::Git(format!(
                "git cat-file commit {sha} failed: {stderr}"
            )));
        }

        parse_raw_commit(sha, &output.stdout)
    }
}

/// Parse the bytes of a raw commit object.
///
/// Recognized headers: `tree`, `parent` (repeatable), `author`, `committer`,
/// `gpgsig` (with space-indented continuation lines). Unknown headers such
/// as `encoding` are preserved in the signed payload but otherwise ignored.
/// The signed payload is the object with the `gpgsig` header removed, which
/// is exactly what git signs.
pub fn parse_raw_commit(sha: &str, data: &[u8]) -> Result<RawCommit> {
    let text = std::str::from_utf8(data)
        .map_err(|_| AnvilError::Git(format!("commit {sha} is not valid utf-8")))?;

    let (headers, message) = text
        .split_once("\n\n")
        .ok_or_else(|| AnvilError::Git(format!("commit {sha} has no header/message split")))?;

    let mut tree_sha = None;
    let mut parent_shas = Vec::new();
    let mut author = None;
    let mut committer = None;
    let mut signature_lines: Vec<&str> = Vec::new();
    let mut payload_headers: Vec<&str> = Vec::new();
    let mut in_signature = false;

    for line in headers.lines() {
        if in_signature {
            if let Some(continued) = line.strip_prefix(' ') {
                signature_lines.push(continued);
                continue;
            }
            in_signature = false;
        }

        if let Some(rest) = line.strip_prefix("tree ") {
            tree_sha = Some(rest.to_string());
            payload_headers.push(line);
        } else if let Some(rest) = line.strip_prefix("parent ") {
            parent_shas.push(rest.to_string());
            payload_headers.push(line);
        } else if let Some(rest) = line.strip_prefix("author ") {
            author = Some(parse_identity(sha, rest)?);
            payload_headers.push(line);
        } else if let Some(rest) = line.strip_prefix("committer ") {
            committer = Some(parse_identity(sha, rest)?);
            payload_headers.push(line);
        } else if let Some(rest) = line.strip_prefix("gpgsig ") {
            in_signature = true;
            signature_lines.push(rest);
        } else {
            payload_headers.push(line);
        }
    }

    let signature = if signature_lines.is_empty() {
        None
    } else {
        Some(SignatureBlock::from_armored(signature_lines.join("\n")))
    };
    let signed_payload = signature
        .is_some()
        .then(|| format!("{}\n\n{}", payload_headers.join("\n"), message).into_bytes());

    Ok(RawCommit {
        sha: sha.to_string(),
        tree_sha: tree_sha
            .ok_or_else(|| AnvilError::Git(format!("commit {sha} has no tree header")))?,
        parent_shas,
        author: author
            .ok_or_else(|| AnvilError::Git(format!("commit {sha} has no author header")))?,
        committer: committer
            .ok_or_else(|| AnvilError::Git(format!("commit {sha} has no committer header")))?,
        message: message.to_string(),
        signature,
        signed_payload,
    })
}

/// Parse `Name <email> 1609459200 +0100` into a normalized identity.
/// The offset is consumed but discarded (timestamps hash as UTC).
fn parse_identity(sha: &str, raw: &str) -> Result<CommitIdentity> {
    let malformed = || AnvilError::Git(format!("commit {sha} has malformed identity: {raw}"));

    let lt = raw.find('<').ok_or_else(malformed)?;
    let gt = raw.find('>').ok_or_else(malformed)?;
    if gt < lt {
        return Err(malformed());
    }

    let name = raw[..lt].trim();
    let email = &raw[lt + 1..gt];
    let epoch = raw[gt + 1..]
        .split_whitespace()
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(malformed)?;

    Ok(CommitIdentity::from_epoch(name, email, epoch))
}

// ---------------------------------------------------------------------------
// Identity boundary
// ---------------------------------------------------------------------------

/// Email→user and user→signing-key lookups against the platform's identity
/// store. "No matching user" is a normal `None`, never an error.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn user_by_email(&self, email: &str) -> Option<UserRef>;

    /// The user's most recently registered signing key, if any.
    async fn latest_signing_key(&self, user_id: &str) -> Option<SigningKey>;
}

/// In-memory identity directory for tests and local operation.
#[derive(Debug, Default)]
pub struct MemoryIdentityDirectory {
    users: Mutex<HashMap<String, UserRef>>,
    keys: Mutex<HashMap<String, Vec<SigningKey>>>,
}

impl MemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: impl Into<String>, email: impl Into<String>) {
        let user = UserRef {
            user_id: user_id.into(),
            email: email.into(),
        };
        let mut users = self.users.lock().unwrap();
        users.insert(user.email.clone(), user);
    }

    /// Register a key; later registrations win the "latest" lookup.
    pub fn add_key(&self, user_id: impl Into<String>, key: SigningKey) {
        let mut keys = self.keys.lock().unwrap();
        keys.entry(user_id.into()).or_default().push(key);
    }
}

#[async_trait]
impl IdentityDirectory for MemoryIdentityDirectory {
    async fn user_by_email(&self, email: &str) -> Option<UserRef> {
        let users = self.users.lock().unwrap();
        users.get(email).cloned()
    }

    async fn latest_signing_key(&self, user_id: &str) -> Option<SigningKey> {
        let keys = self.keys.lock().unwrap();
        keys.get(user_id).and_then(|registered| registered.last().cloned())
    }
}

// ---------------------------------------------------------------------------
// Ingestor
// ---------------------------------------------------------------------------

/// Reads a commit from the object store, resolves the author's identity and
/// signing key, computes the verification hash and upserts the row.
pub struct CommitIngestor {
    objects: Arc<dyn CommitObjectStore>,
    identities: Arc<dyn IdentityDirectory>,
    verifier: Arc<dyn SignatureVerifier>,
    commits: Arc<dyn CommitStore>,
}

impl CommitIngestor {
    pub fn new(
        objects: Arc<dyn CommitObjectStore>,
        identities: Arc<dyn IdentityDirectory>,
        verifier: Arc<dyn SignatureVerifier>,
        commits: Arc<dyn CommitStore>,
    ) -> Self {
        Self {
            objects,
            identities,
            verifier,
            commits,
        }
    }

    /// Ingest one commit. Safe to call repeatedly for the same sha: the
    /// upsert is keyed by `(repo_id, sha)` and only refreshes the
    /// verification fields on re-runs.
    pub async fn ingest(&self, repo_id: &str, repo_path: &Path, sha: &str) -> Result<CommitRecord> {
        let raw = self.objects.read_commit(repo_path, sha).await?;

        let user = self.identities.user_by_email(&raw.author.email).await;
        let key = match &user {
            Some(user) => self.identities.latest_signing_key(&user.user_id).await,
            None => None,
        };

        let signature_status = self.signature_status(&raw, key.as_ref()).await;
        let signer_fingerprint = key.as_ref().map(|k| k.fingerprint.clone());
        let hash = verification_hash(&raw, signer_fingerprint.as_deref());

        debug!(
            repo = %repo_id,
            sha = %sha,
            status = ?signature_status,
            "ingesting commit"
        );

        let record = self
            .commits
            .upsert_commit(NewCommit {
                repo_id: repo_id.to_string(),
                sha: raw.sha.clone(),
                tree_sha: raw.tree_sha.clone(),
                parent_shas: raw.parent_shas.clone(),
                author_name: raw.author.name.clone(),
                author_email: raw.author.email.clone(),
                authored_at: raw.author.timestamp,
                committer_name: raw.committer.name.clone(),
                committer_email: raw.committer.email.clone(),
                committed_at: raw.committer.timestamp,
                verification_hash: hash,
                author_user_id: user.map(|u| u.user_id),
                signer_fingerprint,
                signature_status,
                message: truncate_message(&raw.message),
            })
            .await?;

        obs::emit_commit_ingested(repo_id, sha, &record);
        Ok(record)
    }

    /// Signature verification never aborts ingestion: no block means
    /// `Unsigned`, anything that fails to verify means `Invalid`.
    async fn signature_status(
        &self,
        raw: &RawCommit,
        key: Option<&SigningKey>,
    ) -> SignatureStatus {
        let Some(signature) = &raw.signature else {
            return SignatureStatus::Unsigned;
        };
        let (Some(key), Some(payload)) = (key, &raw.signed_payload) else {
            return SignatureStatus::Invalid;
        };
        if self
            .verifier
            .verify(payload, signature, key, &raw.author.email)
            .await
        {
            SignatureStatus::Verified
        } else {
            SignatureStatus::Invalid
        }
    }
}

fn truncate_message(message: &str) -> String {
    message.chars().take(MAX_MESSAGE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignatureKind;

    const UNSIGNED_COMMIT: &str = concat!(
        "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n",
        "author A <a@x.com> 1609459200 +0100\n",
        "committer A <a@x.com> 1609459200 +0100\n",
        "\n",
        "initial\n",
    );

    // Continuation lines of the gpgsig header carry a leading space.
    const SIGNED_COMMIT: &str = concat!(
        "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n",
        "parent aaaa1111aaaa1111aaaa1111aaaa1111aaaa1111\n",
        "parent bbbb2222bbbb2222bbbb2222bbbb2222bbbb2222\n",
        "author A <a@x.com> 1609459200 +0000\n",
        "committer B <b@x.com> 1609459260 -0500\n",
        "gpgsig -----BEGIN SSH SIGNATURE-----\n",
        " U1NIU0lHAAAA\n",
        " -----END SSH SIGNATURE-----\n",
        "\n",
        "merge branch\n",
    );

    #[test]
    fn parses_unsigned_commit() {
        let raw = parse_raw_commit("abc123", UNSIGNED_COMMIT.as_bytes()).unwrap();
        assert_eq!(raw.tree_sha, "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
        assert!(raw.parent_shas.is_empty());
        assert_eq!(raw.author.email, "a@x.com");
        assert_eq!(raw.message, "initial\n");
        assert!(raw.signature.is_none());
        assert!(raw.signed_payload.is_none());
    }

    #[test]
    fn parses_signed_merge_commit() {
        let raw = parse_raw_commit("def456", SIGNED_COMMIT.as_bytes()).unwrap();
        assert_eq!(raw.parent_shas.len(), 2);
        assert_eq!(raw.committer.name, "B");

        let signature = raw.signature.as_ref().unwrap();
        assert_eq!(signature.kind, SignatureKind::Ssh);
        assert!(signature.armored.starts_with("-----BEGIN SSH SIGNATURE-----"));
        assert!(signature.armored.ends_with("-----END SSH SIGNATURE-----"));
    }

    #[test]
    fn signed_payload_excludes_signature_header() {
        let raw = parse_raw_commit("def456", SIGNED_COMMIT.as_bytes()).unwrap();
        let payload = String::from_utf8(raw.signed_payload.unwrap()).unwrap();
        assert!(!payload.contains("gpgsig"));
        assert!(!payload.contains("SSH SIGNATURE"));
        assert!(payload.starts_with("tree "));
        assert!(payload.ends_with("merge branch\n"));
    }

    #[test]
    fn identity_offset_is_normalized_away() {
        // +0100 and -0500 both hash as the plain UTC epoch instant.
        let raw = parse_raw_commit("def456", SIGNED_COMMIT.as_bytes()).unwrap();
        assert_eq!(
            raw.author.canonical_line(),
            "A <a@x.com> 2021-01-01T00:00:00Z"
        );
        assert_eq!(
            raw.committer.canonical_line(),
            "B <b@x.com> 2021-01-01T00:01:00Z"
        );
    }

    #[test]
    fn rejects_commit_without_tree() {
        let text = "author A <a@x.com> 1 +0000\ncommitter A <a@x.com> 1 +0000\n\nmsg\n";
        let err = parse_raw_commit("zzz", text.as_bytes()).unwrap_err();
        assert!(matches!(err, AnvilError::Git(_)));
    }

    #[test]
    fn truncates_long_messages() {
        let long = "x".repeat(MAX_MESSAGE_CHARS + 50);
        assert_eq!(truncate_message(&long).chars().count(), MAX_MESSAGE_CHARS);
        assert_eq!(truncate_message("short"), "short");
    }

    #[tokio::test]
    async fn memory_directory_latest_key_wins() {
        let directory = MemoryIdentityDirectory::new();
        directory.add_user("user-1", "a@x.com");
        directory.add_key(
            "user-1",
            SigningKey {
                fingerprint: "SHA256:old".to_string(),
                public_key: "ssh-ed25519 OLD".to_string(),
            },
        );
        directory.add_key(
            "user-1",
            SigningKey {
                fingerprint: "SHA256:new".to_string(),
                public_key: "ssh-ed25519 NEW".to_string(),
            },
        );

        let user = directory.user_by_email("a@x.com").await.unwrap();
        let key = directory.latest_signing_key(&user.user_id).await.unwrap();
        assert_eq!(key.fingerprint, "SHA256:new");

        assert!(directory.user_by_email("stranger@x.com").await.is_none());
    }
}
