//! Commit verification hash.
//!
//! The hash binds a commit's structural and identity metadata (and, when the
//! author has a registered signing key, that key's fingerprint) into one
//! SHA-256 digest. The field order below is a wire-format contract: every
//! previously computed hash depends on it, so it must not change between
//! releases.

use sha2::{Digest, Sha256};

use crate::domain::{HexDigest, RawCommit};

/// Compute the verification hash for a commit.
///
/// Material layout, one field per line in fixed order:
///
/// ```text
/// <commit sha>
/// <tree sha>
/// <parent sha>            (one line per parent, original order)
/// <author canonical line>
/// <committer canonical line>
/// <signer fingerprint>    (only when a key was resolved)
/// <message>
/// ```
///
/// Timestamps inside the identity lines are already normalized to UTC
/// RFC3339 seconds (see `CommitIdentity`), which keeps the digest stable
/// across ingestion re-runs regardless of the offset the commit recorded.
pub fn verification_hash(commit: &RawCommit, signer_fingerprint: Option<&str>) -> HexDigest {
    let mut hasher = Sha256::new();

    let mut line = |field: &str| {
        hasher.update(field.as_bytes());
        hasher.update(b"\n");
    };

    line(&commit.sha);
    line(&commit.tree_sha);
    for parent in &commit.parent_shas {
        line(parent);
    }
    line(&commit.author.canonical_line());
    line(&commit.committer.canonical_line());
    if let Some(fingerprint) = signer_fingerprint {
        line(fingerprint);
    }
    line(&commit.message);

    HexDigest::from_hasher(hasher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CommitIdentity;

    fn base_commit() -> RawCommit {
        RawCommit {
            sha: "abc123".to_string(),
            tree_sha: "t1".to_string(),
            parent_shas: vec![],
            author: CommitIdentity::from_epoch("A", "a@x.com", 1609459200),
            committer: CommitIdentity::from_epoch("A", "a@x.com", 1609459200),
            message: "initial".to_string(),
            signature: None,
            signed_payload: None,
        }
    }

    #[test]
    fn hash_is_64_hex_chars() {
        let digest = verification_hash(&base_commit(), None);
        assert_eq!(digest.as_str().len(), 64);
        assert!(digest.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_is_deterministic() {
        let commit = base_commit();
        let first = verification_hash(&commit, None);
        let second = verification_hash(&commit, None);
        assert_eq!(first, second);

        let with_fp = verification_hash(&commit, Some("SHA256:fpfpfp"));
        let with_fp2 = verification_hash(&commit, Some("SHA256:fpfpfp"));
        assert_eq!(with_fp, with_fp2);
    }

    #[test]
    fn hash_changes_with_message() {
        let mut commit = base_commit();
        let original = verification_hash(&commit, None);
        commit.message = "initial.".to_string();
        assert_ne!(original, verification_hash(&commit, None));
    }

    #[test]
    fn hash_changes_with_any_parent() {
        let mut commit = base_commit();
        commit.parent_shas = vec!["p1".to_string(), "p2".to_string()];
        let original = verification_hash(&commit, None);
        commit.parent_shas = vec!["p1".to_string(), "p3".to_string()];
        assert_ne!(original, verification_hash(&commit, None));
    }

    #[test]
    fn hash_is_parent_order_sensitive() {
        let mut commit = base_commit();
        commit.parent_shas = vec!["p1".to_string(), "p2".to_string()];
        let original = verification_hash(&commit, None);
        commit.parent_shas = vec!["p2".to_string(), "p1".to_string()];
        assert_ne!(original, verification_hash(&commit, None));
    }

    #[test]
    fn hash_changes_with_author_email() {
        let mut commit = base_commit();
        let original = verification_hash(&commit, None);
        commit.author.email = "b@x.com".to_string();
        assert_ne!(original, verification_hash(&commit, None));
    }

    #[test]
    fn hash_changes_with_fingerprint() {
        let commit = base_commit();
        let unsigned = verification_hash(&commit, None);
        let signed = verification_hash(&commit, Some("SHA256:abcdef"));
        assert_ne!(unsigned, signed);
        assert_ne!(signed, verification_hash(&commit, Some("SHA256:ghijkl")));
    }

    #[test]
    fn hash_changes_with_author_timestamp() {
        let mut commit = base_commit();
        let original = verification_hash(&commit, None);
        commit.author = CommitIdentity::from_epoch("A", "a@x.com", 1609459201);
        assert_ne!(original, verification_hash(&commit, None));
    }
}
