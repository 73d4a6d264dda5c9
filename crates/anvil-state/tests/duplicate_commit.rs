//! Concurrent ingestion of the same commit must resolve to one row.

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use anvil_state::traits::*;
use anvil_state::SurrealStore;

fn commit_with_hash(material: &[u8]) -> NewCommit {
    NewCommit {
        repo_id: "repo-1".to_string(),
        sha: "f00d".repeat(10),
        tree_sha: "beef".repeat(10),
        parent_shas: vec!["cafe".repeat(10)],
        author_name: "Grace".to_string(),
        author_email: "grace@example.com".to_string(),
        authored_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap(),
        committer_name: "Grace".to_string(),
        committer_email: "grace@example.com".to_string(),
        committed_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 31, 0).unwrap(),
        verification_hash: HexDigest::from_bytes(material),
        author_user_id: Some("user-7".to_string()),
        signer_fingerprint: None,
        signature_status: SignatureStatus::Unsigned,
        message: "fix: stabilize upload retries".to_string(),
    }
}

#[tokio::test]
async fn concurrent_upserts_yield_single_row() {
    let store = Arc::new(SurrealStore::in_memory().await.unwrap());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.upsert_commit(commit_with_hash(b"same material")).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("upsert should not error");
    }

    let stored = store.get_commit("repo-1", &"f00d".repeat(10)).await.unwrap();
    assert_eq!(stored.verification_hash, HexDigest::from_bytes(b"same material"));
    // Parents from the first ingestion survive every re-run.
    assert_eq!(stored.parent_shas, vec!["cafe".repeat(10)]);
}

#[tokio::test]
async fn reingest_is_idempotent_for_unchanged_inputs() {
    let store = SurrealStore::in_memory().await.unwrap();

    let first = store.upsert_commit(commit_with_hash(b"material")).await.unwrap();
    let second = store.upsert_commit(commit_with_hash(b"material")).await.unwrap();

    assert_eq!(first.verification_hash, second.verification_hash);
    assert_eq!(first.created_at, second.created_at);
    assert_eq!(first.tree_sha, second.tree_sha);
}
