//! End-to-end ingestion against a real git repository built in a tempdir.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use anvil_core::{CommitIngestor, FixedVerifier, GitObjectStore, MemoryIdentityDirectory};
use anvil_state::fakes::MemoryCommitStore;
use anvil_state::{CommitStore, SignatureStatus};

fn run_git(repo_dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn make_git_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    run_git(dir.path(), &["init"]);
    run_git(dir.path(), &["config", "user.name", "Test Author"]);
    run_git(dir.path(), &["config", "user.email", "author@example.com"]);
    run_git(dir.path(), &["config", "commit.gpgsign", "false"]);
    run_git(
        dir.path(),
        &["commit", "--allow-empty", "-m", "initial commit"],
    );
    dir
}

fn head_sha(repo_dir: &Path) -> String {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .unwrap();
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn ingestor(commits: Arc<MemoryCommitStore>) -> CommitIngestor {
    CommitIngestor::new(
        Arc::new(GitObjectStore::new()),
        Arc::new(MemoryIdentityDirectory::new()),
        Arc::new(FixedVerifier::rejecting()),
        commits,
    )
}

#[tokio::test]
async fn unsigned_commit_ingests_with_stable_hash() {
    let repo = make_git_repo();
    let sha = head_sha(repo.path());
    let commits = Arc::new(MemoryCommitStore::new());
    let ingestor = ingestor(commits.clone());

    let first = ingestor.ingest("repo-1", repo.path(), &sha).await.unwrap();
    assert_eq!(first.sha, sha);
    assert_eq!(first.signature_status, SignatureStatus::Unsigned);
    assert_eq!(first.author_email, "author@example.com");
    assert!(first.parent_shas.is_empty());
    assert_eq!(first.verification_hash.as_str().len(), 64);

    // Re-ingest with identical inputs: same hash, same row.
    let second = ingestor.ingest("repo-1", repo.path(), &sha).await.unwrap();
    assert_eq!(second.verification_hash, first.verification_hash);
    assert_eq!(second.tree_sha, first.tree_sha);
    assert_eq!(second.created_at, first.created_at);

    let stored = commits.get_commit("repo-1", &sha).await.unwrap();
    assert_eq!(stored.verification_hash, first.verification_hash);
}

#[tokio::test]
async fn child_commit_carries_parent_in_order() {
    let repo = make_git_repo();
    run_git(
        repo.path(),
        &["commit", "--allow-empty", "-m", "second commit"],
    );
    let child = head_sha(repo.path());

    let commits = Arc::new(MemoryCommitStore::new());
    let ingestor = ingestor(commits);

    let record = ingestor.ingest("repo-1", repo.path(), &child).await.unwrap();
    assert_eq!(record.parent_shas.len(), 1);
    assert_eq!(record.message.trim(), "second commit");
}

#[tokio::test]
async fn unknown_sha_fails_ingestion() {
    let repo = make_git_repo();
    let commits = Arc::new(MemoryCommitStore::new());
    let ingestor = ingestor(commits);

    let result = ingestor
        .ingest("repo-1", repo.path(), &"0".repeat(40))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn resolved_author_lands_in_record() {
    let repo = make_git_repo();
    let sha = head_sha(repo.path());

    let directory = MemoryIdentityDirectory::new();
    directory.add_user("user-42", "author@example.com");

    let commits = Arc::new(MemoryCommitStore::new());
    let ingestor = CommitIngestor::new(
        Arc::new(GitObjectStore::new()),
        Arc::new(directory),
        Arc::new(FixedVerifier::rejecting()),
        commits,
    );

    let record = ingestor.ingest("repo-1", repo.path(), &sha).await.unwrap();
    assert_eq!(record.author_user_id.as_deref(), Some("user-42"));
    // No signing key registered, so no fingerprint in the material.
    assert!(record.signer_fingerprint.is_none());
}
