//! HTTP boundary tests driven through the router with in-memory stores.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use tower::ServiceExt;

use anvil_ci::{ApprovalGate, BuildServerEngine, JobSpec, RunSpec, WorkflowOrchestrator};
use anvil_core::ArtifactStore;
use anvil_server::{router, AppState};
use anvil_state::fakes::{
    MemoryArtifactIndex, MemoryCommitStore, MemoryDeploymentStore, MemoryWorkflowStore,
};
use anvil_state::{
    CommitStore, DeploymentStore, EnvironmentRecord, HexDigest, NewCommit, SignatureStatus,
};

struct TestApp {
    _dir: tempfile::TempDir,
    app: axum::Router,
    commits: Arc<MemoryCommitStore>,
    deployments: Arc<MemoryDeploymentStore>,
    orchestrator: Arc<WorkflowOrchestrator>,
}

fn test_app() -> TestApp {
    let commits = Arc::new(MemoryCommitStore::new());
    let deployments = Arc::new(MemoryDeploymentStore::new());
    let workflows = Arc::new(MemoryWorkflowStore::new());
    let engine = Arc::new(BuildServerEngine::mock());

    let orchestrator = Arc::new(WorkflowOrchestrator::new(
        workflows,
        deployments.clone(),
        engine,
    ));
    let gate = Arc::new(ApprovalGate::new(deployments.clone(), orchestrator.clone()));

    let dir = tempfile::tempdir().unwrap();
    let artifacts = Arc::new(
        ArtifactStore::new(
            dir.path(),
            commits.clone(),
            Arc::new(MemoryArtifactIndex::new()),
        )
        .unwrap(),
    );

    let state = AppState {
        commits: commits.clone(),
        deployments: deployments.clone(),
        artifacts,
        gate,
    };

    TestApp {
        _dir: dir,
        app: router(state),
        commits,
        deployments,
        orchestrator,
    }
}

async fn seed_commit(app: &TestApp) {
    app.commits
        .upsert_commit(NewCommit {
            repo_id: "repo-1".to_string(),
            sha: "abc123".to_string(),
            tree_sha: "t1".to_string(),
            parent_shas: vec![],
            author_name: "A".to_string(),
            author_email: "a@x.com".to_string(),
            authored_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            committer_name: "A".to_string(),
            committer_email: "a@x.com".to_string(),
            committed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            verification_hash: HexDigest::from_bytes(b"material"),
            author_user_id: None,
            signer_fingerprint: None,
            signature_status: SignatureStatus::Unsigned,
            message: "initial".to_string(),
        })
        .await
        .unwrap();
}

fn multipart_upload(uri: &str, content: &[u8]) -> Request<Body> {
    let boundary = "anvil-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"build.log\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ===========================================================================
// Artifact upload
// ===========================================================================

#[tokio::test]
async fn upload_artifact_returns_ok_with_hash() {
    let test = test_app();
    seed_commit(&test).await;

    let content = b"line one\nline two\n";
    let response = test
        .app
        .clone()
        .oneshot(multipart_upload(
            "/repos/repo-1/commits/abc123/artifacts?kind=LOG",
            content,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["artifact"]["kind"], "LOG");
    assert_eq!(json["artifact"]["name"], "build.log");
    assert_eq!(
        json["artifact"]["content_hash"],
        HexDigest::from_bytes(content).as_str()
    );
}

#[tokio::test]
async fn upload_to_unknown_commit_is_404() {
    let test = test_app();

    let response = test
        .app
        .clone()
        .oneshot(multipart_upload(
            "/repos/repo-1/commits/deadbeef/artifacts",
            b"bytes",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_without_file_part_is_400() {
    let test = test_app();
    seed_commit(&test).await;

    let boundary = "anvil-test-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\njust text\r\n--{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/repos/repo-1/commits/abc123/artifacts")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = test.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ===========================================================================
// Deployment approval
// ===========================================================================

async fn seed_gated_run(test: &TestApp) -> (String, String) {
    test.deployments
        .insert_environment(EnvironmentRecord {
            environment_id: "env-prod".to_string(),
            repo_id: "repo-1".to_string(),
            name: "production".to_string(),
            reviewers: vec!["alice".to_string()],
        })
        .await
        .unwrap();

    let created = test
        .orchestrator
        .create_run(RunSpec {
            workflow_id: "wf-deploy".to_string(),
            repo_id: "repo-1".to_string(),
            commit_sha: "abc123".to_string(),
            branch: "main".to_string(),
            trigger_event: "push".to_string(),
            jobs: vec![JobSpec {
                name: "deploy".to_string(),
                environment_id: Some("env-prod".to_string()),
            }],
        })
        .await
        .unwrap();

    (
        created.deployments[0].deployment_id.clone(),
        created.jobs[0].job_id.clone(),
    )
}

fn approve_request(deployment_id: &str, user_id: &str, status: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/deployments/{deployment_id}/approve"))
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "status": status, "user_id": user_id }).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn approve_flow_403_then_200_then_409() {
    let test = test_app();
    let (deployment_id, _job_id) = seed_gated_run(&test).await;

    let response = test
        .app
        .clone()
        .oneshot(approve_request(&deployment_id, "mallory", "APPROVED"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = test
        .app
        .clone()
        .oneshot(approve_request(&deployment_id, "alice", "APPROVED"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("approved"));

    let response = test
        .app
        .clone()
        .oneshot(approve_request(&deployment_id, "alice", "APPROVED"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn approve_unknown_deployment_is_404() {
    let test = test_app();
    let response = test
        .app
        .clone()
        .oneshot(approve_request("ghost", "alice", "APPROVED"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ===========================================================================
// Environment listing
// ===========================================================================

#[tokio::test]
async fn environments_listing_includes_reviewers_and_recent_deployments() {
    let test = test_app();
    let (_deployment_id, _job_id) = seed_gated_run(&test).await;

    let request = Request::builder()
        .method("GET")
        .uri("/repositories/repo-1/environments")
        .body(Body::empty())
        .unwrap();
    let response = test.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let environments = json["environments"].as_array().unwrap();
    assert_eq!(environments.len(), 1);
    assert_eq!(environments[0]["environment_id"], "env-prod");
    assert_eq!(environments[0]["reviewers"][0], "alice");
    assert_eq!(
        environments[0]["recent_deployments"]
            .as_array()
            .unwrap()
            .len(),
        1
    );
}
