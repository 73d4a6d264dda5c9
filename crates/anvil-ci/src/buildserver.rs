//! Reference CI engine adapter for an external build-automation server.
//!
//! Speaks a small HTTP API (`POST /api/runs`, cancel, artifacts, log
//! streaming). Without a configured base URL the adapter runs in mock mode:
//! it hands out synthetic run ids tracked in a bounded in-process cache,
//! which lets the orchestrator be exercised end-to-end with no backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::{CiEngine, EngineArtifact, EngineError, ExternalRunId, LogStream, RunRequest};

/// Adapter configuration. `base_url: None` selects mock mode.
#[derive(Debug, Clone, Default)]
pub struct BuildServerConfig {
    /// e.g. `https://builds.example.com`. No trailing slash.
    pub base_url: Option<String>,
    /// Bearer token for the backend API.
    pub token: Option<String>,
}

impl BuildServerConfig {
    /// Read `ANVIL_BUILDSERVER_URL` / `ANVIL_BUILDSERVER_TOKEN`. Both unset
    /// means mock mode.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("ANVIL_BUILDSERVER_URL").ok(),
            token: std::env::var("ANVIL_BUILDSERVER_TOKEN").ok(),
        }
    }
}

/// Bounded cache of mock-mode runs.
///
/// Owns its mutex and its eviction policy; transient adapter state never
/// lives in an ambient module-level map.
#[derive(Debug)]
struct RunCache {
    capacity: usize,
    entries: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    runs: HashMap<String, MockRun>,
    insertion_order: Vec<String>,
}

#[derive(Debug, Clone)]
struct MockRun {
    request: RunRequest,
    cancelled: bool,
}

impl RunCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(CacheInner::default()),
        }
    }

    fn insert(&self, id: String, run: MockRun) {
        let mut inner = self.entries.lock().unwrap();
        if inner.insertion_order.len() >= self.capacity {
            let evicted = inner.insertion_order.remove(0);
            inner.runs.remove(&evicted);
        }
        inner.insertion_order.push(id.clone());
        inner.runs.insert(id, run);
    }

    fn get(&self, id: &str) -> Option<MockRun> {
        let inner = self.entries.lock().unwrap();
        inner.runs.get(id).cloned()
    }

    fn mark_cancelled(&self, id: &str) -> bool {
        let mut inner = self.entries.lock().unwrap();
        match inner.runs.get_mut(id) {
            Some(run) => {
                run.cancelled = true;
                true
            }
            None => false,
        }
    }
}

/// Response row from the backend's run-creation endpoint.
#[derive(Debug, Deserialize)]
struct CreateRunResponse {
    id: String,
}

/// CI engine adapter for the build-automation server.
pub struct BuildServerEngine {
    config: BuildServerConfig,
    client: reqwest::Client,
    mock_runs: RunCache,
}

impl BuildServerEngine {
    pub fn new(config: BuildServerConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            mock_runs: RunCache::new(1024),
        }
    }

    /// Mock-mode adapter with no backend configured.
    pub fn mock() -> Self {
        Self::new(BuildServerConfig::default())
    }

    fn is_mock(&self) -> bool {
        self.config.base_url.is_none()
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let base = self.config.base_url.as_deref().unwrap_or_default();
        let mut builder = self.client.request(method, format!("{base}{path}"));
        if let Some(token) = &self.config.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

#[async_trait]
impl CiEngine for BuildServerEngine {
    async fn create_run(&self, request: &RunRequest) -> Result<ExternalRunId, EngineError> {
        if self.is_mock() {
            let id = format!("mock-{}", Uuid::new_v4());
            self.mock_runs.insert(
                id.clone(),
                MockRun {
                    request: request.clone(),
                    cancelled: false,
                },
            );
            debug!(external_id = %id, repo = %request.repo_id, "mock run created");
            return Ok(ExternalRunId(id));
        }

        let response = self
            .request(reqwest::Method::POST, "/api/runs")
            .json(request)
            .send()
            .await
            .map_err(|e| EngineError::Trigger(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::Trigger(format!(
                "backend returned {}",
                response.status()
            )));
        }

        let created: CreateRunResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Trigger(e.to_string()))?;
        Ok(ExternalRunId(created.id))
    }

    async fn cancel_run(&self, external_id: &ExternalRunId) -> Result<bool, EngineError> {
        if self.is_mock() {
            return Ok(self.mock_runs.mark_cancelled(&external_id.0));
        }

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/api/runs/{}/cancel", external_id),
            )
            .send()
            .await
            .map_err(|e| EngineError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            warn!(external_id = %external_id, status = %response.status(), "cancel not accepted");
        }
        Ok(response.status().is_success())
    }

    async fn artifacts(
        &self,
        external_id: &ExternalRunId,
    ) -> Result<Vec<EngineArtifact>, EngineError> {
        if self.is_mock() {
            return match self.mock_runs.get(&external_id.0) {
                Some(run) => Ok(vec![EngineArtifact {
                    name: "build.log".to_string(),
                    url: format!("mock://{}/{}/build.log", run.request.repo_id, external_id),
                }]),
                None => Err(EngineError::UnknownRun(external_id.0.clone())),
            };
        }

        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/api/runs/{}/artifacts", external_id),
            )
            .send()
            .await
            .map_err(|e| EngineError::Backend(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::UnknownRun(external_id.0.clone()));
        }
        response
            .json()
            .await
            .map_err(|e| EngineError::Backend(e.to_string()))
    }

    async fn logs(
        &self,
        external_id: &ExternalRunId,
        job_name: &str,
    ) -> Result<LogStream, EngineError> {
        if self.is_mock() {
            if self.mock_runs.get(&external_id.0).is_none() {
                return Err(EngineError::UnknownRun(external_id.0.clone()));
            }
            let chunks: Vec<std::io::Result<Bytes>> = vec![
                Ok(Bytes::from(format!("[{job_name}] mock run started\n"))),
                Ok(Bytes::from_static(b"all stages passed\n")),
            ];
            return Ok(futures::stream::iter(chunks).boxed());
        }

        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/api/runs/{}/logs?job={}", external_id, job_name),
            )
            .send()
            .await
            .map_err(|e| EngineError::Backend(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::UnknownRun(external_id.0.clone()));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> RunRequest {
        RunRequest {
            repo_id: "r1".to_string(),
            commit_sha: "abc123".to_string(),
            branch: "main".to_string(),
            workflow_id: "wf-build".to_string(),
            environment_id: None,
        }
    }

    #[tokio::test]
    async fn mock_create_returns_synthetic_id() {
        let engine = BuildServerEngine::mock();
        let id = engine.create_run(&sample_request()).await.unwrap();
        assert!(id.0.starts_with("mock-"));
    }

    #[tokio::test]
    async fn mock_cancel_known_and_unknown() {
        let engine = BuildServerEngine::mock();
        let id = engine.create_run(&sample_request()).await.unwrap();
        assert!(engine.cancel_run(&id).await.unwrap());
        assert!(!engine
            .cancel_run(&ExternalRunId("mock-nope".to_string()))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn mock_artifacts_and_logs() {
        let engine = BuildServerEngine::mock();
        let id = engine.create_run(&sample_request()).await.unwrap();

        let artifacts = engine.artifacts(&id).await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name, "build.log");

        let mut stream = engine.logs(&id, "build").await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        let text = String::from_utf8(collected).unwrap();
        assert!(text.contains("mock run started"));
    }

    #[tokio::test]
    async fn mock_unknown_run_is_an_error() {
        let engine = BuildServerEngine::mock();
        let missing = ExternalRunId("mock-missing".to_string());
        assert!(matches!(
            engine.artifacts(&missing).await.unwrap_err(),
            EngineError::UnknownRun(_)
        ));
        assert!(matches!(
            engine.logs(&missing, "build").await.err().unwrap(),
            EngineError::UnknownRun(_)
        ));
    }

    #[test]
    fn run_cache_evicts_oldest_at_capacity() {
        let cache = RunCache::new(2);
        let run = MockRun {
            request: sample_request(),
            cancelled: false,
        };
        cache.insert("a".to_string(), run.clone());
        cache.insert("b".to_string(), run.clone());
        cache.insert("c".to_string(), run);

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[tokio::test]
    async fn unreachable_backend_reports_trigger_failure() {
        // A configured but unreachable backend must surface Trigger, not panic.
        let engine = BuildServerEngine::new(BuildServerConfig {
            base_url: Some("http://127.0.0.1:1".to_string()),
            token: None,
        });
        let err = engine.create_run(&sample_request()).await.unwrap_err();
        assert!(matches!(err, EngineError::Trigger(_)));
    }
}
