//! Artifact store: streamed uploads hashed in the same pass they are
//! written, bound immutably to an ingested commit.

use std::path::PathBuf;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use anvil_state::{ArtifactIndex, ArtifactKind, ArtifactRecord, CommitStore, HexDigest};

use crate::domain::error::Result;
use crate::obs;

const CHUNK_SIZE: usize = 64 * 1024;

/// Streams artifact bytes to durable storage while computing their content
/// hash, then records the artifact-to-commit binding.
///
/// Every upload gets a fresh identifier, so concurrent uploads for the same
/// commit are independent and no locking is needed.
pub struct ArtifactStore {
    blob_dir: PathBuf,
    commits: Arc<dyn CommitStore>,
    index: Arc<dyn ArtifactIndex>,
}

impl ArtifactStore {
    /// Create a store rooted at `data_dir`. Blobs live under
    /// `data_dir/artifacts/`.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        commits: Arc<dyn CommitStore>,
        index: Arc<dyn ArtifactIndex>,
    ) -> std::io::Result<Self> {
        let blob_dir = data_dir.into().join("artifacts");
        std::fs::create_dir_all(&blob_dir)?;
        Ok(Self {
            blob_dir,
            commits,
            index,
        })
    }

    /// Upload an artifact for an already-ingested commit.
    ///
    /// Fails with NotFound before reading any bytes if the commit is
    /// unknown: an artifact can never exist for a commit the system has not
    /// ingested. The stream is consumed exactly once, feeding the blob file
    /// and the digest together, so the artifact is never buffered whole in
    /// memory. On stream error the partial `.part` file is abandoned
    /// (removed best-effort) and no index row is written.
    pub async fn upload<R>(
        &self,
        repo_id: &str,
        commit_sha: &str,
        name: &str,
        kind: ArtifactKind,
        mut reader: R,
    ) -> Result<ArtifactRecord>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.commits.get_commit(repo_id, commit_sha).await?;

        let part_path = self.blob_dir.join(format!("{}.part", Uuid::new_v4()));
        let mut file = fs::File::create(&part_path).await?;
        let mut hasher = Sha256::new();
        let mut size_bytes = 0u64;
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    self.abandon(&part_path).await;
                    return Err(err.into());
                }
            };
            hasher.update(&buf[..n]);
            if let Err(err) = file.write_all(&buf[..n]).await {
                self.abandon(&part_path).await;
                return Err(err.into());
            }
            size_bytes += n as u64;
        }

        if let Err(err) = file.flush().await {
            self.abandon(&part_path).await;
            return Err(err.into());
        }
        drop(file);

        let content_hash = HexDigest::from_hasher(hasher);
        let record = ArtifactRecord::new(repo_id, commit_sha, name, kind, content_hash, size_bytes);

        let final_path = self.blob_dir.join(&record.artifact_id);
        if let Err(err) = fs::rename(&part_path, &final_path).await {
            self.abandon(&part_path).await;
            return Err(err.into());
        }

        self.index.insert_artifact(record.clone()).await?;
        obs::emit_artifact_stored(&record);
        Ok(record)
    }

    /// Open the stored bytes of an artifact for reading.
    pub async fn open(&self, artifact_id: &str) -> Result<fs::File> {
        let record = self.index.get_artifact(artifact_id).await?;
        let file = fs::File::open(self.blob_dir.join(&record.artifact_id)).await?;
        Ok(file)
    }

    async fn abandon(&self, part_path: &std::path::Path) {
        // The row was never written, so a leftover file is unreferenced;
        // removal is best-effort.
        let _ = fs::remove_file(part_path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_state::fakes::{MemoryArtifactIndex, MemoryCommitStore};
    use anvil_state::{NewCommit, SignatureStatus};
    use chrono::{TimeZone, Utc};

    use crate::domain::error::AnvilError;

    async fn store_with_commit() -> (tempfile::TempDir, ArtifactStore) {
        let commits = Arc::new(MemoryCommitStore::new());
        commits
            .upsert_commit(NewCommit {
                repo_id: "r1".to_string(),
                sha: "abc123".to_string(),
                tree_sha: "t1".to_string(),
                parent_shas: vec![],
                author_name: "A".to_string(),
                author_email: "a@x.com".to_string(),
                authored_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                committer_name: "A".to_string(),
                committer_email: "a@x.com".to_string(),
                committed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                verification_hash: HexDigest::from_bytes(b"m"),
                author_user_id: None,
                signer_fingerprint: None,
                signature_status: SignatureStatus::Unsigned,
                message: "initial".to_string(),
            })
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(
            dir.path(),
            commits,
            Arc::new(MemoryArtifactIndex::new()),
        )
        .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn upload_hashes_while_writing() {
        let (_dir, store) = store_with_commit().await;
        let data = b"build output bytes".to_vec();

        let record = store
            .upload("r1", "abc123", "build.log", ArtifactKind::Log, data.as_slice())
            .await
            .unwrap();

        assert_eq!(record.content_hash, HexDigest::from_bytes(&data));
        assert_eq!(record.size_bytes, data.len() as u64);

        // Bytes read back from storage hash to the recorded digest.
        let mut file = store.open(&record.artifact_id).await.unwrap();
        let mut stored = Vec::new();
        file.read_to_end(&mut stored).await.unwrap();
        assert_eq!(stored, data);
    }

    #[tokio::test]
    async fn upload_to_unknown_commit_is_not_found() {
        let (dir, store) = store_with_commit().await;
        let err = store
            .upload("r1", "missing", "x", ArtifactKind::Other, &b"bytes"[..])
            .await
            .unwrap_err();
        assert!(matches!(err, AnvilError::NotFound(_)));

        // No partial file was created.
        let blobs: Vec<_> = std::fs::read_dir(dir.path().join("artifacts"))
            .unwrap()
            .collect();
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn stream_error_abandons_partial_file() {
        struct FailingReader {
            fed: bool,
        }
        impl AsyncRead for FailingReader {
            fn poll_read(
                mut self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                if !self.fed {
                    self.fed = true;
                    buf.put_slice(b"partial bytes");
                    std::task::Poll::Ready(Ok(()))
                } else {
                    std::task::Poll::Ready(Err(std::io::Error::other("client aborted")))
                }
            }
        }

        let (dir, store) = store_with_commit().await;
        let err = store
            .upload(
                "r1",
                "abc123",
                "broken",
                ArtifactKind::Other,
                FailingReader { fed: false },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AnvilError::Io(_)));

        let blobs: Vec<_> = std::fs::read_dir(dir.path().join("artifacts"))
            .unwrap()
            .collect();
        assert!(blobs.is_empty(), "partial file should have been removed");
    }

    #[tokio::test]
    async fn concurrent_uploads_get_independent_identifiers() {
        let (_dir, store) = store_with_commit().await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let data = format!("payload {i}").into_bytes();
                store
                    .upload("r1", "abc123", "log", ArtifactKind::Log, data.as_slice())
                    .await
                    .unwrap()
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            let record = handle.await.unwrap();
            ids.insert(record.artifact_id);
        }
        assert_eq!(ids.len(), 4);
    }
}
