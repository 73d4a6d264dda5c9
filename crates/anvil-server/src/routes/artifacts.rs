//! Artifact upload endpoint.

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;
use tracing::info;

use anvil_state::{ArtifactKind, ArtifactRecord};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Artifact classification; defaults to OTHER.
    pub kind: Option<ArtifactKind>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub artifact: ArtifactRecord,
}

/// `POST /repos/{repo_id}/commits/{sha}/artifacts`
///
/// Multipart body with one file part. The part is streamed straight into
/// the artifact store (hashed while written), never buffered whole. 404 when
/// the commit was never ingested, 400 when no file part is present.
pub async fn upload_artifact(
    State(state): State<AppState>,
    Path((repo_id, sha)): Path<(String, String)>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let kind = query.kind.unwrap_or(ArtifactKind::Other);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        if field.file_name().is_none() && field.name() != Some("file") {
            continue;
        }

        let name = field
            .file_name()
            .unwrap_or("artifact")
            .to_string();
        let reader = StreamReader::new(field.map_err(std::io::Error::other));

        let artifact = state
            .artifacts
            .upload(&repo_id, &sha, &name, kind, reader)
            .await?;

        info!(repo = %repo_id, sha = %sha, artifact_id = %artifact.artifact_id, "artifact uploaded");
        return Ok(Json(UploadResponse {
            status: "ok",
            artifact,
        }));
    }

    Err(ApiError::bad_request("no file part in upload"))
}
