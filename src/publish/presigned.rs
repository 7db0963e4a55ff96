//! Upload to a caller-supplied presigned URL.

use crate::error::AvatarError;
use crate::publish::VIDEO_CONTENT_TYPE;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// PUT the file at `path` to `url`.
///
/// Only `200 OK` and `201 Created` count as success; anything else is an
/// [`AvatarError::UploadError`] carrying the status and the start of the body.
pub async fn put_presigned(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
    content_type: Option<&str>,
    timeout: Duration,
) -> Result<(), AvatarError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AvatarError::io(format!("Failed to read {}", path.display()), e))?;
    let size = bytes.len();
    let content_type = content_type
        .filter(|c| !c.is_empty())
        .unwrap_or(VIDEO_CONTENT_TYPE);

    let response = client
        .put(url)
        .header(CONTENT_TYPE, content_type)
        .timeout(timeout)
        .body(bytes)
        .send()
        .await
        .map_err(|e| AvatarError::UploadError(format!("PUT to presigned URL failed: {e}")))?;

    let status = response.status();
    if status != StatusCode::OK && status != StatusCode::CREATED {
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        return Err(AvatarError::UploadError(format!(
            "{} {snippet}",
            status.as_u16()
        )));
    }

    info!("Uploaded {size} bytes to presigned URL ({status})");
    Ok(())
}
