//! Input resolution: turn a request's URL or base64 payload into a local file.
//!
//! ## Why a temp file?
//!
//! The toolkit is an external process and only accepts file-system paths.
//! Each input is written to a [`NamedTempFile`] carrying the caller's suffix
//! (`.png`, `.wav`); the suffix is an extension hint for the toolkit and is
//! never checked against the content. The file lives as long as the returned
//! [`ResolvedMedia`], so inputs are removed once the request finishes instead
//! of piling up in `/tmp` for the life of the container.
//!
//! No content-type or size validation happens here.

use crate::error::AvatarError;
use crate::schema::MediaSource;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// A media input materialised on local disk.
#[derive(Debug)]
pub struct ResolvedMedia {
    file: NamedTempFile,
    origin: MediaOrigin,
}

/// Where the bytes of a [`ResolvedMedia`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaOrigin {
    Downloaded,
    Inline,
}

impl ResolvedMedia {
    /// Path of the local copy, valid while `self` is alive.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn origin(&self) -> MediaOrigin {
        self.origin
    }
}

/// Check that a media source names at least one of URL or base64.
pub fn require_source(source: &MediaSource<'_>, what: &str) -> Result<(), AvatarError> {
    if source.is_empty() {
        return Err(AvatarError::InvalidInput(format!(
            "Either {what}_url or {what}_b64 must be provided"
        )));
    }
    Ok(())
}

/// Resolve `source` into a temp file ending in `suffix`.
///
/// The URL wins when both fields are set.
pub async fn resolve_media(
    client: &reqwest::Client,
    source: &MediaSource<'_>,
    suffix: &str,
    timeout: Duration,
) -> Result<ResolvedMedia, AvatarError> {
    if let Some(url) = source.url {
        let bytes = download(client, url, timeout).await?;
        let file = write_temp(&bytes, suffix)?;
        info!("Downloaded {} bytes from {} to {}", bytes.len(), url, file.path().display());
        return Ok(ResolvedMedia {
            file,
            origin: MediaOrigin::Downloaded,
        });
    }

    if let Some(b64) = source.b64 {
        let bytes = decode_inline(b64)?;
        let file = write_temp(&bytes, suffix)?;
        debug!("Decoded {} inline bytes to {}", bytes.len(), file.path().display());
        return Ok(ResolvedMedia {
            file,
            origin: MediaOrigin::Inline,
        });
    }

    Err(AvatarError::InvalidInput(
        "Either url or b64 must be provided".to_string(),
    ))
}

/// Decode raw base64 or a data URL (`data:image/png;base64,....`).
///
/// Everything up to the first comma is treated as a prefix and dropped.
/// Whitespace, including line wrapping, is ignored.
pub fn decode_inline(payload: &str) -> Result<Vec<u8>, AvatarError> {
    let data = match payload.split_once(',') {
        Some((_, rest)) => rest,
        None => payload,
    };
    let data: String = data.split_ascii_whitespace().collect();
    STANDARD
        .decode(data)
        .map_err(|e| AvatarError::InvalidInput(format!("Invalid base64 payload: {e}")))
}

async fn download(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, AvatarError> {
    let fetch_err = |reason: String| AvatarError::FetchError {
        url: url.to_string(),
        reason,
    };

    let response = client.get(url).timeout(timeout).send().await.map_err(|e| {
        if e.is_timeout() {
            fetch_err(format!("timed out after {}s", timeout.as_secs()))
        } else {
            fetch_err(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(fetch_err(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
    Ok(bytes.to_vec())
}

fn write_temp(bytes: &[u8], suffix: &str) -> Result<NamedTempFile, AvatarError> {
    let mut file = tempfile::Builder::new()
        .prefix("avatar_input_")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| AvatarError::io("Failed to create temp file", e))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| AvatarError::io("Failed to write temp file", e))?;
    Ok(file)
}
