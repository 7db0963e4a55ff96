//! Output publishing.
//!
//! A [`Publisher`] turns a local video into a URL the client can fetch. With
//! no provider configured the video stays local and the caller reports its
//! path instead.
//!
//! | Provider | Type                | Result                       |
//! |----------|---------------------|------------------------------|
//! | `none`   | [`NoUpload`]        | `None`                       |
//! | `gcs`    | [`GcsPublisher`]    | public or V4-signed URL      |
//!
//! The job handler can bypass the publisher entirely with a caller-supplied
//! presigned URL; see [`put_presigned`].

pub mod gcs;
pub mod presigned;

use crate::config::{UploadConfig, UploadProvider};
use crate::error::AvatarError;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub use gcs::GcsPublisher;
pub use presigned::put_presigned;

/// Content type of every published video.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Uploads a generated video somewhere reachable.
#[async_trait]
pub trait Publisher: Send + Sync + fmt::Debug {
    /// Publish `path`. `Ok(None)` means nothing was uploaded.
    async fn publish(&self, path: &Path) -> Result<Option<String>, AvatarError>;
}

/// Keeps videos local.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUpload;

#[async_trait]
impl Publisher for NoUpload {
    async fn publish(&self, _path: &Path) -> Result<Option<String>, AvatarError> {
        Ok(None)
    }
}

/// Build the publisher selected by `config`.
///
/// Never fails: GCS settings (bucket, credentials) are checked when a video
/// is actually published, so a misconfigured bucket only affects requests
/// that reach the upload stage.
pub fn publisher_from_config(config: &UploadConfig, client: reqwest::Client) -> Arc<dyn Publisher> {
    match config.provider {
        UploadProvider::None => Arc::new(NoUpload),
        UploadProvider::Gcs => Arc::new(GcsPublisher::new(config.clone(), client)),
    }
}
