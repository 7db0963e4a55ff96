//! The avatar service: shared state behind both entry points.
//!
//! ```text
//!  request ─▶ validate ─▶ resolve inputs ─▶ registry.ready(driver)
//!                                                │
//!                          publish / PUT ◀─ generate
//! ```
//!
//! One [`AvatarService`] is built at startup and shared through an `Arc`. It
//! owns the configuration, the [`PipelineRegistry`], the HTTP client used for
//! input downloads and uploads, and the configured [`Publisher`].

use crate::config::ServiceConfig;
use crate::error::AvatarError;
use crate::pipeline::input::{require_source, resolve_media, ResolvedMedia};
use crate::pipeline::{Driver, GeneratedVideo};
use crate::publish::{publisher_from_config, put_presigned, Publisher};
use crate::registry::PipelineRegistry;
use crate::schema::MediaSource;
use sadtalker_assets::ModelAssets;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Progress callback for the legacy checkpoint download: `(downloaded, total)`.
pub type DownloadProgress = Box<dyn Fn(u64, Option<u64>) + Send>;

/// Both inputs of a request, materialised on disk.
///
/// The temp files are removed when this value is dropped.
#[derive(Debug)]
pub struct RequestInputs {
    pub image: ResolvedMedia,
    pub audio: ResolvedMedia,
}

#[derive(Debug)]
pub struct AvatarService {
    config: ServiceConfig,
    registry: PipelineRegistry,
    publisher: Arc<dyn Publisher>,
    client: reqwest::Client,
}

impl AvatarService {
    /// Build the service and the publisher selected by `config.upload`.
    pub fn new(config: ServiceConfig) -> Result<Self, AvatarError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("avatar-service/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AvatarError::Internal(format!("Failed to build HTTP client: {e}")))?;
        let publisher = publisher_from_config(&config.upload, client.clone());
        let registry = PipelineRegistry::new(config.toolkit.clone());

        Ok(Self {
            config,
            registry,
            publisher,
            client,
        })
    }

    /// Replace the configured publisher.
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Check both sources, then download or decode them.
    ///
    /// Both sources are checked before any I/O, so a request missing its
    /// audio never downloads the image.
    pub async fn resolve_inputs(
        &self,
        image: &MediaSource<'_>,
        audio: &MediaSource<'_>,
    ) -> Result<RequestInputs, AvatarError> {
        require_source(image, "image")?;
        require_source(audio, "audio")?;

        let timeout = Duration::from_secs(self.config.fetch_timeout_secs);
        let image = resolve_media(&self.client, image, ".png", timeout).await?;
        let audio = resolve_media(&self.client, audio, ".wav", timeout).await?;
        Ok(RequestInputs { image, audio })
    }

    /// Run `driver` on already resolved inputs.
    pub async fn generate_from(
        &self,
        driver: Driver,
        inputs: &RequestInputs,
    ) -> Result<GeneratedVideo, AvatarError> {
        let pipeline = self.registry.ready(driver).await?;
        let start = Instant::now();
        let video = pipeline
            .generate(inputs.image.path(), inputs.audio.path())
            .await?;
        info!(
            "{driver} generated {} in {}ms",
            video.path.display(),
            start.elapsed().as_millis()
        );
        Ok(video)
    }

    /// Resolve inputs, ready the pipeline and generate a video.
    pub async fn generate_video(
        &self,
        driver: Driver,
        image: &MediaSource<'_>,
        audio: &MediaSource<'_>,
    ) -> Result<GeneratedVideo, AvatarError> {
        let inputs = self.resolve_inputs(image, audio).await?;
        self.generate_from(driver, &inputs).await
    }

    /// Publish `video`, or fall back to its local path when no provider is
    /// configured.
    pub async fn publish_or_local(&self, video: &GeneratedVideo) -> Result<String, AvatarError> {
        match self.publisher.publish(&video.path).await? {
            Some(url) => Ok(url),
            None => {
                debug!("No upload provider; returning local path");
                Ok(video.path_string())
            }
        }
    }

    /// PUT `path` to a caller-supplied presigned URL.
    pub async fn upload_presigned(
        &self,
        url: &str,
        path: &Path,
        content_type: Option<&str>,
    ) -> Result<(), AvatarError> {
        let timeout = Duration::from_secs(self.config.presigned_put_timeout_secs);
        put_presigned(&self.client, url, path, content_type, timeout).await
    }

    /// Download the legacy SadTalker checkpoint if it is configured and absent.
    ///
    /// Returns `Ok(None)` when the download is disabled.
    pub async fn fetch_legacy_checkpoint(
        &self,
        on_progress: Option<DownloadProgress>,
    ) -> Result<Option<PathBuf>, AvatarError> {
        let Some(url) = self.config.toolkit.legacy_checkpoint_url.clone() else {
            debug!("Legacy checkpoint download disabled");
            return Ok(None);
        };
        let assets = ModelAssets::new(&self.config.toolkit.root);

        let path = tokio::task::spawn_blocking(move || {
            let progress = on_progress
                .as_deref()
                .map(|f| f as &dyn Fn(u64, Option<u64>));
            assets.ensure_legacy_checkpoint(&url, progress)
        })
        .await
        .map_err(|e| AvatarError::Internal(format!("checkpoint download panicked: {e}")))??;

        Ok(Some(path))
    }

    /// [`Self::fetch_legacy_checkpoint`] without progress, logging failures
    /// instead of returning them.
    pub async fn ensure_legacy_checkpoint(&self) {
        match self.fetch_legacy_checkpoint(None).await {
            Ok(Some(path)) => debug!("Legacy checkpoint at {}", path.display()),
            Ok(None) => {}
            Err(e) => warn!("Legacy checkpoint unavailable, continuing: {e}"),
        }
    }
}
