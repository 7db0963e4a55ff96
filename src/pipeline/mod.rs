//! Generation pipelines.
//!
//! The driver set is closed: [`Driver`] enumerates every backend the service
//! knows, and [`Pipeline`] is the matching tagged variant. Each variant
//! implements the [`GenerationPipeline`] capability interface.
//!
//! ## Lifecycle
//!
//! ```text
//! uninitialized ──prepare()──▶ ready ──generate()──▶ GeneratedVideo
//!                 (once)              (per request)
//! ```
//!
//! `prepare` may be expensive (asset checks, bootstrap scripts, CLI probing)
//! and runs at most once per instance; a failed attempt leaves the pipeline
//! uninitialized so the next request tries again. Instances hold no
//! per-request state and are shared across requests by
//! [`crate::registry::PipelineRegistry`].
//!
//! ## Submodules
//!
//! 1. [`input`]: URL / base64 payloads → local temp files
//! 2. [`sadtalker`]: the SadTalker CLI driver
//! 3. [`liveportrait`]: recognised placeholder without a backend

pub mod input;
pub mod liveportrait;
pub mod sadtalker;

use crate::config::ToolkitConfig;
use crate::error::AvatarError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use liveportrait::LivePortraitPipeline;
pub use sadtalker::SadTalkerPipeline;

/// A generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    SadTalker,
    LivePortrait,
}

impl Driver {
    pub const ALL: [Driver; 2] = [Driver::SadTalker, Driver::LivePortrait];

    pub fn as_str(self) -> &'static str {
        match self {
            Driver::SadTalker => "sadtalker",
            Driver::LivePortrait => "liveportrait",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Driver {
    type Err = AvatarError;

    /// Exact, case-sensitive match on the wire name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Driver::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| AvatarError::UnknownDriver(s.to_string()))
    }
}

/// A video produced by a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedVideo {
    pub path: PathBuf,
}

impl GeneratedVideo {
    /// The path as a string, for responses that expose local files.
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// What every driver can do.
#[async_trait]
pub trait GenerationPipeline: Send + Sync {
    fn driver(&self) -> Driver;

    fn is_ready(&self) -> bool;

    /// Transition to ready. Idempotent once it has succeeded.
    async fn prepare(&self) -> Result<(), AvatarError>;

    /// Produce a video from a local image and audio file.
    async fn generate(&self, image: &Path, audio: &Path) -> Result<GeneratedVideo, AvatarError>;
}

/// The closed set of pipeline implementations.
#[derive(Debug)]
pub enum Pipeline {
    SadTalker(SadTalkerPipeline),
    LivePortrait(LivePortraitPipeline),
}

impl Pipeline {
    /// Construct the uninitialized pipeline for `driver`.
    pub fn new(driver: Driver, toolkit: &ToolkitConfig) -> Self {
        match driver {
            Driver::SadTalker => Pipeline::SadTalker(SadTalkerPipeline::new(toolkit.clone())),
            Driver::LivePortrait => Pipeline::LivePortrait(LivePortraitPipeline::new()),
        }
    }

    fn inner(&self) -> &dyn GenerationPipeline {
        match self {
            Pipeline::SadTalker(p) => p,
            Pipeline::LivePortrait(p) => p,
        }
    }

    pub fn driver(&self) -> Driver {
        self.inner().driver()
    }

    pub fn is_ready(&self) -> bool {
        self.inner().is_ready()
    }

    pub async fn prepare(&self) -> Result<(), AvatarError> {
        self.inner().prepare().await
    }

    pub async fn generate(&self, image: &Path, audio: &Path) -> Result<GeneratedVideo, AvatarError> {
        self.inner().generate(image, audio).await
    }
}
