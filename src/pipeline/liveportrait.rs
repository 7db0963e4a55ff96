//! LivePortrait placeholder.
//!
//! The driver name is accepted and readiness always succeeds, but there is no
//! inference backend behind it: every `generate` call returns
//! [`AvatarError::NotImplemented`].

use crate::error::AvatarError;
use crate::pipeline::{Driver, GeneratedVideo, GenerationPipeline};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

const NOT_IMPLEMENTED: &str = "LivePortrait inference not implemented yet";

#[derive(Debug, Default)]
pub struct LivePortraitPipeline {
    ready: AtomicBool,
}

impl LivePortraitPipeline {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GenerationPipeline for LivePortraitPipeline {
    fn driver(&self) -> Driver {
        Driver::LivePortrait
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn prepare(&self) -> Result<(), AvatarError> {
        if !self.ready.swap(true, Ordering::AcqRel) {
            debug!("LivePortrait placeholder marked ready");
        }
        Ok(())
    }

    async fn generate(&self, _image: &Path, _audio: &Path) -> Result<GeneratedVideo, AvatarError> {
        Err(AvatarError::NotImplemented(NOT_IMPLEMENTED.to_string()))
    }
}
