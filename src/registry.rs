//! Pipeline registry.
//!
//! Owns at most one [`Pipeline`] per [`Driver`]. Pipelines are built lazily
//! on first use and live until the registry is dropped; the registry itself is
//! held by [`crate::service::AvatarService`] and passed to every handler.

use crate::config::ToolkitConfig;
use crate::error::AvatarError;
use crate::pipeline::{Driver, Pipeline};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug)]
pub struct PipelineRegistry {
    toolkit: ToolkitConfig,
    pipelines: Mutex<HashMap<Driver, Arc<Pipeline>>>,
}

impl PipelineRegistry {
    pub fn new(toolkit: ToolkitConfig) -> Self {
        Self {
            toolkit,
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    /// Shared handle to the pipeline for `driver`, constructing it on first
    /// use. The returned pipeline may not be ready yet.
    pub fn get(&self, driver: Driver) -> Arc<Pipeline> {
        let mut pipelines = self
            .pipelines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pipelines
            .entry(driver)
            .or_insert_with(|| {
                debug!("Constructing {driver} pipeline");
                Arc::new(Pipeline::new(driver, &self.toolkit))
            })
            .clone()
    }

    /// Shared handle to a pipeline that has completed its readiness step.
    ///
    /// Readiness runs at most once per pipeline; after a failure the next
    /// call tries again.
    pub async fn ready(&self, driver: Driver) -> Result<Arc<Pipeline>, AvatarError> {
        let pipeline = self.get(driver);
        pipeline.prepare().await?;
        Ok(pipeline)
    }

    /// Whether `driver` has been constructed.
    pub fn contains(&self, driver: Driver) -> bool {
        self.with_pipelines(|m| m.contains_key(&driver))
    }

    pub fn len(&self) -> usize {
        self.with_pipelines(|m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_pipelines<T>(&self, f: impl FnOnce(&HashMap<Driver, Arc<Pipeline>>) -> T) -> T {
        let pipelines = self
            .pipelines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&pipelines)
    }
}
