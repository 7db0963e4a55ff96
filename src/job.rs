//! Serverless job handler.
//!
//! Takes one `{"input": {...}}` event and always produces a [`JobOutput`];
//! errors are folded into `{"status": "error", "message", "trace"}` rather
//! than returned.
//!
//! ## Stages
//!
//! 1. `ping` short-circuits with engine and version, touching nothing.
//! 2. The driver name and both media sources are validated.
//! 3. Inputs are downloaded or decoded.
//! 4. The pipeline is readied; for SadTalker the legacy checkpoint is fetched
//!    best effort.
//! 5. The video is generated.
//! 6. With `upload_url` the file is PUT there and `view_url` (or the local
//!    path) is reported; otherwise the configured publisher decides.

use crate::error::AvatarError;
use crate::pipeline::Driver;
use crate::schema::{JobEvent, JobInput, JobOutput};
use crate::service::AvatarService;
use tracing::{info, warn};

/// Handle a full job event.
pub async fn handle_event(service: &AvatarService, event: &JobEvent) -> JobOutput {
    handle_input(service, &event.input).await
}

/// Handle the `input` object of a job event.
pub async fn handle_input(service: &AvatarService, input: &JobInput) -> JobOutput {
    if input.is_ping() {
        return JobOutput::Ok {
            engine: input.driver_name().to_string(),
            app_version: service.config().app_version.clone(),
        };
    }

    match run(service, input).await {
        Ok(video_url) => JobOutput::Completed { video_url },
        Err(e) => {
            warn!("Job failed ({}): {e}", e.kind());
            JobOutput::Error {
                message: e.to_string(),
                trace: Some(e.trace()),
            }
        }
    }
}

async fn run(service: &AvatarService, input: &JobInput) -> Result<String, AvatarError> {
    let driver: Driver = input.driver_name().parse()?;
    info!("Job started: driver={driver}");

    let inputs = service.resolve_inputs(&input.image(), &input.audio()).await?;
    service.registry().ready(driver).await?;
    if driver == Driver::SadTalker {
        service.ensure_legacy_checkpoint().await;
    }
    let video = service.generate_from(driver, &inputs).await?;
    drop(inputs);

    match input.upload_url.as_deref().filter(|u| !u.is_empty()) {
        Some(upload_url) => {
            service
                .upload_presigned(upload_url, &video.path, input.content_type.as_deref())
                .await?;
            Ok(input
                .view_url
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| video.path_string()))
        }
        None => service.publish_or_local(&video).await,
    }
}
