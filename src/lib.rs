//! # avatar-service
//!
//! Generate talking-head videos from a face image and a speech clip.
//!
//! ## Why this crate?
//!
//! The lip-sync toolkits that do the actual work (SadTalker today) are Python
//! research checkouts driven from the command line. This crate wraps one in a
//! service: it resolves remote or inline inputs to files, readies the toolkit
//! once per process, runs it as a subprocess, finds the video it produced and
//! publishes it to object storage.
//!
//! ## Pipeline Overview
//!
//! ```text
//! request {image, audio, driver}
//!  │
//!  ├─ 1. Validate  driver name + both media sources, before any I/O
//!  ├─ 2. Input     download URL or decode base64 → temp files
//!  ├─ 3. Ready     toolkit present, assets fetched, CLI probed (once)
//!  ├─ 4. Generate  python inference.py … → newest *.mp4
//!  └─ 5. Publish   GCS (public / V4-signed), presigned PUT, or local path
//! ```
//!
//! Two entry points share this flow: an HTTP server ([`server`]) and a
//! serverless job handler ([`job`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use avatar_service::{AvatarService, ServiceConfig, server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // SADTALKER_ROOT, UPLOAD_PROVIDER, MEDIA_BUCKET, …
//!     let service = AvatarService::new(ServiceConfig::from_env())?;
//!     server::serve(Arc::new(service), "0.0.0.0:8000".parse()?).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `avatar` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when embedding the library:
//! ```toml
//! avatar-service = { version = "0.1", default-features = false }
//! ```
//!
//! ## Drivers
//!
//! | Driver | Status |
//! |--------|--------|
//! | `sadtalker` | Runs `inference.py` from `SADTALKER_ROOT` |
//! | `liveportrait` | Accepted, answers with a not-implemented error |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod publish;
pub mod registry;
pub mod schema;
pub mod server;
pub mod service;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CredentialSource, PreprocessMode, ServiceConfig, ServiceConfigBuilder, ToolkitConfig,
    UploadConfig, UploadProvider,
};
pub use error::AvatarError;
pub use job::{handle_event, handle_input};
pub use pipeline::{Driver, GeneratedVideo, GenerationPipeline, Pipeline};
pub use publish::{GcsPublisher, NoUpload, Publisher};
pub use registry::PipelineRegistry;
pub use schema::{GenerateRequest, GenerateResponse, JobEvent, JobInput, JobOutput, MediaSource};
pub use service::AvatarService;
