//! SadTalker driver: run `inference.py` from a local checkout.
//!
//! ## Readiness
//!
//! 1. The checkout root must be a directory, else [`AvatarError::MissingDependency`].
//! 2. Model assets must be present; when they are not, the checkout's own
//!    bootstrap script is run (see [`sadtalker_assets::ModelAssets`]). Failure
//!    is [`AvatarError::SetupFailed`].
//! 3. `inference.py --help` is probed once for optional flags. The probe is
//!    best effort: any failure means "unsupported", and the result is cached
//!    for the lifetime of the instance.
//!
//! ## Generation
//!
//! The command line is assembled from [`ToolkitConfig`] by [`build_args`],
//! the process runs to completion in a fresh output directory, and the newest
//! `*.mp4` below that directory is returned. Picking the newest file is a
//! heuristic: if the toolkit ever writes several videos, the last one written
//! wins.

use crate::config::ToolkitConfig;
use crate::error::AvatarError;
use crate::pipeline::{Driver, GeneratedVideo, GenerationPipeline};
use async_trait::async_trait;
use sadtalker_assets::ModelAssets;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const TOOL: &str = "SadTalker";

/// Entry point inside the checkout.
pub const INFERENCE_SCRIPT: &str = "inference.py";

/// Optional frame-rate flag; only newer SadTalker revisions accept it.
pub const FPS_FLAG: &str = "--fps";

const VIDEO_EXTENSION: &str = "mp4";

/// How much of the toolkit's stderr is kept in error messages.
const STDERR_TAIL_CHARS: usize = 2000;

/// Optional CLI features detected during readiness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// `inference.py` advertises [`FPS_FLAG`].
    pub fps_flag: bool,
}

/// The SadTalker pipeline.
#[derive(Debug)]
pub struct SadTalkerPipeline {
    config: ToolkitConfig,
    capabilities: OnceCell<Capabilities>,
}

impl SadTalkerPipeline {
    pub fn new(config: ToolkitConfig) -> Self {
        Self {
            config,
            capabilities: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &ToolkitConfig {
        &self.config
    }

    /// Capabilities detected by a successful readiness step, if any.
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.capabilities.get().copied()
    }

    async fn ready_capabilities(&self) -> Result<Capabilities, AvatarError> {
        self.capabilities
            .get_or_try_init(|| self.initialize())
            .await
            .copied()
    }

    async fn initialize(&self) -> Result<Capabilities, AvatarError> {
        let start = Instant::now();
        let root = self.config.root.clone();
        if !root.is_dir() {
            return Err(AvatarError::MissingDependency { root });
        }

        let assets = ModelAssets::new(&root);
        tokio::task::spawn_blocking(move || assets.ensure_models())
            .await
            .map_err(|e| AvatarError::Internal(format!("asset check panicked: {e}")))??;

        let fps_flag = probe_flag(&self.config, FPS_FLAG).await;
        let caps = Capabilities { fps_flag };

        info!(
            "SadTalker ready at {} in {}ms ({caps:?})",
            root.display(),
            start.elapsed().as_millis()
        );
        Ok(caps)
    }
}

#[async_trait]
impl GenerationPipeline for SadTalkerPipeline {
    fn driver(&self) -> Driver {
        Driver::SadTalker
    }

    fn is_ready(&self) -> bool {
        self.capabilities.initialized()
    }

    async fn prepare(&self) -> Result<(), AvatarError> {
        self.ready_capabilities().await.map(|_| ())
    }

    async fn generate(&self, image: &Path, audio: &Path) -> Result<GeneratedVideo, AvatarError> {
        let caps = self.ready_capabilities().await?;

        // Kept on disk: the caller may hand this path back to the client.
        let outdir = tempfile::Builder::new()
            .prefix("sadtalker_")
            .tempdir()
            .map_err(|e| AvatarError::io("Failed to create output directory", e))?
            .keep();

        let args = build_args(&self.config, caps, image, audio, &outdir);
        debug!("Running {} {:?} in {}", self.config.python.display(), args, self.config.root.display());

        let start = Instant::now();
        let output = Command::new(&self.config.python)
            .args(&args)
            .current_dir(&self.config.root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AvatarError::ExternalToolFailure {
                tool: TOOL.to_string(),
                status: "spawn failed".to_string(),
                stderr: format!("{}: {e}", self.config.python.display()),
            })?;

        if !output.status.success() {
            return Err(AvatarError::ExternalToolFailure {
                tool: TOOL.to_string(),
                status: output.status.to_string(),
                stderr: tail(&output.stderr, STDERR_TAIL_CHARS),
            });
        }
        info!("SadTalker finished in {}ms", start.elapsed().as_millis());

        let path = find_newest_video(&outdir).ok_or_else(|| AvatarError::NoOutputProduced {
            tool: TOOL.to_string(),
            dir: outdir.clone(),
        })?;
        debug!("Selected output {}", path.display());

        Ok(GeneratedVideo { path })
    }
}

/// Assemble the `inference.py` argument list.
pub fn build_args(
    config: &ToolkitConfig,
    caps: Capabilities,
    image: &Path,
    audio: &Path,
    outdir: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        INFERENCE_SCRIPT.into(),
        "--driven_audio".into(),
        audio.into(),
        "--source_image".into(),
        image.into(),
        "--result_dir".into(),
        outdir.into(),
    ];

    if config.still {
        args.push("--still".into());
    }

    args.push("--preprocess".into());
    args.push(config.preprocess.as_str().into());

    if let Some(size) = config.size {
        args.push("--size".into());
        args.push(size.to_string().into());
    }

    if let Some(fps) = config.fps {
        if caps.fps_flag {
            args.push(FPS_FLAG.into());
            args.push(fps.to_string().into());
        } else {
            debug!("SADTALKER_FPS={fps} ignored: toolkit does not accept {FPS_FLAG}");
        }
    }

    if let Some(ref enhancer) = config.enhancer {
        args.push("--enhancer".into());
        args.push(enhancer.into());
    }

    args
}

/// Ask `inference.py --help` whether it accepts `flag`.
///
/// Never fails: spawn errors, non-zero exits and timeouts all count as
/// "unsupported".
pub async fn probe_flag(config: &ToolkitConfig, flag: &str) -> bool {
    let mut cmd = Command::new(&config.python);
    cmd.arg(INFERENCE_SCRIPT)
        .arg("--help")
        .current_dir(&config.root)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let timeout = Duration::from_secs(config.probe_timeout_secs);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(out)) if out.status.success() => {
            let mut help = String::from_utf8_lossy(&out.stdout).into_owned();
            help.push_str(&String::from_utf8_lossy(&out.stderr));
            let supported = help_mentions(&help, flag);
            debug!("Probe {flag}: {supported}");
            supported
        }
        Ok(Ok(out)) => {
            warn!("Capability probe exited with {}; assuming {flag} unsupported", out.status);
            false
        }
        Ok(Err(e)) => {
            warn!("Capability probe failed to start: {e}; assuming {flag} unsupported");
            false
        }
        Err(_) => {
            warn!("Capability probe timed out after {}s; assuming {flag} unsupported", timeout.as_secs());
            false
        }
    }
}

/// Whole-token match so `--fps` does not match `--fps_scale`.
fn help_mentions(help: &str, flag: &str) -> bool {
    help.split(|c: char| c.is_whitespace() || matches!(c, ',' | '[' | ']' | '=' | '|'))
        .any(|token| token == flag)
}

/// Newest `*.mp4` anywhere below `dir`, by modification time.
pub fn find_newest_video(dir: &Path) -> Option<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.eq_ignore_ascii_case(VIDEO_EXTENSION))
        })
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((modified, e.into_path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

fn tail(bytes: &[u8], max_chars: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let skipped: String = text.chars().skip(count - max_chars).collect();
    format!("…{skipped}")
}
