//! # sadtalker-assets
//!
//! Verify and bootstrap the model assets a [SadTalker](https://github.com/OpenTalker/SadTalker)
//! checkout needs before `inference.py` can run.
//!
//! ## How it works
//!
//! A checkout is considered complete when both asset directories exist:
//!
//! | Directory          | Contents                          |
//! |--------------------|-----------------------------------|
//! | `checkpoints/`     | SadTalker safetensors / `.pth`    |
//! | `gfpgan/weights/`  | GFPGAN face-enhancer weights      |
//!
//! When either is missing, [`ModelAssets::ensure_models`] runs the checkout's
//! own `scripts/download_models.sh` with `bash`, from the checkout root.
//!
//! Some SadTalker code paths still fall back to the legacy `epoch_20.pth`
//! checkpoint. [`ModelAssets::ensure_legacy_checkpoint`] downloads it into
//! `checkpoints/` on demand, streaming with progress callbacks. Callers treat
//! that step as best effort.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sadtalker_assets::{ModelAssets, LEGACY_CHECKPOINT_URL};
//!
//! let assets = ModelAssets::new("/opt/SadTalker");
//! assets.ensure_models().expect("SadTalker assets unavailable");
//!
//! let path = assets
//!     .ensure_legacy_checkpoint(LEGACY_CHECKPOINT_URL, Some(&|downloaded, total| {
//!         if let Some(t) = total {
//!             eprint!("\rDownloading checkpoint: {}/{} bytes", downloaded, t);
//!         }
//!     }))
//!     .expect("download failed");
//! println!("legacy checkpoint at {}", path.display());
//! ```
//!
//! All functions here are blocking. Call them from `spawn_blocking` inside an
//! async runtime.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

// ── Public constants ─────────────────────────────────────────────────────────

/// Release asset for the legacy SadTalker checkpoint.
pub const LEGACY_CHECKPOINT_URL: &str =
    "https://github.com/Winfredy/SadTalker/releases/download/v0.0.2/epoch_20.pth";

/// File name of the legacy checkpoint inside `checkpoints/`.
pub const LEGACY_CHECKPOINT_NAME: &str = "epoch_20.pth";

/// Bootstrap script path, relative to the checkout root.
pub const DOWNLOAD_SCRIPT: &str = "scripts/download_models.sh";

/// Overall timeout for the legacy checkpoint download.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by sadtalker-assets operations.
#[derive(Error, Debug)]
pub enum AssetError {
    /// Asset directories are missing and there is no script to fetch them.
    #[error(
        "SadTalker assets are missing and no bootstrap script exists at '{path}'.\n\
         The checkout is incomplete; point SADTALKER_ROOT at a full clone."
    )]
    ScriptMissing { path: PathBuf },

    /// `bash` could not be started.
    #[error("Failed to launch asset bootstrap script: {0}")]
    ScriptSpawn(#[source] std::io::Error),

    /// The bootstrap script ran but reported failure.
    #[error("Asset bootstrap script '{path}' exited with {status}")]
    ScriptFailed { path: PathBuf, status: String },

    /// Could not create or write inside `checkpoints/`.
    #[error("Checkpoint directory error: {0}")]
    CheckpointDir(#[source] std::io::Error),

    /// Network download failed.
    #[error("Download failed: {0}")]
    Download(String),
}

// ── Model assets ─────────────────────────────────────────────────────────────

/// Asset layout of one SadTalker checkout.
#[derive(Debug, Clone)]
pub struct ModelAssets {
    root: PathBuf,
}

impl ModelAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join("checkpoints")
    }

    pub fn gfpgan_weights_dir(&self) -> PathBuf {
        self.root.join("gfpgan").join("weights")
    }

    pub fn download_script(&self) -> PathBuf {
        self.root.join(DOWNLOAD_SCRIPT)
    }

    pub fn legacy_checkpoint_path(&self) -> PathBuf {
        self.checkpoints_dir().join(LEGACY_CHECKPOINT_NAME)
    }

    /// Returns `true` when both asset directories are present.
    pub fn is_complete(&self) -> bool {
        self.checkpoints_dir().is_dir() && self.gfpgan_weights_dir().is_dir()
    }

    /// Make sure the asset directories exist, running the bootstrap script
    /// when they do not.
    ///
    /// The script is not re-checked afterwards: a zero exit is trusted.
    pub fn ensure_models(&self) -> Result<(), AssetError> {
        if self.is_complete() {
            debug!("SadTalker assets present under {}", self.root.display());
            return Ok(());
        }

        let script = self.download_script();
        if !script.is_file() {
            return Err(AssetError::ScriptMissing { path: script });
        }

        info!("Fetching SadTalker assets via {}", script.display());
        let status = Command::new("bash")
            .arg(&script)
            .current_dir(&self.root)
            .status()
            .map_err(AssetError::ScriptSpawn)?;

        if !status.success() {
            return Err(AssetError::ScriptFailed {
                path: script,
                status: status.to_string(),
            });
        }

        Ok(())
    }

    /// Download the legacy checkpoint from `url` unless it is already on disk.
    ///
    /// `on_progress` receives `(bytes_downloaded, total_size_option)` for every
    /// 1 MiB chunk. The file is written to a `.part` sibling and renamed into
    /// place, so an interrupted download never leaves a truncated checkpoint.
    pub fn ensure_legacy_checkpoint(
        &self,
        url: &str,
        on_progress: Option<&dyn Fn(u64, Option<u64>)>,
    ) -> Result<PathBuf, AssetError> {
        let dest = self.legacy_checkpoint_path();
        if dest.is_file() {
            return Ok(dest);
        }

        std::fs::create_dir_all(self.checkpoints_dir()).map_err(AssetError::CheckpointDir)?;

        info!("Downloading legacy checkpoint from {url}");
        let partial = dest.with_extension("pth.part");
        download_to_file(url, &partial, on_progress)?;
        std::fs::rename(&partial, &dest).map_err(AssetError::CheckpointDir)?;

        Ok(dest)
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────────

/// Streams a URL into `dest`, calling `on_progress` every 1 MiB.
fn download_to_file(
    url: &str,
    dest: &Path,
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<(), AssetError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("sadtalker-assets/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| AssetError::Download(e.to_string()))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| AssetError::Download(format!("GET {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(AssetError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let mut file = File::create(dest).map_err(AssetError::CheckpointDir)?;
    let mut chunk = vec![0u8; 1024 * 1024];
    let mut downloaded: u64 = 0;

    loop {
        match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                file.write_all(&chunk[..n])
                    .map_err(AssetError::CheckpointDir)?;
                downloaded += n as u64;
                if let Some(cb) = on_progress {
                    cb(downloaded, total);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(AssetError::Download(format!("Read error: {e}")));
            }
        }
    }

    file.flush().map_err(AssetError::CheckpointDir)?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(root: &Path) {
        std::fs::create_dir_all(root.join("checkpoints")).unwrap();
        std::fs::create_dir_all(root.join("gfpgan/weights")).unwrap();
    }

    #[test]
    fn layout_is_relative_to_root() {
        let assets = ModelAssets::new("/opt/SadTalker");
        assert_eq!(assets.checkpoints_dir(), PathBuf::from("/opt/SadTalker/checkpoints"));
        assert_eq!(
            assets.gfpgan_weights_dir(),
            PathBuf::from("/opt/SadTalker/gfpgan/weights")
        );
        assert_eq!(
            assets.legacy_checkpoint_path(),
            PathBuf::from("/opt/SadTalker/checkpoints/epoch_20.pth")
        );
    }

    #[test]
    fn complete_checkout_needs_no_script() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let assets = ModelAssets::new(dir.path());
        assert!(assets.is_complete());
        assets.ensure_models().expect("complete checkout should pass");
    }

    #[test]
    fn missing_assets_without_script_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("checkpoints")).unwrap();
        let assets = ModelAssets::new(dir.path());
        assert!(!assets.is_complete());
        let err = assets.ensure_models().unwrap_err();
        assert!(matches!(err, AssetError::ScriptMissing { .. }), "got: {err}");
    }

    #[cfg(unix)]
    #[test]
    fn failing_script_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("scripts")).unwrap();
        std::fs::write(dir.path().join(DOWNLOAD_SCRIPT), "exit 3\n").unwrap();
        let err = ModelAssets::new(dir.path()).ensure_models().unwrap_err();
        assert!(matches!(err, AssetError::ScriptFailed { .. }), "got: {err}");
    }

    #[cfg(unix)]
    #[test]
    fn script_runs_from_checkout_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("scripts")).unwrap();
        std::fs::write(
            dir.path().join(DOWNLOAD_SCRIPT),
            "mkdir -p checkpoints gfpgan/weights\n",
        )
        .unwrap();
        let assets = ModelAssets::new(dir.path());
        assets.ensure_models().expect("script should succeed");
        assert!(assets.is_complete());
    }

    #[test]
    fn existing_legacy_checkpoint_skips_download() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let assets = ModelAssets::new(dir.path());
        std::fs::write(assets.legacy_checkpoint_path(), b"weights").unwrap();

        // Unroutable URL: reaching the network would fail the test.
        let path = assets
            .ensure_legacy_checkpoint("http://127.0.0.1:9/epoch_20.pth", None)
            .expect("cached checkpoint should be reused");
        assert_eq!(path, assets.legacy_checkpoint_path());
    }

    #[test]
    fn unreachable_checkpoint_url_is_a_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let assets = ModelAssets::new(dir.path());
        let err = assets
            .ensure_legacy_checkpoint("http://127.0.0.1:9/epoch_20.pth", None)
            .unwrap_err();
        assert!(matches!(err, AssetError::Download(_)), "got: {err}");
        assert!(!assets.legacy_checkpoint_path().exists());
    }
}
