//! Error types for the avatar-service library.
//!
//! A single [`AvatarError`] enum covers every failure a generation request can
//! hit, from input acquisition to publishing. Both entry points catch it at
//! their boundary: the HTTP handler turns it into a `400 {"detail": ...}`
//! response, the job handler into `{"status": "error", ...}`. Nothing here is
//! retried.
//!
//! [`AvatarError::NotImplemented`] is the one variant callers must treat
//! differently: the driver is valid but has no backend yet, which the HTTP
//! endpoint reports as a completed request carrying an error message rather
//! than a client error.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the avatar-service library.
#[derive(Debug, Error)]
pub enum AvatarError {
    // ── Request errors ────────────────────────────────────────────────────
    /// Neither a URL nor inline data was supplied, or the inline data is not
    /// valid base64.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Remote media could not be retrieved.
    #[error("Failed to fetch '{url}': {reason}")]
    FetchError { url: String, reason: String },

    /// Driver name outside the supported set.
    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    // ── Toolkit errors ────────────────────────────────────────────────────
    /// The external toolkit checkout is absent.
    #[error("SadTalker root not found at {}. Bake it into the image or mount it.", root.display())]
    MissingDependency { root: PathBuf },

    /// The toolkit is present but its asset bootstrap failed.
    #[error("Toolkit setup failed: {0}")]
    SetupFailed(String),

    /// The inference process could not be started or exited non-zero.
    #[error("{tool} failed ({status}): {stderr}")]
    ExternalToolFailure {
        tool: String,
        status: String,
        stderr: String,
    },

    /// The inference process succeeded but left no video behind.
    #[error("{tool} produced no output video under {dir:?}")]
    NoOutputProduced { tool: String, dir: PathBuf },

    /// Recognised driver without an implementation.
    #[error("{0}")]
    NotImplemented(String),

    // ── Publish errors ────────────────────────────────────────────────────
    /// Credential resolution, upload, or URL signing failed.
    #[error("Upload failed: {0}")]
    UploadError(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Local filesystem operation failed (temp files, output directory).
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AvatarError {
    /// Stable snake-case name of the variant, used in job traces and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AvatarError::InvalidInput(_) => "invalid_input",
            AvatarError::FetchError { .. } => "fetch_error",
            AvatarError::UnknownDriver(_) => "unknown_driver",
            AvatarError::MissingDependency { .. } => "missing_dependency",
            AvatarError::SetupFailed(_) => "setup_failed",
            AvatarError::ExternalToolFailure { .. } => "external_tool_failure",
            AvatarError::NoOutputProduced { .. } => "no_output_produced",
            AvatarError::NotImplemented(_) => "not_implemented",
            AvatarError::UploadError(_) => "upload_error",
            AvatarError::Io { .. } => "io",
            AvatarError::InvalidConfig(_) => "invalid_config",
            AvatarError::Internal(_) => "internal",
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        AvatarError::Io {
            context: context.into(),
            source,
        }
    }

    /// Render the error kind and its full `source()` chain, one cause per line.
    pub fn trace(&self) -> String {
        let mut out = format!("{}: {}", self.kind(), self);
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str(&format!("\n  caused by: {cause}"));
            source = cause.source();
        }
        out
    }
}

impl From<sadtalker_assets::AssetError> for AvatarError {
    fn from(err: sadtalker_assets::AssetError) -> Self {
        AvatarError::SetupFailed(err.to_string())
    }
}
