//! Configuration types for the avatar service.
//!
//! All behaviour is controlled through [`ServiceConfig`], which groups the
//! external toolkit settings ([`ToolkitConfig`]) and the publishing settings
//! ([`UploadConfig`]). The deployed service reads everything from the
//! environment via [`ServiceConfig::from_env`]; tests and embedders use
//! [`ServiceConfig::builder`] or [`ServiceConfig::from_lookup`] with a map.
//!
//! # Recognised environment variables
//!
//! | Variable | Default | Effect |
//! |----------|---------|--------|
//! | `SADTALKER_ROOT` | `/opt/SadTalker` | Toolkit checkout |
//! | `SADTALKER_PYTHON` | `/usr/bin/python3` | Interpreter running `inference.py` |
//! | `SADTALKER_STILL` | enabled | `0/false/no/off` drops `--still` |
//! | `SADTALKER_PREPROCESS` | `crop` | `full`, `crop`, `resize`; empty/invalid → `full` |
//! | `SADTALKER_SIZE` | unset | Adds `--size` |
//! | `SADTALKER_FPS` | unset | Adds `--fps` when the toolkit supports it |
//! | `SADTALKER_ENHANCER` | unset | Adds `--enhancer` unless `none` |
//! | `SADTALKER_LEGACY_CHECKPOINT_URL` | GitHub release | Empty disables the fetch |
//! | `UPLOAD_PROVIDER` | `none` | `gcs` enables Cloud Storage |
//! | `MEDIA_BUCKET` | unset | Required for `gcs` |
//! | `MEDIA_PREFIX` | `avatar-outputs/` | Object key prefix |
//! | `GCS_PUBLIC` | `false` | `1/true/yes` returns public URLs |
//! | `GCS_SIGNED_URL_TTL` | `86400` | Signed URL lifetime in seconds |
//! | `GCP_SA_JSON` | unset | Service-account JSON, raw or base64 |
//! | `GOOGLE_APPLICATION_CREDENTIALS` | unset | Path to service-account JSON |
//! | `APP_VERSION` | empty | Reported by job pings |
//! | `AVATAR_FETCH_TIMEOUT_SECS` | `30` | Input download timeout |

use crate::error::AvatarError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::warn;

/// Default toolkit checkout location inside the serving image.
pub const DEFAULT_TOOLKIT_ROOT: &str = "/opt/SadTalker";

/// Absolute interpreter path; serverless images do not always ship `python`.
pub const DEFAULT_PYTHON: &str = "/usr/bin/python3";

pub const DEFAULT_MEDIA_PREFIX: &str = "avatar-outputs/";

/// 24 hours.
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 86_400;

/// Configuration for the whole service.
///
/// # Example
/// ```rust
/// use avatar_service::{ServiceConfig, PreprocessMode};
///
/// let config = ServiceConfig::builder()
///     .toolkit_root("/opt/SadTalker")
///     .preprocess(PreprocessMode::Full)
///     .enhancer("gfpgan")
///     .build()
///     .unwrap();
/// assert!(config.toolkit.still);
/// ```
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// External toolkit invocation settings.
    pub toolkit: ToolkitConfig,

    /// Where generated videos are published.
    pub upload: UploadConfig,

    /// Timeout for fetching `*_url` inputs, in seconds. Default: 30.
    pub fetch_timeout_secs: u64,

    /// Timeout for PUTting the result to a presigned URL, in seconds. Default: 600.
    pub presigned_put_timeout_secs: u64,

    /// Reported by job-handler pings. Default: empty.
    pub app_version: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            toolkit: ToolkitConfig::default(),
            upload: UploadConfig::default(),
            fetch_timeout_secs: 30,
            presigned_put_timeout_secs: 600,
            app_version: String::new(),
        }
    }
}

/// How the external toolkit is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolkitConfig {
    /// SadTalker checkout; also the working directory of every invocation.
    pub root: PathBuf,

    /// Interpreter used to run `inference.py`.
    pub python: PathBuf,

    /// Pass `--still` (reduced head motion). Default: true.
    pub still: bool,

    /// Value for `--preprocess`. Default: [`PreprocessMode::Crop`].
    pub preprocess: PreprocessMode,

    /// Value for `--size`, only passed when set.
    pub size: Option<u32>,

    /// Value for `--fps`, only passed when set and the toolkit advertises the flag.
    pub fps: Option<u32>,

    /// Value for `--enhancer`, only passed when set.
    pub enhancer: Option<String>,

    /// Where the legacy `epoch_20.pth` checkpoint is fetched from. `None` skips it.
    pub legacy_checkpoint_url: Option<String>,

    /// Upper bound on the `--help` capability probe, in seconds. Default: 30.
    pub probe_timeout_secs: u64,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_TOOLKIT_ROOT),
            python: PathBuf::from(DEFAULT_PYTHON),
            still: true,
            preprocess: PreprocessMode::default(),
            size: None,
            fps: None,
            enhancer: None,
            legacy_checkpoint_url: Some(sadtalker_assets::LEGACY_CHECKPOINT_URL.to_string()),
            probe_timeout_secs: 30,
        }
    }
}

/// Publishing settings.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadConfig {
    pub provider: UploadProvider,

    /// Target bucket; required when `provider` is [`UploadProvider::Gcs`].
    pub bucket: Option<String>,

    /// Object key prefix. Default: `avatar-outputs/`.
    pub prefix: String,

    /// Make objects publicly readable instead of signing URLs. Default: false.
    pub public: bool,

    /// Signed URL lifetime in seconds. Default: 86400.
    pub signed_url_ttl_secs: u64,

    /// Service-account credentials.
    pub credentials: Option<CredentialSource>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            provider: UploadProvider::default(),
            bucket: None,
            prefix: DEFAULT_MEDIA_PREFIX.to_string(),
            public: false,
            signed_url_ttl_secs: DEFAULT_SIGNED_URL_TTL_SECS,
            credentials: None,
        }
    }
}

impl fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadConfig")
            .field("provider", &self.provider)
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("public", &self.public)
            .field("signed_url_ttl_secs", &self.signed_url_ttl_secs)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// Where service-account JSON comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// JSON text, or base64 of it (`GCP_SA_JSON`).
    Inline(String),
    /// Path to a JSON key file (`GOOGLE_APPLICATION_CREDENTIALS`).
    File(PathBuf),
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(_) => f.write_str("<inline service account>"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

// ── Environment loading ──────────────────────────────────────────────────

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration from any key → value source.
    ///
    /// Unparseable values are logged and replaced by their defaults; this
    /// never fails so a typo cannot keep the worker from starting.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let tk = &mut config.toolkit;

        if let Some(root) = non_empty(lookup("SADTALKER_ROOT")) {
            tk.root = PathBuf::from(root);
        }
        if let Some(python) = non_empty(lookup("SADTALKER_PYTHON")) {
            tk.python = PathBuf::from(python);
        }
        if let Some(still) = lookup("SADTALKER_STILL") {
            tk.still = !is_false_like(&still);
        }
        if let Some(mode) = lookup("SADTALKER_PREPROCESS") {
            tk.preprocess = PreprocessMode::from_override(&mode);
        }
        tk.size = parse_positive(&lookup, "SADTALKER_SIZE");
        tk.fps = parse_positive(&lookup, "SADTALKER_FPS");
        tk.enhancer = lookup("SADTALKER_ENHANCER").and_then(|v| enhancer_from(&v));
        if let Some(url) = lookup("SADTALKER_LEGACY_CHECKPOINT_URL") {
            tk.legacy_checkpoint_url = non_empty(Some(url));
        }

        let up = &mut config.upload;
        up.provider = UploadProvider::from_name(&lookup("UPLOAD_PROVIDER").unwrap_or_default());
        up.bucket = non_empty(lookup("MEDIA_BUCKET"));
        if let Some(prefix) = lookup("MEDIA_PREFIX") {
            up.prefix = prefix;
        }
        up.public = lookup("GCS_PUBLIC").is_some_and(|v| is_true_like(&v));
        if let Some(ttl) = parse_positive(&lookup, "GCS_SIGNED_URL_TTL") {
            up.signed_url_ttl_secs = u64::from(ttl);
        }
        // Inline credentials win; a stale key-file path must not shadow them.
        up.credentials = non_empty(lookup("GCP_SA_JSON"))
            .map(CredentialSource::Inline)
            .or_else(|| {
                non_empty(lookup("GOOGLE_APPLICATION_CREDENTIALS"))
                    .map(|p| CredentialSource::File(PathBuf::from(p)))
            });

        if let Some(secs) = parse_positive(&lookup, "AVATAR_FETCH_TIMEOUT_SECS") {
            config.fetch_timeout_secs = u64::from(secs);
        }
        config.app_version = lookup("APP_VERSION").unwrap_or_default();

        config
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_positive<F>(lookup: &F, key: &str) -> Option<u32>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = non_empty(lookup(key))?;
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            warn!("Ignoring {key}='{raw}': expected a positive integer");
            None
        }
    }
}

fn enhancer_from(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(v.to_string())
    }
}

/// `0`, `false`, `no`, `off` (any case).
pub fn is_false_like(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

/// `1`, `true`, `yes` (any case).
pub fn is_true_like(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn toolkit_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.toolkit.root = root.into();
        self
    }

    pub fn python(mut self, python: impl Into<PathBuf>) -> Self {
        self.config.toolkit.python = python.into();
        self
    }

    pub fn still(mut self, v: bool) -> Self {
        self.config.toolkit.still = v;
        self
    }

    pub fn preprocess(mut self, mode: PreprocessMode) -> Self {
        self.config.toolkit.preprocess = mode;
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.config.toolkit.size = Some(size);
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.config.toolkit.fps = Some(fps);
        self
    }

    pub fn enhancer(mut self, name: impl AsRef<str>) -> Self {
        self.config.toolkit.enhancer = enhancer_from(name.as_ref());
        self
    }

    pub fn legacy_checkpoint_url(mut self, url: Option<String>) -> Self {
        self.config.toolkit.legacy_checkpoint_url = url;
        self
    }

    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.toolkit.probe_timeout_secs = secs;
        self
    }

    pub fn upload(mut self, upload: UploadConfig) -> Self {
        self.config.upload = upload;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn presigned_put_timeout_secs(mut self, secs: u64) -> Self {
        self.config.presigned_put_timeout_secs = secs;
        self
    }

    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.config.app_version = version.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, AvatarError> {
        let c = &self.config;
        if c.fetch_timeout_secs == 0 {
            return Err(AvatarError::InvalidConfig(
                "fetch timeout must be ≥ 1 second".into(),
            ));
        }
        if c.toolkit.size == Some(0) || c.toolkit.fps == Some(0) {
            return Err(AvatarError::InvalidConfig(
                "size and fps must be positive when set".into(),
            ));
        }
        if c.upload.provider == UploadProvider::Gcs && c.upload.bucket.is_none() {
            return Err(AvatarError::InvalidConfig(
                "MEDIA_BUCKET is required for GCS upload".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Face preprocessing mode passed to `--preprocess`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreprocessMode {
    /// Whole image, no cropping.
    Full,
    /// Crop to the detected face. (default)
    #[default]
    Crop,
    /// Resize the whole image to the model resolution.
    Resize,
}

impl PreprocessMode {
    /// Interpret an explicit override. An empty or unknown value means `full`,
    /// unlike an absent one which keeps the `crop` default.
    pub fn from_override(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "crop" => PreprocessMode::Crop,
            "resize" => PreprocessMode::Resize,
            "full" => PreprocessMode::Full,
            other => {
                if !other.is_empty() {
                    warn!("Unknown preprocess mode '{other}', using 'full'");
                }
                PreprocessMode::Full
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PreprocessMode::Full => "full",
            PreprocessMode::Crop => "crop",
            PreprocessMode::Resize => "resize",
        }
    }
}

/// Where generated videos are uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadProvider {
    /// Keep the file local and return its path. (default)
    #[default]
    None,
    /// Google Cloud Storage.
    Gcs,
}

impl UploadProvider {
    /// Anything other than `gcs` disables uploading.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "gcs" => UploadProvider::Gcs,
            "" | "none" => UploadProvider::None,
            other => {
                warn!("Unsupported UPLOAD_PROVIDER '{other}', uploads disabled");
                UploadProvider::None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServiceConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let c = config_from(&[]);
        assert_eq!(c.toolkit.root, PathBuf::from("/opt/SadTalker"));
        assert!(c.toolkit.still);
        assert_eq!(c.toolkit.preprocess, PreprocessMode::Crop);
        assert_eq!(c.toolkit.size, None);
        assert_eq!(c.toolkit.enhancer, None);
        assert_eq!(c.upload.provider, UploadProvider::None);
        assert_eq!(c.upload.prefix, "avatar-outputs/");
        assert_eq!(c.upload.signed_url_ttl_secs, 86_400);
        assert_eq!(c.fetch_timeout_secs, 30);
    }

    #[test]
    fn still_can_be_disabled() {
        assert!(!config_from(&[("SADTALKER_STILL", "false")]).toolkit.still);
        assert!(!config_from(&[("SADTALKER_STILL", "0")]).toolkit.still);
        assert!(config_from(&[("SADTALKER_STILL", "yes")]).toolkit.still);
    }

    #[test]
    fn preprocess_override_rules() {
        let mode = |v: &str| config_from(&[("SADTALKER_PREPROCESS", v)]).toolkit.preprocess;
        assert_eq!(mode("resize"), PreprocessMode::Resize);
        assert_eq!(mode("CROP"), PreprocessMode::Crop);
        assert_eq!(mode(""), PreprocessMode::Full);
        assert_eq!(mode("zoom"), PreprocessMode::Full);
    }

    #[test]
    fn enhancer_none_is_dropped() {
        assert_eq!(config_from(&[("SADTALKER_ENHANCER", "none")]).toolkit.enhancer, None);
        assert_eq!(
            config_from(&[("SADTALKER_ENHANCER", "gfpgan")]).toolkit.enhancer,
            Some("gfpgan".into())
        );
    }

    #[test]
    fn invalid_numbers_are_ignored() {
        let c = config_from(&[("SADTALKER_SIZE", "big"), ("SADTALKER_FPS", "25")]);
        assert_eq!(c.toolkit.size, None);
        assert_eq!(c.toolkit.fps, Some(25));
    }

    #[test]
    fn inline_credentials_take_precedence() {
        let c = config_from(&[
            ("GCP_SA_JSON", "{}"),
            ("GOOGLE_APPLICATION_CREDENTIALS", "/tmp/gcp.json"),
        ]);
        assert_eq!(c.upload.credentials, Some(CredentialSource::Inline("{}".into())));

        let c = config_from(&[("GOOGLE_APPLICATION_CREDENTIALS", "/tmp/gcp.json")]);
        assert_eq!(
            c.upload.credentials,
            Some(CredentialSource::File(PathBuf::from("/tmp/gcp.json")))
        );
    }

    #[test]
    fn upload_settings_from_environment() {
        let c = config_from(&[
            ("UPLOAD_PROVIDER", "GCS"),
            ("MEDIA_BUCKET", "media"),
            ("GCS_PUBLIC", "true"),
            ("GCS_SIGNED_URL_TTL", "600"),
        ]);
        assert_eq!(c.upload.provider, UploadProvider::Gcs);
        assert_eq!(c.upload.bucket.as_deref(), Some("media"));
        assert!(c.upload.public);
        assert_eq!(c.upload.signed_url_ttl_secs, 600);
    }

    #[test]
    fn empty_legacy_url_disables_fetch() {
        let c = config_from(&[("SADTALKER_LEGACY_CHECKPOINT_URL", "")]);
        assert_eq!(c.toolkit.legacy_checkpoint_url, None);
    }

    #[test]
    fn builder_rejects_gcs_without_bucket() {
        let upload = UploadConfig {
            provider: UploadProvider::Gcs,
            ..UploadConfig::default()
        };
        let err = ServiceConfig::builder().upload(upload).build().unwrap_err();
        assert!(err.to_string().contains("MEDIA_BUCKET"), "got: {err}");
    }

    #[test]
    fn debug_redacts_inline_credentials() {
        let upload = UploadConfig {
            credentials: Some(CredentialSource::Inline("secret-key".into())),
            ..UploadConfig::default()
        };
        let dbg = format!("{upload:?}");
        assert!(!dbg.contains("secret-key"), "got: {dbg}");
    }

    #[test]
    fn credential_source_debug_shows_only_paths() {
        let inline = CredentialSource::Inline("secret-key".into());
        assert_eq!(format!("{inline:?}"), "<inline service account>");
        let file = CredentialSource::File(PathBuf::from("/tmp/gcp.json"));
        assert_eq!(format!("{file:?}"), "/tmp/gcp.json");
    }
}
