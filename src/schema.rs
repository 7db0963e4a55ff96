//! Wire types for both entry points.
//!
//! The HTTP endpoint and the job handler accept the same media fields; the job
//! payload adds the liveness `ping` and the caller-managed upload target.

use serde::{Deserialize, Serialize};

fn default_driver() -> String {
    "sadtalker".to_string()
}

/// A media input as supplied by the caller: a remote URL or inline base64.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaSource<'a> {
    pub url: Option<&'a str>,
    pub b64: Option<&'a str>,
}

impl<'a> MediaSource<'a> {
    pub fn new(url: Option<&'a str>, b64: Option<&'a str>) -> Self {
        // Empty strings count as absent, like unset JSON fields.
        Self {
            url: url.filter(|s| !s.is_empty()),
            b64: b64.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.b64.is_none()
    }
}

/// Body of `POST /generate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Public URL to the source face image.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Base64-encoded image (data URL or raw base64).
    #[serde(default)]
    pub image_b64: Option<String>,
    /// Public URL to the speech audio (wav/mp3).
    #[serde(default)]
    pub audio_url: Option<String>,
    /// Base64-encoded audio.
    #[serde(default)]
    pub audio_b64: Option<String>,
    /// `sadtalker` or `liveportrait`.
    #[serde(default = "default_driver")]
    pub driver: String,
}

impl GenerateRequest {
    pub fn image(&self) -> MediaSource<'_> {
        MediaSource::new(self.image_url.as_deref(), self.image_b64.as_deref())
    }

    pub fn audio(&self) -> MediaSource<'_> {
        MediaSource::new(self.audio_url.as_deref(), self.audio_b64.as_deref())
    }
}

/// Response of `POST /generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// `completed` or `error`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GenerateResponse {
    pub fn completed(video_url: impl Into<String>) -> Self {
        Self {
            status: "completed".into(),
            video_url: Some(video_url.into()),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            video_url: None,
            message: Some(message.into()),
        }
    }
}

/// Response of `GET /healthz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// A serverless job event: `{"input": {...}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobEvent {
    #[serde(default)]
    pub input: JobInput,
}

/// The `input` object of a job event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobInput {
    /// Any truthy value short-circuits to a liveness reply.
    #[serde(default)]
    pub ping: Option<serde_json::Value>,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_b64: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub audio_b64: Option<String>,
    /// Presigned URL the result is PUT to.
    #[serde(default)]
    pub upload_url: Option<String>,
    /// URL reported back after a successful presigned upload.
    #[serde(default)]
    pub view_url: Option<String>,
    /// Content type for the presigned PUT. Default: `video/mp4`.
    #[serde(default)]
    pub content_type: Option<String>,
}

impl JobInput {
    pub fn is_ping(&self) -> bool {
        self.ping.as_ref().is_some_and(is_truthy)
    }

    pub fn driver_name(&self) -> &str {
        self.driver.as_deref().unwrap_or("sadtalker")
    }

    pub fn image(&self) -> MediaSource<'_> {
        MediaSource::new(self.image_url.as_deref(), self.image_b64.as_deref())
    }

    pub fn audio(&self) -> MediaSource<'_> {
        MediaSource::new(self.audio_url.as_deref(), self.audio_b64.as_deref())
    }
}

/// JSON truthiness: `false`, `null`, `0`, `""`, `[]` and `{}` are falsy.
fn is_truthy(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Result of one job, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobOutput {
    /// Liveness reply to a `ping`.
    Ok {
        engine: String,
        #[serde(rename = "appVersion")]
        app_version: String,
    },
    Completed {
        video_url: String,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trace: Option<String>,
    },
}
