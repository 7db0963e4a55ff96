//! Google Cloud Storage publisher.
//!
//! ## Flow
//!
//! ```text
//! service-account JSON ──▶ JWT (RS256) ──▶ OAuth2 token
//!                                              │
//! local video ──POST upload/storage/v1 (media)─┘
//!                │
//!                ├─ GCS_PUBLIC ─▶ grant allUsers:READER ─▶ public URL
//!                └─ otherwise  ─▶ V4 signed GET URL (GOOG4-RSA-SHA256)
//! ```
//!
//! Object keys are `<prefix><unix seconds>-<file name>`. Nothing is retried;
//! every failure surfaces as [`AvatarError::UploadError`].

use crate::config::{CredentialSource, UploadConfig};
use crate::error::AvatarError;
use crate::publish::{Publisher, VIDEO_CONTENT_TYPE};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::CONTENT_TYPE;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

const STORAGE_HOST: &str = "storage.googleapis.com";
const DEFAULT_API_BASE: &str = "https://storage.googleapis.com";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Object ACL changes need full control, not just read-write.
const OAUTH_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.full_control";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens this close to expiry are refreshed.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

const SIGNING_ALGORITHM: &str = "GOOG4-RSA-SHA256";

/// Token exchange and ACL calls.
const API_TIMEOUT: Duration = Duration::from_secs(60);
/// Media upload, matching the presigned PUT default.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Upper bound GCS accepts for V4 signed URLs (7 days).
pub const MAX_SIGNED_URL_TTL_SECS: u64 = 604_800;

// ── Credentials ──────────────────────────────────────────────────────────

/// The parts of a service-account key file this publisher needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    /// Parse key JSON, or base64 of key JSON.
    pub fn parse(text: &str) -> Result<Self, AvatarError> {
        let text = text.trim();
        let json = if text.starts_with('{') {
            text.to_string()
        } else {
            let bytes = STANDARD.decode(text).map_err(|e| {
                AvatarError::UploadError(format!("GCP_SA_JSON is neither JSON nor base64: {e}"))
            })?;
            String::from_utf8(bytes).map_err(|e| {
                AvatarError::UploadError(format!("GCP_SA_JSON decodes to invalid UTF-8: {e}"))
            })?
        };
        serde_json::from_str(&json)
            .map_err(|e| AvatarError::UploadError(format!("Invalid service-account JSON: {e}")))
    }

    pub fn load(source: &CredentialSource) -> Result<Self, AvatarError> {
        match source {
            CredentialSource::Inline(text) => Self::parse(text),
            CredentialSource::File(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    AvatarError::UploadError(format!(
                        "Cannot read credentials file {}: {e}",
                        path.display()
                    ))
                })?;
                Self::parse(&text)
            }
        }
    }

    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: i64,
}

// ── Publisher ────────────────────────────────────────────────────────────

/// Uploads videos to a GCS bucket.
#[derive(Debug)]
pub struct GcsPublisher {
    config: UploadConfig,
    client: reqwest::Client,
    api_base: String,
    api_timeout: Duration,
    upload_timeout: Duration,
    key: OnceCell<ServiceAccountKey>,
    token: Mutex<Option<CachedToken>>,
}

impl GcsPublisher {
    pub fn new(config: UploadConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            api_timeout: API_TIMEOUT,
            upload_timeout: UPLOAD_TIMEOUT,
            key: OnceCell::new(),
            token: Mutex::new(None),
        }
    }

    /// Send JSON API calls to another endpoint, e.g. a storage emulator.
    /// Returned URLs still point at `storage.googleapis.com`.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-request timeouts for token/ACL calls and for the media upload.
    pub fn with_timeouts(mut self, api: Duration, upload: Duration) -> Self {
        self.api_timeout = api;
        self.upload_timeout = upload;
        self
    }

    async fn key(&self) -> Result<&ServiceAccountKey, AvatarError> {
        self.key
            .get_or_try_init(|| async {
                let source = self.config.credentials.as_ref().ok_or_else(|| {
                    AvatarError::UploadError(
                        "GCS credentials missing: set GCP_SA_JSON or GOOGLE_APPLICATION_CREDENTIALS"
                            .to_string(),
                    )
                })?;
                let key = ServiceAccountKey::load(source)?;
                debug!("Loaded service account {}", key.client_email);
                Ok::<_, AvatarError>(key)
            })
            .await
    }

    async fn access_token(&self, key: &ServiceAccountKey) -> Result<String, AvatarError> {
        let mut cached = self.token.lock().await;
        let now = Utc::now().timestamp();
        if let Some(ref token) = *cached {
            if token.expires_at - TOKEN_REFRESH_MARGIN_SECS > now {
                return Ok(token.value.clone());
            }
        }

        let claims = Claims {
            iss: &key.client_email,
            scope: OAUTH_SCOPE,
            aud: key.token_uri(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| AvatarError::UploadError(format!("Invalid service-account key: {e}")))?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .map_err(|e| AvatarError::UploadError(format!("Failed to sign token request: {e}")))?;

        let body = format!(
            "grant_type={}&assertion={}",
            urlencoding::encode(JWT_BEARER_GRANT),
            urlencoding::encode(&assertion)
        );
        let response = self
            .client
            .post(key.token_uri())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .timeout(self.api_timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| AvatarError::UploadError(format!("Token request failed: {e}")))?;
        let response = expect_success(response, "Token request").await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AvatarError::UploadError(format!("Malformed token response: {e}")))?;

        debug!("Obtained GCS access token valid for {}s", token.expires_in);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + token.expires_in,
        });
        Ok(token.access_token)
    }

    async fn upload(
        &self,
        bucket: &str,
        object: &str,
        path: &Path,
        token: &str,
    ) -> Result<(), AvatarError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AvatarError::io(format!("Failed to read {}", path.display()), e))?;
        let size = bytes.len();

        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.api_base,
            urlencoding::encode(bucket),
            urlencoding::encode(object)
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, VIDEO_CONTENT_TYPE)
            .timeout(self.upload_timeout)
            .body(bytes)
            .send()
            .await
            .map_err(|e| AvatarError::UploadError(format!("GCS upload failed: {e}")))?;
        expect_success(response, "GCS upload").await?;

        info!("Uploaded {size} bytes to gs://{bucket}/{object}");
        Ok(())
    }

    async fn make_public(&self, bucket: &str, object: &str, token: &str) -> Result<(), AvatarError> {
        let url = format!(
            "{}/storage/v1/b/{}/o/{}/acl",
            self.api_base,
            urlencoding::encode(bucket),
            urlencoding::encode(object)
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .timeout(self.api_timeout)
            .json(&serde_json::json!({ "entity": "allUsers", "role": "READER" }))
            .send()
            .await
            .map_err(|e| AvatarError::UploadError(format!("ACL update failed: {e}")))?;
        expect_success(response, "ACL update").await?;
        Ok(())
    }
}

#[async_trait]
impl Publisher for GcsPublisher {
    async fn publish(&self, path: &Path) -> Result<Option<String>, AvatarError> {
        let bucket = self.config.bucket.as_deref().ok_or_else(|| {
            AvatarError::UploadError("MEDIA_BUCKET env var is required for GCS upload".to_string())
        })?;
        let key = self.key().await?;

        let object = object_name(&self.config.prefix, path, Utc::now().timestamp());
        let token = self.access_token(key).await?;
        self.upload(bucket, &object, path, &token).await?;

        let url = if self.config.public {
            self.make_public(bucket, &object, &token).await?;
            public_url(bucket, &object)
        } else {
            signed_url(key, bucket, &object, Utc::now(), self.config.signed_url_ttl_secs)?
        };
        Ok(Some(url))
    }
}

async fn expect_success(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, AvatarError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(AvatarError::UploadError(format!("{what} returned {status}: {snippet}")))
}

// ── Naming & URLs ────────────────────────────────────────────────────────

/// `<prefix><unix seconds>-<file name>`.
pub fn object_name(prefix: &str, path: &Path, unix_secs: i64) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video.mp4".to_string());
    format!("{prefix}{unix_secs}-{file_name}")
}

pub fn public_url(bucket: &str, object: &str) -> String {
    format!("https://{STORAGE_HOST}{}", canonical_uri(bucket, object))
}

/// Path-style URI with every object segment percent-encoded.
fn canonical_uri(bucket: &str, object: &str) -> String {
    let segments: Vec<_> = object.split('/').map(urlencoding::encode).collect();
    format!("/{}/{}", urlencoding::encode(bucket), segments.join("/"))
}

struct SigningParts {
    canonical_uri: String,
    canonical_query: String,
    string_to_sign: String,
}

fn signing_parts(
    client_email: &str,
    bucket: &str,
    object: &str,
    now: DateTime<Utc>,
    ttl_secs: u64,
) -> SigningParts {
    let ttl = ttl_secs.clamp(1, MAX_SIGNED_URL_TTL_SECS);
    let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
    let scope = format!("{}/auto/storage/goog4_request", now.format("%Y%m%d"));

    // Already in lexicographic order.
    let params = [
        ("X-Goog-Algorithm", SIGNING_ALGORITHM.to_string()),
        ("X-Goog-Credential", format!("{client_email}/{scope}")),
        ("X-Goog-Date", timestamp.clone()),
        ("X-Goog-Expires", ttl.to_string()),
        ("X-Goog-SignedHeaders", "host".to_string()),
    ];
    let canonical_query = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let canonical_uri = canonical_uri(bucket, object);
    let canonical_request = format!(
        "GET\n{canonical_uri}\n{canonical_query}\nhost:{STORAGE_HOST}\n\nhost\nUNSIGNED-PAYLOAD"
    );
    let string_to_sign = format!(
        "{SIGNING_ALGORITHM}\n{timestamp}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    SigningParts {
        canonical_uri,
        canonical_query,
        string_to_sign,
    }
}

/// V4 signed GET URL for `bucket/object`, valid for `ttl_secs` from `now`.
pub fn signed_url(
    key: &ServiceAccountKey,
    bucket: &str,
    object: &str,
    now: DateTime<Utc>,
    ttl_secs: u64,
) -> Result<String, AvatarError> {
    let parts = signing_parts(&key.client_email, bucket, object, now, ttl_secs);
    let signature = sign_rsa_sha256(&key.private_key, parts.string_to_sign.as_bytes())?;
    Ok(format!(
        "https://{STORAGE_HOST}{}?{}&X-Goog-Signature={}",
        parts.canonical_uri,
        parts.canonical_query,
        hex::encode(signature)
    ))
}

fn sign_rsa_sha256(pem: &str, message: &[u8]) -> Result<Vec<u8>, AvatarError> {
    let key = RsaPrivateKey::from_pkcs8_pem(pem)
        .map_err(|e| AvatarError::UploadError(format!("Invalid service-account key: {e}")))?;
    let digest = Sha256::digest(message);
    key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(|e| AvatarError::UploadError(format!("URL signing failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, Method, Uri};
    use axum::routing::post;
    use axum::{Json, Router};
    use rsa::RsaPublicKey;
    use serde_json::{json, Value};
    use std::sync::Arc;

    const TEST_KEY_PEM: &str = include_str!("../../tests/fixtures/test-service-account.pem");
    const EMAIL: &str = "renderer@demo-project.iam.gserviceaccount.com";

    fn key_json(token_uri: &str) -> String {
        json!({
            "type": "service_account",
            "client_email": EMAIL,
            "private_key": TEST_KEY_PEM,
            "token_uri": token_uri,
        })
        .to_string()
    }

    fn test_key() -> ServiceAccountKey {
        ServiceAccountKey::parse(&key_json(DEFAULT_TOKEN_URI)).unwrap()
    }

    fn query_param<'a>(url: &'a str, name: &str) -> Option<&'a str> {
        let (_, query) = url.split_once('?')?;
        query
            .split('&')
            .find_map(|kv| kv.strip_prefix(name)?.strip_prefix('='))
    }

    #[test]
    fn key_parses_from_json_and_base64() {
        let raw = key_json(DEFAULT_TOKEN_URI);
        assert_eq!(ServiceAccountKey::parse(&raw).unwrap().client_email, EMAIL);
        let b64 = STANDARD.encode(&raw);
        assert_eq!(ServiceAccountKey::parse(&b64).unwrap().client_email, EMAIL);
    }

    #[test]
    fn unreadable_credentials_are_upload_errors() {
        assert_eq!(ServiceAccountKey::parse("%%%").unwrap_err().kind(), "upload_error");
        let err = ServiceAccountKey::load(&CredentialSource::File("/nonexistent/key.json".into()))
            .unwrap_err();
        assert_eq!(err.kind(), "upload_error");
    }

    #[test]
    fn debug_hides_private_key() {
        let dbg = format!("{:?}", test_key());
        assert!(!dbg.contains("BEGIN PRIVATE KEY"));
        assert!(dbg.contains(EMAIL));
    }

    #[test]
    fn object_names_are_prefixed_and_timestamped() {
        let name = object_name("avatar-outputs/", Path::new("/tmp/sadtalker_x/out/result.mp4"), 1_700_000_000);
        assert_eq!(name, "avatar-outputs/1700000000-result.mp4");
    }

    #[test]
    fn canonical_uri_encodes_segments() {
        assert_eq!(
            canonical_uri("media", "avatar-outputs/1 2.mp4"),
            "/media/avatar-outputs/1%202.mp4"
        );
    }

    #[test]
    fn public_url_quotes_object_name() {
        assert_eq!(
            public_url("media", "avatar outputs/1-a?b.mp4"),
            "https://storage.googleapis.com/media/avatar%20outputs/1-a%3Fb.mp4"
        );
        assert_eq!(
            public_url("media", "avatar-outputs/1-result.mp4"),
            "https://storage.googleapis.com/media/avatar-outputs/1-result.mp4"
        );
    }

    #[test]
    fn signed_url_carries_v4_parameters() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let url = signed_url(&test_key(), "media", "avatar-outputs/1-result.mp4", now, 86_400).unwrap();

        assert!(url.starts_with("https://storage.googleapis.com/media/avatar-outputs/1-result.mp4?"));
        assert_eq!(query_param(&url, "X-Goog-Algorithm"), Some("GOOG4-RSA-SHA256"));
        assert_eq!(query_param(&url, "X-Goog-Date"), Some("20231114T221320Z"));
        assert_eq!(query_param(&url, "X-Goog-Expires"), Some("86400"));
        assert_eq!(query_param(&url, "X-Goog-SignedHeaders"), Some("host"));
        let credential = urlencoding::decode(query_param(&url, "X-Goog-Credential").unwrap()).unwrap();
        assert_eq!(credential, format!("{EMAIL}/20231114/auto/storage/goog4_request"));
        assert_eq!(query_param(&url, "X-Goog-Signature").unwrap().len(), 512);
    }

    #[test]
    fn signed_url_ttl_is_clamped_to_seven_days() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let url = signed_url(&test_key(), "media", "o.mp4", now, 30 * 86_400).unwrap();
        assert_eq!(query_param(&url, "X-Goog-Expires"), Some("604800"));
    }

    #[test]
    fn signature_verifies_against_public_key() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let url = signed_url(&test_key(), "media", "o.mp4", now, 60).unwrap();
        let signature = hex::decode(query_param(&url, "X-Goog-Signature").unwrap()).unwrap();

        let parts = signing_parts(EMAIL, "media", "o.mp4", now, 60);
        let private = RsaPrivateKey::from_pkcs8_pem(TEST_KEY_PEM).unwrap();
        let public = RsaPublicKey::from(&private);
        public
            .verify(
                Pkcs1v15Sign::new::<Sha256>(),
                &Sha256::digest(parts.string_to_sign.as_bytes()),
                &signature,
            )
            .expect("signature should verify");
    }

    // ── Mock GCS ─────────────────────────────────────────────────────────

    #[derive(Clone, Default)]
    struct Calls(Arc<std::sync::Mutex<Vec<String>>>);

    impl Calls {
        fn snapshot(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    async fn token(State(calls): State<Calls>) -> Json<Value> {
        calls.0.lock().unwrap().push("TOKEN".to_string());
        Json(json!({ "access_token": "test-token", "expires_in": 3600, "token_type": "Bearer" }))
    }

    async fn record(
        State(calls): State<Calls>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
    ) -> Json<Value> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        calls.0.lock().unwrap().push(format!("{method} {uri} {auth}"));
        Json(json!({}))
    }

    async fn mock_gcs() -> (String, Calls) {
        let calls = Calls::default();
        let app = Router::new()
            .route("/token", post(token))
            .fallback(record)
            .with_state(calls.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), calls)
    }

    fn publisher(base: &str, public: bool) -> GcsPublisher {
        let config = UploadConfig {
            provider: crate::config::UploadProvider::Gcs,
            bucket: Some("media".into()),
            public,
            credentials: Some(CredentialSource::Inline(key_json(&format!("{base}/token")))),
            ..UploadConfig::default()
        };
        GcsPublisher::new(config, reqwest::Client::new()).with_api_base(base)
    }

    fn video_file() -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        std::fs::write(file.path(), b"not really a video").unwrap();
        file
    }

    #[tokio::test]
    async fn public_publish_uploads_and_grants_read() {
        let (base, calls) = mock_gcs().await;
        let video = video_file();

        let url = publisher(&base, true)
            .publish(video.path())
            .await
            .unwrap()
            .expect("GCS always returns a URL");
        assert!(url.starts_with("https://storage.googleapis.com/media/avatar-outputs/"), "got: {url}");
        assert!(!url.contains("X-Goog-Signature"));

        let calls = calls.snapshot();
        assert_eq!(calls.len(), 3, "got: {calls:?}");
        assert_eq!(calls[0], "TOKEN");
        assert!(calls[1].starts_with("POST /upload/storage/v1/b/media/o?uploadType=media&name=avatar-outputs%2F"));
        assert!(calls[1].ends_with("Bearer test-token"));
        assert!(calls[2].starts_with("POST /storage/v1/b/media/o/avatar-outputs%2F"));
        assert!(calls[2].contains("/acl "));
    }

    #[tokio::test]
    async fn private_publish_returns_signed_url_and_reuses_token() {
        let (base, calls) = mock_gcs().await;
        let video = video_file();
        let publisher = publisher(&base, false);

        for _ in 0..2 {
            let url = publisher.publish(video.path()).await.unwrap().unwrap();
            assert!(url.contains("X-Goog-Signature="), "got: {url}");
        }

        let calls = calls.snapshot();
        assert_eq!(calls.iter().filter(|c| *c == "TOKEN").count(), 1, "got: {calls:?}");
        assert!(!calls.iter().any(|c| c.contains("/acl")));
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_network() {
        let config = UploadConfig {
            provider: crate::config::UploadProvider::Gcs,
            bucket: Some("media".into()),
            ..UploadConfig::default()
        };
        let publisher = GcsPublisher::new(config, reqwest::Client::new()).with_api_base("http://127.0.0.1:9");
        let err = publisher.publish(Path::new("/tmp/x.mp4")).await.unwrap_err();
        assert!(err.to_string().contains("credentials missing"), "got: {err}");
    }

    #[tokio::test]
    async fn unresponsive_token_endpoint_times_out_and_releases_lock() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        let base = format!("http://{addr}");
        let publisher = publisher(&base, false)
            .with_timeouts(Duration::from_millis(200), Duration::from_millis(200));
        let video = video_file();

        for _ in 0..2 {
            let err = tokio::time::timeout(Duration::from_secs(10), publisher.publish(video.path()))
                .await
                .expect("publish should give up on its own")
                .unwrap_err();
            assert!(err.to_string().contains("Token request failed"), "got: {err}");
        }
    }
}
