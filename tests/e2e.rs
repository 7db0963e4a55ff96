//! End-to-end integration tests for avatar-service.
//!
//! The toolkit is replaced by a shell script run through `/bin/sh` in place of
//! the Python interpreter, and remote media is served by a local axum fixture
//! server, so these tests need neither a GPU nor network access.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture
#![cfg(unix)]

use async_trait::async_trait;
use avatar_service::schema::JobEvent;
use avatar_service::{
    handle_event, server, AvatarError, AvatarService, Driver, JobOutput, Publisher, ServiceConfig,
};
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::routing::{get, put};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Stands in for `inference.py`: checks its inputs exist, then writes
/// `<result_dir>/out/result.mp4` plus the input paths it was given.
const STUB_INFERENCE: &str = r#"
if [ "$1" = "--help" ]; then
  echo "usage: inference.py [--driven_audio DRIVEN_AUDIO] [--source_image SOURCE_IMAGE] [--fps FPS]"
  exit 0
fi
while [ $# -gt 0 ]; do
  case "$1" in
    --driven_audio) audio="$2"; shift ;;
    --source_image) image="$2"; shift ;;
    --result_dir) out="$2"; shift ;;
  esac
  shift
done
[ -f "$image" ] || { echo "missing image $image" >&2; exit 3; }
[ -f "$audio" ] || { echo "missing audio $audio" >&2; exit 3; }
mkdir -p "$out/out"
printf '%s\n%s\n' "$image" "$audio" > "$out/out/inputs.txt"
echo video > "$out/out/result.mp4"
"#;

/// A SadTalker checkout with assets in place and the stub entry point.
fn stub_toolkit() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("checkpoints")).unwrap();
    std::fs::create_dir_all(dir.path().join("gfpgan/weights")).unwrap();
    std::fs::write(dir.path().join("inference.py"), STUB_INFERENCE).unwrap();
    dir
}

/// `RUST_LOG=avatar_service=debug` shows the library's logs under `--nocapture`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn service_for(root: &Path) -> AvatarService {
    init_tracing();
    let config = ServiceConfig::builder()
        .toolkit_root(root)
        .python("/bin/sh")
        .legacy_checkpoint_url(None)
        .app_version("test")
        .build()
        .unwrap();
    AvatarService::new(config).unwrap()
}

#[derive(Clone, Default)]
struct Uploads(Arc<Mutex<Vec<Bytes>>>);

/// Serves `/face.png`, `/voice.wav` and accepts `PUT /upload`.
async fn fixture_server() -> (String, Uploads) {
    let uploads = Uploads::default();
    let app = Router::new()
        .route("/face.png", get(|| async { Bytes::from_static(b"\x89PNG fake image") }))
        .route("/voice.wav", get(|| async { Bytes::from_static(b"RIFF fake audio") }))
        .route(
            "/upload",
            put(|State(uploads): State<Uploads>, body: Bytes| async move {
                uploads.0.lock().unwrap().push(body);
                StatusCode::OK
            }),
        )
        .with_state(uploads.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), uploads)
}

async fn post_generate(app: Router, body: Value) -> (StatusCode, Value) {
    let req = Request::post("/generate")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn job(input: Value) -> JobEvent {
    serde_json::from_value(json!({ "input": input })).unwrap()
}

#[derive(Debug)]
struct StubPublisher;

#[async_trait]
impl Publisher for StubPublisher {
    async fn publish(&self, path: &Path) -> Result<Option<String>, AvatarError> {
        assert!(path.is_file(), "publisher must receive the produced file");
        Ok(Some("https://bucket/object?sig=abc".to_string()))
    }
}

// ── HTTP ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_http_generate_returns_local_path_without_upload() {
    let toolkit = stub_toolkit();
    let (base, _) = fixture_server().await;
    let app = server::router(Arc::new(service_for(toolkit.path())));

    let (status, body) = post_generate(
        app,
        json!({ "image_url": format!("{base}/face.png"), "audio_url": format!("{base}/voice.wav") }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["status"], "completed");
    let video = PathBuf::from(body["video_url"].as_str().unwrap());
    assert!(video.ends_with("out/result.mp4"), "got: {}", video.display());
    assert_eq!(std::fs::read_to_string(&video).unwrap(), "video\n");
}

#[tokio::test]
async fn test_http_generate_uses_publisher_url() {
    let toolkit = stub_toolkit();
    let service = service_for(toolkit.path()).with_publisher(Arc::new(StubPublisher));
    let app = server::router(Arc::new(service));

    let (status, body) = post_generate(
        app,
        json!({ "image_b64": "data:image/png;base64,aGVsbG8=", "audio_b64": "aGVsbG8=" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(
        body,
        json!({ "status": "completed", "video_url": "https://bucket/object?sig=abc" })
    );
}

#[tokio::test]
async fn test_inputs_are_removed_after_request() {
    let toolkit = stub_toolkit();
    let app = server::router(Arc::new(service_for(toolkit.path())));

    let (_, body) = post_generate(app, json!({ "image_b64": "aGk=", "audio_b64": "aGk=" })).await;
    let video = PathBuf::from(body["video_url"].as_str().unwrap());
    let inputs = std::fs::read_to_string(video.with_file_name("inputs.txt")).unwrap();

    let paths: Vec<&str> = inputs.lines().collect();
    assert_eq!(paths.len(), 2);
    assert!(paths[0].ends_with(".png"), "image suffix: {}", paths[0]);
    assert!(paths[1].ends_with(".wav"), "audio suffix: {}", paths[1]);
    for p in paths {
        assert!(!Path::new(p).exists(), "temp input {p} should be gone");
    }
    assert!(video.exists(), "generated output must persist");
}

#[tokio::test]
async fn test_unknown_driver_constructs_no_pipeline() {
    let toolkit = stub_toolkit();
    let service = Arc::new(service_for(toolkit.path()));
    let app = server::router(service.clone());

    let (status, body) = post_generate(
        app,
        json!({ "image_b64": "aGk=", "audio_b64": "aGk=", "driver": "wav2lip" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Unknown driver: wav2lip");
    assert!(service.registry().is_empty());
}

#[tokio::test]
async fn test_missing_toolkit_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = server::router(Arc::new(service_for(&dir.path().join("SadTalker"))));

    let (status, body) = post_generate(app, json!({ "image_b64": "aGk=", "audio_b64": "aGk=" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["detail"].as_str().unwrap().contains("SadTalker root not found"),
        "body: {body}"
    );
}

#[tokio::test]
async fn test_unreachable_input_is_fetch_error() {
    let toolkit = stub_toolkit();
    let (base, _) = fixture_server().await;
    let service = Arc::new(service_for(toolkit.path()));
    let app = server::router(service.clone());

    let (status, body) = post_generate(
        app,
        json!({ "image_url": format!("{base}/missing.png"), "audio_b64": "aGk=" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("Failed to fetch") && detail.contains("404"), "got: {detail}");
    assert!(!service.registry().contains(Driver::SadTalker));
}

// ── Job handler ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_job_ping_constructs_no_pipeline() {
    let service = service_for(Path::new("/nonexistent"));
    let out = handle_event(&service, &job(json!({ "ping": true }))).await;
    assert_eq!(
        serde_json::to_value(&out).unwrap(),
        json!({ "status": "ok", "engine": "sadtalker", "appVersion": "test" })
    );
    assert!(service.registry().is_empty());
}

#[tokio::test]
async fn test_job_uploads_to_presigned_url() {
    let toolkit = stub_toolkit();
    let (base, uploads) = fixture_server().await;
    let service = service_for(toolkit.path());

    let out = handle_event(
        &service,
        &job(json!({
            "image_url": format!("{base}/face.png"),
            "audio_b64": "aGk=",
            "upload_url": format!("{base}/upload"),
            "view_url": "https://cdn.example/v/123.mp4",
        })),
    )
    .await;

    assert_eq!(
        out,
        JobOutput::Completed {
            video_url: "https://cdn.example/v/123.mp4".into()
        }
    );
    let uploads = uploads.0.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].as_ref(), b"video\n");
}

#[tokio::test]
async fn test_job_presigned_without_view_url_reports_local_path() {
    let toolkit = stub_toolkit();
    let (base, _) = fixture_server().await;
    let service = service_for(toolkit.path());

    let out = handle_event(
        &service,
        &job(json!({
            "image_b64": "aGk=",
            "audio_b64": "aGk=",
            "upload_url": format!("{base}/upload"),
        })),
    )
    .await;

    match out {
        JobOutput::Completed { video_url } => assert!(video_url.ends_with("out/result.mp4")),
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_job_falls_back_to_publisher() {
    let toolkit = stub_toolkit();
    let service = service_for(toolkit.path()).with_publisher(Arc::new(StubPublisher));

    let out = handle_event(&service, &job(json!({ "image_b64": "aGk=", "audio_b64": "aGk=" }))).await;

    assert_eq!(
        out,
        JobOutput::Completed {
            video_url: "https://bucket/object?sig=abc".into()
        }
    );
    assert!(service.registry().get(Driver::SadTalker).is_ready());
}

#[tokio::test]
async fn test_job_rejected_upload_is_error_with_trace() {
    let toolkit = stub_toolkit();
    let (base, _) = fixture_server().await;
    let service = service_for(toolkit.path());

    // GET-only route: the PUT is answered with 405.
    let out = handle_event(
        &service,
        &job(json!({
            "image_b64": "aGk=",
            "audio_b64": "aGk=",
            "upload_url": format!("{base}/face.png"),
        })),
    )
    .await;

    match out {
        JobOutput::Error { message, trace } => {
            assert!(message.starts_with("Upload failed: 405"), "got: {message}");
            assert!(trace.unwrap().starts_with("upload_error"));
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_warm_registry_is_shared_across_jobs() {
    let toolkit = stub_toolkit();
    let service = service_for(toolkit.path());
    let event = job(json!({ "image_b64": "aGk=", "audio_b64": "aGk=" }));

    let first = handle_event(&service, &event).await;
    let pipeline = service.registry().get(Driver::SadTalker);
    let second = handle_event(&service, &event).await;

    assert!(matches!(first, JobOutput::Completed { .. }), "got {first:?}");
    assert!(matches!(second, JobOutput::Completed { .. }), "got {second:?}");
    assert!(Arc::ptr_eq(&pipeline, &service.registry().get(Driver::SadTalker)));
    assert_eq!(service.registry().len(), 1);
}
