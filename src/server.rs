//! HTTP entry point.
//!
//! | Method | Path        | Response                                        |
//! |--------|-------------|-------------------------------------------------|
//! | GET    | `/healthz`  | `{"ok": true}`                                  |
//! | POST   | `/generate` | `{"status": "completed", "video_url": ...}`     |
//!
//! `/generate` failures are `400 {"detail": "<error>"}`, except a driver
//! without a backend, which is `200 {"status": "error", "message": ...}`.
//! A body that is not a valid request object is `422 {"detail": ...}`.

use crate::error::AvatarError;
use crate::pipeline::Driver;
use crate::schema::{GenerateRequest, GenerateResponse, HealthResponse};
use crate::service::AvatarService;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

/// Error body in the `{"detail": ...}` shape clients already parse.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<AvatarError> for ApiError {
    fn from(err: AvatarError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: rejection.body_text(),
        }
    }
}

/// Build the router over a shared service.
pub fn router(service: Arc<AvatarService>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/generate", post(generate))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

async fn generate(
    State(service): State<Arc<AvatarService>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(req) = payload?;
    let driver: Driver = req.driver.parse()?;
    info!("POST /generate driver={driver}");

    let result = async {
        let video = service
            .generate_video(driver, &req.image(), &req.audio())
            .await?;
        service.publish_or_local(&video).await
    }
    .await;

    match result {
        Ok(url) => Ok(Json(GenerateResponse::completed(url))),
        Err(AvatarError::NotImplemented(message)) => Ok(Json(GenerateResponse::error(message))),
        Err(e) => {
            warn!("Generation failed ({}): {e}", e.kind());
            Err(e.into())
        }
    }
}

/// Serve `service` on `addr` until Ctrl-C.
pub async fn serve(service: Arc<AvatarService>, addr: SocketAddr) -> Result<(), AvatarError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AvatarError::io(format!("Failed to bind {addr}"), e))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            // If the signal handler cannot be installed the server just runs until killed.
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .map_err(|e| AvatarError::io("HTTP server error", e))
}
