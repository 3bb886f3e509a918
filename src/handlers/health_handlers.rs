//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /status   -> readiness: can we write to the preview bucket?

use crate::{errors::AppError, services::preview_store::PreviewStore};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::time::Duration;
use tracing::error;

/// The status probe must answer quickly, so it gets one retry and
/// half-second timeouts.
const STATUS_PROBE_RETRIES: u32 = 1;
const STATUS_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// `GET /healthz`
///
/// Very small liveness probe. Always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /status`
///
/// Writes a probe object to the bucket. HTTP 200 when the write succeeds,
/// HTTP 503 when the store cannot be reached.
pub async fn service_status(
    State(store): State<PreviewStore>,
) -> Result<impl IntoResponse, AppError> {
    if !store
        .is_available(STATUS_PROBE_RETRIES, STATUS_PROBE_TIMEOUT, STATUS_PROBE_TIMEOUT)
        .await
    {
        error!("Could not connect to store");
        return Err(AppError::unavailable("Cannot connect to store"));
    }
    Ok((StatusCode::OK, Json(StatusResponse { iam: "ok".into() })))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct StatusResponse {
    iam: String,
}
