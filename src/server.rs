use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN,
        },
        HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::errors::AppError;
use crate::models::{GroupPayload, SubmissionSummary};
use crate::relay::Relay;
use crate::security::InputValidator;

/// A full album of base64 WebP is well past axum's 2 MiB default.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    /// Server-side wait after each delivered group.
    pub pacing_delay: Duration,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/relay/summary", post(relay_summary).fallback(fallback))
        .route("/relay/group", post(relay_group).fallback(fallback))
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .with_state(state)
}

/// HTTP face of [`AppError`].
#[derive(Debug)]
pub enum ApiError {
    App(AppError),
    /// Body refused by the JSON extractor: 413 over the size limit, 415 without a
    /// JSON content type, 400 otherwise.
    Body(JsonRejection),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body(rejection)
    }
}

fn upstream_or_bad_gateway(status: Option<u16>) -> StatusCode {
    status
        .filter(|s| (400..600).contains(s))
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(StatusCode::BAD_GATEWAY)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::App(err) => app_error_response(err),
            ApiError::Body(rejection) => {
                let status = match rejection.status() {
                    StatusCode::UNPROCESSABLE_ENTITY => StatusCode::BAD_REQUEST,
                    other => other,
                };
                let message = rejection.body_text();
                log::warn!("Rejected request body: {} -> {}", message, status);
                (status, Json(json!({ "error": message }))).into_response()
            }
        }
    }
}

fn app_error_response(err: AppError) -> Response {
    let status = match &err {
        AppError::Validation { .. } | AppError::Json(_) | AppError::Base64(_) => {
            StatusCode::BAD_REQUEST
        }
        AppError::SummaryDeliveryFailed { status, .. }
        | AppError::BatchDeliveryFailed { status, .. } => upstream_or_bad_gateway(*status),
        AppError::PartialDelivery { .. } => upstream_or_bad_gateway(err.upstream_status()),
        AppError::RetriesExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        log::error!("{} -> {}", err, status);
    } else {
        log::warn!("{} -> {}", err, status);
    }

    let body = match &err {
        AppError::RetriesExhausted { attempts, .. } => json!({
            "error": err.to_string(),
            "attempts": attempts,
        }),
        _ => json!({ "error": err.to_string() }),
    };

    (status, Json(body)).into_response()
}

async fn fallback(method: Method) -> Response {
    if method == Method::OPTIONS {
        return (
            StatusCode::NO_CONTENT,
            [
                (ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
                (ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
            ],
        )
            .into_response();
    }

    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response()
}

async fn relay_summary(
    State(state): State<AppState>,
    payload: Result<Json<SubmissionSummary>, JsonRejection>,
) -> Result<&'static str, ApiError> {
    let Json(summary) = payload?;

    state.relay.send_summary(&summary).await?;
    Ok("ok")
}

async fn relay_group(
    State(state): State<AppState>,
    payload: Result<Json<GroupPayload>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(payload) = payload?;
    InputValidator::validate_group_payload(&payload)?;

    let batch = payload.into_batch();
    let delivered = state
        .relay
        .send_batch(&batch, state.relay.max_attempts())
        .await?;

    tokio::time::sleep(state.pacing_delay).await;

    Ok(Json(json!({
        "ok": true,
        "result": delivered.result,
        "attempts": delivered.attempts,
    })))
}
