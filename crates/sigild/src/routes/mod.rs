//! HTTP route handlers for sigild.

use std::time::Duration;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use sigil_common::SigilError;

use crate::state::AppState;

mod health;
mod sessions;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))

        // Pattern sessions
        .route("/sessions", post(sessions::create_session))
        .route("/sessions/restore", post(sessions::restore_session))
        .route("/sessions/{id}", axum::routing::delete(sessions::delete_session))
        .route("/sessions/{id}/events", post(sessions::post_events))
        .route("/sessions/{id}/restart", post(sessions::restart_session))
        .route("/sessions/{id}/snapshot", get(sessions::get_snapshot))

        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(timeout)),
        )

        // Add shared state
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

/// Error half of every handler result
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Map an engine error to its HTTP status
pub fn engine_error(err: SigilError) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %err, "Engine error");
    } else {
        tracing::debug!(error = %err, "Request rejected");
    }
    api_error(status, err.to_string())
}

/// Infrastructure failures (Redis); details stay in the log
pub fn internal_error(err: anyhow::Error) -> ApiError {
    tracing::error!(error = %format!("{:#}", err), "Internal error");
    api_error(StatusCode::SERVICE_UNAVAILABLE, "Secret storage unavailable")
}

pub fn not_found(id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("No session {}", id))
}
