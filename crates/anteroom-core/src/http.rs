// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP boundary for anteroom-core.
//!
//! Three operations touch the coordinator: begin, complete, status. The
//! route functions translate between HTTP and the handlers; coordination
//! logic lives in [`crate::handlers`].

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::CoordinatorError;
use crate::handlers::{
    BeginRequest, HandlerState, SignalRequest, handle_begin, handle_list, handle_signal,
    handle_status,
};
use crate::persistence::{WorkRecord, WorkStatus};
use crate::wait::WaitOutcome;

/// Build the coordinator router.
pub fn build_router(state: Arc<HandlerState>) -> Router {
    Router::new()
        .route("/api/v1/work", post(begin_work).get(list_work))
        .route("/api/v1/work/complete", post(complete_work))
        .route("/api/v1/work/{correlation_key}", get(work_status))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Error mapping
// ============================================================================

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Coordinator error adapted to an HTTP response.
struct ApiError(CoordinatorError);

impl From<CoordinatorError> for ApiError {
    fn from(e: CoordinatorError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoordinatorError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            CoordinatorError::RecordNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.0.error_code().to_string(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// Handle returned when a begin request outlives its wait deadline.
#[derive(Debug, Serialize)]
pub struct AcceptedHandle {
    /// Key to poll.
    pub correlation_key: String,
    /// Status endpoint for that key.
    pub status_url: String,
}

/// Status envelope for a work record.
#[derive(Debug, Serialize)]
pub struct WorkStatusResponse {
    /// Key of the unit of work.
    pub correlation_key: String,
    /// Current status string (pending, done, error).
    pub status: String,
    /// Result payload, present when done.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error payload, present when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    /// When the record was created.
    pub started_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl From<WorkRecord> for WorkStatusResponse {
    fn from(record: WorkRecord) -> Self {
        let result = record
            .result_payload
            .as_deref()
            .and_then(|bytes| serde_json::from_slice(bytes).ok());
        // Error payloads are stored as JSON text; fall back to a plain
        // string for anything that does not parse.
        let error = record.error_payload.map(|raw| {
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
        });

        Self {
            correlation_key: record.correlation_key,
            status: record.status,
            result,
            error,
            started_at: record.started_at,
            updated_at: record.updated_at,
        }
    }
}

fn status_url(correlation_key: &str) -> String {
    format!("/api/v1/work/{}", urlencoding::encode(correlation_key))
}

fn status_code_for(status: &str) -> StatusCode {
    match WorkStatus::parse(status) {
        Some(WorkStatus::Done) => StatusCode::OK,
        Some(WorkStatus::Error) => StatusCode::INTERNAL_SERVER_ERROR,
        // Unknown strings read as still-in-flight.
        Some(WorkStatus::Pending) | None => StatusCode::ACCEPTED,
    }
}

// ============================================================================
// Routes
// ============================================================================

async fn begin_work(
    State(state): State<Arc<HandlerState>>,
    Json(request): Json<BeginRequest>,
) -> Result<Response, ApiError> {
    let outcome = handle_begin(&state, request).await?;

    let response = match outcome {
        WaitOutcome::Completed(record) => {
            let body = record.result_payload.unwrap_or_else(|| b"null".to_vec());
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response()
        }
        // The work itself failed. This is a domain failure carried in the
        // status envelope, not a coordinator error body.
        WaitOutcome::Failed(record) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(WorkStatusResponse::from(record)),
        )
            .into_response(),
        WaitOutcome::TimedOut { correlation_key } => {
            let handle = AcceptedHandle {
                status_url: status_url(&correlation_key),
                correlation_key,
            };
            (StatusCode::ACCEPTED, Json(handle)).into_response()
        }
    };

    Ok(response)
}

async fn complete_work(
    State(state): State<Arc<HandlerState>>,
    Json(request): Json<SignalRequest>,
) -> Response {
    // Always 200: the engine retries failure responses indefinitely.
    let receipt = handle_signal(&state, request).await;
    (StatusCode::OK, Json(receipt)).into_response()
}

async fn work_status(
    State(state): State<Arc<HandlerState>>,
    Path(correlation_key): Path<String>,
) -> Result<Response, ApiError> {
    let record = handle_status(&state, &correlation_key).await?;
    let code = status_code_for(&record.status);
    Ok((code, Json(WorkStatusResponse::from(record))).into_response())
}

async fn list_work(State(state): State<Arc<HandlerState>>) -> Result<Response, ApiError> {
    let records = handle_list(&state).await?;
    let body: Vec<WorkStatusResponse> = records.into_iter().map(Into::into).collect();
    Ok((StatusCode::OK, Json(body)).into_response())
}

async fn health(State(state): State<Arc<HandlerState>>) -> Response {
    match state.persistence.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ok"})),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"status": "unavailable"})),
            )
                .into_response()
        }
    }
}
