//! Request handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::AppState;
use crate::models::{ErrorRecord, Job};
use crate::queue::SubmitError;

#[derive(Deserialize)]
pub struct SubmitRequest {
    /// Free-form share text; any supported URL inside it works.
    pub share: String,
}

#[derive(Serialize)]
pub struct JobResponse {
    pub id: String,
    pub status: &'static str,
    pub share_url: String,
    pub post_id: Option<i64>,
    pub attempts: usize,
    pub errors: Vec<ErrorRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            status: job.status.as_str(),
            attempts: job.attempts(),
            id: job.id,
            share_url: job.share_url,
            post_id: job.post_id,
            errors: job.error_history,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: message.into() })).into_response()
}

/// POST /download - accept a share for asynchronous processing.
pub async fn submit_download(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Response {
    match state.dispatcher.submit(&request.share).await {
        Ok(job) => (StatusCode::ACCEPTED, Json(JobResponse::from(job))).into_response(),
        Err(e @ SubmitError::Unsupported) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(SubmitError::Db(e)) => {
            error!(error = %e, "submit failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// GET /download/:job_id - job status and error history.
pub async fn get_download(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    match state.ctx.jobs().get(&job_id).await {
        Ok(Some(job)) => Json(JobResponse::from(job)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "no such job"),
        Err(e) => {
            error!(%job_id, error = %e, "job lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
