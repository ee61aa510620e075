//! Session handlers: submit, status, result, cancel.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::{Validate, ValidationError};

use cutmirror_models::{JobResult, JobStatus, ProgressEvent, SessionId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitJobRequest {
    #[validate(length(min = 1, message = "reference_path is required"))]
    pub reference_path: String,
    #[validate(
        length(min = 1, max = 500, message = "between 1 and 500 clip paths are required"),
        custom(function = "validate_clip_paths")
    )]
    pub clip_paths: Vec<String>,
}

fn validate_clip_paths(paths: &[String]) -> Result<(), ValidationError> {
    if paths.iter().any(|p| p.trim().is_empty()) {
        return Err(ValidationError::new("empty_clip_path"));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelJobResponse {
    pub session_id: SessionId,
    /// False when the session had already finished
    pub cancelled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobSummary {
    pub session_id: SessionId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

/// POST /api/jobs
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    request.validate()?;

    let clips: Vec<PathBuf> = request.clip_paths.iter().map(PathBuf::from).collect();
    let session_id = state
        .jobs
        .submit(PathBuf::from(&request.reference_path), clips)
        .await?;
    info!(session_id = %session_id, clips = request.clip_paths.len(), "submit_job");

    Ok((StatusCode::ACCEPTED, Json(SubmitJobResponse { session_id })))
}

/// GET /api/jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobSummary>> {
    let jobs = state
        .jobs
        .list()
        .await
        .into_iter()
        .map(|(session_id, status, created_at)| JobSummary {
            session_id,
            status,
            created_at,
        })
        .collect();
    Json(jobs)
}

/// GET /api/jobs/:id
///
/// Latest progress event; the polling alternative to the WebSocket stream.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ProgressEvent>> {
    let session_id = parse_session_id(&session_id)?;
    Ok(Json(state.jobs.status(&session_id).await?))
}

/// GET /api/jobs/:id/result
///
/// 409 until the session completes.
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<JobResult>> {
    let session_id = parse_session_id(&session_id)?;
    let result = state.jobs.get_result(&session_id).await?;
    Ok(Json(result.as_ref().clone()))
}

/// DELETE /api/jobs/:id
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<CancelJobResponse>> {
    let session_id = parse_session_id(&session_id)?;
    let cancelled = state.jobs.cancel(&session_id).await?;
    info!(session_id = %session_id, cancelled, "cancel_job");
    Ok(Json(CancelJobResponse { session_id, cancelled }))
}

/// Session ids are generated UUIDs; reject anything else before lookup.
pub fn parse_session_id(raw: &str) -> ApiResult<SessionId> {
    let valid = !raw.is_empty() && raw.len() <= 64 && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(ApiError::bad_request("Invalid session id format"));
    }
    Ok(SessionId::from_string(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_request_validation() {
        let valid = SubmitJobRequest {
            reference_path: "ref.mp4".to_string(),
            clip_paths: vec!["a.mp4".to_string()],
        };
        assert!(valid.validate().is_ok());

        let no_clips = SubmitJobRequest {
            reference_path: "ref.mp4".to_string(),
            clip_paths: vec![],
        };
        assert!(no_clips.validate().is_err());

        let blank_clip = SubmitJobRequest {
            reference_path: "ref.mp4".to_string(),
            clip_paths: vec!["a.mp4".to_string(), "  ".to_string()],
        };
        assert!(blank_clip.validate().is_err());

        let no_reference = SubmitJobRequest {
            reference_path: String::new(),
            clip_paths: vec!["a.mp4".to_string()],
        };
        assert!(no_reference.validate().is_err());
    }

    #[test]
    fn test_parse_session_id() {
        assert!(parse_session_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(parse_session_id("../etc").is_err());
        assert!(parse_session_id("").is_err());
    }
}
