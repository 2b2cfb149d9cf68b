//! Trim job handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::info;
use trim_models::{Edl, JobId, JobSnapshot, JobState, RenditionOutcome, TrimRequest};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: JobId,
}

/// Wire view of a job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub id: JobId,
    pub edl: Option<Edl>,
    pub output_files: Vec<String>,
    pub status: JobState,
    pub renditions: Vec<RenditionOutcome>,
    pub error: Option<String>,
}

impl From<JobSnapshot> for JobResponse {
    fn from(snapshot: JobSnapshot) -> Self {
        Self {
            id: snapshot.id,
            edl: snapshot.request.map(|r| r.edl),
            output_files: snapshot.produced_outputs,
            status: snapshot.state,
            renditions: snapshot.renditions,
            error: snapshot.failure,
        }
    }
}

/// POST /trim
pub async fn create_job(
    State(state): State<AppState>,
    payload: Result<Json<TrimRequest>, JsonRejection>,
) -> ApiResult<Json<CreateJobResponse>> {
    let Json(request) = payload?;
    let job_id = state.registry.create_job(request).await?;
    info!(job_id = %job_id, "Accepted trim request");

    Ok(Json(CreateJobResponse { job_id }))
}

/// GET /trim/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let id = JobId::from(job_id);
    let snapshot = state
        .registry
        .get_job(&id)
        .await
        .ok_or_else(|| ApiError::not_found(id.as_str()))?;

    Ok(Json(snapshot.into()))
}

/// DELETE /trim/:job_id
///
/// Responds with the job's state after the request; cancelling a finished
/// job leaves it unchanged.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobState>> {
    let id = JobId::from(job_id);
    let job_state = state
        .registry
        .cancel(&id)
        .await
        .ok_or_else(|| ApiError::not_found(id.as_str()))?;

    Ok(Json(job_state))
}
