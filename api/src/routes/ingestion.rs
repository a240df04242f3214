use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use common::storage::types::ingestion_job::{IngestionJob, PipelineType};
use ingestion_pipeline::scheduler::DEFAULT_FINALIZER_BACKOFF;
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct StartJobRequest {
    pub folder_path: String,
    pub file_types: Vec<String>,
    #[serde(default)]
    pub pipeline_type: PipelineType,
}

#[derive(Debug, serde::Serialize)]
pub struct StartJobResponse {
    pub job_id: String,
    pub status: &'static str,
}

/// Enumerates the folder, enqueues one task per file, and returns immediately without
/// waiting for any worker (§4.6, §6 `/ingestion/start_job`).
pub async fn start_job(
    State(state): State<ApiState>,
    Json(request): Json<StartJobRequest>,
) -> Result<Json<StartJobResponse>, ApiError> {
    let job_id = state
        .job_scheduler
        .start_folder_job(&request.folder_path, &request.file_types, request.pipeline_type)
        .await?;
    spawn_finalizer(&state, job_id.clone());
    Ok(Json(StartJobResponse {
        job_id,
        status: "scheduled",
    }))
}

#[derive(Debug, Deserialize)]
pub struct StartSingleFileRequest {
    pub file_path: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub pipeline_type: PipelineType,
}

pub async fn start_single_file(
    State(state): State<ApiState>,
    Json(request): Json<StartSingleFileRequest>,
) -> Result<Json<StartJobResponse>, ApiError> {
    let job_id = state
        .job_scheduler
        .start_single_file_job(&request.file_path, request.pipeline_type)
        .await?;
    spawn_finalizer(&state, job_id.clone());
    Ok(Json(StartJobResponse {
        job_id,
        status: "scheduled",
    }))
}

pub async fn job_status(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<IngestionJob>, ApiError> {
    let job = state
        .progress
        .get(&job_id)
        .await?
        .ok_or_else(|| common::error::AppError::NotFound(format!("job {job_id} not found")))?;
    Ok(Json(job))
}

pub async fn list_jobs(
    State(state): State<ApiState>,
) -> Result<Json<Vec<IngestionJob>>, ApiError> {
    let jobs = state.progress.list_active().await?;
    Ok(Json(jobs))
}

fn spawn_finalizer(state: &ApiState, job_id: String) {
    ingestion_pipeline::spawn_finalizer(state.job_scheduler.clone(), job_id, DEFAULT_FINALIZER_BACKOFF);
}
