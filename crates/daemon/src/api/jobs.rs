use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::jobs::{CancelRegistry, Job, JobManager, JobStatus};

#[derive(Serialize)]
pub struct JobResponse {
    id: i64,
    job_type: crate::jobs::JobType,
    status: JobStatus,
    progress: f64,
    error: Option<String>,
    result_path: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        JobResponse {
            id: job.id,
            job_type: job.job_type,
            status: job.status,
            progress: job.progress,
            error: job.error,
            result_path: job.result_path,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

const LIST_LIMIT: usize = 100;

pub fn router(job_manager: Arc<JobManager>, cancels: CancelRegistry) -> Router {
    Router::new()
        .route("/", get(list_jobs))
        .route("/:id", get(get_job))
        .route("/:id/cancel", post(cancel_job))
        .with_state((job_manager, cancels))
}

async fn list_jobs(
    State((job_manager, _)): State<(Arc<JobManager>, CancelRegistry)>,
) -> Result<Json<Vec<JobResponse>>, StatusCode> {
    let jobs = job_manager
        .list_jobs(LIST_LIMIT)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(jobs.into_iter().map(JobResponse::from).collect()))
}

async fn get_job(
    State((job_manager, _)): State<(Arc<JobManager>, CancelRegistry)>,
    Path(id): Path<i64>,
) -> Result<Json<JobResponse>, StatusCode> {
    let job = job_manager
        .get_job(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(job.into()))
}

/// Cancel a job. A running render gets its encoder process killed through
/// the cancellation token; a job still waiting in the queue is just marked
/// Cancelled so the processor never claims it.
async fn cancel_job(
    State((job_manager, cancels)): State<(Arc<JobManager>, CancelRegistry)>,
    Path(id): Path<i64>,
) -> Result<Json<JobResponse>, StatusCode> {
    let job = job_manager
        .get_job(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    match job.status {
        JobStatus::Pending => {
            job_manager
                .update_job_status(id, JobStatus::Cancelled)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        }
        JobStatus::Running => {
            // No live token means the processor claimed the job but has not
            // started it yet. Persist the cancel so it is not lost; the
            // processor re-checks the stored status before running.
            if !cancels.cancel(id) {
                job_manager
                    .update_job_status(id, JobStatus::Cancelled)
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            }
        }
        // Finished jobs stay as they are.
        _ => {}
    }

    let job = job_manager
        .get_job(id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(job.into()))
}
