use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};
use serde::Serialize;
use std::sync::Arc;

use engine::compile_timeline;

use crate::jobs::render::{TimelineRenderRequest, TransitionRenderRequest};
use crate::jobs::{JobManager, JobType};

#[derive(Serialize)]
pub struct RenderResponse {
    job_id: i64,
}

pub fn router(job_manager: Arc<JobManager>) -> Router {
    Router::new()
        .route("/", post(submit_timeline))
        .route("/transition", post(submit_transition))
        .with_state(job_manager)
}

/// Enqueue a timeline render. Compilation is pure, so the clip list is
/// compiled once here purely for validation: a bad clip fails the request
/// with its index instead of a job that dies later.
async fn submit_timeline(
    State(job_manager): State<Arc<JobManager>>,
    Json(req): Json<TimelineRenderRequest>,
) -> Result<Json<RenderResponse>, (StatusCode, String)> {
    compile_timeline(&req.clips, &req.output)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    let payload = serde_json::to_value(&req)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let job_id = job_manager
        .create_job(JobType::RenderTimeline, payload)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(RenderResponse { job_id }))
}

/// Enqueue a cross-fade render. Clip durations are probed at run time, so
/// only the structural parts can be validated up front.
async fn submit_transition(
    State(job_manager): State<Arc<JobManager>>,
    Json(req): Json<TransitionRenderRequest>,
) -> Result<Json<RenderResponse>, (StatusCode, String)> {
    if req.sources.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "transition render needs at least one source".to_string(),
        ));
    }
    if req.sources.len() >= 2 && req.transition_duration <= 0.0 {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!(
                "transition duration must be positive, got {}",
                req.transition_duration
            ),
        ));
    }

    let payload = serde_json::to_value(&req)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let job_id = job_manager
        .create_job(JobType::RenderTransition, payload)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(RenderResponse { job_id }))
}
