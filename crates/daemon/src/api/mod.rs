use axum::Router;
use std::sync::Arc;

use crate::jobs::{CancelRegistry, JobManager};

pub mod jobs;
pub mod renders;

pub fn router(job_manager: Arc<JobManager>, cancels: CancelRegistry) -> Router {
    Router::new()
        .nest("/renders", renders::router(job_manager.clone()))
        .nest("/jobs", jobs::router(job_manager, cancels))
}
