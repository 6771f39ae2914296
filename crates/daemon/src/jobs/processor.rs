use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::jobs::render::{self, RenderContext, TimelineRenderRequest, TransitionRenderRequest};
use crate::jobs::{CancelRegistry, JobStatus, JobType};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Polls the job store for pending renders and runs them up to a fixed
/// concurrency ceiling. Jobs across timelines are independent; ordering only
/// matters inside one job (fetch, then compile, then encode).
pub struct JobProcessor {
    ctx: Arc<RenderContext>,
    cancels: CancelRegistry,
    job_concurrency: usize,
}

impl JobProcessor {
    pub fn new(ctx: Arc<RenderContext>, cancels: CancelRegistry, job_concurrency: usize) -> Self {
        JobProcessor {
            ctx,
            cancels,
            job_concurrency: job_concurrency.max(1),
        }
    }

    pub async fn run(&self) {
        loop {
            let claimed = match self.claim_pending() {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!("failed to poll pending jobs: {e:?}");
                    sleep(POLL_INTERVAL).await;
                    continue;
                }
            };

            stream::iter(claimed)
                .for_each_concurrent(self.job_concurrency, |(job_id, cancel)| async move {
                    self.process_job(job_id, cancel).await;
                })
                .await;

            sleep(POLL_INTERVAL).await;
        }
    }

    /// Claim the oldest pending jobs, at most one batch's worth. Each claim
    /// marks the job Running and registers its cancellation token in the
    /// same step, so a cancel request arriving before the job actually
    /// starts lands on a live token instead of being lost.
    fn claim_pending(&self) -> anyhow::Result<Vec<(i64, CancellationToken)>> {
        let mut ids = self.ctx.job_manager.pending_job_ids()?;
        ids.truncate(self.job_concurrency);

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            self.ctx
                .job_manager
                .update_job_status(id, JobStatus::Running)?;
            claimed.push((id, self.cancels.register(id)));
        }
        Ok(claimed)
    }

    async fn process_job(&self, job_id: i64, cancel: CancellationToken) {
        let job = match self.ctx.job_manager.get_job(job_id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("claimed job {job_id} disappeared");
                self.cancels.remove(job_id);
                return;
            }
            Err(e) => {
                error!("failed to load job {job_id}: {e:?}");
                self.cancels.remove(job_id);
                return;
            }
        };

        // A cancel can land between claim and start, through the token or
        // directly on the stored status. Honor it before doing any work.
        if cancel.is_cancelled() || job.status != JobStatus::Running {
            self.cancels.remove(job_id);
            if job.status == JobStatus::Running {
                let _ = self
                    .ctx
                    .job_manager
                    .update_job_status(job_id, JobStatus::Cancelled);
            }
            info!("job {job_id} cancelled before start");
            return;
        }

        let payload = job.payload.unwrap_or_default();
        let outcome = match job.job_type {
            JobType::RenderTimeline => match serde_json::from_value::<TimelineRenderRequest>(payload)
            {
                Ok(req) => render::run_timeline_job(&self.ctx, job_id, req, cancel.clone()).await,
                Err(e) => Err(anyhow::anyhow!("invalid job payload: {e}")),
            },
            JobType::RenderTransition => {
                match serde_json::from_value::<TransitionRenderRequest>(payload) {
                    Ok(req) => {
                        render::run_transition_job(&self.ctx, job_id, req, cancel.clone()).await
                    }
                    Err(e) => Err(anyhow::anyhow!("invalid job payload: {e}")),
                }
            }
        };

        self.cancels.remove(job_id);

        let result = match outcome {
            Ok(path) => {
                info!("job {job_id} completed: {}", path.display());
                self.ctx
                    .job_manager
                    .complete_job(job_id, &path.to_string_lossy())
            }
            Err(e) if cancel.is_cancelled() => {
                info!("job {job_id} cancelled: {e:#}");
                self.ctx
                    .job_manager
                    .update_job_status(job_id, JobStatus::Cancelled)
            }
            Err(e) => {
                error!("job {job_id} failed: {e:#}");
                self.ctx.job_manager.fail_job(job_id, &format!("{e:#}"))
            }
        };
        if let Err(e) = result {
            error!("failed to record outcome of job {job_id}: {e:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::executor::RenderExecutor;
    use crate::jobs::JobManager;
    use crate::media::encoder::EncodeProcessError;
    use crate::media::fetch::{SourceFetcher, SourceFetchError};
    use async_trait::async_trait;
    use engine::RenderCommand;
    use serde_json::json;
    use std::path::{Path, PathBuf};

    struct PassthroughFetcher;

    #[async_trait]
    impl SourceFetcher for PassthroughFetcher {
        async fn fetch(&self, source: &str, _dest_dir: &Path) -> Result<PathBuf, SourceFetchError> {
            Ok(PathBuf::from(source))
        }
    }

    struct NoopExecutor;

    #[async_trait]
    impl RenderExecutor for NoopExecutor {
        async fn execute(
            &self,
            _cmd: &RenderCommand,
            _total_duration: f64,
            cancel: CancellationToken,
            _on_progress: &(dyn Fn(f64) + Send + Sync),
        ) -> Result<(), EncodeProcessError> {
            if cancel.is_cancelled() {
                return Err(EncodeProcessError::Cancelled);
            }
            Ok(())
        }
    }

    fn processor(job_concurrency: usize) -> (JobProcessor, Arc<JobManager>, CancelRegistry) {
        let job_manager = Arc::new(JobManager::new(Arc::new(Database::in_memory().unwrap())));
        let cancels = CancelRegistry::default();
        let ctx = Arc::new(RenderContext {
            job_manager: job_manager.clone(),
            fetcher: Arc::new(PassthroughFetcher),
            executor: Arc::new(NoopExecutor),
            jobs_dir: std::env::temp_dir().join("renderd-processor-tests"),
            fetch_concurrency: 2,
        });
        (
            JobProcessor::new(ctx, cancels.clone(), job_concurrency),
            job_manager,
            cancels,
        )
    }

    #[test]
    fn claims_are_capped_and_carry_live_tokens() {
        let (processor, job_manager, cancels) = processor(2);
        let ids: Vec<i64> = (0..3)
            .map(|_| {
                job_manager
                    .create_job(JobType::RenderTimeline, json!({}))
                    .unwrap()
            })
            .collect();

        let claimed = processor.claim_pending().unwrap();
        assert_eq!(claimed.len(), 2);
        for (id, _) in &claimed {
            let job = job_manager.get_job(*id).unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Running);
            // A cancel request arriving right now must hit a live token.
            assert!(cancels.cancel(*id));
        }

        // The job beyond the ceiling stays pending for the next poll.
        let unclaimed = job_manager.get_job(ids[2]).unwrap().unwrap();
        assert_eq!(unclaimed.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn cancel_between_claim_and_start_stops_the_job() {
        let (processor, job_manager, cancels) = processor(1);
        let id = job_manager
            .create_job(JobType::RenderTimeline, json!({}))
            .unwrap();

        let claimed = processor.claim_pending().unwrap();
        let (job_id, token) = claimed.into_iter().next().unwrap();
        assert_eq!(job_id, id);

        // Cancel lands while the job waits behind the rest of its batch.
        assert!(cancels.cancel(job_id));
        processor.process_job(job_id, token).await;

        let job = job_manager.get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn status_cancelled_before_start_is_honored() {
        let (processor, job_manager, _cancels) = processor(1);
        let id = job_manager
            .create_job(JobType::RenderTimeline, json!({}))
            .unwrap();

        let claimed = processor.claim_pending().unwrap();
        let (job_id, token) = claimed.into_iter().next().unwrap();

        // The API's no-live-token fallback writes straight to the store.
        job_manager
            .update_job_status(job_id, JobStatus::Cancelled)
            .unwrap();
        processor.process_job(job_id, token).await;

        let job = job_manager.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
    }
}
