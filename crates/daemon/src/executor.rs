use async_trait::async_trait;
use engine::RenderCommand;
use tokio_util::sync::CancellationToken;

use crate::media::encoder::EncodeProcessError;

/// Seam between the job pipeline and the encoder process. The pipeline hands
/// over a fully rendered command as an opaque unit; implementations own
/// spawning, progress reporting, and kill-on-cancel.
#[async_trait]
pub trait RenderExecutor: Send + Sync {
    async fn execute(
        &self,
        cmd: &RenderCommand,
        total_duration: f64,
        cancel: CancellationToken,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<(), EncodeProcessError>;
}
