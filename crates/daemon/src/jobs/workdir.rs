use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Exclusively-owned scratch directory for one render job. Fetched sources
/// and the encoder's output land here; `cleanup` must run on success and
/// failure alike so no job leaves orphaned intermediates behind.
pub struct JobDir {
    path: PathBuf,
}

impl JobDir {
    pub async fn create(root: &Path, job_id: i64) -> Result<Self> {
        let path = root.join(format!("job-{job_id}-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("creating job directory {}", path.display()))?;
        Ok(JobDir { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursive delete. Failure to clean up is logged, not propagated: the
    /// job's own outcome must not depend on scratch removal.
    pub async fn cleanup(self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.path).await {
            warn!("failed to remove job directory {}: {e}", self.path.display());
        }
    }
}
