use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::db::Database;

pub mod processor;
pub mod render;
pub mod workdir;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobType {
    RenderTimeline,
    RenderTransition,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: f64,
    pub payload: Option<Value>,
    pub error: Option<String>,
    pub result_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct JobManager {
    db: Arc<Database>,
}

impl JobManager {
    pub fn new(db: Arc<Database>) -> Self {
        JobManager { db }
    }

    pub fn create_job(&self, job_type: JobType, payload: Value) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let job_type_str = serde_json::to_string(&job_type)?;
        let status_str = serde_json::to_string(&JobStatus::Pending)?;
        let payload_str = serde_json::to_string(&payload)?;

        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO jobs (type, status, progress, payload_json, created_at, updated_at)
             VALUES (?1, ?2, 0.0, ?3, ?4, ?5)",
            params![job_type_str, status_str, payload_str, now, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_job(&self, id: i64) -> Result<Option<Job>> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, type, status, progress, payload_json, error, result_path,
                    created_at, updated_at
             FROM jobs WHERE id = ?1",
        )?;

        let mut rows = stmt.query_map(params![id], job_from_row)?;

        match rows.next() {
            Some(Ok(job)) => Ok(Some(job)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Most recent jobs first, capped at `limit`.
    pub fn list_jobs(&self, limit: usize) -> Result<Vec<Job>> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, type, status, progress, payload_json, error, result_path,
                    created_at, updated_at
             FROM jobs ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let jobs = stmt
            .query_map(params![limit as i64], job_from_row)?
            .collect::<std::result::Result<Vec<Job>, _>>()?;
        Ok(jobs)
    }

    /// Ids of jobs waiting to run, oldest first.
    pub fn pending_job_ids(&self) -> Result<Vec<i64>> {
        let status_str = serde_json::to_string(&JobStatus::Pending)?;
        let conn = self.db.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id FROM jobs WHERE status = ?1 ORDER BY created_at ASC, id ASC")?;
        let ids = stmt
            .query_map(params![status_str], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    pub fn update_job_status(&self, id: i64, status: JobStatus) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let status_str = serde_json::to_string(&status)?;
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status_str, now, id],
        )?;
        Ok(())
    }

    pub fn set_progress(&self, id: i64, progress: f64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET progress = ?1, updated_at = ?2 WHERE id = ?3",
            params![progress.clamp(0.0, 1.0), now, id],
        )?;
        Ok(())
    }

    pub fn complete_job(&self, id: i64, result_path: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let status_str = serde_json::to_string(&JobStatus::Completed)?;
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET status = ?1, progress = 1.0, result_path = ?2, updated_at = ?3
             WHERE id = ?4",
            params![status_str, result_path, now, id],
        )?;
        Ok(())
    }

    pub fn fail_job(&self, id: i64, error: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let status_str = serde_json::to_string(&JobStatus::Failed)?;
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
            params![status_str, error, now, id],
        )?;
        Ok(())
    }
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let job_type_str: String = row.get(1)?;
    let status_str: String = row.get(2)?;
    let payload_str: Option<String> = row.get(4)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    let job_type = serde_json::from_str(&job_type_str).map_err(|_| {
        rusqlite::Error::InvalidColumnType(1, "TEXT".to_string(), rusqlite::types::Type::Text)
    })?;
    let status = serde_json::from_str(&status_str).map_err(|_| {
        rusqlite::Error::InvalidColumnType(2, "TEXT".to_string(), rusqlite::types::Type::Text)
    })?;
    let payload = payload_str
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(4, "TEXT".to_string(), rusqlite::types::Type::Text)
        })?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(7, "TEXT".to_string(), rusqlite::types::Type::Text)
        })?
        .with_timezone(&Utc);
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(8, "TEXT".to_string(), rusqlite::types::Type::Text)
        })?
        .with_timezone(&Utc);

    Ok(Job {
        id: row.get(0)?,
        job_type,
        status,
        progress: row.get(3)?,
        payload,
        error: row.get(5)?,
        result_path: row.get(6)?,
        created_at,
        updated_at,
    })
}

/// Live cancellation tokens for running jobs. A cancel request flips the
/// token; the render pipeline observes it and kills the encoder process.
#[derive(Clone, Default)]
pub struct CancelRegistry {
    inner: Arc<Mutex<HashMap<i64, CancellationToken>>>,
}

impl CancelRegistry {
    pub fn register(&self, job_id: i64) -> CancellationToken {
        let token = CancellationToken::new();
        self.inner.lock().unwrap().insert(job_id, token.clone());
        token
    }

    /// Trigger cancellation. Returns false when the job has no live token
    /// (not started, or already finished).
    pub fn cancel(&self, job_id: i64) -> bool {
        match self.inner.lock().unwrap().get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, job_id: i64) {
        self.inner.lock().unwrap().remove(&job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> JobManager {
        JobManager::new(Arc::new(Database::in_memory().unwrap()))
    }

    #[test]
    fn create_and_fetch_round_trips() {
        let jm = manager();
        let id = jm
            .create_job(JobType::RenderTimeline, json!({"destination": "/tmp/out.mp4"}))
            .unwrap();

        let job = jm.get_job(id).unwrap().unwrap();
        assert_eq!(job.job_type, JobType::RenderTimeline);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0.0);
        assert_eq!(job.payload.unwrap()["destination"], "/tmp/out.mp4");
    }

    #[test]
    fn pending_ids_come_back_oldest_first() {
        let jm = manager();
        let a = jm.create_job(JobType::RenderTimeline, json!({})).unwrap();
        let b = jm.create_job(JobType::RenderTransition, json!({})).unwrap();
        jm.update_job_status(a, JobStatus::Running).unwrap();

        assert_eq!(jm.pending_job_ids().unwrap(), vec![b]);
    }

    #[test]
    fn list_is_newest_first_and_capped() {
        let jm = manager();
        let ids: Vec<i64> = (0..3)
            .map(|_| jm.create_job(JobType::RenderTimeline, json!({})).unwrap())
            .collect();

        let listed: Vec<i64> = jm.list_jobs(2).unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(listed, vec![ids[2], ids[1]]);
    }

    #[test]
    fn completion_and_failure_record_outcome() {
        let jm = manager();
        let a = jm.create_job(JobType::RenderTimeline, json!({})).unwrap();
        jm.complete_job(a, "/tmp/out.mp4").unwrap();
        let job = jm.get_job(a).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 1.0);
        assert_eq!(job.result_path.as_deref(), Some("/tmp/out.mp4"));

        let b = jm.create_job(JobType::RenderTimeline, json!({})).unwrap();
        jm.fail_job(b, "clip 1: non-positive video duration").unwrap();
        let job = jm.get_job(b).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("clip 1"));
    }

    #[test]
    fn cancel_registry_only_hits_live_tokens() {
        let reg = CancelRegistry::default();
        assert!(!reg.cancel(7));
        let token = reg.register(7);
        assert!(reg.cancel(7));
        assert!(token.is_cancelled());
        reg.remove(7);
        assert!(!reg.cancel(7));
    }
}
