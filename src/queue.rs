//! Durable job queue (C0e): SQLite-backed, idempotent by job key.
//!
//! Grounded on the teacher's `SqliteTaskQueue`
//! (`orchestrator/queue.rs`): same `tokio::task::spawn_blocking`-wrapped
//! `rusqlite` connection, same pending/running/completed/failed status
//! column. Generalized with a unique `job_key` so the EvolutionController
//! can re-enqueue the same artifact id while a prior attempt is still
//! pending or running and have it land as a no-op (§9's "message-passing
//! worker pool" redesign flag).

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_key: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub created_at: String,
    pub updated_at: String,
    pub attempts: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        QueueError::Database(e.to_string())
    }
}

pub struct JobQueue {
    db_path: PathBuf,
}

impl JobQueue {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let db_path = db_path.as_ref().to_path_buf();
        let path = db_path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), QueueError> {
            let conn = Connection::open(&path)?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS jobs (
                    id TEXT PRIMARY KEY,
                    job_key TEXT NOT NULL UNIQUE,
                    kind TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    last_error TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
                CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);",
            )?;
            Ok(())
        })
        .await
        .map_err(|e| QueueError::Database(e.to_string()))??;
        Ok(Self { db_path })
    }

    /// Enqueues `kind`/`payload` under `job_key`. If a job with that key is
    /// already `pending` or `running`, this is a no-op and returns the
    /// existing job's id instead of inserting a duplicate.
    pub async fn enqueue(&self, job_key: &str, kind: &str, payload: serde_json::Value) -> Result<String, QueueError> {
        let path = self.db_path.clone();
        let job_key = job_key.to_string();
        let kind = kind.to_string();
        tokio::task::spawn_blocking(move || -> Result<String, QueueError> {
            let conn = Connection::open(&path)?;
            let existing: Option<(String, String)> = conn
                .query_row(
                    "SELECT id, status FROM jobs WHERE job_key = ?1",
                    params![job_key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            if let Some((id, status)) = existing {
                if matches!(JobStatus::from_str(&status), JobStatus::Pending | JobStatus::Running) {
                    return Ok(id);
                }
            }
            let id = Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();
            let payload_text = serde_json::to_string(&payload).map_err(|e| QueueError::Database(e.to_string()))?;
            conn.execute(
                "INSERT OR REPLACE INTO jobs (id, job_key, kind, payload, status, created_at, updated_at, attempts, last_error)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5, 0, NULL)",
                params![id, job_key, kind, payload_text, now],
            )?;
            Ok(id)
        })
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?
    }

    pub async fn dequeue(&self) -> Result<Option<Job>, QueueError> {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Job>, QueueError> {
            let mut conn = Connection::open(&path)?;
            let tx = conn.transaction()?;
            let row = tx
                .query_row(
                    "SELECT id, job_key, kind, payload, created_at, updated_at, attempts, last_error
                     FROM jobs WHERE status = 'pending' ORDER BY created_at ASC LIMIT 1",
                    [],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, u32>(6)?,
                            row.get::<_, Option<String>>(7)?,
                        ))
                    },
                )
                .optional()?;
            let Some((id, job_key, kind, payload, created_at, _updated_at, attempts, last_error)) = row else {
                return Ok(None);
            };
            let now = Utc::now().to_rfc3339();
            tx.execute("UPDATE jobs SET status = 'running', updated_at = ?1 WHERE id = ?2", params![now, id])?;
            tx.commit()?;
            Ok(Some(Job {
                id,
                job_key,
                kind,
                payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
                status: JobStatus::Running,
                created_at,
                updated_at: now,
                attempts,
                last_error,
            }))
        })
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?
    }

    pub async fn complete(&self, job_id: &str) -> Result<(), QueueError> {
        self.set_status(job_id, JobStatus::Completed, None).await
    }

    pub async fn fail(&self, job_id: &str, error: &str, should_retry: bool) -> Result<(), QueueError> {
        let status = if should_retry { JobStatus::Pending } else { JobStatus::Failed };
        self.set_status(job_id, status, Some(error.to_string())).await
    }

    async fn set_status(&self, job_id: &str, status: JobStatus, error: Option<String>) -> Result<(), QueueError> {
        let path = self.db_path.clone();
        let job_id = job_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), QueueError> {
            let conn = Connection::open(&path)?;
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE jobs SET status = ?1, updated_at = ?2, attempts = attempts + 1, last_error = ?3 WHERE id = ?4",
                params![status.as_str(), now, error, job_id],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?
    }

    pub async fn status_of(&self, job_key: &str) -> Result<Option<JobStatus>, QueueError> {
        let path = self.db_path.clone();
        let job_key = job_key.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<JobStatus>, QueueError> {
            let conn = Connection::open(&path)?;
            let status: Option<String> = conn
                .query_row("SELECT status FROM jobs WHERE job_key = ?1", params![job_key], |row| row.get(0))
                .optional()?;
            Ok(status.map(|s| JobStatus::from_str(&s)))
        })
        .await
        .map_err(|e| QueueError::Database(e.to_string()))?
    }
}
