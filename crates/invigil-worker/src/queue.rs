//! Job queue over the `jobs` table.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use invigil_core::error::AppError;
use invigil_database::repositories::JobRepository;
use invigil_entity::job::{CreateJob, Job, JobPayload, JobPriority, JobStatus};

/// Job queue for enqueuing and dequeuing work
#[derive(Debug, Clone)]
pub struct JobQueue {
    /// Job repository for database persistence
    repo: Arc<JobRepository>,
    /// Worker identifier for claiming jobs
    worker_id: String,
}

impl JobQueue {
    /// Create a new job queue
    pub fn new(repo: Arc<JobRepository>, worker_id: String) -> Self {
        Self { repo, worker_id }
    }

    /// The identifier this queue claims jobs under.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Enqueue a new job
    pub async fn enqueue(&self, params: &CreateJob) -> Result<Job, AppError> {
        let job = self
            .repo
            .create(params)
            .await
            .map_err(|e| AppError::internal(format!("Failed to enqueue job: {e}")))?;

        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            queue = %job.queue,
            priority = %job.priority,
            "Enqueued job"
        );
        Ok(job)
    }

    /// Enqueue a typed payload on its own queue.
    pub async fn enqueue_payload(
        &self,
        payload: &JobPayload,
        priority: JobPriority,
        max_attempts: i32,
    ) -> Result<Job, AppError> {
        let params = CreateJob::from_payload(payload, priority, max_attempts)?;
        self.enqueue(&params).await
    }

    /// Dequeue the next available job from the given queues, in order
    pub async fn dequeue(&self, queues: &[&str]) -> Result<Option<Job>, AppError> {
        for queue in queues {
            let job = self
                .repo
                .dequeue(queue, &self.worker_id)
                .await
                .map_err(|e| AppError::internal(format!("Failed to dequeue job: {e}")))?;

            if let Some(job) = job {
                debug!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    queue = %job.queue,
                    "Dequeued job"
                );
                return Ok(Some(job));
            }
        }

        Ok(None)
    }

    /// Mark a job as completed successfully
    pub async fn complete(
        &self,
        job_id: Uuid,
        result: Option<serde_json::Value>,
    ) -> Result<(), AppError> {
        self.repo
            .complete(job_id, result.as_ref())
            .await
            .map_err(|e| AppError::internal(format!("Failed to complete job: {e}")))?;

        debug!(job_id = %job_id, "Job completed");
        Ok(())
    }

    /// Mark a job as failed
    pub async fn fail(&self, job_id: Uuid, error: &str) -> Result<(), AppError> {
        self.repo
            .fail(job_id, error)
            .await
            .map_err(|e| AppError::internal(format!("Failed to mark job as failed: {e}")))?;

        debug!(job_id = %job_id, error = %error, "Job failed");
        Ok(())
    }

    /// Put a job back in its queue to run again at `run_at`
    pub async fn reschedule(
        &self,
        job_id: Uuid,
        error: &str,
        run_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.repo
            .reschedule(job_id, error, run_at)
            .await
            .map_err(|e| AppError::internal(format!("Failed to reschedule job: {e}")))?;

        debug!(job_id = %job_id, run_at = %run_at, "Job rescheduled");
        Ok(())
    }

    /// Cancel a pending job
    pub async fn cancel(&self, job_id: Uuid) -> Result<(), AppError> {
        if !self.repo.cancel(job_id).await? {
            return Err(AppError::not_found(format!("No pending job {job_id}")));
        }

        debug!(job_id = %job_id, "Job cancelled");
        Ok(())
    }

    /// Retry a failed job
    pub async fn retry(&self, job_id: Uuid) -> Result<(), AppError> {
        if !self.repo.retry(job_id).await? {
            return Err(AppError::not_found(format!("No failed job {job_id}")));
        }

        debug!(job_id = %job_id, "Job retried");
        Ok(())
    }

    /// Get queue statistics
    pub async fn stats(&self) -> Result<QueueStats, AppError> {
        Ok(QueueStats {
            pending: self.repo.count_by_status(JobStatus::Pending).await?,
            running: self.repo.count_by_status(JobStatus::Running).await?,
            failed: self.repo.count_by_status(JobStatus::Failed).await?,
            worker_id: self.worker_id.clone(),
        })
    }
}

/// Queue statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    /// Number of pending jobs
    pub pending: i64,
    /// Number of running jobs
    pub running: i64,
    /// Number of failed jobs
    pub failed: i64,
    /// Current worker identifier
    pub worker_id: String,
}
