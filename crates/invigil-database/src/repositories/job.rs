//! Persistence for the `jobs` table backing the worker queue.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use invigil_core::error::{AppError, ErrorKind};
use invigil_core::result::AppResult;
use invigil_entity::job::{CreateJob, Job, JobStatus};

/// Queue operations over the `jobs` table.
///
/// Exchange mails are inserted through `ExchangeTx` inside the transition's
/// transaction; everything else goes through this repository.
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: PgPool,
}

fn db_error(action: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, format!("Failed to {action}"), e)
}

impl JobRepository {
    /// Create a new job repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Claim the next due job of `queue` for `worker_id`.
    ///
    /// `SKIP LOCKED` lets several workers poll the same queue; the claim
    /// counts as an attempt.
    pub async fn dequeue(&self, queue: &str, worker_id: &str) -> AppResult<Option<Job>> {
        sqlx::query_as::<_, Job>(
            "UPDATE jobs SET status = 'running', started_at = NOW(), worker_id = $2, \
             attempts = COALESCE(attempts, 0) + 1, updated_at = NOW() \
             WHERE id = ( \
                SELECT id FROM jobs \
                WHERE queue = $1 AND status = 'pending' \
                AND (scheduled_at IS NULL OR scheduled_at <= NOW()) \
                ORDER BY \
                    CASE priority WHEN 'critical' THEN 0 WHEN 'high' THEN 1 WHEN 'normal' THEN 2 ELSE 3 END, \
                    created_at ASC \
                FOR UPDATE SKIP LOCKED \
                LIMIT 1 \
             ) RETURNING *",
        )
        .bind(queue)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("dequeue job"))
    }

    /// Insert a pending job.
    pub async fn create(&self, data: &CreateJob) -> AppResult<Job> {
        sqlx::query_as::<_, Job>(
            "INSERT INTO jobs (job_type, queue, priority, payload, max_attempts, scheduled_at, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(&data.job_type)
        .bind(&data.queue)
        .bind(&data.priority)
        .bind(&data.payload)
        .bind(data.max_attempts)
        .bind(data.scheduled_at)
        .bind(data.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("create job"))
    }

    /// Record a successful run and its result.
    pub async fn complete(&self, job_id: Uuid, result: Option<&serde_json::Value>) -> AppResult<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'completed', result = $2, error_message = NULL, \
             completed_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(db_error("complete job"))?;
        Ok(())
    }

    /// Record a final failure.
    pub async fn fail(&self, job_id: Uuid, error_message: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'failed', error_message = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(db_error("mark job as failed"))?;
        Ok(())
    }

    /// Put a running job back in the queue after a transient failure.
    pub async fn reschedule(
        &self,
        job_id: Uuid,
        error_message: &str,
        run_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'pending', error_message = $2, scheduled_at = $3, \
             started_at = NULL, worker_id = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .bind(error_message)
        .bind(run_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("reschedule job"))?;
        Ok(())
    }

    /// Count jobs in a given status.
    pub async fn count_by_status(&self, status: JobStatus) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("count jobs"))
    }

    /// Give a failed job a fresh set of attempts.
    ///
    /// Returns `false` when no failed job has this id.
    pub async fn retry(&self, job_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'pending', attempts = 0, error_message = NULL, \
             scheduled_at = NULL, started_at = NULL, worker_id = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = 'failed'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(db_error("retry job"))?;
        Ok(result.rows_affected() == 1)
    }

    /// Cancel a job that has not started.
    ///
    /// Returns `false` when no pending job has this id.
    pub async fn cancel(&self, job_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'cancelled', updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(db_error("cancel job"))?;
        Ok(result.rows_affected() == 1)
    }

    /// Delete finished jobs last touched before `before`.
    pub async fn cleanup_old(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE status IN ('completed', 'failed', 'cancelled') AND updated_at < $1",
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(db_error("clean up jobs"))?;
        Ok(result.rows_affected())
    }
}
