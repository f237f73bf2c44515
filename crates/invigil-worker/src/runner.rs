//! Worker runner: main loop that polls for jobs and executes them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Semaphore, watch};
use tokio::time;
use tracing::{error, info, trace, warn};

use invigil_core::config::WorkerConfig;
use invigil_entity::job::Job;

use crate::executor::{JobExecutionError, JobExecutor};
use crate::queue::JobQueue;

/// First retry delay after a transient failure.
const BASE_RETRY_DELAY_SECS: i64 = 30;
/// Upper bound on the retry delay.
const MAX_RETRY_DELAY_SECS: i64 = 3600;

/// Delay before the next attempt once `attempts` have failed.
pub fn retry_delay(attempts: i32) -> chrono::Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 16) as u32;
    let secs = BASE_RETRY_DELAY_SECS.saturating_mul(1_i64 << exponent);
    chrono::Duration::seconds(secs.min(MAX_RETRY_DELAY_SECS))
}

/// Main worker runner that polls queues and executes jobs
#[derive(Debug)]
pub struct WorkerRunner {
    queue: Arc<JobQueue>,
    executor: Arc<JobExecutor>,
    config: WorkerConfig,
    /// Queues to poll (in priority order)
    queues: Vec<String>,
}

impl WorkerRunner {
    /// Create a new worker runner
    pub fn new(queue: Arc<JobQueue>, executor: Arc<JobExecutor>, config: WorkerConfig) -> Self {
        Self {
            queue,
            executor,
            config,
            queues: vec![
                "critical".to_string(),
                "mail".to_string(),
                "maintenance".to_string(),
            ],
        }
    }

    /// Start the worker runner; runs until the cancel signal is received
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        info!(
            worker_id = %self.queue.worker_id(),
            concurrency = self.config.concurrency,
            poll_interval_seconds = self.config.poll_interval_seconds,
            queues = ?self.queues,
            "Worker started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let poll_interval = Duration::from_secs(self.config.poll_interval_seconds);

        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        info!(worker_id = %self.queue.worker_id(), "Worker received shutdown signal");
                        break;
                    }
                }
                _ = self.poll_and_execute(&semaphore) => {
                    tokio::select! {
                        _ = cancel.changed() => {
                            if *cancel.borrow() {
                                info!(worker_id = %self.queue.worker_id(), "Worker shutting down");
                                break;
                            }
                        }
                        _ = time::sleep(poll_interval) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.queue.worker_id(), "Waiting for in-flight jobs to complete");
        let max_permits = self.config.concurrency as u32;
        let _ = time::timeout(Duration::from_secs(30), semaphore.acquire_many(max_permits)).await;
        info!(worker_id = %self.queue.worker_id(), "Worker shut down complete");
    }

    /// Poll for a job and execute it if available
    async fn poll_and_execute(&self, semaphore: &Arc<Semaphore>) {
        let Ok(permit) = semaphore.clone().try_acquire_owned() else {
            trace!("All worker slots occupied");
            return;
        };

        let queue_refs: Vec<&str> = self.queues.iter().map(String::as_str).collect();

        match self.queue.dequeue(&queue_refs).await {
            Ok(Some(job)) => {
                let queue = Arc::clone(&self.queue);
                let executor = Arc::clone(&self.executor);
                tokio::spawn(async move {
                    let _permit = permit;
                    process(&queue, &executor, job).await;
                });
            }
            Ok(None) => trace!("No jobs available in queues"),
            Err(e) => error!(error = %e, "Failed to dequeue job"),
        }
    }
}

/// Execute one claimed job and record its outcome.
async fn process(queue: &JobQueue, executor: &JobExecutor, job: Job) {
    let job_id = job.id;
    let attempts = job.attempts.unwrap_or(1);
    let max_attempts = job.max_attempts.unwrap_or(1);

    let outcome = match executor.execute(&job).await {
        Ok(result) => {
            info!(job_id = %job_id, job_type = %job.job_type, "Job completed");
            queue.complete(job_id, result).await
        }
        Err(JobExecutionError::Transient(msg)) if attempts < max_attempts => {
            let run_at = Utc::now() + retry_delay(attempts);
            warn!(
                job_id = %job_id,
                job_type = %job.job_type,
                attempt = attempts,
                max_attempts,
                retry_at = %run_at,
                error = %msg,
                "Job failed, will retry"
            );
            queue.reschedule(job_id, &msg, run_at).await
        }
        Err(err) => {
            let msg = err.to_string();
            error!(
                job_id = %job_id,
                job_type = %job.job_type,
                attempt = attempts,
                error = %msg,
                "Job failed permanently"
            );
            queue.fail(job_id, &msg).await
        }
    };

    if let Err(e) = outcome {
        error!(job_id = %job_id, error = %e, "Failed to record job outcome");
    }
}
