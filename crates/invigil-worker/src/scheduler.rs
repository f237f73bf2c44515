//! Cron scheduler for the expiry sweep and periodic maintenance.

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{debug, error, info};

use invigil_core::config::ExchangeConfig;
use invigil_core::error::AppError;
use invigil_entity::job::{JobPayload, JobPriority};

use crate::queue::JobQueue;

/// Daily cleanup at 03:30.
const MAINTENANCE_SCHEDULE: &str = "0 30 3 * * *";

/// Cron-based scheduler for periodic background tasks
pub struct CronScheduler {
    scheduler: JobScheduler,
    queue: Arc<JobQueue>,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Create a new cron scheduler
    pub async fn new(queue: Arc<JobQueue>) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        Ok(Self { scheduler, queue })
    }

    /// Register the expiry sweep and the daily cleanup
    pub async fn register_default_tasks(&self, exchange: &ExchangeConfig) -> Result<(), AppError> {
        self.register_expiry_sweep(exchange.sweep_interval_minutes)
            .await?;
        self.register_maintenance_cleanup().await?;

        info!("All scheduled tasks registered");
        Ok(())
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;

        info!("Cron scheduler started");
        Ok(())
    }

    /// Shutdown the scheduler
    pub async fn shutdown(&mut self) -> Result<(), AppError> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;

        info!("Cron scheduler shut down");
        Ok(())
    }

    /// Expiry sweep, every `interval_minutes`
    async fn register_expiry_sweep(&self, interval_minutes: u64) -> Result<(), AppError> {
        let queue = Arc::clone(&self.queue);
        let interval = Duration::from_secs(interval_minutes * 60);
        let job = CronJob::new_repeated_async(interval, move |_uuid, _lock| {
            let queue = Arc::clone(&queue);
            Box::pin(async move {
                enqueue(&queue, JobPayload::ExchangeExpirySweep, JobPriority::Critical).await;
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create expiry sweep schedule: {e}")))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add expiry sweep schedule: {e}")))?;

        info!(interval_minutes, "Registered: exchange_expiry_sweep");
        Ok(())
    }

    /// Retention cleanup, daily
    async fn register_maintenance_cleanup(&self) -> Result<(), AppError> {
        let queue = Arc::clone(&self.queue);
        let job = CronJob::new_async(MAINTENANCE_SCHEDULE, move |_uuid, _lock| {
            let queue = Arc::clone(&queue);
            Box::pin(async move {
                enqueue(&queue, JobPayload::MaintenanceCleanup, JobPriority::Low).await;
            })
        })
        .map_err(|e| {
            AppError::internal(format!("Failed to create maintenance_cleanup schedule: {e}"))
        })?;

        self.scheduler.add(job).await.map_err(|e| {
            AppError::internal(format!("Failed to add maintenance_cleanup schedule: {e}"))
        })?;

        info!(schedule = MAINTENANCE_SCHEDULE, "Registered: maintenance_cleanup");
        Ok(())
    }
}

/// Enqueue one scheduled run. Scheduled jobs are not retried; the next tick
/// covers a failed run.
async fn enqueue(queue: &JobQueue, payload: JobPayload, priority: JobPriority) {
    debug!(job_type = payload.job_type(), "Scheduling job");
    if let Err(e) = queue.enqueue_payload(&payload, priority, 1).await {
        error!(job_type = payload.job_type(), error = %e, "Failed to enqueue scheduled job");
    }
}
