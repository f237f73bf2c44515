//! Daily retention cleanup of finished jobs and read notifications.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::info;

use invigil_core::config::WorkerConfig;
use invigil_database::repositories::{JobRepository, NotificationRepository};
use invigil_entity::job::Job;
use invigil_entity::job::payload::MAINTENANCE_CLEANUP;

use crate::executor::{JobExecutionError, JobHandler};

/// Purges rows past their retention period.
#[derive(Debug)]
pub struct MaintenanceCleanupHandler {
    job_repo: Arc<JobRepository>,
    notification_repo: Arc<NotificationRepository>,
    job_retention_days: i64,
    notification_retention_days: i64,
}

impl MaintenanceCleanupHandler {
    /// Create a new cleanup handler with retention taken from `config`
    pub fn new(
        job_repo: Arc<JobRepository>,
        notification_repo: Arc<NotificationRepository>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            job_repo,
            notification_repo,
            job_retention_days: config.job_retention_days,
            notification_retention_days: config.notification_retention_days,
        }
    }
}

#[async_trait]
impl JobHandler for MaintenanceCleanupHandler {
    fn job_type(&self) -> &str {
        MAINTENANCE_CLEANUP
    }

    async fn execute(&self, _job: &Job) -> Result<Option<Value>, JobExecutionError> {
        let now = Utc::now();

        let jobs_removed = self
            .job_repo
            .cleanup_old(now - Duration::days(self.job_retention_days))
            .await
            .map_err(|e| JobExecutionError::Transient(format!("Job cleanup failed: {e}")))?;

        let notifications_removed = self
            .notification_repo
            .delete_read_before(now - Duration::days(self.notification_retention_days))
            .await
            .map_err(|e| {
                JobExecutionError::Transient(format!("Notification cleanup failed: {e}"))
            })?;

        info!(jobs_removed, notifications_removed, "Maintenance cleanup finished");

        Ok(Some(serde_json::json!({
            "task": MAINTENANCE_CLEANUP,
            "jobs_removed": jobs_removed,
            "notifications_removed": notifications_removed,
            "job_retention_days": self.job_retention_days,
            "notification_retention_days": self.notification_retention_days,
        })))
    }
}
