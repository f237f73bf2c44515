//! Background worker configuration.

use serde::{Deserialize, Serialize};

/// Background job worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the worker is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of concurrent job processing tasks.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Interval in seconds between job queue polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Finished jobs older than this are purged by the daily cleanup.
    #[serde(default = "default_job_retention")]
    pub job_retention_days: i64,
    /// Read notifications older than this are purged by the daily cleanup.
    #[serde(default = "default_notification_retention")]
    pub notification_retention_days: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: default_concurrency(),
            poll_interval_seconds: default_poll_interval(),
            job_retention_days: default_job_retention(),
            notification_retention_days: default_notification_retention(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_poll_interval() -> u64 {
    5
}

fn default_job_retention() -> i64 {
    30
}

fn default_notification_retention() -> i64 {
    180
}
