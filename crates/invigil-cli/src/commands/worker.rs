//! Job queue CLI commands.

use std::sync::Arc;

use clap::{Args, Subcommand, ValueEnum};

use crate::output;
use invigil_core::config::AppConfig;
use invigil_core::error::AppError;
use invigil_database::repositories::JobRepository;
use invigil_entity::job::{JobPayload, JobPriority, JobStatus};
use invigil_worker::JobQueue;

/// Arguments for worker commands
#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Worker subcommand
    #[command(subcommand)]
    pub command: WorkerCommand,
}

/// Worker subcommands
#[derive(Debug, Subcommand)]
pub enum WorkerCommand {
    /// Show queue status
    Status,
    /// Enqueue a scheduled task now
    Trigger {
        /// Task to enqueue
        #[arg(value_enum)]
        task: Task,
    },
    /// Put a failed job back in its queue
    Retry {
        /// Job ID
        id: String,
    },
    /// Cancel a pending job
    Cancel {
        /// Job ID
        id: String,
    },
}

/// Tasks that can be triggered by hand
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Task {
    /// Expiry sweep
    Sweep,
    /// Retention cleanup
    Cleanup,
}

impl Task {
    fn payload(self) -> (JobPayload, JobPriority) {
        match self {
            Self::Sweep => (JobPayload::ExchangeExpirySweep, JobPriority::Critical),
            Self::Cleanup => (JobPayload::MaintenanceCleanup, JobPriority::Low),
        }
    }
}

/// Execute worker commands
pub async fn execute(args: &WorkerArgs, config: &AppConfig) -> Result<(), AppError> {
    let pool = super::create_db_pool(config).await?;
    let job_repo = Arc::new(JobRepository::new(pool));
    let queue = JobQueue::new(Arc::clone(&job_repo), "cli".to_string());

    match &args.command {
        WorkerCommand::Status => {
            let stats = queue.stats().await?;
            let completed = job_repo.count_by_status(JobStatus::Completed).await?;

            println!("Worker Queue Status:");
            output::print_kv("Pending", &stats.pending.to_string());
            output::print_kv("Running", &stats.running.to_string());
            output::print_kv("Failed", &stats.failed.to_string());
            output::print_kv("Completed", &completed.to_string());
            output::print_kv("Worker Enabled", &config.worker.enabled.to_string());
            output::print_kv("Concurrency", &config.worker.concurrency.to_string());
            output::print_kv(
                "Sweep Interval",
                &format!("{} min", config.exchange.sweep_interval_minutes),
            );
        }
        WorkerCommand::Trigger { task } => {
            let (payload, priority) = task.payload();
            let job = queue.enqueue_payload(&payload, priority, 1).await?;
            output::print_success(&format!(
                "Job '{}' enqueued on '{}' (id: {})",
                job.job_type, job.queue, job.id
            ));
        }
        WorkerCommand::Retry { id } => {
            queue.retry(super::parse_id(id)?).await?;
            output::print_success(&format!("Job {id} queued for retry"));
        }
        WorkerCommand::Cancel { id } => {
            queue.cancel(super::parse_id(id)?).await?;
            output::print_success(&format!("Job {id} cancelled"));
        }
    }

    Ok(())
}
