//! Background job processing and scheduled tasks for Invigil.
//!
//! This crate provides:
//! - A worker runner that polls for and executes queued jobs
//! - A cron scheduler for the expiry sweep and daily maintenance
//! - A job executor that dispatches jobs to the correct handler
//! - Job handlers for the sweep, exchange emails, and retention cleanup

pub mod executor;
pub mod jobs;
pub mod queue;
pub mod runner;
pub mod scheduler;

pub use executor::{JobExecutionError, JobExecutor, JobHandler};
pub use queue::{JobQueue, QueueStats};
pub use runner::WorkerRunner;
pub use scheduler::CronScheduler;
