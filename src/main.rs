//! Invigil server: duty exchange background services.
//!
//! Wires configuration, logging, the database, the expiry sweep schedule and
//! the job worker that delivers exchange emails.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use invigil_core::config::AppConfig;
use invigil_core::error::AppError;
use invigil_database::DatabasePool;
use invigil_database::repositories::{JobRepository, NotificationRepository};
use invigil_database::store::PgExchangeStore;
use invigil_service::mail::transport_from_config;
use invigil_service::{ExchangeService, ExpirySweeper, MailService};
use invigil_worker::jobs::{ExchangeMailHandler, ExpirySweepHandler, MaintenanceCleanupHandler};
use invigil_worker::{CronScheduler, JobExecutor, JobQueue, WorkerRunner};

#[tokio::main]
async fn main() {
    let env = std::env::var("INVIGIL_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config, &env).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig, env: &str) -> Result<(), AppError> {
    info!(version = env!("CARGO_PKG_VERSION"), env, "Starting Invigil");

    // ── Database connection + migrations ─────────────────────────
    let db = DatabasePool::connect(&config.database).await?;
    if !db.health_check().await? {
        return Err(AppError::database("Database health check returned an unexpected value"));
    }
    db.migrate_if_enabled(&config.database).await?;
    let pool = db.pool().clone();

    // ── Repositories and services ────────────────────────────────
    let job_repo = Arc::new(JobRepository::new(pool.clone()));
    let notification_repo = Arc::new(NotificationRepository::new(pool.clone()));
    let store = Arc::new(PgExchangeStore::new(pool));

    let exchanges = Arc::new(ExchangeService::new(
        store,
        &config.exchange,
        &config.mail,
    ));
    let sweeper = ExpirySweeper::new(Arc::clone(&exchanges));
    let mail = MailService::new(transport_from_config(&config.mail)?);

    if !config.worker.enabled {
        warn!("Background worker disabled; exchanges will not expire and emails stay queued");
        db.close().await;
        return Ok(());
    }

    // ── Worker and scheduler ─────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_id = format!("worker-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
    let job_queue = Arc::new(JobQueue::new(Arc::clone(&job_repo), worker_id));

    let mut executor = JobExecutor::new();
    executor.register(Arc::new(ExpirySweepHandler::new(sweeper)));
    executor.register(Arc::new(ExchangeMailHandler::new(mail)));
    executor.register(Arc::new(MaintenanceCleanupHandler::new(
        job_repo,
        notification_repo,
        &config.worker,
    )));

    let runner = WorkerRunner::new(
        Arc::clone(&job_queue),
        Arc::new(executor),
        config.worker.clone(),
    );

    let mut scheduler = CronScheduler::new(Arc::clone(&job_queue)).await?;
    scheduler.register_default_tasks(&config.exchange).await?;
    scheduler.start().await?;

    let worker_handle = tokio::spawn(async move {
        runner.run(shutdown_rx).await;
    });
    info!("Background worker started");

    // ── Graceful shutdown ────────────────────────────────────────
    shutdown_signal().await;
    info!("Shutdown signal received, starting graceful shutdown");
    let _ = shutdown_tx.send(true);

    if let Err(e) = scheduler.shutdown().await {
        error!(error = %e, "Scheduler shutdown failed");
    }
    if tokio::time::timeout(Duration::from_secs(30), worker_handle)
        .await
        .is_err()
    {
        warn!("Worker did not stop within 30s");
    }
    db.close().await;

    info!("Invigil shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
