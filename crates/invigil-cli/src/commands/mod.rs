//! CLI command definitions and dispatch.

pub mod exchange;
pub mod migrate;
pub mod notification;
pub mod sweep;
pub mod worker;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlx::PgPool;

use crate::output::OutputFormat;
use invigil_core::config::AppConfig;
use invigil_core::error::AppError;
use invigil_database::DatabasePool;
use invigil_database::store::PgExchangeStore;
use invigil_service::ExchangeService;

/// Invigil: exam duty exchange administration
#[derive(Debug, Parser)]
#[command(name = "invigil", version, about, long_about = None)]
pub struct Cli {
    /// Configuration environment (loads config/default.toml + config/{env}.toml)
    #[arg(short, long, default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Run the expiry sweep once
    Sweep(sweep::SweepArgs),
    /// Inspect and cancel exchanges
    Exchange(exchange::ExchangeArgs),
    /// Read a user's notifications
    Notification(notification::NotificationArgs),
    /// Job queue management
    Worker(worker::WorkerArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let config = AppConfig::load(&self.env)?;
        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, &config, self.format).await,
            Commands::Sweep(args) => sweep::execute(args, &config, self.format).await,
            Commands::Exchange(args) => exchange::execute(args, &config, self.format).await,
            Commands::Notification(args) => {
                notification::execute(args, &config, self.format).await
            }
            Commands::Worker(args) => worker::execute(args, &config).await,
        }
    }
}

/// Helper: create database pool from config
pub async fn create_db_pool(config: &AppConfig) -> Result<PgPool, AppError> {
    let pool = DatabasePool::connect(&config.database).await?;
    Ok(pool.into_pool())
}

/// Helper: exchange service over PostgreSQL
pub fn exchange_service(config: &AppConfig, pool: PgPool) -> Arc<ExchangeService> {
    Arc::new(ExchangeService::new(
        Arc::new(PgExchangeStore::new(pool)),
        &config.exchange,
        &config.mail,
    ))
}

/// Helper: parse a UUID argument
pub fn parse_id(raw: &str) -> Result<uuid::Uuid, AppError> {
    uuid::Uuid::parse_str(raw).map_err(|e| AppError::validation(format!("Invalid UUID '{raw}': {e}")))
}
