//! Exchange inspection and administrative cancellation.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use invigil_core::config::AppConfig;
use invigil_core::error::AppError;
use invigil_core::types::pagination::PageRequest;
use invigil_entity::exchange::Exchange;
use invigil_service::Actor;

/// Arguments for exchange commands
#[derive(Debug, Args)]
pub struct ExchangeArgs {
    /// Exchange subcommand
    #[command(subcommand)]
    pub command: ExchangeCommand,
}

/// Exchange subcommands
#[derive(Debug, Subcommand)]
pub enum ExchangeCommand {
    /// List active exchanges
    List {
        /// Page number
        #[arg(long, default_value = "1")]
        page: u64,
        /// Page size
        #[arg(long, default_value = "20")]
        page_size: u64,
    },
    /// Show one exchange
    Show {
        /// Exchange ID
        id: String,
    },
    /// Cancel an active exchange as an administrator
    Cancel {
        /// Exchange ID
        id: String,
        /// User ID of the administrator performing the cancellation
        #[arg(long = "as")]
        admin_user_id: String,
        /// Skip confirmation
        #[arg(long)]
        force: bool,
    },
}

/// Exchange display row
#[derive(Debug, Serialize, Tabled)]
struct ExchangeRow {
    id: String,
    status: String,
    requester: String,
    offered: String,
    accepter: String,
    updated: String,
}

impl From<&Exchange> for ExchangeRow {
    fn from(e: &Exchange) -> Self {
        let short = |id: uuid::Uuid| id.simple().to_string()[..8].to_string();
        Self {
            id: e.id.to_string(),
            status: e.status.to_string(),
            requester: short(e.requester_id),
            offered: short(e.offered_attribution_id),
            accepter: e.accepter_id.map(short).unwrap_or_else(|| "-".to_string()),
            updated: e.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Execute exchange commands
pub async fn execute(
    args: &ExchangeArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let pool = super::create_db_pool(config).await?;
    let exchanges = super::exchange_service(config, pool);

    match &args.command {
        ExchangeCommand::List { page, page_size } => {
            let page = PageRequest::new(*page, *page_size);
            let result = exchanges.list_active(&Actor::System, &page).await?;
            let rows: Vec<ExchangeRow> = result.items.iter().map(ExchangeRow::from).collect();
            output::print_list(&rows, format);
            if format == OutputFormat::Table {
                println!(
                    "Page {}/{} ({} active)",
                    result.page, result.total_pages, result.total_items
                );
            }
        }
        ExchangeCommand::Show { id } => {
            let exchange = exchanges.get(&Actor::System, super::parse_id(id)?).await?;
            output::print_item(&exchange, format);
        }
        ExchangeCommand::Cancel {
            id,
            admin_user_id,
            force,
        } => {
            let exchange_id = super::parse_id(id)?;
            let actor = Actor::Admin {
                user_id: super::parse_id(admin_user_id)?,
            };

            if !force {
                let confirm = dialoguer::Confirm::new()
                    .with_prompt(format!(
                        "Cancel exchange {exchange_id} and release its duties?"
                    ))
                    .default(false)
                    .interact()
                    .map_err(|e| AppError::internal(format!("Input error: {e}")))?;

                if !confirm {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let exchange = exchanges.admin_cancel(&actor, exchange_id).await?;
            output::print_success(&format!(
                "Exchange {} is now {}",
                exchange.id, exchange.status
            ));
        }
    }

    Ok(())
}
