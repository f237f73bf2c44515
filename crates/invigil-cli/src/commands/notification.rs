//! Inbox inspection for one user.

use std::sync::Arc;

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use invigil_core::config::AppConfig;
use invigil_core::error::AppError;
use invigil_core::types::pagination::PageRequest;
use invigil_database::repositories::NotificationRepository;
use invigil_service::{Actor, NotificationService};

/// Arguments for notification commands
#[derive(Debug, Args)]
pub struct NotificationArgs {
    /// User whose inbox to read
    #[arg(long)]
    pub user: String,

    /// Notification subcommand
    #[command(subcommand)]
    pub command: NotificationCommand,
}

/// Notification subcommands
#[derive(Debug, Subcommand)]
pub enum NotificationCommand {
    /// List notifications, newest first
    List {
        /// Page number
        #[arg(long, default_value = "1")]
        page: u64,
        /// Page size
        #[arg(long, default_value = "20")]
        page_size: u64,
    },
    /// Count unread notifications
    Unread,
    /// Mark one notification read
    Read {
        /// Notification ID
        id: String,
    },
    /// Mark every notification read
    ReadAll,
}

/// Notification display row
#[derive(Debug, Serialize, Tabled)]
struct NotificationRow {
    id: String,
    #[tabled(rename = "type")]
    kind: String,
    message: String,
    read: String,
    created: String,
}

/// Execute notification commands
pub async fn execute(
    args: &NotificationArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let pool = super::create_db_pool(config).await?;
    let notifications = NotificationService::new(Arc::new(NotificationRepository::new(pool)));
    // Inbox calls only use the account id.
    let actor = Actor::Admin {
        user_id: super::parse_id(&args.user)?,
    };

    match &args.command {
        NotificationCommand::List { page, page_size } => {
            let page = PageRequest::new(*page, *page_size);
            let result = notifications.list_notifications(&actor, &page).await?;
            let rows: Vec<NotificationRow> = result
                .items
                .iter()
                .map(|n| NotificationRow {
                    id: n.id.to_string(),
                    kind: n.kind.clone(),
                    message: n.message.clone(),
                    read: if n.is_unread() { "✗" } else { "✓" }.to_string(),
                    created: n.created_at.format("%Y-%m-%d %H:%M").to_string(),
                })
                .collect();
            output::print_list(&rows, format);
        }
        NotificationCommand::Unread => {
            let count = notifications.unread_count(&actor).await?;
            println!("Unread notifications: {count}");
        }
        NotificationCommand::Read { id } => {
            notifications
                .mark_read(&actor, super::parse_id(id)?)
                .await?;
            output::print_success(&format!("Notification {id} marked read"));
        }
        NotificationCommand::ReadAll => {
            let count = notifications.mark_all_read(&actor).await?;
            output::print_success(&format!("{count} notification(s) marked read"));
        }
    }

    Ok(())
}
