//! One-off expiry sweep.

use chrono::Utc;
use clap::Args;

use crate::output::{self, OutputFormat};
use invigil_core::config::AppConfig;
use invigil_core::error::AppError;
use invigil_service::ExpirySweeper;

/// Arguments for the sweep command
#[derive(Debug, Args)]
pub struct SweepArgs {
    /// List the exchanges that would expire without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Execute the sweep command
pub async fn execute(args: &SweepArgs, config: &AppConfig, format: OutputFormat) -> Result<(), AppError> {
    let pool = super::create_db_pool(config).await?;
    let sweeper = ExpirySweeper::new(super::exchange_service(config, pool));
    let now = Utc::now();

    if args.dry_run {
        let ids = sweeper.candidates(now).await?;
        if ids.is_empty() {
            output::print_success("No exchange inside the notice window.");
        } else {
            println!(
                "{} exchange(s) inside the {}h notice window:",
                ids.len(),
                config.exchange.notice_window_hours
            );
            for id in ids {
                println!("  {id}");
            }
        }
        return Ok(());
    }

    let report = sweeper.run(now).await?;
    output::print_item(&report, format);
    if report.failed > 0 {
        output::print_warning(&format!(
            "{} exchange(s) could not be expired; the next sweep retries them",
            report.failed
        ));
    }
    Ok(())
}
