//! Expiry sweep: cancels exchanges whose exam entered the notice window.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use invigil_core::result::AppResult;

use super::service::ExchangeService;

/// Outcome counters of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Exchanges selected as inside the window.
    pub candidates: usize,
    /// Exchanges moved to `cancelled_auto_expired`.
    pub expired: usize,
    /// Exchanges that had become terminal or left the window since selection.
    pub skipped: usize,
    /// Exchanges whose unit of work failed; retried on the next sweep.
    pub failed: usize,
}

/// Drives imminent exchanges to `cancelled_auto_expired`.
///
/// Candidates are selected without holding any lock, then each one is
/// expired in its own unit of work so that one failure never blocks the
/// rest of the sweep.
#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    exchanges: Arc<ExchangeService>,
}

impl ExpirySweeper {
    /// Create a sweeper over the exchange service.
    pub fn new(exchanges: Arc<ExchangeService>) -> Self {
        Self { exchanges }
    }

    /// IDs of the exchanges a sweep at `now` would try to expire.
    pub async fn candidates(&self, now: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        let window = self.exchanges.window_at(now);
        self.exchanges.store().find_expiring(window.cutoff()).await
    }

    /// Run one sweep at `now`.
    ///
    /// Only the candidate query can fail the sweep as a whole.
    pub async fn run(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let window = self.exchanges.window_at(now);
        let ids = self.candidates(now).await?;
        let mut report = SweepReport {
            candidates: ids.len(),
            ..SweepReport::default()
        };

        for exchange_id in ids {
            match self.exchanges.auto_expire(exchange_id, &window).await {
                Ok(true) => {
                    report.expired += 1;
                    info!(exchange_id = %exchange_id, outcome = "expired", "Exchange swept");
                }
                Ok(false) => {
                    report.skipped += 1;
                    info!(exchange_id = %exchange_id, outcome = "skipped", "Exchange swept");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(
                        exchange_id = %exchange_id,
                        outcome = "failed",
                        code = e.code(),
                        error = %e,
                        "Exchange swept"
                    );
                }
            }
        }

        info!(
            candidates = report.candidates,
            expired = report.expired,
            skipped = report.skipped,
            failed = report.failed,
            cutoff = %window.cutoff(),
            "Expiry sweep finished"
        );
        Ok(report)
    }
}
