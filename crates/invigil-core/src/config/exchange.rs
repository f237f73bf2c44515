//! Duty exchange configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Rules governing the duty exchange workflow and its expiry sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Minimum lead time, in hours, between now and an exam start for an
    /// exchange on that exam to be created, proposed, or kept alive.
    #[serde(default = "default_notice_window_hours")]
    pub notice_window_hours: i64,
    /// How often the expiry sweep is scheduled, in minutes.
    #[serde(default = "default_sweep_interval_minutes")]
    pub sweep_interval_minutes: u64,
    /// Base URL used to build deep links in notifications and emails.
    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,
}

impl ExchangeConfig {
    /// The notice window as a duration.
    pub fn notice_window(&self) -> Duration {
        Duration::hours(self.notice_window_hours)
    }

    /// Check that the sweep cadence can actually enforce the notice window.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.notice_window_hours <= 0 {
            return Err(AppError::configuration(
                "exchange.notice_window_hours must be positive",
            ));
        }
        if self.sweep_interval_minutes == 0 {
            return Err(AppError::configuration(
                "exchange.sweep_interval_minutes must be positive",
            ));
        }
        let window_minutes = self.notice_window_hours as u64 * 60;
        if self.sweep_interval_minutes > window_minutes {
            return Err(AppError::configuration(format!(
                "exchange.sweep_interval_minutes ({}) exceeds the notice window ({} minutes)",
                self.sweep_interval_minutes, window_minutes
            )));
        }
        Ok(())
    }

    /// Build a deep link to an exchange.
    pub fn exchange_link(&self, exchange_id: uuid::Uuid) -> String {
        format!(
            "{}/exchanges/{}",
            self.app_base_url.trim_end_matches('/'),
            exchange_id
        )
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            notice_window_hours: default_notice_window_hours(),
            sweep_interval_minutes: default_sweep_interval_minutes(),
            app_base_url: default_app_base_url(),
        }
    }
}

fn default_notice_window_hours() -> i64 {
    24
}

fn default_sweep_interval_minutes() -> u64 {
    15
}

fn default_app_base_url() -> String {
    "http://localhost:8000".to_string()
}
