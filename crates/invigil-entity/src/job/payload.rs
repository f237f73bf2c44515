//! Typed job payload definitions.

use serde::{Deserialize, Serialize};

use crate::mail::MailRequest;

/// Job type of the expiry sweep.
pub const EXCHANGE_EXPIRY_SWEEP: &str = "exchange_expiry_sweep";
/// Job type of one exchange email.
pub const EXCHANGE_MAIL: &str = "exchange_mail";
/// Job type of the daily retention cleanup.
pub const MAINTENANCE_CLEANUP: &str = "maintenance_cleanup";

/// Typed payloads for known job types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "job_type")]
pub enum JobPayload {
    /// Cancel exchanges whose exam is inside the notice window.
    #[serde(rename = "exchange_expiry_sweep")]
    ExchangeExpirySweep,
    /// Render and send one exchange email.
    #[serde(rename = "exchange_mail")]
    ExchangeMail(MailRequest),
    /// Purge finished jobs and old read notifications.
    #[serde(rename = "maintenance_cleanup")]
    MaintenanceCleanup,
}

impl JobPayload {
    /// The `job_type` column value for this payload.
    pub fn job_type(&self) -> &'static str {
        match self {
            Self::ExchangeExpirySweep => EXCHANGE_EXPIRY_SWEEP,
            Self::ExchangeMail(_) => EXCHANGE_MAIL,
            Self::MaintenanceCleanup => MAINTENANCE_CLEANUP,
        }
    }

    /// The queue this payload is routed to.
    pub fn queue(&self) -> &'static str {
        match self {
            Self::ExchangeExpirySweep => "critical",
            Self::ExchangeMail(_) => "mail",
            Self::MaintenanceCleanup => "maintenance",
        }
    }
}
