//! Mail transport trait for pluggable email delivery backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::result::AppResult;

/// A fully rendered plain-text email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Trait for email delivery backends.
///
/// Implementations exist for an SMTP relay and a log-only sink. The trait
/// is defined here in `invigil-core` and implemented in `invigil-service`.
#[async_trait]
pub trait MailTransport: Send + Sync + std::fmt::Debug + 'static {
    /// Return the transport name (e.g., "smtp", "log").
    fn transport_type(&self) -> &str;

    /// Deliver one email.
    async fn send(&self, mail: &OutgoingMail) -> AppResult<()>;
}
