//! Log-only mail transport used when SMTP is disabled.

use async_trait::async_trait;
use tracing::info;

use invigil_core::result::AppResult;
use invigil_core::traits::mail::{MailTransport, OutgoingMail};

/// Writes each email to the log instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    fn transport_type(&self) -> &str {
        "log"
    }

    async fn send(&self, mail: &OutgoingMail) -> AppResult<()> {
        info!(to = %mail.to, subject = %mail.subject, body = %mail.body, "Email not sent (mail disabled)");
        Ok(())
    }
}
