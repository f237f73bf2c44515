//! Renders queued mail requests and hands them to the transport.

use std::sync::Arc;

use tracing::debug;

use invigil_core::result::AppResult;
use invigil_core::traits::mail::{MailTransport, OutgoingMail};
use invigil_entity::mail::MailRequest;

use super::template;

/// Delivers exchange emails through the configured transport.
#[derive(Debug, Clone)]
pub struct MailService {
    transport: Arc<dyn MailTransport>,
}

impl MailService {
    /// Creates a new mail service.
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self { transport }
    }

    /// Render `request` without sending it.
    pub fn render(&self, request: &MailRequest) -> AppResult<OutgoingMail> {
        template::render(request)
    }

    /// Send an already rendered email.
    pub async fn send(&self, mail: &OutgoingMail) -> AppResult<()> {
        debug!(
            transport = self.transport.transport_type(),
            to = %mail.to,
            "Dispatching email"
        );
        self.transport.send(mail).await
    }

    /// Render and send `request`.
    pub async fn deliver(&self, request: &MailRequest) -> AppResult<()> {
        let mail = self.render(request)?;
        self.send(&mail).await
    }
}
