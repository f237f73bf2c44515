//! Exchange email rendering and delivery.

pub mod log;
pub mod service;
pub mod smtp;
pub mod template;

use std::sync::Arc;

use tracing::info;

use invigil_core::config::MailConfig;
use invigil_core::result::AppResult;
use invigil_core::traits::mail::MailTransport;

pub use log::LogMailTransport;
pub use service::MailService;
pub use smtp::SmtpMailTransport;
pub use template::render;

/// Build the transport selected by configuration.
pub fn transport_from_config(config: &MailConfig) -> AppResult<Arc<dyn MailTransport>> {
    if config.enabled {
        info!(host = %config.smtp_host, port = config.smtp_port, "Using SMTP mail transport");
        Ok(Arc::new(SmtpMailTransport::new(config)?))
    } else {
        info!("Mail disabled; emails will only be logged");
        Ok(Arc::new(LogMailTransport))
    }
}
