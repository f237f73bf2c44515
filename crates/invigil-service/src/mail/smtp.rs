//! SMTP mail transport over a STARTTLS relay.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use invigil_core::config::MailConfig;
use invigil_core::error::{AppError, ErrorKind};
use invigil_core::result::AppResult;
use invigil_core::traits::mail::{MailTransport, OutgoingMail};

/// Sends emails through the configured SMTP relay.
pub struct SmtpMailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
}

impl std::fmt::Debug for SmtpMailTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailTransport")
            .field("host", &self.host)
            .field("from", &self.from.to_string())
            .finish()
    }
}

impl SmtpMailTransport {
    /// Build the relay transport from configuration.
    pub fn new(config: &MailConfig) -> AppResult<Self> {
        let from: Mailbox = config.from_address.parse().map_err(|e| {
            AppError::with_source(
                ErrorKind::Configuration,
                format!("Invalid mail.from_address '{}'", config.from_address),
                e,
            )
        })?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Configuration,
                    format!("Invalid SMTP relay '{}'", config.smtp_host),
                    e,
                )
            })?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
            from,
            host: config.smtp_host.clone(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    fn transport_type(&self) -> &str {
        "smtp"
    }

    async fn send(&self, mail: &OutgoingMail) -> AppResult<()> {
        let to: Mailbox = mail.to.parse().map_err(|e| {
            AppError::with_source(
                ErrorKind::Validation,
                format!("Invalid recipient address '{}'", mail.to),
                e,
            )
        })?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())
            .map_err(|e| {
                AppError::with_source(ErrorKind::Validation, "Failed to build email", e)
            })?;

        self.mailer.send(message).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::ExternalService,
                format!("SMTP delivery to {} failed", mail.to),
                e,
            )
        })?;

        info!(to = %mail.to, subject = %mail.subject, "Email sent");
        Ok(())
    }
}
