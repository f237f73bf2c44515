//! Exchange email delivery job.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use invigil_entity::job::payload::EXCHANGE_MAIL;
use invigil_entity::job::{Job, JobPayload};
use invigil_service::MailService;

use crate::executor::{JobExecutionError, JobHandler, decode_payload};

/// Renders and sends one queued exchange email.
///
/// A request that cannot be rendered fails for good; a transport error is
/// retried with backoff until the job's attempts run out.
#[derive(Debug)]
pub struct ExchangeMailHandler {
    mail: MailService,
}

impl ExchangeMailHandler {
    /// Create a new mail handler
    pub fn new(mail: MailService) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl JobHandler for ExchangeMailHandler {
    fn job_type(&self) -> &str {
        EXCHANGE_MAIL
    }

    async fn execute(&self, job: &Job) -> Result<Option<Value>, JobExecutionError> {
        let JobPayload::ExchangeMail(request) = decode_payload(job)? else {
            return Err(JobExecutionError::Permanent(format!(
                "Job {} is not an exchange mail",
                job.id
            )));
        };

        let mail = self
            .mail
            .render(&request)
            .map_err(|e| JobExecutionError::Permanent(e.to_string()))?;
        self.mail
            .send(&mail)
            .await
            .map_err(|e| JobExecutionError::Transient(e.to_string()))?;

        info!(
            job_id = %job.id,
            template = %request.template,
            to = %request.to,
            "Exchange email sent"
        );
        Ok(Some(serde_json::json!({
            "to": request.to,
            "template": request.template.as_str(),
            "subject": mail.subject,
        })))
    }
}
