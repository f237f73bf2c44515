//! Plain-text renderings of the four exchange emails.

use serde_json::Value;

use invigil_core::error::AppError;
use invigil_core::result::AppResult;
use invigil_core::traits::mail::OutgoingMail;
use invigil_entity::mail::{MailRequest, MailTemplate};

const SUBJECT_PREFIX: &str = "[Invigil]";

/// Render a mail request into a subject and body.
///
/// Fails with a validation error when the context lacks a value the
/// template needs; such a request can never succeed and is not retried.
pub fn render(request: &MailRequest) -> AppResult<OutgoingMail> {
    let ctx = Context(&request.context);
    let (subject, body) = match request.template {
        MailTemplate::ProposalReceived => (
            format!("{SUBJECT_PREFIX} New proposal for your duty on {}", ctx.get("offered_exam")?),
            format!(
                "Hello {recipient},\n\n\
                 {accepter} proposes to take your invigilation duty on {offered} ({offered_at}) \
                 and give you theirs on {accepted} ({accepted_at}) in return.\n\n\
                 Accept or refuse the proposal here:\n{link}\n",
                recipient = ctx.get("recipient_name")?,
                accepter = ctx.get("accepter_name")?,
                offered = ctx.get("offered_exam")?,
                offered_at = ctx.get("offered_exam_starts_at")?,
                accepted = ctx.get("accepted_exam")?,
                accepted_at = ctx.get("accepted_exam_starts_at")?,
                link = ctx.get("link")?,
            ),
        ),
        MailTemplate::ExchangeOutcome => {
            let outcome = ctx.get("outcome")?;
            let detail = match outcome.as_str() {
                "approved" => format!(
                    "The exchange between {requester} and {accepter} was approved. \
                     {requester} now invigilates {accepted} and {accepter} now invigilates {offered}.",
                    requester = ctx.get("requester_name")?,
                    accepter = ctx.get("accepter_name")?,
                    offered = ctx.get("offered_exam")?,
                    accepted = ctx.get("accepted_exam")?,
                ),
                "refused" => format!(
                    "{requester} refused your proposal for the duty on {offered}. \
                     Your duty on {accepted} is unchanged.",
                    requester = ctx.get("requester_name")?,
                    offered = ctx.get("offered_exam")?,
                    accepted = ctx.get("accepted_exam")?,
                ),
                other => {
                    return Err(AppError::validation(format!(
                        "Unknown exchange outcome '{other}'"
                    )));
                }
            };
            (
                format!("{SUBJECT_PREFIX} Exchange {outcome}"),
                format!(
                    "Hello {recipient},\n\n{detail}\n\nDetails:\n{link}\n",
                    recipient = ctx.get("recipient_name")?,
                    link = ctx.get("link")?,
                ),
            )
        }
        MailTemplate::ProposalWithdrawn => {
            let next_step = if ctx.has("reopened_exchange_id") {
                "Your request is open again for other proposals."
            } else {
                "The exam is now too close to reopen your request; your duty stays with you."
            };
            (
                format!("{SUBJECT_PREFIX} Proposal withdrawn for {}", ctx.get("offered_exam")?),
                format!(
                    "Hello {recipient},\n\n\
                     {accepter} withdrew their proposal for your duty on {offered}. {next_step}\n\n\
                     {link}\n",
                    recipient = ctx.get("recipient_name")?,
                    accepter = ctx.get("accepter_name")?,
                    offered = ctx.get("offered_exam")?,
                    link = ctx.get("link")?,
                ),
            )
        }
        MailTemplate::AutoCancelled => (
            format!("{SUBJECT_PREFIX} Exchange cancelled for {}", ctx.get("offered_exam")?),
            format!(
                "Hello {recipient},\n\n\
                 The exchange request for the duty on {offered} was cancelled \
                 automatically because {imminent} ({imminent_at}) is less than {hours} hours away. \
                 Every duty stays with its current holder.\n\n\
                 {link}\n",
                recipient = ctx.get("recipient_name")?,
                offered = ctx.get("offered_exam")?,
                imminent = ctx.get("imminent_exam")?,
                imminent_at = ctx.get("imminent_exam_starts_at")?,
                hours = ctx.get("notice_window_hours")?,
                link = ctx.get("link")?,
            ),
        ),
    };

    Ok(OutgoingMail {
        to: request.to.clone(),
        subject,
        body,
    })
}

struct Context<'a>(&'a Value);

impl Context<'_> {
    fn has(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|v| !v.is_null())
    }

    /// A string value; numbers are rendered with their JSON text.
    fn get(&self, key: &str) -> AppResult<String> {
        match self.0.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(missing(key)),
        }
    }
}

fn missing(key: &str) -> AppError {
    AppError::validation(format!("Mail context is missing '{key}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(template: MailTemplate, context: Value) -> MailRequest {
        MailRequest {
            to: "ada@example.edu".to_string(),
            template,
            context,
        }
    }

    fn base() -> Value {
        json!({
            "exchange_id": "6f1c",
            "link": "http://localhost:8000/exchanges/6f1c",
            "recipient_name": "Ada Lovelace",
            "requester_name": "Ada Lovelace",
            "accepter_name": "Alan Turing",
            "offered_exam": "Algebra I",
            "offered_exam_starts_at": "2026-01-12 09:00 UTC",
            "accepted_exam": "Logic II",
            "accepted_exam_starts_at": "2026-01-14 14:00 UTC",
            "imminent_exam": "Logic II",
            "imminent_exam_starts_at": "2026-01-14 14:00 UTC",
            "notice_window_hours": 24
        })
    }

    #[test]
    fn test_proposal_received() {
        let mail = render(&request(MailTemplate::ProposalReceived, base())).unwrap();
        assert_eq!(mail.to, "ada@example.edu");
        assert!(mail.subject.contains("Algebra I"));
        assert!(mail.body.contains("Alan Turing proposes"));
        assert!(mail.body.contains("Logic II (2026-01-14 14:00 UTC)"));
    }

    #[test]
    fn test_outcome_variants() {
        let mut ctx = base();
        ctx["outcome"] = json!("approved");
        let approved = render(&request(MailTemplate::ExchangeOutcome, ctx.clone())).unwrap();
        assert_eq!(approved.subject, "[Invigil] Exchange approved");
        assert!(approved.body.contains("Ada Lovelace now invigilates Logic II"));

        ctx["outcome"] = json!("refused");
        let refused = render(&request(MailTemplate::ExchangeOutcome, ctx.clone())).unwrap();
        assert!(refused.body.contains("refused your proposal"));

        ctx["outcome"] = json!("maybe");
        assert!(render(&request(MailTemplate::ExchangeOutcome, ctx)).is_err());
    }

    #[test]
    fn test_withdrawn_mentions_reopen() {
        let mut ctx = base();
        let closed = render(&request(MailTemplate::ProposalWithdrawn, ctx.clone())).unwrap();
        assert!(closed.body.contains("too close"));

        ctx["reopened_exchange_id"] = json!("9a2e");
        let reopened = render(&request(MailTemplate::ProposalWithdrawn, ctx)).unwrap();
        assert!(reopened.body.contains("open again"));
    }

    #[test]
    fn test_auto_cancelled_renders_window() {
        let mail = render(&request(MailTemplate::AutoCancelled, base())).unwrap();
        assert!(mail.body.contains("because Logic II (2026-01-14 14:00 UTC) is less than 24 hours"));
    }

    #[test]
    fn test_missing_context_is_validation_error() {
        let err = render(&request(MailTemplate::AutoCancelled, json!({}))).unwrap_err();
        assert_eq!(err.kind, invigil_core::error::ErrorKind::Validation);
        assert!(err.message.contains("offered_exam"));
    }
}
