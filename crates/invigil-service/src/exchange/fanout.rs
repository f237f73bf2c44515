//! Notification fan-out: what each transition tells whom.
//!
//! The plan is computed from the committed-to-be outcome and written in the
//! same unit of work as the transition. Emails leave as queued jobs, so a
//! failing relay can delay them but never undo the transition.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use invigil_core::config::ExchangeConfig;
use invigil_entity::exam::Exam;
use invigil_entity::exchange::{Exchange, Transition};
use invigil_entity::mail::{MailRequest, MailTemplate};
use invigil_entity::notification::{NewNotification, NotificationKind};
use invigil_entity::professor::Professor;

/// Everything the fan-out needs to know about an applied transition.
#[derive(Debug, Clone, Copy)]
pub struct TransitionOutcome<'a> {
    /// What happened.
    pub transition: Transition,
    /// The exchange after the transition.
    pub exchange: &'a Exchange,
    /// The requesting professor.
    pub requester: &'a Professor,
    /// The proposing professor, when a proposal exists.
    pub accepter: Option<&'a Professor>,
    /// Exam of the offered duty.
    pub offered_exam: &'a Exam,
    /// Exam of the counter duty, when a proposal exists.
    pub accepted_exam: Option<&'a Exam>,
    /// The fresh open exchange created by a withdrawal.
    pub reopened_id: Option<Uuid>,
}

/// Notifications and emails produced by one transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanoutPlan {
    /// In-app notifications.
    pub notifications: Vec<NewNotification>,
    /// Emails to queue.
    pub mails: Vec<MailRequest>,
}

impl FanoutPlan {
    /// Whether the transition has no audience.
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty() && self.mails.is_empty()
    }
}

/// Builds the [`FanoutPlan`] of a transition.
#[derive(Debug, Clone)]
pub struct Fanout {
    config: ExchangeConfig,
}

impl Fanout {
    /// Create a fan-out using `config` for deep links and the notice window.
    pub fn new(config: ExchangeConfig) -> Self {
        Self { config }
    }

    /// Plan the notifications and emails for `outcome`.
    pub fn plan(&self, outcome: &TransitionOutcome<'_>) -> FanoutPlan {
        let mut plan = FanoutPlan::default();
        let offered = outcome.offered_exam.label.as_str();
        let requester = outcome.requester;
        let accepter_name = outcome
            .accepter
            .map(Professor::full_name)
            .unwrap_or_default();

        match outcome.transition {
            Transition::Created => {}
            Transition::Proposed => {
                let counter = outcome.accepted_exam.map_or("", |e| e.label.as_str());
                self.notify(
                    &mut plan,
                    outcome,
                    requester,
                    NotificationKind::ExchangeProposalReceived,
                    format!(
                        "{accepter_name} offers their duty on {counter} in exchange for yours on {offered}."
                    ),
                );
                self.mail(&mut plan, outcome, requester, MailTemplate::ProposalReceived, None);
            }
            Transition::Accepted => {
                let counter = outcome.accepted_exam.map_or("", |e| e.label.as_str());
                self.notify(
                    &mut plan,
                    outcome,
                    requester,
                    NotificationKind::ExchangeApproved,
                    format!("Exchange with {accepter_name} approved: you now invigilate {counter}."),
                );
                self.mail(
                    &mut plan,
                    outcome,
                    requester,
                    MailTemplate::ExchangeOutcome,
                    Some("approved"),
                );
                if let Some(accepter) = outcome.accepter {
                    self.notify(
                        &mut plan,
                        outcome,
                        accepter,
                        NotificationKind::ExchangeApproved,
                        format!(
                            "{} approved your proposal: you now invigilate {offered}.",
                            requester.full_name()
                        ),
                    );
                    self.mail(
                        &mut plan,
                        outcome,
                        accepter,
                        MailTemplate::ExchangeOutcome,
                        Some("approved"),
                    );
                }
            }
            Transition::Refused => {
                if let Some(accepter) = outcome.accepter {
                    self.notify(
                        &mut plan,
                        outcome,
                        accepter,
                        NotificationKind::ExchangeRefused,
                        format!(
                            "{} refused your proposal for {offered}.",
                            requester.full_name()
                        ),
                    );
                    self.mail(
                        &mut plan,
                        outcome,
                        accepter,
                        MailTemplate::ExchangeOutcome,
                        Some("refused"),
                    );
                }
            }
            Transition::Withdrawn => {
                let tail = if outcome.reopened_id.is_some() {
                    " Your request is open again."
                } else {
                    " Your duty is released."
                };
                self.notify(
                    &mut plan,
                    outcome,
                    requester,
                    NotificationKind::ExchangeWithdrawn,
                    format!("{accepter_name} withdrew their proposal for {offered}.{tail}"),
                );
                self.mail(&mut plan, outcome, requester, MailTemplate::ProposalWithdrawn, None);
            }
            Transition::CancelledByAdmin => {
                for recipient in participants(outcome) {
                    self.notify(
                        &mut plan,
                        outcome,
                        recipient,
                        NotificationKind::ExchangeCancelledByAdmin,
                        format!("An administrator cancelled the exchange for {offered}."),
                    );
                }
            }
            Transition::AutoExpired => {
                let imminent = imminent_exam(outcome).label.as_str();
                for recipient in participants(outcome) {
                    self.notify(
                        &mut plan,
                        outcome,
                        recipient,
                        NotificationKind::ExchangeAutoExpired,
                        format!(
                            "The exchange for {offered} was cancelled automatically: {imminent} is less than {}h away.",
                            self.config.notice_window_hours
                        ),
                    );
                    self.mail(&mut plan, outcome, recipient, MailTemplate::AutoCancelled, None);
                }
            }
        }
        plan
    }

    fn notify(
        &self,
        plan: &mut FanoutPlan,
        outcome: &TransitionOutcome<'_>,
        recipient: &Professor,
        kind: NotificationKind,
        message: String,
    ) {
        let mut data = json!({
            "exchange_id": outcome.exchange.id,
            "transition": outcome.transition.as_str(),
            "status": outcome.exchange.status.as_str(),
        });
        if let Some(reopened) = outcome.reopened_id {
            data["reopened_exchange_id"] = json!(reopened);
        }
        plan.notifications.push(NewNotification {
            user_id: recipient.user_id,
            kind,
            message,
            link: Some(self.link(outcome)),
            data,
        });
    }

    fn mail(
        &self,
        plan: &mut FanoutPlan,
        outcome: &TransitionOutcome<'_>,
        recipient: &Professor,
        template: MailTemplate,
        result: Option<&str>,
    ) {
        let mut context = Map::new();
        context.insert("exchange_id".into(), json!(outcome.exchange.id));
        context.insert("link".into(), json!(self.link(outcome)));
        context.insert("recipient_name".into(), json!(recipient.full_name()));
        context.insert("requester_name".into(), json!(outcome.requester.full_name()));
        context.insert("offered_exam".into(), json!(outcome.offered_exam.label));
        context.insert(
            "offered_exam_starts_at".into(),
            json!(format_start(outcome.offered_exam.starts_at)),
        );
        context.insert(
            "notice_window_hours".into(),
            json!(self.config.notice_window_hours),
        );
        if let Some(accepter) = outcome.accepter {
            context.insert("accepter_name".into(), json!(accepter.full_name()));
        }
        if let Some(exam) = outcome.accepted_exam {
            context.insert("accepted_exam".into(), json!(exam.label));
            context.insert(
                "accepted_exam_starts_at".into(),
                json!(format_start(exam.starts_at)),
            );
        }
        if matches!(outcome.transition, Transition::AutoExpired) {
            let imminent = imminent_exam(outcome);
            context.insert("imminent_exam".into(), json!(imminent.label));
            context.insert(
                "imminent_exam_starts_at".into(),
                json!(format_start(imminent.starts_at)),
            );
        }
        if let Some(result) = result {
            context.insert("outcome".into(), json!(result));
        }
        if let Some(reopened) = outcome.reopened_id {
            context.insert("reopened_exchange_id".into(), json!(reopened));
        }

        plan.mails.push(MailRequest {
            to: recipient.email.clone(),
            template,
            context: Value::Object(context),
        });
    }

    /// A withdrawal points recipients at the reopened request.
    fn link(&self, outcome: &TransitionOutcome<'_>) -> String {
        self.config
            .exchange_link(outcome.reopened_id.unwrap_or(outcome.exchange.id))
    }
}

fn participants<'a>(outcome: &TransitionOutcome<'a>) -> Vec<&'a Professor> {
    let mut recipients = vec![outcome.requester];
    recipients.extend(outcome.accepter);
    recipients
}

/// The exam of the exchange that starts first, which is the one that
/// entered the notice window.
fn imminent_exam<'a>(outcome: &TransitionOutcome<'a>) -> &'a Exam {
    outcome
        .accepted_exam
        .filter(|exam| exam.starts_at < outcome.offered_exam.starts_at)
        .unwrap_or(outcome.offered_exam)
}

fn format_start(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}
