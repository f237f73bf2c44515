//! The exchange state machine.
//!
//! Transitions here are pure: they validate relationship preconditions,
//! then mutate the exchange and the attributions handed to them. Loading
//! rows under lock, persisting the result, and notifying participants is
//! the job of the service layer, which runs each transition inside one
//! unit of work.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use invigil_core::error::AppError;

use super::error::ExchangeError;
use super::model::Exchange;
use super::status::ExchangeStatus;
use crate::attribution::Attribution;
use crate::exam::Exam;

/// A transition that was applied to an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// A new open request.
    Created,
    /// A counter-proposal was made.
    Proposed,
    /// The requester accepted; duties were swapped.
    Accepted,
    /// The requester refused the counter-proposal.
    Refused,
    /// The proposer withdrew the counter-proposal.
    Withdrawn,
    /// An administrator cancelled the exchange.
    CancelledByAdmin,
    /// The expiry sweep cancelled the exchange.
    AutoExpired,
}

impl Transition {
    /// Return the transition as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Proposed => "proposed",
            Self::Accepted => "accepted",
            Self::Refused => "refused",
            Self::Withdrawn => "withdrawn",
            Self::CancelledByAdmin => "cancelled_by_admin",
            Self::AutoExpired => "auto_expired",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The minimum lead time before an exam, evaluated at one instant.
///
/// Creation, proposal and the expiry sweep all consult the same window so
/// that they agree on what "too close" means.
#[derive(Debug, Clone, Copy)]
pub struct NoticeWindow {
    /// The instant the check is made.
    pub now: DateTime<Utc>,
    /// Required lead time.
    pub notice: Duration,
}

impl NoticeWindow {
    /// Create a window evaluated at `now`.
    pub fn new(now: DateTime<Utc>, notice: Duration) -> Self {
        Self { now, notice }
    }

    /// Exams starting before this instant are inside the window.
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.now + self.notice
    }

    /// Reject exams that start inside the window.
    pub fn ensure_clear(&self, exam: &Exam) -> Result<(), ExchangeError> {
        if exam.is_beyond_notice(self.now, self.notice) {
            Ok(())
        } else {
            Err(ExchangeError::TooCloseToExam {
                exam_label: exam.label.clone(),
                starts_at: exam.starts_at,
                notice_hours: self.notice.num_hours(),
            })
        }
    }
}

impl Exchange {
    /// Open a new exchange request for `offered`, locking it.
    pub fn create(
        requester_id: Uuid,
        offered: &mut Attribution,
        offered_exam: &Exam,
        motif: Option<String>,
        window: &NoticeWindow,
    ) -> Result<Self, ExchangeError> {
        if !offered.is_held_by(requester_id) {
            return Err(ExchangeError::NotOwner(format!(
                "Professor {requester_id} does not hold attribution {}",
                offered.id
            )));
        }
        if offered.is_involved_in_exchange {
            return Err(ExchangeError::AttributionLocked(offered.id));
        }
        window.ensure_clear(offered_exam)?;

        offered.lock();
        Ok(Self {
            id: Uuid::new_v4(),
            offered_attribution_id: offered.id,
            requester_id,
            status: ExchangeStatus::Open,
            accepter_id: None,
            accepted_attribution_id: None,
            motif: motif.filter(|m| !m.trim().is_empty()),
            reopened_from: None,
            created_at: window.now,
            updated_at: window.now,
        })
    }

    /// Answer an open request with `counter`, a duty of the proposer.
    #[allow(clippy::too_many_arguments)]
    pub fn propose(
        &mut self,
        proposer_id: Uuid,
        offered: &Attribution,
        offered_exam: &Exam,
        counter: &mut Attribution,
        counter_exam: &Exam,
        window: &NoticeWindow,
    ) -> Result<(), ExchangeError> {
        self.ensure_status(ExchangeStatus::Open, "propose")?;
        self.ensure_offered(offered)?;
        if proposer_id == self.requester_id {
            return Err(ExchangeError::SameProfessor);
        }
        if !counter.is_held_by(proposer_id) {
            return Err(ExchangeError::NotOwner(format!(
                "Professor {proposer_id} does not hold attribution {}",
                counter.id
            )));
        }
        if counter.exam_id == offered.exam_id {
            return Err(ExchangeError::SameExam(counter.exam_id));
        }
        if counter.is_involved_in_exchange {
            return Err(ExchangeError::AttributionLocked(counter.id));
        }
        window.ensure_clear(offered_exam)?;
        window.ensure_clear(counter_exam)?;

        counter.lock();
        self.accepter_id = Some(proposer_id);
        self.accepted_attribution_id = Some(counter.id);
        self.advance(ExchangeStatus::PendingRequesterDecision, window.now);
        Ok(())
    }

    /// The requester accepts the pending proposal: the two duties swap
    /// holders and both locks are released.
    pub fn accept(
        &mut self,
        actor_id: Uuid,
        offered: &mut Attribution,
        accepted: &mut Attribution,
        now: DateTime<Utc>,
    ) -> Result<(), ExchangeError> {
        self.ensure_status(ExchangeStatus::PendingRequesterDecision, "accept")?;
        self.ensure_requester(actor_id, "accept")?;
        self.ensure_offered(offered)?;
        let accepter_id = self.ensure_accepted(accepted)?;

        if !offered.is_held_by(self.requester_id) || !accepted.is_held_by(accepter_id) {
            return Err(AppError::conflict(format!(
                "Attributions of exchange {} were reassigned since the proposal",
                self.id
            ))
            .into());
        }

        offered.professor_id = accepter_id;
        accepted.professor_id = self.requester_id;
        offered.unlock();
        accepted.unlock();
        self.advance(ExchangeStatus::Approved, now);
        Ok(())
    }

    /// The requester refuses the pending proposal. Both duties are released;
    /// offering the duty again takes a new request.
    pub fn refuse(
        &mut self,
        actor_id: Uuid,
        offered: &mut Attribution,
        accepted: &mut Attribution,
        now: DateTime<Utc>,
    ) -> Result<(), ExchangeError> {
        self.ensure_status(ExchangeStatus::PendingRequesterDecision, "refuse")?;
        self.ensure_requester(actor_id, "refuse")?;
        self.ensure_offered(offered)?;
        self.ensure_accepted(accepted)?;

        offered.unlock();
        accepted.unlock();
        self.advance(ExchangeStatus::RefusedByRequester, now);
        Ok(())
    }

    /// The proposer takes back the counter-proposal, releasing their duty.
    ///
    /// The offered attribution is left untouched; the caller decides whether
    /// to reopen the request with [`Exchange::reopen`] or release it.
    pub fn withdraw(
        &mut self,
        actor_id: Uuid,
        accepted: &mut Attribution,
        now: DateTime<Utc>,
    ) -> Result<(), ExchangeError> {
        self.ensure_status(ExchangeStatus::PendingRequesterDecision, "withdraw")?;
        if self.accepter_id != Some(actor_id) {
            return Err(ExchangeError::NotOwner(format!(
                "Only the proposer may withdraw exchange {}",
                self.id
            )));
        }
        self.ensure_accepted(accepted)?;

        accepted.unlock();
        self.advance(ExchangeStatus::WithdrawnByProposer, now);
        Ok(())
    }

    /// A fresh open request carrying over a withdrawn exchange's offer.
    ///
    /// The offered attribution keeps its lock, now held by the new exchange.
    pub fn reopen(&self, now: DateTime<Utc>) -> Result<Self, ExchangeError> {
        if self.status != ExchangeStatus::WithdrawnByProposer {
            return Err(self.invalid_state("reopen"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            offered_attribution_id: self.offered_attribution_id,
            requester_id: self.requester_id,
            status: ExchangeStatus::Open,
            accepter_id: None,
            accepted_attribution_id: None,
            motif: self.motif.clone(),
            reopened_from: Some(self.id),
            created_at: now,
            updated_at: now,
        })
    }

    /// Release the offered duty of a withdrawn exchange that is not reopened.
    pub fn release_offer(&self, offered: &mut Attribution) -> Result<(), ExchangeError> {
        if self.status != ExchangeStatus::WithdrawnByProposer {
            return Err(self.invalid_state("release"));
        }
        self.ensure_offered(offered)?;
        offered.unlock();
        Ok(())
    }

    /// An administrator cancels an active exchange, releasing every duty.
    pub fn cancel_by_admin(
        &mut self,
        offered: &mut Attribution,
        accepted: Option<&mut Attribution>,
        now: DateTime<Utc>,
    ) -> Result<(), ExchangeError> {
        if self.status.is_terminal() {
            return Err(self.invalid_state("cancel"));
        }
        self.release_all(offered, accepted)?;
        self.advance(ExchangeStatus::CancelledByAdmin, now);
        Ok(())
    }

    /// The expiry sweep cancels an active exchange, releasing every duty.
    ///
    /// Returns `false` without touching anything when the exchange is
    /// already terminal.
    pub fn expire(
        &mut self,
        offered: &mut Attribution,
        accepted: Option<&mut Attribution>,
        now: DateTime<Utc>,
    ) -> Result<bool, ExchangeError> {
        if self.status.is_terminal() {
            return Ok(false);
        }
        self.release_all(offered, accepted)?;
        self.advance(ExchangeStatus::CancelledAutoExpired, now);
        Ok(true)
    }

    /// Release the offered duty and, if present, the accepted one.
    fn release_all(
        &self,
        offered: &mut Attribution,
        accepted: Option<&mut Attribution>,
    ) -> Result<(), ExchangeError> {
        self.ensure_offered(offered)?;
        offered.unlock();
        if let Some(accepted) = accepted {
            self.ensure_accepted(accepted)?;
            accepted.unlock();
        }
        Ok(())
    }

    fn advance(&mut self, next: ExchangeStatus, now: DateTime<Utc>) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal edge {} -> {next}",
            self.status
        );
        self.status = next;
        self.updated_at = now;
    }

    fn ensure_status(
        &self,
        expected: ExchangeStatus,
        action: &'static str,
    ) -> Result<(), ExchangeError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(self.invalid_state(action))
        }
    }

    fn ensure_requester(&self, actor_id: Uuid, action: &str) -> Result<(), ExchangeError> {
        if actor_id == self.requester_id {
            Ok(())
        } else {
            Err(ExchangeError::NotOwner(format!(
                "Only the requester may {action} exchange {}",
                self.id
            )))
        }
    }

    fn ensure_offered(&self, offered: &Attribution) -> Result<(), ExchangeError> {
        if offered.id == self.offered_attribution_id {
            Ok(())
        } else {
            Err(AppError::internal(format!(
                "Attribution {} is not the offer of exchange {}",
                offered.id, self.id
            ))
            .into())
        }
    }

    /// Check `accepted` is this exchange's counter duty and return the accepter.
    fn ensure_accepted(&self, accepted: &Attribution) -> Result<Uuid, ExchangeError> {
        match (self.accepted_attribution_id, self.accepter_id) {
            (Some(id), Some(accepter_id)) if id == accepted.id => Ok(accepter_id),
            _ => Err(AppError::internal(format!(
                "Attribution {} is not the counter-proposal of exchange {}",
                accepted.id, self.id
            ))
            .into()),
        }
    }

    fn invalid_state(&self, action: &'static str) -> ExchangeError {
        ExchangeError::InvalidState {
            exchange_id: self.id,
            status: self.status,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        p1: Uuid,
        p2: Uuid,
        x: Attribution,
        x_exam: Exam,
        y: Attribution,
        y_exam: Exam,
        window: NoticeWindow,
    }

    fn exam(hours_ahead: i64, now: DateTime<Utc>) -> Exam {
        Exam {
            id: Uuid::new_v4(),
            label: format!("Exam in {hours_ahead}h"),
            starts_at: now + Duration::hours(hours_ahead),
        }
    }

    fn duty(professor_id: Uuid, exam: &Exam) -> Attribution {
        Attribution {
            id: Uuid::new_v4(),
            exam_id: exam.id,
            professor_id,
            room_id: None,
            is_responsable: false,
            is_involved_in_exchange: false,
        }
    }

    fn fixture() -> Fixture {
        let now = Utc::now();
        let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
        let x_exam = exam(72, now);
        let y_exam = exam(96, now);
        Fixture {
            p1,
            p2,
            x: duty(p1, &x_exam),
            y: duty(p2, &y_exam),
            x_exam,
            y_exam,
            window: NoticeWindow::new(now, Duration::hours(24)),
        }
    }

    fn pending(f: &mut Fixture) -> Exchange {
        let mut ex = Exchange::create(f.p1, &mut f.x, &f.x_exam, None, &f.window).unwrap();
        ex.propose(f.p2, &f.x, &f.x_exam, &mut f.y, &f.y_exam, &f.window)
            .unwrap();
        ex
    }

    #[test]
    fn test_create_locks_offered() {
        let mut f = fixture();
        let ex = Exchange::create(f.p1, &mut f.x, &f.x_exam, Some("conflict".into()), &f.window)
            .unwrap();
        assert_eq!(ex.status, ExchangeStatus::Open);
        assert!(f.x.is_involved_in_exchange);
        assert_eq!(ex.motif.as_deref(), Some("conflict"));
    }

    #[test]
    fn test_create_rejects_locked_foreign_and_imminent() {
        let mut f = fixture();
        f.x.is_involved_in_exchange = true;
        let err = Exchange::create(f.p1, &mut f.x, &f.x_exam, None, &f.window).unwrap_err();
        assert!(matches!(err, ExchangeError::AttributionLocked(_)));

        let mut f = fixture();
        let err = Exchange::create(f.p2, &mut f.x, &f.x_exam, None, &f.window).unwrap_err();
        assert!(matches!(err, ExchangeError::NotOwner(_)));

        let mut f = fixture();
        f.x_exam.starts_at = f.window.now + Duration::hours(10);
        let err = Exchange::create(f.p1, &mut f.x, &f.x_exam, None, &f.window).unwrap_err();
        assert!(matches!(err, ExchangeError::TooCloseToExam { .. }));
        assert!(!f.x.is_involved_in_exchange);
    }

    #[test]
    fn test_propose_locks_counter() {
        let mut f = fixture();
        let ex = pending(&mut f);
        assert_eq!(ex.status, ExchangeStatus::PendingRequesterDecision);
        assert_eq!(ex.accepter_id, Some(f.p2));
        assert_eq!(ex.accepted_attribution_id, Some(f.y.id));
        assert!(f.y.is_involved_in_exchange);
    }

    #[test]
    fn test_propose_rejects_self_same_exam_and_locked() {
        let mut f = fixture();
        let mut ex = Exchange::create(f.p1, &mut f.x, &f.x_exam, None, &f.window).unwrap();

        let mut own = duty(f.p1, &f.y_exam);
        let err = ex
            .propose(f.p1, &f.x, &f.x_exam, &mut own, &f.y_exam, &f.window)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::SameProfessor));

        let mut same_exam = duty(f.p2, &f.x_exam);
        let err = ex
            .propose(f.p2, &f.x, &f.x_exam, &mut same_exam, &f.x_exam, &f.window)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::SameExam(_)));

        f.y.is_involved_in_exchange = true;
        let err = ex
            .propose(f.p2, &f.x, &f.x_exam, &mut f.y, &f.y_exam, &f.window)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::AttributionLocked(_)));
        assert_eq!(ex.status, ExchangeStatus::Open);
        assert!(ex.accepter_id.is_none());
    }

    #[test]
    fn test_accept_swaps_holders_and_unlocks() {
        let mut f = fixture();
        let mut ex = pending(&mut f);
        ex.accept(f.p1, &mut f.x, &mut f.y, f.window.now).unwrap();
        assert_eq!(ex.status, ExchangeStatus::Approved);
        assert_eq!(f.x.professor_id, f.p2);
        assert_eq!(f.y.professor_id, f.p1);
        assert!(!f.x.is_involved_in_exchange);
        assert!(!f.y.is_involved_in_exchange);
    }

    #[test]
    fn test_only_requester_decides() {
        let mut f = fixture();
        let mut ex = pending(&mut f);
        let err = ex
            .accept(f.p2, &mut f.x, &mut f.y, f.window.now)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::NotOwner(_)));
        let err = ex
            .refuse(f.p2, &mut f.x, &mut f.y, f.window.now)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::NotOwner(_)));
        assert_eq!(ex.status, ExchangeStatus::PendingRequesterDecision);
    }

    #[test]
    fn test_refuse_releases_both() {
        let mut f = fixture();
        let mut ex = pending(&mut f);
        ex.refuse(f.p1, &mut f.x, &mut f.y, f.window.now).unwrap();
        assert_eq!(ex.status, ExchangeStatus::RefusedByRequester);
        assert!(!f.x.is_involved_in_exchange);
        assert!(!f.y.is_involved_in_exchange);
        assert_eq!(f.x.professor_id, f.p1);
    }

    #[test]
    fn test_withdraw_then_reopen_keeps_offer_locked() {
        let mut f = fixture();
        let mut ex = pending(&mut f);
        let err = ex.withdraw(f.p1, &mut f.y, f.window.now).unwrap_err();
        assert!(matches!(err, ExchangeError::NotOwner(_)));

        ex.withdraw(f.p2, &mut f.y, f.window.now).unwrap();
        assert_eq!(ex.status, ExchangeStatus::WithdrawnByProposer);
        assert!(!f.y.is_involved_in_exchange);
        assert!(f.x.is_involved_in_exchange);

        let reopened = ex.reopen(f.window.now).unwrap();
        assert_eq!(reopened.status, ExchangeStatus::Open);
        assert_eq!(reopened.offered_attribution_id, f.x.id);
        assert_eq!(reopened.reopened_from, Some(ex.id));
        assert!(reopened.accepter_id.is_none());
    }

    #[test]
    fn test_release_offer_only_after_withdraw() {
        let mut f = fixture();
        let mut ex = pending(&mut f);
        let err = ex.release_offer(&mut f.x).unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidState { .. }));

        ex.withdraw(f.p2, &mut f.y, f.window.now).unwrap();
        ex.release_offer(&mut f.x).unwrap();
        assert!(!f.x.is_involved_in_exchange);
    }

    #[test]
    fn test_terminal_exchange_cannot_move() {
        let mut f = fixture();
        let mut ex = pending(&mut f);
        ex.accept(f.p1, &mut f.x, &mut f.y, f.window.now).unwrap();

        let err = ex
            .cancel_by_admin(&mut f.x, Some(&mut f.y), f.window.now)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidState { .. }));

        let mut other = duty(Uuid::new_v4(), &f.y_exam);
        let err = ex
            .propose(other.professor_id, &f.x, &f.x_exam, &mut other, &f.y_exam, &f.window)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidState { .. }));

        assert!(!ex.expire(&mut f.x, Some(&mut f.y), f.window.now).unwrap());
        assert_eq!(ex.status, ExchangeStatus::Approved);
    }

    #[test]
    fn test_expire_open_exchange_without_counter() {
        let mut f = fixture();
        let mut ex = Exchange::create(f.p1, &mut f.x, &f.x_exam, None, &f.window).unwrap();
        assert!(ex.expire(&mut f.x, None, f.window.now).unwrap());
        assert_eq!(ex.status, ExchangeStatus::CancelledAutoExpired);
        assert!(!f.x.is_involved_in_exchange);
        assert!(!ex.expire(&mut f.x, None, f.window.now).unwrap());
    }
}
