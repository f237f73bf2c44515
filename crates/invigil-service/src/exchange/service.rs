//! Exchange transitions as units of work.
//!
//! Each operation opens one [`ExchangeTx`], locks the exchange and then its
//! attributions, applies the pure transition from `invigil-entity`, writes
//! the result together with its fan-out, and commits. Any error before the
//! commit drops the transaction, so a rejected transition changes nothing.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use invigil_core::config::{ExchangeConfig, MailConfig};
use invigil_core::error::AppError;
use invigil_core::types::pagination::{PageRequest, PageResponse};
use invigil_database::store::{ExchangeStore, ExchangeTx};
use invigil_entity::attribution::Attribution;
use invigil_entity::exam::Exam;
use invigil_entity::exchange::{
    Exchange, ExchangeError, ExchangeStatus, NoticeWindow, Transition,
};
use invigil_entity::job::{CreateJob, JobPayload, JobPriority};
use invigil_entity::professor::Professor;
use invigil_entity::user::Capability;

use super::fanout::{Fanout, TransitionOutcome};
use crate::context::Actor;

/// Result of a withdrawal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawOutcome {
    /// The exchange, now `withdrawn_by_proposer`.
    pub withdrawn: Exchange,
    /// The fresh open request carrying the same offer, when the offered
    /// exam is still outside the notice window.
    pub reopened: Option<Exchange>,
}

/// Runs exchange transitions and queries.
#[derive(Debug, Clone)]
pub struct ExchangeService {
    /// Exchange persistence.
    store: Arc<dyn ExchangeStore>,
    /// Notification planner.
    fanout: Fanout,
    /// Required lead time before an exam.
    notice: Duration,
    /// Delivery attempts per queued email.
    mail_max_attempts: i32,
}

impl ExchangeService {
    /// Creates a new exchange service.
    pub fn new(
        store: Arc<dyn ExchangeStore>,
        exchange_config: &ExchangeConfig,
        mail_config: &MailConfig,
    ) -> Self {
        Self {
            store,
            fanout: Fanout::new(exchange_config.clone()),
            notice: exchange_config.notice_window(),
            mail_max_attempts: mail_config.max_attempts,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn ExchangeStore> {
        &self.store
    }

    /// The notice window evaluated at `now`.
    pub fn window_at(&self, now: DateTime<Utc>) -> NoticeWindow {
        NoticeWindow::new(now, self.notice)
    }

    /// Offer one of the actor's duties for exchange.
    pub async fn create(
        &self,
        actor: &Actor,
        offered_attribution_id: Uuid,
        motif: Option<String>,
    ) -> Result<Exchange, ExchangeError> {
        let requester_id = actor.trading_professor("create")?;
        let window = self.window_at(Utc::now());

        let mut tx = self.store.begin().await?;
        let attributions = lock_attributions(tx.as_mut(), &[offered_attribution_id]).await?;
        let mut offered = pick(&attributions, offered_attribution_id)?;
        let offered_exam = load_exam(tx.as_mut(), offered.exam_id).await?;

        let exchange = Exchange::create(requester_id, &mut offered, &offered_exam, motif, &window)?;

        tx.insert_exchange(&exchange).await?;
        tx.update_attribution(&offered).await?;
        tx.commit().await?;

        info!(
            exchange_id = %exchange.id,
            attribution_id = %offered.id,
            actor = %actor.label(),
            "Exchange created"
        );
        Ok(exchange)
    }

    /// Answer an open request with one of the actor's duties.
    pub async fn propose(
        &self,
        actor: &Actor,
        exchange_id: Uuid,
        counter_attribution_id: Uuid,
    ) -> Result<Exchange, ExchangeError> {
        let proposer_id = actor.trading_professor("propose on")?;
        let window = self.window_at(Utc::now());

        let mut tx = self.store.begin().await?;
        let mut exchange = lock_exchange(tx.as_mut(), exchange_id).await?;
        let attributions = lock_attributions(
            tx.as_mut(),
            &[exchange.offered_attribution_id, counter_attribution_id],
        )
        .await?;
        let offered = pick(&attributions, exchange.offered_attribution_id)?;
        let mut counter = pick(&attributions, counter_attribution_id)?;
        let offered_exam = load_exam(tx.as_mut(), offered.exam_id).await?;
        let counter_exam = load_exam(tx.as_mut(), counter.exam_id).await?;

        exchange.propose(
            proposer_id,
            &offered,
            &offered_exam,
            &mut counter,
            &counter_exam,
            &window,
        )?;

        tx.update_exchange(&exchange).await?;
        tx.update_attribution(&counter).await?;
        self.fan_out(
            tx.as_mut(),
            Transition::Proposed,
            &exchange,
            &offered_exam,
            Some(&counter_exam),
            None,
            window.now,
        )
        .await?;
        tx.commit().await?;

        info!(
            exchange_id = %exchange.id,
            counter_attribution_id = %counter.id,
            actor = %actor.label(),
            "Exchange proposal made"
        );
        Ok(exchange)
    }

    /// The requester accepts the pending proposal and the duties swap.
    pub async fn accept(&self, actor: &Actor, exchange_id: Uuid) -> Result<Exchange, ExchangeError> {
        let actor_id = actor.trading_professor("accept")?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let mut exchange = lock_exchange(tx.as_mut(), exchange_id).await?;
        let accepted_id = counter_id(&exchange, "accept")?;
        let attributions = lock_attributions(
            tx.as_mut(),
            &[exchange.offered_attribution_id, accepted_id],
        )
        .await?;
        let mut offered = pick(&attributions, exchange.offered_attribution_id)?;
        let mut accepted = pick(&attributions, accepted_id)?;

        exchange.accept(actor_id, &mut offered, &mut accepted, now)?;

        let offered_exam = load_exam(tx.as_mut(), offered.exam_id).await?;
        let accepted_exam = load_exam(tx.as_mut(), accepted.exam_id).await?;
        tx.update_exchange(&exchange).await?;
        tx.update_attribution(&offered).await?;
        tx.update_attribution(&accepted).await?;
        self.fan_out(
            tx.as_mut(),
            Transition::Accepted,
            &exchange,
            &offered_exam,
            Some(&accepted_exam),
            None,
            now,
        )
        .await?;
        tx.commit().await?;

        info!(
            exchange_id = %exchange.id,
            actor = %actor.label(),
            "Exchange approved, duties swapped"
        );
        Ok(exchange)
    }

    /// The requester refuses the pending proposal.
    pub async fn refuse(&self, actor: &Actor, exchange_id: Uuid) -> Result<Exchange, ExchangeError> {
        let actor_id = actor.trading_professor("refuse")?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let mut exchange = lock_exchange(tx.as_mut(), exchange_id).await?;
        let accepted_id = counter_id(&exchange, "refuse")?;
        let attributions = lock_attributions(
            tx.as_mut(),
            &[exchange.offered_attribution_id, accepted_id],
        )
        .await?;
        let mut offered = pick(&attributions, exchange.offered_attribution_id)?;
        let mut accepted = pick(&attributions, accepted_id)?;

        exchange.refuse(actor_id, &mut offered, &mut accepted, now)?;

        let offered_exam = load_exam(tx.as_mut(), offered.exam_id).await?;
        let accepted_exam = load_exam(tx.as_mut(), accepted.exam_id).await?;
        tx.update_exchange(&exchange).await?;
        tx.update_attribution(&offered).await?;
        tx.update_attribution(&accepted).await?;
        self.fan_out(
            tx.as_mut(),
            Transition::Refused,
            &exchange,
            &offered_exam,
            Some(&accepted_exam),
            None,
            now,
        )
        .await?;
        tx.commit().await?;

        info!(exchange_id = %exchange.id, actor = %actor.label(), "Exchange refused");
        Ok(exchange)
    }

    /// The proposer takes back their counter-proposal.
    ///
    /// The request is reopened as a new open exchange on the same offered
    /// duty while its exam is outside the notice window; otherwise the
    /// offered duty is released too.
    pub async fn withdraw(
        &self,
        actor: &Actor,
        exchange_id: Uuid,
    ) -> Result<WithdrawOutcome, ExchangeError> {
        let actor_id = actor.trading_professor("withdraw from")?;
        let window = self.window_at(Utc::now());

        let mut tx = self.store.begin().await?;
        let mut exchange = lock_exchange(tx.as_mut(), exchange_id).await?;
        let accepted_id = counter_id(&exchange, "withdraw")?;
        let attributions = lock_attributions(
            tx.as_mut(),
            &[exchange.offered_attribution_id, accepted_id],
        )
        .await?;
        let mut offered = pick(&attributions, exchange.offered_attribution_id)?;
        let mut accepted = pick(&attributions, accepted_id)?;

        exchange.withdraw(actor_id, &mut accepted, window.now)?;

        let offered_exam = load_exam(tx.as_mut(), offered.exam_id).await?;
        let accepted_exam = load_exam(tx.as_mut(), accepted.exam_id).await?;
        tx.update_exchange(&exchange).await?;
        tx.update_attribution(&accepted).await?;

        let reopened = if offered_exam.is_beyond_notice(window.now, window.notice) {
            let fresh = exchange.reopen(window.now)?;
            tx.insert_exchange(&fresh).await?;
            Some(fresh)
        } else {
            exchange.release_offer(&mut offered)?;
            tx.update_attribution(&offered).await?;
            None
        };

        self.fan_out(
            tx.as_mut(),
            Transition::Withdrawn,
            &exchange,
            &offered_exam,
            Some(&accepted_exam),
            reopened.as_ref().map(|e| e.id),
            window.now,
        )
        .await?;
        tx.commit().await?;

        info!(
            exchange_id = %exchange.id,
            reopened_id = ?reopened.as_ref().map(|e| e.id),
            actor = %actor.label(),
            "Exchange proposal withdrawn"
        );
        Ok(WithdrawOutcome {
            withdrawn: exchange,
            reopened,
        })
    }

    /// An administrator cancels an active exchange.
    pub async fn admin_cancel(
        &self,
        actor: &Actor,
        exchange_id: Uuid,
    ) -> Result<Exchange, ExchangeError> {
        actor.require(Capability::CancelAnyExchange, "cancel exchanges")?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let mut exchange = lock_exchange(tx.as_mut(), exchange_id).await?;
        let attributions = lock_attributions(tx.as_mut(), &exchange.attribution_ids()).await?;
        let mut offered = pick(&attributions, exchange.offered_attribution_id)?;
        let mut accepted = exchange
            .accepted_attribution_id
            .map(|id| pick(&attributions, id))
            .transpose()?;

        exchange.cancel_by_admin(&mut offered, accepted.as_mut(), now)?;

        let offered_exam = load_exam(tx.as_mut(), offered.exam_id).await?;
        let accepted_exam = match &accepted {
            Some(a) => Some(load_exam(tx.as_mut(), a.exam_id).await?),
            None => None,
        };
        tx.update_exchange(&exchange).await?;
        tx.update_attribution(&offered).await?;
        if let Some(accepted) = &accepted {
            tx.update_attribution(accepted).await?;
        }
        self.fan_out(
            tx.as_mut(),
            Transition::CancelledByAdmin,
            &exchange,
            &offered_exam,
            accepted_exam.as_ref(),
            None,
            now,
        )
        .await?;
        tx.commit().await?;

        info!(exchange_id = %exchange.id, actor = %actor.label(), "Exchange cancelled by admin");
        Ok(exchange)
    }

    /// Cancel an exchange whose offered or accepted exam has entered the
    /// notice window.
    ///
    /// Returns `Ok(false)` without writing anything when the exchange is
    /// already terminal or, re-checked under lock, no longer inside the
    /// window.
    pub async fn auto_expire(
        &self,
        exchange_id: Uuid,
        window: &NoticeWindow,
    ) -> Result<bool, ExchangeError> {
        let mut tx = self.store.begin().await?;
        let mut exchange = lock_exchange(tx.as_mut(), exchange_id).await?;
        if exchange.status.is_terminal() {
            debug!(exchange_id = %exchange.id, status = %exchange.status, "Already terminal");
            return Ok(false);
        }

        let attributions = lock_attributions(tx.as_mut(), &exchange.attribution_ids()).await?;
        let mut offered = pick(&attributions, exchange.offered_attribution_id)?;
        let mut accepted = exchange
            .accepted_attribution_id
            .map(|id| pick(&attributions, id))
            .transpose()?;
        let offered_exam = load_exam(tx.as_mut(), offered.exam_id).await?;
        let accepted_exam = match &accepted {
            Some(a) => Some(load_exam(tx.as_mut(), a.exam_id).await?),
            None => None,
        };

        let imminent = std::iter::once(&offered_exam)
            .chain(accepted_exam.as_ref())
            .any(|exam| !exam.is_beyond_notice(window.now, window.notice));
        if !imminent {
            debug!(exchange_id = %exchange.id, "No longer inside the notice window");
            return Ok(false);
        }

        if !exchange.expire(&mut offered, accepted.as_mut(), window.now)? {
            return Ok(false);
        }

        tx.update_exchange(&exchange).await?;
        tx.update_attribution(&offered).await?;
        if let Some(accepted) = &accepted {
            tx.update_attribution(accepted).await?;
        }
        self.fan_out(
            tx.as_mut(),
            Transition::AutoExpired,
            &exchange,
            &offered_exam,
            accepted_exam.as_ref(),
            None,
            window.now,
        )
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Fetch one exchange the actor may see.
    ///
    /// Professors see open requests and exchanges they take part in.
    pub async fn get(&self, actor: &Actor, exchange_id: Uuid) -> Result<Exchange, ExchangeError> {
        let exchange = self
            .store
            .find_exchange(exchange_id)
            .await?
            .ok_or_else(|| ExchangeError::NotFound(format!("Exchange {exchange_id} not found")))?;

        let visible = actor.can(Capability::ViewAllExchanges)
            || matches!(actor, Actor::System)
            || exchange.status == ExchangeStatus::Open
            || actor
                .professor_id()
                .is_some_and(|id| exchange.involves(id));
        if visible {
            Ok(exchange)
        } else {
            Err(ExchangeError::Forbidden(format!(
                "Not allowed to view exchange {exchange_id}"
            )))
        }
    }

    /// Open requests from other professors the actor could answer.
    pub async fn market(
        &self,
        actor: &Actor,
        page: &PageRequest,
    ) -> Result<PageResponse<Exchange>, ExchangeError> {
        let professor_id = actor.trading_professor("browse")?;
        Ok(self.store.list_open_for(professor_id, page).await?)
    }

    /// Exchanges the actor took part in, newest first.
    pub async fn history(
        &self,
        actor: &Actor,
        page: &PageRequest,
    ) -> Result<PageResponse<Exchange>, ExchangeError> {
        let professor_id = actor.trading_professor("list")?;
        Ok(self.store.list_for_professor(professor_id, page).await?)
    }

    /// Every active exchange.
    pub async fn list_active(
        &self,
        actor: &Actor,
        page: &PageRequest,
    ) -> Result<PageResponse<Exchange>, ExchangeError> {
        if !matches!(actor, Actor::System) {
            actor.require(Capability::ViewAllExchanges, "list all exchanges")?;
        }
        Ok(self.store.list_active(page).await?)
    }

    /// Write the notifications and queue the emails of a transition.
    #[allow(clippy::too_many_arguments)]
    async fn fan_out(
        &self,
        tx: &mut dyn ExchangeTx,
        transition: Transition,
        exchange: &Exchange,
        offered_exam: &Exam,
        accepted_exam: Option<&Exam>,
        reopened_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<(), ExchangeError> {
        let professors = tx.find_professors(&exchange.participant_ids()).await?;
        let requester = find_professor(&professors, exchange.requester_id)?;
        let accepter = exchange
            .accepter_id
            .map(|id| find_professor(&professors, id))
            .transpose()?;

        let plan = self.fanout.plan(&TransitionOutcome {
            transition,
            exchange,
            requester,
            accepter,
            offered_exam,
            accepted_exam,
            reopened_id,
        });

        debug!(
            exchange_id = %exchange.id,
            transition = %transition,
            notifications = plan.notifications.len(),
            mails = plan.mails.len(),
            "Fanning out transition"
        );

        for draft in plan.notifications {
            tx.insert_notification(&draft.into_notification(now))
                .await?;
        }
        for mail in plan.mails {
            let job = CreateJob::from_payload(
                &JobPayload::ExchangeMail(mail),
                JobPriority::Normal,
                self.mail_max_attempts,
            )
            .map_err(AppError::from)?;
            tx.enqueue_job(&job).await?;
        }
        Ok(())
    }
}

async fn lock_exchange(tx: &mut dyn ExchangeTx, id: Uuid) -> Result<Exchange, ExchangeError> {
    tx.lock_exchange(id)
        .await?
        .ok_or_else(|| ExchangeError::NotFound(format!("Exchange {id} not found")))
}

async fn lock_attributions(
    tx: &mut dyn ExchangeTx,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, Attribution>, ExchangeError> {
    let rows = tx.lock_attributions(ids).await?;
    Ok(rows.into_iter().map(|a| (a.id, a)).collect())
}

fn pick(attributions: &HashMap<Uuid, Attribution>, id: Uuid) -> Result<Attribution, ExchangeError> {
    attributions
        .get(&id)
        .cloned()
        .ok_or_else(|| ExchangeError::NotFound(format!("Attribution {id} not found")))
}

async fn load_exam(tx: &mut dyn ExchangeTx, id: Uuid) -> Result<Exam, ExchangeError> {
    tx.find_exam(id)
        .await?
        .ok_or_else(|| ExchangeError::NotFound(format!("Exam {id} not found")))
}

fn find_professor(professors: &[Professor], id: Uuid) -> Result<&Professor, ExchangeError> {
    professors
        .iter()
        .find(|p| p.id == id)
        .ok_or_else(|| ExchangeError::NotFound(format!("Professor {id} not found")))
}

/// The counter duty of a pending exchange.
fn counter_id(exchange: &Exchange, action: &'static str) -> Result<Uuid, ExchangeError> {
    match exchange.accepted_attribution_id {
        Some(id) if exchange.status == ExchangeStatus::PendingRequesterDecision => Ok(id),
        _ => Err(ExchangeError::InvalidState {
            exchange_id: exchange.id,
            status: exchange.status,
            action,
        }),
    }
}
