//! In-memory unit of work.
//!
//! The whole state sits behind one async mutex. A transaction holds the
//! guard for its lifetime and writes to a working copy that replaces the
//! shared state on commit, so units of work are fully serialized and a
//! dropped transaction leaves no trace.

use std::collections::HashMap;
#[cfg(any(test, feature = "test-util"))]
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use invigil_core::error::AppError;
use invigil_core::result::AppResult;
use invigil_core::types::pagination::{PageRequest, PageResponse};
use invigil_entity::attribution::Attribution;
use invigil_entity::exam::Exam;
use invigil_entity::exchange::{Exchange, ExchangeStatus};
use invigil_entity::job::{CreateJob, Job, JobStatus};
use invigil_entity::notification::Notification;
use invigil_entity::professor::Professor;

use super::{ExchangeStore, ExchangeTx};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    professors: HashMap<Uuid, Professor>,
    exams: HashMap<Uuid, Exam>,
    attributions: HashMap<Uuid, Attribution>,
    exchanges: HashMap<Uuid, Exchange>,
    notifications: Vec<Notification>,
    jobs: Vec<Job>,
    #[cfg(any(test, feature = "test-util"))]
    failing_exchanges: HashSet<Uuid>,
}

impl MemoryState {
    fn exam_of(&self, attribution_id: Option<Uuid>) -> Option<&Exam> {
        let attribution = self.attributions.get(&attribution_id?)?;
        self.exams.get(&attribution.exam_id)
    }

    /// Reject a write that would give an attribution two active exchanges.
    fn ensure_exclusive(&self, exchange: &Exchange) -> AppResult<()> {
        if !exchange.status.is_active() {
            return Ok(());
        }
        let held = exchange.attribution_ids();
        let clash = self.exchanges.values().find(|other| {
            other.id != exchange.id
                && other.status.is_active()
                && other.attribution_ids().iter().any(|id| held.contains(id))
        });
        match clash {
            Some(other) => Err(AppError::conflict(format!(
                "Attribution already held by active exchange {}",
                other.id
            ))),
            None => Ok(()),
        }
    }
}

fn paginate<T: Serialize>(mut items: Vec<T>, page: &PageRequest) -> PageResponse<T> {
    let total = items.len() as u64;
    let start = (page.offset() as usize).min(items.len());
    let end = (start + page.limit() as usize).min(items.len());
    let items: Vec<T> = items.drain(start..end).collect();
    PageResponse::new(items, page.page, page.page_size, total)
}

/// Exchange store kept entirely in memory.
///
/// Used by tests and by local runs without a database. Seeding methods
/// stand in for the roster and scheduling systems that own professors,
/// exams and attributions.
#[derive(Debug, Clone, Default)]
pub struct MemoryExchangeStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryExchangeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a professor.
    pub async fn insert_professor(&self, professor: Professor) {
        self.state
            .lock()
            .await
            .professors
            .insert(professor.id, professor);
    }

    /// Add or replace an exam.
    pub async fn insert_exam(&self, exam: Exam) {
        self.state.lock().await.exams.insert(exam.id, exam);
    }

    /// Add or replace an attribution.
    pub async fn insert_attribution(&self, attribution: Attribution) {
        self.state
            .lock()
            .await
            .attributions
            .insert(attribution.id, attribution);
    }

    /// Move an exam, e.g. to simulate a reschedule into the notice window.
    pub async fn set_exam_start(&self, exam_id: Uuid, starts_at: DateTime<Utc>) {
        if let Some(exam) = self.state.lock().await.exams.get_mut(&exam_id) {
            exam.starts_at = starts_at;
        }
    }

    /// Make every later write to `exchange_id` fail.
    #[cfg(any(test, feature = "test-util"))]
    pub async fn fail_writes_for(&self, exchange_id: Uuid) {
        self.state
            .lock()
            .await
            .failing_exchanges
            .insert(exchange_id);
    }

    /// Snapshot of an attribution.
    pub async fn attribution(&self, id: Uuid) -> Option<Attribution> {
        self.state.lock().await.attributions.get(&id).cloned()
    }

    /// Snapshot of every attribution.
    pub async fn attributions(&self) -> Vec<Attribution> {
        self.state
            .lock()
            .await
            .attributions
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of every exchange.
    pub async fn exchanges(&self) -> Vec<Exchange> {
        self.state.lock().await.exchanges.values().cloned().collect()
    }

    /// Snapshot of the notifications addressed to `user_id`, oldest first.
    pub async fn notifications_for(&self, user_id: Uuid) -> Vec<Notification> {
        self.state
            .lock()
            .await
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Snapshot of every enqueued job, in enqueue order.
    pub async fn jobs(&self) -> Vec<Job> {
        self.state.lock().await.jobs.clone()
    }

    async fn query<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> T {
        let state = self.state.lock().await;
        f(&state)
    }
}

#[async_trait]
impl ExchangeStore for MemoryExchangeStore {
    fn store_type(&self) -> &str {
        "memory"
    }

    async fn begin(&self) -> AppResult<Box<dyn ExchangeTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryExchangeTx { guard, working }))
    }

    async fn find_exchange(&self, id: Uuid) -> AppResult<Option<Exchange>> {
        Ok(self.query(|s| s.exchanges.get(&id).cloned()).await)
    }

    async fn list_open_for(
        &self,
        professor_id: Uuid,
        page: &PageRequest,
    ) -> AppResult<PageResponse<Exchange>> {
        let mut items: Vec<Exchange> = self
            .query(|s| {
                s.exchanges
                    .values()
                    .filter(|e| {
                        e.status == ExchangeStatus::Open
                            && e.requester_id != professor_id
                    })
                    .cloned()
                    .collect()
            })
            .await;
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(items, page))
    }

    async fn list_for_professor(
        &self,
        professor_id: Uuid,
        page: &PageRequest,
    ) -> AppResult<PageResponse<Exchange>> {
        let mut items: Vec<Exchange> = self
            .query(|s| {
                s.exchanges
                    .values()
                    .filter(|e| e.involves(professor_id))
                    .cloned()
                    .collect()
            })
            .await;
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(paginate(items, page))
    }

    async fn list_active(&self, page: &PageRequest) -> AppResult<PageResponse<Exchange>> {
        let mut items: Vec<Exchange> = self
            .query(|s| {
                s.exchanges
                    .values()
                    .filter(|e| e.status.is_active())
                    .cloned()
                    .collect()
            })
            .await;
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(paginate(items, page))
    }

    async fn find_expiring(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        Ok(self
            .query(|s| {
                let mut ids: Vec<Uuid> = s
                    .exchanges
                    .values()
                    .filter(|e| e.status.is_active())
                    .filter(|e| {
                        [Some(e.offered_attribution_id), e.accepted_attribution_id]
                            .into_iter()
                            .filter_map(|id| s.exam_of(id))
                            .any(|exam| exam.starts_at <= cutoff)
                    })
                    .map(|e| e.id)
                    .collect();
                ids.sort();
                ids
            })
            .await)
    }
}

/// A unit of work over [`MemoryExchangeStore`].
pub struct MemoryExchangeTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryExchangeTx {
    #[cfg(any(test, feature = "test-util"))]
    fn ensure_writable(&self, exchange_id: Uuid) -> AppResult<()> {
        if self.working.failing_exchanges.contains(&exchange_id) {
            Err(AppError::database(format!(
                "Simulated write failure for exchange {exchange_id}"
            )))
        } else {
            Ok(())
        }
    }

    #[cfg(not(any(test, feature = "test-util")))]
    fn ensure_writable(&self, _exchange_id: Uuid) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ExchangeTx for MemoryExchangeTx {
    async fn lock_exchange(&mut self, id: Uuid) -> AppResult<Option<Exchange>> {
        Ok(self.working.exchanges.get(&id).cloned())
    }

    async fn lock_attributions(&mut self, ids: &[Uuid]) -> AppResult<Vec<Attribution>> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        Ok(ids
            .iter()
            .filter_map(|id| self.working.attributions.get(id).cloned())
            .collect())
    }

    async fn find_exam(&mut self, id: Uuid) -> AppResult<Option<Exam>> {
        Ok(self.working.exams.get(&id).cloned())
    }

    async fn find_professors(&mut self, ids: &[Uuid]) -> AppResult<Vec<Professor>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.working.professors.get(id).cloned())
            .collect())
    }

    async fn insert_exchange(&mut self, exchange: &Exchange) -> AppResult<()> {
        self.ensure_writable(exchange.id)?;
        if self.working.exchanges.contains_key(&exchange.id) {
            return Err(AppError::conflict(format!(
                "Exchange {} already exists",
                exchange.id
            )));
        }
        self.working.ensure_exclusive(exchange)?;
        self.working
            .exchanges
            .insert(exchange.id, exchange.clone());
        Ok(())
    }

    async fn update_exchange(&mut self, exchange: &Exchange) -> AppResult<()> {
        self.ensure_writable(exchange.id)?;
        if !self.working.exchanges.contains_key(&exchange.id) {
            return Err(AppError::not_found(format!(
                "Exchange {} not found",
                exchange.id
            )));
        }
        self.working.ensure_exclusive(exchange)?;
        self.working
            .exchanges
            .insert(exchange.id, exchange.clone());
        Ok(())
    }

    async fn update_attribution(&mut self, attribution: &Attribution) -> AppResult<()> {
        match self.working.attributions.get_mut(&attribution.id) {
            Some(stored) => {
                stored.professor_id = attribution.professor_id;
                stored.is_involved_in_exchange = attribution.is_involved_in_exchange;
                Ok(())
            }
            None => Err(AppError::not_found(format!(
                "Attribution {} not found",
                attribution.id
            ))),
        }
    }

    async fn insert_notification(&mut self, notification: &Notification) -> AppResult<()> {
        self.working.notifications.push(notification.clone());
        Ok(())
    }

    async fn enqueue_job(&mut self, job: &CreateJob) -> AppResult<Uuid> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        self.working.jobs.push(Job {
            id,
            job_type: job.job_type.clone(),
            queue: job.queue.clone(),
            priority: job.priority,
            payload: job.payload.clone(),
            result: None,
            error_message: None,
            status: JobStatus::Pending,
            attempts: Some(0),
            max_attempts: Some(job.max_attempts),
            scheduled_at: job.scheduled_at,
            started_at: None,
            completed_at: None,
            created_by: job.created_by,
            worker_id: None,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
