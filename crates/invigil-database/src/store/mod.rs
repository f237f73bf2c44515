//! The exchange unit of work.
//!
//! Every exchange transition loads its rows under lock, applies the pure
//! state machine, and writes the exchange, the attribution flags, the
//! in-app notifications and the queued mail jobs through one
//! [`ExchangeTx`]. Dropping a transaction without calling
//! [`ExchangeTx::commit`] discards every write.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use invigil_core::result::AppResult;
use invigil_core::types::pagination::{PageRequest, PageResponse};
use invigil_entity::attribution::Attribution;
use invigil_entity::exam::Exam;
use invigil_entity::exchange::Exchange;
use invigil_entity::job::CreateJob;
use invigil_entity::notification::Notification;
use invigil_entity::professor::Professor;

pub use memory::MemoryExchangeStore;
pub use postgres::PgExchangeStore;

/// Entry point to exchange persistence: opens units of work and serves
/// read-only queries outside of them.
#[async_trait]
pub trait ExchangeStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the store name (e.g., "postgres", "memory").
    fn store_type(&self) -> &str;

    /// Open a new unit of work.
    async fn begin(&self) -> AppResult<Box<dyn ExchangeTx>>;

    /// Find an exchange by ID.
    async fn find_exchange(&self, id: Uuid) -> AppResult<Option<Exchange>>;

    /// Open requests from other professors that `professor_id` could answer.
    async fn list_open_for(
        &self,
        professor_id: Uuid,
        page: &PageRequest,
    ) -> AppResult<PageResponse<Exchange>>;

    /// Exchanges where `professor_id` is requester or accepter, newest first.
    async fn list_for_professor(
        &self,
        professor_id: Uuid,
        page: &PageRequest,
    ) -> AppResult<PageResponse<Exchange>>;

    /// Every non-terminal exchange.
    async fn list_active(&self, page: &PageRequest) -> AppResult<PageResponse<Exchange>>;

    /// IDs of active exchanges whose offered or accepted exam starts at or
    /// before `cutoff`.
    async fn find_expiring(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Uuid>>;
}

/// One atomic unit of work over the exchange tables.
///
/// Locking reads must follow a fixed order: the exchange first, then its
/// attributions. [`ExchangeTx::lock_attributions`] always locks in
/// ascending id order.
#[async_trait]
pub trait ExchangeTx: Send {
    /// Load and lock an exchange.
    async fn lock_exchange(&mut self, id: Uuid) -> AppResult<Option<Exchange>>;

    /// Load and lock attributions, in ascending id order. Missing ids are
    /// omitted from the result.
    async fn lock_attributions(&mut self, ids: &[Uuid]) -> AppResult<Vec<Attribution>>;

    /// Load an exam.
    async fn find_exam(&mut self, id: Uuid) -> AppResult<Option<Exam>>;

    /// Load professors by ID. Missing ids are omitted from the result.
    async fn find_professors(&mut self, ids: &[Uuid]) -> AppResult<Vec<Professor>>;

    /// Insert a new exchange.
    async fn insert_exchange(&mut self, exchange: &Exchange) -> AppResult<()>;

    /// Persist the status and counter-proposal columns of an exchange.
    async fn update_exchange(&mut self, exchange: &Exchange) -> AppResult<()>;

    /// Persist the holder and lock flag of an attribution.
    async fn update_attribution(&mut self, attribution: &Attribution) -> AppResult<()>;

    /// Insert an in-app notification.
    async fn insert_notification(&mut self, notification: &Notification) -> AppResult<()>;

    /// Enqueue a background job; it becomes visible to workers on commit.
    async fn enqueue_job(&mut self, job: &CreateJob) -> AppResult<Uuid>;

    /// Commit every write of this unit of work.
    async fn commit(self: Box<Self>) -> AppResult<()>;
}
