//! PostgreSQL unit of work backed by a sqlx transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use invigil_core::error::{AppError, ErrorKind};
use invigil_core::result::AppResult;
use invigil_core::types::pagination::{PageRequest, PageResponse};
use invigil_entity::attribution::Attribution;
use invigil_entity::exam::Exam;
use invigil_entity::exchange::Exchange;
use invigil_entity::job::CreateJob;
use invigil_entity::notification::Notification;
use invigil_entity::professor::Professor;

use super::{ExchangeStore, ExchangeTx};
use crate::repositories::ExchangeRepository;

/// Map a write error, turning unique violations into conflicts.
///
/// The partial unique indexes on `exchanges` reject a second active
/// exchange on the same attribution.
fn write_error(context: &str, err: sqlx::Error) -> AppError {
    let unique = err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505");
    if unique {
        AppError::with_source(
            ErrorKind::Conflict,
            format!("{context}: attribution already held by an active exchange"),
            err,
        )
    } else {
        AppError::with_source(ErrorKind::Database, context.to_string(), err)
    }
}

/// Exchange store over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgExchangeStore {
    pool: PgPool,
    exchanges: ExchangeRepository,
}

impl PgExchangeStore {
    /// Create a new store over `pool`.
    pub fn new(pool: PgPool) -> Self {
        Self {
            exchanges: ExchangeRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl ExchangeStore for PgExchangeStore {
    fn store_type(&self) -> &str {
        "postgres"
    }

    async fn begin(&self) -> AppResult<Box<dyn ExchangeTx>> {
        let tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;
        Ok(Box::new(PgExchangeTx { tx }))
    }

    async fn find_exchange(&self, id: Uuid) -> AppResult<Option<Exchange>> {
        self.exchanges.find_by_id(id).await
    }

    async fn list_open_for(
        &self,
        professor_id: Uuid,
        page: &PageRequest,
    ) -> AppResult<PageResponse<Exchange>> {
        self.exchanges.find_open_market(professor_id, page).await
    }

    async fn list_for_professor(
        &self,
        professor_id: Uuid,
        page: &PageRequest,
    ) -> AppResult<PageResponse<Exchange>> {
        self.exchanges.find_for_professor(professor_id, page).await
    }

    async fn list_active(&self, page: &PageRequest) -> AppResult<PageResponse<Exchange>> {
        self.exchanges.find_active(page).await
    }

    async fn find_expiring(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        self.exchanges.find_expiring_ids(cutoff).await
    }
}

/// A unit of work holding one PostgreSQL transaction.
///
/// Rolled back by sqlx when dropped without commit.
pub struct PgExchangeTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ExchangeTx for PgExchangeTx {
    async fn lock_exchange(&mut self, id: Uuid) -> AppResult<Option<Exchange>> {
        sqlx::query_as::<_, Exchange>("SELECT * FROM exchanges WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock exchange", e))
    }

    async fn lock_attributions(&mut self, ids: &[Uuid]) -> AppResult<Vec<Attribution>> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        debug!(count = ids.len(), "Locking attributions");

        sqlx::query_as::<_, Attribution>(
            "SELECT id, exam_id, professor_id, room_id, is_responsable, is_involved_in_exchange \
             FROM attributions WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock attributions", e))
    }

    async fn find_exam(&mut self, id: Uuid) -> AppResult<Option<Exam>> {
        sqlx::query_as::<_, Exam>("SELECT id, label, starts_at FROM exams WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find exam", e))
    }

    async fn find_professors(&mut self, ids: &[Uuid]) -> AppResult<Vec<Professor>> {
        sqlx::query_as::<_, Professor>(
            "SELECT id, user_id, first_name, last_name, email FROM professors WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find professors", e))
    }

    async fn insert_exchange(&mut self, exchange: &Exchange) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO exchanges (id, offered_attribution_id, requester_id, status, accepter_id, \
             accepted_attribution_id, motif, reopened_from, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(exchange.id)
        .bind(exchange.offered_attribution_id)
        .bind(exchange.requester_id)
        .bind(exchange.status)
        .bind(exchange.accepter_id)
        .bind(exchange.accepted_attribution_id)
        .bind(&exchange.motif)
        .bind(exchange.reopened_from)
        .bind(exchange.created_at)
        .bind(exchange.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error("Failed to insert exchange", e))?;
        Ok(())
    }

    async fn update_exchange(&mut self, exchange: &Exchange) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE exchanges SET status = $2, accepter_id = $3, accepted_attribution_id = $4, \
             updated_at = $5 WHERE id = $1",
        )
        .bind(exchange.id)
        .bind(exchange.status)
        .bind(exchange.accepter_id)
        .bind(exchange.accepted_attribution_id)
        .bind(exchange.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error("Failed to update exchange", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Exchange {} not found",
                exchange.id
            )));
        }
        Ok(())
    }

    async fn update_attribution(&mut self, attribution: &Attribution) -> AppResult<()> {
        sqlx::query(
            "UPDATE attributions SET professor_id = $2, is_involved_in_exchange = $3 WHERE id = $1",
        )
        .bind(attribution.id)
        .bind(attribution.professor_id)
        .bind(attribution.is_involved_in_exchange)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to update attribution", e)
        })?;
        Ok(())
    }

    async fn insert_notification(&mut self, notification: &Notification) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, type, message, link, data, read_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(&notification.kind)
        .bind(&notification.message)
        .bind(&notification.link)
        .bind(&notification.data)
        .bind(notification.read_at)
        .bind(notification.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to insert notification", e)
        })?;
        Ok(())
    }

    async fn enqueue_job(&mut self, job: &CreateJob) -> AppResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO jobs (job_type, queue, priority, payload, max_attempts, scheduled_at, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(&job.job_type)
        .bind(&job.queue)
        .bind(job.priority)
        .bind(&job.payload)
        .bind(job.max_attempts)
        .bind(job.scheduled_at)
        .bind(job.created_by)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to enqueue job", e))
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit transaction", e)
        })
    }
}
