//! Exchange read queries.
//!
//! Writes never go through this repository; every state change runs inside
//! an [`crate::store::ExchangeTx`].

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use invigil_core::error::{AppError, ErrorKind};
use invigil_core::result::AppResult;
use invigil_core::types::pagination::{PageRequest, PageResponse};
use invigil_entity::exchange::Exchange;

/// Read-side repository for exchanges.
#[derive(Debug, Clone)]
pub struct ExchangeRepository {
    pool: PgPool,
}

impl ExchangeRepository {
    /// Create a new exchange repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find an exchange by ID.
    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Exchange>> {
        sqlx::query_as::<_, Exchange>("SELECT * FROM exchanges WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find exchange", e))
    }

    /// Open requests a professor could answer: everyone else's open exchanges.
    pub async fn find_open_market(
        &self,
        professor_id: Uuid,
        page: &PageRequest,
    ) -> AppResult<PageResponse<Exchange>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM exchanges WHERE status = 'open' AND requester_id <> $1",
        )
        .bind(professor_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count open exchanges", e))?;

        let items = sqlx::query_as::<_, Exchange>(
            "SELECT * FROM exchanges WHERE status = 'open' AND requester_id <> $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(professor_id)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list open exchanges", e))?;

        Ok(PageResponse::new(items, page.page, page.page_size, total as u64))
    }

    /// Every exchange a professor took part in, newest first.
    pub async fn find_for_professor(
        &self,
        professor_id: Uuid,
        page: &PageRequest,
    ) -> AppResult<PageResponse<Exchange>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM exchanges WHERE requester_id = $1 OR accepter_id = $1",
        )
        .bind(professor_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count exchanges", e))?;

        let items = sqlx::query_as::<_, Exchange>(
            "SELECT * FROM exchanges WHERE requester_id = $1 OR accepter_id = $1 \
             ORDER BY updated_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(professor_id)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list exchanges", e))?;

        Ok(PageResponse::new(items, page.page, page.page_size, total as u64))
    }

    /// All non-terminal exchanges, for administrators.
    pub async fn find_active(&self, page: &PageRequest) -> AppResult<PageResponse<Exchange>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM exchanges WHERE status IN ('open', 'pending_requester_decision')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count active exchanges", e))?;

        let items = sqlx::query_as::<_, Exchange>(
            "SELECT * FROM exchanges WHERE status IN ('open', 'pending_requester_decision') \
             ORDER BY created_at ASC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list active exchanges", e))?;

        Ok(PageResponse::new(items, page.page, page.page_size, total as u64))
    }

    /// IDs of active exchanges whose offered or accepted exam starts at or
    /// before `cutoff`.
    pub async fn find_expiring_ids(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT e.id FROM exchanges e \
             JOIN attributions oa ON oa.id = e.offered_attribution_id \
             JOIN exams oe ON oe.id = oa.exam_id \
             LEFT JOIN attributions aa ON aa.id = e.accepted_attribution_id \
             LEFT JOIN exams ae ON ae.id = aa.exam_id \
             WHERE e.status IN ('open', 'pending_requester_decision') \
             AND (oe.starts_at <= $1 OR ae.starts_at <= $1)",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find expiring exchanges", e))
    }
}
