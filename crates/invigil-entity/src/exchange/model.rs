//! Exchange entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::ExchangeStatus;

/// One duty-swap transaction between two professors.
///
/// Exchanges are never deleted; terminal rows are kept as history.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Exchange {
    /// Unique exchange identifier.
    pub id: Uuid,
    /// The duty the requester wants to give away.
    pub offered_attribution_id: Uuid,
    /// Professor who owned the offered attribution when the request was made.
    pub requester_id: Uuid,
    /// Current lifecycle state.
    pub status: ExchangeStatus,
    /// Professor who answered with a counter-proposal.
    pub accepter_id: Option<Uuid>,
    /// The duty offered in return.
    pub accepted_attribution_id: Option<Uuid>,
    /// Free-text reason given by the requester.
    pub motif: Option<String>,
    /// The withdrawn exchange this one reopens, if any.
    pub reopened_from: Option<Uuid>,
    /// When the exchange was created.
    pub created_at: DateTime<Utc>,
    /// When the exchange last changed state.
    pub updated_at: DateTime<Utc>,
}

impl Exchange {
    /// Every attribution this exchange references.
    pub fn attribution_ids(&self) -> Vec<Uuid> {
        let mut ids = vec![self.offered_attribution_id];
        ids.extend(self.accepted_attribution_id);
        ids
    }

    /// Every professor involved in this exchange.
    pub fn participant_ids(&self) -> Vec<Uuid> {
        let mut ids = vec![self.requester_id];
        ids.extend(self.accepter_id);
        ids
    }

    /// Whether `professor_id` is the requester or the accepter.
    pub fn involves(&self, professor_id: Uuid) -> bool {
        self.requester_id == professor_id || self.accepter_id == Some(professor_id)
    }
}
