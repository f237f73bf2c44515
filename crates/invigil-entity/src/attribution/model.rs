//! Attribution entity model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One professor's invigilation duty on one exam.
///
/// `is_involved_in_exchange` is the exclusivity lock of the exchange
/// workflow: it is true exactly while a non-terminal exchange references
/// the attribution as offered or accepted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attribution {
    /// Unique attribution identifier.
    pub id: Uuid,
    /// The exam being invigilated.
    pub exam_id: Uuid,
    /// The professor currently holding the duty.
    pub professor_id: Uuid,
    /// Assigned room, if any.
    pub room_id: Option<Uuid>,
    /// Lead invigilator for the exam.
    pub is_responsable: bool,
    /// Locked by an active exchange.
    pub is_involved_in_exchange: bool,
}

impl Attribution {
    /// Whether `professor_id` currently holds this duty.
    pub fn is_held_by(&self, professor_id: Uuid) -> bool {
        self.professor_id == professor_id
    }

    pub(crate) fn lock(&mut self) {
        self.is_involved_in_exchange = true;
    }

    pub(crate) fn unlock(&mut self) {
        self.is_involved_in_exchange = false;
    }
}
