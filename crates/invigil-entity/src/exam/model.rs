//! Exam entity model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A scheduled exam slot.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Exam {
    /// Unique exam identifier.
    pub id: Uuid,
    /// Human-readable label (module name and group).
    pub label: String,
    /// Scheduled start time.
    pub starts_at: DateTime<Utc>,
}

impl Exam {
    /// Whether the exam starts strictly later than `now + notice`.
    pub fn is_beyond_notice(&self, now: DateTime<Utc>, notice: Duration) -> bool {
        self.starts_at > now + notice
    }
}
