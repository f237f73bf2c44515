//! Professor entity model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A professor who can hold invigilation duties.
///
/// Owned by roster management; the exchange workflow only reads it to
/// resolve notification recipients and mail addresses.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Professor {
    /// Unique professor identifier.
    pub id: Uuid,
    /// The user account that receives in-app notifications.
    pub user_id: Uuid,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Address used for exchange emails.
    pub email: String,
}

impl Professor {
    /// Display name, e.g. `"Ada Lovelace"`.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
