//! Notification entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::kind::NotificationKind;

/// An in-app notification delivered to a user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    /// Unique notification identifier.
    pub id: Uuid,
    /// The recipient user.
    pub user_id: Uuid,
    /// Type tag (see [`NotificationKind`]).
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// Deep link into the application.
    pub link: Option<String>,
    /// Structured data; always carries `exchange_id` for exchange events.
    pub data: serde_json::Value,
    /// When the user read the notification.
    pub read_at: Option<DateTime<Utc>>,
    /// When the notification was created.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Check if the notification has been read.
    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }
}

/// A notification produced by the fan-out, not yet stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    /// The recipient user.
    pub user_id: Uuid,
    /// Type tag.
    pub kind: NotificationKind,
    /// Human-readable message.
    pub message: String,
    /// Deep link into the application.
    pub link: Option<String>,
    /// Structured data payload.
    pub data: serde_json::Value,
}

impl NewNotification {
    /// Materialize the draft as a stored row.
    pub fn into_notification(self, now: DateTime<Utc>) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            kind: self.kind.as_str().to_string(),
            message: self.message,
            link: self.link,
            data: self.data,
            read_at: None,
            created_at: now,
        }
    }
}
