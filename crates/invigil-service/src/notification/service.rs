//! Notification listing and read receipts.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use invigil_core::error::AppError;
use invigil_core::types::pagination::{PageRequest, PageResponse};
use invigil_database::repositories::NotificationRepository;
use invigil_entity::notification::Notification;

use crate::context::Actor;

/// Reads and acknowledges the actor's own notifications.
///
/// Exchange notifications are written by the exchange service inside each
/// transition; this service never creates them.
#[derive(Debug, Clone)]
pub struct NotificationService {
    /// Notification repository.
    notif_repo: Arc<NotificationRepository>,
}

impl NotificationService {
    /// Creates a new notification service.
    pub fn new(notif_repo: Arc<NotificationRepository>) -> Self {
        Self { notif_repo }
    }

    /// Lists notifications for the current user.
    pub async fn list_notifications(
        &self,
        actor: &Actor,
        page: &PageRequest,
    ) -> Result<PageResponse<Notification>, AppError> {
        self.notif_repo.find_by_user(recipient(actor)?, page).await
    }

    /// Gets the unread notification count.
    pub async fn unread_count(&self, actor: &Actor) -> Result<i64, AppError> {
        self.notif_repo.count_unread(recipient(actor)?).await
    }

    /// Marks a notification as read.
    pub async fn mark_read(&self, actor: &Actor, notification_id: Uuid) -> Result<(), AppError> {
        let user_id = recipient(actor)?;
        let updated = self
            .notif_repo
            .mark_read(notification_id, user_id, Utc::now())
            .await?;
        if !updated {
            debug!(notification_id = %notification_id, user_id = %user_id, "Nothing to mark read");
        }
        Ok(())
    }

    /// Marks all notifications as read for the current user.
    pub async fn mark_all_read(&self, actor: &Actor) -> Result<u64, AppError> {
        self.notif_repo
            .mark_all_read(recipient(actor)?, Utc::now())
            .await
    }
}

fn recipient(actor: &Actor) -> Result<Uuid, AppError> {
    actor
        .user_id()
        .ok_or_else(|| AppError::authorization("The system actor has no notifications"))
}
