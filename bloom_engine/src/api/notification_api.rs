use std::fmt::Debug;

use log::*;

use crate::{
    db_types::Notification,
    traits::{NotificationManagement, OrderStoreError},
};

/// Staff notifications. These are the persistent half of the notification dispatcher: a dashboard that was offline
/// catches up by polling here.
pub struct NotificationApi<B> {
    db: B,
}

impl<B> Debug for NotificationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NotificationApi")
    }
}

impl<B> NotificationApi<B>
where B: NotificationManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn notifications(&self, unread_only: bool) -> Result<Vec<Notification>, OrderStoreError> {
        self.db.fetch_notifications(unread_only).await
    }

    pub async fn mark_read(&self, id: i64) -> Result<Notification, OrderStoreError> {
        self.db
            .mark_notification_read(id)
            .await?
            .ok_or(OrderStoreError::NotificationNotFound(id))
    }

    /// Marks everything read. Dashboards call this once they have caught up.
    pub async fn mark_all_read(&self) -> Result<u64, OrderStoreError> {
        let count = self.db.mark_all_notifications_read().await?;
        debug!("📬️ Marked {count} notifications as read");
        Ok(count)
    }
}
