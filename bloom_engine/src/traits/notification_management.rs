use crate::{db_types::Notification, traits::OrderStoreError};

/// Persistent staff notifications. Rows are written by the Order Store alongside order transitions; this trait only
/// reads them and marks them as read.
#[allow(async_fn_in_trait)]
pub trait NotificationManagement: Clone {
    /// Fetches notifications, newest first. If `unread_only` is true, notifications that have been read are skipped.
    async fn fetch_notifications(&self, unread_only: bool) -> Result<Vec<Notification>, OrderStoreError>;

    /// Marks a single notification as read. Returns `None` if there is no notification with the given id.
    async fn mark_notification_read(&self, id: i64) -> Result<Option<Notification>, OrderStoreError>;

    /// Marks every unread notification as read. Returns the number of notifications that changed.
    async fn mark_all_notifications_read(&self) -> Result<u64, OrderStoreError>;
}
