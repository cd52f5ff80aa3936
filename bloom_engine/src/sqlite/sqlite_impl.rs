//! `SqliteDatabase` is the concrete Order Store backend.
//!
//! It uses SQLite for storage and implements the traits defined in the [`crate::traits`] module.
use std::fmt::Debug;

use chrono::Utc;
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, new_pool, notifications, orders};
use crate::{
    db_types::{NewOrder, Notification, NotificationType, Order, OrderItem, OrderKey, OrderStatusType, StatusUpdate},
    order_objects::OrderQueryFilter,
    traits::{NotificationManagement, OrderManagement, OrderStoreError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl OrderManagement for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn ping(&self) -> Result<(), OrderStoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_order(&self, order: NewOrder, correlation_token: Option<String>) -> Result<Order, OrderStoreError> {
        order.validate().map_err(OrderStoreError::InvalidOrder)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let record = orders::insert_order(&order, correlation_token, now, &mut tx).await?;
        for item in &order.items {
            orders::insert_order_item(record.id, item, now, &mut tx).await?;
        }
        if record.status == OrderStatusType::Pending {
            notifications::insert_notification(record.id, NotificationType::NewOrder, now, &mut tx).await?;
        }
        tx.commit().await?;
        debug!(
            "🗃️ Order {} (#{}) saved with {} items for {}",
            record.order_number,
            record.id,
            order.items.len(),
            record.total_amount
        );
        Ok(record)
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_key(&self, key: &OrderKey) -> Result<Option<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_key(key, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let items = orders::fetch_order_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::search_orders(query, &mut conn).await?;
        Ok(result)
    }

    async fn update_status(&self, key: &OrderKey, update: StatusUpdate) -> Result<Vec<Order>, OrderStoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let updated = orders::update_status(key, &update, now, &mut tx).await?;
        let notification = match update.new_status {
            OrderStatusType::Paid => Some(NotificationType::NewOrder),
            OrderStatusType::PaymentFailed => Some(NotificationType::PaymentFailed),
            _ => None,
        };
        if let Some(notification_type) = notification {
            for order in &updated {
                notifications::insert_notification(order.id, notification_type, now, &mut tx).await?;
            }
        }
        tx.commit().await?;
        if updated.is_empty() {
            debug!("🗃️ No order matching {key} could move to {}", update.new_status);
        } else {
            debug!("🗃️ {} order(s) matching {key} moved to {}", updated.len(), update.new_status);
        }
        Ok(updated)
    }

    async fn attach_checkout_session(&self, order_id: i64, session_id: &str) -> Result<Order, OrderStoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = orders::set_checkout_session(order_id, session_id, Utc::now(), &mut tx).await?;
        let result = match updated {
            Some(order) => Ok(order),
            None => match orders::fetch_order(order_id, &mut tx).await? {
                Some(order) => Err(OrderStoreError::TransitionConflict { id: order.id, current: order.status }),
                None => Err(OrderStoreError::OrderNotFound(format!("#{order_id}"))),
            },
        };
        tx.commit().await?;
        if result.is_ok() {
            trace!("🗃️ Checkout session {session_id} attached to order #{order_id}");
        }
        result
    }
}

impl NotificationManagement for SqliteDatabase {
    async fn fetch_notifications(&self, unread_only: bool) -> Result<Vec<Notification>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = notifications::fetch_notifications(unread_only, &mut conn).await?;
        Ok(result)
    }

    async fn mark_notification_read(&self, id: i64) -> Result<Option<Notification>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let result = notifications::mark_read(id, &mut conn).await?;
        Ok(result)
    }

    async fn mark_all_notifications_read(&self) -> Result<u64, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let count = notifications::mark_all_read(&mut conn).await?;
        debug!("🗃️ {count} notifications marked as read");
        Ok(count)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the URL in `BLOOM_DATABASE_URL`
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date. Safe to call on every start-up.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
