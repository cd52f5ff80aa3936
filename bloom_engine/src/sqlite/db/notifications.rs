use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use super::decode_error;
use crate::db_types::{Notification, NotificationType};

impl<'r> FromRow<'r, SqliteRow> for Notification {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let notification_type = row.try_get::<String, _>("notification_type")?;
        Ok(Self {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            notification_type: notification_type
                .parse::<NotificationType>()
                .map_err(|e| decode_error("notification_type", e))?,
            is_read: row.try_get("is_read")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

pub async fn insert_notification(
    order_id: i64,
    notification_type: NotificationType,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Notification, sqlx::Error> {
    let notification = sqlx::query_as(
        r#"
            INSERT INTO order_notifications (order_id, notification_type, is_read, created_at)
            VALUES ($1, $2, 0, $3)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(notification_type.to_string())
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ {notification_type} notification written for order #{order_id}");
    Ok(notification)
}

pub async fn fetch_notifications(unread_only: bool, conn: &mut SqliteConnection) -> Result<Vec<Notification>, sqlx::Error> {
    let sql = if unread_only {
        "SELECT * FROM order_notifications WHERE is_read = 0 ORDER BY created_at DESC, id DESC"
    } else {
        "SELECT * FROM order_notifications ORDER BY created_at DESC, id DESC"
    };
    let notifications = sqlx::query_as(sql).fetch_all(conn).await?;
    Ok(notifications)
}

pub async fn mark_read(id: i64, conn: &mut SqliteConnection) -> Result<Option<Notification>, sqlx::Error> {
    let notification = sqlx::query_as("UPDATE order_notifications SET is_read = 1 WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(notification)
}

pub async fn mark_all_read(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE order_notifications SET is_read = 1 WHERE is_read = 0").execute(conn).await?;
    Ok(result.rows_affected())
}
