use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Row, SqliteConnection};

use super::decode_error;
use crate::{
    db_types::{
        Address,
        NewOrder,
        NewOrderItem,
        Order,
        OrderItem,
        OrderKey,
        OrderStatusType,
        PaymentMethod,
        PaymentStatus,
        StatusUpdate,
    },
    order_objects::OrderQueryFilter,
    traits::OrderStoreError,
};

impl<'r> FromRow<'r, SqliteRow> for Order {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status = row.try_get::<String, _>("status")?;
        let payment_status = row.try_get::<String, _>("payment_status")?;
        let payment_method = row.try_get::<String, _>("payment_method")?;
        Ok(Self {
            id: row.try_get("id")?,
            order_number: row.try_get("order_number")?,
            client_reference: row.try_get("client_reference")?,
            customer_name: row.try_get("customer_name")?,
            customer_email: row.try_get("customer_email")?,
            customer_phone: row.try_get("customer_phone")?,
            total_amount: row.try_get("total_amount")?,
            currency: row.try_get("currency")?,
            status: status.parse::<OrderStatusType>().map_err(|e| decode_error("status", e))?,
            payment_status: payment_status.parse::<PaymentStatus>().map_err(|e| decode_error("payment_status", e))?,
            payment_method: payment_method.parse::<PaymentMethod>().map_err(|e| decode_error("payment_method", e))?,
            correlation_token: row.try_get("correlation_token")?,
            checkout_session_id: row.try_get("checkout_session_id")?,
            payment_intent_id: row.try_get("payment_intent_id")?,
            billing_address: address_column(row, "billing_address")?,
            shipping_address: address_column(row, "shipping_address")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            paid_at: row.try_get("paid_at")?,
            failed_at: row.try_get("failed_at")?,
            shipped_at: row.try_get("shipped_at")?,
            delivered_at: row.try_get("delivered_at")?,
        })
    }
}

fn address_column(row: &SqliteRow, column: &str) -> Result<Option<Address>, sqlx::Error> {
    let raw = row.try_get::<Option<String>, _>(column)?;
    raw.map(|s| serde_json::from_str::<Address>(&s)).transpose().map_err(|e| decode_error(column, e))
}

fn address_json(address: &Option<Address>) -> Result<Option<String>, OrderStoreError> {
    Ok(address.as_ref().map(serde_json::to_string).transpose()?)
}

/// Takes the next value from the order counter. Call this inside the same transaction as the insert, so that a rolled
/// back insert does not burn a number.
async fn next_order_number(conn: &mut SqliteConnection) -> Result<String, OrderStoreError> {
    let value: i64 = sqlx::query_scalar("UPDATE order_counter SET value = value + 1 WHERE id = 1 RETURNING value")
        .fetch_one(conn)
        .await?;
    Ok(format!("ORD-{value:06}"))
}

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
///
/// The line items are not inserted here. See [`insert_order_item`].
pub async fn insert_order(
    order: &NewOrder,
    correlation_token: Option<String>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderStoreError> {
    let total =
        order.total_amount().ok_or_else(|| OrderStoreError::InvalidOrder("The order total is too large".into()))?;
    let order_number = next_order_number(conn).await?;
    let status = order.payment_method.initial_status();
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_number,
                client_reference,
                customer_name,
                customer_email,
                customer_phone,
                total_amount,
                currency,
                status,
                payment_status,
                payment_method,
                correlation_token,
                billing_address,
                shipping_address,
                notes,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *;
        "#,
    )
    .bind(order_number)
    .bind(order.client_reference.as_deref())
    .bind(order.customer_name.as_str())
    .bind(order.customer_email.as_str())
    .bind(order.customer_phone.as_deref())
    .bind(total.value())
    .bind(order.currency.to_lowercase())
    .bind(status.to_string())
    .bind(PaymentStatus::Pending.to_string())
    .bind(order.payment_method.to_string())
    .bind(correlation_token)
    .bind(address_json(&order.billing_address)?)
    .bind(address_json(&order.shipping_address)?)
    .bind(order.notes.as_deref())
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order {} inserted with id {} and status {}", order.order_number, order.id, order.status);
    Ok(order)
}

pub async fn insert_order_item(
    order_id: i64,
    item: &NewOrderItem,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<OrderItem, OrderStoreError> {
    let item = sqlx::query_as(
        r#"
            INSERT INTO order_items (order_id, product_id, product_name, quantity, unit_price, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(item.product_id.as_deref())
    .bind(item.product_name.as_str())
    .bind(item.quantity)
    .bind(item.unit_price.value())
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

/// Returns the most recent order matching the key
pub async fn fetch_order_by_key(key: &OrderKey, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders WHERE ");
    push_key(&mut builder, key);
    builder.push(" ORDER BY id DESC LIMIT 1");
    let order = builder.build_query_as::<Order>().fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items =
        sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await?;
    Ok(items)
}

fn push_key(builder: &mut QueryBuilder<'_, sqlx::Sqlite>, key: &OrderKey) {
    builder.push(key.column());
    builder.push(" = ");
    match key {
        OrderKey::Id(id) => builder.push_bind(*id),
        OrderKey::PaymentIntent(s) | OrderKey::CorrelationToken(s) | OrderKey::CheckoutSession(s) => {
            builder.push_bind(s.clone())
        },
    };
}

fn push_status_list(builder: &mut QueryBuilder<'_, sqlx::Sqlite>, statuses: &[OrderStatusType]) {
    builder.push("status IN (");
    let mut list = builder.separated(", ");
    for status in statuses {
        list.push_bind(status.to_string());
    }
    list.push_unseparated(")");
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at`, newest first unless the filter asks for oldest first
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders WHERE 1 = 1");
    if let Some(number) = query.order_number {
        builder.push(" AND order_number = ");
        builder.push_bind(number);
    }
    if let Some(email) = query.customer_email {
        builder.push(" AND customer_email = ");
        builder.push_bind(email);
    }
    if let Some(method) = query.payment_method {
        builder.push(" AND payment_method = ");
        builder.push_bind(method.to_string());
    }
    if let Some(statuses) = query.status.as_ref().filter(|s| !s.is_empty()) {
        builder.push(" AND ");
        push_status_list(&mut builder, statuses);
    }
    if let Some(has_session) = query.has_checkout_session {
        let clause = if has_session { "IS NOT NULL" } else { "IS NULL" };
        builder.push(format!(" AND checkout_session_id {clause}"));
    }
    if let Some(since) = query.since {
        builder.push(" AND created_at >= ");
        builder.push_bind(since);
    }
    if let Some(until) = query.until {
        builder.push(" AND created_at <= ");
        builder.push_bind(until);
    }
    if query.oldest_first {
        builder.push(" ORDER BY created_at ASC, id ASC");
    } else {
        builder.push(" ORDER BY created_at DESC, id DESC");
    }
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(limit));
    }
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {:?}", orders.len());
    Ok(orders)
}

/// The conditional status update. The `WHERE` clause re-checks that the order's current status may move to the new
/// one, so this is safe to race against any other writer.
///
/// Timestamps use `COALESCE` so that re-applying an update can never overwrite the time of the first one.
pub async fn update_status(
    key: &OrderKey,
    update: &StatusUpdate,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, OrderStoreError> {
    let sources = OrderStatusType::sources_for(update.new_status);
    if sources.is_empty() {
        debug!("🗃️ No status can move to {}. Nothing to update.", update.new_status);
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new("UPDATE orders SET status = ");
    builder.push_bind(update.new_status.to_string());
    builder.push(", updated_at = ");
    builder.push_bind(now);
    let stamp = match update.new_status {
        OrderStatusType::Paid => Some(("paid_at", Some(PaymentStatus::Paid))),
        OrderStatusType::PaymentFailed => Some(("failed_at", Some(PaymentStatus::Failed))),
        OrderStatusType::Shipped => Some(("shipped_at", None)),
        OrderStatusType::Delivered => Some(("delivered_at", None)),
        _ => None,
    };
    if let Some((column, payment_status)) = stamp {
        builder.push(format!(", {column} = COALESCE({column}, "));
        builder.push_bind(now);
        builder.push(")");
        if let Some(payment_status) = payment_status {
            builder.push(", payment_status = ");
            builder.push_bind(payment_status.to_string());
        }
    }
    if let Some(payment_intent_id) = &update.payment_intent_id {
        builder.push(", payment_intent_id = COALESCE(payment_intent_id, ");
        builder.push_bind(payment_intent_id.clone());
        builder.push(")");
    }
    builder.push(" WHERE ");
    push_key(&mut builder, key);
    builder.push(" AND ");
    push_status_list(&mut builder, &sources);
    builder.push(" RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let rows = builder.build().fetch_all(conn).await?;
    let orders = rows.iter().map(Order::from_row).collect::<Result<Vec<Order>, _>>()?;
    trace!("🗃️ {} orders moved to {} for {key}", orders.len(), update.new_status);
    Ok(orders)
}

/// Records the checkout session id against an order, provided the order is still awaiting payment.
pub async fn set_checkout_session(
    order_id: i64,
    session_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderStoreError> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET checkout_session_id = $1, updated_at = $2
            WHERE id = $3 AND status IN ('payment_pending', 'payment_failed')
            RETURNING *;
        "#,
    )
    .bind(session_id)
    .bind(now)
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}
