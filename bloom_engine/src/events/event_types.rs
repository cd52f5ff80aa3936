use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::Order;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    /// A new order was stored
    Created,
    /// The payment provider confirmed payment
    Paid,
    /// The payment provider reported a failed payment
    PaymentFailed,
    /// Staff moved the order along its lifecycle
    StatusChanged,
}

/// A change-feed message. Sent whenever the Order Store mutates an order.
///
/// Delivery is best-effort and at-least-once; subscribers should deduplicate with [`OrderEvent::key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: i64,
    pub kind: OrderEventKind,
    /// The order as it was immediately after the change
    pub order: Order,
    /// The time of the change. This is the order's `updated_at` value.
    pub timestamp: DateTime<Utc>,
}

impl OrderEvent {
    pub fn new(kind: OrderEventKind, order: Order) -> Self {
        Self { order_id: order.id, kind, timestamp: order.updated_at, order }
    }

    pub fn key(&self) -> (i64, OrderEventKind, DateTime<Utc>) {
        (self.order_id, self.kind, self.timestamp)
    }
}

/// Hook payload for newly created orders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

/// Hook payload for orders whose payment was confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}
