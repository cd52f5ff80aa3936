use thiserror::Error;

use crate::{
    db_types::{ConversionError, NewOrder, Order, OrderItem, OrderKey, OrderStatusType, StatusUpdate},
    order_objects::OrderQueryFilter,
    state_machine::TransitionError,
};

/// The Order Store. It is the single source of truth for order state, and the only component that writes it.
///
/// All status changes go through [`OrderManagement::update_status`], which is a single conditional update. Concurrent
/// writers (a webhook and a staff action, say) can never overwrite each other's work, because each write re-checks the
/// current status inside the same statement that changes it.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Succeeds if the store can currently serve queries.
    async fn ping(&self) -> Result<(), OrderStoreError>;

    /// Stores a new order and its line items in a single atomic transaction.
    ///
    /// * The order number is assigned by the store from a monotonic counter.
    /// * Card orders start in `payment_pending`, with the given correlation token. Pay-later orders start in
    ///   `pending`, and a `new_order` notification is written in the same transaction.
    ///
    /// Returns the newly created order record.
    async fn insert_order(&self, order: NewOrder, correlation_token: Option<String>)
        -> Result<Order, OrderStoreError>;

    /// Fetches the order with the given id.
    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, OrderStoreError>;

    /// Fetches the most recent order matching the given key.
    async fn fetch_order_by_key(&self, key: &OrderKey) -> Result<Option<Order>, OrderStoreError>;

    /// Fetches the line items for the given order, in the order they were created.
    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, OrderStoreError>;

    /// Fetches orders according to criteria specified in the `OrderQueryFilter`. Results are sorted by creation time,
    /// newest first.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderStoreError>;

    /// Atomically applies `update` to the orders matching `key`, but only if their current status permits the
    /// transition (see [`OrderStatusType::sources_for`]).
    ///
    /// Timestamps (`paid_at`, `failed_at`, `shipped_at`, `delivered_at`) are only written if they are not already set,
    /// and the payment intent id is only written if the order does not already have one. A `paid` transition writes a
    /// `new_order` notification, and a `payment_failed` transition writes a `payment_failed` notification, in the same
    /// transaction.
    ///
    /// Returns the updated orders. An empty vector (zero affected rows) is not an error: it means either that no order
    /// matches the key, or that the transition does not apply to its current status.
    async fn update_status(&self, key: &OrderKey, update: StatusUpdate) -> Result<Vec<Order>, OrderStoreError>;

    /// Records the provider's checkout session id against an order that is still waiting for payment.
    async fn attach_checkout_session(&self, order_id: i64, session_id: &str) -> Result<Order, OrderStoreError>;
}

#[derive(Debug, Clone, Error)]
pub enum OrderStoreError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(String),
    #[error("Notification #{0} does not exist")]
    NotificationNotFound(i64),
    #[error("Illegal status transition. {0}")]
    IllegalTransition(#[from] TransitionError),
    #[error("Order {id} changed while the request was in flight. It is now {current}")]
    TransitionConflict { id: i64, current: OrderStatusType },
    #[error("Invalid order. {0}")]
    InvalidOrder(String),
    #[error("Could not (de)serialize order data. {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for OrderStoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

impl From<ConversionError> for OrderStoreError {
    fn from(e: ConversionError) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for OrderStoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
