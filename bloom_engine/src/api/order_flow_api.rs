use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewOrder, Order, OrderKey, OrderStatusType, PaymentMethod, StatusUpdate},
    events::{EventProducers, OrderEvent, OrderEventKind},
    order_objects::{OrderQueryFilter, OrderWithItems},
    state_machine::{validate_target, validate_transition, Actor},
    traits::{OrderManagement, OrderStoreError},
};

/// `OrderFlowApi` covers the parts of the order lifecycle that do not involve the payment provider: pay-later orders
/// and staff moving orders through fulfilment.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderFlowApi<B>
where B: OrderManagement
{
    /// Stores a pay-later order. It starts in `pending`, and a `new_order` notification is written with it.
    pub async fn create_pay_later_order(&self, mut order: NewOrder) -> Result<Order, OrderStoreError> {
        order.payment_method = PaymentMethod::PayLater;
        let order = self.db.insert_order(order, None).await?;
        info!("🔄️📦️ Pay-later order {} created for {}", order.order_number, order.total_amount);
        self.producers.dispatch(OrderEvent::new(OrderEventKind::Created, order.clone())).await;
        Ok(order)
    }

    pub async fn fetch_order(&self, id: i64) -> Result<Option<Order>, OrderStoreError> {
        self.db.fetch_order(id).await
    }

    pub async fn order_with_items(&self, id: i64) -> Result<Option<OrderWithItems>, OrderStoreError> {
        let Some(order) = self.db.fetch_order(id).await? else {
            return Ok(None);
        };
        let items = self.db.fetch_order_items(id).await?;
        Ok(Some(OrderWithItems { order, items }))
    }

    pub async fn orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderStoreError> {
        trace!("🔄️📦️ Searching orders. {query}");
        self.db.search_orders(query).await
    }

    /// A staff-driven status change.
    ///
    /// The transition is checked against the order's current status first, so that the caller gets a useful error.
    /// The store then re-checks it in the conditional update. If another writer got there first, this returns
    /// [`OrderStoreError::TransitionConflict`] with the status the order now has.
    ///
    /// Requesting the status an order already has is a no-op and returns the order unchanged.
    pub async fn update_order_status(&self, id: i64, new_status: OrderStatusType) -> Result<Order, OrderStoreError> {
        validate_target(Actor::Staff, new_status)?;
        let order = self.db.fetch_order(id).await?.ok_or_else(|| OrderStoreError::OrderNotFound(format!("#{id}")))?;
        if order.status == new_status {
            debug!("🔄️📦️ Order {} is already {new_status}", order.order_number);
            return Ok(order);
        }
        validate_transition(Actor::Staff, order.status, new_status)?;
        let updated = self.db.update_status(&OrderKey::Id(id), StatusUpdate::new(new_status)).await?;
        match updated.into_iter().next() {
            Some(order) => {
                info!("🔄️📦️ Order {} moved to {new_status}", order.order_number);
                self.producers.dispatch(OrderEvent::new(OrderEventKind::StatusChanged, order.clone())).await;
                Ok(order)
            },
            None => {
                let current = self.db.fetch_order(id).await?.ok_or_else(|| OrderStoreError::OrderNotFound(format!("#{id}")))?;
                warn!(
                    "🔄️📦️ Order {} changed to {} before it could be moved to {new_status}",
                    current.order_number, current.status
                );
                Err(OrderStoreError::TransitionConflict { id, current: current.status })
            },
        }
    }
}
