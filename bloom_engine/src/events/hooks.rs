use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{
    ChangeFeed,
    EventHandler,
    EventProducer,
    Handler,
    OrderCreatedEvent,
    OrderEvent,
    OrderEventKind,
    OrderPaidEvent,
};

/// Everything an order event fans out to: the live change feed, plus any registered hooks.
///
/// This is what the APIs call after the Order Store has committed a change. Publishing never fails the caller; the
/// order is already stored, and dashboards re-fetch on reconnect.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub change_feed: Option<ChangeFeed>,
    pub order_created_producer: Vec<EventProducer<OrderCreatedEvent>>,
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
}

impl EventProducers {
    pub fn with_change_feed(mut self, feed: ChangeFeed) -> Self {
        self.change_feed = Some(feed);
        self
    }

    pub async fn dispatch(&self, event: OrderEvent) {
        trace!("📬️ Dispatching {:?} event for order #{}", event.kind, event.order_id);
        match event.kind {
            OrderEventKind::Created => {
                for producer in &self.order_created_producer {
                    producer.publish_event(OrderCreatedEvent { order: event.order.clone() }).await;
                }
            },
            OrderEventKind::Paid => {
                for producer in &self.order_paid_producer {
                    producer.publish_event(OrderPaidEvent::new(event.order.clone())).await;
                }
            },
            OrderEventKind::PaymentFailed | OrderEventKind::StatusChanged => {},
        }
        if let Some(feed) = &self.change_feed {
            feed.publish(event);
        }
    }
}

pub struct EventHandlers {
    pub on_order_created: Option<EventHandler<OrderCreatedEvent>>,
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_created = hooks.on_order_created.map(|f| EventHandler::new(buffer_size, f));
        let on_order_paid = hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_created, on_order_paid }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_created {
            result.order_created_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_created {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_created: Option<Handler<OrderCreatedEvent>>,
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
}

impl EventHooks {
    pub fn on_order_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCreatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_created = Some(Arc::new(f));
        self
    }

    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }
}
