//! The order change feed.
//!
//! A broadcast channel: every subscriber sees every event published after it subscribed. Subscribers that fall more
//! than `capacity` events behind lose the oldest events, and are told so by the receiver (`RecvError::Lagged`). They
//! should re-fetch current state rather than trust the feed after that.
use log::*;
use tokio::sync::broadcast;

use crate::events::OrderEvent;

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<OrderEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes the event to all current subscribers and returns how many there were. Having no subscribers is
    /// normal (no dashboards are connected) and is not an error.
    pub fn publish(&self, event: OrderEvent) -> usize {
        let order_id = event.order_id;
        let kind = event.kind;
        match self.sender.send(event) {
            Ok(n) => {
                trace!("📬️ {kind:?} event for order #{order_id} sent to {n} subscribers");
                n
            },
            Err(_) => {
                trace!("📬️ No feed subscribers for {kind:?} event on order #{order_id}");
                0
            },
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}
