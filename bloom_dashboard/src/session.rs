//! The dashboard session.
//!
//! Two producers feed one consumer: the live change feed, and a fixed-interval poll of the full order list. Neither
//! is trusted on its own. The session deduplicates what they deliver on `(order id, updated_at)`, so an order is only
//! ever acted on once per version, whichever source saw it first.
//!
//! Statistics are recomputed from the whole order set after every change. When the server cannot be reached the
//! session goes offline and keeps alerts quiet. Coming back (or a fresh `ready` from the feed) triggers a full
//! re-fetch, because events published during an outage are never replayed.
use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::Result;
use bloom_engine::db_types::{Notification, Order, OrderStatusType};
use chrono::Utc;
use log::*;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
    task::JoinHandle,
    time::MissedTickBehavior,
};

use crate::{
    alerts::AlertSink,
    client::StaffClient,
    feed::{spawn_feed_listener, FeedMessage},
    formatting::format_status,
    stats::DashboardStats,
};

/// Where the session gets its orders from.
#[allow(async_fn_in_trait)]
pub trait OrderSource {
    async fn fetch_orders(&self) -> Result<Vec<Order>>;
    async fn fetch_unread_notifications(&self) -> Result<Vec<Notification>>;
    async fn mark_all_read(&self) -> Result<u64>;
}

impl<T: OrderSource> OrderSource for Arc<T> {
    async fn fetch_orders(&self) -> Result<Vec<Order>> {
        self.as_ref().fetch_orders().await
    }

    async fn fetch_unread_notifications(&self) -> Result<Vec<Notification>> {
        self.as_ref().fetch_unread_notifications().await
    }

    async fn mark_all_read(&self) -> Result<u64> {
        self.as_ref().mark_all_read().await
    }
}

#[derive(Debug)]
pub enum SessionInput {
    Feed(FeedMessage),
    FeedDown(String),
    Silence,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub poll_interval: Duration,
    pub notification_interval: Duration,
    pub mark_read: bool,
}

pub struct DashboardSession<S, A> {
    source: S,
    alerts: A,
    mark_read: bool,
    orders: BTreeMap<i64, Order>,
    stats: DashboardStats,
    unread: usize,
    online: bool,
    /// False until the first full fetch. Orders seen by that fetch are history, not news.
    primed: bool,
}

impl<S, A> DashboardSession<S, A>
where
    S: OrderSource,
    A: AlertSink,
{
    pub fn new(source: S, alerts: A, mark_read: bool) -> Self {
        Self {
            source,
            alerts,
            mark_read,
            orders: BTreeMap::new(),
            stats: DashboardStats::default(),
            unread: 0,
            online: true,
            primed: false,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn stats(&self) -> &DashboardStats {
        &self.stats
    }

    pub fn unread(&self) -> usize {
        self.unread
    }

    /// All known orders, newest first.
    pub fn orders(&self) -> Vec<&Order> {
        let mut orders = self.orders.values().collect::<Vec<_>>();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        orders
    }

    /// Re-fetches every order and reconciles it with what we already know.
    pub async fn refresh(&mut self) -> Result<()> {
        let orders = match self.source.fetch_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                self.go_offline(&e.to_string());
                return Err(e);
            },
        };
        if !self.online {
            info!("🖥️ Back online. Re-synced {} orders.", orders.len());
            self.online = true;
        }
        let mut changed = 0;
        for order in orders {
            if self.observe(order) {
                changed += 1;
            }
        }
        debug!("🖥️ Refreshed orders. {changed} new or changed.");
        self.primed = true;
        self.recompute_stats();
        Ok(())
    }

    pub async fn handle_feed(&mut self, msg: FeedMessage) -> Result<()> {
        match msg {
            FeedMessage::Ready => {
                debug!("🖥️ Change feed (re)connected. Reconciling.");
                self.refresh().await
            },
            FeedMessage::Lagged(missed) => {
                warn!("🖥️ The change feed dropped {missed} events. Reconciling.");
                self.refresh().await
            },
            FeedMessage::Order(event) => {
                trace!("🖥️ Feed event {:?} for order #{}", event.kind, event.order_id);
                if self.observe(event.order) {
                    self.recompute_stats();
                }
                Ok(())
            },
        }
    }

    pub async fn poll_notifications(&mut self) -> Result<usize> {
        let notifications = match self.source.fetch_unread_notifications().await {
            Ok(n) => n,
            Err(e) => {
                self.go_offline(&e.to_string());
                return Err(e);
            },
        };
        self.unread = notifications.len();
        if self.mark_read && self.caught_up_with(&notifications) {
            let marked = self.source.mark_all_read().await?;
            info!("🖥️ Marked {marked} notifications as read");
            self.unread = 0;
        }
        Ok(self.unread)
    }

    pub fn go_offline(&mut self, reason: &str) {
        if self.online {
            warn!("🖥️ Lost contact with the server. Alerts are paused until it is back. {reason}");
            self.online = false;
            self.alerts.silence();
        }
    }

    pub fn silence(&self) {
        self.alerts.silence();
    }

    /// Records a version of an order. Returns false if it is one we have already seen, or older.
    fn observe(&mut self, order: Order) -> bool {
        let previous = self.orders.get(&order.id);
        if previous.is_some_and(|p| p.updated_at >= order.updated_at) {
            return false;
        }
        if self.primed && is_news(previous, &order) {
            self.alert(&order);
        }
        self.orders.insert(order.id, order);
        true
    }

    fn alert(&self, order: &Order) {
        if !self.online {
            debug!("🖥️ Offline. Not ringing for order {}", order.order_number);
            return;
        }
        let what = if order.status == OrderStatusType::Paid { "Paid order" } else { "New order" };
        let message =
            format!("{what} {} from {}: {} {}", order.order_number, order.customer_name, order.total_amount, order.currency);
        self.alerts.ring(&message);
    }

    fn caught_up_with(&self, notifications: &[Notification]) -> bool {
        self.primed &&
            self.online &&
            !notifications.is_empty() &&
            notifications.iter().all(|n| self.orders.contains_key(&n.order_id))
    }

    fn recompute_stats(&mut self) {
        self.stats = DashboardStats::from_orders(self.orders.values(), Utc::now().date_naive());
    }
}

/// A brand-new order staff must act on, or an existing one that just got paid.
fn is_news(previous: Option<&Order>, order: &Order) -> bool {
    match previous {
        None => order.is_actionable(),
        Some(p) => order.status == OrderStatusType::Paid && p.status != OrderStatusType::Paid,
    }
}

/// Runs the dashboard until the feed channel closes or the user hits Ctrl-C.
pub async fn run_session<A: AlertSink>(
    mut session: DashboardSession<Arc<StaffClient>, A>,
    client: Arc<StaffClient>,
    settings: SessionSettings,
) {
    match client.health().await {
        Ok(health) => info!(
            "🖥️ Server is {}. Payment gateway initialized: {}",
            health.status, health.gateway_initialized
        ),
        Err(e) => warn!("🖥️ Health check failed. {e}"),
    }
    let (tx, mut rx) = mpsc::channel(64);
    let _feed = spawn_feed_listener(Arc::clone(&client), tx.clone());
    let _keys = spawn_silence_listener(tx);
    let mut poll = tokio::time::interval(settings.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut notifications = tokio::time::interval(settings.notification_interval);
    notifications.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        let redraw = tokio::select! {
            _ = poll.tick() => session.refresh().await.map_err(|e| debug!("🖥️ Refresh failed. {e}")).is_ok(),
            _ = notifications.tick() => {
                let before = session.unread();
                match session.poll_notifications().await {
                    Ok(unread) => unread != before,
                    Err(e) => {
                        debug!("🖥️ Notification poll failed. {e}");
                        false
                    },
                }
            },
            input = rx.recv() => match input {
                Some(SessionInput::Feed(msg)) => {
                    session.handle_feed(msg).await.map_err(|e| debug!("🖥️ Could not apply feed message. {e}")).is_ok()
                },
                Some(SessionInput::FeedDown(reason)) => {
                    session.go_offline(&reason);
                    true
                },
                Some(SessionInput::Silence) => {
                    session.silence();
                    false
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                session.silence();
                info!("🖥️ Bye");
                break;
            },
        };
        if redraw {
            println!("{}", format_status(session.stats(), &session.orders(), session.is_online(), session.unread()));
        }
    }
}

/// Every line typed on stdin silences a ringing alert.
fn spawn_silence_listener(tx: mpsc::Sender<SessionInput>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            if tx.send(SessionInput::Silence).await.is_err() {
                break;
            }
        }
    })
}
