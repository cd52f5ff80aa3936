//! The Checkout Orchestrator.
//!
//! `CheckoutApi` sits between the storefront, the payment provider and the Order Store. It never writes order state
//! itself except through [`OrderManagement::update_status`], and it never holds a store transaction open across a call
//! to the provider.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    api::errors::CheckoutError,
    db_types::{Cents, NewOrder, Order, OrderKey, OrderStatusType, PaymentMethod, StatusUpdate},
    events::{EventProducers, OrderEvent, OrderEventKind},
    order_objects::OrderQueryFilter,
    state_machine::{validate_target, Actor},
    traits::{
        CheckoutSessionCreated,
        CheckoutSessionRequest,
        LineItem,
        OrderManagement,
        PaymentEvent,
        PaymentEventKind,
        PaymentProvider,
        SessionStatus,
        CORRELATION_TOKEN_KEY,
        ORDER_ID_KEY,
    },
};

/// The most stale orders a single reconcile sweep will look at
const RECONCILE_BATCH_SIZE: u32 = 100;

/// What a verified webhook did to the Order Store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The order moved to a new status
    Applied(Order),
    /// The order was found, but its current status does not admit the transition. Duplicate deliveries, and failures
    /// that arrive after a success, end up here. So does a success whose amount or currency does not match the order.
    Unchanged(Order),
    /// No order matches any of the event's correlation keys
    OrderNotFound,
    /// An event type we do not act on
    Unhandled(String),
}

/// The result of the combined create-order-then-open-session step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutStarted {
    pub order: Order,
    pub session: CheckoutSessionCreated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub checked: usize,
    pub paid: usize,
    pub failed: usize,
    pub unchanged: usize,
}

pub struct CheckoutApi<B, P> {
    db: B,
    provider: P,
    producers: EventProducers,
}

impl<B, P> Debug for CheckoutApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B, P> CheckoutApi<B, P> {
    pub fn new(db: B, provider: P, producers: EventProducers) -> Self {
        Self { db, provider, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<B, P> CheckoutApi<B, P>
where
    B: OrderManagement,
    P: PaymentProvider,
{
    /// Opens a hosted checkout session for the given request.
    ///
    /// The request is validated before anything else happens, so a malformed request never reaches the provider. If
    /// the metadata names an `order_id` together with that order's `correlation_token`, the new session id is
    /// recorded against the order. An order id on its own is not enough.
    pub async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSessionCreated, CheckoutError> {
        request.validate().map_err(CheckoutError::InvalidRequest)?;
        self.ensure_gateway()?;
        let session = self.provider.create_checkout_session(&request).await?;
        info!("🔄️💳️ Checkout session {} created", session.id);
        if let Some(order_id) = request.order_id() {
            self.bind_session(order_id, request.correlation_token(), &session.id).await;
        }
        Ok(session)
    }

    /// Creates a card order and its checkout session as one logical step.
    ///
    /// The order is stored in `payment_pending` with a fresh correlation token before the provider is contacted. The
    /// token travels in the session and payment-intent metadata, so the webhook can always find the order. If the
    /// provider call fails, the order stays in `payment_pending` for staff to follow up and the error is returned.
    pub async fn begin_checkout(
        &self,
        mut order: NewOrder,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutStarted, CheckoutError> {
        order.payment_method = PaymentMethod::Card;
        order.validate().map_err(CheckoutError::InvalidRequest)?;
        if success_url.trim().is_empty() || cancel_url.trim().is_empty() {
            return Err(CheckoutError::InvalidRequest("Both success_url and cancel_url are required".into()));
        }
        self.ensure_gateway()?;
        let mut request = CheckoutSessionRequest {
            line_items: order.items.iter().map(|item| LineItem::from_order_item(item, &order.currency)).collect(),
            customer_email: Some(order.customer_email.clone()),
            success_url: success_url.to_string(),
            cancel_url: cancel_url.to_string(),
            mode: "payment".to_string(),
            ..Default::default()
        };
        let token = new_correlation_token();
        let record = self.db.insert_order(order, Some(token.clone())).await?;
        debug!("🔄️📦️ Order {} stored as {} before opening a session", record.order_number, record.status);
        self.producers.dispatch(OrderEvent::new(OrderEventKind::Created, record.clone())).await;
        request.tag(CORRELATION_TOKEN_KEY, token);
        request.tag(ORDER_ID_KEY, record.id.to_string());
        request.payment_intent_data.description = Some(format!("Order {}", record.order_number));
        let session = match self.provider.create_checkout_session(&request).await {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    "🔄️💳️ Could not open a checkout session for order {}. It stays in payment_pending. {e}",
                    record.order_number
                );
                return Err(e.into());
            },
        };
        let order = match self.db.attach_checkout_session(record.id, &session.id).await {
            Ok(order) => order,
            Err(e) => {
                // The webhook can still find the order through its correlation token
                warn!("🔄️💳️ Could not record session {} against order {}. {e}", session.id, record.order_number);
                record
            },
        };
        info!("🔄️💳️ Checkout started for order {} with session {}", order.order_number, session.id);
        Ok(CheckoutStarted { order, session })
    }

    /// Asks the provider for the current state of a checkout session. Nothing in the Order Store changes.
    ///
    /// This may be called before the webhook has arrived, in which case the provider will usually report `unpaid`.
    pub async fn verify_payment(&self, session_id: &str) -> Result<SessionStatus, CheckoutError> {
        if session_id.trim().is_empty() {
            return Err(CheckoutError::InvalidRequest("Session ID is required".into()));
        }
        self.ensure_gateway()?;
        let status = self.provider.retrieve_session(session_id).await?;
        debug!("🔄️💳️ Session {session_id} reports payment status {}", status.payment_status);
        Ok(status)
    }

    /// Verifies and applies a webhook delivery.
    ///
    /// The signature is checked before the payload is parsed. A bad signature returns
    /// [`CheckoutError::InvalidSignature`] and the store is not touched.
    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> Result<WebhookOutcome, CheckoutError> {
        let event = match self.provider.verify_webhook(payload, signature) {
            Ok(event) => event,
            Err(e) => {
                warn!("🔄️🔐️ Rejected webhook delivery. {e}");
                return Err(e.into());
            },
        };
        debug!("🔄️💳️ Verified webhook event {} ({:?})", event.id, event.kind);
        self.apply_payment_event(&event).await
    }

    /// Applies a verified payment event to the order it refers to.
    ///
    /// The order is located by correlation token, then payment intent id, then checkout session id. The first key that
    /// matches an order decides it. A success only applies if the event reports exactly the order's total in the
    /// order's currency. The transition itself is a conditional update, so replays and out-of-order deliveries are
    /// harmless.
    pub async fn apply_payment_event(&self, event: &PaymentEvent) -> Result<WebhookOutcome, CheckoutError> {
        let new_status = match &event.kind {
            PaymentEventKind::Succeeded => OrderStatusType::Paid,
            PaymentEventKind::Failed => OrderStatusType::PaymentFailed,
            PaymentEventKind::Unhandled(kind) => {
                debug!("🔄️💳️ Ignoring webhook event {} of type {kind}", event.id);
                return Ok(WebhookOutcome::Unhandled(kind.clone()));
            },
        };
        let keys = correlation_keys(event);
        if keys.is_empty() {
            warn!("🔄️💳️ Webhook event {} carries no correlation key. It cannot be matched to an order.", event.id);
            return Ok(WebhookOutcome::OrderNotFound);
        }
        for key in keys {
            let Some(order) = self.db.fetch_order_by_key(&key).await? else {
                continue;
            };
            if new_status == OrderStatusType::Paid && !event.settles(&order) {
                warn!(
                    "🔄️💳️ Event {} reports a payment of {} for order {}, which is for {} {}. The order is not marked \
                     as paid.",
                    event.id,
                    describe_amount(event.amount, event.currency.as_deref()),
                    order.order_number,
                    order.total_amount,
                    order.currency
                );
                return Ok(WebhookOutcome::Unchanged(order));
            }
            let update = StatusUpdate::new(new_status).with_payment_intent(event.payment_intent_id.clone());
            if let Some(updated) = self.transition(&OrderKey::Id(order.id), update).await? {
                info!("🔄️💳️ Order {} is now {} (event {})", updated.order_number, updated.status, event.id);
                return Ok(WebhookOutcome::Applied(updated));
            }
            let current = self.db.fetch_order(order.id).await?.unwrap_or(order);
            debug!(
                "🔄️💳️ Order {} is {}. Event {} ({new_status}) does not apply and is ignored.",
                current.order_number, current.status, event.id
            );
            return Ok(WebhookOutcome::Unchanged(current));
        }
        warn!("🔄️💳️ No order matches webhook event {}. It has been acknowledged without effect.", event.id);
        Ok(WebhookOutcome::OrderNotFound)
    }

    /// Checks stale `payment_pending` orders against the provider, in case their webhook never arrived.
    ///
    /// Only orders with a checkout session are considered, oldest first. Sessions the provider reports as paid, for the
    /// order's exact total, move the order to `paid`. Expired, unpaid sessions move it to `payment_failed`. Anything
    /// else is left alone.
    pub async fn reconcile_stale_orders(&self, created_before: DateTime<Utc>) -> Result<ReconcileSummary, CheckoutError> {
        self.ensure_gateway()?;
        let query = OrderQueryFilter::default()
            .with_status(OrderStatusType::PaymentPending)
            .with_checkout_session(true)
            .until(created_before)
            .oldest_first()
            .with_limit(RECONCILE_BATCH_SIZE);
        let stale = self.db.search_orders(query).await?;
        let mut summary = ReconcileSummary::default();
        for order in stale {
            let Some(session_id) = order.checkout_session_id.as_deref() else {
                continue;
            };
            summary.checked += 1;
            let session = match self.provider.retrieve_session(session_id).await {
                Ok(s) => s,
                Err(e) => {
                    warn!("🔄️💳️ Could not fetch session {session_id} for order {}. {e}", order.order_number);
                    summary.unchanged += 1;
                    continue;
                },
            };
            let new_status = if session.is_paid() {
                if !session.settles(&order) {
                    warn!(
                        "🔄️💳️ Session {session_id} was paid {} but order {} is for {} {}. Leaving it for staff.",
                        describe_amount(session.amount_total, session.currency.as_deref()),
                        order.order_number,
                        order.total_amount,
                        order.currency
                    );
                    summary.unchanged += 1;
                    continue;
                }
                OrderStatusType::Paid
            } else if session.is_expired() {
                OrderStatusType::PaymentFailed
            } else {
                summary.unchanged += 1;
                continue;
            };
            let update = StatusUpdate::new(new_status).with_payment_intent(session.payment_intent_id.clone());
            match self.transition(&OrderKey::Id(order.id), update).await? {
                Some(o) if o.status == OrderStatusType::Paid => summary.paid += 1,
                Some(_) => summary.failed += 1,
                None => summary.unchanged += 1,
            }
        }
        if summary.checked > 0 {
            info!(
                "🔄️💳️ Reconciled {} stale orders. {} paid, {} failed, {} unchanged",
                summary.checked, summary.paid, summary.failed, summary.unchanged
            );
        }
        Ok(summary)
    }

    /// Records a session opened through the public endpoint against its order, but only if the caller presented the
    /// order's correlation token.
    async fn bind_session(&self, order_id: i64, token: Option<&str>, session_id: &str) {
        let order = match self.db.fetch_order(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                warn!("🔄️💳️ Session {session_id} names order #{order_id}, which does not exist");
                return;
            },
            Err(e) => {
                warn!("🔄️💳️ Could not look up order #{order_id} for session {session_id}. {e}");
                return;
            },
        };
        let expected = order.correlation_token.as_deref();
        let token_matches = matches!((token, expected), (Some(t), Some(e)) if t == e);
        if !token_matches {
            warn!(
                "🔄️💳️ Session {session_id} names order {} without its correlation token. The session is not attached.",
                order.order_number
            );
            return;
        }
        if let Err(e) = self.db.attach_checkout_session(order_id, session_id).await {
            warn!("🔄️💳️ Could not record checkout session {session_id} against order {}. {e}", order.order_number);
        }
    }

    fn ensure_gateway(&self) -> Result<(), CheckoutError> {
        if self.provider.is_initialized() {
            Ok(())
        } else {
            Err(CheckoutError::GatewayUnavailable("Payment gateway credentials are not configured".into()))
        }
    }

    /// Applies a provider-driven transition and publishes the result. Returns `None` if nothing changed.
    async fn transition(&self, key: &OrderKey, update: StatusUpdate) -> Result<Option<Order>, CheckoutError> {
        validate_target(Actor::PaymentProvider, update.new_status)
            .map_err(|e| CheckoutError::InvalidRequest(e.to_string()))?;
        let kind = match update.new_status {
            OrderStatusType::Paid => OrderEventKind::Paid,
            OrderStatusType::PaymentFailed => OrderEventKind::PaymentFailed,
            _ => OrderEventKind::StatusChanged,
        };
        let updated = self.db.update_status(key, update).await?;
        for order in &updated {
            self.producers.dispatch(OrderEvent::new(kind, order.clone())).await;
        }
        Ok(updated.into_iter().next())
    }
}

fn correlation_keys(event: &PaymentEvent) -> Vec<OrderKey> {
    let mut keys = Vec::with_capacity(3);
    if let Some(token) = event.correlation_token() {
        keys.push(OrderKey::CorrelationToken(token.to_string()));
    }
    if let Some(pi) = &event.payment_intent_id {
        keys.push(OrderKey::PaymentIntent(pi.clone()));
    }
    if let Some(session) = &event.checkout_session_id {
        keys.push(OrderKey::CheckoutSession(session.clone()));
    }
    keys
}

fn describe_amount(amount: Option<i64>, currency: Option<&str>) -> String {
    match amount {
        Some(amount) => format!("{} {}", Cents::from(amount), currency.unwrap_or("(no currency)")),
        None => "no amount".to_string(),
    }
}

fn new_correlation_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}
