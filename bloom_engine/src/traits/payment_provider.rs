use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{NewOrderItem, Order, MAX_ITEM_QUANTITY};

/// Metadata key holding the order's correlation token
pub const CORRELATION_TOKEN_KEY: &str = "correlation_token";
/// Metadata key holding the store's order id
pub const ORDER_ID_KEY: &str = "order_id";

/// The payment gateway, as seen by the engine.
///
/// Implementations wrap a hosted-checkout provider. They must bound every network call with a timeout, and must verify
/// webhook signatures before parsing anything out of the payload.
#[allow(async_fn_in_trait)]
pub trait PaymentProvider {
    /// False if the gateway has no usable credentials yet.
    fn is_initialized(&self) -> bool;

    /// Mints a provider-hosted checkout session.
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSessionCreated, PaymentProviderError>;

    /// Asks the provider for the current state of a checkout session.
    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, PaymentProviderError>;

    /// Checks the signature on a webhook delivery and, only if it is valid, parses the event it carries.
    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<PaymentEvent, PaymentProviderError>;
}

#[derive(Debug, Clone, Error)]
pub enum PaymentProviderError {
    #[error("The payment gateway is not initialized. {0}")]
    NotInitialized(String),
    #[error("Webhook signature verification failed. {0}")]
    InvalidSignature(String),
    #[error("Could not parse the webhook event. {0}")]
    MalformedEvent(String),
    #[error("The payment gateway timed out. {0}")]
    Timeout(String),
    #[error("Could not reach the payment gateway. {0}")]
    Network(String),
    #[error("The payment gateway rejected the request. Status {status}. {message}")]
    Rejected { status: u16, message: String },
}

//--------------------------------------   Checkout sessions   ---------------------------------------------------------

/// A request for a hosted checkout session. The field layout mirrors what the storefront sends to
/// `POST /create-checkout-session`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSessionRequest {
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub success_url: String,
    #[serde(default)]
    pub cancel_url: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub payment_intent_data: PaymentIntentData,
    /// Country codes the customer may ship to. The gateway's configured defaults apply if this is absent.
    #[serde(default)]
    pub shipping_address_collection: Option<ShippingAddressCollection>,
}

fn default_mode() -> String {
    "payment".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentData {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddressCollection {
    pub allowed_countries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub price_data: PriceData,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceData {
    pub currency: String,
    pub product_data: ProductData,
    /// Price per unit, in minor currency units
    pub unit_amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductData {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl LineItem {
    pub fn from_order_item(item: &NewOrderItem, currency: &str) -> Self {
        Self {
            price_data: PriceData {
                currency: currency.to_string(),
                product_data: ProductData { name: item.product_name.clone(), description: None, images: vec![] },
                unit_amount: item.unit_price.value(),
            },
            quantity: item.quantity,
        }
    }
}

impl CheckoutSessionRequest {
    /// Checks the request for problems that would make the provider call pointless. Nothing is sent anywhere until
    /// this passes.
    pub fn validate(&self) -> Result<(), String> {
        if self.line_items.is_empty() {
            return Err("Invalid line items".into());
        }
        for (i, item) in self.line_items.iter().enumerate() {
            if item.quantity <= 0 {
                return Err(format!("Line item {i} has a non-positive quantity ({})", item.quantity));
            }
            if item.quantity > MAX_ITEM_QUANTITY {
                let quantity = item.quantity;
                return Err(format!("Line item {i} has a quantity of {quantity}. The limit is {MAX_ITEM_QUANTITY}."));
            }
            if item.price_data.unit_amount < 0 {
                return Err(format!("Line item {i} has a negative price ({})", item.price_data.unit_amount));
            }
            if item.price_data.product_data.name.trim().is_empty() {
                return Err(format!("Line item {i} has no product name"));
            }
            if item.price_data.currency.trim().is_empty() {
                return Err(format!("Line item {i} has no currency"));
            }
        }
        if self.amount_total().is_none() {
            return Err("The session total is too large".into());
        }
        if self.mode != "payment" {
            return Err(format!("Unsupported checkout mode: {}", self.mode));
        }
        if self.success_url.trim().is_empty() || self.cancel_url.trim().is_empty() {
            return Err("Both success_url and cancel_url are required".into());
        }
        Ok(())
    }

    /// Tags the session, and the payment intent it creates, with the given metadata entry.
    pub fn tag<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let (key, value) = (key.into(), value.into());
        self.payment_intent_data.metadata.insert(key.clone(), value.clone());
        self.metadata.insert(key, value);
    }

    /// The order id this session was opened for, if the caller supplied one in the metadata.
    pub fn order_id(&self) -> Option<i64> {
        self.metadata.get(ORDER_ID_KEY).and_then(|s| s.parse().ok())
    }

    pub fn correlation_token(&self) -> Option<&str> {
        self.metadata.get(CORRELATION_TOKEN_KEY).map(String::as_str)
    }

    /// The sum of all line items, in minor units. `None` on overflow.
    pub fn amount_total(&self) -> Option<i64> {
        self.line_items
            .iter()
            .try_fold(0i64, |total, item| total.checked_add(item.price_data.unit_amount.checked_mul(item.quantity)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSessionCreated {
    pub id: String,
    pub url: Option<String>,
}

/// The provider's current view of a checkout session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    /// `open`, `complete` or `expired`
    pub status: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`
    pub payment_status: String,
    pub payment_intent_id: Option<String>,
    pub customer_email: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl SessionStatus {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    pub fn is_expired(&self) -> bool {
        self.status.as_deref() == Some("expired")
    }

    /// True if the session charged exactly the order's total, in the order's currency.
    pub fn settles(&self, order: &Order) -> bool {
        amount_settles(order, self.amount_total, self.currency.as_deref())
    }
}

//--------------------------------------     Payment events    ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEventKind {
    Succeeded,
    Failed,
    /// Any event type we do not act on. Carries the provider's event type.
    Unhandled(String),
}

/// A verified payment outcome reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub id: String,
    pub kind: PaymentEventKind,
    pub payment_intent_id: Option<String>,
    pub checkout_session_id: Option<String>,
    /// The amount the customer paid, in minor units
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl PaymentEvent {
    /// True if the event reports exactly the order's total, in the order's currency. An event that does not report an
    /// amount settles nothing.
    pub fn settles(&self, order: &Order) -> bool {
        amount_settles(order, self.amount, self.currency.as_deref())
    }

    pub fn correlation_token(&self) -> Option<&str> {
        self.metadata.get(CORRELATION_TOKEN_KEY).map(String::as_str)
    }

    pub fn order_id(&self) -> Option<i64> {
        self.metadata.get(ORDER_ID_KEY).and_then(|s| s.parse().ok())
    }
}

fn amount_settles(order: &Order, amount: Option<i64>, currency: Option<&str>) -> bool {
    match (amount, currency) {
        (Some(amount), Some(currency)) => {
            amount == order.total_amount.value() && currency.eq_ignore_ascii_case(&order.currency)
        },
        _ => false,
    }
}
