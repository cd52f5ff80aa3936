use std::{fmt::Display, str::FromStr};

pub use bloom_common::Cents;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid {kind} value: {value}")]
pub struct ConversionError {
    pub kind: &'static str,
    pub value: String,
}

impl ConversionError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
/// The lifecycle state of an order. See [`crate::state_machine`] for the permitted transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// Created by the card checkout flow. Not visible to staff as actionable until the payment outcome is known.
    PaymentPending,
    /// The payment provider confirmed payment.
    Paid,
    /// The payment provider reported a failed payment. A late success is still honoured.
    PaymentFailed,
    /// Pay-later order, awaiting staff follow-up.
    Pending,
    Accepted,
    Processing,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
    Rejected,
}

impl OrderStatusType {
    pub const ALL: [OrderStatusType; 11] = [
        Self::PaymentPending,
        Self::Paid,
        Self::PaymentFailed,
        Self::Pending,
        Self::Accepted,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
        Self::Completed,
        Self::Cancelled,
        Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentPending => "payment_pending",
            Self::Paid => "paid",
            Self::PaymentFailed => "payment_failed",
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|status| status.as_str() == s.trim())
            .copied()
            .ok_or_else(|| ConversionError::new("order status", s))
    }
}

//--------------------------------------    PaymentStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Paid => f.write_str("paid"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            _ => Err(ConversionError::new("payment status", s)),
        }
    }
}

//--------------------------------------    PaymentMethod      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Hosted checkout with the payment provider
    #[default]
    Card,
    /// No online payment. Staff follow up with the customer.
    PayLater,
}

impl PaymentMethod {
    /// The status a freshly created order starts in
    pub fn initial_status(&self) -> OrderStatusType {
        match self {
            Self::Card => OrderStatusType::PaymentPending,
            Self::PayLater => OrderStatusType::Pending,
        }
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Card => f.write_str("card"),
            Self::PayLater => f.write_str("pay_later"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "card" => Ok(Self::Card),
            "pay_later" => Ok(Self::PayLater),
            _ => Err(ConversionError::new("payment method", s)),
        }
    }
}

//--------------------------------------       Address         ---------------------------------------------------------
/// Billing or shipping address. Stored as-is alongside the order; it is not normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    /// Store-assigned, human-facing order number
    pub order_number: String,
    /// The order number the storefront generated for its own display purposes, if any.
    pub client_reference: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub total_amount: Cents,
    pub currency: String,
    pub status: OrderStatusType,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    /// Random token written before the payment provider is contacted. It travels in the provider's metadata and is
    /// used to match webhooks to this order.
    pub correlation_token: Option<String>,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    /// True if staff should act on this order: it was paid, or it is a pay-later order awaiting follow-up.
    pub fn is_actionable(&self) -> bool {
        self.status.is_actionable()
    }
}

//--------------------------------------      OrderItem        ---------------------------------------------------------
/// The most units of a single product that one order may contain
pub const MAX_ITEM_QUANTITY: i64 = 10_000;

/// A line item. Owned by exactly one order and never modified after it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: Option<String>,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Cents,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    #[serde(default)]
    pub product_id: Option<String>,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Cents,
}

impl NewOrderItem {
    pub fn new<S: Into<String>>(product_name: S, quantity: i64, unit_price: Cents) -> Self {
        Self { product_id: None, product_name: product_name.into(), quantity, unit_price }
    }

    pub fn with_product_id<S: Into<String>>(mut self, product_id: S) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    /// `None` if the line total does not fit in a currency amount
    pub fn line_total(&self) -> Option<Cents> {
        self.unit_price.checked_mul(self.quantity)
    }
}

//--------------------------------------       NewOrder        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    #[serde(default)]
    pub client_reference: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<NewOrderItem>,
}

fn default_currency() -> String {
    bloom_common::DEFAULT_CURRENCY_CODE.to_string()
}

impl NewOrder {
    pub fn new<S: Into<String>>(customer_name: S, customer_email: S, payment_method: PaymentMethod) -> Self {
        Self {
            client_reference: None,
            customer_name: customer_name.into(),
            customer_email: customer_email.into(),
            customer_phone: None,
            currency: default_currency(),
            payment_method,
            billing_address: None,
            shipping_address: None,
            notes: None,
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, item: NewOrderItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_client_reference<S: Into<String>>(mut self, reference: S) -> Self {
        self.client_reference = Some(reference.into());
        self
    }

    pub fn with_phone<S: Into<String>>(mut self, phone: S) -> Self {
        self.customer_phone = Some(phone.into());
        self
    }

    pub fn with_shipping_address(mut self, address: Address) -> Self {
        self.shipping_address = Some(address);
        self
    }

    pub fn with_billing_address(mut self, address: Address) -> Self {
        self.billing_address = Some(address);
        self
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// The order total is always derived from the line items. `None` if it overflows.
    pub fn total_amount(&self) -> Option<Cents> {
        self.items.iter().try_fold(Cents::default(), |total, item| total.checked_add(item.line_total()?))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.customer_name.trim().is_empty() {
            return Err("Customer name is required".into());
        }
        if !self.customer_email.contains('@') {
            return Err(format!("'{}' is not a valid email address", self.customer_email));
        }
        if self.items.is_empty() {
            return Err("An order needs at least one item".into());
        }
        for item in &self.items {
            if item.product_name.trim().is_empty() {
                return Err("Every item needs a product name".into());
            }
            if item.quantity <= 0 {
                return Err(format!("{} has a non-positive quantity ({})", item.product_name, item.quantity));
            }
            if item.quantity > MAX_ITEM_QUANTITY {
                return Err(format!(
                    "{} has a quantity of {}. At most {MAX_ITEM_QUANTITY} can be ordered.",
                    item.product_name, item.quantity
                ));
            }
            if item.unit_price.is_negative() {
                return Err(format!("{} has a negative price ({})", item.product_name, item.unit_price));
            }
        }
        if self.total_amount().is_none() {
            return Err("The order total is too large".into());
        }
        Ok(())
    }
}

//--------------------------------------     Notification      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewOrder,
    PaymentFailed,
}

impl Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewOrder => f.write_str("new_order"),
            Self::PaymentFailed => f.write_str("payment_failed"),
        }
    }
}

impl FromStr for NotificationType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "new_order" => Ok(Self::NewOrder),
            "payment_failed" => Ok(Self::PaymentFailed),
            _ => Err(ConversionError::new("notification type", s)),
        }
    }
}

/// A persistent record that something happened to an order which staff should see, even if they were not connected
/// to the live feed at the time. Notifications are only ever marked as read, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub order_id: i64,
    pub notification_type: NotificationType,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------       OrderKey        ---------------------------------------------------------
/// The natural keys an order can be matched on when applying a status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderKey {
    Id(i64),
    PaymentIntent(String),
    CorrelationToken(String),
    CheckoutSession(String),
}

impl OrderKey {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::Id(_) => "id",
            Self::PaymentIntent(_) => "payment_intent_id",
            Self::CorrelationToken(_) => "correlation_token",
            Self::CheckoutSession(_) => "checkout_session_id",
        }
    }
}

impl Display for OrderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "order #{id}"),
            Self::PaymentIntent(pi) => write!(f, "payment intent {pi}"),
            Self::CorrelationToken(t) => write!(f, "correlation token {t}"),
            Self::CheckoutSession(s) => write!(f, "checkout session {s}"),
        }
    }
}

/// A requested status change, plus any fields that change with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub new_status: OrderStatusType,
    pub payment_intent_id: Option<String>,
}

impl StatusUpdate {
    pub fn new(new_status: OrderStatusType) -> Self {
        Self { new_status, payment_intent_id: None }
    }

    pub fn with_payment_intent<S: Into<String>>(mut self, payment_intent_id: Option<S>) -> Self {
        self.payment_intent_id = payment_intent_id.map(Into::into);
        self
    }
}
