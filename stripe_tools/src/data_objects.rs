use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

//--------------------------------------   Checkout sessions   ---------------------------------------------------------

/// The parameters for a new hosted checkout session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCheckoutSession {
    pub line_items: Vec<NewLineItem>,
    pub mode: String,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
    pub payment_intent_description: Option<String>,
    pub payment_intent_metadata: BTreeMap<String, String>,
    /// Two-letter country codes. If empty, the configured defaults are used.
    pub allowed_countries: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewLineItem {
    pub name: String,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub currency: String,
    /// In minor currency units
    pub unit_amount: i64,
    pub quantity: i64,
}

impl NewCheckoutSession {
    /// Flattens the session into the bracketed form encoding the provider's API expects, e.g.
    /// `line_items[0][price_data][currency]=eur`.
    pub fn to_form(&self, default_countries: &[String]) -> Vec<(String, String)> {
        let mut form = Vec::with_capacity(8 + 5 * self.line_items.len());
        for (i, item) in self.line_items.iter().enumerate() {
            let p = format!("line_items[{i}]");
            form.push((format!("{p}[price_data][currency]"), item.currency.to_lowercase()));
            form.push((format!("{p}[price_data][product_data][name]"), item.name.clone()));
            if let Some(desc) = item.description.as_ref().filter(|d| !d.is_empty()) {
                form.push((format!("{p}[price_data][product_data][description]"), desc.clone()));
            }
            for (j, image) in item.images.iter().enumerate() {
                form.push((format!("{p}[price_data][product_data][images][{j}]"), image.clone()));
            }
            form.push((format!("{p}[price_data][unit_amount]"), item.unit_amount.to_string()));
            form.push((format!("{p}[quantity]"), item.quantity.to_string()));
        }
        form.push(("mode".into(), if self.mode.is_empty() { "payment".into() } else { self.mode.clone() }));
        if let Some(email) = &self.customer_email {
            form.push(("customer_email".into(), email.clone()));
        }
        form.push(("success_url".into(), self.success_url.clone()));
        form.push(("cancel_url".into(), self.cancel_url.clone()));
        form.push(("billing_address_collection".into(), "required".into()));
        let countries = if self.allowed_countries.is_empty() { default_countries } else { &self.allowed_countries };
        for (i, country) in countries.iter().enumerate() {
            form.push((format!("shipping_address_collection[allowed_countries][{i}]"), country.to_uppercase()));
        }
        for (k, v) in &self.metadata {
            form.push((format!("metadata[{k}]"), v.clone()));
        }
        if let Some(desc) = &self.payment_intent_description {
            form.push(("payment_intent_data[description]".into(), desc.clone()));
        }
        for (k, v) in &self.payment_intent_metadata {
            form.push((format!("payment_intent_data[metadata][{k}]"), v.clone()));
        }
        form
    }
}

/// A checkout session as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    /// `open`, `complete` or `expired`
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_status: String,
    #[serde(default)]
    pub payment_intent: Option<PaymentIntentRef>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutSession {
    /// The email the customer entered, falling back to the one the session was created with
    pub fn customer_email(&self) -> Option<&str> {
        self.customer_email.as_deref().or_else(|| self.customer_details.as_ref().and_then(|d| d.email.as_deref()))
    }

    pub fn payment_intent_id(&self) -> Option<&str> {
        self.payment_intent.as_ref().map(PaymentIntentRef::id)
    }
}

/// The provider returns either the payment intent's id, or the whole object if it was expanded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaymentIntentRef {
    Id(String),
    Expanded(PaymentIntent),
}

impl PaymentIntentRef {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id.as_str(),
            Self::Expanded(pi) => pi.id.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

//--------------------------------------       Webhooks        ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    PaymentSucceeded,
    PaymentFailed,
    /// Anything that does not settle a payment
    Other,
}

/// A webhook event. The `data.object` payload is kept as raw JSON, since its shape depends on the event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: Option<i64>,
    pub data: EventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub object: Value,
}

impl Event {
    fn object_type(&self) -> &str {
        self.data.object["object"].as_str().unwrap_or_default()
    }

    pub fn outcome(&self) -> EventOutcome {
        match self.event_type.as_str() {
            "payment_intent.succeeded" | "checkout.session.async_payment_succeeded" => EventOutcome::PaymentSucceeded,
            "checkout.session.completed" if self.data.object["payment_status"] == "paid" => {
                EventOutcome::PaymentSucceeded
            },
            "payment_intent.payment_failed" | "checkout.session.async_payment_failed" => EventOutcome::PaymentFailed,
            _ => EventOutcome::Other,
        }
    }

    pub fn payment_intent_id(&self) -> Option<String> {
        let object = &self.data.object;
        match self.object_type() {
            "payment_intent" => object["id"].as_str().map(String::from),
            "checkout.session" => match &object["payment_intent"] {
                Value::String(id) => Some(id.clone()),
                Value::Object(pi) => pi.get("id").and_then(Value::as_str).map(String::from),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn checkout_session_id(&self) -> Option<String> {
        match self.object_type() {
            "checkout.session" => self.data.object["id"].as_str().map(String::from),
            _ => None,
        }
    }

    /// The amount the event reports as charged, in minor units. For a payment intent this is the amount received,
    /// for a checkout session its total.
    pub fn amount(&self) -> Option<i64> {
        let object = &self.data.object;
        match self.object_type() {
            "payment_intent" => object["amount_received"].as_i64().or_else(|| object["amount"].as_i64()),
            "checkout.session" => object["amount_total"].as_i64(),
            _ => None,
        }
    }

    pub fn currency(&self) -> Option<String> {
        self.data.object["currency"].as_str().map(String::from)
    }

    /// The object's metadata. Non-string values are kept in their JSON form.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        match &self.data.object["metadata"] {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| {
                    let v = v.as_str().map(String::from).unwrap_or_else(|| v.to_string());
                    (k.clone(), v)
                })
                .collect(),
            _ => BTreeMap::new(),
        }
    }
}
