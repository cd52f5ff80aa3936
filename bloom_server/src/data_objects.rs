use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use bloom_common::helpers::parse_list;
use bloom_engine::{
    db_types::{NewOrder, OrderStatusType},
    order_objects::OrderQueryFilter,
    traits::SessionStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub gateway_initialized: bool,
    pub store_initialized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyPaymentParams {
    pub session_id: Option<String>,
}

/// The `/verify-payment` response body. Field names follow what the storefront's success page expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub status: String,
    pub session_status: Option<String>,
    pub payment_intent_id: Option<String>,
    pub customer_email: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl From<SessionStatus> for VerifyPaymentResponse {
    fn from(s: SessionStatus) -> Self {
        Self {
            status: s.payment_status,
            session_status: s.status,
            payment_intent_id: s.payment_intent_id,
            customer_email: s.customer_email,
            amount_total: s.amount_total,
            currency: s.currency,
            metadata: s.metadata,
        }
    }
}

/// `POST /checkout`: the order, plus where the hosted page sends the customer afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(flatten)]
    pub order: NewOrder,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangeRequest {
    pub status: OrderStatusType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationParams {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkedRead {
    pub marked: u64,
}

/// Query string for `GET /api/orders`. `status` is a comma-separated list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderListParams {
    pub status: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub customer_email: Option<String>,
    pub limit: Option<u32>,
}

impl TryFrom<OrderListParams> for OrderQueryFilter {
    type Error = String;

    fn try_from(params: OrderListParams) -> Result<Self, Self::Error> {
        let mut filter = OrderQueryFilter::default();
        if let Some(statuses) = params.status {
            for s in parse_list(&statuses) {
                let status = OrderStatusType::from_str(&s).map_err(|e| e.to_string())?;
                filter = filter.with_status(status);
            }
        }
        filter.since = params.since;
        filter.until = params.until;
        filter.customer_email = params.customer_email;
        filter.limit = params.limit;
        Ok(filter)
    }
}
