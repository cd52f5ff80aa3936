use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderItem, OrderStatusType, PaymentMethod};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub order_number: Option<String>,
    pub customer_email: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<OrderStatusType>>,
    /// Only orders that do (`true`) or do not (`false`) have a checkout session
    pub has_checkout_session: Option<bool>,
    /// Sort by creation time, oldest first. The default is newest first.
    #[serde(default)]
    pub oldest_first: bool,
    pub limit: Option<u32>,
}

impl OrderQueryFilter {
    pub fn with_order_number<S: Into<String>>(mut self, order_number: S) -> Self {
        self.order_number = Some(order_number.into());
        self
    }

    pub fn with_customer_email<S: Into<String>>(mut self, email: S) -> Self {
        self.customer_email = Some(email.into());
        self
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn with_checkout_session(mut self, has_session: bool) -> Self {
        self.has_checkout_session = Some(has_session);
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.oldest_first = true;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_number.is_none() &&
            self.customer_email.is_none() &&
            self.payment_method.is_none() &&
            self.status.is_none() &&
            self.has_checkout_session.is_none() &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(number) = &self.order_number {
            write!(f, "order_number: {number}. ")?;
        }
        if let Some(email) = &self.customer_email {
            write!(f, "customer_email: {email}. ")?;
        }
        if let Some(method) = &self.payment_method {
            write!(f, "payment_method: {method}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since: {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until: {until}. ")?;
        }
        if let Some(statuses) = &self.status {
            let s = statuses.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(",");
            write!(f, "statuses: {s}. ")?;
        }
        if let Some(has_session) = self.has_checkout_session {
            write!(f, "has_checkout_session: {has_session}. ")?;
        }
        Ok(())
    }
}

/// An order along with its line items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builder_accumulates_statuses() {
        let filter = OrderQueryFilter::default().with_status(OrderStatusType::Paid).with_status(OrderStatusType::Pending);
        assert_eq!(filter.status, Some(vec![OrderStatusType::Paid, OrderStatusType::Pending]));
        assert_eq!(filter.to_string(), "statuses: paid,pending. ");
        assert!(OrderQueryFilter::default().with_limit(5).is_empty());
        assert!(OrderQueryFilter::default().oldest_first().is_empty());
        let filter = OrderQueryFilter::default().with_checkout_session(true);
        assert!(!filter.is_empty());
        assert_eq!(filter.to_string(), "has_checkout_session: true. ");
    }
}
