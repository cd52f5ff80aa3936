use thiserror::Error;

use crate::traits::{OrderStoreError, PaymentProviderError};

/// Failures of the checkout and payment reconciliation flow.
#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("Invalid request. {0}")]
    InvalidRequest(String),
    #[error("The payment gateway is unavailable. {0}")]
    GatewayUnavailable(String),
    #[error("Invalid webhook signature. {0}")]
    InvalidSignature(String),
    #[error("Malformed webhook payload. {0}")]
    MalformedPayload(String),
    #[error("Not found. {0}")]
    NotFound(String),
    #[error("The order store is unavailable. {0}")]
    StoreUnavailable(String),
    #[error("Payment gateway error. {0}")]
    Gateway(String),
}

impl From<PaymentProviderError> for CheckoutError {
    fn from(e: PaymentProviderError) -> Self {
        match e {
            PaymentProviderError::NotInitialized(s) => Self::GatewayUnavailable(s),
            PaymentProviderError::InvalidSignature(s) => Self::InvalidSignature(s),
            PaymentProviderError::MalformedEvent(s) => Self::MalformedPayload(s),
            e @ (PaymentProviderError::Timeout(_) |
            PaymentProviderError::Network(_) |
            PaymentProviderError::Rejected { .. }) => Self::Gateway(e.to_string()),
        }
    }
}

impl From<OrderStoreError> for CheckoutError {
    fn from(e: OrderStoreError) -> Self {
        match e {
            OrderStoreError::OrderNotFound(s) => Self::NotFound(s),
            OrderStoreError::InvalidOrder(s) => Self::InvalidRequest(s),
            e => Self::StoreUnavailable(e.to_string()),
        }
    }
}
