//! Traits that backends and payment gateways implement in order to drive the Bloom engine.
mod notification_management;
mod order_management;
mod payment_provider;

pub use notification_management::NotificationManagement;
pub use order_management::{OrderManagement, OrderStoreError};
pub use payment_provider::{
    CheckoutSessionCreated,
    CheckoutSessionRequest,
    LineItem,
    PaymentEvent,
    PaymentEventKind,
    PaymentIntentData,
    PaymentProvider,
    PaymentProviderError,
    PriceData,
    ProductData,
    SessionStatus,
    ShippingAddressCollection,
    CORRELATION_TOKEN_KEY,
    ORDER_ID_KEY,
};
