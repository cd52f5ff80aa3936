//! Bloom Engine
//!
//! The core of the Bloom storefront back office: it records orders, reconciles them against the payment provider's
//! asynchronous outcomes, and tells staff about it. It is provider-agnostic; the payment gateway is anything that
//! implements [`PaymentProvider`].
//!
//! The library is divided into these sections:
//! 1. The Order Store ([`SqliteDatabase`]), which implements the backend traits in [`mod@traits`]. You should not need
//!    to use the store directly. Use the public API instead. The data types used in the store are in [`mod@db_types`].
//! 2. The order lifecycle ([`mod@state_machine`]). Every status change is validated against it.
//! 3. The public API: the Checkout Orchestrator ([`CheckoutApi`]), staff order handling
//!    ([`OrderFlowApi`]) and staff notifications ([`NotificationApi`]).
//! 4. Events ([`mod@events`]). Every committed change to an order is published on a [`events::ChangeFeed`], and can
//!    also trigger registered hooks, e.g. to email a receipt when an order is paid.
mod api;

pub mod db_types;
pub mod events;
pub mod state_machine;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{
    checkout_api::{CheckoutApi, CheckoutStarted, ReconcileSummary, WebhookOutcome},
    errors::CheckoutError,
    notification_api::NotificationApi,
    order_flow_api::OrderFlowApi,
    order_objects,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{db::db_url, SqliteDatabase};
pub use traits::{NotificationManagement, OrderManagement, OrderStoreError, PaymentProvider, PaymentProviderError};
