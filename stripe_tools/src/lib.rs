//! A small client for a hosted-checkout payment provider's REST API (Stripe's wire format), plus webhook signature
//! verification. It knows nothing about orders; callers map their own types onto [`NewCheckoutSession`].
mod api;
mod config;
mod error;

mod data_objects;
pub mod webhook;

pub use api::{StripeApi, METADATA_SOURCE};
pub use config::{StripeConfig, DEFAULT_SHIPPING_COUNTRIES, DEFAULT_STRIPE_API_URL};
pub use data_objects::{
    CheckoutSession,
    CustomerDetails,
    Event,
    EventData,
    EventOutcome,
    NewCheckoutSession,
    NewLineItem,
    PaymentIntent,
    PaymentIntentRef,
};
pub use error::StripeApiError;
