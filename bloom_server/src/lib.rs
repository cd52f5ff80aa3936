//! # Bloom server
//! This crate hosts the HTTP service for the Bloom storefront. It is responsible for:
//! * Opening hosted checkout sessions with the payment gateway for the storefront.
//! * Receiving the gateway's signed webhook deliveries and applying the payment outcome to the order.
//! * Periodically reconciling orders whose webhook never arrived.
//! * Serving the staff order API and the live change feed that the dashboard listens on.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! Public routes:
//! * `/health`: Reports whether the gateway and the order store are usable.
//! * `/create-checkout-session`, `/checkout`: Open a hosted checkout session.
//! * `/verify-payment`: The gateway's view of a checkout session.
//! * `/webhook`: Signed event deliveries from the payment gateway.
//! * `/orders` (POST): Pay-later orders.
//!
//! Staff routes, which need the `X-Staff-Key` header:
//! * `/initialize-stripe`
//! * `/api/orders`, `/api/order/{id}`, `/api/order/{id}/status`
//! * `/api/notifications`, `/api/notifications/{id}/read`, `/api/notifications/read_all`
//! * `/api/feed`: Server-Sent Events for every order change.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod integrations;
pub mod middleware;
pub mod reconcile_worker;
pub mod routes;
pub mod server;
pub mod sse;

#[cfg(test)]
mod endpoint_tests;
