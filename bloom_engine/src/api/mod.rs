//! # Bloom engine public API
//!
//! The API is modular, so that clients can pick the functionality they need.
//!
//! * [`checkout_api`] is the Checkout Orchestrator: it opens checkout sessions with the payment provider and applies
//!   the provider's payment outcomes to orders.
//! * [`order_flow_api`] handles pay-later orders and staff-driven status changes.
//! * [`notification_api`] reads and acknowledges staff notifications.
//!
//! Every API is created by supplying a backend that implements the traits it needs, e.g.
//!
//! ```rust,ignore
//! use bloom_engine::{OrderFlowApi, SqliteDatabase, events::EventProducers};
//! let db = SqliteDatabase::new_with_url("sqlite://data/bloom_store.db", 5).await?;
//! let api = OrderFlowApi::new(db, EventProducers::default());
//! let order = api.order_with_items(42).await?;
//! ```
pub mod checkout_api;
pub mod errors;
pub mod notification_api;
pub mod order_flow_api;
pub mod order_objects;
