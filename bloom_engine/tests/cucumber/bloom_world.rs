use bloom_engine::{
    db_types::Order,
    events::{ChangeFeed, EventProducers, OrderEvent},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    CheckoutApi,
    CheckoutError,
    OrderFlowApi,
    SqliteDatabase,
    WebhookOutcome,
};
use cucumber::World;
use log::*;
use tokio::sync::broadcast;

use crate::support::FakeProvider;

#[derive(Default, Debug, World)]
pub struct BloomWorld {
    pub system: Option<BloomSystem>,
    pub last_order: Option<Order>,
    pub remembered: Option<Order>,
    pub last_outcome: Option<Result<WebhookOutcome, CheckoutError>>,
    pub dashboard: Option<DashboardWatcher>,
}

#[derive(Debug)]
pub struct BloomSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub feed: ChangeFeed,
    pub checkout: CheckoutApi<SqliteDatabase, FakeProvider>,
    pub flow: OrderFlowApi<SqliteDatabase>,
}

/// Stands in for a dashboard: a feed subscription that can be dropped and re-established.
#[derive(Debug, Default)]
pub struct DashboardWatcher {
    pub subscription: Option<broadcast::Receiver<OrderEvent>>,
    pub received: Vec<OrderEvent>,
}

impl BloomWorld {
    pub fn system(&self) -> &BloomSystem {
        self.system.as_ref().expect("System not initialised")
    }

    pub fn order(&self) -> &Order {
        self.last_order.as_ref().expect("No order has been created")
    }
}

impl BloomSystem {
    pub async fn new() -> Self {
        let db_path = random_db_path();
        prepare_test_env(&db_path).await;
        let db = SqliteDatabase::new_with_url(&db_path, 5).await.expect("Error creating connection to database");
        debug!("Created database: {db_path}");
        let feed = ChangeFeed::new(32);
        let producers = EventProducers::default().with_change_feed(feed.clone());
        let checkout = CheckoutApi::new(db.clone(), FakeProvider::new(), producers.clone());
        let flow = OrderFlowApi::new(db.clone(), producers);
        Self { db_path, db, feed, checkout, flow }
    }
}
