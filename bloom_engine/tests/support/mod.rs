#![allow(dead_code)]
//! Shared fixtures for the engine integration tests.
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
};

use bloom_engine::{
    db_types::{Cents, NewOrder, NewOrderItem, PaymentMethod},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::{
        CheckoutSessionCreated,
        CheckoutSessionRequest,
        PaymentEvent,
        PaymentEventKind,
        PaymentProvider,
        PaymentProviderError,
        SessionStatus,
        CORRELATION_TOKEN_KEY,
    },
    SqliteDatabase,
};
use serde_json::json;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const GOOD_SIGNATURE: &str = "t=1,v1=good";

/// An in-memory payment provider. Webhooks are accepted only when signed with [`GOOD_SIGNATURE`].
#[derive(Clone)]
pub struct FakeProvider {
    state: Arc<FakeState>,
}

#[derive(Default)]
struct FakeState {
    initialized: AtomicBool,
    failing: AtomicBool,
    session_calls: AtomicUsize,
    sessions: Mutex<HashMap<String, SessionStatus>>,
    last_request: Mutex<Option<CheckoutSessionRequest>>,
}

impl std::fmt::Debug for FakeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FakeProvider ({} sessions created)", self.session_calls())
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        let state = FakeState { initialized: AtomicBool::new(true), ..Default::default() };
        Self { state: Arc::new(state) }
    }

    pub fn uninitialized() -> Self {
        Self { state: Arc::new(FakeState::default()) }
    }

    /// While set, session creation fails with a timeout
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn session_calls(&self) -> usize {
        self.state.session_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CheckoutSessionRequest> {
        self.state.last_request.lock().unwrap().clone()
    }

    pub fn set_session_outcome(&self, session_id: &str, status: &str, payment_status: &str, payment_intent: &str) {
        let mut sessions = self.state.sessions.lock().unwrap();
        let session = sessions.entry(session_id.to_string()).or_default();
        session.session_id = session_id.to_string();
        session.status = Some(status.to_string());
        session.payment_status = payment_status.to_string();
        session.payment_intent_id = Some(payment_intent.to_string());
    }
}

impl PaymentProvider for FakeProvider {
    fn is_initialized(&self) -> bool {
        self.state.initialized.load(Ordering::SeqCst)
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSessionCreated, PaymentProviderError> {
        let n = self.state.session_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.last_request.lock().unwrap() = Some(request.clone());
        if self.state.failing.load(Ordering::SeqCst) {
            return Err(PaymentProviderError::Timeout("fake provider is down".into()));
        }
        let id = format!("cs_test_{n}");
        let amount = request.amount_total();
        let session = SessionStatus {
            session_id: id.clone(),
            status: Some("open".into()),
            payment_status: "unpaid".into(),
            payment_intent_id: None,
            customer_email: request.customer_email.clone(),
            amount_total: amount,
            currency: request.line_items.first().map(|i| i.price_data.currency.clone()),
            metadata: request.metadata.clone(),
        };
        self.state.sessions.lock().unwrap().insert(id.clone(), session);
        Ok(CheckoutSessionCreated { url: Some(format!("https://checkout.example/{id}")), id })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, PaymentProviderError> {
        self.state
            .sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| PaymentProviderError::Rejected { status: 404, message: "No such session".into() })
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<PaymentEvent, PaymentProviderError> {
        if signature != GOOD_SIGNATURE {
            return Err(PaymentProviderError::InvalidSignature("signature mismatch".into()));
        }
        let value: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| PaymentProviderError::MalformedEvent(e.to_string()))?;
        let kind = match value["type"].as_str().unwrap_or_default() {
            "payment_intent.succeeded" | "checkout.session.completed" => PaymentEventKind::Succeeded,
            "payment_intent.payment_failed" => PaymentEventKind::Failed,
            other => PaymentEventKind::Unhandled(other.to_string()),
        };
        let metadata: BTreeMap<String, String> = serde_json::from_value(value["metadata"].clone()).unwrap_or_default();
        Ok(PaymentEvent {
            id: value["id"].as_str().unwrap_or_default().to_string(),
            kind,
            payment_intent_id: value["payment_intent"].as_str().map(String::from),
            checkout_session_id: value["session"].as_str().map(String::from),
            amount: value["amount"].as_i64(),
            currency: value["currency"].as_str().map(String::from),
            metadata,
        })
    }
}

/// A payment-intent event for `amount` euro cents
pub fn webhook_payload(
    event_id: &str,
    kind: &str,
    payment_intent: &str,
    token: Option<&str>,
    amount: Cents,
) -> Vec<u8> {
    let mut metadata = serde_json::Map::new();
    if let Some(token) = token {
        metadata.insert(CORRELATION_TOKEN_KEY.into(), json!(token));
    }
    json!({
        "id": event_id,
        "type": kind,
        "payment_intent": payment_intent,
        "amount": amount.value(),
        "currency": "eur",
        "metadata": metadata
    })
    .to_string()
    .into_bytes()
}

/// A `checkout.session.completed` event that names only the session and what was paid for it
pub fn session_webhook_payload(event_id: &str, session_id: &str, amount: Cents) -> Vec<u8> {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "session": session_id,
        "amount": amount.value(),
        "currency": "eur",
        "metadata": {}
    })
    .to_string()
    .into_bytes()
}

pub fn set_session_amount(provider: &FakeProvider, session_id: &str, amount: Cents) {
    let mut sessions = provider.state.sessions.lock().unwrap();
    if let Some(session) = sessions.get_mut(session_id) {
        session.amount_total = Some(amount.value());
    }
}

pub fn bouquet_order(payment_method: PaymentMethod) -> NewOrder {
    NewOrder::new("Ada Lovelace", "ada@example.com", payment_method)
        .with_client_reference("ORD-1727780000-42")
        .with_item(NewOrderItem::new("Spring bouquet", 1, Cents::from(3990)).with_product_id("bq-spring"))
        .with_item(NewOrderItem::new("Greeting card", 2, Cents::from(500)))
}

/// What [`bouquet_order`] comes to
pub fn bouquet_total() -> Cents {
    Cents::from(4990)
}

pub async fn new_database() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

pub async fn tear_down(db: SqliteDatabase) {
    let url = bloom_engine::OrderManagement::url(&db).to_string();
    db.close().await;
    Sqlite::drop_database(&url).await.unwrap();
}
