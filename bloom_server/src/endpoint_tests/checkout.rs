use std::collections::BTreeMap;

use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use bloom_engine::{
    db_types::{OrderKey, OrderStatusType},
    events::EventProducers,
    traits::{
        CheckoutSessionCreated,
        OrderStoreError,
        PaymentEvent,
        PaymentEventKind,
        PaymentProviderError,
        SessionStatus,
        CORRELATION_TOKEN_KEY,
    },
    CheckoutApi,
};
use serde_json::{json, Value};
use stripe_tools::webhook::SIGNATURE_HEADER;

use super::{
    helpers::{order, send},
    mocks::{MockGateway, MockOrderStore},
};
use crate::{
    data_objects::{HealthResponse, VerifyPaymentResponse},
    routes::{CreateCheckoutSessionRoute, HealthRoute, VerifyPaymentRoute, WebhookRoute},
};

fn checkout_api(store: MockOrderStore, gateway: MockGateway) -> web::Data<CheckoutApi<MockOrderStore, MockGateway>> {
    web::Data::new(CheckoutApi::new(store, gateway, EventProducers::default()))
}

fn session_body() -> Value {
    json!({
        "line_items": [{
            "price_data": {"currency": "eur", "product_data": {"name": "Peony bouquet"}, "unit_amount": 3990},
            "quantity": 1
        }],
        "customer_email": "ada@example.com",
        "success_url": "https://bloom.example/success?session_id={CHECKOUT_SESSION_ID}",
        "cancel_url": "https://bloom.example/cart",
        "metadata": {"order_id": "12", "correlation_token": "tok-12"}
    })
}

fn succeeded_event() -> PaymentEvent {
    let mut metadata = BTreeMap::new();
    metadata.insert(CORRELATION_TOKEN_KEY.to_string(), "tok-12".to_string());
    PaymentEvent {
        id: "evt_1".into(),
        kind: PaymentEventKind::Succeeded,
        payment_intent_id: Some("pi_12".into()),
        checkout_session_id: Some("cs_test_12".into()),
        amount: Some(4990),
        currency: Some("eur".into()),
        metadata,
    }
}

#[actix_web::test]
async fn health_reports_gateway_and_store() {
    let _ = env_logger::try_init();
    let mut store = MockOrderStore::new();
    store.expect_ping().returning(|| Ok(()));
    let mut gateway = MockGateway::new();
    gateway.expect_is_initialized().return_const(false);
    let app = App::new()
        .app_data(checkout_api(store, gateway))
        .service(HealthRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    let (status, body) = send(&service, TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(health.status, "ok");
    assert!(!health.gateway_initialized);
    assert!(health.store_initialized);
    assert!(body.contains("gatewayInitialized"));
}

#[actix_web::test]
async fn health_is_degraded_without_a_store() {
    let mut store = MockOrderStore::new();
    store.expect_ping().returning(|| Err(OrderStoreError::DatabaseError("unable to open database file".into())));
    let mut gateway = MockGateway::new();
    gateway.expect_is_initialized().return_const(true);
    let app = App::new()
        .app_data(checkout_api(store, gateway))
        .service(HealthRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    let (status, body) = send(&service, TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(health.status, "degraded");
    assert!(health.gateway_initialized);
    assert!(!health.store_initialized);
}

#[actix_web::test]
async fn empty_cart_never_reaches_the_gateway() {
    let store = MockOrderStore::new();
    let mut gateway = MockGateway::new();
    gateway.expect_is_initialized().return_const(true);
    gateway.expect_create_checkout_session().never();
    let app = App::new()
        .app_data(checkout_api(store, gateway))
        .service(CreateCheckoutSessionRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    let mut body = session_body();
    body["line_items"] = json!([]);
    let req = TestRequest::post().uri("/create-checkout-session").set_json(body).to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Invalid line items"), "{body}");
}

#[actix_web::test]
async fn checkout_session_without_credentials() {
    let store = MockOrderStore::new();
    let mut gateway = MockGateway::new();
    gateway.expect_is_initialized().return_const(false);
    gateway.expect_create_checkout_session().never();
    let app = App::new()
        .app_data(checkout_api(store, gateway))
        .service(CreateCheckoutSessionRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    let req = TestRequest::post().uri("/create-checkout-session").set_json(session_body()).to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert!(body["error"].as_str().unwrap().contains("not configured"));
}

#[actix_web::test]
async fn checkout_session_is_recorded_against_the_order() {
    let mut store = MockOrderStore::new();
    store
        .expect_fetch_order()
        .withf(|id| *id == 12)
        .returning(|id| Ok(Some(order(id, OrderStatusType::PaymentPending))));
    store
        .expect_attach_checkout_session()
        .withf(|id, session| *id == 12 && session == "cs_test_12")
        .times(1)
        .returning(|id, _| Ok(order(id, OrderStatusType::PaymentPending)));
    let mut gateway = MockGateway::new();
    gateway.expect_is_initialized().return_const(true);
    gateway
        .expect_create_checkout_session()
        .withf(|req| req.line_items.len() == 1 && req.customer_email.as_deref() == Some("ada@example.com"))
        .times(1)
        .returning(|_| {
            Ok(CheckoutSessionCreated {
                id: "cs_test_12".into(),
                url: Some("https://checkout.example/c/pay/cs_test_12".into()),
            })
        });
    let app = App::new()
        .app_data(checkout_api(store, gateway))
        .service(CreateCheckoutSessionRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    let req = TestRequest::post().uri("/create-checkout-session").set_json(session_body()).to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::OK);
    let session: CheckoutSessionCreated = serde_json::from_str(&body).unwrap();
    assert_eq!(session.id, "cs_test_12");
    assert_eq!(session.url.as_deref(), Some("https://checkout.example/c/pay/cs_test_12"));
}

#[actix_web::test]
async fn checkout_session_without_the_order_token_is_not_attached() {
    let mut store = MockOrderStore::new();
    store.expect_fetch_order().returning(|id| Ok(Some(order(id, OrderStatusType::PaymentPending))));
    store.expect_attach_checkout_session().never();
    let mut gateway = MockGateway::new();
    gateway.expect_is_initialized().return_const(true);
    gateway
        .expect_create_checkout_session()
        .times(2)
        .returning(|_| Ok(CheckoutSessionCreated { id: "cs_test_99".into(), url: None }));
    let app = App::new()
        .app_data(checkout_api(store, gateway))
        .service(CreateCheckoutSessionRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    for metadata in [json!({"order_id": "12"}), json!({"order_id": "12", "correlation_token": "tok-13"})] {
        let mut body = session_body();
        body["metadata"] = metadata;
        let req = TestRequest::post().uri("/create-checkout-session").set_json(body).to_request();
        let (status, body) = send(&service, req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("cs_test_99"), "{body}");
    }
}

#[actix_web::test]
async fn malformed_json_is_a_bad_request() {
    let app = App::new()
        .app_data(web::JsonConfig::default().error_handler(|err, _| {
            crate::errors::ServerError::InvalidRequestBody(err.to_string()).into()
        }))
        .app_data(checkout_api(MockOrderStore::new(), MockGateway::new()))
        .service(CreateCheckoutSessionRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    let req = TestRequest::post()
        .uri("/create-checkout-session")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{\"line_items\": [")
        .to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("\"error\""), "{body}");
}

#[actix_web::test]
async fn verify_payment_needs_a_session_id() {
    let mut gateway = MockGateway::new();
    gateway.expect_retrieve_session().never();
    let app = App::new()
        .app_data(checkout_api(MockOrderStore::new(), gateway))
        .service(VerifyPaymentRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    let (status, body) = send(&service, TestRequest::get().uri("/verify-payment").to_request()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Session ID is required"), "{body}");
}

#[actix_web::test]
async fn verify_payment_reports_the_session() {
    let mut gateway = MockGateway::new();
    gateway.expect_is_initialized().return_const(true);
    gateway.expect_retrieve_session().withf(|id| id == "cs_test_12").returning(|id| {
        Ok(SessionStatus {
            session_id: id.to_string(),
            status: Some("complete".into()),
            payment_status: "paid".into(),
            payment_intent_id: Some("pi_12".into()),
            customer_email: Some("ada@example.com".into()),
            amount_total: Some(3990),
            currency: Some("eur".into()),
            metadata: BTreeMap::new(),
        })
    });
    let app = App::new()
        .app_data(checkout_api(MockOrderStore::new(), gateway))
        .service(VerifyPaymentRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    let req = TestRequest::get().uri("/verify-payment?session_id=cs_test_12").to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"paymentIntentId\":\"pi_12\""), "{body}");
    let res: VerifyPaymentResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(res.status, "paid");
    assert_eq!(res.amount_total, Some(3990));
}

#[actix_web::test]
async fn webhook_with_a_bad_signature_changes_nothing() {
    let mut store = MockOrderStore::new();
    store.expect_update_status().never();
    let mut gateway = MockGateway::new();
    gateway
        .expect_verify_webhook()
        .withf(|_, sig| sig == "t=1,v1=deadbeef")
        .returning(|_, _| Err(PaymentProviderError::InvalidSignature("No matching signature".into())));
    let app = App::new()
        .app_data(checkout_api(store, gateway))
        .service(WebhookRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    let req = TestRequest::post()
        .uri("/webhook")
        .insert_header((SIGNATURE_HEADER, "t=1,v1=deadbeef"))
        .set_payload(r#"{"id": "evt_forged", "type": "payment_intent.succeeded"}"#)
        .to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("signature"), "{body}");
}

#[actix_web::test]
async fn webhook_without_a_signing_secret_is_a_server_error() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_verify_webhook()
        .returning(|_, _| Err(PaymentProviderError::NotInitialized("No webhook secret".into())));
    let app = App::new()
        .app_data(checkout_api(MockOrderStore::new(), gateway))
        .service(WebhookRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    let req = TestRequest::post().uri("/webhook").set_payload("{}").to_request();
    let (status, _) = send(&service, req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[actix_web::test]
async fn unhandled_events_are_acknowledged() {
    let mut store = MockOrderStore::new();
    store.expect_update_status().never();
    let mut gateway = MockGateway::new();
    gateway.expect_verify_webhook().returning(|_, _| {
        Ok(PaymentEvent {
            id: "evt_2".into(),
            kind: PaymentEventKind::Unhandled("customer.created".into()),
            payment_intent_id: None,
            checkout_session_id: None,
            amount: None,
            currency: None,
            metadata: BTreeMap::new(),
        })
    });
    let app = App::new()
        .app_data(checkout_api(store, gateway))
        .service(WebhookRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    let req = TestRequest::post().uri("/webhook").insert_header((SIGNATURE_HEADER, "t=1,v1=ok")).to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"received": true}));
}

#[actix_web::test]
async fn successful_payment_marks_the_order_paid() {
    let mut store = MockOrderStore::new();
    store
        .expect_fetch_order_by_key()
        .withf(|key| *key == OrderKey::CorrelationToken("tok-12".into()))
        .times(1)
        .returning(|_| Ok(Some(order(12, OrderStatusType::PaymentPending))));
    store
        .expect_update_status()
        .withf(|key, update| {
            *key == OrderKey::Id(12) &&
                update.new_status == OrderStatusType::Paid &&
                update.payment_intent_id.as_deref() == Some("pi_12")
        })
        .times(1)
        .returning(|_, _| Ok(vec![order(12, OrderStatusType::Paid)]));
    let mut gateway = MockGateway::new();
    gateway.expect_verify_webhook().returning(|_, _| Ok(succeeded_event()));
    let app = App::new()
        .app_data(checkout_api(store, gateway))
        .service(WebhookRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    let req = TestRequest::post().uri("/webhook").insert_header((SIGNATURE_HEADER, "t=1,v1=ok")).to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("received"));
}

#[actix_web::test]
async fn payment_for_an_unknown_order_is_acknowledged() {
    let mut store = MockOrderStore::new();
    store.expect_update_status().never();
    store.expect_fetch_order_by_key().times(3).returning(|_| Ok(None));
    let mut gateway = MockGateway::new();
    gateway.expect_verify_webhook().returning(|_, _| Ok(succeeded_event()));
    let app = App::new()
        .app_data(checkout_api(store, gateway))
        .service(WebhookRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    let req = TestRequest::post().uri("/webhook").insert_header((SIGNATURE_HEADER, "t=1,v1=ok")).to_request();
    let (status, _) = send(&service, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn store_failure_asks_for_redelivery() {
    let mut store = MockOrderStore::new();
    store.expect_fetch_order_by_key().returning(|_| Ok(Some(order(12, OrderStatusType::PaymentPending))));
    store.expect_update_status().returning(|_, _| Err(OrderStoreError::DatabaseError("database is locked".into())));
    let mut gateway = MockGateway::new();
    gateway.expect_verify_webhook().returning(|_, _| Ok(succeeded_event()));
    let app = App::new()
        .app_data(checkout_api(store, gateway))
        .service(WebhookRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    let req = TestRequest::post().uri("/webhook").insert_header((SIGNATURE_HEADER, "t=1,v1=ok")).to_request();
    let (status, _) = send(&service, req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[actix_web::test]
async fn underpayment_is_acknowledged_but_not_applied() {
    let mut store = MockOrderStore::new();
    store.expect_fetch_order_by_key().times(1).returning(|_| Ok(Some(order(12, OrderStatusType::PaymentPending))));
    store.expect_update_status().never();
    let mut gateway = MockGateway::new();
    gateway.expect_verify_webhook().returning(|_, _| Ok(PaymentEvent { amount: Some(1), ..succeeded_event() }));
    let app = App::new()
        .app_data(checkout_api(store, gateway))
        .service(WebhookRoute::<MockOrderStore, MockGateway>::new());
    let service = test::init_service(app).await;
    let req = TestRequest::post().uri("/webhook").insert_header((SIGNATURE_HEADER, "t=1,v1=ok")).to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("received"));
}
