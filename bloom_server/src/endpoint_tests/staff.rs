use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use bloom_common::Secret;
use bloom_engine::{
    db_types::{Notification, NotificationType, Order, OrderStatusType},
    events::EventProducers,
    NotificationApi,
    OrderFlowApi,
};
use chrono::Utc;
use mockall::Sequence;
use serde_json::{json, Value};

use super::{
    helpers::{order, send, STAFF_KEY},
    mocks::{MockNotificationStore, MockOrderStore},
};
use crate::{
    integrations::stripe::StripeGateway,
    middleware::{StaffAccess, StaffKeyMiddlewareFactory, STAFF_KEY_HEADER},
    routes::{
        InitializeStripeRoute,
        MarkAllNotificationsReadRoute,
        MarkNotificationReadRoute,
        NotificationsRoute,
        OrderByIdRoute,
        OrdersRoute,
        UpdateOrderStatusRoute,
    },
};

fn configure_with_key(
    key: &str,
    store: MockOrderStore,
    notes: MockNotificationStore,
) -> impl FnOnce(&mut web::ServiceConfig) {
    let access = StaffAccess::new(Secret::new(key.to_string()));
    move |cfg| {
        cfg.app_data(web::Data::new(access))
            .app_data(web::Data::new(OrderFlowApi::new(store, EventProducers::default())))
            .app_data(web::Data::new(NotificationApi::new(notes)))
            .app_data(web::Data::new(StripeGateway::default()))
            .service(InitializeStripeRoute::new())
            .service(
                web::scope("/api")
                    .wrap(StaffKeyMiddlewareFactory::new())
                    .service(OrdersRoute::<MockOrderStore>::new())
                    .service(OrderByIdRoute::<MockOrderStore>::new())
                    .service(UpdateOrderStatusRoute::<MockOrderStore>::new())
                    .service(NotificationsRoute::<MockNotificationStore>::new())
                    .service(MarkAllNotificationsReadRoute::<MockNotificationStore>::new())
                    .service(MarkNotificationReadRoute::<MockNotificationStore>::new()),
            );
    }
}

fn configure(store: MockOrderStore, notes: MockNotificationStore) -> impl FnOnce(&mut web::ServiceConfig) {
    configure_with_key(STAFF_KEY, store, notes)
}

#[actix_web::test]
async fn staff_routes_need_a_key() {
    let _ = env_logger::try_init();
    let mut store = MockOrderStore::new();
    store.expect_search_orders().never();
    let service = test::init_service(App::new().configure(configure(store, MockNotificationStore::new()))).await;
    let (status, body) = send(&service, TestRequest::get().uri("/api/orders").to_request()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains(STAFF_KEY_HEADER), "{body}");
}

#[actix_web::test]
async fn wrong_key_is_forbidden() {
    let mut store = MockOrderStore::new();
    store.expect_search_orders().never();
    let service = test::init_service(App::new().configure(configure(store, MockNotificationStore::new()))).await;
    let req = TestRequest::get().uri("/api/orders").insert_header((STAFF_KEY_HEADER, "let-me-in")).to_request();
    let (status, _) = send(&service, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn no_configured_key_refuses_everyone() {
    let mut store = MockOrderStore::new();
    store.expect_search_orders().never();
    let config = configure_with_key("", store, MockNotificationStore::new());
    let service = test::init_service(App::new().configure(config)).await;
    let req = TestRequest::get().uri("/api/orders").insert_header((STAFF_KEY_HEADER, "")).to_request();
    let (status, _) = send(&service, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn gateway_initialization_is_staff_only() {
    let service =
        test::init_service(App::new().configure(configure(MockOrderStore::new(), MockNotificationStore::new()))).await;
    let (status, _) = send(&service, TestRequest::post().uri("/initialize-stripe").to_request()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn list_orders_by_status() {
    let mut store = MockOrderStore::new();
    store
        .expect_search_orders()
        .withf(|q| q.status == Some(vec![OrderStatusType::Paid, OrderStatusType::Pending]) && q.limit == Some(50))
        .times(1)
        .returning(|_| Ok(vec![order(2, OrderStatusType::Pending), order(1, OrderStatusType::Paid)]));
    let service = test::init_service(App::new().configure(configure(store, MockNotificationStore::new()))).await;
    let req = TestRequest::get()
        .uri("/api/orders?status=paid,pending&limit=50")
        .insert_header((STAFF_KEY_HEADER, STAFF_KEY))
        .to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::OK);
    let orders: Vec<Order> = serde_json::from_str(&body).unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].order_number, "ORD-000002");
}

#[actix_web::test]
async fn unknown_status_filter_is_rejected() {
    let mut store = MockOrderStore::new();
    store.expect_search_orders().never();
    let service = test::init_service(App::new().configure(configure(store, MockNotificationStore::new()))).await;
    let req =
        TestRequest::get().uri("/api/orders?status=wilted").insert_header((STAFF_KEY_HEADER, STAFF_KEY)).to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("wilted"), "{body}");
}

#[actix_web::test]
async fn fetch_order_with_items() {
    let mut store = MockOrderStore::new();
    store.expect_fetch_order().returning(|id| Ok((id == 7).then(|| order(7, OrderStatusType::Paid))));
    store.expect_fetch_order_items().returning(|_| Ok(vec![]));
    let service = test::init_service(App::new().configure(configure(store, MockNotificationStore::new()))).await;
    let req = TestRequest::get().uri("/api/order/7").insert_header((STAFF_KEY_HEADER, STAFF_KEY)).to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["order_number"], "ORD-000007");
    assert_eq!(body["status"], "paid");
    assert_eq!(body["items"], json!([]));

    let req = TestRequest::get().uri("/api/order/8").insert_header((STAFF_KEY_HEADER, STAFF_KEY)).to_request();
    let (status, _) = send(&service, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn accept_a_paid_order() {
    let mut store = MockOrderStore::new();
    store.expect_fetch_order().returning(|id| Ok(Some(order(id, OrderStatusType::Paid))));
    store
        .expect_update_status()
        .withf(|_, update| update.new_status == OrderStatusType::Accepted)
        .times(1)
        .returning(|_, _| Ok(vec![order(3, OrderStatusType::Accepted)]));
    let service = test::init_service(App::new().configure(configure(store, MockNotificationStore::new()))).await;
    let req = TestRequest::patch()
        .uri("/api/order/3/status")
        .insert_header((STAFF_KEY_HEADER, STAFF_KEY))
        .set_json(json!({"status": "accepted"}))
        .to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::OK);
    let order: Order = serde_json::from_str(&body).unwrap();
    assert_eq!(order.status, OrderStatusType::Accepted);
}

#[actix_web::test]
async fn staff_cannot_mark_orders_paid() {
    let mut store = MockOrderStore::new();
    store.expect_update_status().never();
    let service = test::init_service(App::new().configure(configure(store, MockNotificationStore::new()))).await;
    let req = TestRequest::patch()
        .uri("/api/order/3/status")
        .insert_header((STAFF_KEY_HEADER, STAFF_KEY))
        .set_json(json!({"status": "paid"}))
        .to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("payment flow"), "{body}");
}

#[actix_web::test]
async fn illegal_transitions_are_rejected() {
    let mut store = MockOrderStore::new();
    store.expect_fetch_order().returning(|id| Ok(Some(order(id, OrderStatusType::Paid))));
    store.expect_update_status().never();
    let service = test::init_service(App::new().configure(configure(store, MockNotificationStore::new()))).await;
    let req = TestRequest::patch()
        .uri("/api/order/3/status")
        .insert_header((STAFF_KEY_HEADER, STAFF_KEY))
        .set_json(json!({"status": "delivered"}))
        .to_request();
    let (status, _) = send(&service, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn a_lost_race_is_a_conflict() {
    let mut store = MockOrderStore::new();
    let mut seq = Sequence::new();
    store
        .expect_fetch_order()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|id| Ok(Some(order(id, OrderStatusType::Paid))));
    store.expect_update_status().times(1).in_sequence(&mut seq).returning(|_, _| Ok(vec![]));
    store
        .expect_fetch_order()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|id| Ok(Some(order(id, OrderStatusType::Cancelled))));
    let service = test::init_service(App::new().configure(configure(store, MockNotificationStore::new()))).await;
    let req = TestRequest::patch()
        .uri("/api/order/4/status")
        .insert_header((STAFF_KEY_HEADER, STAFF_KEY))
        .set_json(json!({"status": "accepted"}))
        .to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("cancelled"), "{body}");
}

#[actix_web::test]
async fn repeating_the_current_status_is_a_no_op() {
    let mut store = MockOrderStore::new();
    store.expect_fetch_order().returning(|id| Ok(Some(order(id, OrderStatusType::Accepted))));
    store.expect_update_status().never();
    let service = test::init_service(App::new().configure(configure(store, MockNotificationStore::new()))).await;
    let req = TestRequest::patch()
        .uri("/api/order/5/status")
        .insert_header((STAFF_KEY_HEADER, STAFF_KEY))
        .set_json(json!({"status": "accepted"}))
        .to_request();
    let (status, _) = send(&service, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn unread_notifications() {
    let mut notes = MockNotificationStore::new();
    notes.expect_fetch_notifications().withf(|unread| *unread).times(1).returning(|_| {
        Ok(vec![Notification {
            id: 9,
            order_id: 3,
            notification_type: NotificationType::NewOrder,
            is_read: false,
            created_at: Utc::now(),
        }])
    });
    let service = test::init_service(App::new().configure(configure(MockOrderStore::new(), notes))).await;
    let req =
        TestRequest::get().uri("/api/notifications?unread=true").insert_header((STAFF_KEY_HEADER, STAFF_KEY)).to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body[0]["notification_type"], "new_order");
    assert_eq!(body[0]["is_read"], false);
}

#[actix_web::test]
async fn mark_notifications_read() {
    let mut notes = MockNotificationStore::new();
    notes.expect_mark_all_notifications_read().times(1).returning(|| Ok(3));
    notes.expect_mark_notification_read().returning(|_| Ok(None));
    let service = test::init_service(App::new().configure(configure(MockOrderStore::new(), notes))).await;
    let req =
        TestRequest::post().uri("/api/notifications/read_all").insert_header((STAFF_KEY_HEADER, STAFF_KEY)).to_request();
    let (status, body) = send(&service, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"marked": 3}));

    let req =
        TestRequest::post().uri("/api/notifications/41/read").insert_header((STAFF_KEY_HEADER, STAFF_KEY)).to_request();
    let (status, _) = send(&service, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
