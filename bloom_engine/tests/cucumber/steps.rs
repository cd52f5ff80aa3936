use std::str::FromStr;

use bloom_engine::{
    db_types::{Cents, NewOrder, NewOrderItem, NotificationType, OrderStatusType, PaymentMethod, PaymentStatus},
    order_objects::OrderQueryFilter,
    CheckoutError,
    NotificationManagement,
    OrderManagement,
};
use cucumber::{given, then, when};

use crate::{
    cucumber::{bloom_world::DashboardWatcher, BloomWorld},
    support::{webhook_payload, GOOD_SIGNATURE},
};

fn order_for(amount: &str, method: PaymentMethod) -> NewOrder {
    let price = Cents::from_str(amount).expect("Not a valid amount");
    NewOrder::new("Grace Hopper", "grace@example.com", method).with_item(NewOrderItem::new("Peonies", 1, price))
}

#[when(expr = "a customer checks out by card for {word}")]
async fn card_checkout(world: &mut BloomWorld, amount: String) {
    let order = order_for(&amount, PaymentMethod::Card);
    let started = world
        .system()
        .checkout
        .begin_checkout(order, "https://bloom.example/ok", "https://bloom.example/cancel")
        .await
        .expect("Error starting checkout");
    world.last_order = Some(started.order);
}

#[when(expr = "a customer places a pay-later order for {word}")]
async fn pay_later(world: &mut BloomWorld, amount: String) {
    let order = order_for(&amount, PaymentMethod::PayLater);
    let order = world.system().flow.create_pay_later_order(order).await.expect("Error creating order");
    world.last_order = Some(order);
}

async fn deliver_webhook(world: &mut BloomWorld, kind: &str, payment_intent: &str, signature: &str) {
    let token = world.order().correlation_token.clone();
    let amount = world.order().total_amount;
    let payload = webhook_payload("evt_cucumber", kind, payment_intent, token.as_deref(), amount);
    let outcome = world.system().checkout.handle_webhook(&payload, signature).await;
    world.last_outcome = Some(outcome);
    refresh_order(world).await;
}

async fn refresh_order(world: &mut BloomWorld) {
    let id = world.order().id;
    let order = world.system().db.fetch_order(id).await.expect("Error fetching order").expect("Order vanished");
    world.last_order = Some(order);
}

#[when(expr = "the provider confirms payment for the order with payment intent {word}")]
async fn confirm_payment(world: &mut BloomWorld, payment_intent: String) {
    deliver_webhook(world, "payment_intent.succeeded", &payment_intent, GOOD_SIGNATURE).await;
}

#[when(expr = "the provider reports a failed payment for the order with payment intent {word}")]
async fn fail_payment(world: &mut BloomWorld, payment_intent: String) {
    deliver_webhook(world, "payment_intent.payment_failed", &payment_intent, GOOD_SIGNATURE).await;
}

#[when("a forged confirmation arrives for the order")]
async fn forged_confirmation(world: &mut BloomWorld) {
    deliver_webhook(world, "payment_intent.succeeded", "pi_forged", "t=1,v1=deadbeef").await;
}

#[when("I remember the order")]
async fn remember_order(world: &mut BloomWorld) {
    world.remembered = world.last_order.clone();
}

#[given("a dashboard subscribed to the change feed")]
async fn dashboard_subscribes(world: &mut BloomWorld) {
    let subscription = world.system().feed.subscribe();
    world.dashboard = Some(DashboardWatcher { subscription: Some(subscription), received: vec![] });
}

#[when("the dashboard goes offline")]
async fn dashboard_offline(world: &mut BloomWorld) {
    let dashboard = world.dashboard.as_mut().expect("No dashboard");
    dashboard.subscription = None;
}

#[when("the dashboard reconnects")]
async fn dashboard_reconnects(world: &mut BloomWorld) {
    let subscription = world.system().feed.subscribe();
    let dashboard = world.dashboard.as_mut().expect("No dashboard");
    let mut subscription = subscription;
    while let Ok(ev) = subscription.try_recv() {
        dashboard.received.push(ev);
    }
    dashboard.subscription = Some(subscription);
}

#[then(expr = "the order has status {word}")]
async fn check_status(world: &mut BloomWorld, status: String) {
    refresh_order(world).await;
    let expected = OrderStatusType::from_str(&status).expect("Not a valid status");
    assert_eq!(world.order().status, expected);
}

#[then(expr = "the order has payment status {word}")]
async fn check_payment_status(world: &mut BloomWorld, status: String) {
    let expected = PaymentStatus::from_str(&status).expect("Not a valid payment status");
    assert_eq!(world.order().payment_status, expected);
}

#[then("the order has a paid_at timestamp")]
async fn check_paid_at(world: &mut BloomWorld) {
    assert!(world.order().paid_at.is_some());
}

#[then(expr = "the order total is {word}")]
async fn check_total(world: &mut BloomWorld, amount: String) {
    assert_eq!(world.order().total_amount, Cents::from_str(&amount).unwrap());
}

#[then("the order is unchanged since I remembered it")]
async fn check_unchanged(world: &mut BloomWorld) {
    assert_eq!(world.last_order, world.remembered);
}

#[then("the webhook is rejected")]
async fn check_rejected(world: &mut BloomWorld) {
    let outcome = world.last_outcome.as_ref().expect("No webhook was delivered");
    assert!(matches!(outcome, Err(CheckoutError::InvalidSignature(_))), "{outcome:?}");
}

#[then(expr = "there is {int} unread {word} notification for the order")]
async fn check_notifications(world: &mut BloomWorld, count: usize, kind: String) {
    let kind = NotificationType::from_str(&kind).expect("Not a valid notification type");
    let id = world.order().id;
    let notes = world.system().db.fetch_notifications(true).await.expect("Error fetching notifications");
    let matching = notes.iter().filter(|n| n.order_id == id && n.notification_type == kind).count();
    assert_eq!(matching, count);
}

#[then(expr = "the dashboard received {int} feed events")]
async fn check_feed_events(world: &mut BloomWorld, count: usize) {
    let dashboard = world.dashboard.as_ref().expect("No dashboard");
    assert_eq!(dashboard.received.len(), count);
}

#[then(expr = "a full refresh shows {int} orders")]
async fn check_full_refresh(world: &mut BloomWorld, count: usize) {
    let orders = world.system().flow.orders(OrderQueryFilter::default()).await.expect("Error fetching orders");
    assert_eq!(orders.len(), count);
}
