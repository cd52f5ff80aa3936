use actix_web::{
    body::MessageBody,
    dev::{Service, ServiceResponse},
    http::StatusCode,
    test,
};
use bloom_common::Cents;
use bloom_engine::db_types::{Order, OrderStatusType, PaymentMethod, PaymentStatus};
use chrono::{TimeZone, Utc};
use log::debug;

pub const STAFF_KEY: &str = "test-staff-key-not-for-production";

/// Calls the service and flattens the result into a status and body. Errors raised by middleware are rendered the same
/// way the HTTP server would render them.
pub async fn send<S, R, B>(service: &S, req: R) -> (StatusCode, String)
where
    S: Service<R, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    debug!("Making request");
    match test::try_call_service(service, req).await {
        Ok(res) => {
            let status = res.status();
            let body = test::read_body(res).await;
            (status, String::from_utf8_lossy(&body).into_owned())
        },
        Err(e) => {
            let res = e.error_response();
            let status = res.status();
            let body = res.into_body().try_into_bytes().unwrap_or_default();
            (status, String::from_utf8_lossy(&body).into_owned())
        },
    }
}

pub fn order(id: i64, status: OrderStatusType) -> Order {
    let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
    let payment_method = match status {
        OrderStatusType::Pending => PaymentMethod::PayLater,
        _ => PaymentMethod::Card,
    };
    let payment_status = match status {
        OrderStatusType::PaymentPending | OrderStatusType::Pending => PaymentStatus::Pending,
        OrderStatusType::PaymentFailed => PaymentStatus::Failed,
        _ => PaymentStatus::Paid,
    };
    Order {
        id,
        order_number: format!("ORD-{id:06}"),
        client_reference: None,
        customer_name: "Ada Lovelace".into(),
        customer_email: "ada@example.com".into(),
        customer_phone: None,
        total_amount: Cents::from(4990),
        currency: "EUR".into(),
        status,
        payment_status,
        payment_method,
        correlation_token: Some(format!("tok-{id}")),
        checkout_session_id: Some(format!("cs_test_{id}")),
        payment_intent_id: None,
        billing_address: None,
        shipping_address: None,
        notes: None,
        created_at,
        updated_at: created_at,
        paid_at: None,
        failed_at: None,
        shipped_at: None,
        delivered_at: None,
    }
}
