//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Any long, non-cpu-bound operation (e.g. calls to the payment
//! provider, database operations, etc.) must be expressed as futures or asynchronous functions.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use bloom_engine::{
    db_types::NewOrder,
    events::ChangeFeed,
    order_objects::OrderQueryFilter,
    traits::CheckoutSessionRequest,
    CheckoutApi,
    CheckoutError,
    NotificationApi,
    NotificationManagement,
    OrderFlowApi,
    OrderManagement,
    PaymentProvider,
    WebhookOutcome,
};
use bytes::Bytes;
use chrono::Utc;
use log::*;
use stripe_tools::{webhook::SIGNATURE_HEADER, StripeConfig};

use crate::{
    data_objects::{
        CheckoutRequest,
        HealthResponse,
        JsonResponse,
        MarkedRead,
        NotificationParams,
        OrderListParams,
        StatusChangeRequest,
        VerifyPaymentParams,
        VerifyPaymentResponse,
        WebhookAck,
    },
    errors::ServerError,
    integrations::stripe::StripeGateway,
    sse::{feed_stream, KEEP_ALIVE_INTERVAL},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal requires staff) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
                impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name)
                        .wrap($crate::middleware::StaffKeyMiddlewareFactory::new());
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
route!(health => Get "/health" impl OrderManagement, PaymentProvider);
pub async fn health<B, P>(api: web::Data<CheckoutApi<B, P>>) -> impl Responder
where
    B: OrderManagement,
    P: PaymentProvider,
{
    trace!("💻️ Received health check request");
    let gateway_initialized = api.provider().is_initialized();
    let store_initialized = match api.db().ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("💻️ Order store is not answering. {e}");
            false
        },
    };
    let status = if store_initialized { "ok" } else { "degraded" };
    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        gateway_initialized,
        store_initialized,
    })
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(create_checkout_session => Post "/create-checkout-session" impl OrderManagement, PaymentProvider);
/// Opens a hosted checkout session for an order the storefront has already created.
///
/// The body follows the provider's own session shape (`line_items`, `customer_email`, `success_url`, `cancel_url`,
/// `metadata`, `payment_intent_data`). The response is `{id, url}`; the browser redirects to `url`.
pub async fn create_checkout_session<B, P>(
    body: web::Json<CheckoutSessionRequest>,
    api: web::Data<CheckoutApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderManagement,
    P: PaymentProvider,
{
    let request = body.into_inner();
    debug!("💻️ POST create-checkout-session with {} line items", request.line_items.len());
    let session = api.create_checkout_session(request).await.map_err(|e| {
        debug!("💻️ Could not create a checkout session. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(session))
}

route!(checkout => Post "/checkout" impl OrderManagement, PaymentProvider);
/// Stores a card order and opens its checkout session in one step. The order is returned along with the session, so
/// the storefront can show the order number on its success page.
pub async fn checkout<B, P>(
    body: web::Json<CheckoutRequest>,
    api: web::Data<CheckoutApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderManagement,
    P: PaymentProvider,
{
    let CheckoutRequest { order, success_url, cancel_url } = body.into_inner();
    debug!("💻️ POST checkout for {}", order.customer_email);
    let started = api.begin_checkout(order, &success_url, &cancel_url).await?;
    Ok(HttpResponse::Ok().json(started))
}

route!(verify_payment => Get "/verify-payment" impl OrderManagement, PaymentProvider);
/// Reports what the provider currently knows about a checkout session. This does not touch the order; the webhook
/// does that.
pub async fn verify_payment<B, P>(
    query: web::Query<VerifyPaymentParams>,
    api: web::Data<CheckoutApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderManagement,
    P: PaymentProvider,
{
    let session_id = query
        .into_inner()
        .session_id
        .ok_or_else(|| CheckoutError::InvalidRequest("Session ID is required".into()))?;
    debug!("💻️ GET verify-payment for {session_id}");
    let status = api.verify_payment(&session_id).await?;
    Ok(HttpResponse::Ok().json(VerifyPaymentResponse::from(status)))
}

route!(webhook => Post "/webhook" impl OrderManagement, PaymentProvider);
/// Receives the payment provider's signed event deliveries.
///
/// Anything with a valid signature is acknowledged with `{received: true}`, including event types we ignore and
/// events for orders we cannot find. Otherwise the provider would keep redelivering them. Bad signatures and
/// unreadable payloads get a 400. If the store fails, the 500 tells the provider to try again later.
pub async fn webhook<B, P>(
    req: HttpRequest,
    body: Bytes,
    api: web::Data<CheckoutApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderManagement,
    P: PaymentProvider,
{
    let signature = req.headers().get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()).unwrap_or_default();
    trace!("💻️ Received webhook delivery ({} bytes)", body.len());
    match api.handle_webhook(&body, signature).await {
        Ok(WebhookOutcome::Applied(order)) => debug!("💻️ Webhook moved order {} to {}", order.order_number, order.status),
        Ok(WebhookOutcome::Unchanged(order)) => {
            debug!("💻️ Webhook left order {} in {}", order.order_number, order.status)
        },
        Ok(WebhookOutcome::OrderNotFound) => debug!("💻️ Webhook acknowledged without a matching order"),
        Ok(WebhookOutcome::Unhandled(kind)) => trace!("💻️ Webhook event {kind} acknowledged"),
        Err(CheckoutError::NotFound(e)) => warn!("💻️ Webhook acknowledged without a matching order. {e}"),
        Err(e) => return Err(e.into()),
    }
    Ok(HttpResponse::Ok().json(WebhookAck { received: true }))
}

route!(initialize_stripe => Post "/initialize-stripe" requires staff);
/// Re-reads the gateway credentials from the process environment and swaps them into the shared gateway handle.
/// Credentials are never accepted from the request.
pub async fn initialize_stripe(gateway: web::Data<StripeGateway>) -> HttpResponse {
    info!("💻️ POST initialize-stripe");
    let config = StripeConfig::new_from_env_or_default();
    match gateway.initialize(config) {
        Ok(()) => HttpResponse::Ok().json(JsonResponse::success("Payment gateway initialized")),
        Err(e) => {
            warn!("💻️ Could not initialize the payment gateway. {e}");
            HttpResponse::InternalServerError().json(JsonResponse::failure(e))
        },
    }
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(pay_later_order => Post "/orders" impl OrderManagement);
/// Stores a pay-later order. It skips payment and goes straight to `pending`, where staff pick it up.
pub async fn pay_later_order<B: OrderManagement>(
    body: web::Json<NewOrder>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order = body.into_inner();
    debug!("💻️ POST pay-later order for {}", order.customer_email);
    let order = api.create_pay_later_order(order).await?;
    Ok(HttpResponse::Created().json(order))
}

route!(orders => Get "/orders" impl OrderManagement);
/// Staff order listing, newest first. Filters: `status` (comma-separated), `since`, `until`, `customer_email`,
/// `limit`.
pub async fn orders<B: OrderManagement>(
    query: web::Query<OrderListParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let filter = OrderQueryFilter::try_from(query.into_inner()).map_err(ServerError::InvalidRequestBody)?;
    debug!("💻️ GET orders. {filter}");
    let orders = api.orders(filter).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(order_by_id => Get "/order/{id}" impl OrderManagement);
pub async fn order_by_id<B: OrderManagement>(
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ GET order #{id}");
    let order = api.order_with_items(id).await?.ok_or_else(|| ServerError::NoRecordFound(format!("Order #{id}")))?;
    Ok(HttpResponse::Ok().json(order))
}

route!(update_order_status => Patch "/order/{id}/status" impl OrderManagement);
/// Staff status changes. Payment statuses cannot be set here, and every change is checked against the order
/// lifecycle. A change that lost a race with another writer gets a 409.
pub async fn update_order_status<B: OrderManagement>(
    path: web::Path<i64>,
    body: web::Json<StatusChangeRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    let new_status = body.into_inner().status;
    info!("💻️ PATCH order #{id} status to {new_status}");
    let order = api.update_order_status(id, new_status).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Notifications  ----------------------------------------------------
route!(notifications => Get "/notifications" impl NotificationManagement);
pub async fn notifications<B: NotificationManagement>(
    query: web::Query<NotificationParams>,
    api: web::Data<NotificationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let unread_only = query.into_inner().unread;
    trace!("💻️ GET notifications (unread only: {unread_only})");
    let notifications = api.notifications(unread_only).await?;
    Ok(HttpResponse::Ok().json(notifications))
}

route!(mark_notification_read => Post "/notifications/{id}/read" impl NotificationManagement);
pub async fn mark_notification_read<B: NotificationManagement>(
    path: web::Path<i64>,
    api: web::Data<NotificationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ POST mark notification #{id} read");
    let notification = api.mark_read(id).await?;
    Ok(HttpResponse::Ok().json(notification))
}

route!(mark_all_notifications_read => Post "/notifications/read_all" impl NotificationManagement);
pub async fn mark_all_notifications_read<B: NotificationManagement>(
    api: web::Data<NotificationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST mark all notifications read");
    let marked = api.mark_all_read().await?;
    Ok(HttpResponse::Ok().json(MarkedRead { marked }))
}

//----------------------------------------------   Change feed  ----------------------------------------------------
/// The live change feed, as Server-Sent Events. Clients should re-fetch orders whenever they (re)connect, since
/// events published while they were away are not replayed.
#[get("/feed")]
pub async fn change_feed(feed: web::Data<ChangeFeed>) -> impl Responder {
    debug!("💻️ New change feed subscriber. {} already connected", feed.subscriber_count());
    let rx = feed.subscribe();
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(feed_stream(rx, KEEP_ALIVE_INTERVAL))
}
