use std::time::Duration;

use actix_cors::Cors;
use actix_web::{
    dev::Server,
    error::{JsonPayloadError, QueryPayloadError},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpRequest,
    HttpServer,
};
use bloom_engine::{
    events::{ChangeFeed, EventHandlers, EventHooks, EventProducers},
    CheckoutApi,
    NotificationApi,
    OrderFlowApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::stripe::StripeGateway,
    middleware::{StaffAccess, StaffKeyMiddlewareFactory, STAFF_KEY_HEADER},
    reconcile_worker::start_reconcile_worker,
    routes::{
        change_feed,
        CheckoutRoute,
        CreateCheckoutSessionRoute,
        HealthRoute,
        InitializeStripeRoute,
        MarkAllNotificationsReadRoute,
        MarkNotificationReadRoute,
        NotificationsRoute,
        OrderByIdRoute,
        OrdersRoute,
        PayLaterOrderRoute,
        UpdateOrderStatusRoute,
        VerifyPaymentRoute,
        WebhookRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateway = StripeGateway::new(config.stripe.clone());
    let feed = ChangeFeed::new(config.event_buffer_size);
    let handlers = EventHandlers::new(config.event_buffer_size, create_event_hooks());
    let producers = handlers.producers().with_change_feed(feed.clone());
    handlers.start_handlers().await;
    let worker_api = CheckoutApi::new(db.clone(), gateway.clone(), producers.clone());
    let _worker = start_reconcile_worker(worker_api, config.reconcile_interval, config.stale_payment_age);
    let srv = create_server_instance(config, db, gateway, producers, feed)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Hooks that run on their own task, after the change has been committed
fn create_event_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|ev| {
        Box::pin(async move {
            info!(
                "📬️ Order {} paid: {} from {} <{}>",
                ev.order.order_number, ev.order.total_amount, ev.order.customer_name, ev.order.customer_email
            );
        })
    });
    hooks
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: StripeGateway,
    producers: EventProducers,
    feed: ChangeFeed,
) -> Result<Server, ServerError> {
    let staff_access = StaffAccess::new(config.staff_api_key.clone());
    let allowed_origins = config.allowed_origins.clone();
    let srv = HttpServer::new(move || {
        let checkout_api = CheckoutApi::new(db.clone(), gateway.clone(), producers.clone());
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone());
        let notifications_api = NotificationApi::new(db.clone());
        let staff_scope = web::scope("/api")
            .wrap(StaffKeyMiddlewareFactory::new())
            .service(OrdersRoute::<SqliteDatabase>::new())
            .service(OrderByIdRoute::<SqliteDatabase>::new())
            .service(UpdateOrderStatusRoute::<SqliteDatabase>::new())
            .service(NotificationsRoute::<SqliteDatabase>::new())
            .service(MarkAllNotificationsReadRoute::<SqliteDatabase>::new())
            .service(MarkNotificationReadRoute::<SqliteDatabase>::new())
            .service(change_feed);
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("bloom::access_log"))
            .wrap(build_cors(&allowed_origins))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .app_data(web::Data::new(checkout_api))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(notifications_api))
            .app_data(web::Data::new(gateway.clone()))
            .app_data(web::Data::new(feed.clone()))
            .app_data(web::Data::new(staff_access.clone()))
            .service(HealthRoute::<SqliteDatabase, StripeGateway>::new())
            .service(CreateCheckoutSessionRoute::<SqliteDatabase, StripeGateway>::new())
            .service(CheckoutRoute::<SqliteDatabase, StripeGateway>::new())
            .service(VerifyPaymentRoute::<SqliteDatabase, StripeGateway>::new())
            .service(WebhookRoute::<SqliteDatabase, StripeGateway>::new())
            .service(InitializeStripeRoute::new())
            .service(PayLaterOrderRoute::<SqliteDatabase>::new())
            .service(staff_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    info!("💻️ Listening on {}:{}", config.host, config.port);
    Ok(srv)
}

/// CORS for the storefront and the staff dashboard. `*` in the origin list allows any origin.
pub fn build_cors(origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PATCH", "OPTIONS"])
        .allowed_headers(vec!["Content-Type", "Accept", STAFF_KEY_HEADER])
        .max_age(3600);
    if origins.iter().any(|o| o == "*") {
        warn!("💻️ CORS allows any origin");
        return cors.allow_any_origin();
    }
    origins.iter().fold(cors, |cors, origin| cors.allowed_origin(origin))
}

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    debug!("💻️ Rejected request body. {err}");
    ServerError::InvalidRequestBody(err.to_string()).into()
}

fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    debug!("💻️ Rejected query string. {err}");
    ServerError::InvalidRequestBody(err.to_string()).into()
}
