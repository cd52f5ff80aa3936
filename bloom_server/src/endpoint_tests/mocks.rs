use bloom_engine::{
    db_types::{NewOrder, Notification, Order, OrderItem, OrderKey, StatusUpdate},
    order_objects::OrderQueryFilter,
    traits::{
        CheckoutSessionCreated,
        CheckoutSessionRequest,
        NotificationManagement,
        OrderManagement,
        OrderStoreError,
        PaymentEvent,
        PaymentProvider,
        PaymentProviderError,
        SessionStatus,
    },
};
use mockall::mock;

mock! {
    pub OrderStore {}
    impl Clone for OrderStore {
        fn clone(&self) -> Self;
    }
    impl OrderManagement for OrderStore {
        fn url(&self) -> &str;
        async fn ping(&self) -> Result<(), OrderStoreError>;
        async fn insert_order(&self, order: NewOrder, correlation_token: Option<String>) -> Result<Order, OrderStoreError>;
        async fn fetch_order(&self, id: i64) -> Result<Option<Order>, OrderStoreError>;
        async fn fetch_order_by_key(&self, key: &OrderKey) -> Result<Option<Order>, OrderStoreError>;
        async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, OrderStoreError>;
        async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderStoreError>;
        async fn update_status(&self, key: &OrderKey, update: StatusUpdate) -> Result<Vec<Order>, OrderStoreError>;
        async fn attach_checkout_session(&self, order_id: i64, session_id: &str) -> Result<Order, OrderStoreError>;
    }
}

mock! {
    pub NotificationStore {}
    impl Clone for NotificationStore {
        fn clone(&self) -> Self;
    }
    impl NotificationManagement for NotificationStore {
        async fn fetch_notifications(&self, unread_only: bool) -> Result<Vec<Notification>, OrderStoreError>;
        async fn mark_notification_read(&self, id: i64) -> Result<Option<Notification>, OrderStoreError>;
        async fn mark_all_notifications_read(&self) -> Result<u64, OrderStoreError>;
    }
}

mock! {
    pub Gateway {}
    impl PaymentProvider for Gateway {
        fn is_initialized(&self) -> bool;
        async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSessionCreated, PaymentProviderError>;
        async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, PaymentProviderError>;
        fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<PaymentEvent, PaymentProviderError>;
    }
}
