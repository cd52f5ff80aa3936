//! The hosted-checkout provider, seen through the engine's [`PaymentProvider`] trait.
//!
//! [`StripeGateway`] is a process-wide handle: it is built once at start-up and shared by every worker. It may start
//! out uninitialized (no credentials configured), and `POST /initialize-stripe` can swap in fresh credentials later.
//! The lock is only held long enough to clone the client out, never across a request to the provider.
use std::sync::{Arc, RwLock};

use bloom_engine::traits::{
    CheckoutSessionCreated,
    CheckoutSessionRequest,
    PaymentEvent,
    PaymentEventKind,
    PaymentProvider,
    PaymentProviderError,
    SessionStatus,
};
use log::*;
use stripe_tools::{
    CheckoutSession,
    Event,
    EventOutcome,
    NewCheckoutSession,
    NewLineItem,
    StripeApi,
    StripeApiError,
    StripeConfig,
};

#[derive(Clone, Default)]
pub struct StripeGateway {
    api: Arc<RwLock<Option<StripeApi>>>,
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StripeGateway(initialized: {})", self.is_initialized())
    }
}

impl StripeGateway {
    /// Builds the gateway from the given configuration. Missing credentials are not an error: the gateway simply
    /// reports itself as uninitialized until [`StripeGateway::initialize`] succeeds.
    pub fn new(config: StripeConfig) -> Self {
        let gateway = Self::default();
        if config.has_credentials() {
            if let Err(e) = gateway.initialize(config) {
                error!("💳️ Could not initialize the payment gateway. {e}");
            }
        } else {
            warn!("💳️ No payment gateway credentials. Card checkout is disabled until the gateway is initialized.");
        }
        gateway
    }

    /// (Re)initializes the gateway with the given configuration. Calling this repeatedly with the same configuration
    /// is harmless.
    pub fn initialize(&self, config: StripeConfig) -> Result<(), StripeApiError> {
        let api = StripeApi::new(config)?;
        let mut guard = self.api.write().map_err(|e| StripeApiError::Initialization(e.to_string()))?;
        *guard = Some(api);
        info!("💳️ Payment gateway initialized");
        Ok(())
    }

    pub fn teardown(&self) {
        if let Ok(mut guard) = self.api.write() {
            *guard = None;
            info!("💳️ Payment gateway credentials dropped");
        }
    }

    fn api(&self) -> Result<StripeApi, PaymentProviderError> {
        let guard = self.api.read().map_err(|e| PaymentProviderError::NotInitialized(e.to_string()))?;
        guard.clone().ok_or_else(|| PaymentProviderError::NotInitialized("No credentials have been configured".into()))
    }
}

impl PaymentProvider for StripeGateway {
    fn is_initialized(&self) -> bool {
        self.api.read().map(|g| g.is_some()).unwrap_or(false)
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSessionCreated, PaymentProviderError> {
        let api = self.api()?;
        let session = api.create_checkout_session(&new_checkout_session(request)).await.map_err(provider_error)?;
        Ok(CheckoutSessionCreated { id: session.id, url: session.url })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, PaymentProviderError> {
        let api = self.api()?;
        let session = api.retrieve_session(session_id).await.map_err(provider_error)?;
        Ok(session_status(session))
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<PaymentEvent, PaymentProviderError> {
        let api = self.api()?;
        let event = api.verify_webhook(payload, signature).map_err(|e| match e {
            StripeApiError::JsonError(s) => PaymentProviderError::MalformedEvent(s),
            e => provider_error(e),
        })?;
        Ok(payment_event(event))
    }
}

pub fn new_checkout_session(request: &CheckoutSessionRequest) -> NewCheckoutSession {
    let line_items = request
        .line_items
        .iter()
        .map(|item| NewLineItem {
            name: item.price_data.product_data.name.clone(),
            description: item.price_data.product_data.description.clone(),
            images: item.price_data.product_data.images.clone(),
            currency: item.price_data.currency.clone(),
            unit_amount: item.price_data.unit_amount,
            quantity: item.quantity,
        })
        .collect();
    NewCheckoutSession {
        line_items,
        mode: request.mode.clone(),
        customer_email: request.customer_email.clone(),
        success_url: request.success_url.clone(),
        cancel_url: request.cancel_url.clone(),
        metadata: request.metadata.clone(),
        payment_intent_description: request.payment_intent_data.description.clone(),
        payment_intent_metadata: request.payment_intent_data.metadata.clone(),
        allowed_countries: request
            .shipping_address_collection
            .as_ref()
            .map(|s| s.allowed_countries.clone())
            .unwrap_or_default(),
    }
}

pub fn session_status(session: CheckoutSession) -> SessionStatus {
    SessionStatus {
        payment_intent_id: session.payment_intent_id().map(String::from),
        customer_email: session.customer_email().map(String::from),
        session_id: session.id,
        status: session.status,
        payment_status: session.payment_status,
        amount_total: session.amount_total,
        currency: session.currency,
        metadata: session.metadata,
    }
}

pub fn payment_event(event: Event) -> PaymentEvent {
    let kind = match event.outcome() {
        EventOutcome::PaymentSucceeded => PaymentEventKind::Succeeded,
        EventOutcome::PaymentFailed => PaymentEventKind::Failed,
        EventOutcome::Other => PaymentEventKind::Unhandled(event.event_type.clone()),
    };
    PaymentEvent {
        kind,
        payment_intent_id: event.payment_intent_id(),
        checkout_session_id: event.checkout_session_id(),
        amount: event.amount(),
        currency: event.currency(),
        metadata: event.metadata(),
        id: event.id,
    }
}

pub fn provider_error(e: StripeApiError) -> PaymentProviderError {
    match e {
        StripeApiError::Initialization(s) => PaymentProviderError::NotInitialized(s),
        StripeApiError::Timeout(s) => PaymentProviderError::Timeout(s),
        StripeApiError::RestRequestError(s) | StripeApiError::RestResponseError(s) => PaymentProviderError::Network(s),
        StripeApiError::QueryError { status, message } => PaymentProviderError::Rejected { status, message },
        StripeApiError::JsonError(s) => PaymentProviderError::Network(format!("Unexpected response. {s}")),
        e @ (StripeApiError::MissingSignature(_) |
        StripeApiError::InvalidSignature |
        StripeApiError::SignatureExpired { .. }) => PaymentProviderError::InvalidSignature(e.to_string()),
    }
}
