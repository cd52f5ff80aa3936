use std::sync::Arc;

use chrono::Utc;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client,
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{
    config::StripeConfig,
    data_objects::{CheckoutSession, Event, NewCheckoutSession},
    webhook::construct_event,
    StripeApiError,
};

pub const METADATA_SOURCE: &str = "bloom-server";
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Clone)]
pub struct StripeApi {
    config: StripeConfig,
    client: Arc<Client>,
}

impl std::fmt::Debug for StripeApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StripeApi({})", self.config.api_url)
    }
}

impl StripeApi {
    pub fn new(config: StripeConfig) -> Result<Self, StripeApiError> {
        if !config.has_credentials() {
            return Err(StripeApiError::Initialization("No secret key was provided".into()));
        }
        let mut headers = HeaderMap::with_capacity(1);
        let mut val = HeaderValue::from_str(&format!("Bearer {}", config.secret_key.reveal()))
            .map_err(|e| StripeApiError::Initialization(e.to_string()))?;
        val.set_sensitive(true);
        headers.insert(AUTHORIZATION, val);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| StripeApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url.trim_end_matches('/'))
    }

    /// Sends a form-encoded request. Failures that never reached the provider, or timed out, are retried once.
    ///
    /// Anything other than a GET is only retried when it carries an idempotency key. The same key goes out with both
    /// attempts, so the provider creates the object at most once.
    pub async fn rest_query<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, StripeApiError> {
        match self.send(method.clone(), path, params, idempotency_key).await {
            Err(e) if e.is_transient() && is_retryable(&method, idempotency_key) => {
                warn!("💳️ {method} {path} failed ({e}). Retrying once.");
                self.send(method, path, params, idempotency_key).await
            },
            result => result,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, StripeApiError> {
        let url = self.url(path);
        trace!("💳️ Sending REST query: {method} {url}");
        let mut req = self.client.request(method.clone(), url);
        if let Some(key) = idempotency_key {
            req = req.header(IDEMPOTENCY_HEADER, key);
        }
        if !params.is_empty() {
            req = if method == Method::GET { req.query(params) } else { req.form(params) };
        }
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                StripeApiError::Timeout(e.to_string())
            } else {
                StripeApiError::RestRequestError(e.to_string())
            }
        })?;
        let status = response.status();
        if status.is_success() {
            trace!("💳️ REST query successful. {status}");
            response.json::<T>().await.map_err(|e| StripeApiError::JsonError(e.to_string()))
        } else {
            let body = response.text().await.map_err(|e| StripeApiError::RestResponseError(e.to_string()))?;
            Err(StripeApiError::QueryError { status: status.as_u16(), message: error_message(&body) })
        }
    }

    /// Opens a hosted checkout session. The session and its payment intent are both tagged with the server's
    /// source and creation time, on top of whatever metadata the caller supplied.
    pub async fn create_checkout_session(
        &self,
        session: &NewCheckoutSession,
    ) -> Result<CheckoutSession, StripeApiError> {
        let mut session = session.clone();
        let created_at = Utc::now().to_rfc3339();
        for metadata in [&mut session.metadata, &mut session.payment_intent_metadata] {
            metadata.insert("source".into(), METADATA_SOURCE.into());
            metadata.insert("timestamp".into(), created_at.clone());
        }
        let form = session.to_form(&self.config.shipping_countries);
        let key = idempotency_key(&form);
        debug!("💳️ Creating checkout session with {} line items (idempotency key {key})", session.line_items.len());
        let result = self.rest_query::<CheckoutSession>(Method::POST, "/checkout/sessions", &form, Some(&key)).await?;
        info!("💳️ Created checkout session {}", result.id);
        Ok(result)
    }

    /// Fetches a checkout session with its payment intent expanded
    pub async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, StripeApiError> {
        let path = format!("/checkout/sessions/{session_id}");
        let params = [("expand[]".to_string(), "payment_intent".to_string())];
        debug!("💳️ Fetching checkout session {session_id}");
        self.rest_query::<CheckoutSession>(Method::GET, &path, &params, None).await
    }

    /// Verifies a webhook delivery against the configured signing secret and parses it.
    pub fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<Event, StripeApiError> {
        construct_event(
            payload,
            signature,
            self.config.webhook_secret.reveal(),
            self.config.webhook_tolerance_secs,
            Utc::now().timestamp(),
        )
    }
}

fn is_retryable(method: &Method, idempotency_key: Option<&str>) -> bool {
    *method == Method::GET || idempotency_key.is_some()
}

/// A key for a single create call. The form carries the order's correlation token and the creation time, so two
/// checkouts never share a key, while a retry of the same form always does.
pub fn idempotency_key(form: &[(String, String)]) -> String {
    let mut hasher = Sha256::new();
    for (name, value) in form {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"&");
    }
    hex::encode(hasher.finalize())
}

/// The provider wraps errors as `{"error": {"message": "..."}}`. Anything else is passed through verbatim.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}
