use std::time::Duration;

use bloom_common::{helpers::parse_list, Secret};
use log::*;

pub const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com/v1";
pub const DEFAULT_SHIPPING_COUNTRIES: &str = "IT,FR,DE,ES,AT,CH";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_url: String,
    /// Upper bound on every request to the provider
    pub timeout: Duration,
    /// How old a webhook signature timestamp may be before the delivery is rejected
    pub webhook_tolerance_secs: i64,
    /// Countries offered for shipping when the checkout request does not name any
    pub shipping_countries: Vec<String>,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: Secret::default(),
            webhook_secret: Secret::default(),
            api_url: DEFAULT_STRIPE_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            webhook_tolerance_secs: DEFAULT_TOLERANCE_SECS,
            shipping_countries: parse_list(DEFAULT_SHIPPING_COUNTRIES),
        }
    }
}

impl StripeConfig {
    pub fn new_from_env_or_default() -> Self {
        let secret_key = Secret::new(std::env::var("BLOOM_STRIPE_SECRET_KEY").unwrap_or_else(|_| {
            warn!("🪛️ BLOOM_STRIPE_SECRET_KEY is not set. Card checkout will be unavailable until it is.");
            String::default()
        }));
        let webhook_secret = Secret::new(std::env::var("BLOOM_STRIPE_WEBHOOK_SECRET").unwrap_or_else(|_| {
            warn!("🪛️ BLOOM_STRIPE_WEBHOOK_SECRET is not set. Every webhook delivery will be rejected.");
            String::default()
        }));
        let api_url = std::env::var("BLOOM_STRIPE_API_URL").unwrap_or_else(|_| {
            debug!("🪛️ BLOOM_STRIPE_API_URL is not set. Using {DEFAULT_STRIPE_API_URL}");
            DEFAULT_STRIPE_API_URL.to_string()
        });
        let timeout = std::env::var("BLOOM_STRIPE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| error!("🪛️ Invalid value for BLOOM_STRIPE_TIMEOUT_SECS ({s}). {e}"))
                    .ok()
            })
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let webhook_tolerance_secs = std::env::var("BLOOM_WEBHOOK_TOLERANCE_SECS")
            .ok()
            .and_then(|s| {
                s.parse::<i64>()
                    .map_err(|e| error!("🪛️ Invalid value for BLOOM_WEBHOOK_TOLERANCE_SECS ({s}). {e}"))
                    .ok()
            })
            .unwrap_or(DEFAULT_TOLERANCE_SECS);
        let shipping_countries =
            parse_list(&std::env::var("BLOOM_SHIPPING_COUNTRIES").unwrap_or_else(|_| DEFAULT_SHIPPING_COUNTRIES.into()));
        Self { secret_key, webhook_secret, api_url, timeout, webhook_tolerance_secs, shipping_countries }
    }

    /// True if there is enough configuration to talk to the provider
    pub fn has_credentials(&self) -> bool {
        !self.secret_key.is_empty()
    }
}
