use std::{env, time::Duration as StdDuration};

use bloom_common::{helpers::parse_list, Secret};
use chrono::Duration;
use log::*;
use stripe_tools::StripeConfig;

const DEFAULT_BLOOM_HOST: &str = "127.0.0.1";
const DEFAULT_BLOOM_PORT: u16 = 3001;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/bloom_store.db";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:8484,http://localhost:8485";
const DEFAULT_RECONCILE_INTERVAL: StdDuration = StdDuration::from_secs(60);
const DEFAULT_STALE_PAYMENT_AGE: Duration = Duration::minutes(15);
const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Storefront origins that may call the checkout endpoints from a browser. `*` allows any origin.
    pub allowed_origins: Vec<String>,
    /// Shared key for the staff API. If empty, every staff route answers 403.
    pub staff_api_key: Secret<String>,
    /// How often the reconcile worker looks for orders whose webhook never arrived
    pub reconcile_interval: StdDuration,
    /// How long a card order may sit in `payment_pending` before the reconcile worker asks the provider about it
    pub stale_payment_age: Duration,
    /// Capacity of the change feed and the event hook channels
    pub event_buffer_size: usize,
    pub stripe: StripeConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BLOOM_HOST.to_string(),
            port: DEFAULT_BLOOM_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            allowed_origins: parse_list(DEFAULT_ALLOWED_ORIGINS),
            staff_api_key: Secret::default(),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            stale_payment_age: DEFAULT_STALE_PAYMENT_AGE,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            stripe: StripeConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("BLOOM_HOST").ok().unwrap_or_else(|| DEFAULT_BLOOM_HOST.into());
        let port = env::var("BLOOM_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for BLOOM_PORT. {e} Using the default, {DEFAULT_BLOOM_PORT}, \
                         instead."
                    );
                    DEFAULT_BLOOM_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_BLOOM_PORT);
        let database_url = env::var("BLOOM_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ BLOOM_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.to_string()
        });
        let allowed_origins = env::var("BLOOM_ALLOWED_ORIGINS").map(|s| parse_list(&s)).unwrap_or_else(|_| {
            info!("🪛️ BLOOM_ALLOWED_ORIGINS is not set. Allowing {DEFAULT_ALLOWED_ORIGINS}");
            parse_list(DEFAULT_ALLOWED_ORIGINS)
        });
        if allowed_origins.is_empty() {
            warn!("🪛️ BLOOM_ALLOWED_ORIGINS is empty. Browsers will not be able to start a checkout.");
        }
        let staff_api_key = Secret::new(env::var("BLOOM_STAFF_API_KEY").unwrap_or_else(|_| {
            warn!("🪛️ BLOOM_STAFF_API_KEY is not set. The staff API and the dashboard feed are disabled.");
            String::default()
        }));
        let reconcile_interval = env::var("BLOOM_RECONCILE_INTERVAL_SECS")
            .map_err(|_| {
                info!(
                    "🪛️ BLOOM_RECONCILE_INTERVAL_SECS is not set. Using the default value of {}s.",
                    DEFAULT_RECONCILE_INTERVAL.as_secs()
                )
            })
            .and_then(|s| {
                s.parse::<u64>()
                    .map(StdDuration::from_secs)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for BLOOM_RECONCILE_INTERVAL_SECS. {e}"))
            })
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL);
        let stale_payment_age = env::var("BLOOM_STALE_PAYMENT_MINS")
            .map_err(|_| {
                info!(
                    "🪛️ BLOOM_STALE_PAYMENT_MINS is not set. Using the default value of {} minutes.",
                    DEFAULT_STALE_PAYMENT_AGE.num_minutes()
                )
            })
            .and_then(|s| {
                s.parse::<i64>()
                    .map(Duration::minutes)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for BLOOM_STALE_PAYMENT_MINS. {e}"))
            })
            .ok()
            .unwrap_or(DEFAULT_STALE_PAYMENT_AGE);
        let event_buffer_size = env::var("BLOOM_EVENT_BUFFER_SIZE")
            .ok()
            .and_then(|s| {
                s.parse::<usize>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for BLOOM_EVENT_BUFFER_SIZE. {e}"))
                    .ok()
            })
            .unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
        let stripe = StripeConfig::new_from_env_or_default();
        Self {
            host,
            port,
            database_url,
            allowed_origins,
            staff_api_key,
            reconcile_interval,
            stale_payment_age,
            event_buffer_size,
            stripe,
        }
    }
}
