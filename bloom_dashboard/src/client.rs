use std::time::Duration;

use anyhow::{anyhow, Result};
use bloom_common::Secret;
use bloom_engine::db_types::{Notification, Order};
use bloom_server::{
    data_objects::{HealthResponse, MarkedRead},
    middleware::STAFF_KEY_HEADER,
};
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client,
    Response,
};
use serde::de::DeserializeOwned;
use url::Url;

use crate::session::OrderSource;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for the staff API. Every request carries the staff key.
pub struct StaffClient {
    client: Client,
    /// Separate client for the change feed, which has no overall timeout
    feed_client: Client,
    server: Url,
}

impl StaffClient {
    pub fn new(server: &str, staff_key: Secret<String>) -> Result<Self> {
        let server = Url::parse(server).map_err(|e| anyhow!("Invalid server URL '{server}'. {e}"))?;
        if staff_key.is_empty() {
            warn!("🖥️ No staff key was given. The server will refuse every request.");
        }
        let mut key = HeaderValue::from_str(staff_key.reveal())?;
        key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_bytes(STAFF_KEY_HEADER.as_bytes())?, key);

        let mut json_headers = headers.clone();
        json_headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .user_agent("Bloom staff dashboard")
            .default_headers(json_headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        headers.insert("Accept", HeaderValue::from_static("text/event-stream"));
        let feed_client = Client::builder()
            .user_agent("Bloom staff dashboard")
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client, feed_client, server })
    }

    pub fn server(&self) -> &str {
        self.server.as_str()
    }

    pub fn url(&self, path: &str) -> Result<Url> {
        self.server.join(path).map_err(|e| anyhow!("Failed to join URL: {}", e))
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health").await
    }

    /// Every order the server has, newest first.
    pub async fn orders(&self) -> Result<Vec<Order>> {
        self.get("/api/orders").await
    }

    pub async fn unread_notifications(&self) -> Result<Vec<Notification>> {
        self.get("/api/notifications?unread=true").await
    }

    pub async fn mark_all_notifications_read(&self) -> Result<u64> {
        let url = self.url("/api/notifications/read_all")?;
        let res = self.client.post(url).send().await?;
        let marked: MarkedRead = parse_response(res).await?;
        Ok(marked.marked)
    }

    /// Opens the change feed. The response body is the Server-Sent Events stream.
    pub async fn open_feed(&self) -> Result<Response> {
        let url = self.url("/api/feed")?;
        let res = self.feed_client.get(url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let msg = res.text().await.unwrap_or_default();
            return Err(anyhow!("Could not open the change feed. {status}. {msg}"));
        }
        Ok(res)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        trace!("🖥️ GET {url}");
        let res = self.client.get(url).send().await?;
        parse_response(res).await
    }
}

async fn parse_response<T: DeserializeOwned>(res: Response) -> Result<T> {
    let status = res.status();
    if !status.is_success() {
        let msg = res.text().await?;
        return Err(anyhow!("The server responded with {status}. {msg}"));
    }
    Ok(res.json::<T>().await?)
}

impl OrderSource for StaffClient {
    async fn fetch_orders(&self) -> Result<Vec<Order>> {
        self.orders().await
    }

    async fn fetch_unread_notifications(&self) -> Result<Vec<Notification>> {
        self.unread_notifications().await
    }

    async fn mark_all_read(&self) -> Result<u64> {
        self.mark_all_notifications_read().await
    }
}
