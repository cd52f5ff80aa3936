//! The change feed, as seen from the dashboard.
//!
//! The server streams Server-Sent Events from `/api/feed`. [`SseParser`] turns the raw byte stream into messages, and
//! [`spawn_feed_listener`] keeps a connection open, reconnecting with a backoff whenever it drops. Every message and
//! every disconnect is forwarded to the session as a [`SessionInput`].
use std::{sync::Arc, time::Duration};

use bloom_engine::events::OrderEvent;
use futures::StreamExt;
use log::*;
use serde::Deserialize;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{client::StaffClient, session::SessionInput};

const MIN_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental Server-Sent Events parser. Chunks may split lines (or UTF-8 sequences) anywhere.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(chunk);
        let mut messages = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                messages.extend(self.dispatch());
                continue;
            }
            // comment
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => trace!("🖥️ Ignoring SSE field {field}"),
            }
        }
        messages
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseMessage { event, data })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// Sent once per connection. Anything published before it was missed.
    Ready,
    /// The server dropped this many events because we fell behind
    Lagged(u64),
    Order(Box<OrderEvent>),
}

#[derive(Deserialize)]
struct Lagged {
    missed: u64,
}

impl TryFrom<SseMessage> for FeedMessage {
    type Error = String;

    fn try_from(msg: SseMessage) -> Result<Self, Self::Error> {
        match msg.event.as_deref() {
            Some("ready") => Ok(Self::Ready),
            Some("lagged") => {
                let lagged: Lagged = serde_json::from_str(&msg.data).map_err(|e| e.to_string())?;
                Ok(Self::Lagged(lagged.missed))
            },
            _ => {
                let event: OrderEvent = serde_json::from_str(&msg.data).map_err(|e| e.to_string())?;
                Ok(Self::Order(Box::new(event)))
            },
        }
    }
}

/// Keeps the change feed connected for as long as the session is listening.
pub fn spawn_feed_listener(client: Arc<StaffClient>, tx: mpsc::Sender<SessionInput>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = MIN_BACKOFF;
        loop {
            let reason = match client.open_feed().await {
                Ok(res) => {
                    info!("🖥️ Connected to the change feed");
                    backoff = MIN_BACKOFF;
                    let mut parser = SseParser::default();
                    let mut stream = res.bytes_stream();
                    loop {
                        match stream.next().await {
                            Some(Ok(chunk)) => {
                                for msg in parser.push(&chunk) {
                                    match FeedMessage::try_from(msg) {
                                        Ok(m) => {
                                            if tx.send(SessionInput::Feed(m)).await.is_err() {
                                                return;
                                            }
                                        },
                                        Err(e) => warn!("🖥️ Skipping unreadable feed message. {e}"),
                                    }
                                }
                            },
                            Some(Err(e)) => break e.to_string(),
                            None => break "The server closed the change feed".to_string(),
                        }
                    }
                },
                Err(e) => e.to_string(),
            };
            if tx.send(SessionInput::FeedDown(reason)).await.is_err() {
                return;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    })
}
