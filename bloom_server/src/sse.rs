//! Server-Sent Events framing for the change feed.
//!
//! Each frame is `event: <kind>\ndata: <json>\n\n`. A `ready` frame is sent as soon as a client connects, so that it
//! knows to re-fetch current state. A `lagged` frame tells the client that it fell behind and missed events. Comment
//! frames keep idle connections open through proxies.
use std::time::Duration;

use bloom_engine::events::{OrderEvent, OrderEventKind};
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use log::*;
use tokio::sync::broadcast::{error::RecvError, Receiver};

pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub fn event_name(kind: OrderEventKind) -> &'static str {
    match kind {
        OrderEventKind::Created => "created",
        OrderEventKind::Paid => "paid",
        OrderEventKind::PaymentFailed => "payment_failed",
        OrderEventKind::StatusChanged => "status_changed",
    }
}

pub fn ready_frame() -> Bytes {
    Bytes::from_static(b"event: ready\ndata: {}\n\n")
}

pub fn keep_alive_frame() -> Bytes {
    Bytes::from_static(b": keep-alive\n\n")
}

pub fn lagged_frame(missed: u64) -> Bytes {
    Bytes::from(format!("event: lagged\ndata: {{\"missed\":{missed}}}\n\n"))
}

pub fn event_frame(event: &OrderEvent) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(event)?;
    Ok(Bytes::from(format!("event: {}\ndata: {json}\n\n", event_name(event.kind))))
}

/// Turns a change-feed subscription into an endless stream of SSE frames. The stream ends when the feed closes.
pub fn feed_stream(
    rx: Receiver<OrderEvent>,
    keep_alive: Duration,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    let events = stream::unfold(rx, move |mut rx| async move {
        let frame = match tokio::time::timeout(keep_alive, rx.recv()).await {
            Err(_) => keep_alive_frame(),
            Ok(Ok(event)) => match event_frame(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("📬️ Could not serialize the event for order #{}. {e}", event.order_id);
                    keep_alive_frame()
                },
            },
            Ok(Err(RecvError::Lagged(n))) => {
                warn!("📬️ A feed subscriber fell behind and missed {n} events");
                lagged_frame(n)
            },
            Ok(Err(RecvError::Closed)) => {
                debug!("📬️ Change feed closed. Ending the stream.");
                return None;
            },
        };
        Some((Ok(frame), rx))
    });
    stream::once(async { Ok(ready_frame()) }).chain(events)
}
