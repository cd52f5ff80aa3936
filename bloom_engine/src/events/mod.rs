mod channel;
mod event_types;
mod feed;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use feed::ChangeFeed;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
