//! Push-channel wire events and the fan-out sink behind them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::Quote;

/// Frames sent by a listener over `/ws`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
}

/// Frames pushed to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    StockUpdate(Quote),
    Error { message: String },
}

/// Delivers every published quote to every current receiver. Receivers
/// that fall behind lose the oldest updates.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<Quote>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns how many listeners the update was handed to.
    pub fn publish(&self, quote: Quote) -> usize {
        self.sender.send(quote).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Quote> {
        self.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
