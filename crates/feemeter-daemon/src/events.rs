//! Event bus.
//!
//! Core events are stamped with a sequence number and broadcast to every
//! subscriber. Each subscriber has an independent buffer; a slow one lags and
//! loses the oldest events instead of blocking the keeper.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use feemeter_types::{Event, EventSink};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Position in the emission order, starting at 1.
    pub sequence: u64,
    #[serde(flatten)]
    pub event: Event,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: Event) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(Envelope { sequence, event });
    }
}

/// Log every event as JSON until the bus closes.
pub async fn log_events(mut rx: broadcast::Receiver<Envelope>) {
    loop {
        match rx.recv().await {
            Ok(envelope) => match serde_json::to_string(&envelope) {
                Ok(json) => tracing::info!(target: "feemeter::events", event = envelope.event.name(), "{json}"),
                Err(e) => tracing::error!("failed to encode event: {e}"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
