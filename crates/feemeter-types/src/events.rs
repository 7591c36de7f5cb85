//! Facts emitted for external observers.
//!
//! A [`DistributionRecord`] is the sole audit trail of the commission engine;
//! an [`AnomalyRecord`] flags a large price jump seen by monitoring. Both are
//! wrapped in [`Event`] and handed to an [`EventSink`].

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::price::NormalizedPrice;

/// Outcome of one committed distribution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRecord {
    /// Asset amount paid to the operator.
    pub paid_asset: u64,
    /// Asset amount swept to the manager after the operator was paid in full.
    pub remainder_asset: u64,
    /// USD owed at distribution time, including carried debt.
    pub owed_usd: u64,
    /// USD value of `paid_asset` at `price_used`.
    pub paid_usd: u64,
    /// USD debt carried forward after this distribution.
    pub debt_usd: u64,
    /// Price used for the USD/asset conversion.
    pub price_used: NormalizedPrice,
    pub timestamp: u64,
}

/// A price jump larger than the monitoring threshold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub price: u64,
    pub previous_price: u64,
    pub change_pct: u64,
    pub timestamp: u64,
}

/// Every fact the core emits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum Event {
    Distribution(DistributionRecord),
    Anomaly(AnomalyRecord),
    BreakerPaused { until: u64, timestamp: u64 },
    BreakerResumed { timestamp: u64 },
}

impl Event {
    /// Stable name of the event variant.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Distribution(_) => "distribution",
            Event::Anomaly(_) => "anomaly",
            Event::BreakerPaused { .. } => "breaker_paused",
            Event::BreakerResumed { .. } => "breaker_resumed",
        }
    }
}

/// Receiver of emitted events. Transport is up to the implementor.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Buffers events in memory. Useful in tests and for batch export.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all buffered events, leaving the buffer empty.
    pub fn drain(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether no events are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
