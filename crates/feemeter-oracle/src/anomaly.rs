//! Large-jump monitoring.
//!
//! The monitor runs on every observed price and reports jumps above its
//! threshold as [`AnomalyRecord`]s. It is independent of the circuit
//! breaker: it never blocks anything and always moves its reference to the
//! latest price.

use feemeter_types::{AnomalyRecord, NormalizedPrice};

use crate::deviation::change_pct;

/// Default anomaly threshold (percent).
pub const DEFAULT_ANOMALY_THRESHOLD_PCT: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnomalyMonitor {
    threshold_pct: u64,
    previous: Option<NormalizedPrice>,
}

impl AnomalyMonitor {
    /// A monitor flagging moves larger than `threshold_pct`.
    pub fn new(threshold_pct: u64) -> Self {
        Self {
            threshold_pct,
            previous: None,
        }
    }

    /// Largest move not reported, in percent.
    pub fn threshold_pct(&self) -> u64 {
        self.threshold_pct
    }

    /// Feed the next price; returns a record if it jumped past the threshold.
    pub fn observe(&mut self, price: &NormalizedPrice) -> Option<AnomalyRecord> {
        let previous = self.previous.replace(*price)?;
        let change = change_pct(previous.value, price.value)?;
        if change <= self.threshold_pct {
            return None;
        }

        tracing::warn!(
            price = price.value,
            previous = previous.value,
            change_pct = change,
            "price anomaly detected"
        );
        Some(AnomalyRecord {
            price: price.value,
            previous_price: previous.value,
            change_pct: change,
            timestamp: price.observed_at,
        })
    }
}

impl Default for AnomalyMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_ANOMALY_THRESHOLD_PCT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_is_quiet() {
        let mut monitor = AnomalyMonitor::new(10);
        assert!(monitor.observe(&NormalizedPrice::new(100, 1)).is_none());
    }

    #[test]
    fn test_jump_reported() {
        let mut monitor = AnomalyMonitor::new(10);
        monitor.observe(&NormalizedPrice::new(100, 1));
        let record = monitor
            .observe(&NormalizedPrice::new(150, 2))
            .expect("anomaly");
        assert_eq!(
            record,
            AnomalyRecord {
                price: 150,
                previous_price: 100,
                change_pct: 50,
                timestamp: 2
            }
        );
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut monitor = AnomalyMonitor::new(10);
        monitor.observe(&NormalizedPrice::new(100, 1));
        assert!(monitor.observe(&NormalizedPrice::new(110, 2)).is_none());
    }

    #[test]
    fn test_reference_always_advances() {
        let mut monitor = AnomalyMonitor::new(10);
        monitor.observe(&NormalizedPrice::new(100, 1));
        assert!(monitor.observe(&NormalizedPrice::new(200, 2)).is_some());
        // Compared against 200 now, not 100.
        assert!(monitor.observe(&NormalizedPrice::new(205, 3)).is_none());
    }
}
