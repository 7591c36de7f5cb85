//! Bounded price history and windowed averages.
//!
//! A [`PriceHistory`] keeps the last `capacity` validated prices in
//! chronological order and evicts the oldest when full.
//!
//! The default average ([`TwapMode::Arithmetic`]) is the plain mean of every
//! point inside the window:
//!
//! ```text
//! avg = sum(price_i) / n      for timestamp_i >= now - duration
//! ```
//!
//! [`TwapMode::TimeWeighted`] weights each point by how long it prevailed:
//!
//! ```text
//! TWAP = sum(price_i * duration_i) / sum(duration_i)
//! ```
//!
//! where `duration_i` runs to the next point, and the newest point runs until
//! `now`. Both modes return the most recently recorded price when the window
//! holds no points.

use std::collections::VecDeque;

use feemeter_types::{NormalizedPrice, PricePoint};
use serde::{Deserialize, Serialize};

use crate::{OracleError, Result};

/// Default number of points retained.
pub const DEFAULT_CAPACITY: usize = 10;

/// How a windowed price is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwapMode {
    /// Unweighted mean of the points in the window.
    #[default]
    Arithmetic,
    /// Mean weighted by how long each point prevailed.
    TimeWeighted,
}

/// Capacity-bounded, time-ordered price history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceHistory {
    points: VecDeque<PricePoint>,
    capacity: usize,
}

impl PriceHistory {
    /// Create an empty history.
    ///
    /// # Errors
    ///
    /// [`OracleError::InvalidConfig`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(OracleError::InvalidConfig(
                "price history capacity must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Append a validated price, evicting the oldest point when full.
    ///
    /// # Errors
    ///
    /// [`OracleError::NonMonotonicTimestamp`] if `price` is older than the
    /// newest recorded point. Equal timestamps are accepted.
    pub fn record(&mut self, price: NormalizedPrice) -> Result<()> {
        if let Some(last) = self.points.back() {
            if price.observed_at < last.timestamp {
                return Err(OracleError::NonMonotonicTimestamp {
                    new: price.observed_at,
                    last: last.timestamp,
                });
            }
        }
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(price.into());
        Ok(())
    }

    /// The most recently recorded price.
    pub fn latest(&self) -> Option<NormalizedPrice> {
        self.points.back().map(|p| (*p).into())
    }

    /// Number of recorded points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Maximum number of points retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Points from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.iter()
    }

    /// Average over the window using `mode`.
    pub fn average(&self, mode: TwapMode, duration_secs: u64, now: u64) -> Result<NormalizedPrice> {
        match mode {
            TwapMode::Arithmetic => self.windowed_average(duration_secs, now),
            TwapMode::TimeWeighted => self.time_weighted_average(duration_secs, now),
        }
    }

    /// Unweighted mean of the points with `timestamp >= now - duration_secs`.
    ///
    /// The result carries the timestamp of the newest point used.
    ///
    /// # Errors
    ///
    /// [`OracleError::EmptyWindow`] if nothing was ever recorded.
    pub fn windowed_average(&self, duration_secs: u64, now: u64) -> Result<NormalizedPrice> {
        let window = self.window(duration_secs, now);
        let Some(newest) = window.last() else {
            return self.latest().ok_or(OracleError::EmptyWindow);
        };

        let sum: u128 = window.iter().map(|p| p.value as u128).sum();
        let mean = sum / window.len() as u128;

        // The mean of u64 values always fits u64.
        Ok(NormalizedPrice::new(mean as u64, newest.timestamp))
    }

    /// Time-weighted mean over the window.
    ///
    /// Falls back to the arithmetic mean when the points cover no time at all
    /// (every point at `now`), and to the latest price when the window is empty.
    ///
    /// # Errors
    ///
    /// [`OracleError::EmptyWindow`] if nothing was ever recorded.
    pub fn time_weighted_average(&self, duration_secs: u64, now: u64) -> Result<NormalizedPrice> {
        let window = self.window(duration_secs, now);
        let Some(newest) = window.last() else {
            return self.latest().ok_or(OracleError::EmptyWindow);
        };

        let mut weighted_sum: u128 = 0;
        let mut total_duration: u128 = 0;

        for (i, point) in window.iter().enumerate() {
            let until = window.get(i + 1).map_or(now, |next| next.timestamp);
            let duration = until.saturating_sub(point.timestamp) as u128;
            weighted_sum = weighted_sum.saturating_add(point.value as u128 * duration);
            total_duration = total_duration.saturating_add(duration);
        }

        if total_duration == 0 {
            return self.windowed_average(duration_secs, now);
        }

        // Integer division; truncates toward zero
        let twap = weighted_sum / total_duration;
        Ok(NormalizedPrice::new(twap as u64, newest.timestamp))
    }

    /// Points inside the window, oldest first.
    fn window(&self, duration_secs: u64, now: u64) -> Vec<PricePoint> {
        let start = now.saturating_sub(duration_secs);
        let mut window: Vec<PricePoint> = self
            .points
            .iter()
            .rev()
            .take_while(|p| p.timestamp >= start)
            .copied()
            .collect();
        window.reverse();
        window
    }
}

impl Default for PriceHistory {
    fn default() -> Self {
        Self {
            points: VecDeque::with_capacity(DEFAULT_CAPACITY),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(value: u64, at: u64) -> NormalizedPrice {
        NormalizedPrice::new(value, at)
    }

    fn history(points: &[(u64, u64)]) -> PriceHistory {
        let mut h = PriceHistory::default();
        for &(value, at) in points {
            h.record(p(value, at)).expect("record");
        }
        h
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            PriceHistory::new(0),
            Err(OracleError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_fifo_eviction() {
        let mut h = PriceHistory::new(3).expect("history");
        for i in 0..5 {
            h.record(p(100 + i, i)).expect("record");
        }
        assert_eq!(h.len(), 3);
        let values: Vec<u64> = h.iter().map(|pt| pt.value).collect();
        assert_eq!(values, vec![102, 103, 104]);
    }

    #[test]
    fn test_non_monotonic_rejected() {
        let mut h = history(&[(100, 50)]);
        let err = h.record(p(100, 49)).unwrap_err();
        assert_eq!(err, OracleError::NonMonotonicTimestamp { new: 49, last: 50 });
        // Equal timestamps are fine
        h.record(p(101, 50)).expect("equal timestamp");
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn test_windowed_average() {
        let h = history(&[(100, 10), (200, 20), (300, 30), (600, 40)]);
        // Window [25, 40] holds 300 and 600.
        let avg = h.windowed_average(15, 40).expect("average");
        assert_eq!(avg, p(450, 40));
        // Window covers everything.
        let avg = h.windowed_average(1_000, 40).expect("average");
        assert_eq!(avg.value, 300);
    }

    #[test]
    fn test_window_start_is_inclusive() {
        let h = history(&[(100, 10), (300, 20)]);
        assert_eq!(h.windowed_average(10, 20).expect("average").value, 200);
    }

    #[test]
    fn test_empty_window_falls_back_to_latest() {
        let h = history(&[(100, 10), (200, 20)]);
        let avg = h.windowed_average(5, 1_000).expect("fallback");
        assert_eq!(avg, p(200, 20));
        let twap = h.time_weighted_average(5, 1_000).expect("fallback");
        assert_eq!(twap, p(200, 20));
    }

    #[test]
    fn test_empty_history() {
        let h = PriceHistory::default();
        assert_eq!(h.windowed_average(60, 100).unwrap_err(), OracleError::EmptyWindow);
        assert_eq!(
            h.time_weighted_average(60, 100).unwrap_err(),
            OracleError::EmptyWindow
        );
    }

    #[test]
    fn test_time_weighted_average() {
        // 100 for 30s, 200 for 10s
        let h = history(&[(100, 0), (200, 30)]);
        let twap = h.time_weighted_average(1_000, 40).expect("twap");
        assert_eq!(twap, p(125, 30));
        // Same points, arithmetic mean differs.
        assert_eq!(h.windowed_average(1_000, 40).expect("avg").value, 150);
    }

    #[test]
    fn test_time_weighted_all_at_now() {
        let h = history(&[(100, 50), (300, 50)]);
        let twap = h.time_weighted_average(10, 50).expect("twap");
        assert_eq!(twap.value, 200);
    }

    #[test]
    fn test_average_dispatch() {
        let h = history(&[(100, 0), (200, 30)]);
        assert_eq!(h.average(TwapMode::Arithmetic, 1_000, 40).expect("avg").value, 150);
        assert_eq!(h.average(TwapMode::TimeWeighted, 1_000, 40).expect("twap").value, 125);
    }

    #[test]
    fn test_large_values() {
        let h = history(&[(u64::MAX, 0), (u64::MAX, 1), (u64::MAX, 2)]);
        assert_eq!(h.windowed_average(10, 2).expect("avg").value, u64::MAX);
        assert_eq!(h.time_weighted_average(10, 3).expect("twap").value, u64::MAX);
    }
}
