//! Price representations.

use serde::{Deserialize, Serialize};

/// A raw sample as delivered by a price source.
///
/// `price` and `conf` share the same exponent `expo`, so the real price is
/// `price * 10^expo`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPrice {
    /// Signed price in feed units.
    pub price: i64,
    /// Confidence interval (plus/minus) in feed units.
    pub conf: u64,
    /// Decimal exponent applied to `price` and `conf`.
    pub expo: i32,
    /// Unix timestamp at which the source published the sample.
    pub publish_time: u64,
}

/// A price scaled to 8 fractional digits.
///
/// Produced once by the normalizer and never mutated afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPrice {
    /// Price in units of 10^-8 USD.
    pub value: u64,
    /// Unix timestamp at which the price was observed.
    pub observed_at: u64,
}

/// One entry of a price history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub value: u64,
    pub timestamp: u64,
}

impl NormalizedPrice {
    /// A price of `value` (8 decimals) observed at `observed_at`.
    pub const fn new(value: u64, observed_at: u64) -> Self {
        Self { value, observed_at }
    }
}

impl From<NormalizedPrice> for PricePoint {
    fn from(price: NormalizedPrice) -> Self {
        Self {
            value: price.value,
            timestamp: price.observed_at,
        }
    }
}

impl From<PricePoint> for NormalizedPrice {
    fn from(point: PricePoint) -> Self {
        Self {
            value: point.value,
            observed_at: point.timestamp,
        }
    }
}
