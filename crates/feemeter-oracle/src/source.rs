//! Price source seam.
//!
//! The transport behind a feed is not part of this crate. A [`PriceSource`]
//! hands back the latest raw sample it holds for a feed; the caller always
//! re-validates it with [`crate::validator`].
//!
//! [`StaticPriceSource`] serves samples that were pushed into it in-process.
//! It backs the daemon until a networked source is plugged in, and drives
//! tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use feemeter_types::{FeedId, RawPrice};

/// Price source failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The source has no data for the feed.
    #[error("feed {0} not found")]
    NotFound(FeedId),

    /// The source could not be reached or returned garbage.
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Supplies raw samples for a feed.
pub trait PriceSource: Send + Sync {
    /// Fetch the latest sample for `feed`.
    ///
    /// `max_age_secs` is a hint: sources may refuse to return older data,
    /// but the core never relies on it.
    fn fetch(&self, feed: &FeedId, max_age_secs: u64) -> Result<RawPrice, SourceError>;
}

impl<T: PriceSource + ?Sized> PriceSource for Arc<T> {
    fn fetch(&self, feed: &FeedId, max_age_secs: u64) -> Result<RawPrice, SourceError> {
        (**self).fetch(feed, max_age_secs)
    }
}

impl<T: PriceSource + ?Sized> PriceSource for Box<T> {
    fn fetch(&self, feed: &FeedId, max_age_secs: u64) -> Result<RawPrice, SourceError> {
        (**self).fetch(feed, max_age_secs)
    }
}

/// A source holding samples set in-process.
#[derive(Debug, Default)]
pub struct StaticPriceSource {
    prices: RwLock<HashMap<FeedId, RawPrice>>,
    outage: RwLock<Option<String>>,
}

impl StaticPriceSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source holding one sample.
    pub fn with_price(feed: FeedId, sample: RawPrice) -> Self {
        let source = Self::new();
        source.set_price(feed, sample);
        source
    }

    /// Replace the sample for `feed`.
    pub fn set_price(&self, feed: FeedId, sample: RawPrice) {
        tracing::debug!(%feed, price = sample.price, expo = sample.expo, "static source: sample set");
        match self.prices.write() {
            Ok(mut prices) => {
                prices.insert(feed, sample);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(feed, sample);
            }
        }
    }

    /// Simulate an outage (`Some(reason)`) or clear it (`None`).
    pub fn set_outage(&self, reason: Option<String>) {
        if let Some(ref reason) = reason {
            tracing::warn!(reason = %reason, "static source: outage simulated");
        }
        match self.outage.write() {
            Ok(mut outage) => *outage = reason,
            Err(poisoned) => *poisoned.into_inner() = reason,
        }
    }
}

impl PriceSource for StaticPriceSource {
    fn fetch(&self, feed: &FeedId, _max_age_secs: u64) -> Result<RawPrice, SourceError> {
        let outage = self
            .outage
            .read()
            .map_err(|_| SourceError::Unavailable("lock poisoned".to_string()))?;
        if let Some(reason) = outage.as_ref() {
            return Err(SourceError::Unavailable(reason.clone()));
        }
        let prices = self
            .prices
            .read()
            .map_err(|_| SourceError::Unavailable("lock poisoned".to_string()))?;
        prices.get(feed).copied().ok_or(SourceError::NotFound(*feed))
    }
}
