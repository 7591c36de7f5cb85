//! Opt-in cached price fallback.
//!
//! Validation failures surface to the caller by default. A caller that
//! prefers continuity may route results through a [`PriceCache`]: the last
//! validated price stands in for a failed read as long as it is no older
//! than `max_cache_age_secs`.

use feemeter_types::NormalizedPrice;

use crate::{OracleError, Result};

/// Last-good-price cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceCache {
    last: Option<NormalizedPrice>,
    max_cache_age_secs: u64,
}

impl PriceCache {
    /// An empty cache serving prices up to `max_cache_age_secs` old.
    pub fn new(max_cache_age_secs: u64) -> Self {
        Self {
            last: None,
            max_cache_age_secs,
        }
    }

    /// The cached price, if any.
    pub fn last(&self) -> Option<&NormalizedPrice> {
        self.last.as_ref()
    }

    /// Remember a successful read, or substitute the cached price for a
    /// failed one.
    ///
    /// Only feed-quality failures are covered: stale, unreliable, deviating
    /// or unavailable prices. Anything else passes through untouched.
    ///
    /// # Errors
    ///
    /// The original error when it is not covered or the cache is empty or too old.
    pub fn resolve(&mut self, fresh: Result<NormalizedPrice>, now: u64) -> Result<NormalizedPrice> {
        let err = match fresh {
            Ok(price) => {
                self.last = Some(price);
                return Ok(price);
            }
            Err(err) => err,
        };

        let covered = matches!(
            err,
            OracleError::Stale { .. }
                | OracleError::Unreliable { .. }
                | OracleError::DeviationExceeded { .. }
                | OracleError::Source(_)
        );
        if !covered {
            return Err(err);
        }

        match self.last {
            Some(cached) if now.saturating_sub(cached.observed_at) <= self.max_cache_age_secs => {
                tracing::warn!(
                    error = %err,
                    cached = cached.value,
                    cached_at = cached.observed_at,
                    "using cached price"
                );
                Ok(cached)
            }
            _ => Err(err),
        }
    }
}
