//! Staleness and confidence validation.
//!
//! Every price the commission engine uses passes through [`validate`]. The
//! checks run in a fixed order:
//!
//! 1. staleness: `now - publish_time > max_age` rejects (equality passes)
//! 2. sign: negative prices reject
//! 3. confidence: `conf * 100 / price > max_confidence_pct` rejects; a zero
//!    price always rejects
//!
//! Nothing is retried here. Callers that want resilience opt into
//! [`crate::fallback::PriceCache`] explicitly.

use feemeter_types::{ensure_identity, Identity, NormalizedPrice, RawPrice};
use serde::{Deserialize, Serialize};

use crate::normalizer::normalize;
use crate::{OracleError, Result};

/// Default maximum price age in seconds.
pub const DEFAULT_MAX_AGE_SECS: u64 = 60;

/// Default maximum confidence interval as a percentage of price.
pub const DEFAULT_MAX_CONFIDENCE_PCT: u64 = 2;

/// Validate a raw sample and normalize it.
///
/// A `publish_time` in the future counts as age zero.
///
/// # Errors
///
/// - [`OracleError::Stale`] if the sample is older than `max_age_secs`
/// - [`OracleError::NegativePrice`] if the sample price is negative
/// - [`OracleError::Unreliable`] if the confidence is too wide or the price is zero
/// - [`OracleError::NormalizationOverflow`] if the price does not fit 8 decimals
pub fn validate(
    sample: &RawPrice,
    now: u64,
    max_age_secs: u64,
    max_confidence_pct: u64,
) -> Result<NormalizedPrice> {
    let age = now.saturating_sub(sample.publish_time);
    if age > max_age_secs {
        return Err(OracleError::Stale {
            publish_time: sample.publish_time,
            now,
            max_age: max_age_secs,
        });
    }

    if sample.price < 0 {
        return Err(OracleError::NegativePrice(sample.price));
    }
    let magnitude = sample.price.unsigned_abs();

    let unreliable = || OracleError::Unreliable {
        conf: sample.conf,
        price: magnitude,
        max_pct: max_confidence_pct,
    };

    if magnitude == 0 {
        return Err(unreliable());
    }
    let conf_pct = sample.conf as u128 * 100 / magnitude as u128;
    if conf_pct > max_confidence_pct as u128 {
        return Err(unreliable());
    }

    let price = normalize(magnitude as u128, sample.expo, sample.publish_time)?;
    // Too small to survive 8 decimals: treat like a zero price.
    if price.value == 0 {
        return Err(unreliable());
    }

    tracing::debug!(price = price.value, age, conf_pct = conf_pct as u64, "price validated");
    Ok(price)
}

/// Validation policy for one deployment.
///
/// Only the admin may change the limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    admin: Identity,
    max_age_secs: u64,
    max_confidence_pct: u64,
}

impl OracleConfig {
    /// Create a config with explicit limits.
    pub fn new(admin: Identity, max_age_secs: u64, max_confidence_pct: u64) -> Self {
        Self {
            admin,
            max_age_secs,
            max_confidence_pct,
        }
    }

    /// Create a config with [`DEFAULT_MAX_AGE_SECS`] and [`DEFAULT_MAX_CONFIDENCE_PCT`].
    pub fn with_defaults(admin: Identity) -> Self {
        Self::new(admin, DEFAULT_MAX_AGE_SECS, DEFAULT_MAX_CONFIDENCE_PCT)
    }

    /// Validate `sample` against this config's limits.
    pub fn validate(&self, sample: &RawPrice, now: u64) -> Result<NormalizedPrice> {
        validate(sample, now, self.max_age_secs, self.max_confidence_pct)
    }

    /// Change the maximum accepted price age.
    ///
    /// # Errors
    ///
    /// [`OracleError::Unauthorized`] if `caller` is not the admin.
    pub fn set_max_age(&mut self, caller: &Identity, max_age_secs: u64) -> Result<()> {
        ensure_identity(caller, &self.admin)?;
        tracing::info!(
            old = self.max_age_secs,
            new = max_age_secs,
            "oracle max age updated"
        );
        self.max_age_secs = max_age_secs;
        Ok(())
    }

    /// Change the maximum accepted confidence percentage.
    ///
    /// The percentage is compared in whole percent, so `0` is the strictest
    /// policy: it accepts only intervals narrower than 1% of the price.
    ///
    /// # Errors
    ///
    /// [`OracleError::Unauthorized`] if `caller` is not the admin.
    pub fn set_max_confidence_pct(&mut self, caller: &Identity, pct: u64) -> Result<()> {
        ensure_identity(caller, &self.admin)?;
        tracing::info!(
            old = self.max_confidence_pct,
            new = pct,
            "oracle max confidence updated"
        );
        self.max_confidence_pct = pct;
        Ok(())
    }

    /// Identity allowed to change the limits.
    pub fn admin(&self) -> &Identity {
        &self.admin
    }

    /// Oldest accepted sample age, in seconds.
    pub fn max_age_secs(&self) -> u64 {
        self.max_age_secs
    }

    /// Widest accepted confidence interval, in whole percent of the price.
    pub fn max_confidence_pct(&self) -> u64 {
        self.max_confidence_pct
    }
}
