//! # feemeter-oracle
//!
//! Price validation pipeline for the commission engine.
//!
//! Raw samples from a [`source::PriceSource`] are normalized to 8 decimals,
//! checked for staleness and confidence, optionally cross-checked against a
//! second source, smoothed by a bounded price history and finally gated by
//! the circuit breaker before anything moves funds.
//!
//! ## Modules
//!
//! - [`normalizer`]: raw price + exponent to fixed 8-decimal value
//! - [`validator`]: staleness and confidence checks, [`validator::OracleConfig`]
//! - [`source`]: the price source seam and a static in-process source
//! - [`deviation`]: percentage change and the two-source deviation check
//! - [`fallback`]: opt-in cached price on validation failure
//! - [`twap`]: bounded price history and windowed averages
//! - [`circuit_breaker`]: change-threshold breaker with manual pause
//! - [`anomaly`]: large-jump monitoring

pub mod anomaly;
pub mod circuit_breaker;
pub mod deviation;
pub mod fallback;
pub mod normalizer;
pub mod source;
pub mod twap;
pub mod validator;

use feemeter_types::AuthError;

pub use source::SourceError;

/// Error types for oracle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// The source reported a negative price.
    #[error("negative price: {0}")]
    NegativePrice(i64),

    /// A price of zero where a divisor is required.
    #[error("invalid price: {0}")]
    InvalidPrice(u64),

    /// Normalizing the raw price does not fit the fixed-point range.
    #[error("price {raw} with exponent {expo} overflows the normalized range")]
    NormalizationOverflow {
        /// Raw magnitude.
        raw: u128,
        /// Exponent reported by the source.
        expo: i32,
    },

    /// Price is older than the configured maximum age.
    #[error("price is stale: published {publish_time}, now {now}, max age {max_age}s")]
    Stale {
        /// Publish time of the sample.
        publish_time: u64,
        /// Current time.
        now: u64,
        /// Maximum accepted age in seconds.
        max_age: u64,
    },

    /// Confidence interval too wide relative to the price.
    #[error("price is unreliable: confidence {conf} on price {price} exceeds {max_pct}%")]
    Unreliable {
        /// Reported confidence interval.
        conf: u64,
        /// Reported price magnitude.
        price: u64,
        /// Maximum accepted confidence percentage.
        max_pct: u64,
    },

    /// Primary and secondary sources disagree by more than allowed.
    #[error("sources deviate by {deviation_pct}% (max {max_pct}%)")]
    DeviationExceeded {
        /// Observed deviation.
        deviation_pct: u64,
        /// Maximum accepted deviation.
        max_pct: u64,
    },

    /// The price source failed.
    #[error("price source: {0}")]
    Source(#[from] SourceError),

    /// Observation timestamp went backwards.
    #[error("non-monotonic timestamp: {new} < {last}")]
    NonMonotonicTimestamp {
        /// The rejected timestamp.
        new: u64,
        /// The newest accepted timestamp.
        last: u64,
    },

    /// No price has ever been recorded.
    #[error("no observations in price history")]
    EmptyWindow,

    /// The circuit breaker is manually paused.
    #[error("circuit breaker paused until {until}")]
    Paused {
        /// End of the pause.
        until: u64,
    },

    /// Price moved more than the breaker allows since the last accepted price.
    #[error("price change {change_pct}% from baseline {baseline} exceeds {max_pct}%")]
    ThresholdExceeded {
        /// Rejected price.
        price: u64,
        /// Baseline it was compared against.
        baseline: u64,
        /// Observed change.
        change_pct: u64,
        /// Configured maximum.
        max_pct: u64,
    },

    /// Caller is not the oracle or breaker admin.
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;
