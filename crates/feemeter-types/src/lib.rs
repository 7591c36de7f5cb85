//! # feemeter-types
//!
//! Shared domain types used across the feemeter workspace: identities, feed
//! identifiers, normalized prices, the audit records emitted by the commission
//! engine and the injected clock.

pub mod clock;
pub mod events;
pub mod identity;
pub mod price;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{AnomalyRecord, DistributionRecord, Event, EventSink, MemorySink, NullSink};
pub use identity::{ensure_any, ensure_identity, AuthError, FeedId, Identity};
pub use price::{NormalizedPrice, PricePoint, RawPrice};

/// Fractional digits carried by every normalized price and USD amount.
pub const PRICE_DECIMALS: u32 = 8;

/// Fixed-point scale for prices and USD amounts (1 USD = 100,000,000 units).
pub const PRICE_SCALE: u64 = 100_000_000;

/// Seconds in a (non-leap) year, used for commission accrual.
pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;
