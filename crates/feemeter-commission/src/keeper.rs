//! Transaction-atomic orchestration.
//!
//! A [`Keeper`] owns every piece of state for one deployment: oracle policy,
//! price history, circuit breaker, anomaly monitor and commission engine.
//! Each public method is one transaction. It either commits all of its
//! effects or returns an error with the keeper unchanged. Events are emitted
//! only after a commit.
//!
//! Distribution-type operations run in two steps:
//!
//! 1. an observation (fetch, validate, optional deviation check and cache,
//!    record in history, anomaly monitoring), committed on its own, exactly as
//!    [`Keeper::observe`] would;
//! 2. the engine call, priced at the spot or the windowed price.
//!
//! A breaker rejection in step 2 therefore does not hide an anomaly found in
//! step 1.
//!
//! Callers wrap the keeper in a single mutex (or run it on one thread); it
//! never blocks internally.

use std::sync::Arc;

use feemeter_oracle::anomaly::{AnomalyMonitor, DEFAULT_ANOMALY_THRESHOLD_PCT};
use feemeter_oracle::circuit_breaker::{BreakerMode, CircuitBreaker};
use feemeter_oracle::deviation::check_deviation;
use feemeter_oracle::fallback::PriceCache;
use feemeter_oracle::source::PriceSource;
use feemeter_oracle::twap::{PriceHistory, TwapMode, DEFAULT_CAPACITY};
use feemeter_oracle::validator::OracleConfig;
use feemeter_types::{DistributionRecord, Event, EventSink, FeedId, Identity, NormalizedPrice};
use serde::{Deserialize, Serialize};

use crate::engine::{CommissionConfig, CommissionEngine};
use crate::ledger::Ledger;
use crate::Result;

/// Default maximum disagreement between primary and secondary source (percent).
pub const DEFAULT_MAX_DEVIATION_PCT: u64 = 1;

/// Which price the engine converts at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PricingMode {
    /// The freshly validated price.
    #[default]
    Spot,
    /// The history's average over `window_secs`.
    Twap { window_secs: u64, mode: TwapMode },
}

/// Tunables of the observation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeeperSettings {
    pub pricing: PricingMode,
    pub max_deviation_pct: u64,
    /// `Some(age)` enables the cached-price fallback.
    pub cache_max_age_secs: Option<u64>,
    pub anomaly_threshold_pct: u64,
    pub history_capacity: usize,
}

impl Default for KeeperSettings {
    fn default() -> Self {
        Self {
            pricing: PricingMode::Spot,
            max_deviation_pct: DEFAULT_MAX_DEVIATION_PCT,
            cache_max_age_secs: None,
            anomaly_threshold_pct: DEFAULT_ANOMALY_THRESHOLD_PCT,
            history_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Where prices come from.
pub struct PriceSources {
    pub feed: FeedId,
    pub primary: Box<dyn PriceSource>,
    /// Cross-checked against the primary when present.
    pub secondary: Option<Box<dyn PriceSource>>,
}

/// Mutable observation state, staged and committed as a unit.
#[derive(Debug, Clone)]
struct Observation {
    history: PriceHistory,
    monitor: AnomalyMonitor,
    cache: Option<PriceCache>,
}

/// One deployment's commission pipeline.
pub struct Keeper<L> {
    sources: PriceSources,
    pricing: PricingMode,
    max_deviation_pct: u64,
    oracle: OracleConfig,
    observation: Observation,
    breaker: CircuitBreaker,
    engine: CommissionEngine<L>,
    events: Arc<dyn EventSink>,
}

impl<L: Ledger> Keeper<L> {
    /// Assemble a keeper.
    ///
    /// # Errors
    ///
    /// [`crate::CommissionError::Oracle`] if the history capacity is zero.
    pub fn new(
        sources: PriceSources,
        settings: KeeperSettings,
        oracle: OracleConfig,
        breaker: CircuitBreaker,
        engine: CommissionEngine<L>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let observation = Observation {
            history: PriceHistory::new(settings.history_capacity)?,
            monitor: AnomalyMonitor::new(settings.anomaly_threshold_pct),
            cache: settings.cache_max_age_secs.map(PriceCache::new),
        };
        Ok(Self {
            sources,
            pricing: settings.pricing,
            max_deviation_pct: settings.max_deviation_pct,
            oracle,
            observation,
            breaker,
            engine,
            events,
        })
    }

    /// Fetch, validate and record the current price.
    ///
    /// Emits an anomaly event when the price jumped past the monitor's
    /// threshold; the breaker is not consulted.
    ///
    /// # Errors
    ///
    /// Any validation, deviation or source error not covered by the cache.
    pub fn observe(&mut self, now: u64) -> Result<NormalizedPrice> {
        let mut staged = self.observation.clone();

        let fresh = self.fetch_validated(now);
        let price = match staged.cache.as_mut() {
            Some(cache) => cache.resolve(fresh, now)?,
            None => fresh?,
        };

        let anomaly = if is_new_point(&staged.history, &price) {
            staged.history.record(price)?;
            staged.monitor.observe(&price)
        } else {
            tracing::debug!(price = price.value, at = price.observed_at, "price already recorded");
            None
        };

        self.observation = staged;
        if let Some(record) = anomaly {
            self.events.emit(Event::Anomaly(record));
        }
        Ok(price)
    }

    /// The price the engine would convert at, after observing.
    pub fn current_price(&mut self, now: u64) -> Result<NormalizedPrice> {
        let spot = self.observe(now)?;
        self.pricing_price(spot, now)
    }

    /// Settle the commission accrued up to `now`.
    ///
    /// # Errors
    ///
    /// See [`CommissionEngine::distribute`]; authorization is checked before
    /// anything is observed.
    pub fn distribute(&mut self, caller: &Identity, now: u64) -> Result<DistributionRecord> {
        self.engine.authorize_distribution(caller)?;
        let price = self.current_price(now)?;

        let mode_before = self.breaker.mode();
        let record = self.engine.distribute(caller, &mut self.breaker, &price, now)?;
        self.emit_distribution(mode_before, &record, now);
        Ok(record)
    }

    /// Change the yearly amount after settling at the old rate.
    pub fn set_yearly_amount(&mut self, caller: &Identity, yearly_amount_usd: u64, now: u64) -> Result<DistributionRecord> {
        self.engine.authorize_manager(caller)?;
        let price = self.current_price(now)?;

        let mode_before = self.breaker.mode();
        let record = self
            .engine
            .set_yearly_amount(caller, yearly_amount_usd, &mut self.breaker, &price, now)?;
        self.emit_distribution(mode_before, &record, now);
        Ok(record)
    }

    /// Replace the operator after paying the outgoing one.
    pub fn set_operator(&mut self, caller: &Identity, operator: Identity, now: u64) -> Result<DistributionRecord> {
        self.engine.authorize_manager(caller)?;
        let price = self.current_price(now)?;

        let mode_before = self.breaker.mode();
        let record = self
            .engine
            .set_operator(caller, operator, &mut self.breaker, &price, now)?;
        self.emit_distribution(mode_before, &record, now);
        Ok(record)
    }

    /// Replace the manager.
    pub fn set_manager(&mut self, caller: &Identity, manager: Identity) -> Result<()> {
        self.engine.set_manager(caller, manager)
    }

    /// Pause the breaker for `duration_secs`.
    pub fn emergency_pause(&mut self, caller: &Identity, duration_secs: u64, now: u64) -> Result<u64> {
        let until = self.breaker.emergency_pause(caller, duration_secs, now)?;
        self.events.emit(Event::BreakerPaused {
            until,
            timestamp: now,
        });
        Ok(until)
    }

    /// Lift a breaker pause early.
    pub fn unpause(&mut self, caller: &Identity, now: u64) -> Result<()> {
        let was_paused = matches!(self.breaker.mode(), BreakerMode::ManuallyPaused { .. });
        self.breaker.unpause(caller)?;
        if was_paused {
            self.events.emit(Event::BreakerResumed { timestamp: now });
        }
        Ok(())
    }

    /// Change the breaker's maximum accepted move (admin only).
    pub fn set_max_change_pct(&mut self, caller: &Identity, pct: u64) -> Result<()> {
        Ok(self.breaker.set_max_change_pct(caller, pct)?)
    }

    /// Replace or clear the breaker baseline.
    pub fn reset_baseline(&mut self, caller: &Identity, price: Option<NormalizedPrice>) -> Result<()> {
        Ok(self.breaker.reset_baseline(caller, price)?)
    }

    /// Change the oldest accepted sample age (admin only).
    pub fn set_max_age(&mut self, caller: &Identity, max_age_secs: u64) -> Result<()> {
        Ok(self.oracle.set_max_age(caller, max_age_secs)?)
    }

    /// Change the widest accepted confidence interval (admin only).
    pub fn set_max_confidence_pct(&mut self, caller: &Identity, pct: u64) -> Result<()> {
        Ok(self.oracle.set_max_confidence_pct(caller, pct)?)
    }

    /// USD owed at `now`, debt included.
    pub fn commission_owed_usd(&self, now: u64) -> Result<u64> {
        self.engine.commission_owed_usd(now)
    }

    /// Current commission terms and carried debt.
    pub fn commission(&self) -> &CommissionConfig {
        self.engine.config()
    }

    /// The circuit breaker.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Recorded price history.
    pub fn history(&self) -> &PriceHistory {
        &self.observation.history
    }

    /// Validation limits.
    pub fn oracle(&self) -> &OracleConfig {
        &self.oracle
    }

    /// Which price distributions convert at.
    pub fn pricing(&self) -> PricingMode {
        self.pricing
    }

    /// The commission engine.
    pub fn engine(&self) -> &CommissionEngine<L> {
        &self.engine
    }

    /// Mutable engine access, for funding the vault from outside.
    pub fn engine_mut(&mut self) -> &mut CommissionEngine<L> {
        &mut self.engine
    }

    fn fetch_validated(&self, now: u64) -> feemeter_oracle::Result<NormalizedPrice> {
        let max_age = self.oracle.max_age_secs();
        let raw = self.sources.primary.fetch(&self.sources.feed, max_age)?;
        let price = self.oracle.validate(&raw, now)?;

        match self.sources.secondary.as_ref() {
            Some(secondary) => {
                let raw = secondary.fetch(&self.sources.feed, max_age)?;
                let other = self.oracle.validate(&raw, now)?;
                check_deviation(&price, &other, self.max_deviation_pct)
            }
            None => Ok(price),
        }
    }

    fn pricing_price(&self, spot: NormalizedPrice, now: u64) -> Result<NormalizedPrice> {
        match self.pricing {
            PricingMode::Spot => Ok(spot),
            PricingMode::Twap { window_secs, mode } => {
                Ok(self.observation.history.average(mode, window_secs, now)?)
            }
        }
    }

    fn emit_distribution(&self, mode_before: BreakerMode, record: &DistributionRecord, now: u64) {
        let resumed = matches!(mode_before, BreakerMode::ManuallyPaused { .. })
            && self.breaker.mode() == BreakerMode::Active;
        if resumed {
            self.events.emit(Event::BreakerResumed { timestamp: now });
        }
        self.events.emit(Event::Distribution(record.clone()));
    }
}

/// Whether `price` adds information to `history`.
///
/// Re-reads of the same sample (or a cached price) are skipped, as are
/// samples older than the newest point.
fn is_new_point(history: &PriceHistory, price: &NormalizedPrice) -> bool {
    match history.latest() {
        Some(latest) => {
            price.observed_at > latest.observed_at
                || (price.observed_at == latest.observed_at && price.value != latest.value)
        }
        None => true,
    }
}
