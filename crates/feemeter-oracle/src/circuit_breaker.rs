//! Circuit breaker over validated prices.
//!
//! The breaker is checked before any state-changing financial action. It
//! rejects a price that moved more than `max_change_pct` from the last
//! accepted price, and it can be paused by its admin for a fixed duration.
//!
//! ## States
//!
//! ```text
//! Active ──emergency_pause──▶ ManuallyPaused { until }
//!   ▲                               │
//!   └──── now >= until, or unpause ─┘
//! ```
//!
//! A rejected price never replaces the baseline, so a single manipulated
//! sample cannot poison later comparisons. A failed check leaves the breaker
//! exactly as it was.

use feemeter_types::{ensure_identity, Identity, NormalizedPrice};
use serde::{Deserialize, Serialize};

use crate::deviation::change_pct;
use crate::{OracleError, Result};

/// Default maximum accepted change between consecutive prices (percent).
pub const DEFAULT_MAX_CHANGE_PCT: u64 = 20;

/// Breaker mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerMode {
    Active,
    /// Paused by the admin; resumes on its own at `until`.
    ManuallyPaused { until: u64 },
}

/// Outcome of a passed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerCheck {
    /// An expired pause was lifted by this check.
    pub resumed: bool,
    /// Change from the previous baseline; `None` when the price became the
    /// first baseline.
    pub change_pct: Option<u64>,
}

/// Change-threshold circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    mode: BreakerMode,
    last_valid_price: Option<NormalizedPrice>,
    max_change_pct: u64,
    admin: Identity,
}

impl CircuitBreaker {
    /// Create an active breaker with no baseline.
    pub fn new(admin: Identity, max_change_pct: u64) -> Self {
        Self {
            mode: BreakerMode::Active,
            last_valid_price: None,
            max_change_pct,
            admin,
        }
    }

    /// Check `current` against the baseline and adopt it if it passes.
    ///
    /// An expired pause is lifted first. A missing (or zero) baseline is
    /// replaced by `current` without comparison.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Paused`] if paused and `now < until`
    /// - [`OracleError::ThresholdExceeded`] if the change exceeds `max_change_pct`
    ///
    /// On error nothing changes, not even an expired pause.
    pub fn check_and_update(&mut self, current: &NormalizedPrice, now: u64) -> Result<BreakerCheck> {
        let resumed = match self.mode {
            BreakerMode::ManuallyPaused { until } if now < until => {
                return Err(OracleError::Paused { until });
            }
            BreakerMode::ManuallyPaused { .. } => true,
            BreakerMode::Active => false,
        };

        let change = match self.last_valid_price {
            Some(baseline) => change_pct(baseline.value, current.value).map(|pct| (baseline, pct)),
            None => None,
        };

        if let Some((baseline, pct)) = change {
            if pct > self.max_change_pct {
                tracing::warn!(
                    price = current.value,
                    baseline = baseline.value,
                    change_pct = pct,
                    max_change_pct = self.max_change_pct,
                    "circuit breaker: price change rejected"
                );
                return Err(OracleError::ThresholdExceeded {
                    price: current.value,
                    baseline: baseline.value,
                    change_pct: pct,
                    max_pct: self.max_change_pct,
                });
            }
        }

        if resumed {
            tracing::info!(now, "circuit breaker: pause expired, resumed");
            self.mode = BreakerMode::Active;
        }
        if change.is_none() {
            tracing::info!(price = current.value, "circuit breaker: baseline set");
        }
        self.last_valid_price = Some(*current);

        Ok(BreakerCheck {
            resumed,
            change_pct: change.map(|(_, pct)| pct),
        })
    }

    /// Pause the breaker until `now + duration_secs`, whatever its state.
    ///
    /// The baseline is kept. Returns the end of the pause.
    ///
    /// # Errors
    ///
    /// [`OracleError::Unauthorized`] if `caller` is not the admin.
    pub fn emergency_pause(&mut self, caller: &Identity, duration_secs: u64, now: u64) -> Result<u64> {
        ensure_identity(caller, &self.admin)?;
        let until = now.saturating_add(duration_secs);
        tracing::warn!(until, "circuit breaker: emergency pause");
        self.mode = BreakerMode::ManuallyPaused { until };
        Ok(until)
    }

    /// Lift a pause before it expires.
    ///
    /// # Errors
    ///
    /// [`OracleError::Unauthorized`] if `caller` is not the admin.
    pub fn unpause(&mut self, caller: &Identity) -> Result<()> {
        ensure_identity(caller, &self.admin)?;
        tracing::info!("circuit breaker: manually resumed");
        self.mode = BreakerMode::Active;
        Ok(())
    }

    /// Change the maximum accepted change. Applies to the next check.
    ///
    /// # Errors
    ///
    /// [`OracleError::Unauthorized`] if `caller` is not the admin.
    pub fn set_max_change_pct(&mut self, caller: &Identity, pct: u64) -> Result<()> {
        ensure_identity(caller, &self.admin)?;
        tracing::info!(
            old = self.max_change_pct,
            new = pct,
            "circuit breaker: max change updated"
        );
        self.max_change_pct = pct;
        Ok(())
    }

    /// Replace the baseline, or clear it so the next price is adopted as is.
    ///
    /// Used when the market has genuinely moved past the threshold.
    ///
    /// # Errors
    ///
    /// [`OracleError::Unauthorized`] if `caller` is not the admin.
    pub fn reset_baseline(&mut self, caller: &Identity, price: Option<NormalizedPrice>) -> Result<()> {
        ensure_identity(caller, &self.admin)?;
        tracing::warn!(
            old = ?self.last_valid_price.map(|p| p.value),
            new = ?price.map(|p| p.value),
            "circuit breaker: baseline reset"
        );
        self.last_valid_price = price;
        Ok(())
    }

    /// Hand the admin role to `new_admin`.
    ///
    /// # Errors
    ///
    /// [`OracleError::Unauthorized`] if `caller` is not the admin.
    pub fn set_admin(&mut self, caller: &Identity, new_admin: Identity) -> Result<()> {
        ensure_identity(caller, &self.admin)?;
        tracing::info!(%new_admin, "circuit breaker: admin changed");
        self.admin = new_admin;
        Ok(())
    }

    /// Whether a check at `now` would get past the pause gate.
    pub fn is_active(&self, now: u64) -> bool {
        match self.mode {
            BreakerMode::Active => true,
            BreakerMode::ManuallyPaused { until } => now >= until,
        }
    }

    /// Current mode; an expired pause still reads as paused until the next check.
    pub fn mode(&self) -> BreakerMode {
        self.mode
    }

    /// Baseline for the next change check.
    pub fn last_valid_price(&self) -> Option<&NormalizedPrice> {
        self.last_valid_price.as_ref()
    }

    /// Largest accepted move, in percent.
    pub fn max_change_pct(&self) -> u64 {
        self.max_change_pct
    }

    /// Identity allowed to pause and reconfigure.
    pub fn admin(&self) -> &Identity {
        &self.admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: Identity = Identity::new([1; 32]);
    const OTHER: Identity = Identity::new([2; 32]);

    fn price(value: u64, at: u64) -> NormalizedPrice {
        NormalizedPrice::new(value, at)
    }

    #[test]
    fn test_new_breaker() {
        let cb = CircuitBreaker::new(ADMIN, 20);
        assert_eq!(cb.mode(), BreakerMode::Active);
        assert!(cb.last_valid_price().is_none());
        assert_eq!(cb.max_change_pct(), 20);
        assert!(cb.is_active(0));
    }

    #[test]
    fn test_first_price_becomes_baseline() {
        let mut cb = CircuitBreaker::new(ADMIN, 20);
        let check = cb
            .check_and_update(&price(5_000_000_000, 1), 1)
            .expect("baseline");
        assert_eq!(check.change_pct, None);
        assert_eq!(cb.last_valid_price(), Some(&price(5_000_000_000, 1)));
    }

    #[test]
    fn test_within_threshold_updates_baseline() {
        let mut cb = CircuitBreaker::new(ADMIN, 20);
        cb.check_and_update(&price(5_000_000_000, 1), 1).expect("baseline");
        let check = cb
            .check_and_update(&price(6_000_000_000, 2), 2)
            .expect("20% accepted");
        assert_eq!(check.change_pct, Some(20));
        assert_eq!(cb.last_valid_price().map(|p| p.value), Some(6_000_000_000));
    }

    #[test]
    fn test_rejection_keeps_baseline() {
        let mut cb = CircuitBreaker::new(ADMIN, 20);
        cb.check_and_update(&price(5_000_000_000, 1), 1).expect("baseline");

        let err = cb
            .check_and_update(&price(7_500_000_000, 2), 2)
            .unwrap_err();
        assert_eq!(
            err,
            OracleError::ThresholdExceeded {
                price: 7_500_000_000,
                baseline: 5_000_000_000,
                change_pct: 50,
                max_pct: 20
            }
        );
        assert_eq!(cb.last_valid_price().map(|p| p.value), Some(5_000_000_000));

        // In tolerance relative to the old baseline: accepted and adopted.
        cb.check_and_update(&price(5_500_000_000, 3), 3)
            .expect("10% accepted");
        assert_eq!(cb.last_valid_price().map(|p| p.value), Some(5_500_000_000));
    }

    #[test]
    fn test_drop_is_rejected_too() {
        let mut cb = CircuitBreaker::new(ADMIN, 20);
        cb.check_and_update(&price(100, 1), 1).expect("baseline");
        assert!(matches!(
            cb.check_and_update(&price(70, 2), 2),
            Err(OracleError::ThresholdExceeded { change_pct: 30, .. })
        ));
    }

    #[test]
    fn test_paused_rejects() {
        let mut cb = CircuitBreaker::new(ADMIN, 20);
        let until = cb.emergency_pause(&ADMIN, 100, 1_000).expect("pause");
        assert_eq!(until, 1_100);
        assert!(!cb.is_active(1_099));

        let err = cb.check_and_update(&price(100, 1_050), 1_050).unwrap_err();
        assert_eq!(err, OracleError::Paused { until: 1_100 });
        assert!(cb.last_valid_price().is_none());
    }

    #[test]
    fn test_auto_resume_at_until() {
        let mut cb = CircuitBreaker::new(ADMIN, 20);
        cb.emergency_pause(&ADMIN, 100, 1_000).expect("pause");

        let check = cb
            .check_and_update(&price(100, 1_100), 1_100)
            .expect("resumed at until");
        assert!(check.resumed);
        assert_eq!(cb.mode(), BreakerMode::Active);
    }

    #[test]
    fn test_failed_check_does_not_apply_resume() {
        let mut cb = CircuitBreaker::new(ADMIN, 20);
        cb.check_and_update(&price(100, 1), 1).expect("baseline");
        cb.emergency_pause(&ADMIN, 10, 1).expect("pause");

        assert!(cb.check_and_update(&price(200, 20), 20).is_err());
        assert_eq!(cb.mode(), BreakerMode::ManuallyPaused { until: 11 });
        // The gate itself is open, only the threshold failed.
        assert!(cb.is_active(20));
    }

    #[test]
    fn test_pause_keeps_baseline() {
        let mut cb = CircuitBreaker::new(ADMIN, 20);
        cb.check_and_update(&price(100, 1), 1).expect("baseline");
        cb.emergency_pause(&ADMIN, 10, 1).expect("pause");
        assert_eq!(cb.last_valid_price().map(|p| p.value), Some(100));
    }

    #[test]
    fn test_pause_overrides_existing_pause() {
        let mut cb = CircuitBreaker::new(ADMIN, 20);
        cb.emergency_pause(&ADMIN, 1_000, 0).expect("pause");
        cb.emergency_pause(&ADMIN, 10, 5).expect("re-pause");
        assert_eq!(cb.mode(), BreakerMode::ManuallyPaused { until: 15 });
    }

    #[test]
    fn test_unpause() {
        let mut cb = CircuitBreaker::new(ADMIN, 20);
        cb.emergency_pause(&ADMIN, 1_000, 0).expect("pause");
        cb.unpause(&ADMIN).expect("unpause");
        cb.check_and_update(&price(100, 1), 1).expect("active again");
    }

    #[test]
    fn test_admin_only() {
        let mut cb = CircuitBreaker::new(ADMIN, 20);
        assert!(matches!(
            cb.emergency_pause(&OTHER, 10, 0),
            Err(OracleError::Unauthorized(_))
        ));
        assert!(cb.unpause(&OTHER).is_err());
        assert!(cb.set_max_change_pct(&OTHER, 99).is_err());
        assert!(cb.reset_baseline(&OTHER, None).is_err());
        assert!(cb.set_admin(&OTHER, OTHER).is_err());
        assert_eq!(cb, CircuitBreaker::new(ADMIN, 20));
    }

    #[test]
    fn test_set_max_change_applies_immediately() {
        let mut cb = CircuitBreaker::new(ADMIN, 20);
        cb.check_and_update(&price(100, 1), 1).expect("baseline");
        assert!(cb.check_and_update(&price(150, 2), 2).is_err());

        cb.set_max_change_pct(&ADMIN, 60).expect("update");
        cb.check_and_update(&price(150, 3), 3).expect("50% accepted now");
    }

    #[test]
    fn test_reset_baseline() {
        let mut cb = CircuitBreaker::new(ADMIN, 20);
        cb.check_and_update(&price(100, 1), 1).expect("baseline");
        assert!(cb.check_and_update(&price(300, 2), 2).is_err());

        cb.reset_baseline(&ADMIN, None).expect("reset");
        cb.check_and_update(&price(300, 3), 3).expect("adopted");
        assert_eq!(cb.last_valid_price().map(|p| p.value), Some(300));
    }

    #[test]
    fn test_zero_baseline_is_replaced() {
        let mut cb = CircuitBreaker::new(ADMIN, 20);
        cb.reset_baseline(&ADMIN, Some(price(0, 0))).expect("reset");
        let check = cb.check_and_update(&price(100, 1), 1).expect("adopted");
        assert_eq!(check.change_pct, None);
    }

    #[test]
    fn test_set_admin() {
        let mut cb = CircuitBreaker::new(ADMIN, 20);
        cb.set_admin(&ADMIN, OTHER).expect("handover");
        assert!(cb.emergency_pause(&ADMIN, 1, 0).is_err());
        cb.emergency_pause(&OTHER, 1, 0).expect("new admin");
    }
}
