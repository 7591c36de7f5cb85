//! Commission debt and distribution engine.
//!
//! The engine owns the [`CommissionConfig`], the vault capability and the
//! ledger. Its state machine is implicit in `last_update` and `debt_usd`:
//!
//! ```text
//! owed_usd   = yearly * (now - last_update) / SECONDS_PER_YEAR + debt_usd
//! owed_asset = owed_usd * asset_unit / price
//!
//! balance >= owed_asset:  operator <- owed_asset, manager <- rest, debt = 0
//! balance <  owed_asset:  operator <- balance,
//!                         debt = owed_usd - balance * price / asset_unit
//! last_update = max(last_update, now)   (always)
//! ```
//!
//! Debt is kept in USD. A later price move changes how much asset the debt
//! costs, never how much value is owed.
//!
//! Every entry point is all-or-nothing: the breaker, the ledger and the
//! config either all change or none does.

use feemeter_oracle::circuit_breaker::CircuitBreaker;
use feemeter_types::{ensure_any, ensure_identity, DistributionRecord, Identity, NormalizedPrice};
use serde::{Deserialize, Serialize};

use crate::conversion::{accrued_usd, asset_to_usd, asset_unit, usd_to_asset};
use crate::ledger::{Ledger, Transfer, VaultCapability};
use crate::{CommissionError, Result};

/// Commission terms and carried debt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionConfig {
    /// Receives whatever the vault holds beyond the commission.
    pub manager: Identity,
    /// Receives the commission.
    pub operator: Identity,
    /// Commission per year in USD (8 decimals).
    pub yearly_amount_usd: u64,
    /// Time up to which commission has been settled.
    pub last_update: u64,
    /// Unpaid USD carried from earlier distributions (8 decimals).
    pub debt_usd: u64,
}

impl CommissionConfig {
    /// Terms starting at `start` with no debt.
    pub fn new(manager: Identity, operator: Identity, yearly_amount_usd: u64, start: u64) -> Self {
        Self {
            manager,
            operator,
            yearly_amount_usd,
            last_update: start,
            debt_usd: 0,
        }
    }
}

/// Meters and distributes the commission.
#[derive(Debug)]
pub struct CommissionEngine<L> {
    config: CommissionConfig,
    vault: VaultCapability,
    ledger: L,
    asset_unit: u64,
    records: Vec<DistributionRecord>,
}

impl<L: Ledger> CommissionEngine<L> {
    /// Create an engine paying out of the vault behind `vault`.
    ///
    /// # Errors
    ///
    /// [`CommissionError::InvalidConfig`] if `asset_decimals` is out of range.
    pub fn new(config: CommissionConfig, vault: VaultCapability, ledger: L, asset_decimals: u32) -> Result<Self> {
        Ok(Self {
            config,
            vault,
            ledger,
            asset_unit: asset_unit(asset_decimals)?,
            records: Vec::new(),
        })
    }

    /// USD owed at `now`, carried debt included.
    ///
    /// A `now` before `last_update` accrues nothing.
    ///
    /// # Errors
    ///
    /// [`CommissionError::Overflow`] on arithmetic overflow.
    pub fn commission_owed_usd(&self, now: u64) -> Result<u64> {
        let elapsed = now.saturating_sub(self.config.last_update);
        accrued_usd(self.config.yearly_amount_usd, elapsed)?
            .checked_add(self.config.debt_usd)
            .ok_or(CommissionError::Overflow)
    }

    /// Convert a USD amount to the asset at `price`.
    pub fn usd_to_asset(&self, usd: u64, price: &NormalizedPrice) -> Result<u64> {
        usd_to_asset(usd, price.value, self.asset_unit)
    }

    /// Check that `caller` may trigger a distribution (manager or operator).
    pub fn authorize_distribution(&self, caller: &Identity) -> Result<()> {
        ensure_any(caller, &[&self.config.manager, &self.config.operator])?;
        Ok(())
    }

    /// Check that `caller` is the manager.
    pub fn authorize_manager(&self, caller: &Identity) -> Result<()> {
        ensure_identity(caller, &self.config.manager)?;
        Ok(())
    }

    /// Settle the commission accrued up to `now` at `price`.
    ///
    /// The breaker must let `price` through first; its rejection aborts the
    /// whole distribution. A vault that cannot cover the commission is not an
    /// error: everything it holds goes to the operator and the USD shortfall
    /// becomes debt.
    ///
    /// # Errors
    ///
    /// - [`CommissionError::Unauthorized`] unless `caller` is manager or operator
    /// - [`CommissionError::Oracle`] with the breaker's `Paused` / `ThresholdExceeded`
    /// - [`CommissionError::InvalidPrice`] if `price` is zero
    /// - [`CommissionError::Overflow`] on arithmetic overflow
    /// - [`CommissionError::Ledger`] if the ledger refuses the transfers
    pub fn distribute(
        &mut self,
        caller: &Identity,
        breaker: &mut CircuitBreaker,
        price: &NormalizedPrice,
        now: u64,
    ) -> Result<DistributionRecord> {
        self.authorize_distribution(caller)?;

        let mut staged_breaker = breaker.clone();
        staged_breaker.check_and_update(price, now)?;

        let owed_usd = self.commission_owed_usd(now)?;
        let owed_asset = self.usd_to_asset(owed_usd, price)?;
        let balance = self.ledger.balance_of(self.vault.account());

        let (paid_asset, remainder_asset, paid_usd, debt_usd) = if balance >= owed_asset {
            (owed_asset, balance - owed_asset, owed_usd, 0)
        } else {
            let paid_usd = asset_to_usd(balance, price.value, self.asset_unit)?;
            // balance < owed_asset implies paid_usd < owed_usd
            (balance, 0, paid_usd, owed_usd.saturating_sub(paid_usd))
        };

        let transfers: Vec<Transfer> = [
            Transfer {
                to: self.config.operator,
                amount: paid_asset,
            },
            Transfer {
                to: self.config.manager,
                amount: remainder_asset,
            },
        ]
        .into_iter()
        .filter(|t| t.amount > 0)
        .collect();
        self.ledger.execute(&self.vault, &transfers)?;

        // Commit
        *breaker = staged_breaker;
        self.config.debt_usd = debt_usd;
        // A clock that stepped back must not reopen a settled window.
        self.config.last_update = self.config.last_update.max(now);

        let record = DistributionRecord {
            paid_asset,
            remainder_asset,
            owed_usd,
            paid_usd,
            debt_usd,
            price_used: *price,
            timestamp: now,
        };

        if debt_usd > 0 {
            tracing::warn!(
                owed_usd,
                paid_usd,
                debt_usd,
                balance,
                price = price.value,
                "commission partially paid, debt carried"
            );
        } else {
            tracing::info!(
                owed_usd,
                paid_asset,
                remainder_asset,
                price = price.value,
                "commission distributed"
            );
        }

        self.records.push(record.clone());
        Ok(record)
    }

    /// Change the yearly amount after settling at the old rate.
    ///
    /// # Errors
    ///
    /// [`CommissionError::Unauthorized`] unless `caller` is the manager, and
    /// any error of [`Self::distribute`].
    pub fn set_yearly_amount(
        &mut self,
        caller: &Identity,
        yearly_amount_usd: u64,
        breaker: &mut CircuitBreaker,
        price: &NormalizedPrice,
        now: u64,
    ) -> Result<DistributionRecord> {
        self.authorize_manager(caller)?;
        let record = self.distribute(caller, breaker, price, now)?;
        tracing::info!(
            old = self.config.yearly_amount_usd,
            new = yearly_amount_usd,
            "yearly commission updated"
        );
        self.config.yearly_amount_usd = yearly_amount_usd;
        Ok(record)
    }

    /// Replace the operator after paying the outgoing one.
    ///
    /// # Errors
    ///
    /// [`CommissionError::Unauthorized`] unless `caller` is the manager, and
    /// any error of [`Self::distribute`].
    pub fn set_operator(
        &mut self,
        caller: &Identity,
        operator: Identity,
        breaker: &mut CircuitBreaker,
        price: &NormalizedPrice,
        now: u64,
    ) -> Result<DistributionRecord> {
        self.authorize_manager(caller)?;
        let record = self.distribute(caller, breaker, price, now)?;
        tracing::info!(old = %self.config.operator, new = %operator, "operator updated");
        self.config.operator = operator;
        Ok(record)
    }

    /// Replace the manager. Owed amounts are unaffected, so nothing is settled.
    ///
    /// # Errors
    ///
    /// [`CommissionError::Unauthorized`] unless `caller` is the manager.
    pub fn set_manager(&mut self, caller: &Identity, manager: Identity) -> Result<()> {
        self.authorize_manager(caller)?;
        tracing::info!(old = %self.config.manager, new = %manager, "manager updated");
        self.config.manager = manager;
        Ok(())
    }

    /// Current terms and carried debt.
    pub fn config(&self) -> &CommissionConfig {
        &self.config
    }

    /// Every committed distribution, oldest first.
    pub fn records(&self) -> &[DistributionRecord] {
        &self.records
    }

    /// `10^decimals` of the paid asset.
    pub fn asset_unit(&self) -> u64 {
        self.asset_unit
    }

    /// Current vault balance.
    pub fn vault_balance(&self) -> u64 {
        self.ledger.balance_of(self.vault.account())
    }

    /// Account the vault capability controls.
    pub fn vault_account(&self) -> &Identity {
        self.vault.account()
    }

    /// The ledger the vault lives in.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Mutable ledger access, for funding the vault from outside.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }
}

#[cfg(test)]
mod tests {
    use feemeter_oracle::OracleError;
    use feemeter_types::SECONDS_PER_YEAR;

    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::LedgerError;

    const MANAGER: Identity = Identity::new([1; 32]);
    const OPERATOR: Identity = Identity::new([2; 32]);
    const ADMIN: Identity = Identity::new([3; 32]);
    const VAULT: Identity = Identity::new([9; 32]);
    const STRANGER: Identity = Identity::new([7; 32]);

    const START: u64 = 1_700_000_000;
    const QUARTER: u64 = SECONDS_PER_YEAR / 4;
    /// $100 a year.
    const YEARLY: u64 = 10_000_000_000;
    /// $50.00
    const PRICE: u64 = 5_000_000_000;

    fn engine(vault_balance: u64) -> CommissionEngine<InMemoryLedger> {
        let mut ledger = InMemoryLedger::new();
        ledger.deposit(VAULT, vault_balance).expect("fund vault");
        CommissionEngine::new(
            CommissionConfig::new(MANAGER, OPERATOR, YEARLY, START),
            VaultCapability::new(VAULT),
            ledger,
            8,
        )
        .expect("engine")
    }

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(ADMIN, 20)
    }

    fn price(value: u64, at: u64) -> NormalizedPrice {
        NormalizedPrice::new(value, at)
    }

    #[test]
    fn test_owed_accrues_linearly() {
        let e = engine(0);
        assert_eq!(e.commission_owed_usd(START).expect("owed"), 0);
        assert_eq!(e.commission_owed_usd(START + QUARTER).expect("owed"), 2_500_000_000);
        assert_eq!(e.commission_owed_usd(START + SECONDS_PER_YEAR).expect("owed"), YEARLY);
        // Clock behind last_update
        assert_eq!(e.commission_owed_usd(START - 10).expect("owed"), 0);
    }

    #[test]
    fn test_full_payment() {
        let mut e = engine(200_000_000);
        let mut cb = breaker();
        let now = START + QUARTER;

        let record = e
            .distribute(&OPERATOR, &mut cb, &price(PRICE, now), now)
            .expect("distribute");

        assert_eq!(record.owed_usd, 2_500_000_000);
        assert_eq!(record.paid_asset, 50_000_000);
        assert_eq!(record.remainder_asset, 150_000_000);
        assert_eq!(record.debt_usd, 0);
        assert_eq!(e.ledger().balance_of(&OPERATOR), 50_000_000);
        assert_eq!(e.ledger().balance_of(&MANAGER), 150_000_000);
        assert_eq!(e.vault_balance(), 0);
        assert_eq!(e.config().debt_usd, 0);
        assert_eq!(e.config().last_update, now);
        assert_eq!(e.records(), &[record]);
    }

    #[test]
    fn test_partial_payment_carries_usd_debt() {
        let mut e = engine(10_000_000);
        let mut cb = breaker();
        let now = START + QUARTER;

        let record = e
            .distribute(&OPERATOR, &mut cb, &price(PRICE, now), now)
            .expect("distribute");

        assert_eq!(record.paid_asset, 10_000_000);
        assert_eq!(record.paid_usd, 500_000_000);
        // $25 owed - $5 paid
        assert_eq!(record.debt_usd, 2_000_000_000);
        assert_eq!(e.config().debt_usd, 2_000_000_000);
        assert_eq!(e.config().last_update, now);
        assert_eq!(e.ledger().balance_of(&OPERATOR), 10_000_000);
        assert_eq!(e.ledger().balance_of(&MANAGER), 0);
    }

    #[test]
    fn test_debt_is_repriced_at_next_distribution() {
        let mut e = engine(10_000_000);
        let mut cb = breaker();
        let t1 = START + QUARTER;
        e.distribute(&OPERATOR, &mut cb, &price(PRICE, t1), t1)
            .expect("partial");

        // Price rises 10%; the $20 debt now costs less asset.
        let new_price = 5_500_000_000;
        e.ledger_mut().deposit(VAULT, 100_000_000).expect("refund vault");
        let record = e
            .distribute(&OPERATOR, &mut cb, &price(new_price, t1), t1)
            .expect("settle debt");
        assert_eq!(record.owed_usd, 2_000_000_000);
        assert_eq!(record.paid_asset, 2_000_000_000u64 * 100_000_000 / new_price);
        assert_eq!(record.debt_usd, 0);
    }

    #[test]
    fn test_zero_balance_records_zero_payout() {
        let mut e = engine(0);
        let mut cb = breaker();
        let now = START + QUARTER;
        let record = e
            .distribute(&MANAGER, &mut cb, &price(PRICE, now), now)
            .expect("distribute");
        assert_eq!(record.paid_asset, 0);
        assert_eq!(record.debt_usd, 2_500_000_000);
        assert_eq!(e.records().len(), 1);
    }

    #[test]
    fn test_same_window_not_accrued_twice() {
        let mut e = engine(0);
        let mut cb = breaker();
        let now = START + QUARTER;
        e.distribute(&OPERATOR, &mut cb, &price(PRICE, now), now)
            .expect("first");
        let record = e
            .distribute(&OPERATOR, &mut cb, &price(PRICE, now), now)
            .expect("second");
        // Only the debt, no fresh accrual.
        assert_eq!(record.owed_usd, 2_500_000_000);
    }

    #[test]
    fn test_clock_stepping_back_does_not_reaccrue() {
        let mut e = engine(100 * 100_000_000);
        let mut cb = breaker();
        let later = START + QUARTER;

        let r1 = e
            .distribute(&OPERATOR, &mut cb, &price(PRICE, later), later)
            .expect("first");
        assert_eq!(r1.owed_usd, 2_500_000_000);

        let r2 = e
            .distribute(&OPERATOR, &mut cb, &price(PRICE, START), START)
            .expect("clock behind");
        assert_eq!(r2.owed_usd, 0);
        assert_eq!(e.config().last_update, later);

        let r3 = e
            .distribute(&OPERATOR, &mut cb, &price(PRICE, later), later)
            .expect("clock back to the settled time");
        assert_eq!(r3.owed_usd, 0);
        assert_eq!(r3.paid_usd, 0);
        assert_eq!(e.config().debt_usd, 0);
        assert_eq!(e.ledger().balance_of(&OPERATOR), r1.paid_asset);
    }

    #[test]
    fn test_unauthorized_distribution() {
        let mut e = engine(100);
        let mut cb = breaker();
        let err = e
            .distribute(&STRANGER, &mut cb, &price(PRICE, START), START + 1)
            .unwrap_err();
        assert!(matches!(err, CommissionError::Unauthorized(_)));
        assert!(cb.last_valid_price().is_none());
        assert!(e.records().is_empty());
    }

    #[test]
    fn test_breaker_rejection_aborts_everything() {
        let mut e = engine(200_000_000);
        let mut cb = breaker();
        let t1 = START + QUARTER;
        e.distribute(&OPERATOR, &mut cb, &price(PRICE, t1), t1)
            .expect("baseline");
        e.ledger_mut().deposit(VAULT, 200_000_000).expect("refund");
        let ledger_before = e.ledger().clone();
        let config_before = e.config().clone();

        let t2 = t1 + QUARTER;
        let err = e
            .distribute(&OPERATOR, &mut cb, &price(7_500_000_000, t2), t2)
            .unwrap_err();
        assert!(matches!(
            err,
            CommissionError::Oracle(OracleError::ThresholdExceeded { change_pct: 50, .. })
        ));
        assert_eq!(cb.last_valid_price().map(|p| p.value), Some(PRICE));
        assert_eq!(e.ledger(), &ledger_before);
        assert_eq!(e.config(), &config_before);
        assert_eq!(e.records().len(), 1);
    }

    #[test]
    fn test_paused_breaker_aborts() {
        let mut e = engine(200_000_000);
        let mut cb = breaker();
        cb.emergency_pause(&ADMIN, 100, START).expect("pause");
        let err = e
            .distribute(&OPERATOR, &mut cb, &price(PRICE, START + 50), START + 50)
            .unwrap_err();
        assert_eq!(
            err,
            CommissionError::Oracle(OracleError::Paused { until: START + 100 })
        );
        assert_eq!(e.config().last_update, START);
    }

    #[test]
    fn test_ledger_failure_leaves_breaker_untouched() {
        struct RefusingLedger;
        impl Ledger for RefusingLedger {
            fn balance_of(&self, _account: &Identity) -> u64 {
                1_000_000_000
            }
            fn execute(&mut self, vault: &VaultCapability, _t: &[Transfer]) -> std::result::Result<(), LedgerError> {
                Err(LedgerError::InsufficientFunds {
                    account: *vault.account(),
                    balance: 0,
                    required: 1,
                })
            }
        }

        let mut e = CommissionEngine::new(
            CommissionConfig::new(MANAGER, OPERATOR, YEARLY, START),
            VaultCapability::new(VAULT),
            RefusingLedger,
            8,
        )
        .expect("engine");
        let mut cb = breaker();
        let now = START + QUARTER;
        let err = e
            .distribute(&OPERATOR, &mut cb, &price(PRICE, now), now)
            .unwrap_err();
        assert!(matches!(err, CommissionError::Ledger(_)));
        assert!(cb.last_valid_price().is_none());
        assert_eq!(e.config().last_update, START);
    }

    #[test]
    fn test_set_yearly_amount_settles_old_rate_first() {
        let mut e = engine(1_000_000_000);
        let mut cb = breaker();
        let now = START + QUARTER;

        let record = e
            .set_yearly_amount(&MANAGER, 2 * YEARLY, &mut cb, &price(PRICE, now), now)
            .expect("set yearly");
        assert_eq!(record.owed_usd, 2_500_000_000);
        assert_eq!(e.config().yearly_amount_usd, 2 * YEARLY);

        // The next quarter accrues at the new rate.
        assert_eq!(
            e.commission_owed_usd(now + QUARTER).expect("owed"),
            5_000_000_000
        );
    }

    #[test]
    fn test_set_yearly_amount_requires_manager() {
        let mut e = engine(0);
        let mut cb = breaker();
        let err = e
            .set_yearly_amount(&OPERATOR, 1, &mut cb, &price(PRICE, START), START)
            .unwrap_err();
        assert!(matches!(err, CommissionError::Unauthorized(_)));
        assert_eq!(e.config().yearly_amount_usd, YEARLY);
        assert!(e.records().is_empty());
    }

    #[test]
    fn test_set_yearly_amount_aborts_when_paused() {
        let mut e = engine(0);
        let mut cb = breaker();
        cb.emergency_pause(&ADMIN, 100, START).expect("pause");
        assert!(e
            .set_yearly_amount(&MANAGER, 1, &mut cb, &price(PRICE, START), START)
            .is_err());
        assert_eq!(e.config().yearly_amount_usd, YEARLY);
    }

    #[test]
    fn test_set_operator_pays_outgoing_operator() {
        let new_operator = Identity::new([4; 32]);
        let mut e = engine(50_000_000);
        let mut cb = breaker();
        let now = START + QUARTER;

        e.set_operator(&MANAGER, new_operator, &mut cb, &price(PRICE, now), now)
            .expect("set operator");
        assert_eq!(e.ledger().balance_of(&OPERATOR), 50_000_000);
        assert_eq!(e.config().operator, new_operator);

        // The old operator can no longer distribute.
        assert!(e
            .distribute(&OPERATOR, &mut cb, &price(PRICE, now), now)
            .is_err());
    }

    #[test]
    fn test_set_manager_does_not_distribute() {
        let new_manager = Identity::new([5; 32]);
        let mut e = engine(50_000_000);
        e.set_manager(&MANAGER, new_manager).expect("set manager");
        assert_eq!(e.config().manager, new_manager);
        assert!(e.records().is_empty());
        assert_eq!(e.config().last_update, START);

        assert!(e.set_manager(&MANAGER, MANAGER).is_err());
    }

    #[test]
    fn test_invalid_decimals() {
        let err = CommissionEngine::new(
            CommissionConfig::new(MANAGER, OPERATOR, YEARLY, START),
            VaultCapability::new(VAULT),
            InMemoryLedger::new(),
            30,
        )
        .unwrap_err();
        assert!(matches!(err, CommissionError::InvalidConfig(_)));
    }
}
