//! Keeper assembly and the distribution tick.

use std::sync::Arc;

use feemeter_commission::engine::{CommissionConfig, CommissionEngine};
use feemeter_commission::keeper::{Keeper, PriceSources};
use feemeter_commission::ledger::{InMemoryLedger, VaultCapability};
use feemeter_oracle::circuit_breaker::CircuitBreaker;
use feemeter_oracle::source::StaticPriceSource;
use feemeter_oracle::validator::OracleConfig;
use feemeter_types::{Clock, DistributionRecord, FeedId, Identity};
use tokio::sync::Mutex;

use crate::config::DaemonConfig;
use crate::events::EventBus;

/// Daemon-wide shared state.
pub struct Service {
    /// All commission state; one lock per operation.
    pub keeper: Arc<Mutex<Keeper<InMemoryLedger>>>,
    source: Arc<StaticPriceSource>,
    clock: Arc<dyn Clock>,
    config: DaemonConfig,
    feed: FeedId,
    operator: Identity,
}

impl Service {
    /// Build the keeper from configuration.
    ///
    /// Accrual starts at the clock's current time.
    pub fn new(config: DaemonConfig, clock: Arc<dyn Clock>, bus: EventBus) -> anyhow::Result<Self> {
        let now = clock.now_seconds();
        let feed = config.feed_id()?;
        let operator = config.operator()?;
        let vault = config.vault()?;

        let source = Arc::new(StaticPriceSource::with_price(feed, config.sample_at(now)));

        let mut ledger = InMemoryLedger::new();
        ledger.deposit(vault, config.commission.initial_vault_balance)?;

        let engine = CommissionEngine::new(
            CommissionConfig::new(
                config.manager()?,
                operator,
                config.commission.yearly_amount_usd,
                now,
            ),
            VaultCapability::new(vault),
            ledger,
            config.commission.asset_decimals,
        )?;

        let keeper = Keeper::new(
            PriceSources {
                feed,
                primary: Box::new(source.clone()),
                secondary: None,
            },
            config.keeper_settings(),
            OracleConfig::new(
                config.oracle_admin()?,
                config.oracle.max_age_secs,
                config.oracle.max_confidence_pct,
            ),
            CircuitBreaker::new(config.breaker_admin()?, config.breaker.max_change_pct),
            engine,
            Arc::new(bus),
        )?;

        tracing::info!(
            manager = %config.manager()?,
            operator = %operator,
            vault = %vault,
            yearly_amount_usd = config.commission.yearly_amount_usd,
            "keeper ready"
        );

        Ok(Self {
            keeper: Arc::new(Mutex::new(keeper)),
            source,
            clock,
            config,
            feed,
            operator,
        })
    }

    /// Republish the configured sample and attempt one distribution as the
    /// operator.
    ///
    /// A rejected distribution is logged and skipped; the next tick retries.
    pub async fn tick(&self) -> Option<DistributionRecord> {
        let now = self.clock.now_seconds();
        self.source.set_price(self.feed, self.config.sample_at(now));

        let mut keeper = self.keeper.lock().await;
        match keeper.distribute(&self.operator, now) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, now, "distribution skipped");
                None
            }
        }
    }
}
