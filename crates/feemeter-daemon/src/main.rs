//! feemeter-daemon: periodic commission distribution.
//!
//! Single OS process running a Tokio runtime. The keeper sits behind one
//! mutex; a timer drives distributions and every committed event is logged
//! as JSON from the event bus.

mod config;
mod events;
mod service;

use std::sync::Arc;

use feemeter_types::SystemClock;
use tracing::info;

use crate::config::DaemonConfig;
use crate::events::EventBus;
use crate::service::Service;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // 2. Initialize tracing; RUST_LOG overrides the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.advanced.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(config = ?DaemonConfig::config_path(), "Feemeter daemon starting");

    // 3. Event bus and its logger
    let event_bus = EventBus::new(config.advanced.event_buffer);
    let logger = tokio::spawn(events::log_events(event_bus.subscribe()));

    // 4. Keeper
    let interval = config.distribution_interval()?;
    let service = Service::new(config, Arc::new(SystemClock), event_bus.clone())?;

    // 5. Distribute on every tick until shutdown
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(record) = service.tick().await {
                    info!(paid_asset = record.paid_asset, debt_usd = record.debt_usd, "tick complete");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    {
        let keeper = service.keeper.lock().await;
        let commission = keeper.commission();
        info!(
            last_update = commission.last_update,
            debt_usd = commission.debt_usd,
            vault_balance = keeper.engine().vault_balance(),
            "final commission state"
        );
    }

    // The bus closes, and the logger ends, once every sender is gone.
    drop(service);
    let emitted = event_bus.sequence();
    drop(event_bus);
    let _ = logger.await;

    info!(events = emitted, "Daemon stopped");
    Ok(())
}
