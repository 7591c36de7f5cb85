//! Configuration file management.
//!
//! `config.toml` lives in the data directory (`$FEEMETER_DATA_DIR` or a
//! platform default). Every field has a default, so a missing file or a
//! partial one is fine.

use std::path::PathBuf;

use feemeter_commission::keeper::{KeeperSettings, PricingMode, DEFAULT_MAX_DEVIATION_PCT};
use feemeter_oracle::anomaly::DEFAULT_ANOMALY_THRESHOLD_PCT;
use feemeter_oracle::circuit_breaker::DEFAULT_MAX_CHANGE_PCT;
use feemeter_oracle::twap::{TwapMode, DEFAULT_CAPACITY};
use feemeter_oracle::validator::{DEFAULT_MAX_AGE_SECS, DEFAULT_MAX_CONFIDENCE_PCT};
use feemeter_types::{FeedId, Identity, RawPrice};
use serde::{Deserialize, Serialize};

/// A configured value could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field}: invalid 32-byte hex value")]
    InvalidHex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("{0} must be non-zero")]
    Zero(&'static str),
}

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub oracle: OracleSection,
    #[serde(default)]
    pub twap: TwapSection,
    #[serde(default)]
    pub breaker: BreakerSection,
    #[serde(default)]
    pub anomaly: AnomalySection,
    #[serde(default)]
    pub commission: CommissionSection,
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub advanced: AdvancedSection,
}

/// Price validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSection {
    /// Admin allowed to change the limits below.
    #[serde(default = "default_admin")]
    pub admin: String,
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    #[serde(default = "default_max_confidence_pct")]
    pub max_confidence_pct: u64,
    /// Allowed disagreement with the secondary source.
    #[serde(default = "default_max_deviation_pct")]
    pub max_deviation_pct: u64,
    /// Serve the last good price for this long when the feed fails. 0 = off.
    #[serde(default)]
    pub cache_max_age_secs: u64,
}

/// Price history and averaging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwapSection {
    /// Convert at the windowed average instead of the spot price.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_twap_window_secs")]
    pub window_secs: u64,
    #[serde(default)]
    pub mode: TwapMode,
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSection {
    #[serde(default = "default_admin")]
    pub admin: String,
    #[serde(default = "default_max_change_pct")]
    pub max_change_pct: u64,
}

/// Anomaly monitoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalySection {
    #[serde(default = "default_anomaly_threshold_pct")]
    pub threshold_pct: u64,
}

/// Commission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionSection {
    #[serde(default = "default_manager")]
    pub manager: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default = "default_vault")]
    pub vault: String,
    /// Yearly commission in USD, 8 decimals.
    #[serde(default = "default_yearly_amount_usd")]
    pub yearly_amount_usd: u64,
    #[serde(default = "default_asset_decimals")]
    pub asset_decimals: u32,
    /// Vault funding at startup (in-memory ledger).
    #[serde(default)]
    pub initial_vault_balance: u64,
    /// Seconds between distribution attempts.
    #[serde(default = "default_distribution_interval_secs")]
    pub distribution_interval_secs: u64,
}

/// Static feed replayed by the daemon: every tick republishes this sample
/// with the current time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSection {
    #[serde(default = "default_feed_id")]
    pub feed_id: String,
    #[serde(default = "default_price")]
    pub price: i64,
    #[serde(default)]
    pub conf: u64,
    #[serde(default = "default_expo")]
    pub expo: i32,
}

/// Advanced settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedSection {
    /// Log level: "debug" | "info" | "warn" | "error". `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Event bus buffer per subscriber.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

// Default value functions

fn hex_identity(byte: u8) -> String {
    format!("0x{}", format!("{byte:02x}").repeat(32))
}

fn default_admin() -> String {
    hex_identity(0x0a)
}

fn default_manager() -> String {
    hex_identity(0x01)
}

fn default_operator() -> String {
    hex_identity(0x02)
}

fn default_vault() -> String {
    hex_identity(0x0f)
}

fn default_feed_id() -> String {
    hex_identity(0xee)
}

fn default_max_age_secs() -> u64 {
    DEFAULT_MAX_AGE_SECS
}

fn default_max_confidence_pct() -> u64 {
    DEFAULT_MAX_CONFIDENCE_PCT
}

fn default_max_deviation_pct() -> u64 {
    DEFAULT_MAX_DEVIATION_PCT
}

fn default_twap_window_secs() -> u64 {
    3600
}

fn default_history_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_max_change_pct() -> u64 {
    DEFAULT_MAX_CHANGE_PCT
}

fn default_anomaly_threshold_pct() -> u64 {
    DEFAULT_ANOMALY_THRESHOLD_PCT
}

fn default_yearly_amount_usd() -> u64 {
    // $100
    10_000_000_000
}

fn default_asset_decimals() -> u32 {
    8
}

fn default_distribution_interval_secs() -> u64 {
    3600
}

fn default_price() -> i64 {
    // $50
    5_000_000_000
}

fn default_expo() -> i32 {
    -8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_event_buffer() -> usize {
    1000
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            admin: default_admin(),
            max_age_secs: default_max_age_secs(),
            max_confidence_pct: default_max_confidence_pct(),
            max_deviation_pct: default_max_deviation_pct(),
            cache_max_age_secs: 0,
        }
    }
}

impl Default for TwapSection {
    fn default() -> Self {
        Self {
            enabled: false,
            window_secs: default_twap_window_secs(),
            mode: TwapMode::default(),
            capacity: default_history_capacity(),
        }
    }
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            admin: default_admin(),
            max_change_pct: default_max_change_pct(),
        }
    }
}

impl Default for AnomalySection {
    fn default() -> Self {
        Self {
            threshold_pct: default_anomaly_threshold_pct(),
        }
    }
}

impl Default for CommissionSection {
    fn default() -> Self {
        Self {
            manager: default_manager(),
            operator: default_operator(),
            vault: default_vault(),
            yearly_amount_usd: default_yearly_amount_usd(),
            asset_decimals: default_asset_decimals(),
            initial_vault_balance: 0,
            distribution_interval_secs: default_distribution_interval_secs(),
        }
    }
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            feed_id: default_feed_id(),
            price: default_price(),
            conf: 0,
            expo: default_expo(),
        }
    }
}

impl Default for AdvancedSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn parse_identity(field: &'static str, value: &str) -> Result<Identity, ConfigError> {
    value
        .parse()
        .map_err(|source| ConfigError::InvalidHex { field, source })
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }

    /// Data directory: `$FEEMETER_DATA_DIR`, else a platform default.
    pub fn data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("FEEMETER_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Feemeter")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".feemeter")
        }
    }

    /// Parsed `oracle.admin`.
    pub fn oracle_admin(&self) -> Result<Identity, ConfigError> {
        parse_identity("oracle.admin", &self.oracle.admin)
    }

    /// Parsed `breaker.admin`.
    pub fn breaker_admin(&self) -> Result<Identity, ConfigError> {
        parse_identity("breaker.admin", &self.breaker.admin)
    }

    /// Parsed `commission.manager`.
    pub fn manager(&self) -> Result<Identity, ConfigError> {
        parse_identity("commission.manager", &self.commission.manager)
    }

    /// Parsed `commission.operator`.
    pub fn operator(&self) -> Result<Identity, ConfigError> {
        parse_identity("commission.operator", &self.commission.operator)
    }

    /// Parsed `commission.vault`.
    pub fn vault(&self) -> Result<Identity, ConfigError> {
        parse_identity("commission.vault", &self.commission.vault)
    }

    /// Parsed `source.feed_id`.
    pub fn feed_id(&self) -> Result<FeedId, ConfigError> {
        self.source
            .feed_id
            .parse()
            .map_err(|source| ConfigError::InvalidHex {
                field: "source.feed_id",
                source,
            })
    }

    /// The configured feed sample, published at `now`.
    pub fn sample_at(&self, now: u64) -> RawPrice {
        RawPrice {
            price: self.source.price,
            conf: self.source.conf,
            expo: self.source.expo,
            publish_time: now,
        }
    }

    /// Observation pipeline settings.
    pub fn keeper_settings(&self) -> KeeperSettings {
        let pricing = if self.twap.enabled {
            PricingMode::Twap {
                window_secs: self.twap.window_secs,
                mode: self.twap.mode,
            }
        } else {
            PricingMode::Spot
        };
        KeeperSettings {
            pricing,
            max_deviation_pct: self.oracle.max_deviation_pct,
            cache_max_age_secs: (self.oracle.cache_max_age_secs > 0)
                .then_some(self.oracle.cache_max_age_secs),
            anomaly_threshold_pct: self.anomaly.threshold_pct,
            history_capacity: self.twap.capacity,
        }
    }

    /// Distribution tick interval.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Zero`] if the interval is zero.
    pub fn distribution_interval(&self) -> Result<std::time::Duration, ConfigError> {
        match self.commission.distribution_interval_secs {
            0 => Err(ConfigError::Zero("commission.distribution_interval_secs")),
            secs => Ok(std::time::Duration::from_secs(secs)),
        }
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/feemeter"))
}
