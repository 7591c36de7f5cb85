//! # feemeter-commission
//!
//! Commission metering and distribution.
//!
//! A yearly USD amount accrues linearly over time and is paid out of a vault
//! in a volatile asset at the validated price. When the vault cannot cover
//! the full amount, the shortfall is carried forward as USD debt, so later
//! price moves never distort what is owed.
//!
//! ## Modules
//!
//! - [`conversion`]: accrual and USD/asset conversion
//! - [`ledger`]: the ledger seam, vault capability and an in-memory ledger
//! - [`engine`]: [`engine::CommissionEngine`], the debt/distribution state machine
//! - [`keeper`]: [`keeper::Keeper`], one transaction per entry point across
//!   the oracle pipeline, breaker and engine

pub mod conversion;
pub mod engine;
pub mod keeper;
pub mod ledger;

use feemeter_oracle::OracleError;
use feemeter_types::AuthError;

pub use ledger::LedgerError;

/// Error types for commission operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommissionError {
    /// Price validation, averaging or the circuit breaker rejected the operation.
    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// Caller is neither the manager nor, where allowed, the operator.
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    /// A zero price where a divisor is required.
    #[error("invalid price: {0}")]
    InvalidPrice(u64),

    /// Arithmetic overflow.
    #[error("arithmetic overflow in commission calculation")]
    Overflow,

    /// The ledger refused the transfer batch.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience result type for commission operations.
pub type Result<T> = std::result::Result<T, CommissionError>;
