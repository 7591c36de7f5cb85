//! Accrual and USD/asset conversion.
//!
//! USD amounts and prices both carry 8 decimals; asset amounts carry the
//! asset's own decimals (`asset_unit = 10^decimals`).
//!
//! ```text
//! accrued = yearly * elapsed / SECONDS_PER_YEAR
//! asset   = usd * asset_unit / price
//! usd     = asset * price / asset_unit
//! ```
//!
//! Every product is formed in `u128` and truncated toward zero by the final
//! division. Amounts below one unit round to zero; the drift is at most one
//! unit per call.

use feemeter_types::SECONDS_PER_YEAR;

use crate::{CommissionError, Result};

/// Largest supported asset decimals (`10^19` overflows `u64`).
pub const MAX_ASSET_DECIMALS: u32 = 18;

/// `10^decimals`.
///
/// # Errors
///
/// [`CommissionError::InvalidConfig`] if `decimals` exceeds [`MAX_ASSET_DECIMALS`].
pub fn asset_unit(decimals: u32) -> Result<u64> {
    if decimals > MAX_ASSET_DECIMALS {
        return Err(CommissionError::InvalidConfig(format!(
            "asset decimals {decimals} exceed {MAX_ASSET_DECIMALS}"
        )));
    }
    Ok(10u64.pow(decimals))
}

fn narrow(value: u128) -> Result<u64> {
    u64::try_from(value).map_err(|_| CommissionError::Overflow)
}

/// USD accrued by `yearly_usd` over `elapsed_secs`.
///
/// # Errors
///
/// [`CommissionError::Overflow`] if the result does not fit `u64`.
pub fn accrued_usd(yearly_usd: u64, elapsed_secs: u64) -> Result<u64> {
    narrow(yearly_usd as u128 * elapsed_secs as u128 / SECONDS_PER_YEAR as u128)
}

/// Convert a USD amount to the asset at `price`.
///
/// # Errors
///
/// - [`CommissionError::InvalidPrice`] if `price` is zero
/// - [`CommissionError::Overflow`] if the result does not fit `u64`
///
/// # Examples
///
/// ```
/// use feemeter_commission::conversion::usd_to_asset;
///
/// // $25 at $50 per unit is half a unit (8 decimals).
/// let asset = usd_to_asset(2_500_000_000, 5_000_000_000, 100_000_000).unwrap();
/// assert_eq!(asset, 50_000_000);
/// ```
pub fn usd_to_asset(usd: u64, price: u64, asset_unit: u64) -> Result<u64> {
    if price == 0 {
        return Err(CommissionError::InvalidPrice(price));
    }
    narrow(usd as u128 * asset_unit as u128 / price as u128)
}

/// Value an asset amount in USD at `price`.
///
/// # Errors
///
/// - [`CommissionError::InvalidConfig`] if `asset_unit` is zero
/// - [`CommissionError::Overflow`] if the result does not fit `u64`
pub fn asset_to_usd(asset: u64, price: u64, asset_unit: u64) -> Result<u64> {
    if asset_unit == 0 {
        return Err(CommissionError::InvalidConfig(
            "asset unit must be non-zero".to_string(),
        ));
    }
    narrow(asset as u128 * price as u128 / asset_unit as u128)
}
