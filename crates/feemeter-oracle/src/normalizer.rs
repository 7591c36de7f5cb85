//! Raw price normalization.
//!
//! Feeds report `price * 10^expo`. The rest of the workspace works on
//! unsigned values with [`PRICE_DECIMALS`](feemeter_types::PRICE_DECIMALS)
//! fractional digits:
//!
//! ```text
//! expo < 0:  value = raw * 10^8 / 10^|expo|
//! expo >= 0: value = raw * 10^8 * 10^expo
//! ```

use feemeter_types::{NormalizedPrice, RawPrice, PRICE_SCALE};

use crate::{OracleError, Result};

fn pow10(exp: u32) -> Option<u128> {
    10u128.checked_pow(exp)
}

/// Normalize a non-negative raw magnitude to 8 decimals.
///
/// Multiplications happen in `u128` before any division. Digits below the
/// 8th decimal are truncated.
///
/// # Errors
///
/// [`OracleError::NormalizationOverflow`] if the result does not fit `u64`.
///
/// # Examples
///
/// ```
/// use feemeter_oracle::normalizer::normalize;
///
/// // $50.00 reported with five decimals
/// let price = normalize(5_000_000, -5, 1_700_000_000).unwrap();
/// assert_eq!(price.value, 5_000_000_000);
/// ```
pub fn normalize(raw_magnitude: u128, expo: i32, observed_at: u64) -> Result<NormalizedPrice> {
    let overflow = || OracleError::NormalizationOverflow {
        raw: raw_magnitude,
        expo,
    };

    let scaled = raw_magnitude
        .checked_mul(PRICE_SCALE as u128)
        .ok_or_else(overflow)?;

    let value = if expo < 0 {
        // A divisor wider than u128 truncates everything away.
        match pow10(expo.unsigned_abs()) {
            Some(divisor) => scaled / divisor,
            None => 0,
        }
    } else {
        let factor = pow10(expo.unsigned_abs()).ok_or_else(overflow)?;
        scaled.checked_mul(factor).ok_or_else(overflow)?
    };

    let value = u64::try_from(value).map_err(|_| overflow())?;
    Ok(NormalizedPrice::new(value, observed_at))
}

/// Normalize a source sample, rejecting negative prices.
///
/// # Errors
///
/// - [`OracleError::NegativePrice`] if the sample price is below zero
/// - [`OracleError::NormalizationOverflow`] as for [`normalize`]
pub fn normalize_raw(sample: &RawPrice) -> Result<NormalizedPrice> {
    if sample.price < 0 {
        return Err(OracleError::NegativePrice(sample.price));
    }
    normalize(
        sample.price.unsigned_abs() as u128,
        sample.expo,
        sample.publish_time,
    )
}
