//! Percentage change and the two-source deviation check.

use feemeter_types::NormalizedPrice;

use crate::{OracleError, Result};

/// Symmetric percentage change from `from` to `to`, truncated.
///
/// `|to - from| * 100 / from`, computed in `u128` and saturated to `u64`.
/// Returns `None` when `from` is zero.
pub fn change_pct(from: u64, to: u64) -> Option<u64> {
    if from == 0 {
        return None;
    }
    let diff = from.abs_diff(to) as u128;
    let pct = diff * 100 / from as u128;
    Some(u64::try_from(pct).unwrap_or(u64::MAX))
}

/// Cross-check the primary price against a secondary source.
///
/// Returns the primary price when the two agree within `max_deviation_pct`
/// (measured relative to the primary).
///
/// # Errors
///
/// - [`OracleError::InvalidPrice`] if the primary price is zero
/// - [`OracleError::DeviationExceeded`] if the prices disagree too much
pub fn check_deviation(
    primary: &NormalizedPrice,
    secondary: &NormalizedPrice,
    max_deviation_pct: u64,
) -> Result<NormalizedPrice> {
    let deviation_pct =
        change_pct(primary.value, secondary.value).ok_or(OracleError::InvalidPrice(0))?;
    if deviation_pct > max_deviation_pct {
        tracing::warn!(
            primary = primary.value,
            secondary = secondary.value,
            deviation_pct,
            max_deviation_pct,
            "price sources disagree"
        );
        return Err(OracleError::DeviationExceeded {
            deviation_pct,
            max_pct: max_deviation_pct,
        });
    }
    Ok(*primary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_pct_is_direction_agnostic() {
        assert_eq!(change_pct(100, 150), Some(50));
        assert_eq!(change_pct(100, 50), Some(50));
        assert_eq!(change_pct(100, 100), Some(0));
    }

    #[test]
    fn test_change_pct_truncates() {
        assert_eq!(change_pct(3, 4), Some(33));
    }

    #[test]
    fn test_change_pct_zero_base() {
        assert_eq!(change_pct(0, 10), None);
    }

    #[test]
    fn test_change_pct_no_overflow() {
        assert_eq!(change_pct(1, u64::MAX), Some(u64::MAX));
    }

    #[test]
    fn test_deviation_within_tolerance() {
        let p = NormalizedPrice::new(10_000, 1);
        let s = NormalizedPrice::new(10_100, 2);
        assert_eq!(check_deviation(&p, &s, 1).expect("within 1%"), p);
    }

    #[test]
    fn test_deviation_exceeded() {
        let p = NormalizedPrice::new(10_000, 1);
        let s = NormalizedPrice::new(10_300, 1);
        let err = check_deviation(&p, &s, 2).unwrap_err();
        assert_eq!(
            err,
            OracleError::DeviationExceeded {
                deviation_pct: 3,
                max_pct: 2
            }
        );
    }
}
