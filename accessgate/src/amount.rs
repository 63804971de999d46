//! Human-readable token amount parsing.
//!
//! Prices and minimum payments are configured as decimal strings (`"0.01"`)
//! and converted to the token's smallest unit using its decimals.

use std::str::FromStr;

use alloy_primitives::U256;
use rust_decimal::Decimal;

/// Errors from converting a decimal amount to token units.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The input is not a decimal number.
    #[error("Invalid amount: {0}")]
    Invalid(String),
    /// The amount is negative.
    #[error("Amount must not be negative")]
    Negative,
    /// The amount has more fractional digits than the token supports.
    #[error("Amount has {scale} fractional digits, token supports {decimals}")]
    TooPrecise {
        /// Fractional digits in the input.
        scale: u32,
        /// Token decimals.
        decimals: u8,
    },
}

/// Parses a decimal money string (optionally prefixed with `$`) into token units.
///
/// ```rust
/// use accessgate::amount::parse_units;
/// use alloy_primitives::U256;
///
/// assert_eq!(parse_units("1.50", 6).unwrap(), U256::from(1_500_000u64));
/// assert_eq!(parse_units("$0.01", 6).unwrap(), U256::from(10_000u64));
/// ```
///
/// # Errors
///
/// Returns [`AmountError`] if the input is malformed, negative, or more precise
/// than `decimals` allows.
pub fn parse_units(input: &str, decimals: u8) -> Result<U256, AmountError> {
    let trimmed = input.trim().trim_start_matches('$').replace('_', "");
    let value =
        Decimal::from_str(&trimmed).map_err(|e| AmountError::Invalid(format!("{trimmed}: {e}")))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AmountError::Negative);
    }
    let value = value.normalize();
    let scale = value.scale();
    if scale > u32::from(decimals) {
        return Err(AmountError::TooPrecise { scale, decimals });
    }
    let mantissa = u128::try_from(value.mantissa()).map_err(|_| AmountError::Negative)?;
    let factor = U256::from(10u8).pow(U256::from(u32::from(decimals) - scale));
    Ok(U256::from(mantissa) * factor)
}

/// Formats token units as a decimal string with trailing zeros removed.
#[must_use]
pub fn format_units(amount: U256, decimals: u8) -> String {
    let digits = amount.to_string();
    let decimals = usize::from(decimals);
    if decimals == 0 {
        return digits;
    }
    let padded = format!("{digits:0>width$}", width = decimals + 1);
    let (int, frac) = padded.split_at(padded.len() - decimals);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        int.to_string()
    } else {
        format!("{int}.{frac}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional() {
        assert_eq!(parse_units("2", 6).unwrap(), U256::from(2_000_000u64));
        assert_eq!(parse_units("0.000001", 6).unwrap(), U256::from(1u64));
        assert_eq!(parse_units("1.500000", 6).unwrap(), U256::from(1_500_000u64));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_units("-1", 6), Err(AmountError::Negative));
        assert!(matches!(
            parse_units("0.0000001", 6),
            Err(AmountError::TooPrecise { scale: 7, decimals: 6 })
        ));
        assert!(matches!(parse_units("abc", 6), Err(AmountError::Invalid(_))));
    }

    #[test]
    fn formats_units() {
        assert_eq!(format_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_units(U256::from(10_000u64), 6), "0.01");
        assert_eq!(format_units(U256::from(3_000_000u64), 6), "3");
        assert_eq!(format_units(U256::from(7u64), 0), "7");
    }
}
