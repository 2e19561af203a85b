//! Currency codes and decimal money conversions.
//!
//! Amounts are kept in the currency's standard unit (dollars, not cents) and
//! only converted to minor units at the payment processor boundary.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors produced when converting money amounts.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount is negative.
    #[error("amount cannot be negative: {0}")]
    Negative(Decimal),
    /// The amount does not fit in the processor's integer range.
    #[error("amount out of range: {0}")]
    OutOfRange(Decimal),
    /// The currency code is not supported.
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),
}

/// ISO 4217 currency codes accepted by the store.
///
/// All of these use two decimal places; currencies with other minor-unit
/// exponents are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Lowercase code as the payment processor expects it.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::USD => "usd",
            Self::EUR => "eur",
            Self::GBP => "gbp",
            Self::CAD => "cad",
            Self::AUD => "aud",
        }
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::USD),
            "eur" => Ok(Self::EUR),
            "gbp" => Ok(Self::GBP),
            "cad" => Ok(Self::CAD),
            "aud" => Ok(Self::AUD),
            other => Err(MoneyError::UnsupportedCurrency(other.to_owned())),
        }
    }
}

/// Round to a whole unit, half away from zero (`2.5 -> 3`, `-2.5 -> -3`).
#[must_use]
pub fn round_whole(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a standard-unit amount to processor minor units (`x100`).
///
/// # Errors
///
/// Returns [`MoneyError::Negative`] for negative amounts and
/// [`MoneyError::OutOfRange`] when the result does not fit in an `i64`.
pub fn to_minor_units(amount: Decimal) -> Result<i64, MoneyError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(MoneyError::Negative(amount));
    }
    let minor = (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    i64::try_from(minor).map_err(|_| MoneyError::OutOfRange(amount))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_whole_half_away_from_zero() {
        assert_eq!(round_whole(Decimal::new(25, 1)), Decimal::from(3));
        assert_eq!(round_whole(Decimal::new(-25, 1)), Decimal::from(-3));
        assert_eq!(round_whole(Decimal::new(24, 1)), Decimal::from(2));
    }

    #[test]
    fn test_to_minor_units() {
        assert_eq!(to_minor_units(Decimal::from(10_800)).unwrap(), 1_080_000);
        assert_eq!(to_minor_units(Decimal::new(1999, 2)).unwrap(), 1999);
        assert_eq!(to_minor_units(Decimal::ZERO).unwrap(), 0);
    }

    #[test]
    fn test_to_minor_units_rejects_negative() {
        assert!(matches!(
            to_minor_units(Decimal::from(-1)),
            Err(MoneyError::Negative(_))
        ));
    }

    #[test]
    fn test_currency_parse_is_case_insensitive() {
        assert_eq!("USD".parse::<CurrencyCode>().unwrap(), CurrencyCode::USD);
        assert_eq!(" eur ".parse::<CurrencyCode>().unwrap(), CurrencyCode::EUR);
        assert!("jpy".parse::<CurrencyCode>().is_err());
    }
}
