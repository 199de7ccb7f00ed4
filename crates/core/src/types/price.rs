//! Type-safe price representation using decimal arithmetic.
//!
//! The backend stores prices as floating point numbers and sends them as JSON
//! numbers. Cart totals are computed client-side, so amounts are held as
//! [`Decimal`] to keep `19.99 * 3` equal to `59.97` rather than
//! `59.970000000000006`.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price cannot be negative (got {0})")]
    Negative(Decimal),
    /// The input could not be parsed as a decimal amount.
    #[error("invalid price: {0}")]
    Invalid(String),
}

/// A non-negative monetary amount in the store currency.
///
/// ## Examples
///
/// ```
/// use rust_decimal::Decimal;
/// use storefront_core::Price;
///
/// let unit = Price::new(Decimal::new(1999, 2)).unwrap();
/// assert_eq!(unit.times(3).to_string(), "59.97");
///
/// assert!(Price::new(Decimal::new(-1, 0)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price(Decimal);

impl Price {
    /// A zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] if the amount is below zero.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative(amount));
        }
        Ok(Self(amount))
    }

    /// Create a price from an amount in cents.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] if `cents` is below zero.
    pub fn from_cents(cents: i64) -> Result<Self, PriceError> {
        Self::new(Decimal::new(cents, 2))
    }

    /// Get the underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units at this unit price.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl std::str::FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount: Decimal = s
            .trim()
            .trim_start_matches('$')
            .parse()
            .map_err(|_| PriceError::Invalid(s.to_owned()))?;
        Self::new(amount)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

// The backend speaks JSON numbers, not decimal strings.
impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        rust_decimal::serde::float::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = <Decimal as Deserialize>::deserialize(deserializer)?;
        Self::new(amount).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_rejected() {
        assert!(matches!(
            Price::new(Decimal::new(-5, 1)),
            Err(PriceError::Negative(_))
        ));
        assert!(Price::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_times_and_sum_are_exact() {
        let a = Price::from_cents(1999).unwrap();
        let b = Price::from_cents(250).unwrap();
        let total: Price = [a.times(3), b.times(2)].into_iter().sum();
        assert_eq!(total.amount(), Decimal::new(6497, 2));
    }

    #[test]
    fn test_deserializes_json_numbers() {
        let price: Price = serde_json::from_str("19.99").unwrap();
        assert_eq!(price, Price::from_cents(1999).unwrap());

        let whole: Price = serde_json::from_str("10").unwrap();
        assert_eq!(whole.to_string(), "10.00");

        let quoted: Price = serde_json::from_str("\"7.25\"").unwrap();
        assert_eq!(quoted, Price::from_cents(725).unwrap());

        assert!(serde_json::from_str::<Price>("-1.5").is_err());
    }

    #[test]
    fn test_serializes_as_number() {
        let json = serde_json::to_string(&Price::from_cents(1250).unwrap()).unwrap();
        assert_eq!(json, "12.5");
    }

    #[test]
    fn test_from_str_accepts_dollar_sign() {
        let price: Price = "$4.50".parse().unwrap();
        assert_eq!(price.to_string(), "4.50");
        assert!("cheap".parse::<Price>().is_err());
    }
}
