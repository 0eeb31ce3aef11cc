//! Type-safe price representation using decimal arithmetic.
//!
//! The backend stores prices as floating point numbers, so `Price` travels
//! over the wire as a JSON number but is held as a [`Decimal`] in memory to
//! keep line totals and subtotals exact.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price in the store currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(#[serde(with = "rust_decimal::serde::float")] Decimal);

impl Price {
    /// A zero price.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create a price from minor units (e.g. kopecks).
    #[must_use]
    pub fn from_minor(minor: i64) -> Self {
        Self(Decimal::new(minor, 2))
    }

    /// Get the decimal amount.
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

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} ₽", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_price_deserializes_from_float_and_integer() {
        let p: Price = serde_json::from_str("100").unwrap();
        assert_eq!(p, Price::new(Decimal::from(100)));
        let p: Price = serde_json::from_str("250.5").unwrap();
        assert_eq!(p, Price::from_minor(25050));
    }

    #[test]
    fn test_price_serializes_as_number() {
        let json = serde_json::to_value(Price::from_minor(1999)).unwrap();
        assert!(json.is_number());
        assert!((json.as_f64().unwrap() - 19.99).abs() < f64::EPSILON);
    }

    #[test]
    fn test_line_total_and_sum() {
        let subtotal: Price = [Price::from_minor(10_000).times(2), Price::from_minor(550).times(3)]
            .into_iter()
            .sum();
        assert_eq!(subtotal, Price::from_minor(21_650));
    }

    #[test]
    fn test_display() {
        assert_eq!(Price::from_minor(12_345).to_string(), "123.45 ₽");
    }
}
