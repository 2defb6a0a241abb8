//! Type-safe price representation.
//!
//! Prices are whole amounts in the store currency's smallest unit (the store
//! sells in a zero-decimal currency), so comparisons are exact integer
//! equality. Payment confirmation depends on that: an amount either matches
//! the frozen order total or it does not.

use std::iter::Sum;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// A non-fractional price amount.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    /// Zero price.
    pub const ZERO: Self = Self(0);

    /// Create a new price.
    #[must_use]
    pub const fn new(amount: i64) -> Self {
        Self(amount)
    }

    /// Get the raw amount.
    #[must_use]
    pub const fn amount(&self) -> i64 {
        self.0
    }

    /// Multiply by a quantity, saturating instead of overflowing.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(i64::from(quantity)))
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Price {
    fn from(amount: i64) -> Self {
        Self(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_times_and_sum() {
        let total: Price = [Price::new(1000).times(2), Price::new(500).times(3)]
            .into_iter()
            .sum();
        assert_eq!(total, Price::new(3500));
    }

    #[test]
    fn test_times_saturates() {
        assert_eq!(Price::new(i64::MAX).times(2), Price::new(i64::MAX));
    }
}
