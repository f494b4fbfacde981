//! Coin amounts and their cash equivalent.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// A whole number of platform coins. Coins are never fractional and never negative.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Coins(u64);

impl Coins {
    /// Zero coins.
    pub const ZERO: Coins = Coins(0);

    /// Create a coin amount.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw coin count.
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Check if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Add, returning `None` on overflow.
    pub fn checked_add(self, other: Coins) -> Option<Coins> {
        self.0.checked_add(other.0).map(Coins)
    }

    /// Subtract, returning `None` if the result would be negative.
    pub fn checked_sub(self, other: Coins) -> Option<Coins> {
        self.0.checked_sub(other.0).map(Coins)
    }

    /// Subtract, flooring at zero.
    pub fn saturating_sub(self, other: Coins) -> Coins {
        Coins(self.0.saturating_sub(other.0))
    }

    /// Multiply by a count, returning `None` on overflow.
    pub fn checked_mul(self, count: u64) -> Option<Coins> {
        self.0.checked_mul(count).map(Coins)
    }

    /// Convert to the cash amount paid out for these coins.
    pub fn to_cash(&self, coins_per_dollar: u64) -> CashAmount {
        if coins_per_dollar == 0 {
            return CashAmount(Decimal::ZERO);
        }
        CashAmount((Decimal::from(self.0) / Decimal::from(coins_per_dollar)).round_dp(2))
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} coins", self.0)
    }
}

impl From<u64> for Coins {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Sum for Coins {
    fn sum<I: Iterator<Item = Coins>>(iter: I) -> Self {
        Coins(iter.map(|c| c.0).sum())
    }
}

impl<'a> Sum<&'a Coins> for Coins {
    fn sum<I: Iterator<Item = &'a Coins>>(iter: I) -> Self {
        Coins(iter.map(|c| c.0).sum())
    }
}

/// A signed coin movement applied to a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinDelta {
    /// Increase the balance.
    Credit(Coins),
    /// Decrease the balance.
    Debit(Coins),
}

impl CoinDelta {
    /// Build a delta from the difference `new - old`.
    pub fn between(old: Coins, new: Coins) -> Self {
        if new >= old {
            CoinDelta::Debit(Coins(new.0 - old.0))
        } else {
            CoinDelta::Credit(Coins(old.0 - new.0))
        }
    }

    /// Absolute amount moved.
    pub fn amount(&self) -> Coins {
        match self {
            CoinDelta::Credit(c) | CoinDelta::Debit(c) => *c,
        }
    }

    /// Check if no coins move.
    pub fn is_zero(&self) -> bool {
        self.amount().is_zero()
    }

    /// Apply to a balance. Fails instead of going below zero.
    pub fn apply(&self, balance: Coins) -> Option<Coins> {
        match self {
            CoinDelta::Credit(c) => balance.checked_add(*c),
            CoinDelta::Debit(c) => balance.checked_sub(*c),
        }
    }
}

/// Cash equivalent of a coin amount, in US dollars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CashAmount(Decimal);

impl CashAmount {
    /// Get the dollar value.
    pub fn dollars(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for CashAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_arithmetic() {
        let a = Coins::new(10);
        let b = Coins::new(25);

        assert_eq!(a.checked_add(b), Some(Coins::new(35)));
        assert_eq!(a.checked_sub(b), None);
        assert_eq!(b.checked_sub(a), Some(Coins::new(15)));
        assert_eq!(a.saturating_sub(b), Coins::ZERO);
        assert_eq!(Coins::new(5).checked_mul(3), Some(Coins::new(15)));
        assert_eq!(Coins::new(u64::MAX).checked_mul(2), None);
    }

    #[test]
    fn test_cash_conversion() {
        assert_eq!(Coins::new(200).to_cash(20).dollars(), Decimal::from(10));
        assert_eq!(Coins::new(210).to_cash(20).to_string(), "$10.50");
        assert_eq!(Coins::new(200).to_cash(0).dollars(), Decimal::ZERO);
    }

    #[test]
    fn test_delta_between() {
        assert_eq!(
            CoinDelta::between(Coins::new(10), Coins::new(20)),
            CoinDelta::Debit(Coins::new(10))
        );
        assert_eq!(
            CoinDelta::between(Coins::new(20), Coins::new(5)),
            CoinDelta::Credit(Coins::new(15))
        );
        assert!(CoinDelta::between(Coins::new(7), Coins::new(7)).is_zero());
    }

    #[test]
    fn test_delta_apply_floors_at_zero() {
        assert_eq!(CoinDelta::Debit(Coins::new(11)).apply(Coins::new(10)), None);
        assert_eq!(
            CoinDelta::Debit(Coins::new(10)).apply(Coins::new(10)),
            Some(Coins::ZERO)
        );
        assert_eq!(
            CoinDelta::Credit(Coins::new(5)).apply(Coins::new(10)),
            Some(Coins::new(15))
        );
    }

    #[test]
    fn test_sum() {
        let total: Coins = [Coins::new(1), Coins::new(2), Coins::new(3)].iter().sum();
        assert_eq!(total, Coins::new(6));
    }
}
