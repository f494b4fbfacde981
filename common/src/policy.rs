//! Platform economics constants.

use crate::Coins;

/// Starting balance for a worker account.
pub const WORKER_STARTING_COINS: Coins = Coins::new(10);

/// Starting balance for a buyer account.
pub const BUYER_STARTING_COINS: Coins = Coins::new(50);

/// Starting balance when no role is given (e.g. social sign-up).
pub const DEFAULT_STARTING_COINS: Coins = Coins::new(10);

/// Smallest withdrawal a worker may request (200 coins, $10).
pub const MIN_WITHDRAWAL_COINS: Coins = Coins::new(200);

/// Fixed exchange rate used for withdrawals.
pub const COINS_PER_DOLLAR: u64 = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_is_ten_dollars() {
        assert_eq!(
            MIN_WITHDRAWAL_COINS.to_cash(COINS_PER_DOLLAR).dollars(),
            rust_decimal::Decimal::from(10)
        );
    }
}
