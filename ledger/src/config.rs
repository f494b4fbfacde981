//! Ledger configuration.

use std::time::Duration;

use earnzy_common::{
    Coins, Role, BUYER_STARTING_COINS, COINS_PER_DOLLAR, DEFAULT_STARTING_COINS,
    MIN_WITHDRAWAL_COINS, WORKER_STARTING_COINS,
};

/// Lock table configuration.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// How often idle lock keys are pruned.
    pub prune_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            prune_interval: Duration::from_secs(30),
        }
    }
}

/// Coin economics.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Starting balance for workers.
    pub worker_starting_coins: Coins,
    /// Starting balance for buyers.
    pub buyer_starting_coins: Coins,
    /// Starting balance when no role is given, and for admins.
    pub default_starting_coins: Coins,
    /// Smallest withdrawal a worker may request.
    pub min_withdrawal: Coins,
    /// Exchange rate for withdrawals.
    pub coins_per_dollar: u64,
    /// Lock table configuration.
    pub lock_config: LockConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            worker_starting_coins: WORKER_STARTING_COINS,
            buyer_starting_coins: BUYER_STARTING_COINS,
            default_starting_coins: DEFAULT_STARTING_COINS,
            min_withdrawal: MIN_WITHDRAWAL_COINS,
            coins_per_dollar: COINS_PER_DOLLAR,
            lock_config: LockConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Starting balance for a registration with the given role.
    pub fn starting_balance(&self, role: Option<Role>) -> Coins {
        match role {
            Some(Role::Worker) => self.worker_starting_coins,
            Some(Role::Buyer) => self.buyer_starting_coins,
            Some(Role::Admin) | None => self.default_starting_coins,
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.coins_per_dollar == 0 {
            return Err("Coins per dollar cannot be 0".to_string());
        }

        if self.min_withdrawal.is_zero() {
            return Err("Minimum withdrawal cannot be 0".to_string());
        }

        if self.lock_config.prune_interval.is_zero() {
            return Err("Lock prune interval cannot be 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.starting_balance(Some(Role::Buyer)), Coins::new(50));
        assert_eq!(config.starting_balance(None), Coins::new(10));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = LedgerConfig::default();
        config.coins_per_dollar = 0;
        assert!(config.validate().is_err());
    }
}
