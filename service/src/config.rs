//! Service configuration.

use std::str::FromStr;
use std::time::Duration;

use earnzy_common::Coins;
use earnzy_ledger::LedgerConfig;

/// Main service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Coin economics and lock table settings.
    pub ledger: LedgerConfig,
    /// Requests longer than this are rejected unread.
    pub max_request_bytes: usize,
    /// How long shutdown waits for in-flight requests.
    pub drain_timeout: Duration,
    /// Log level.
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            max_request_bytes: 64 * 1024,
            drain_timeout: Duration::from_secs(10),
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Unparseable values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(coins) = parsed::<u64>(&lookup, "EARNZY_WORKER_STARTING_COINS") {
            config.ledger.worker_starting_coins = Coins::new(coins);
        }

        if let Some(coins) = parsed::<u64>(&lookup, "EARNZY_BUYER_STARTING_COINS") {
            config.ledger.buyer_starting_coins = Coins::new(coins);
        }

        if let Some(coins) = parsed::<u64>(&lookup, "EARNZY_DEFAULT_STARTING_COINS") {
            config.ledger.default_starting_coins = Coins::new(coins);
        }

        if let Some(coins) = parsed::<u64>(&lookup, "EARNZY_MIN_WITHDRAWAL_COINS") {
            config.ledger.min_withdrawal = Coins::new(coins);
        }

        if let Some(rate) = parsed(&lookup, "EARNZY_COINS_PER_DOLLAR") {
            config.ledger.coins_per_dollar = rate;
        }

        if let Some(secs) = parsed(&lookup, "EARNZY_LOCK_PRUNE_SECS") {
            config.ledger.lock_config.prune_interval = Duration::from_secs(secs);
        }

        if let Some(bytes) = parsed(&lookup, "EARNZY_MAX_REQUEST_BYTES") {
            config.max_request_bytes = bytes;
        }

        if let Some(secs) = parsed(&lookup, "EARNZY_DRAIN_TIMEOUT_SECS") {
            config.drain_timeout = Duration::from_secs(secs);
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.ledger.validate()?;

        if self.max_request_bytes == 0 {
            return Err("Max request size cannot be 0".to_string());
        }

        if self.log_level.trim().is_empty() {
            return Err("Log level cannot be empty".to_string());
        }

        Ok(())
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}
