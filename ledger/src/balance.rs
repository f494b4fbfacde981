//! Ledger-wide coin totals.

use serde::{Deserialize, Serialize};

use earnzy_common::Coins;

/// Where every coin in the system currently sits.
///
/// `total()` only changes when an account is created or force-removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    /// Sum of account balances.
    pub balances: Coins,
    /// Sum of escrow held by open tasks.
    pub escrow: Coins,
    /// Sum of pending withdrawal holds.
    pub holds: Coins,
}

impl LedgerTotals {
    /// All coins in circulation.
    pub fn total(&self) -> Coins {
        Coins::new(self.balances.value() + self.escrow.value() + self.holds.value())
    }
}

/// Platform overview for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStats {
    pub workers: usize,
    pub buyers: usize,
    pub admins: usize,
    pub tasks: usize,
    pub pending_submissions: usize,
    pub pending_withdrawals: usize,
    /// Coins paid out through approved withdrawals.
    pub coins_paid_out: Coins,
    pub totals: LedgerTotals,
}
