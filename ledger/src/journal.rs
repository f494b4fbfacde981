//! Balance journal: one entry per balance change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use earnzy_common::{CoinDelta, Coins, Email, EntryId};

/// Direction of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Balance increased.
    Credit,
    /// Balance decreased.
    Debit,
}

/// Why a balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryReason {
    /// Starting balance on sign-up.
    Registration,
    /// Coins moved into escrow when a task was posted.
    TaskEscrow,
    /// Difference charged or returned when a task was edited.
    TaskEdit,
    /// Unused escrow returned when a task was deleted.
    TaskRefund,
    /// Payout for an approved submission.
    SubmissionPayout,
    /// Coins held for a withdrawal request.
    WithdrawalHold,
    /// Hold returned after a rejected withdrawal.
    WithdrawalRefund,
}

/// A single journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique entry ID.
    pub id: EntryId,
    /// Account affected.
    pub account: Email,
    pub entry_type: EntryType,
    pub amount: Coins,
    /// Balance after this entry.
    pub balance_after: Coins,
    pub reason: EntryReason,
    /// Task, submission or withdrawal id that caused the change.
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Create an entry for `delta` applied to `account`.
    pub fn record(
        account: Email,
        delta: CoinDelta,
        balance_after: Coins,
        reason: EntryReason,
        reference: Option<String>,
    ) -> Self {
        let entry_type = match delta {
            CoinDelta::Credit(_) => EntryType::Credit,
            CoinDelta::Debit(_) => EntryType::Debit,
        };

        Self {
            id: EntryId::new(),
            account,
            entry_type,
            amount: delta.amount(),
            balance_after,
            reason,
            reference,
            created_at: Utc::now(),
        }
    }

    /// Signed change to the balance.
    pub fn signed_amount(&self) -> i128 {
        match self.entry_type {
            EntryType::Credit => i128::from(self.amount.value()),
            EntryType::Debit => -i128::from(self.amount.value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_direction() {
        let account = Email::new("buyer@example.com");

        let debit = JournalEntry::record(
            account.clone(),
            CoinDelta::Debit(Coins::new(15)),
            Coins::new(35),
            EntryReason::TaskEscrow,
            None,
        );
        assert_eq!(debit.entry_type, EntryType::Debit);
        assert_eq!(debit.signed_amount(), -15);

        let credit = JournalEntry::record(
            account,
            CoinDelta::Credit(Coins::new(10)),
            Coins::new(45),
            EntryReason::TaskRefund,
            Some("task".to_string()),
        );
        assert_eq!(credit.entry_type, EntryType::Credit);
        assert_eq!(credit.signed_amount(), 10);
    }
}
