//! Worker withdrawal requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use earnzy_common::{
    CashAmount, Coins, Email, InvalidTransition, LedgerError, Result, ReviewStatus, WithdrawalId,
};

/// Where an approved withdrawal is paid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutDestination {
    /// Payment system name (e.g. "bkash", "stripe").
    pub payment_system: String,
    /// Account identifier within the payment system.
    pub account_number: String,
}

impl PayoutDestination {
    /// Create a payout destination.
    pub fn new(payment_system: impl Into<String>, account_number: impl Into<String>) -> Self {
        Self {
            payment_system: payment_system.into(),
            account_number: account_number.into(),
        }
    }

    /// Check both parts are present.
    pub fn validate(&self) -> Result<()> {
        if self.payment_system.trim().is_empty() {
            return Err(LedgerError::validation(
                "payment_system",
                "Payment system is required",
            ));
        }
        if self.account_number.trim().is_empty() {
            return Err(LedgerError::validation(
                "account_number",
                "Account number is required",
            ));
        }
        Ok(())
    }
}

/// A request to convert held coins into an off-platform payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    /// Unique withdrawal identifier.
    pub id: WithdrawalId,
    pub worker_email: Email,
    pub worker_name: String,
    /// Coins debited from the worker when the request was made.
    pub coins: Coins,
    /// Cash equivalent of `coins`.
    pub amount: CashAmount,
    pub destination: PayoutDestination,
    pub status: ReviewStatus,
    /// Reviewer's note, if any.
    pub reason: Option<String>,
    /// Admin that decided the request.
    pub decided_by: Option<Email>,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Withdrawal {
    /// Check if the coins are still on hold.
    pub fn is_pending(&self) -> bool {
        self.status == ReviewStatus::Pending
    }

    /// Record an admin decision.
    pub fn decide(
        &mut self,
        next: ReviewStatus,
        admin: Email,
        reason: Option<String>,
    ) -> std::result::Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.decided_by = Some(admin);
        self.reason = reason;
        self.decided_at = Some(Utc::now());
        Ok(())
    }
}
