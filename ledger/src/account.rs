//! Account definitions for the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use earnzy_common::{CoinDelta, Coins, Email, LedgerError, Result, Role};

/// A user account holding a coin balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account key.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Profile picture URL.
    pub profile_pic: String,
    /// Account role.
    pub role: Role,
    /// Spendable coins. Only the ledger writes this field.
    pub balance: Coins,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with its starting balance.
    pub fn new(
        email: Email,
        name: impl Into<String>,
        profile_pic: impl Into<String>,
        role: Role,
        balance: Coins,
    ) -> Self {
        let now = Utc::now();

        Self {
            email,
            name: name.into(),
            profile_pic: profile_pic.into(),
            role,
            balance,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account has admin rights.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Check if the account can cover an amount.
    pub fn has_sufficient_funds(&self, amount: Coins) -> bool {
        self.balance >= amount
    }

    /// Apply a balance change. Fails instead of letting the balance go negative.
    pub fn adjust_balance(&mut self, delta: CoinDelta) -> Result<Coins> {
        let balance = delta.apply(self.balance).ok_or_else(|| match delta {
            CoinDelta::Debit(required) => LedgerError::InsufficientFunds {
                required,
                available: self.balance,
            },
            CoinDelta::Credit(_) => LedgerError::invalid_state("balance overflow"),
        })?;

        self.balance = balance;
        self.updated_at = Utc::now();
        Ok(balance)
    }

    /// Change the role.
    pub fn set_role(&mut self, role: Role) {
        self.role = role;
        self.updated_at = Utc::now();
    }
}

/// Registration request for a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub email: Email,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub profile_pic: Option<String>,
    /// Role requested at sign-up. Missing means a default (social) sign-up.
    #[serde(default)]
    pub role: Option<Role>,
}

/// Outcome of an idempotent registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "account", rename_all = "snake_case")]
pub enum Registration {
    /// A new account was created.
    Created(Account),
    /// The email was already registered; nothing changed.
    AlreadyExists(Account),
}

impl Registration {
    /// The account either way.
    pub fn account(&self) -> &Account {
        match self {
            Registration::Created(a) | Registration::AlreadyExists(a) => a,
        }
    }

    /// Check if this call created the account.
    pub fn was_created(&self) -> bool {
        matches!(self, Registration::Created(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_funds_check() {
        let account = Account::new(
            Email::new("buyer@example.com"),
            "Buyer",
            "",
            Role::Buyer,
            Coins::new(50),
        );

        assert!(account.has_sufficient_funds(Coins::new(50)));
        assert!(!account.has_sufficient_funds(Coins::new(51)));
        assert!(!account.is_admin());
    }

    #[test]
    fn test_adjust_balance_floors_at_zero() {
        let mut account = Account::new(
            Email::new("worker@example.com"),
            "Worker",
            "",
            Role::Worker,
            Coins::new(10),
        );

        let err = account
            .adjust_balance(CoinDelta::Debit(Coins::new(11)))
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                required: Coins::new(11),
                available: Coins::new(10),
            }
        );
        assert_eq!(account.balance, Coins::new(10));

        account.adjust_balance(CoinDelta::Debit(Coins::new(10))).unwrap();
        assert_eq!(account.balance, Coins::ZERO);
        account.adjust_balance(CoinDelta::Credit(Coins::new(5))).unwrap();
        assert_eq!(account.balance, Coins::new(5));
    }

    #[test]
    fn test_new_account_defaults() {
        let request: NewAccount =
            serde_json::from_str(r#"{"email": "someone@example.com"}"#).unwrap();
        assert_eq!(request.role, None);
        assert_eq!(request.name, "");
        assert!(request.profile_pic.is_none());
    }
}
