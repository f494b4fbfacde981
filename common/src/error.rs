//! Error types for ledger operations.

use crate::{Coins, Email, InvalidTransition, TaskId};
use std::fmt;
use thiserror::Error;

/// Kind of record an operation referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Account,
    Task,
    Submission,
    Withdrawal,
    Notification,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Entity::Account => "Account",
            Entity::Task => "Task",
            Entity::Submission => "Submission",
            Entity::Withdrawal => "Withdrawal",
            Entity::Notification => "Notification",
        };
        f.write_str(s)
    }
}

/// Main error type for ledger operations.
///
/// Every variant is local and recoverable: the operation that returned it
/// left all records unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    /// Caller does not own the record or lacks the required role.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Record is not in the state the operation requires.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Balance or escrow cannot cover the amount.
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Coins, available: Coins },

    /// Withdrawal below the platform minimum.
    #[error("Withdrawal of {requested} is below the minimum of {minimum}")]
    BelowMinimum { requested: Coins, minimum: Coins },

    /// Worker already submitted against this task.
    #[error("Duplicate submission by {worker} for task {task_id}")]
    DuplicateSubmission { task_id: TaskId, worker: Email },

    /// Malformed or missing input.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Store rejected the commit. Nothing was applied.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Create a not-found error.
    pub fn not_found(entity: Entity, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create an unauthorized error.
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create an invalid-state error.
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a validation error for a field.
    pub fn validation<S: Into<String>, F: Into<String>>(field: F, msg: S) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Get error code for the request/response boundary.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::Unauthorized(_) => "UNAUTHORIZED",
            LedgerError::InvalidState(_) => "INVALID_STATE",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::BelowMinimum { .. } => "BELOW_MINIMUM",
            LedgerError::DuplicateSubmission { .. } => "DUPLICATE_SUBMISSION",
            LedgerError::Validation { .. } => "VALIDATION_ERROR",
            LedgerError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Field that caused a validation failure, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            LedgerError::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}

impl From<InvalidTransition> for LedgerError {
    fn from(e: InvalidTransition) -> Self {
        LedgerError::InvalidState(e.to_string())
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReviewStatus;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LedgerError::not_found(Entity::Task, "abc").error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            LedgerError::InsufficientFunds {
                required: Coins::new(15),
                available: Coins::new(10),
            }
            .error_code(),
            "INSUFFICIENT_FUNDS"
        );
        assert_eq!(
            LedgerError::validation("payable_amount", "must be positive").error_code(),
            "VALIDATION_ERROR"
        );
    }

    #[test]
    fn test_messages() {
        let err = LedgerError::not_found(Entity::Account, "a@b.c");
        assert_eq!(err.to_string(), "Account not found: a@b.c");

        let err = LedgerError::BelowMinimum {
            requested: Coins::new(150),
            minimum: Coins::new(200),
        };
        assert_eq!(
            err.to_string(),
            "Withdrawal of 150 coins is below the minimum of 200 coins"
        );
    }

    #[test]
    fn test_transition_maps_to_invalid_state() {
        let err: LedgerError = InvalidTransition {
            from: ReviewStatus::Approved,
            to: ReviewStatus::Rejected,
        }
        .into();
        assert_eq!(err.error_code(), "INVALID_STATE");
        assert_eq!(err.field(), None);
    }
}
