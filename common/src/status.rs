//! Roles and lifecycle state machines for ledger records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role an account registers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Completes tasks and withdraws coins.
    Worker,
    /// Posts tasks and pays workers.
    Buyer,
    /// Reviews withdrawals and manages users.
    Admin,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Worker => "worker",
            Role::Buyer => "buyer",
            Role::Admin => "admin",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Worker
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task status. Tasks stay active until they are deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepting submissions.
    Active,
}

impl TaskStatus {
    /// Check if workers may submit against the task.
    pub fn accepts_submissions(&self) -> bool {
        matches!(self, TaskStatus::Active)
    }
}

/// Review status shared by submissions and withdrawal requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Awaiting a decision.
    Pending,
    /// Accepted by the reviewer.
    Approved,
    /// Declined by the reviewer.
    Rejected,
}

impl ReviewStatus {
    /// Check if this is a final state.
    pub fn is_final(&self) -> bool {
        matches!(self, ReviewStatus::Approved | ReviewStatus::Rejected)
    }

    /// Get valid next states from current state.
    pub fn valid_transitions(&self) -> &[ReviewStatus] {
        match self {
            ReviewStatus::Pending => &[ReviewStatus::Approved, ReviewStatus::Rejected],
            ReviewStatus::Approved => &[],
            ReviewStatus::Rejected => &[],
        }
    }

    /// Check if transition to given state is valid.
    pub fn can_transition_to(&self, next: ReviewStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A reviewer's verdict on a pending record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// Status the record moves to under this decision.
    pub fn target_status(&self) -> ReviewStatus {
        match self {
            Decision::Approve => ReviewStatus::Approved,
            Decision::Reject => ReviewStatus::Rejected,
        }
    }
}

/// Attempted a transition the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ReviewStatus,
    pub to: ReviewStatus,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot move from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}
