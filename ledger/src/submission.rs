//! Worker submissions against tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use earnzy_common::{Coins, Email, InvalidTransition, ReviewStatus, SubmissionId, TaskId};

/// A worker's attempt at a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Unique submission identifier.
    pub id: SubmissionId,
    /// Task this submission answers.
    pub task_id: TaskId,
    pub task_title: String,
    /// Coins the worker earns on approval, as of submission time.
    pub payable_amount: Coins,
    /// Submitting worker.
    pub worker_email: Email,
    pub worker_name: String,
    pub buyer_email: Email,
    /// Opaque proof of work.
    pub details: String,
    pub status: ReviewStatus,
    pub submitted_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Submission {
    /// Check if the submission still awaits review.
    pub fn is_pending(&self) -> bool {
        self.status == ReviewStatus::Pending
    }

    /// Move to a new status.
    pub fn transition_to(&mut self, next: ReviewStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.decided_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Submission {
        Submission {
            id: SubmissionId::new(),
            task_id: TaskId::new(),
            task_title: "Follow a page".to_string(),
            payable_amount: Coins::new(5),
            worker_email: Email::new("worker@example.com"),
            worker_name: "Worker".to_string(),
            buyer_email: Email::new("buyer@example.com"),
            details: "done".to_string(),
            status: ReviewStatus::Pending,
            submitted_at: Utc::now(),
            decided_at: None,
        }
    }

    #[test]
    fn test_approve_is_terminal() {
        let mut submission = pending();
        submission.transition_to(ReviewStatus::Approved).unwrap();
        assert!(submission.decided_at.is_some());

        let err = submission
            .transition_to(ReviewStatus::Rejected)
            .unwrap_err();
        assert_eq!(err.from, ReviewStatus::Approved);
        assert_eq!(submission.status, ReviewStatus::Approved);
    }

    #[test]
    fn test_reject_is_terminal() {
        let mut submission = pending();
        submission.transition_to(ReviewStatus::Rejected).unwrap();
        assert!(!submission.is_pending());
        assert!(submission.transition_to(ReviewStatus::Approved).is_err());
    }
}
