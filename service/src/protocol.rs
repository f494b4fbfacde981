//! Wire format of the service.
//!
//! One JSON object per line in each direction. Requests are tagged by
//! `method`; an optional `id` is echoed back so callers can match responses
//! that arrive out of order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use earnzy_common::{
    Coins, Decision, Email, LedgerError, NotificationId, Role, SubmissionId, TaskId, WithdrawalId,
};
use earnzy_ledger::{NewAccount, NewTask, TaskEdit};

/// A request line.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestEnvelope {
    /// Caller-chosen correlation id.
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub request: Request,
}

/// Ledger operations and queries.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    // Accounts
    Register(NewAccount),
    GetAccount {
        email: Email,
    },
    UpdateRole {
        admin: Email,
        email: Email,
        role: Role,
    },
    RemoveAccount {
        admin: Email,
        email: Email,
    },

    // Tasks
    CreateTask {
        buyer: Email,
        task: NewTask,
    },
    EditTask {
        task_id: TaskId,
        buyer: Email,
        edit: TaskEdit,
    },
    DeleteTask {
        task_id: TaskId,
        caller: Email,
    },
    GetTask {
        task_id: TaskId,
    },
    TasksByBuyer {
        buyer: Email,
    },
    OpenTasks,

    // Submissions
    Submit {
        task_id: TaskId,
        worker: Email,
        details: String,
    },
    ApproveSubmission {
        submission_id: SubmissionId,
        buyer: Email,
    },
    RejectSubmission {
        submission_id: SubmissionId,
        buyer: Email,
    },
    SubmissionsForTask {
        task_id: TaskId,
    },
    SubmissionsByWorker {
        worker: Email,
    },
    ReviewQueue {
        buyer: Email,
    },

    // Withdrawals
    RequestWithdrawal {
        worker: Email,
        coins: Coins,
        payment_system: String,
        account_number: String,
    },
    DecideWithdrawal {
        withdrawal_id: WithdrawalId,
        admin: Email,
        decision: Decision,
        #[serde(default)]
        reason: Option<String>,
    },
    WithdrawalsByWorker {
        worker: Email,
    },
    PendingWithdrawals,

    // Notifications
    Notifications {
        email: Email,
    },
    MarkNotificationRead {
        email: Email,
        notification_id: NotificationId,
    },
    DeleteNotification {
        email: Email,
        notification_id: NotificationId,
    },

    // Audit
    Journal {
        email: Email,
    },
    Totals,
    PlatformStats,
    Metrics,
}

impl Request {
    /// Method name, for logging.
    pub fn method(&self) -> &'static str {
        match self {
            Request::Register(_) => "register",
            Request::GetAccount { .. } => "get_account",
            Request::UpdateRole { .. } => "update_role",
            Request::RemoveAccount { .. } => "remove_account",
            Request::CreateTask { .. } => "create_task",
            Request::EditTask { .. } => "edit_task",
            Request::DeleteTask { .. } => "delete_task",
            Request::GetTask { .. } => "get_task",
            Request::TasksByBuyer { .. } => "tasks_by_buyer",
            Request::OpenTasks => "open_tasks",
            Request::Submit { .. } => "submit",
            Request::ApproveSubmission { .. } => "approve_submission",
            Request::RejectSubmission { .. } => "reject_submission",
            Request::SubmissionsForTask { .. } => "submissions_for_task",
            Request::SubmissionsByWorker { .. } => "submissions_by_worker",
            Request::ReviewQueue { .. } => "review_queue",
            Request::RequestWithdrawal { .. } => "request_withdrawal",
            Request::DecideWithdrawal { .. } => "decide_withdrawal",
            Request::WithdrawalsByWorker { .. } => "withdrawals_by_worker",
            Request::PendingWithdrawals => "pending_withdrawals",
            Request::Notifications { .. } => "notifications",
            Request::MarkNotificationRead { .. } => "mark_notification_read",
            Request::DeleteNotification { .. } => "delete_notification",
            Request::Journal { .. } => "journal",
            Request::Totals => "totals",
            Request::PlatformStats => "platform_stats",
            Request::Metrics => "metrics",
        }
    }
}

/// Error payload of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable upper-snake code, e.g. `INSUFFICIENT_FUNDS`.
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<&LedgerError> for ErrorBody {
    fn from(error: &LedgerError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            field: error.field().map(str::to_string),
        }
    }
}

/// A response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    /// Successful response carrying `result`.
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    /// Response for a ledger error.
    pub fn failure(id: Option<Value>, error: &LedgerError) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Response for a line that is not a valid request.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            id: None,
            ok: false,
            result: None,
            error: Some(ErrorBody {
                code: "BAD_REQUEST".to_string(),
                message: message.into(),
                field: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_tagged_request() {
        let line = r#"{"id": 7, "method": "create_task", "buyer": "b@x.io",
            "task": {"title": "Like", "required_workers": 3, "payable_amount": 5,
                     "completion_date": "2026-12-31"}}"#;

        let envelope: RequestEnvelope = serde_json::from_str(line).unwrap();
        assert_eq!(envelope.id, Some(Value::from(7)));
        match envelope.request {
            Request::CreateTask { buyer, task } => {
                assert_eq!(buyer, Email::new("b@x.io"));
                assert_eq!(task.required_workers, 3);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_decode_unit_method() {
        let envelope: RequestEnvelope = serde_json::from_str(r#"{"method": "totals"}"#).unwrap();
        assert!(envelope.id.is_none());
        assert_eq!(envelope.request.method(), "totals");
    }

    #[test]
    fn test_unknown_method_rejected() {
        assert!(serde_json::from_str::<RequestEnvelope>(r#"{"method": "mint"}"#).is_err());
    }

    #[test]
    fn test_failure_shape() {
        let error = LedgerError::BelowMinimum {
            requested: Coins::new(100),
            minimum: Coins::new(200),
        };
        let json = serde_json::to_value(Response::failure(None, &error)).unwrap();

        assert_eq!(json["ok"], Value::Bool(false));
        assert_eq!(json["error"]["code"], "BELOW_MINIMUM");
        assert!(json.get("result").is_none());
        assert!(json.get("id").is_none());
    }
}
