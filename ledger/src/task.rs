//! Posted tasks and the coins escrowed against them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use earnzy_common::{Coins, Email, LedgerError, Result, TaskId, TaskStatus};

/// A buyer's posted task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,
    pub title: String,
    pub detail: String,
    /// Worker slots offered. Rejections give a slot back by incrementing this.
    pub required_workers: u32,
    /// Coins paid per approved submission.
    pub payable_amount: Coins,
    /// `required_workers * payable_amount` as of creation or the last edit.
    pub total_payable: Coins,
    /// Coins still held for future payouts.
    pub escrow: Coins,
    pub completion_date: DateTime<Utc>,
    /// What workers must hand in.
    pub submission_info: String,
    pub image_url: String,
    /// Owning buyer. Immutable after creation.
    pub buyer_email: Email,
    pub buyer_name: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Check if `email` owns this task.
    pub fn is_owned_by(&self, email: &Email) -> bool {
        &self.buyer_email == email
    }

    /// Coins owed back to the buyer if the task is deleted now.
    ///
    /// `(required_workers - approved) * payable_amount`, floored at zero and
    /// never more than what escrow still holds.
    pub fn refund_due(&self, approved: u32) -> Coins {
        let open_slots = self.required_workers.saturating_sub(approved);
        self.payable_amount
            .checked_mul(u64::from(open_slots))
            .unwrap_or(self.escrow)
            .min(self.escrow)
    }

    /// Worker slots escrow can pay for, counting the `approved` ones already paid.
    ///
    /// A rejection adds a slot to `required_workers` without funding it, so
    /// this can be lower than `required_workers` until the buyer tops up.
    pub fn funded_slots(&self, approved: u32) -> u32 {
        let payable = self.payable_amount.value();
        let unpaid = if payable == 0 {
            0
        } else {
            u32::try_from(self.escrow.value() / payable).unwrap_or(u32::MAX)
        };
        self.required_workers.min(approved.saturating_add(unpaid))
    }
}

/// Fields a buyer supplies when posting a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub detail: String,
    pub required_workers: i64,
    pub payable_amount: i64,
    /// RFC 3339 timestamp or `YYYY-MM-DD`.
    pub completion_date: String,
    #[serde(default)]
    pub submission_info: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Validated economics and date of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TaskTerms {
    pub required_workers: u32,
    pub payable_amount: Coins,
    pub total_payable: Coins,
    pub completion_date: DateTime<Utc>,
}

impl NewTask {
    /// Validate the request into task terms.
    pub(crate) fn terms(&self) -> Result<TaskTerms> {
        if self.title.trim().is_empty() {
            return Err(LedgerError::validation("title", "Title is required"));
        }
        let required_workers = parse_required_workers(self.required_workers)?;
        let payable_amount = parse_payable_amount(self.payable_amount)?;
        let completion_date = parse_completion_date(&self.completion_date)?;
        let total_payable = total_for(required_workers, payable_amount)?;

        Ok(TaskTerms {
            required_workers,
            payable_amount,
            total_payable,
            completion_date,
        })
    }
}

/// Fields a buyer may change on an existing task. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskEdit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub required_workers: Option<i64>,
    #[serde(default)]
    pub payable_amount: Option<i64>,
    #[serde(default)]
    pub completion_date: Option<String>,
    #[serde(default)]
    pub submission_info: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl TaskEdit {
    /// Apply the edit to a copy of `task`, recomputing `total_payable`.
    ///
    /// Escrow is left untouched; the caller moves the coin difference.
    pub(crate) fn apply_to(&self, task: &Task) -> Result<Task> {
        let mut updated = task.clone();

        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(LedgerError::validation("title", "Title cannot be empty"));
            }
            updated.title = title.clone();
        }
        if let Some(detail) = &self.detail {
            updated.detail = detail.clone();
        }
        if let Some(workers) = self.required_workers {
            updated.required_workers = parse_required_workers(workers)?;
        }
        if let Some(amount) = self.payable_amount {
            updated.payable_amount = parse_payable_amount(amount)?;
        }
        if let Some(date) = &self.completion_date {
            updated.completion_date = parse_completion_date(date)?;
        }
        if let Some(info) = &self.submission_info {
            updated.submission_info = info.clone();
        }
        if let Some(url) = &self.image_url {
            updated.image_url = url.clone();
        }

        updated.total_payable = total_for(updated.required_workers, updated.payable_amount)?;
        updated.updated_at = Utc::now();
        Ok(updated)
    }
}

fn parse_required_workers(value: i64) -> Result<u32> {
    if value <= 0 {
        return Err(LedgerError::validation(
            "required_workers",
            "Required workers must be a positive number",
        ));
    }
    u32::try_from(value)
        .map_err(|_| LedgerError::validation("required_workers", "Required workers is too large"))
}

fn parse_payable_amount(value: i64) -> Result<Coins> {
    if value <= 0 {
        return Err(LedgerError::validation(
            "payable_amount",
            "Payable amount must be a positive number",
        ));
    }
    Ok(Coins::new(value as u64))
}

fn total_for(required_workers: u32, payable_amount: Coins) -> Result<Coins> {
    payable_amount
        .checked_mul(u64::from(required_workers))
        .ok_or_else(|| LedgerError::validation("payable_amount", "Total payable is too large"))
}

/// Parse a completion date given as RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_completion_date(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            LedgerError::validation(
                "completion_date",
                format!("Unparseable completion date: {value:?}"),
            )
        })
}
