//! Record storage behind the ledger.
//!
//! The ledger never writes records one at a time. It stages every change of
//! an operation in a [`WriteBatch`] and hands the batch to
//! [`LedgerStore::commit`], which applies all of it or none of it.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::trace;

use earnzy_common::{
    Coins, Email, LedgerError, Result, ReviewStatus, SubmissionId, TaskId, WithdrawalId,
};

use crate::account::Account;
use crate::balance::LedgerTotals;
use crate::journal::JournalEntry;
use crate::submission::Submission;
use crate::task::Task;
use crate::withdrawal::Withdrawal;

/// One staged change.
#[derive(Debug, Clone)]
pub enum Write {
    PutAccount(Account),
    DeleteAccount(Email),
    PutTask(Task),
    DeleteTask(TaskId),
    PutSubmission(Submission),
    DeleteSubmission(SubmissionId),
    PutWithdrawal(Withdrawal),
    DeleteWithdrawal(WithdrawalId),
    AppendJournal(JournalEntry),
}

/// Changes that must be committed together.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a change.
    pub fn push(&mut self, write: Write) -> &mut Self {
        self.writes.push(write);
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Persistence for accounts, tasks, submissions, withdrawals and the journal.
///
/// Reads return owned snapshots. Writes only happen through `commit`.
pub trait LedgerStore: Send + Sync {
    fn account(&self, email: &Email) -> Option<Account>;
    fn accounts(&self) -> Vec<Account>;

    fn task(&self, id: &TaskId) -> Option<Task>;
    fn tasks(&self) -> Vec<Task>;
    fn tasks_by_buyer(&self, buyer: &Email) -> Vec<Task>;

    fn submission(&self, id: &SubmissionId) -> Option<Submission>;
    fn submissions_for_task(&self, task_id: &TaskId) -> Vec<Submission>;
    fn submissions_by_worker(&self, worker: &Email) -> Vec<Submission>;

    fn withdrawal(&self, id: &WithdrawalId) -> Option<Withdrawal>;
    fn withdrawals(&self) -> Vec<Withdrawal>;
    fn withdrawals_by_worker(&self, worker: &Email) -> Vec<Withdrawal>;

    fn journal(&self, account: &Email) -> Vec<JournalEntry>;

    /// Coin totals read from one consistent snapshot.
    fn totals(&self) -> LedgerTotals;

    /// Apply every write in `batch`, or none of them on error.
    fn commit(&self, batch: WriteBatch) -> Result<()>;
}

#[derive(Default)]
struct Tables {
    accounts: HashMap<Email, Account>,
    tasks: HashMap<TaskId, Task>,
    submissions: HashMap<SubmissionId, Submission>,
    task_submissions: HashMap<TaskId, BTreeSet<SubmissionId>>,
    withdrawals: HashMap<WithdrawalId, Withdrawal>,
    journal: Vec<JournalEntry>,
}

impl Tables {
    fn apply(&mut self, write: Write) {
        match write {
            Write::PutAccount(account) => {
                self.accounts.insert(account.email.clone(), account);
            }
            Write::DeleteAccount(email) => {
                self.accounts.remove(&email);
            }
            Write::PutTask(task) => {
                self.tasks.insert(task.id, task);
            }
            Write::DeleteTask(id) => {
                self.tasks.remove(&id);
                if let Some(ids) = self.task_submissions.remove(&id) {
                    for sid in ids {
                        self.submissions.remove(&sid);
                    }
                }
            }
            Write::PutSubmission(submission) => {
                self.task_submissions
                    .entry(submission.task_id)
                    .or_default()
                    .insert(submission.id);
                self.submissions.insert(submission.id, submission);
            }
            Write::DeleteSubmission(id) => {
                if let Some(submission) = self.submissions.remove(&id) {
                    if let Some(ids) = self.task_submissions.get_mut(&submission.task_id) {
                        ids.remove(&id);
                    }
                }
            }
            Write::PutWithdrawal(withdrawal) => {
                self.withdrawals.insert(withdrawal.id, withdrawal);
            }
            Write::DeleteWithdrawal(id) => {
                self.withdrawals.remove(&id);
            }
            Write::AppendJournal(entry) => {
                self.journal.push(entry);
            }
        }
    }
}

/// Store backed by in-process maps.
///
/// A commit holds the table write lock for the whole batch, so readers
/// never see half of an operation.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    fail_next_commit: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail without applying anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

impl LedgerStore for InMemoryStore {
    fn account(&self, email: &Email) -> Option<Account> {
        self.tables.read().accounts.get(email).cloned()
    }

    fn accounts(&self) -> Vec<Account> {
        self.tables.read().accounts.values().cloned().collect()
    }

    fn task(&self, id: &TaskId) -> Option<Task> {
        self.tables.read().tasks.get(id).cloned()
    }

    fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tables.read().tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    fn tasks_by_buyer(&self, buyer: &Email) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tables
            .read()
            .tasks
            .values()
            .filter(|t| &t.buyer_email == buyer)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    fn submission(&self, id: &SubmissionId) -> Option<Submission> {
        self.tables.read().submissions.get(id).cloned()
    }

    fn submissions_for_task(&self, task_id: &TaskId) -> Vec<Submission> {
        let tables = self.tables.read();
        tables
            .task_submissions
            .get(task_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.submissions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn submissions_by_worker(&self, worker: &Email) -> Vec<Submission> {
        let mut submissions: Vec<Submission> = self
            .tables
            .read()
            .submissions
            .values()
            .filter(|s| &s.worker_email == worker)
            .cloned()
            .collect();
        submissions.sort_by_key(|s| s.id);
        submissions
    }

    fn withdrawal(&self, id: &WithdrawalId) -> Option<Withdrawal> {
        self.tables.read().withdrawals.get(id).cloned()
    }

    fn withdrawals(&self) -> Vec<Withdrawal> {
        let mut withdrawals: Vec<Withdrawal> =
            self.tables.read().withdrawals.values().cloned().collect();
        withdrawals.sort_by_key(|w| w.id);
        withdrawals
    }

    fn withdrawals_by_worker(&self, worker: &Email) -> Vec<Withdrawal> {
        let mut withdrawals: Vec<Withdrawal> = self
            .tables
            .read()
            .withdrawals
            .values()
            .filter(|w| &w.worker_email == worker)
            .cloned()
            .collect();
        withdrawals.sort_by_key(|w| w.id);
        withdrawals
    }

    fn journal(&self, account: &Email) -> Vec<JournalEntry> {
        self.tables
            .read()
            .journal
            .iter()
            .filter(|e| &e.account == account)
            .cloned()
            .collect()
    }

    fn totals(&self) -> LedgerTotals {
        let tables = self.tables.read();
        LedgerTotals {
            balances: tables.accounts.values().map(|a| a.balance).sum::<Coins>(),
            escrow: tables.tasks.values().map(|t| t.escrow).sum::<Coins>(),
            holds: tables
                .withdrawals
                .values()
                .filter(|w| w.status == ReviewStatus::Pending)
                .map(|w| w.coins)
                .sum::<Coins>(),
        }
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut tables = self.tables.write();

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::storage("commit rejected by store"));
        }
        if batch.is_empty() {
            return Ok(());
        }

        trace!(writes = batch.len(), "Applying batch");
        for write in batch.writes {
            tables.apply(write);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use earnzy_common::{Role, TaskStatus};

    fn account(email: &str, balance: u64) -> Account {
        Account::new(Email::new(email), "", "", Role::Buyer, Coins::new(balance))
    }

    fn task(buyer: &str, escrow: u64) -> Task {
        let now = Utc::now();
        Task {
            id: TaskId::new(),
            title: "t".to_string(),
            detail: String::new(),
            required_workers: 1,
            payable_amount: Coins::new(escrow),
            total_payable: Coins::new(escrow),
            escrow: Coins::new(escrow),
            completion_date: now,
            submission_info: String::new(),
            image_url: String::new(),
            buyer_email: Email::new(buyer),
            buyer_name: String::new(),
            status: TaskStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    fn submission(task: &Task, worker: &str) -> Submission {
        Submission {
            id: SubmissionId::new(),
            task_id: task.id,
            task_title: task.title.clone(),
            payable_amount: task.payable_amount,
            worker_email: Email::new(worker),
            worker_name: String::new(),
            buyer_email: task.buyer_email.clone(),
            details: String::new(),
            status: ReviewStatus::Pending,
            submitted_at: Utc::now(),
            decided_at: None,
        }
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let store = InMemoryStore::new();
        let batch = WriteBatch::new();
        assert!(batch.is_empty());

        store.commit(batch).unwrap();
        assert_eq!(store.totals().total(), Coins::ZERO);
    }

    #[test]
    fn test_commit_applies_batch() {
        let store = InMemoryStore::new();
        let t = task("b@x.io", 15);

        let mut batch = WriteBatch::new();
        batch
            .push(Write::PutAccount(account("b@x.io", 85)))
            .push(Write::PutTask(t.clone()));
        assert_eq!(batch.len(), 2);
        store.commit(batch).unwrap();

        assert_eq!(store.account(&Email::new("b@x.io")).unwrap().balance, Coins::new(85));
        assert_eq!(store.tasks_by_buyer(&Email::new("b@x.io")).len(), 1);
        assert_eq!(store.totals().total(), Coins::new(100));
    }

    #[test]
    fn test_failed_commit_applies_nothing() {
        let store = InMemoryStore::new();
        store.fail_next_commit();

        let mut batch = WriteBatch::new();
        batch.push(Write::PutAccount(account("b@x.io", 85)));
        assert!(store.commit(batch.clone()).is_err());
        assert!(store.account(&Email::new("b@x.io")).is_none());

        // Only one commit fails.
        store.commit(batch).unwrap();
        assert!(store.account(&Email::new("b@x.io")).is_some());
    }

    #[test]
    fn test_delete_task_cascades_submissions() {
        let store = InMemoryStore::new();
        let t = task("b@x.io", 5);
        let s = submission(&t, "w@x.io");

        let mut batch = WriteBatch::new();
        batch
            .push(Write::PutTask(t.clone()))
            .push(Write::PutSubmission(s.clone()));
        store.commit(batch).unwrap();
        assert_eq!(store.submissions_for_task(&t.id).len(), 1);
        assert_eq!(store.submissions_by_worker(&Email::new("w@x.io")).len(), 1);

        let mut batch = WriteBatch::new();
        batch.push(Write::DeleteTask(t.id));
        store.commit(batch).unwrap();

        assert!(store.submission(&s.id).is_none());
        assert!(store.submissions_for_task(&t.id).is_empty());
    }
}
