//! Core ledger engine.
//!
//! Each operation follows the same shape: peek the immutable references it
//! needs, acquire every lock key in one call, re-read under the locks,
//! validate, stage all changes in a [`WriteBatch`], commit, and only then
//! emit notifications.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use earnzy_common::{
    CoinDelta, Coins, Decision, Email, Entity, LedgerError, Result, ReviewStatus, Role,
    SubmissionId, TaskId, TaskStatus, WithdrawalId,
};

use crate::account::{Account, NewAccount, Registration};
use crate::balance::{LedgerTotals, PlatformStats};
use crate::config::LedgerConfig;
use crate::journal::{EntryReason, JournalEntry};
use crate::lock_manager::{LockKey, LockManager};
use crate::notification::NotificationSink;
use crate::store::{LedgerStore, Write, WriteBatch};
use crate::submission::Submission;
use crate::task::{NewTask, Task, TaskEdit};
use crate::withdrawal::{PayoutDestination, Withdrawal};

const ROUTE_DASHBOARD: &str = "/dashboard";
const ROUTE_TASK_REVIEW: &str = "/dashboard/task-review";
const ROUTE_MY_TASKS: &str = "/dashboard/my-tasks";
const ROUTE_MY_SUBMISSIONS: &str = "/dashboard/my-submissions";
const ROUTE_WITHDRAWALS: &str = "/dashboard/withdrawals";

/// Result of deleting a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRemoval {
    pub task_id: TaskId,
    /// Coins credited back to the buyer.
    pub refund: Coins,
    pub submissions_removed: usize,
}

/// Result of force-removing an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRemoval {
    pub email: Email,
    pub tasks_removed: usize,
    pub submissions_removed: usize,
    pub withdrawals_removed: usize,
    /// Balance, escrow and holds that left the system with the account.
    pub coins_destroyed: Coins,
}

/// The ledger: sole writer of account balances.
pub struct Ledger {
    config: LedgerConfig,
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn NotificationSink>,
    locks: Arc<LockManager>,
}

impl Ledger {
    /// Create a ledger over a store and a notification sink.
    pub fn new(
        config: LedgerConfig,
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let locks = Arc::new(LockManager::new(config.lock_config.clone()));
        Self {
            config,
            store,
            notifier,
            locks,
        }
    }

    /// Ledger configuration.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Lock table, for running its cleanup loop.
    pub fn lock_manager(&self) -> Arc<LockManager> {
        self.locks.clone()
    }

    // --- Accounts ---

    /// Register an account. Registering an existing email changes nothing.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: NewAccount) -> Result<Registration> {
        if !request.email.is_valid() {
            return Err(LedgerError::validation("email", "A valid email is required"));
        }

        let _locks = self
            .locks
            .acquire([LockKey::Account(request.email.clone())])
            .await;

        if let Some(existing) = self.store.account(&request.email) {
            return Ok(Registration::AlreadyExists(existing));
        }

        let starting = self.config.starting_balance(request.role);
        let account = Account::new(
            request.email,
            request.name,
            request.profile_pic.unwrap_or_default(),
            request.role.unwrap_or_default(),
            starting,
        );

        let mut batch = WriteBatch::new();
        if !starting.is_zero() {
            batch.push(Write::AppendJournal(JournalEntry::record(
                account.email.clone(),
                CoinDelta::Credit(starting),
                starting,
                EntryReason::Registration,
                None,
            )));
        }
        batch.push(Write::PutAccount(account.clone()));
        self.store.commit(batch)?;

        info!(
            email = %account.email,
            role = %account.role,
            balance = %account.balance,
            "Account registered"
        );

        Ok(Registration::Created(account))
    }

    /// Look up an account.
    pub fn account(&self, email: &Email) -> Result<Account> {
        self.store
            .account(email)
            .ok_or_else(|| LedgerError::not_found(Entity::Account, email))
    }

    /// Change a user's role. Admin only.
    #[instrument(skip(self))]
    pub async fn update_role(&self, admin: &Email, target: &Email, role: Role) -> Result<Account> {
        let _locks = self
            .locks
            .acquire([
                LockKey::Account(admin.clone()),
                LockKey::Account(target.clone()),
            ])
            .await;

        self.require_admin(admin)?;
        let mut account = self.account(target)?;
        if account.role == role {
            return Ok(account);
        }
        account.set_role(role);

        let mut batch = WriteBatch::new();
        batch.push(Write::PutAccount(account.clone()));
        self.store.commit(batch)?;

        info!(email = %target, role = %role, "Role updated");
        self.notify(
            target,
            format!("Your role has been changed to {role}"),
            ROUTE_DASHBOARD,
        );

        Ok(account)
    }

    /// Remove an account and everything it owns. Admin only.
    ///
    /// Coins held by the account, its tasks' escrow and its pending
    /// withdrawals are destroyed, not refunded.
    #[instrument(skip(self))]
    pub async fn remove_account(&self, admin: &Email, target: &Email) -> Result<AccountRemoval> {
        if admin == target {
            return Err(LedgerError::invalid_state(
                "Admins cannot remove their own account",
            ));
        }

        // Everything the account touches can only grow while its own key is
        // free, so one retry after taking the locks is enough.
        let _locks = loop {
            let keys = self.removal_keys(admin, target);
            let locks = self.locks.acquire(keys).await;
            if locks.covers_all(&self.removal_keys(admin, target)) {
                break locks;
            }
        };

        self.require_admin(admin)?;
        let account = self.account(target)?;

        let owned_tasks = self.store.tasks_by_buyer(target);
        let withdrawals = self.store.withdrawals_by_worker(target);
        let mut submissions: Vec<Submission> = owned_tasks
            .iter()
            .flat_map(|task| self.store.submissions_for_task(&task.id))
            .collect();
        submissions.extend(
            self.store
                .submissions_by_worker(target)
                .into_iter()
                .filter(|s| !owned_tasks.iter().any(|t| t.id == s.task_id)),
        );

        let destroyed: Coins = std::iter::once(account.balance)
            .chain(owned_tasks.iter().map(|t| t.escrow))
            .chain(withdrawals.iter().filter(|w| w.is_pending()).map(|w| w.coins))
            .sum();

        let mut batch = WriteBatch::new();
        for submission in &submissions {
            batch.push(Write::DeleteSubmission(submission.id));
        }
        for task in &owned_tasks {
            batch.push(Write::DeleteTask(task.id));
        }
        for withdrawal in &withdrawals {
            batch.push(Write::DeleteWithdrawal(withdrawal.id));
        }
        batch.push(Write::DeleteAccount(target.clone()));
        self.store.commit(batch)?;

        if let Err(e) = self.notifier.purge(target) {
            warn!(email = %target, error = %e, "Failed to purge notifications");
        }

        info!(
            email = %target,
            tasks = owned_tasks.len(),
            submissions = submissions.len(),
            withdrawals = withdrawals.len(),
            destroyed = %destroyed,
            "Account removed"
        );

        Ok(AccountRemoval {
            email: target.clone(),
            tasks_removed: owned_tasks.len(),
            submissions_removed: submissions.len(),
            withdrawals_removed: withdrawals.len(),
            coins_destroyed: destroyed,
        })
    }

    // --- Tasks ---

    /// Post a task, moving `required_workers * payable_amount` into escrow.
    #[instrument(skip(self, request), fields(buyer = %buyer))]
    pub async fn create_task(&self, buyer: &Email, request: NewTask) -> Result<Task> {
        let terms = request.terms()?;

        let _locks = self.locks.acquire([LockKey::Account(buyer.clone())]).await;

        let mut account = self.account(buyer)?;
        if !account.has_sufficient_funds(terms.total_payable) {
            return Err(LedgerError::InsufficientFunds {
                required: terms.total_payable,
                available: account.balance,
            });
        }

        let now = Utc::now();
        let task = Task {
            id: TaskId::new(),
            title: request.title,
            detail: request.detail,
            required_workers: terms.required_workers,
            payable_amount: terms.payable_amount,
            total_payable: terms.total_payable,
            escrow: terms.total_payable,
            completion_date: terms.completion_date,
            submission_info: request.submission_info,
            image_url: request.image_url.unwrap_or_default(),
            buyer_email: buyer.clone(),
            buyer_name: account.name.clone(),
            status: TaskStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let mut batch = WriteBatch::new();
        stage_balance_change(
            &mut batch,
            &mut account,
            CoinDelta::Debit(task.total_payable),
            EntryReason::TaskEscrow,
            task.id.to_string(),
        )?;
        batch.push(Write::PutTask(task.clone()));
        batch.push(Write::PutAccount(account.clone()));
        self.store.commit(batch)?;

        info!(
            task_id = %task.id,
            total_payable = %task.total_payable,
            remaining = %account.balance,
            "Task created"
        );

        Ok(task)
    }

    /// Edit a task and charge or return the change in total cost.
    #[instrument(skip(self, edit), fields(task_id = %task_id, buyer = %buyer))]
    pub async fn edit_task(&self, task_id: TaskId, buyer: &Email, edit: TaskEdit) -> Result<Task> {
        let owner = self.task(task_id)?.buyer_email;
        let _locks = self
            .locks
            .acquire([LockKey::Task(task_id), LockKey::Account(owner)])
            .await;

        let task = self.task(task_id)?;
        if !task.is_owned_by(buyer) {
            return Err(LedgerError::unauthorized("Only the task's buyer may edit it"));
        }

        let mut updated = edit.apply_to(&task)?;

        let approved = approved_count(&self.store.submissions_for_task(&task_id));
        if approved > 0 && updated.payable_amount != task.payable_amount {
            return Err(LedgerError::validation(
                "payable_amount",
                "Payable amount cannot change after a submission was approved",
            ));
        }
        if updated.required_workers < approved {
            return Err(LedgerError::validation(
                "required_workers",
                format!("Required workers cannot drop below the {approved} already approved"),
            ));
        }

        let delta = CoinDelta::between(task.total_payable, updated.total_payable);
        updated.escrow = match delta {
            CoinDelta::Debit(extra) => task.escrow.checked_add(extra),
            CoinDelta::Credit(released) => task.escrow.checked_sub(released),
        }
        .ok_or_else(|| {
            LedgerError::validation("required_workers", "Edit would release coins already paid out")
        })?;

        let mut batch = WriteBatch::new();
        if !delta.is_zero() {
            let mut account = self.account(buyer)?;
            stage_balance_change(
                &mut batch,
                &mut account,
                delta,
                EntryReason::TaskEdit,
                task_id.to_string(),
            )?;
            batch.push(Write::PutAccount(account));
        }
        batch.push(Write::PutTask(updated.clone()));
        self.store.commit(batch)?;

        info!(
            task_id = %task_id,
            total_payable = %updated.total_payable,
            delta = ?delta,
            "Task edited"
        );

        Ok(updated)
    }

    /// Delete a task, refunding unused escrow to its buyer.
    ///
    /// Allowed for the task's buyer and for admins.
    #[instrument(skip(self), fields(task_id = %task_id, caller = %caller))]
    pub async fn delete_task(&self, task_id: TaskId, caller: &Email) -> Result<TaskRemoval> {
        let owner = self.task(task_id)?.buyer_email;
        let _locks = self
            .locks
            .acquire([
                LockKey::Task(task_id),
                LockKey::Account(owner),
                LockKey::Account(caller.clone()),
            ])
            .await;

        let task = self.task(task_id)?;
        let by_admin = !task.is_owned_by(caller);
        if by_admin {
            self.require_admin(caller).map_err(|_| {
                LedgerError::unauthorized("Only the task's buyer or an admin may delete it")
            })?;
        }

        let submissions = self.store.submissions_for_task(&task_id);
        let refund = task.refund_due(approved_count(&submissions));
        let mut buyer = self.account(&task.buyer_email)?;

        let mut batch = WriteBatch::new();
        for submission in &submissions {
            batch.push(Write::DeleteSubmission(submission.id));
        }
        batch.push(Write::DeleteTask(task_id));
        stage_balance_change(
            &mut batch,
            &mut buyer,
            CoinDelta::Credit(refund),
            EntryReason::TaskRefund,
            task_id.to_string(),
        )?;
        batch.push(Write::PutAccount(buyer));
        self.store.commit(batch)?;

        info!(
            task_id = %task_id,
            refund = %refund,
            submissions = submissions.len(),
            "Task deleted"
        );

        if by_admin {
            self.notify(
                &task.buyer_email,
                format!(
                    "Your task \"{}\" was removed by an admin. {} were refunded.",
                    task.title, refund
                ),
                ROUTE_MY_TASKS,
            );
        }

        Ok(TaskRemoval {
            task_id,
            refund,
            submissions_removed: submissions.len(),
        })
    }

    /// Look up a task.
    pub fn task(&self, task_id: TaskId) -> Result<Task> {
        self.store
            .task(&task_id)
            .ok_or_else(|| LedgerError::not_found(Entity::Task, task_id))
    }

    /// Tasks posted by a buyer.
    pub fn tasks_by_buyer(&self, buyer: &Email) -> Vec<Task> {
        self.store.tasks_by_buyer(buyer)
    }

    /// Active tasks with a funded slot not taken by a pending or approved submission.
    pub fn open_tasks(&self) -> Vec<Task> {
        self.store
            .tasks()
            .into_iter()
            .filter(|task| task.status.accepts_submissions())
            .filter(|task| {
                let submissions = self.store.submissions_for_task(&task.id);
                let approved = approved_count(&submissions);
                let pending = submissions.iter().filter(|s| s.is_pending()).count() as u32;
                approved + pending < task.funded_slots(approved)
            })
            .collect()
    }

    // --- Submissions ---

    /// Record a worker's submission. No coins move.
    #[instrument(skip(self, details), fields(task_id = %task_id, worker = %worker))]
    pub async fn submit(
        &self,
        task_id: TaskId,
        worker: &Email,
        details: impl Into<String>,
    ) -> Result<Submission> {
        let _locks = self
            .locks
            .acquire([LockKey::Task(task_id), LockKey::Account(worker.clone())])
            .await;

        let task = self.task(task_id)?;
        let account = self.account(worker)?;

        if task.is_owned_by(worker) {
            return Err(LedgerError::unauthorized(
                "Buyers cannot submit to their own task",
            ));
        }
        if !task.status.accepts_submissions() {
            return Err(LedgerError::invalid_state("Task is not accepting submissions"));
        }
        if self
            .store
            .submissions_for_task(&task_id)
            .iter()
            .any(|s| &s.worker_email == worker)
        {
            return Err(LedgerError::DuplicateSubmission {
                task_id,
                worker: worker.clone(),
            });
        }

        let submission = Submission {
            id: SubmissionId::new(),
            task_id,
            task_title: task.title.clone(),
            payable_amount: task.payable_amount,
            worker_email: worker.clone(),
            worker_name: account.name.clone(),
            buyer_email: task.buyer_email.clone(),
            details: details.into(),
            status: ReviewStatus::Pending,
            submitted_at: Utc::now(),
            decided_at: None,
        };

        let mut batch = WriteBatch::new();
        batch.push(Write::PutSubmission(submission.clone()));
        self.store.commit(batch)?;

        info!(submission_id = %submission.id, "Submission recorded");
        self.notify(
            &task.buyer_email,
            format!(
                "{} submitted work for \"{}\"",
                display_name(&account),
                task.title
            ),
            ROUTE_TASK_REVIEW,
        );

        Ok(submission)
    }

    /// Approve a pending submission and pay the worker from the task's escrow.
    pub async fn approve_submission(
        &self,
        submission_id: SubmissionId,
        buyer: &Email,
    ) -> Result<Submission> {
        self.review_submission(submission_id, buyer, Decision::Approve)
            .await
    }

    /// Reject a pending submission, giving the task one more worker slot.
    pub async fn reject_submission(
        &self,
        submission_id: SubmissionId,
        buyer: &Email,
    ) -> Result<Submission> {
        self.review_submission(submission_id, buyer, Decision::Reject)
            .await
    }

    #[instrument(skip(self), fields(submission_id = %submission_id, buyer = %buyer))]
    async fn review_submission(
        &self,
        submission_id: SubmissionId,
        buyer: &Email,
        decision: Decision,
    ) -> Result<Submission> {
        let peeked = self.submission(submission_id)?;
        let _locks = self
            .locks
            .acquire([
                LockKey::Task(peeked.task_id),
                LockKey::Account(peeked.worker_email.clone()),
            ])
            .await;

        let mut submission = self.submission(submission_id)?;
        let mut task = self.task(submission.task_id)?;
        if !task.is_owned_by(buyer) {
            return Err(LedgerError::unauthorized(
                "Only the task's buyer may review its submissions",
            ));
        }

        submission.transition_to(decision.target_status())?;

        let mut batch = WriteBatch::new();
        match decision {
            Decision::Approve => {
                let payout = task.payable_amount;
                task.escrow = task.escrow.checked_sub(payout).ok_or(
                    LedgerError::InsufficientFunds {
                        required: payout,
                        available: task.escrow,
                    },
                )?;
                submission.payable_amount = payout;

                let mut worker = self.account(&submission.worker_email)?;
                stage_balance_change(
                    &mut batch,
                    &mut worker,
                    CoinDelta::Credit(payout),
                    EntryReason::SubmissionPayout,
                    submission_id.to_string(),
                )?;
                batch.push(Write::PutAccount(worker));
            }
            Decision::Reject => {
                task.required_workers = task.required_workers.checked_add(1).ok_or_else(|| {
                    LedgerError::invalid_state("Task cannot offer any more worker slots")
                })?;
            }
        }
        task.updated_at = Utc::now();
        batch.push(Write::PutTask(task.clone()));
        batch.push(Write::PutSubmission(submission.clone()));
        self.store.commit(batch)?;

        info!(
            task_id = %task.id,
            worker = %submission.worker_email,
            status = %submission.status,
            escrow = %task.escrow,
            "Submission reviewed"
        );

        let message = match decision {
            Decision::Approve => format!(
                "You earned {} from {} for \"{}\"",
                submission.payable_amount,
                buyer_label(&task),
                task.title
            ),
            Decision::Reject => format!(
                "Your submission for \"{}\" was rejected by {}",
                task.title,
                buyer_label(&task)
            ),
        };
        self.notify(&submission.worker_email, message, ROUTE_MY_SUBMISSIONS);

        Ok(submission)
    }

    /// Look up a submission.
    pub fn submission(&self, submission_id: SubmissionId) -> Result<Submission> {
        self.store
            .submission(&submission_id)
            .ok_or_else(|| LedgerError::not_found(Entity::Submission, submission_id))
    }

    /// Submissions against a task.
    pub fn submissions_for_task(&self, task_id: TaskId) -> Result<Vec<Submission>> {
        self.task(task_id)?;
        Ok(self.store.submissions_for_task(&task_id))
    }

    /// A worker's submissions across all tasks.
    pub fn submissions_by_worker(&self, worker: &Email) -> Vec<Submission> {
        self.store.submissions_by_worker(worker)
    }

    /// Pending submissions against a buyer's tasks.
    pub fn review_queue(&self, buyer: &Email) -> Vec<Submission> {
        self.store
            .tasks_by_buyer(buyer)
            .iter()
            .flat_map(|task| self.store.submissions_for_task(&task.id))
            .filter(Submission::is_pending)
            .collect()
    }

    // --- Withdrawals ---

    /// Put `coins` on hold for a payout.
    #[instrument(skip(self, destination), fields(worker = %worker, coins = %coins))]
    pub async fn request_withdrawal(
        &self,
        worker: &Email,
        coins: Coins,
        destination: PayoutDestination,
    ) -> Result<Withdrawal> {
        let _locks = self.locks.acquire([LockKey::Account(worker.clone())]).await;

        let mut account = self.account(worker)?;
        destination.validate()?;
        if !account.has_sufficient_funds(coins) {
            return Err(LedgerError::InsufficientFunds {
                required: coins,
                available: account.balance,
            });
        }
        if coins < self.config.min_withdrawal {
            return Err(LedgerError::BelowMinimum {
                requested: coins,
                minimum: self.config.min_withdrawal,
            });
        }

        let withdrawal = Withdrawal {
            id: WithdrawalId::new(),
            worker_email: worker.clone(),
            worker_name: account.name.clone(),
            coins,
            amount: coins.to_cash(self.config.coins_per_dollar),
            destination,
            status: ReviewStatus::Pending,
            reason: None,
            decided_by: None,
            requested_at: Utc::now(),
            decided_at: None,
        };

        let mut batch = WriteBatch::new();
        stage_balance_change(
            &mut batch,
            &mut account,
            CoinDelta::Debit(coins),
            EntryReason::WithdrawalHold,
            withdrawal.id.to_string(),
        )?;
        batch.push(Write::PutAccount(account.clone()));
        batch.push(Write::PutWithdrawal(withdrawal.clone()));
        self.store.commit(batch)?;

        info!(
            withdrawal_id = %withdrawal.id,
            amount = %withdrawal.amount,
            remaining = %account.balance,
            "Withdrawal requested"
        );
        self.notify(
            worker,
            format!(
                "Your withdrawal of {} ({}) is awaiting review",
                withdrawal.coins, withdrawal.amount
            ),
            ROUTE_WITHDRAWALS,
        );

        Ok(withdrawal)
    }

    /// Approve or reject a pending withdrawal. Admin only.
    ///
    /// Rejection returns the held coins to the worker.
    #[instrument(skip(self, reason), fields(withdrawal_id = %withdrawal_id, admin = %admin))]
    pub async fn decide_withdrawal(
        &self,
        withdrawal_id: WithdrawalId,
        admin: &Email,
        decision: Decision,
        reason: Option<String>,
    ) -> Result<Withdrawal> {
        self.require_admin(admin)?;
        let peeked = self
            .store
            .withdrawal(&withdrawal_id)
            .ok_or_else(|| LedgerError::not_found(Entity::Withdrawal, withdrawal_id))?;

        let _locks = self
            .locks
            .acquire([
                LockKey::Withdrawal(withdrawal_id),
                LockKey::Account(admin.clone()),
                LockKey::Account(peeked.worker_email),
            ])
            .await;

        self.require_admin(admin)?;
        let mut withdrawal = self
            .store
            .withdrawal(&withdrawal_id)
            .ok_or_else(|| LedgerError::not_found(Entity::Withdrawal, withdrawal_id))?;
        withdrawal.decide(decision.target_status(), admin.clone(), reason)?;

        let mut batch = WriteBatch::new();
        if decision == Decision::Reject {
            let mut worker = self.account(&withdrawal.worker_email)?;
            stage_balance_change(
                &mut batch,
                &mut worker,
                CoinDelta::Credit(withdrawal.coins),
                EntryReason::WithdrawalRefund,
                withdrawal_id.to_string(),
            )?;
            batch.push(Write::PutAccount(worker));
        }
        batch.push(Write::PutWithdrawal(withdrawal.clone()));
        self.store.commit(batch)?;

        info!(
            worker = %withdrawal.worker_email,
            status = %withdrawal.status,
            coins = %withdrawal.coins,
            "Withdrawal decided"
        );

        let mut message = match decision {
            Decision::Approve => format!(
                "Your withdrawal of {} has been approved and will be paid to {}",
                withdrawal.amount, withdrawal.destination.payment_system
            ),
            Decision::Reject => format!(
                "Your withdrawal of {} was rejected and {} were returned",
                withdrawal.amount, withdrawal.coins
            ),
        };
        if let Some(reason) = &withdrawal.reason {
            message.push_str(&format!(": {reason}"));
        }
        self.notify(&withdrawal.worker_email, message, ROUTE_WITHDRAWALS);

        Ok(withdrawal)
    }

    /// Look up a withdrawal.
    pub fn withdrawal(&self, withdrawal_id: WithdrawalId) -> Result<Withdrawal> {
        self.store
            .withdrawal(&withdrawal_id)
            .ok_or_else(|| LedgerError::not_found(Entity::Withdrawal, withdrawal_id))
    }

    /// A worker's withdrawals.
    pub fn withdrawals_by_worker(&self, worker: &Email) -> Vec<Withdrawal> {
        self.store.withdrawals_by_worker(worker)
    }

    /// Withdrawals awaiting an admin decision.
    pub fn pending_withdrawals(&self) -> Vec<Withdrawal> {
        self.store
            .withdrawals()
            .into_iter()
            .filter(Withdrawal::is_pending)
            .collect()
    }

    // --- Audit ---

    /// Balance history of an account, oldest first.
    pub fn journal(&self, email: &Email) -> Vec<JournalEntry> {
        self.store.journal(email)
    }

    /// Where every coin currently sits.
    pub fn totals(&self) -> LedgerTotals {
        self.store.totals()
    }

    /// Counts for the admin dashboard.
    pub fn platform_stats(&self) -> PlatformStats {
        let mut stats = PlatformStats {
            totals: self.store.totals(),
            ..PlatformStats::default()
        };

        for account in self.store.accounts() {
            match account.role {
                Role::Worker => stats.workers += 1,
                Role::Buyer => stats.buyers += 1,
                Role::Admin => stats.admins += 1,
            }
        }

        let tasks = self.store.tasks();
        stats.tasks = tasks.len();
        stats.pending_submissions = tasks
            .iter()
            .flat_map(|task| self.store.submissions_for_task(&task.id))
            .filter(Submission::is_pending)
            .count();

        let withdrawals = self.store.withdrawals();
        stats.pending_withdrawals = withdrawals.iter().filter(|w| w.is_pending()).count();
        stats.coins_paid_out = withdrawals
            .iter()
            .filter(|w| w.status == ReviewStatus::Approved)
            .map(|w| w.coins)
            .sum();

        stats
    }

    // --- Internal helpers ---

    fn require_admin(&self, email: &Email) -> Result<Account> {
        match self.store.account(email) {
            Some(account) if account.is_admin() => Ok(account),
            _ => Err(LedgerError::unauthorized("Admin role required")),
        }
    }

    fn notify(&self, recipient: &Email, message: String, route: &str) {
        if let Err(e) = self.notifier.append(recipient, &message, route) {
            warn!(recipient = %recipient, error = %e, "Notification dropped");
        }
    }

    fn removal_keys(&self, admin: &Email, target: &Email) -> BTreeSet<LockKey> {
        let mut keys = BTreeSet::new();
        keys.insert(LockKey::Account(admin.clone()));
        keys.insert(LockKey::Account(target.clone()));
        for task in self.store.tasks_by_buyer(target) {
            keys.insert(LockKey::Task(task.id));
        }
        for submission in self.store.submissions_by_worker(target) {
            keys.insert(LockKey::Task(submission.task_id));
        }
        for withdrawal in self.store.withdrawals_by_worker(target) {
            keys.insert(LockKey::Withdrawal(withdrawal.id));
        }
        keys
    }
}

/// Apply `delta` to `account` and stage the matching journal entry.
fn stage_balance_change(
    batch: &mut WriteBatch,
    account: &mut Account,
    delta: CoinDelta,
    reason: EntryReason,
    reference: String,
) -> Result<()> {
    if delta.is_zero() {
        return Ok(());
    }
    let balance_after = account.adjust_balance(delta)?;
    batch.push(Write::AppendJournal(JournalEntry::record(
        account.email.clone(),
        delta,
        balance_after,
        reason,
        Some(reference),
    )));
    Ok(())
}

fn approved_count(submissions: &[Submission]) -> u32 {
    submissions
        .iter()
        .filter(|s| s.status == ReviewStatus::Approved)
        .count() as u32
}

fn buyer_label(task: &Task) -> &str {
    if task.buyer_name.is_empty() {
        task.buyer_email.as_str()
    } else {
        &task.buyer_name
    }
}

fn display_name(account: &Account) -> &str {
    if account.name.is_empty() {
        account.email.as_str()
    } else {
        &account.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationCenter;
    use crate::store::InMemoryStore;

    struct Harness {
        ledger: Ledger,
        store: Arc<InMemoryStore>,
        inbox: Arc<NotificationCenter>,
    }

    fn create_test_ledger() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let inbox = Arc::new(NotificationCenter::new());
        let ledger = Ledger::new(LedgerConfig::default(), store.clone(), inbox.clone());
        Harness {
            ledger,
            store,
            inbox,
        }
    }

    async fn register(ledger: &Ledger, email: &str, role: Role) -> Email {
        let email = Email::new(email);
        ledger
            .register(NewAccount {
                email: email.clone(),
                name: String::new(),
                profile_pic: None,
                role: Some(role),
            })
            .await
            .unwrap();
        email
    }

    fn new_task(required_workers: i64, payable_amount: i64) -> NewTask {
        NewTask {
            title: "Like a post".to_string(),
            detail: String::new(),
            required_workers,
            payable_amount,
            completion_date: "2026-12-31".to_string(),
            submission_info: "Screenshot".to_string(),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let h = create_test_ledger();
        let email = register(&h.ledger, "buyer@x.io", Role::Buyer).await;

        let again = h
            .ledger
            .register(NewAccount {
                email: email.clone(),
                name: "Other".to_string(),
                profile_pic: None,
                role: Some(Role::Worker),
            })
            .await
            .unwrap();

        assert!(!again.was_created());
        assert_eq!(again.account().role, Role::Buyer);
        assert_eq!(again.account().balance, Coins::new(50));
        assert_eq!(h.ledger.journal(&email).len(), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_email() {
        let h = create_test_ledger();
        let err = h
            .ledger
            .register(NewAccount {
                email: Email::new("not-an-email"),
                name: String::new(),
                profile_pic: None,
                role: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("email"));
    }

    #[tokio::test]
    async fn test_create_task_moves_coins_into_escrow() {
        let h = create_test_ledger();
        let buyer = register(&h.ledger, "buyer@x.io", Role::Buyer).await;

        let task = h.ledger.create_task(&buyer, new_task(3, 5)).await.unwrap();

        assert_eq!(task.total_payable, Coins::new(15));
        assert_eq!(task.escrow, Coins::new(15));
        assert_eq!(h.ledger.account(&buyer).unwrap().balance, Coins::new(35));
        assert_eq!(h.ledger.totals().total(), Coins::new(50));
    }

    #[tokio::test]
    async fn test_create_task_insufficient_funds() {
        let h = create_test_ledger();
        let buyer = register(&h.ledger, "buyer@x.io", Role::Buyer).await;

        let err = h
            .ledger
            .create_task(&buyer, new_task(11, 5))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                required: Coins::new(55),
                available: Coins::new(50),
            }
        );
        assert!(h.ledger.tasks_by_buyer(&buyer).is_empty());
    }

    #[tokio::test]
    async fn test_submit_and_approve_pays_worker() {
        let h = create_test_ledger();
        let buyer = register(&h.ledger, "buyer@x.io", Role::Buyer).await;
        let worker = register(&h.ledger, "worker@x.io", Role::Worker).await;
        let task = h.ledger.create_task(&buyer, new_task(2, 5)).await.unwrap();

        let submission = h.ledger.submit(task.id, &worker, "proof").await.unwrap();
        assert_eq!(h.inbox.list(&buyer).len(), 1);
        assert_eq!(h.ledger.review_queue(&buyer).len(), 1);

        let approved = h
            .ledger
            .approve_submission(submission.id, &buyer)
            .await
            .unwrap();

        assert_eq!(approved.status, ReviewStatus::Approved);
        assert_eq!(h.ledger.account(&worker).unwrap().balance, Coins::new(15));
        assert_eq!(h.ledger.task(task.id).unwrap().escrow, Coins::new(5));
        assert_eq!(h.inbox.unread_count(&worker), 1);
        assert!(h.ledger.review_queue(&buyer).is_empty());
    }

    #[tokio::test]
    async fn test_only_owner_reviews() {
        let h = create_test_ledger();
        let buyer = register(&h.ledger, "buyer@x.io", Role::Buyer).await;
        let other = register(&h.ledger, "other@x.io", Role::Buyer).await;
        let worker = register(&h.ledger, "worker@x.io", Role::Worker).await;
        let task = h.ledger.create_task(&buyer, new_task(1, 5)).await.unwrap();
        let submission = h.ledger.submit(task.id, &worker, "proof").await.unwrap();

        let err = h
            .ledger
            .approve_submission(submission.id, &other)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHORIZED");
        assert!(h.ledger.submission(submission.id).unwrap().is_pending());
    }

    #[tokio::test]
    async fn test_buyer_cannot_submit_to_own_task() {
        let h = create_test_ledger();
        let buyer = register(&h.ledger, "buyer@x.io", Role::Buyer).await;
        let task = h.ledger.create_task(&buyer, new_task(1, 5)).await.unwrap();

        let err = h.ledger.submit(task.id, &buyer, "proof").await.unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_reject_adds_slot_without_moving_coins() {
        let h = create_test_ledger();
        let buyer = register(&h.ledger, "buyer@x.io", Role::Buyer).await;
        let worker = register(&h.ledger, "worker@x.io", Role::Worker).await;
        let task = h.ledger.create_task(&buyer, new_task(2, 5)).await.unwrap();
        let submission = h.ledger.submit(task.id, &worker, "proof").await.unwrap();

        h.ledger
            .reject_submission(submission.id, &buyer)
            .await
            .unwrap();

        let task = h.ledger.task(task.id).unwrap();
        assert_eq!(task.required_workers, 3);
        assert_eq!(task.total_payable, Coins::new(10));
        assert_eq!(task.escrow, Coins::new(10));
        assert_eq!(h.ledger.account(&worker).unwrap().balance, Coins::new(10));
        assert_eq!(h.ledger.totals().total(), Coins::new(60));
    }

    #[tokio::test]
    async fn test_rejected_slots_are_not_paid_until_billed() {
        let h = create_test_ledger();
        let buyer = register(&h.ledger, "buyer@x.io", Role::Buyer).await;
        let task = h.ledger.create_task(&buyer, new_task(1, 5)).await.unwrap();

        let mut workers = Vec::new();
        for i in 0..3 {
            workers.push(register(&h.ledger, &format!("w{i}@x.io"), Role::Worker).await);
        }

        let first = h.ledger.submit(task.id, &workers[0], "a").await.unwrap();
        h.ledger.reject_submission(first.id, &buyer).await.unwrap();
        let second = h.ledger.submit(task.id, &workers[1], "b").await.unwrap();
        let third = h.ledger.submit(task.id, &workers[2], "c").await.unwrap();

        h.ledger.approve_submission(second.id, &buyer).await.unwrap();
        let err = h
            .ledger
            .approve_submission(third.id, &buyer)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_FUNDS");

        // Editing bills the reopened slot, after which it can be paid.
        h.ledger
            .edit_task(task.id, &buyer, TaskEdit::default())
            .await
            .unwrap();
        assert_eq!(h.ledger.account(&buyer).unwrap().balance, Coins::new(40));
        h.ledger.approve_submission(third.id, &buyer).await.unwrap();
        assert_eq!(h.ledger.task(task.id).unwrap().escrow, Coins::ZERO);
    }

    #[tokio::test]
    async fn test_edit_guards() {
        let h = create_test_ledger();
        let buyer = register(&h.ledger, "buyer@x.io", Role::Buyer).await;
        let worker = register(&h.ledger, "worker@x.io", Role::Worker).await;
        let task = h.ledger.create_task(&buyer, new_task(2, 5)).await.unwrap();
        let submission = h.ledger.submit(task.id, &worker, "proof").await.unwrap();
        h.ledger
            .approve_submission(submission.id, &buyer)
            .await
            .unwrap();

        let err = h
            .ledger
            .edit_task(
                task.id,
                &buyer,
                TaskEdit {
                    payable_amount: Some(6),
                    ..TaskEdit::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("payable_amount"));

        let err = h
            .ledger
            .edit_task(
                task.id,
                &worker,
                TaskEdit {
                    title: Some("Mine now".to_string()),
                    ..TaskEdit::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHORIZED");

        // Shrinking to the approved count releases the unused escrow.
        let edited = h
            .ledger
            .edit_task(
                task.id,
                &buyer,
                TaskEdit {
                    required_workers: Some(1),
                    ..TaskEdit::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.escrow, Coins::ZERO);
        assert_eq!(h.ledger.account(&buyer).unwrap().balance, Coins::new(45));
    }

    #[tokio::test]
    async fn test_admin_delete_notifies_buyer() {
        let h = create_test_ledger();
        let buyer = register(&h.ledger, "buyer@x.io", Role::Buyer).await;
        let admin = register(&h.ledger, "admin@x.io", Role::Admin).await;
        let stranger = register(&h.ledger, "stranger@x.io", Role::Worker).await;
        let task = h.ledger.create_task(&buyer, new_task(2, 5)).await.unwrap();

        let err = h.ledger.delete_task(task.id, &stranger).await.unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHORIZED");

        let removal = h.ledger.delete_task(task.id, &admin).await.unwrap();
        assert_eq!(removal.refund, Coins::new(10));
        assert_eq!(h.ledger.account(&buyer).unwrap().balance, Coins::new(50));
        assert_eq!(h.inbox.list(&buyer).len(), 1);
        assert!(h.ledger.task(task.id).is_err());
    }

    #[tokio::test]
    async fn test_open_tasks_excludes_filled() {
        let h = create_test_ledger();
        let buyer = register(&h.ledger, "buyer@x.io", Role::Buyer).await;
        let worker = register(&h.ledger, "worker@x.io", Role::Worker).await;
        let full = h.ledger.create_task(&buyer, new_task(1, 5)).await.unwrap();
        let open = h.ledger.create_task(&buyer, new_task(2, 5)).await.unwrap();

        h.ledger.submit(full.id, &worker, "proof").await.unwrap();

        let ids: Vec<TaskId> = h.ledger.open_tasks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![open.id]);
    }

    #[tokio::test]
    async fn test_update_role_requires_admin() {
        let h = create_test_ledger();
        let admin = register(&h.ledger, "admin@x.io", Role::Admin).await;
        let worker = register(&h.ledger, "worker@x.io", Role::Worker).await;

        let err = h
            .ledger
            .update_role(&worker, &worker, Role::Admin)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHORIZED");

        let account = h
            .ledger
            .update_role(&admin, &worker, Role::Buyer)
            .await
            .unwrap();
        assert_eq!(account.role, Role::Buyer);
        assert_eq!(account.balance, Coins::new(10));
        assert_eq!(h.inbox.unread_count(&worker), 1);
    }

    #[tokio::test]
    async fn test_remove_account_cascades() {
        let h = create_test_ledger();
        let admin = register(&h.ledger, "admin@x.io", Role::Admin).await;
        let buyer = register(&h.ledger, "buyer@x.io", Role::Buyer).await;
        let worker = register(&h.ledger, "worker@x.io", Role::Worker).await;
        let task = h.ledger.create_task(&buyer, new_task(2, 5)).await.unwrap();
        h.ledger.submit(task.id, &worker, "proof").await.unwrap();

        let err = h.ledger.remove_account(&admin, &admin).await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");

        let before = h.ledger.totals().total();
        let removal = h.ledger.remove_account(&admin, &buyer).await.unwrap();

        assert_eq!(removal.tasks_removed, 1);
        assert_eq!(removal.submissions_removed, 1);
        assert_eq!(removal.coins_destroyed, Coins::new(50));
        assert_eq!(
            h.ledger.totals().total(),
            before.checked_sub(removal.coins_destroyed).unwrap()
        );
        assert!(h.ledger.account(&buyer).is_err());
        assert!(h.ledger.submissions_by_worker(&worker).is_empty());
        assert!(h.inbox.list(&buyer).is_empty());
    }

    #[tokio::test]
    async fn test_withdrawal_check_order() {
        let h = create_test_ledger();
        let worker = register(&h.ledger, "worker@x.io", Role::Worker).await;

        let err = h
            .ledger
            .request_withdrawal(&worker, Coins::new(500), PayoutDestination::new("", "1"))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("payment_system"));

        let err = h
            .ledger
            .request_withdrawal(
                &worker,
                Coins::new(500),
                PayoutDestination::new("bkash", "1"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_FUNDS");

        let err = h
            .ledger
            .request_withdrawal(&worker, Coins::new(5), PayoutDestination::new("bkash", "1"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "BELOW_MINIMUM");
        assert_eq!(h.ledger.account(&worker).unwrap().balance, Coins::new(10));
    }

    #[tokio::test]
    async fn test_decide_withdrawal_requires_admin() {
        let h = create_test_ledger();
        let worker = register(&h.ledger, "worker@x.io", Role::Worker).await;

        let err = h
            .ledger
            .decide_withdrawal(WithdrawalId::new(), &worker, Decision::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHORIZED");

        let admin = register(&h.ledger, "admin@x.io", Role::Admin).await;
        let err = h
            .ledger
            .decide_withdrawal(WithdrawalId::new(), &admin, Decision::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_platform_stats() {
        let h = create_test_ledger();
        let buyer = register(&h.ledger, "buyer@x.io", Role::Buyer).await;
        let worker = register(&h.ledger, "worker@x.io", Role::Worker).await;
        register(&h.ledger, "admin@x.io", Role::Admin).await;
        let task = h.ledger.create_task(&buyer, new_task(2, 5)).await.unwrap();
        h.ledger.submit(task.id, &worker, "proof").await.unwrap();

        let stats = h.ledger.platform_stats();
        assert_eq!((stats.workers, stats.buyers, stats.admins), (1, 1, 1));
        assert_eq!(stats.tasks, 1);
        assert_eq!(stats.pending_submissions, 1);
        assert_eq!(stats.coins_paid_out, Coins::ZERO);
        assert_eq!(stats.totals.total(), Coins::new(70));
        assert_eq!(h.store.accounts().len(), 3);
    }
}
