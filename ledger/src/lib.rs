//! Earnzy Ledger Engine
//!
//! Coin ledger for the Earnzy micro-task marketplace: account balances, task
//! escrow, submission payouts and withdrawal holds, with every cross-record
//! change committed as one atomic batch.

pub mod account;
pub mod balance;
pub mod config;
pub mod engine;
pub mod journal;
pub mod lock_manager;
pub mod notification;
pub mod store;
pub mod submission;
pub mod task;
pub mod withdrawal;

pub use account::{Account, NewAccount, Registration};
pub use balance::{LedgerTotals, PlatformStats};
pub use config::{LedgerConfig, LockConfig};
pub use engine::{AccountRemoval, Ledger, TaskRemoval};
pub use journal::{EntryReason, EntryType, JournalEntry};
pub use lock_manager::{LockKey, LockManager, LockSet};
pub use notification::{Notification, NotificationCenter, NotificationSink, NotifyError};
pub use store::{InMemoryStore, LedgerStore, Write, WriteBatch};
pub use submission::Submission;
pub use task::{parse_completion_date, NewTask, Task, TaskEdit};
pub use withdrawal::{PayoutDestination, Withdrawal};
