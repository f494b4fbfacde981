//! User notifications emitted by ledger operations.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use earnzy_common::{Email, Entity, LedgerError, NotificationId, Result};

/// A message shown to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: Email,
    pub message: String,
    /// UI route the notification links to.
    pub route: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    /// Create an unread notification.
    pub fn new(recipient: Email, message: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            id: NotificationId::new(),
            recipient,
            message: message.into(),
            route: route.into(),
            created_at: Utc::now(),
            read: false,
        }
    }
}

/// Delivery failure. Never propagated out of a ledger operation.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification sink unavailable: {0}")]
    Unavailable(String),
}

/// Write-only destination for notifications.
///
/// Calls are fire-and-forget from the ledger's point of view: an error is
/// logged and the triggering operation still succeeds.
pub trait NotificationSink: Send + Sync {
    /// Append a notification for `recipient`.
    fn append(
        &self,
        recipient: &Email,
        message: &str,
        route: &str,
    ) -> std::result::Result<(), NotifyError>;

    /// Drop every notification for `recipient` (account removal).
    fn purge(&self, _recipient: &Email) -> std::result::Result<(), NotifyError> {
        Ok(())
    }
}

/// In-memory notification inbox, one list per recipient.
#[derive(Default)]
pub struct NotificationCenter {
    inboxes: DashMap<Email, Vec<Notification>>,
}

impl NotificationCenter {
    /// Create an empty notification center.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications for `recipient`, newest first.
    pub fn list(&self, recipient: &Email) -> Vec<Notification> {
        let mut list = self
            .inboxes
            .get(recipient)
            .map(|inbox| inbox.clone())
            .unwrap_or_default();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    /// Count of unread notifications for `recipient`.
    pub fn unread_count(&self, recipient: &Email) -> usize {
        self.inboxes
            .get(recipient)
            .map(|inbox| inbox.iter().filter(|n| !n.read).count())
            .unwrap_or(0)
    }

    /// Flip a notification to read. Only the recipient may do this.
    pub fn mark_read(&self, recipient: &Email, id: NotificationId) -> Result<Notification> {
        let mut inbox = self
            .inboxes
            .get_mut(recipient)
            .ok_or_else(|| LedgerError::not_found(Entity::Notification, id))?;
        let notification = inbox
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| LedgerError::not_found(Entity::Notification, id))?;
        notification.read = true;
        Ok(notification.clone())
    }

    /// Delete one notification. Only the recipient may do this.
    pub fn delete(&self, recipient: &Email, id: NotificationId) -> Result<()> {
        let mut inbox = self
            .inboxes
            .get_mut(recipient)
            .ok_or_else(|| LedgerError::not_found(Entity::Notification, id))?;
        let before = inbox.len();
        inbox.retain(|n| n.id != id);
        if inbox.len() == before {
            return Err(LedgerError::not_found(Entity::Notification, id));
        }
        Ok(())
    }
}

impl NotificationSink for NotificationCenter {
    fn append(
        &self,
        recipient: &Email,
        message: &str,
        route: &str,
    ) -> std::result::Result<(), NotifyError> {
        let notification = Notification::new(recipient.clone(), message, route);
        debug!(recipient = %recipient, id = %notification.id, "Notification appended");
        self.inboxes
            .entry(recipient.clone())
            .or_default()
            .push(notification);
        Ok(())
    }

    fn purge(&self, recipient: &Email) -> std::result::Result<(), NotifyError> {
        self.inboxes.remove(recipient);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_list() {
        let center = NotificationCenter::new();
        let worker = Email::new("worker@example.com");

        center.append(&worker, "first", "/dashboard").unwrap();
        center.append(&worker, "second", "/dashboard").unwrap();

        let list = center.list(&worker);
        assert_eq!(list.len(), 2);
        assert_eq!(center.unread_count(&worker), 2);
        assert!(center.list(&Email::new("other@example.com")).is_empty());
    }

    #[test]
    fn test_mark_read_and_delete() {
        let center = NotificationCenter::new();
        let worker = Email::new("worker@example.com");
        center.append(&worker, "hello", "/dashboard").unwrap();
        let id = center.list(&worker)[0].id;

        let read = center.mark_read(&worker, id).unwrap();
        assert!(read.read);
        assert_eq!(center.unread_count(&worker), 0);

        // Another user cannot touch it.
        let stranger = Email::new("stranger@example.com");
        assert!(center.delete(&stranger, id).is_err());

        center.delete(&worker, id).unwrap();
        assert!(center.list(&worker).is_empty());
        assert!(center.delete(&worker, id).is_err());
    }

    #[test]
    fn test_purge() {
        let center = NotificationCenter::new();
        let worker = Email::new("worker@example.com");
        center.append(&worker, "hello", "/dashboard").unwrap();

        center.purge(&worker).unwrap();
        assert!(center.list(&worker).is_empty());
    }
}
