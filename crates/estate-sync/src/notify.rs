//! User-facing notifications published by views.
//!
//! A view never surfaces errors by returning them to the UI; it publishes a
//! [`Notification`] and keeps its last good rowset. Any number of consumers
//! (toasts, logs, the CLI) subscribe independently.

use serde::Serialize;
use tokio::sync::broadcast;

use estate_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

/// One toast-style message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    /// HTTP-like status, when the message comes from a failed request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            status: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            status: None,
        }
    }

    /// Error notification carrying the error's user message and status.
    pub fn from_error(err: &Error) -> Self {
        Self {
            severity: Severity::Error,
            message: err.user_message(),
            status: err.status(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Broadcast fan-out for notifications.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    /// Create a notifier with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to all subscribers. Dropped silently when nobody listens.
    pub fn notify(&self, notification: Notification) {
        tracing::debug!(
            subsystem = "sync",
            component = "notifier",
            severity = ?notification.severity,
            subscriber_count = self.tx.receiver_count(),
            "Notification"
        );
        let _ = self.tx.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
