//! Transient, dismissible user notifications.
//!
//! Every collaborator failure is converted into one of these at the call
//! site; controllers queue them and the presentation layer drains the queue.

use std::collections::VecDeque;
use std::time::Duration;

use crate::navigation::Route;

/// How long non-loading notifications stay visible.
pub const AUTO_DISMISS_AFTER: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
    /// Long-running work; stays until replaced.
    Loading,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationAction {
    pub label: String,
    pub route: Route,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            actions: Vec::new(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message)
    }

    pub fn loading(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Loading, message)
    }

    pub fn with_action(mut self, label: impl Into<String>, route: Route) -> Self {
        self.actions.push(NotificationAction {
            label: label.into(),
            route,
        });
        self
    }

    /// Auto-dismiss delay, or `None` for loading notifications.
    pub fn expires_after(&self) -> Option<Duration> {
        match self.kind {
            NotificationKind::Loading => None,
            _ => Some(AUTO_DISMISS_AFTER),
        }
    }
}

/// FIFO of notifications raised since the last drain.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: VecDeque<Notification>,
}

impl NotificationQueue {
    pub fn push(&mut self, notification: Notification) {
        match notification.kind {
            NotificationKind::Error | NotificationKind::Warning => {
                tracing::warn!(message = %notification.message, "notification")
            }
            _ => tracing::debug!(message = %notification.message, "notification"),
        }
        self.pending.push_back(notification);
    }

    pub fn drain(&mut self) -> Vec<Notification> {
        self.pending.drain(..).collect()
    }

    pub fn latest(&self) -> Option<&Notification> {
        self.pending.back()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_notifications_never_expire() {
        assert_eq!(Notification::loading("Training model…").expires_after(), None);
        assert_eq!(
            Notification::error("Failed").expires_after(),
            Some(AUTO_DISMISS_AFTER)
        );
    }

    #[test]
    fn queue_drains_in_order() {
        let mut queue = NotificationQueue::default();
        queue.push(Notification::info("first"));
        queue.push(Notification::success("second"));
        assert_eq!(queue.latest().map(|n| n.message.as_str()), Some("second"));
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "first");
        assert!(queue.is_empty());
    }
}
