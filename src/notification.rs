//! User-visible, non-blocking notifications.

use crate::diagnostics;

/// A message for the user, independent of how it is presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Message text; may span several lines.
    pub body: String,
    /// How prominently the message should be shown.
    pub severity: NotificationSeverity,
    /// One-line summary.
    pub title: String,
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationSeverity {
    /// Something went wrong but the session can continue.
    Warning,
}

/// Accepts notifications. Must not block the caller.
pub trait Notifier: Send + Sync {
    /// Show `notification` to the user.
    fn notify(&self, notification: Notification);
}

/// Notifier that renders each notification as a markdown block on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrNotifier;

impl NotificationSeverity {
    /// Heading word used when rendering.
    pub const fn heading(self) -> &'static str {
        return match self {
            Self::Warning => "Warning",
        };
    }
}

impl Notifier for StderrNotifier {
    fn notify(&self, notification: Notification) {
        diagnostics::print_markdown(&diagnostics::render_notification(&notification));
    }
}
