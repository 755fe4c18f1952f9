//! Progress hosting and cancellation for long-running tasks.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

/// Cancellation requests for one hosted task.
///
/// Clones share the request. A token holds its own sender, so the request
/// channel never disconnects while a worker is listening on it.
#[derive(Debug, Clone)]
pub struct CancelToken {
    /// Delivers pending cancellation requests.
    requests: Receiver<()>,
    /// Issues cancellation requests.
    sender: Sender<()>,
}

/// Hosts a cancellable task: shows its progress and decides when to cancel it.
pub trait ProgressHost: Send + Sync {
    /// Start hosting a task titled `title`. The returned token is fresh for
    /// every task and carries the host's cancellation requests.
    fn begin(&self, title: &str) -> CancelToken;

    /// Switch between a determinate and an indeterminate indicator.
    fn set_indeterminate(&self, indeterminate: bool);

    /// Secondary status text under the title.
    fn set_status(&self, text: &str);
}

/// Progress host for a terminal: status lines on stderr, optional deadline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalProgress {
    /// Cancel every hosted task after this long.
    deadline: Option<Duration>,
}

impl CancelToken {
    /// Request cancellation. Repeated requests collapse into one.
    pub fn cancel(&self) {
        let _ = self.sender.try_send(());
    }

    /// Create a token with no pending request.
    pub fn new() -> Self {
        let (sender, requests) = crossbeam_channel::bounded(1);
        return Self { requests, sender };
    }

    /// Channel the worker listens on; a message means "cancel now".
    pub const fn requests(&self) -> &Receiver<()> {
        return &self.requests;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        return Self::new();
    }
}

impl TerminalProgress {
    /// A terminal host that cancels tasks still running after `deadline`.
    pub const fn new(deadline: Option<Duration>) -> Self {
        return Self { deadline };
    }
}

impl ProgressHost for TerminalProgress {
    fn begin(&self, title: &str) -> CancelToken {
        eprintln!("{title}...");
        let token = CancelToken::new();
        if let Some(deadline) = self.deadline {
            let timer = token.clone();
            let spawned = std::thread::Builder::new()
                .name("unref-deadline".to_string())
                .spawn(move || {
                    std::thread::sleep(deadline);
                    tracing::info!(?deadline, "deadline reached, cancelling");
                    timer.cancel();
                });
            if let Err(e) = spawned {
                tracing::warn!(error = %e, "deadline timer unavailable, task runs unbounded");
            }
        }
        return token;
    }

    fn set_indeterminate(&self, indeterminate: bool) {
        tracing::debug!(indeterminate, "progress mode");
    }

    fn set_status(&self, text: &str) {
        eprintln!("  {text}");
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test assertions")]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_visible_to_clones() {
        let token = CancelToken::new();
        let worker = token.clone();
        assert!(worker.requests().try_recv().is_err());

        token.cancel();
        token.cancel();
        assert!(worker.requests().try_recv().is_ok());
        assert!(worker.requests().try_recv().is_err());
    }

    #[test]
    fn deadline_cancels_hosted_task() {
        let host = TerminalProgress::new(Some(Duration::from_millis(10)));
        let token = host.begin("test");
        assert!(token.requests().recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn tokens_are_fresh_per_task() {
        let host = TerminalProgress::new(Some(Duration::from_millis(10)));
        let first = host.begin("first");
        assert!(first.requests().recv_timeout(Duration::from_secs(5)).is_ok());

        let second = TerminalProgress::new(None).begin("second");
        assert!(second.requests().recv_timeout(Duration::from_millis(50)).is_err());
    }
}
