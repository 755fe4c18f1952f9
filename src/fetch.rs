//! The package-fetch remediation: runs `go get <package>` on a worker thread,
//! collects its output, and turns the outcome into a notification.
//!
//! Every invocation owns a fresh `FetchState` and its own process. Nothing is
//! shared between invocations, so a failed fetch can simply be started again.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::Error;
use crate::notification::{Notification, NotificationSeverity, Notifier};
use crate::process::{ProcessHandle, ProcessHost};
use crate::progress::{CancelToken, ProgressHost};
use crate::refresh::FsRefresh;
use crate::syntax::{ToolLocator, go_executable};
use crate::types::FetchPackageFix;

/// How long to keep collecting output after the process exited once the
/// stream has gone quiet.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(100);

/// How often a worker checks whether the process has exited.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// The services a fetch talks to. Cheap to clone; shared read-only.
#[derive(Clone)]
pub struct Collaborators {
    /// Where failures are reported.
    pub notifier: Arc<dyn Notifier>,
    /// Launches the tool.
    pub processes: Arc<dyn ProcessHost>,
    /// Shows progress and issues cancellation requests.
    pub progress: Arc<dyn ProgressHost>,
    /// Rescans the file system after the tool ran.
    pub refresh: Arc<dyn FsRefresh>,
    /// Finds the toolchain for a file.
    pub tools: Arc<dyn ToolLocator>,
}

/// Handle to a fetch running on its worker thread.
#[derive(Debug)]
pub struct FetchHandle {
    /// Package being fetched.
    package: String,
    /// Worker that owns the process and the state.
    worker: JoinHandle<FetchState>,
}

/// Lifecycle of one fetch invocation.
#[derive(Debug)]
pub enum FetchState {
    /// Cancelled by the host; the process was destroyed.
    Cancelled,
    /// The process terminated by itself with `exit_code`.
    Completed {
        /// Exit code of the tool; zero is success.
        exit_code: i32,
    },
    /// The tool could not be run or observed.
    Failed {
        /// Message of the underlying error.
        error: String,
    },
    /// Not started yet.
    Idle,
    /// The process is running and its output is being collected.
    Running(RunningFetch),
}

/// The owned resources of a running fetch.
pub struct RunningFetch {
    /// Output lines in arrival order.
    output: Vec<String>,
    /// The tool process.
    process: Box<dyn ProcessHandle>,
}

/// Everything a worker needs to drive one fetch.
struct FetchJob {
    /// Services to report through.
    collaborators: Collaborators,
    /// The `go` executable to run.
    executable: PathBuf,
    /// Package to fetch.
    package: String,
    /// Cancellation requests from the progress host.
    token: CancelToken,
}

/// What the output loop observed in one step.
enum OutputEvent {
    /// Cancellation was requested.
    Cancel,
    /// Every output stream is closed.
    Closed,
    /// Nothing arrived within the poll interval.
    Idle,
    /// One output line.
    Line(String),
}

/// How a running process ended.
enum Termination {
    /// Cancellation was requested and the process destroyed.
    Cancelled,
    /// The process exited by itself.
    Exited {
        /// Exit code.
        code: i32,
        /// Everything it printed.
        output: Vec<String>,
    },
    /// The process status could not be read.
    WaitFailed(Error),
}

impl FetchHandle {
    /// Package this fetch is for.
    pub fn package(&self) -> &str {
        return &self.package;
    }

    /// Block until the worker reaches a terminal state.
    pub fn wait(self) -> FetchState {
        return self.worker.join().unwrap_or_else(|_panic| {
            return FetchState::Failed {
                error: format!("worker for `{}` panicked", self.package),
            };
        });
    }
}

impl FetchJob {
    /// Move from `Running` to a terminal state, reporting as needed.
    fn finish(&self, running: RunningFetch) -> FetchState {
        let termination = running.drive(&self.token);
        return match termination {
            Termination::Cancelled => {
                tracing::info!(package = %self.package, "fetch cancelled");
                FetchState::Cancelled
            },
            Termination::Exited { code, output } => {
                if code == 0 {
                    tracing::info!(package = %self.package, "fetch succeeded");
                } else {
                    tracing::warn!(package = %self.package, code, lines = output.len(), "fetch failed");
                    self.report_failure(failure_message(&output));
                }
                self.refresh();
                FetchState::Completed { exit_code: code }
            },
            Termination::WaitFailed(e) => {
                tracing::warn!(package = %self.package, error = %e, "lost track of fetch process");
                self.report_failure(e.to_string());
                self.refresh();
                FetchState::Failed { error: e.to_string() }
            },
        };
    }

    /// Move from `Idle` to `Running`, or to `Failed` if the tool won't start.
    fn launch(&self) -> FetchState {
        self.collaborators.progress.set_indeterminate(true);
        let args = ["get".to_string(), self.package.clone()];
        return match self.collaborators.processes.spawn(&self.executable, &args) {
            Err(e) => {
                tracing::warn!(package = %self.package, error = %e, "fetch could not start");
                self.report_failure(e.to_string());
                self.refresh();
                FetchState::Failed { error: e.to_string() }
            },
            Ok(process) => FetchState::Running(RunningFetch {
                output: Vec::new(),
                process,
            }),
        };
    }

    /// Request the post-fetch rescan.
    fn refresh(&self) {
        self.collaborators.progress.set_status("Refreshing");
        self.collaborators.refresh.request_refresh();
    }

    /// Surface a failure as a warning notification.
    fn report_failure(&self, body: String) {
        self.collaborators.notifier.notify(Notification {
            body,
            severity: NotificationSeverity::Warning,
            title: format!("Something went wrong with `go get {}`", self.package),
        });
    }

    /// Worker body: advance the state machine until it reaches a terminal state.
    fn run(self) -> FetchState {
        let mut state = FetchState::Idle;
        while !state.is_terminal() {
            state = state.advance(&self);
            tracing::debug!(package = %self.package, state = state.name(), "fetch state");
        }
        return state;
    }
}

impl FetchState {
    /// Take one transition. Terminal states stay where they are.
    fn advance(self, job: &FetchJob) -> Self {
        return match self {
            Self::Idle => job.launch(),
            Self::Running(running) => job.finish(running),
            terminal @ (Self::Cancelled | Self::Completed { .. } | Self::Failed { .. }) => terminal,
        };
    }

    /// Whether no further transition is possible.
    pub const fn is_terminal(&self) -> bool {
        return !matches!(self, Self::Idle | Self::Running(_));
    }

    /// Short state name for logs.
    pub const fn name(&self) -> &'static str {
        return match self {
            Self::Cancelled => "cancelled",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Idle => "idle",
            Self::Running(_) => "running",
        };
    }
}

impl RunningFetch {
    /// Destroy the process on cancellation.
    fn cancel(mut self) -> Termination {
        self.process.destroy();
        return Termination::Cancelled;
    }

    /// Collect output while polling for the exit of the process itself.
    /// A cancellation request at any point destroys the process at once.
    ///
    /// Exit is not tied to the output closing: a helper the tool leaves
    /// behind may hold the inherited pipes open long after it exited.
    fn drive(mut self, token: &CancelToken) -> Termination {
        let lines = self.process.output();
        let cancel = token.requests();
        let mut streaming = true;

        loop {
            if cancel.try_recv().is_ok() {
                return self.cancel();
            }
            match self.process.try_wait() {
                Err(e) => {
                    self.process.destroy();
                    return Termination::WaitFailed(e);
                },
                Ok(Some(code)) => {
                    // Lines already in the pipe are still on their way.
                    while let Ok(line) = lines.recv_timeout(EXIT_DRAIN_GRACE) {
                        self.output.push(line);
                    }
                    return Termination::Exited { code, output: self.output };
                },
                Ok(None) => {},
            }

            if !streaming {
                if cancel.recv_timeout(EXIT_POLL_INTERVAL).is_ok() {
                    return self.cancel();
                }
                continue;
            }
            let event = crossbeam_channel::select! {
                recv(cancel) -> _ => OutputEvent::Cancel,
                recv(lines) -> line => line.map_or(OutputEvent::Closed, OutputEvent::Line),
                default(EXIT_POLL_INTERVAL) => OutputEvent::Idle,
            };
            match event {
                OutputEvent::Cancel => return self.cancel(),
                OutputEvent::Closed => streaming = false,
                OutputEvent::Idle => {},
                OutputEvent::Line(line) => self.output.push(line),
            }
        }
    }
}

impl fmt::Debug for RunningFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.debug_struct("RunningFetch").field("output", &self.output).finish_non_exhaustive();
    }
}

/// Body of the failure notification: the captured output without the echoed
/// command line. A lone line is kept, since it is all there is.
pub fn failure_message(output: &[String]) -> String {
    let lines = if output.len() > 1 { output.get(1..).unwrap_or(&[]) } else { output };
    return lines.join("\n");
}

/// Start fetching the package named by `fix` for `file`.
///
/// Returns `None` without any visible effect when no toolchain is configured
/// for `file`; the fix should not have been offered in that case.
pub fn start(fix: &FetchPackageFix, file: &Path, collaborators: &Collaborators) -> Option<FetchHandle> {
    let Some(home) = collaborators.tools.tool_home(file) else {
        tracing::debug!(file = %file.display(), package = %fix.package, "no toolchain, fetch skipped");
        return None;
    };

    let token = collaborators.progress.begin(&fix.title());
    let job = FetchJob {
        collaborators: collaborators.clone(),
        executable: go_executable(&home),
        package: fix.package.clone(),
        token,
    };

    let spawned = std::thread::Builder::new()
        .name(format!("go-get {}", fix.package))
        .spawn(move || return job.run());
    return match spawned {
        Err(e) => {
            collaborators.notifier.notify(Notification {
                body: e.to_string(),
                severity: NotificationSeverity::Warning,
                title: format!("Something went wrong with `go get {}`", fix.package),
            });
            None
        },
        Ok(worker) => Some(FetchHandle {
            package: fix.package.clone(),
            worker,
        }),
    };
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, clippy::indexing_slicing, reason = "test assertions")]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crossbeam_channel::{Receiver, Sender};

    use super::*;

    /// What a scripted process prints and how it ends.
    #[derive(Clone)]
    struct Script {
        /// Exit code, or `None` to run until destroyed.
        exit: Option<i32>,
        /// Keep the output open after exit, like a helper left running
        /// with the inherited pipes.
        hold_output: bool,
        /// Output lines.
        lines: Vec<&'static str>,
    }

    /// Process host that plays back a script and records what it was asked.
    #[derive(Default)]
    struct ScriptedHost {
        destroyed: Arc<AtomicUsize>,
        fail_spawn: bool,
        script: Mutex<Option<Script>>,
        spawned: Mutex<Vec<(PathBuf, Vec<String>)>>,
    }

    struct ScriptedProcess {
        destroyed: Arc<AtomicUsize>,
        exit: Option<i32>,
        killed: bool,
        output: Receiver<String>,
        /// Held open for processes that run until destroyed.
        keep_open: Option<Sender<String>>,
    }

    impl ProcessHandle for ScriptedProcess {
        fn destroy(&mut self) {
            if !self.killed {
                self.killed = true;
                self.destroyed.fetch_add(1, Ordering::SeqCst);
                drop(self.keep_open.take());
            }
        }

        fn output(&self) -> Receiver<String> {
            return self.output.clone();
        }

        fn try_wait(&mut self) -> Result<Option<i32>, Error> {
            if self.killed {
                return Ok(Some(crate::process::NO_EXIT_CODE));
            }
            return Ok(self.exit);
        }
    }

    impl ProcessHost for ScriptedHost {
        fn spawn(&self, program: &Path, args: &[String]) -> Result<Box<dyn ProcessHandle>, Error> {
            self.spawned.lock().unwrap().push((program.to_path_buf(), args.to_vec()));
            if self.fail_spawn {
                return Err(Error::SpawnFailed {
                    program: program.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
                });
            }
            let script = self.script.lock().unwrap().clone().unwrap();
            let (tx, rx) = crossbeam_channel::unbounded();
            for line in &script.lines {
                tx.send((*line).to_string()).unwrap();
            }
            let keep_open = (script.exit.is_none() || script.hold_output).then_some(tx);
            return Ok(Box::new(ScriptedProcess {
                destroyed: Arc::clone(&self.destroyed),
                exit: script.exit,
                killed: false,
                output: rx,
                keep_open,
            }));
        }
    }

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<Notification>>);

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.0.lock().unwrap().push(notification);
        }
    }

    #[derive(Default)]
    struct CountingRefresh(AtomicUsize);

    impl FsRefresh for CountingRefresh {
        fn request_refresh(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Progress host whose tokens the test can trigger.
    #[derive(Default)]
    struct ManualProgress {
        statuses: Mutex<Vec<String>>,
        tokens: Mutex<Vec<CancelToken>>,
        titles: Mutex<Vec<String>>,
    }

    impl ManualProgress {
        fn cancel_latest(&self) {
            self.tokens.lock().unwrap().last().unwrap().cancel();
        }
    }

    impl ProgressHost for ManualProgress {
        fn begin(&self, title: &str) -> CancelToken {
            self.titles.lock().unwrap().push(title.to_string());
            let token = CancelToken::new();
            self.tokens.lock().unwrap().push(token.clone());
            return token;
        }

        fn set_indeterminate(&self, _indeterminate: bool) {}

        fn set_status(&self, text: &str) {
            self.statuses.lock().unwrap().push(text.to_string());
        }
    }

    struct FixedTools(Option<PathBuf>);

    impl ToolLocator for FixedTools {
        fn tool_home(&self, _file: &Path) -> Option<PathBuf> {
            return self.0.clone();
        }
    }

    struct Harness {
        collaborators: Collaborators,
        host: Arc<ScriptedHost>,
        notifier: Arc<RecordingNotifier>,
        progress: Arc<ManualProgress>,
        refresh: Arc<CountingRefresh>,
    }

    impl Harness {
        fn new(host: ScriptedHost, tools: Option<&str>) -> Self {
            let host = Arc::new(host);
            let notifier = Arc::new(RecordingNotifier::default());
            let progress = Arc::new(ManualProgress::default());
            let refresh = Arc::new(CountingRefresh::default());
            let collaborators = Collaborators {
                notifier: Arc::<RecordingNotifier>::clone(&notifier),
                processes: Arc::<ScriptedHost>::clone(&host),
                progress: Arc::<ManualProgress>::clone(&progress),
                refresh: Arc::<CountingRefresh>::clone(&refresh),
                tools: Arc::new(FixedTools(tools.map(PathBuf::from))),
            };
            return Self { collaborators, host, notifier, progress, refresh };
        }

        fn scripted(lines: Vec<&'static str>, exit: Option<i32>) -> Self {
            let host = ScriptedHost {
                script: Mutex::new(Some(Script { exit, hold_output: false, lines })),
                ..ScriptedHost::default()
            };
            return Self::new(host, Some("/sdk"));
        }

        fn fetch(&self, package: &str) -> FetchState {
            let fix = FetchPackageFix { package: package.to_string() };
            let handle = start(&fix, Path::new("main.go"), &self.collaborators).unwrap();
            return handle.wait();
        }

        fn notifications(&self) -> Vec<Notification> {
            return self.notifier.0.lock().unwrap().clone();
        }

        fn refreshes(&self) -> usize {
            return self.refresh.0.load(Ordering::SeqCst);
        }
    }

    #[test]
    fn success_completes_with_one_refresh_and_no_notification() {
        let harness = Harness::scripted(vec!["/sdk/bin/go get foo"], Some(0));
        let state = harness.fetch("foo");

        assert!(matches!(state, FetchState::Completed { exit_code: 0 }), "{state:?}");
        assert_eq!(harness.refreshes(), 1);
        assert!(harness.notifications().is_empty());
    }

    #[test]
    fn invokes_go_get_with_package_as_single_argument() {
        let harness = Harness::scripted(vec![], Some(0));
        harness.fetch("github.com/acme/some pkg");

        let spawned = harness.host.spawned.lock().unwrap();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].0, go_executable(Path::new("/sdk")));
        assert_eq!(spawned[0].1, ["get", "github.com/acme/some pkg"]);
        assert_eq!(harness.progress.titles.lock().unwrap()[0], "Go get 'github.com/acme/some pkg'");
    }

    #[test]
    fn failure_drops_echoed_command_line() {
        let harness = Harness::scripted(vec!["go get foo", "error: network unreachable"], Some(7));
        let state = harness.fetch("foo");

        assert!(matches!(state, FetchState::Completed { exit_code: 7 }), "{state:?}");
        let notifications = harness.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].body, "error: network unreachable");
        assert_eq!(notifications[0].severity, NotificationSeverity::Warning);
        assert!(notifications[0].title.contains("go get foo"), "{}", notifications[0].title);
        assert_eq!(harness.refreshes(), 1);
    }

    #[test]
    fn exit_is_seen_while_output_stays_open() {
        let host = ScriptedHost {
            script: Mutex::new(Some(Script {
                exit: Some(3),
                hold_output: true,
                lines: vec!["go get foo", "fatal: bad"],
            })),
            ..ScriptedHost::default()
        };
        let harness = Harness::new(host, Some("/sdk"));
        let state = harness.fetch("foo");

        assert!(matches!(state, FetchState::Completed { exit_code: 3 }), "{state:?}");
        let notifications = harness.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].body, "fatal: bad");
        assert_eq!(harness.refreshes(), 1);
        assert_eq!(harness.host.destroyed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failure_with_single_line_keeps_it() {
        let harness = Harness::scripted(vec!["boom"], Some(1));
        harness.fetch("foo");

        let notifications = harness.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].body, "boom");
    }

    #[test]
    fn failure_joins_remaining_lines_in_order() {
        let harness = Harness::scripted(vec!["go get foo", "first", "second", "third"], Some(2));
        harness.fetch("foo");

        assert_eq!(harness.notifications()[0].body, "first\nsecond\nthird");
    }

    #[test]
    fn spawn_failure_notifies_error_message_and_refreshes() {
        let host = ScriptedHost { fail_spawn: true, ..ScriptedHost::default() };
        let harness = Harness::new(host, Some("/sdk"));
        let state = harness.fetch("foo");

        let FetchState::Failed { error } = state else {
            panic!("expected failure, got {state:?}");
        };
        let notifications = harness.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].body, error);
        assert!(error.contains("No such file or directory"), "{error}");
        assert_eq!(harness.refreshes(), 1);
    }

    #[test]
    fn missing_toolchain_is_a_silent_no_op() {
        let harness = Harness::new(ScriptedHost::default(), None);
        let fix = FetchPackageFix { package: "foo".to_string() };

        assert!(start(&fix, Path::new("main.go"), &harness.collaborators).is_none());
        assert!(harness.host.spawned.lock().unwrap().is_empty());
        assert!(harness.notifications().is_empty());
        assert_eq!(harness.refreshes(), 0);
    }

    #[test]
    fn cancel_while_running_destroys_process_silently() {
        let harness = Harness::scripted(vec!["go get slow", "downloading"], None);
        let fix = FetchPackageFix { package: "slow".to_string() };
        let handle = start(&fix, Path::new("main.go"), &harness.collaborators).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        harness.progress.cancel_latest();
        let state = handle.wait();

        assert!(matches!(state, FetchState::Cancelled), "{state:?}");
        assert_eq!(harness.host.destroyed.load(Ordering::SeqCst), 1);
        assert!(harness.notifications().is_empty());
        assert_eq!(harness.refreshes(), 0);
    }

    #[test]
    fn cancel_before_launch_still_destroys_process() {
        let harness = Harness::scripted(vec![], None);
        let fix = FetchPackageFix { package: "slow".to_string() };
        let handle = start(&fix, Path::new("main.go"), &harness.collaborators).unwrap();
        harness.progress.cancel_latest();

        assert!(matches!(handle.wait(), FetchState::Cancelled));
        assert_eq!(harness.host.destroyed.load(Ordering::SeqCst), 1);
        assert!(harness.notifications().is_empty());
    }

    #[test]
    fn repeated_fetch_starts_from_scratch() {
        let harness = Harness::scripted(vec!["go get foo", "error: timeout"], Some(1));
        let first = harness.fetch("foo");
        let second = harness.fetch("foo");

        assert!(matches!(first, FetchState::Completed { exit_code: 1 }));
        assert!(matches!(second, FetchState::Completed { exit_code: 1 }));
        let notifications = harness.notifications();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].body, "error: timeout");
        assert_eq!(notifications[1].body, "error: timeout");
        assert_eq!(harness.refreshes(), 2);
        assert_eq!(harness.progress.tokens.lock().unwrap().len(), 2);
    }

    #[test]
    fn failure_message_edge_cases() {
        assert_eq!(failure_message(&[]), "");
        assert_eq!(failure_message(&["only".to_string()]), "only");
        assert_eq!(failure_message(&["echo".to_string(), String::new()]), "");
    }
}
