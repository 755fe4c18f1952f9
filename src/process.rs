//! Process host: launches the external tool and streams its combined output.

use std::io::{BufRead as _, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crossbeam_channel::{Receiver, Sender};

use crate::error::Error;

/// Exit code reported for a process that ended without one (killed by a signal).
pub const NO_EXIT_CODE: i32 = -1;

/// A launched process, exclusively owned by the task that started it.
pub trait ProcessHandle: Send {
    /// Kill the process and release its resources. Idempotent.
    fn destroy(&mut self);

    /// Output lines in arrival order, stdout and stderr merged. The channel
    /// disconnects once both streams are exhausted.
    fn output(&self) -> Receiver<String>;

    /// Exit code if the process has terminated.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the process status cannot be queried.
    fn try_wait(&mut self) -> Result<Option<i32>, Error>;
}

/// Launches external processes.
pub trait ProcessHost: Send + Sync {
    /// Start `program` with `args`.
    ///
    /// # Errors
    ///
    /// Returns `Error::SpawnFailed` if the program cannot be launched.
    fn spawn(&self, program: &Path, args: &[String]) -> Result<Box<dyn ProcessHandle>, Error>;
}

/// Process host backed by `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsProcessHost;

/// A child process plus the channel its reader threads feed.
struct OsProcess {
    /// The running child.
    child: Child,
    /// Merged output lines.
    output: Receiver<String>,
}

impl Drop for OsProcess {
    /// Never leave a running or unreaped child behind.
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            self.destroy();
        }
    }
}

impl ProcessHandle for OsProcess {
    fn destroy(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    fn output(&self) -> Receiver<String> {
        return self.output.clone();
    }

    fn try_wait(&mut self) -> Result<Option<i32>, Error> {
        let status = self.child.try_wait()?;
        return Ok(status.map(|s| return s.code().unwrap_or(NO_EXIT_CODE)));
    }
}

impl ProcessHost for OsProcessHost {
    fn spawn(&self, program: &Path, args: &[String]) -> Result<Box<dyn ProcessHandle>, Error> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| return Error::SpawnFailed { program: program.to_path_buf(), source })?;
        tracing::info!(program = %program.display(), ?args, pid = child.id(), "process started");

        let (tx, rx) = crossbeam_channel::unbounded();
        // The first line is the command itself, the way a console echoes it.
        let _ = tx.send(command_line(program, args));

        let pipes: [Option<Box<dyn Read + Send>>; 2] = [
            child.stdout.take().map(|p| -> Box<dyn Read + Send> { return Box::new(p) }),
            child.stderr.take().map(|p| -> Box<dyn Read + Send> { return Box::new(p) }),
        ];
        for pipe in pipes.into_iter().flatten() {
            let sender = tx.clone();
            let reader = std::thread::Builder::new()
                .name("unref-output".to_string())
                .spawn(move || {
                    forward_lines(pipe, &sender);
                });
            if let Err(e) = reader {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Io(e));
            }
        }

        return Ok(Box::new(OsProcess { child, output: rx }));
    }
}

/// Render a command line for display.
fn command_line(program: &Path, args: &[String]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    return line;
}

/// Forward every line of `pipe` to `tx` until EOF or until the receiver is gone.
/// Invalid UTF-8 is replaced rather than dropped.
fn forward_lines(pipe: Box<dyn Read + Send>, tx: &Sender<String>) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => return,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end_matches(['\n', '\r']).to_string();
                if tx.send(line).is_err() {
                    return;
                }
            },
        }
    }
}
