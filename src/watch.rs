//! File watcher: runs `check` on startup, then re-runs when a dump or the
//! project configuration changes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use notify::{RecursiveMode, Watcher as _};

use crate::commands::{self, Format};
use crate::diagnostics;
use crate::error;

/// Debounce delay between filesystem events and re-check.
const DEBOUNCE_MS: u64 = 100;

/// Exit code of a check that failed with an error.
const EXIT_ERROR: u8 = 2;

/// Directories holding the dumps, plus the project root for `.unref.toml`.
fn collect_watch_dirs(dumps: &[PathBuf], root: &Path) -> HashSet<PathBuf> {
    let mut dirs = HashSet::new();
    dirs.insert(root.to_path_buf());
    for dump in dumps {
        match dump.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => dirs.insert(parent.to_path_buf()),
            _ => dirs.insert(root.to_path_buf()),
        };
    }
    return dirs;
}

/// Create a filesystem watcher that sends events on the given channel.
///
/// # Errors
///
/// Returns `Error::Watch` if the watcher cannot be created.
fn create_watcher(tx: crossbeam_channel::Sender<()>) -> Result<notify::RecommendedWatcher, error::Error> {
    return notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        if let Ok(event) = res
            && matches!(
                event.kind,
                notify::EventKind::Create(_) | notify::EventKind::Modify(_) | notify::EventKind::Remove(_)
            )
        {
            let _ = tx.send(());
        }
    })
    .map_err(|e| {
        return error::Error::Watch {
            reason: format!("watcher setup failed: {e}"),
        };
    });
}

/// Entry point for the watch command.
///
/// Runs an initial check, then watches the dump directories and re-checks on
/// changes. Only returns when the watcher shuts down.
///
/// # Errors
///
/// Returns `Error::Watch` if the watcher cannot be set up.
pub fn run(dumps: &[PathBuf], format: Format) -> Result<ExitCode, error::Error> {
    let root = PathBuf::from(".");

    eprintln!("watch: initial check");
    let mut last_code = run_check(dumps, format);

    let watch_dirs = collect_watch_dirs(dumps, &root);
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut watcher = create_watcher(tx)?;

    for dir in &watch_dirs {
        if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
            tracing::warn!(dir = %dir.display(), error = %e, "directory not watched");
        }
    }

    let dir_count = watch_dirs.len();
    eprintln!("watch: monitoring {dir_count} directories, press Ctrl+C to stop");

    while rx.recv().is_ok() {
        let debounce = Duration::from_millis(DEBOUNCE_MS);
        while rx.recv_timeout(debounce).is_ok() {}
        eprintln!("watch: change detected, re-checking...");
        last_code = run_check(dumps, format);
    }

    return Ok(last_code);
}

/// Run check once and print the result. Errors are printed, not propagated,
/// so a half-written dump does not end the session.
fn run_check(dumps: &[PathBuf], format: Format) -> ExitCode {
    return match commands::check(dumps, format) {
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(EXIT_ERROR)
        },
        Ok(code) => code,
    };
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test assertions")]
mod tests {
    use super::*;

    #[test]
    fn watches_dump_parents_and_root() {
        let dumps = [
            PathBuf::from("dumps/a.json"),
            PathBuf::from("dumps/b.json"),
            PathBuf::from("other/c.json"),
            PathBuf::from("top.json"),
        ];
        let dirs = collect_watch_dirs(&dumps, Path::new("."));

        assert_eq!(dirs.len(), 3);
        assert!(dirs.contains(Path::new(".")));
        assert!(dirs.contains(Path::new("dumps")));
        assert!(dirs.contains(Path::new("other")));
    }
}
