//! File-system refresh after a package fetch.

use std::path::PathBuf;
use std::sync::Mutex;
use std::thread::JoinHandle;

use walkdir::WalkDir;

/// Asks the file-system view to pick up changes made behind its back.
pub trait FsRefresh: Send + Sync {
    /// Schedule a rescan. Returns immediately.
    fn request_refresh(&self);
}

/// Rescans a project tree on a background thread.
#[derive(Debug)]
pub struct WorkspaceRescan {
    /// Rescans started and not yet collected by `wait_idle`.
    pending: Mutex<Vec<JoinHandle<usize>>>,
    /// Directory to rescan.
    root: PathBuf,
}

impl WorkspaceRescan {
    /// A rescanner for the tree under `root`.
    pub const fn new(root: PathBuf) -> Self {
        return Self { pending: Mutex::new(Vec::new()), root };
    }

    /// Block until every requested rescan has finished, so a short-lived
    /// command does not exit mid-scan.
    pub fn wait_idle(&self) {
        let handles = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl FsRefresh for WorkspaceRescan {
    fn request_refresh(&self) {
        let root = self.root.clone();
        let spawned = std::thread::Builder::new()
            .name("unref-rescan".to_string())
            .spawn(move || return rescan(&root));
        match spawned {
            Err(e) => tracing::warn!(error = %e, "rescan could not be started"),
            Ok(handle) => match self.pending.lock() {
                Ok(mut pending) => pending.push(handle),
                Err(poisoned) => poisoned.into_inner().push(handle),
            },
        }
    }
}

/// Walk the tree and count the files visible in it.
fn rescan(root: &std::path::Path) -> usize {
    let files = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| return e.file_type().is_file())
        .count();
    tracing::info!(root = %root.display(), files, "workspace rescanned");
    return files;
}
