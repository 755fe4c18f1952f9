//! Core CLI commands for unref: check, fix, get.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;

use crate::config::Config;
use crate::diagnostics;
use crate::dump::SyntaxDump;
use crate::error;
use crate::fetch::{self, Collaborators, FetchState};
use crate::inspection;
use crate::notification::StderrNotifier;
use crate::process::OsProcessHost;
use crate::progress::TerminalProgress;
use crate::refresh::WorkspaceRescan;
use crate::types::{FetchPackageFix, FileReport};

/// Exit code when analysis produced at least one diagnostic.
const EXIT_DIAGNOSTICS: u8 = 1;

/// Output format of `check` and `watch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    /// Array of per-file objects.
    Json,
    /// One line per diagnostic plus a summary.
    #[default]
    Text,
}

/// Run the unresolved-reference pass over one dump.
///
/// # Errors
///
/// Returns `Error::FileNotFound`, `Error::Json`, or `Error::DumpCorrupt` if
/// the dump cannot be loaded.
pub fn analyze(path: &Path, config: &Config) -> Result<FileReport, error::Error> {
    let dump = SyntaxDump::read(path)?;
    tracing::debug!(dump = %path.display(), file = %dump.file.display(), nodes = dump.node_count(), "dump loaded");
    let diagnostics = inspection::inspect(dump.root(), &dump.file, &dump, config);
    return Ok(FileReport { diagnostics, file: dump.file.clone() });
}

/// Analyze every dump in parallel. Reports keep the order of `dumps`.
///
/// # Errors
///
/// Returns an error if any dump fails to load; see [`analyze`].
pub fn analyze_all(dumps: &[PathBuf], config: &Config) -> Result<Vec<FileReport>, error::Error> {
    return dumps.par_iter().map(|path| return analyze(path, config)).collect();
}

/// Analyze dumps and print their diagnostics.
///
/// # Errors
///
/// Returns errors from config or dump loading.
pub fn check(dumps: &[PathBuf], format: Format) -> Result<ExitCode, error::Error> {
    let root = PathBuf::from(".");
    let config = Config::load(&root)?;
    let reports = analyze_all(dumps, &config)?;

    match format {
        Format::Json => println!("{}", diagnostics::render_json(&reports)?),
        Format::Text => print!("{}", diagnostics::render_text(&reports)),
    }

    if reports.iter().any(|r| return !r.diagnostics.is_empty()) {
        return Ok(ExitCode::from(EXIT_DIAGNOSTICS));
    }
    return Ok(ExitCode::SUCCESS);
}

/// Run every package fetch offered by the diagnostics of one dump, one after
/// another. Each package is fetched once even if several imports name it.
///
/// # Errors
///
/// Returns errors from config or dump loading.
pub fn fix(dump: &Path, deadline: Option<u64>) -> Result<ExitCode, error::Error> {
    let root = PathBuf::from(".");
    let config = Arc::new(Config::load(&root)?);
    let report = analyze(dump, &config)?;

    let packages = offered_packages(&report);
    if packages.is_empty() {
        eprintln!("Nothing to fetch for {}.", report.file.display());
        return Ok(ExitCode::SUCCESS);
    }

    let (collaborators, rescan) = collaborators(config, &root, deadline);
    let mut failed = 0_u32;
    for package in packages {
        let fix = FetchPackageFix { package: package.to_string() };
        if !run_fetch(&fix, &report.file, &collaborators) {
            failed = failed.saturating_add(1);
        }
    }
    rescan.wait_idle();

    if failed > 0 {
        eprintln!("\n{failed} package(s) not fetched");
        return Ok(ExitCode::from(EXIT_DIAGNOSTICS));
    }
    return Ok(ExitCode::SUCCESS);
}

/// Fetch one package with the toolchain serving `file`.
///
/// # Errors
///
/// Returns errors from config loading.
pub fn get(package: &str, file: &Path, deadline: Option<u64>) -> Result<ExitCode, error::Error> {
    let root = PathBuf::from(".");
    let config = Arc::new(Config::load(&root)?);
    let (collaborators, rescan) = collaborators(config, &root, deadline);

    let fix = FetchPackageFix { package: package.to_string() };
    let fetched = run_fetch(&fix, file, &collaborators);
    rescan.wait_idle();

    if fetched {
        return Ok(ExitCode::SUCCESS);
    }
    return Ok(ExitCode::from(EXIT_DIAGNOSTICS));
}

/// Wire the terminal implementations of the fetch collaborators.
/// The rescanner is returned separately so the caller can wait for it.
fn collaborators(config: Arc<Config>, root: &Path, deadline: Option<u64>) -> (Collaborators, Arc<WorkspaceRescan>) {
    let rescan = Arc::new(WorkspaceRescan::new(root.to_path_buf()));
    let collaborators = Collaborators {
        notifier: Arc::new(StderrNotifier),
        processes: Arc::new(OsProcessHost),
        progress: Arc::new(TerminalProgress::new(deadline.map(Duration::from_secs))),
        refresh: Arc::<WorkspaceRescan>::clone(&rescan),
        tools: config,
    };
    return (collaborators, rescan);
}

/// Packages the report's fixes ask for, first occurrence first.
fn offered_packages(report: &FileReport) -> Vec<&str> {
    let mut seen = HashSet::new();
    return report
        .diagnostics
        .iter()
        .filter_map(|d| return d.fix.as_ref())
        .map(|f| return f.package.as_str())
        .filter(|package| return seen.insert(*package))
        .collect();
}

/// Run one fetch to completion. Returns whether the package was fetched.
fn run_fetch(fix: &FetchPackageFix, file: &Path, collaborators: &Collaborators) -> bool {
    let Some(handle) = fetch::start(fix, file, collaborators) else {
        eprintln!("No Go toolchain configured for {}; skipping {}.", file.display(), fix.package);
        return false;
    };
    let package = handle.package().to_string();
    return match handle.wait() {
        FetchState::Cancelled => {
            eprintln!("Cancelled: {package}");
            false
        },
        FetchState::Completed { exit_code: 0 } => {
            eprintln!("Fetched: {package}");
            true
        },
        state => {
            tracing::debug!(package = %package, state = state.name(), "fetch did not succeed");
            false
        },
    };
}
