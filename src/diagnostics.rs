use std::fmt::Write as _;
use std::path::Path;

use crate::config::CONFIG_FILE;
use crate::error::Error;
use crate::notification::Notification;
use crate::types::FileReport;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    print_markdown(&render_error(e));
}

/// Print a markdown block to stderr, headings in bold.
pub fn print_markdown(md: &str) {
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and, where the user can
/// do something about it, how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::DumpCorrupt { file, reason } => render_dump_corrupt(file, reason),
        Error::FileNotFound { path } => format!(
            "\
# Error: File Not Found

`{}` does not exist.
",
            path.display()
        ),
        Error::Io(e) => format!(
            "\
# Error: I/O

{e}
"
        ),
        Error::Json(e) => format!(
            "\
# Error: Invalid JSON

{e}

## Fix

Regenerate the syntax dump with your front end.
"
        ),
        Error::ParseFailed { file, reason } => format!(
            "\
# Error: Parse Failed

Could not parse `{}`: {reason}
",
            file.display()
        ),
        Error::SpawnFailed { program, source } => render_spawn_failed(program, source),
        Error::TomlDe(e) => format!(
            "\
# Error: Invalid TOML

{e}

## Fix

Correct `{CONFIG_FILE}` or remove it to run without a toolchain.
"
        ),
        Error::Watch { reason } => format!(
            "\
# Error: Watch Failed

{reason}
"
        ),
    };
}

/// Render a notification as a markdown block.
pub fn render_notification(notification: &Notification) -> String {
    let mut out = format!("# {}: {}\n", notification.severity.heading(), notification.title);
    if !notification.body.is_empty() {
        let _ = write!(out, "\n{}\n", notification.body);
    }
    return out;
}

/// Render analysis results as JSON: one object per analyzed file.
///
/// # Errors
///
/// Returns `Error::Json` if serialization fails.
pub fn render_json(reports: &[FileReport]) -> Result<String, Error> {
    return Ok(serde_json::to_string_pretty(reports)?);
}

/// Render analysis results as text: one line per diagnostic, then a summary.
pub fn render_text(reports: &[FileReport]) -> String {
    let mut out = String::new();
    let mut total = 0_usize;
    for report in reports {
        for diagnostic in &report.diagnostics {
            total = total.saturating_add(1);
            let _ = write!(
                out,
                "{}  {}:{}..{}  {}",
                diagnostic.severity.label(),
                report.file.display(),
                diagnostic.range.start,
                diagnostic.range.end,
                diagnostic.message
            );
            if let Some(fix) = &diagnostic.fix {
                let _ = write!(out, "  [fix: {}]", fix.title());
            }
            out.push('\n');
        }
    }

    let files = reports.len();
    if total == 0 {
        let _ = writeln!(out, "No unresolved references in {files} file(s)");
    } else {
        let _ = writeln!(out, "\n{total} problem(s) in {files} file(s)");
    }
    return out;
}

fn render_dump_corrupt(file: &Path, reason: &str) -> String {
    return format!(
        "\
# Error: Syntax Dump Corrupt

`{}` is not a valid syntax dump: {reason}

## Fix

Regenerate the dump with your front end. Every node index must be in range,
ranges must not be inverted, and no node may have two parents.
",
        file.display()
    );
}

fn render_spawn_failed(program: &Path, source: &std::io::Error) -> String {
    return format!(
        "\
# Error: Cannot Run Go

`{}` could not be started: {source}

## Fix

Point `sdk` at a Go installation containing `bin/go`:

    unref sdk set /usr/local/go
",
        program.display()
    );
}
