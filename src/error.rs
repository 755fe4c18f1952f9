/// Crate-level error types for unref.
use std::path::PathBuf;

/// All errors in unref carry enough context to produce a useful diagnostic
/// without a debugger. Each variant names the file, program, or reason for failure.
///
/// Unresolved references are not errors: they are analysis results and travel
/// as `types::Diagnostic` values instead.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A syntax dump was readable but violates the dump invariants.
    #[error("syntax dump corrupt: {}: {reason}", file.display())]
    DumpCorrupt {
        /// Dump file that failed validation.
        file: PathBuf,
        /// Description of the violated invariant.
        reason: String,
    },

    /// A referenced file does not exist on disk.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON (de)serialization failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// A configuration document could not be parsed for editing.
    #[error("parse failed: {}: {reason}", file.display())]
    ParseFailed {
        /// File that failed to parse.
        file: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// The external tool could not be launched.
    #[error("cannot run program `{}`: {source}", program.display())]
    SpawnFailed {
        /// Executable that was being launched.
        program: PathBuf,
        /// The launch failure reported by the operating system.
        source: std::io::Error,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// The filesystem watcher could not be set up.
    #[error("watch failed: {reason}")]
    Watch {
        /// Description of the watcher failure.
        reason: String,
    },
}
