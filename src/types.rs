/// Core domain types: node kinds, resolution outcomes, diagnostics, and fixes.
use std::ops::Range;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A diagnostic produced by one analysis pass.
/// The range is absolute within the analyzed file and always lies inside the
/// range of the node that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Remediation offered alongside the diagnostic, if any.
    pub fix: Option<FetchPackageFix>,
    /// Human-readable description, e.g. `Unresolved reference 'foo'`.
    pub message: String,
    /// Byte range the diagnostic is anchored at.
    pub range: Range<u32>,
    /// How the diagnostic should be highlighted.
    pub severity: Severity,
}

/// Diagnostics of one analyzed file, in report order.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    /// Diagnostics produced by the pass.
    pub diagnostics: Vec<Diagnostic>,
    /// Source file the dump describes.
    pub file: PathBuf,
}

/// Remediation descriptor: fetch a missing package with the external tool.
/// Pure data; running it is the job of `fetch::start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchPackageFix {
    /// Import path exactly as written between the quotes.
    pub package: String,
}

impl FetchPackageFix {
    /// The label shown to the user when offering the fix.
    pub fn title(&self) -> String {
        return format!("Go get '{}'", self.package);
    }
}

/// Node kinds the analysis dispatches on. Everything else is `Other` and
/// only traversed structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A quoted import path literal.
    ImportString,
    /// Any node without reference semantics.
    Other,
    /// A plain or qualified identifier in expression position.
    Reference,
    /// A plain or qualified identifier in type position.
    TypeReference,
}

/// The resolver's answer for one reference node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<N> {
    /// The reference points at the given node.
    Resolved(N),
    /// No declaration was found.
    Unresolved,
}

impl<N> Resolution<N> {
    /// Whether the resolver found a target.
    pub const fn is_resolved(&self) -> bool {
        return matches!(self, Self::Resolved(_));
    }
}

/// Highlighting class of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Generic error or warning, e.g. an empty import path.
    Error,
    /// Unknown-symbol highlighting for names that do not resolve.
    UnknownSymbol,
    /// Weak warning. Not produced by the unresolved-reference pass but part
    /// of the severity vocabulary renderers understand.
    WeakWarning,
}

impl Severity {
    /// Fixed-width label used by the text renderer.
    pub const fn label(self) -> &'static str {
        return match self {
            Self::Error => "ERROR",
            Self::UnknownSymbol => "UNKNOWN",
            Self::WeakWarning => "WEAK",
        };
    }
}
