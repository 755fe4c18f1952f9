//! Collaborator contracts consumed by the analysis pass.
//!
//! The syntax tree, the resolver, and the toolchain lookup are owned elsewhere.
//! The pass only borrows them through these traits for the duration of one run.

use std::hash::Hash;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::types::{NodeKind, Resolution};

/// Name resolution for the reference-bearing node kinds.
/// Must answer deterministically for the duration of one pass.
pub trait Resolver<N: SyntaxNode> {
    /// Resolve a reference, type reference, or import string.
    fn resolve(&self, node: N) -> Resolution<N>;
}

/// Handle into an immutable, externally owned syntax tree.
///
/// Handles are cheap to copy and compare; equal handles denote the same node.
pub trait SyntaxNode: Copy + Eq + Hash {
    /// Structural children in source order.
    fn children(&self) -> Vec<Self>;

    /// Identifier token of a reference or type reference.
    fn identifier(&self) -> Option<Self>;

    /// Node kind used for dispatch.
    fn kind(&self) -> NodeKind;

    /// Qualifier of a reference or type reference (`fmt` in `fmt.Println`).
    fn qualifier(&self) -> Option<Self>;

    /// Absolute byte range within the file.
    fn range(&self) -> Range<u32>;

    /// Source text covered by the node.
    fn text(&self) -> &str;
}

/// Locates the external toolchain a file belongs to.
pub trait ToolLocator: Send + Sync {
    /// Home directory of the toolchain for `file`, or `None` when no toolchain
    /// is configured for it.
    fn tool_home(&self, file: &Path) -> Option<PathBuf>;
}

/// Path of the `go` executable inside a toolchain home.
pub fn go_executable(home: &Path) -> PathBuf {
    let name = if cfg!(windows) { "go.exe" } else { "go" };
    return home.join("bin").join(name);
}
