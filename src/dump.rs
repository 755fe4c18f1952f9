//! Syntax dumps: the parse tree and resolver answers for one source file,
//! produced by an external front end and handed to unref as JSON.
//!
//! A dump is validated once on load. After that every node handle points at
//! a real node, every range is well-formed, and the tree reachable from the
//! root has no shared children or cycles, so a traversal never revisits a node.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;
use crate::syntax::{Resolver, SyntaxNode};
use crate::types::{NodeKind, Resolution};

/// Stand-in returned for an out-of-range handle. Unreachable after validation.
static MISSING_NODE: NodeData = NodeData {
    children: Vec::new(),
    identifier: None,
    kind: NodeKind::Other,
    qualifier: None,
    range: [0, 0],
    target: None,
    text: String::new(),
};

/// Handle to one node of a `SyntaxDump`.
#[derive(Debug, Clone, Copy)]
pub struct DumpNode<'a> {
    /// Dump the node belongs to.
    dump: &'a SyntaxDump,
    /// Position in `SyntaxDump::nodes`.
    index: usize,
}

/// One serialized node.
#[derive(Debug, Deserialize)]
struct NodeData {
    /// Indices of the structural children, in source order.
    #[serde(default)]
    children: Vec<usize>,
    /// Index of the identifier token (references only).
    #[serde(default)]
    identifier: Option<usize>,
    /// Dispatch kind.
    kind: NodeKind,
    /// Index of the qualifier reference (references only).
    #[serde(default)]
    qualifier: Option<usize>,
    /// Absolute `[start, end)` byte range.
    range: [u32; 2],
    /// Index of the node the resolver resolved this one to.
    #[serde(default)]
    target: Option<usize>,
    /// Source text covered by the node.
    #[serde(default)]
    text: String,
}

/// Parse tree plus resolution answers for one source file.
#[derive(Debug, Deserialize)]
pub struct SyntaxDump {
    /// Source file the dump describes, relative to the project root.
    pub file: PathBuf,
    /// Flat node table; handles are indices into it.
    nodes: Vec<NodeData>,
    /// Index of the file node.
    #[serde(default)]
    root: usize,
}

impl<'a> DumpNode<'a> {
    /// Serialized data behind the handle.
    fn data(&self) -> &'a NodeData {
        return self.dump.nodes.get(self.index).unwrap_or(&MISSING_NODE);
    }

    /// Handle to another node of the same dump.
    const fn sibling(&self, index: usize) -> Self {
        return Self { dump: self.dump, index };
    }
}

impl PartialEq for DumpNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        return std::ptr::eq(self.dump, other.dump) && self.index == other.index;
    }
}

impl Eq for DumpNode<'_> {}

impl Hash for DumpNode<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl SyntaxNode for DumpNode<'_> {
    fn children(&self) -> Vec<Self> {
        return self.data().children.iter().map(|&i| return self.sibling(i)).collect();
    }

    fn identifier(&self) -> Option<Self> {
        return self.data().identifier.map(|i| return self.sibling(i));
    }

    fn kind(&self) -> NodeKind {
        return self.data().kind;
    }

    fn qualifier(&self) -> Option<Self> {
        return self.data().qualifier.map(|i| return self.sibling(i));
    }

    fn range(&self) -> Range<u32> {
        let [start, end] = self.data().range;
        return start..end;
    }

    fn text(&self) -> &str {
        return &self.data().text;
    }
}

impl SyntaxDump {
    /// Number of nodes in the dump.
    pub fn node_count(&self) -> usize {
        return self.nodes.len();
    }

    /// Parse and validate a dump from JSON content.
    /// `origin` is only used to label errors.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the content is not a dump,
    /// or `Error::DumpCorrupt` if it violates the dump invariants.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, Error> {
        let dump: Self = serde_json::from_str(content)?;
        dump.validate().map_err(|reason| {
            return Error::DumpCorrupt { file: origin.to_path_buf(), reason };
        })?;
        return Ok(dump);
    }

    /// Read, parse, and validate a dump from disk.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileNotFound` if the file doesn't exist, `Error::Io` for
    /// other read failures, and the errors of `SyntaxDump::parse`.
    pub fn read(path: &Path) -> Result<Self, Error> {
        let content = match std::fs::read_to_string(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound { path: path.to_path_buf() });
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };
        return Self::parse(&content, path);
    }

    /// Handle to the file node.
    pub const fn root(&self) -> DumpNode<'_> {
        return DumpNode { dump: self, index: self.root };
    }

    /// Check every dump invariant, returning the first violation.
    fn validate(&self) -> Result<(), String> {
        let count = self.nodes.len();
        if self.root >= count {
            return Err(format!("root {} out of range ({count} nodes)", self.root));
        }

        let mut parented: HashSet<usize> = HashSet::new();
        for (index, node) in self.nodes.iter().enumerate() {
            validate_node(index, node, count)?;
            validate_qualifier(index, node, &self.nodes)?;
            for &child in &node.children {
                if child == self.root {
                    return Err(format!("node {index} lists the root as a child"));
                }
                if !parented.insert(child) {
                    return Err(format!("node {child} has more than one parent"));
                }
            }
        }
        return Ok(());
    }
}

impl<'a> Resolver<DumpNode<'a>> for SyntaxDump {
    fn resolve(&self, node: DumpNode<'a>) -> Resolution<DumpNode<'a>> {
        return match node.data().target {
            None => Resolution::Unresolved,
            Some(target) => Resolution::Resolved(node.sibling(target)),
        };
    }
}

/// Check that a node's own fields are in range and consistent.
fn validate_node(index: usize, node: &NodeData, count: usize) -> Result<(), String> {
    let [start, end] = node.range;
    if start > end {
        return Err(format!("node {index} has inverted range {start}..{end}"));
    }

    let links = node
        .children
        .iter()
        .chain(node.identifier.iter())
        .chain(node.qualifier.iter())
        .chain(node.target.iter());
    for &link in links {
        if link >= count {
            return Err(format!("node {index} links to missing node {link} ({count} nodes)"));
        }
    }

    let width = usize::try_from(end.saturating_sub(start)).unwrap_or(usize::MAX);
    let has_text = !node.text.is_empty() || node.kind == NodeKind::ImportString;
    if has_text && node.text.len() != width {
        return Err(format!(
            "node {index} text is {} bytes but its range spans {width}",
            node.text.len()
        ));
    }
    return Ok(());
}

/// Check that a qualifier, when present, is itself a reference.
fn validate_qualifier(index: usize, node: &NodeData, nodes: &[NodeData]) -> Result<(), String> {
    let Some(qualifier) = node.qualifier else {
        return Ok(());
    };
    if qualifier == index {
        return Err(format!("node {index} qualifies itself"));
    }
    let kind = nodes.get(qualifier).map_or(NodeKind::Other, |q| return q.kind);
    if !matches!(kind, NodeKind::Reference | NodeKind::TypeReference) {
        return Err(format!("node {index} has a qualifier of kind {kind:?}"));
    }
    return Ok(());
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test assertions")]
mod tests {
    use super::*;

    fn parse(value: &serde_json::Value) -> Result<SyntaxDump, Error> {
        return SyntaxDump::parse(&value.to_string(), Path::new("test.json"));
    }

    #[test]
    fn loads_minimal_dump() {
        let dump = parse(&serde_json::json!({
            "file": "main.go",
            "nodes": [
                { "kind": "other", "range": [0, 5], "children": [1] },
                { "kind": "import_string", "range": [0, 5], "text": "\"fmt\"", "target": 0 }
            ]
        }))
        .unwrap();

        assert_eq!(dump.node_count(), 2);
        let root = dump.root();
        assert_eq!(root.kind(), NodeKind::Other);
        let children = root.children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].text(), "\"fmt\"");
        assert!(dump.resolve(children[0]).is_resolved());
    }

    #[test]
    fn rejects_dangling_child() {
        let err = parse(&serde_json::json!({
            "file": "main.go",
            "nodes": [{ "kind": "other", "range": [0, 1], "children": [4] }]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("missing node 4"), "{err}");
    }

    #[test]
    fn rejects_shared_child() {
        let err = parse(&serde_json::json!({
            "file": "main.go",
            "nodes": [
                { "kind": "other", "range": [0, 4], "children": [1, 2] },
                { "kind": "other", "range": [0, 2], "children": [3] },
                { "kind": "other", "range": [2, 4], "children": [3] },
                { "kind": "other", "range": [1, 2] }
            ]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("more than one parent"), "{err}");
    }

    #[test]
    fn rejects_cycle_through_root() {
        let err = parse(&serde_json::json!({
            "file": "main.go",
            "nodes": [
                { "kind": "other", "range": [0, 4], "children": [1] },
                { "kind": "other", "range": [0, 2], "children": [0] }
            ]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("root as a child"), "{err}");
    }

    #[test]
    fn rejects_text_range_mismatch() {
        let err = parse(&serde_json::json!({
            "file": "main.go",
            "nodes": [{ "kind": "import_string", "range": [0, 9], "text": "\"fmt\"" }]
        }))
        .unwrap_err();
        assert!(matches!(err, Error::DumpCorrupt { .. }), "{err}");
    }

    #[test]
    fn rejects_non_reference_qualifier() {
        let err = parse(&serde_json::json!({
            "file": "main.go",
            "nodes": [
                { "kind": "other", "range": [0, 5], "children": [1, 2] },
                { "kind": "other", "range": [0, 1] },
                { "kind": "reference", "range": [0, 5], "qualifier": 1 }
            ]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("qualifier of kind"), "{err}");
    }

    #[test]
    fn read_reports_missing_file() {
        let err = SyntaxDump::read(Path::new("does/not/exist.json")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }
}
