//! The unresolved-reference pass: walks one file's tree, asks the resolver
//! about every reference-bearing node, and reports the ones that fail.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::reporter::Reporter;
use crate::syntax::{Resolver, SyntaxNode, ToolLocator};
use crate::types::{Diagnostic, NodeKind};

/// State of one pass over one file. Never shared between passes.
struct Inspection<'a, N, R> {
    /// File under analysis, used for the toolchain lookup.
    file: &'a Path,
    /// Diagnostic sink.
    reporter: Reporter,
    /// Resolution outcome of every node asked about so far in this pass.
    resolved: HashMap<N, bool>,
    /// Answers resolution queries.
    resolver: &'a R,
    /// Whether a toolchain is configured for `file`; looked up on first need.
    tool_available: Option<bool>,
    /// Toolchain lookup.
    tools: &'a dyn ToolLocator,
    /// Nodes already entered, so nothing is diagnosed twice.
    visited: HashSet<N>,
}

/// Traversal step: a node is entered before its children and left after them.
enum Step<N> {
    /// Schedule the node's children.
    Enter(N),
    /// All children are done; judge the node itself.
    Leave(N),
}

impl<N: SyntaxNode, R: Resolver<N>> Inspection<'_, N, R> {
    /// Judge an import string once its resolution is known.
    fn check_import(&mut self, node: N) {
        if node.text().chars().count() < 2 {
            return;
        }
        if self.is_resolved(node) {
            return;
        }
        let tool_available = self.tool_available();
        self.reporter.unresolved_import(node.range(), node.text(), tool_available);
        return;
    }

    /// Judge a reference or type reference after its qualifier chain.
    fn check_reference(&mut self, node: N) {
        if let Some(qualifier) = node.qualifier()
            && !self.is_resolved(qualifier)
        {
            tracing::debug!(range = ?node.range(), "unresolved qualifier, skipping dependent reference");
            return;
        }
        if self.is_resolved(node) {
            return;
        }
        let (range, name) = match node.identifier() {
            None => (node.range(), node.text().to_string()),
            Some(id) => (id.range(), id.text().to_string()),
        };
        self.reporter.unresolved_reference(node.kind(), range, &name);
        return;
    }

    /// Resolution outcome of `node`, asking the resolver at most once per pass.
    fn is_resolved(&mut self, node: N) -> bool {
        if let Some(&known) = self.resolved.get(&node) {
            return known;
        }
        let known = self.resolver.resolve(node).is_resolved();
        self.resolved.insert(node, known);
        return known;
    }

    /// Walk the tree from `root`, children before parents.
    ///
    /// A qualifier that the tree does not list among its reference's children
    /// is still scheduled ahead of the reference, so its outcome is always
    /// known before the dependent reference is judged.
    fn run(&mut self, root: N) {
        let mut stack = vec![Step::Enter(root)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(node) => {
                    if !self.visited.insert(node) {
                        continue;
                    }
                    stack.push(Step::Leave(node));
                    let children = scheduled_children(node);
                    stack.extend(children.into_iter().rev().map(Step::Enter));
                },
                Step::Leave(node) => match node.kind() {
                    NodeKind::ImportString => self.check_import(node),
                    NodeKind::Other => {},
                    NodeKind::Reference | NodeKind::TypeReference => self.check_reference(node),
                },
            }
        }
        return;
    }

    /// Whether the file has a toolchain to fetch packages with.
    fn tool_available(&mut self) -> bool {
        if let Some(known) = self.tool_available {
            return known;
        }
        let known = self.tools.tool_home(self.file).is_some();
        tracing::debug!(file = %self.file.display(), tool_available = known, "toolchain lookup");
        self.tool_available = Some(known);
        return known;
    }
}

/// Run the unresolved-reference pass over one file.
///
/// `file` is the project-relative path of the analyzed source; it decides
/// whether import diagnostics offer a package fetch.
pub fn inspect<N, R>(root: N, file: &Path, resolver: &R, tools: &dyn ToolLocator) -> Vec<Diagnostic>
where
    N: SyntaxNode,
    R: Resolver<N>,
{
    let mut inspection = Inspection {
        file,
        reporter: Reporter::default(),
        resolved: HashMap::new(),
        resolver,
        tool_available: None,
        tools,
        visited: HashSet::new(),
    };
    inspection.run(root);
    let diagnostics = inspection.reporter.finish();
    tracing::debug!(file = %file.display(), count = diagnostics.len(), "inspection finished");
    return diagnostics;
}

/// Children to visit for `node`: its structural children, plus a qualifier
/// the tree left out of them, placed first.
fn scheduled_children<N: SyntaxNode>(node: N) -> Vec<N> {
    let mut children = node.children();
    if let Some(qualifier) = node.qualifier()
        && !children.contains(&qualifier)
    {
        children.insert(0, qualifier);
    }
    return children;
}
