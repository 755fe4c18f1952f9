//! Maps failed resolutions to diagnostics: message, severity, and anchor range.

use std::ops::Range;

use crate::types::{Diagnostic, FetchPackageFix, NodeKind, Severity};

/// Characters accepted as import literal delimiters.
const QUOTES: [char; 3] = ['"', '\'', '`'];

/// Accumulation sink for one analysis pass.
#[derive(Debug, Default)]
pub struct Reporter {
    /// Diagnostics in the order they were reported.
    diagnostics: Vec<Diagnostic>,
}

impl Reporter {
    /// Consume the reporter and hand back everything it collected.
    pub fn finish(self) -> Vec<Diagnostic> {
        return self.diagnostics;
    }

    /// Report an import string whose path does not resolve.
    ///
    /// Blank paths are anchored at the whole literal with generic severity and
    /// never offer a fix. Anything else is anchored between the quotes and
    /// offers a fetch when `tool_available` is set.
    pub fn unresolved_import(&mut self, literal: Range<u32>, text: &str, tool_available: bool) {
        let path = unquote(text);
        let message = format!("Unresolved import '{path}'");

        if path.trim().is_empty() {
            self.diagnostics.push(Diagnostic {
                fix: None,
                message,
                range: literal,
                severity: Severity::Error,
            });
            return;
        }

        let fix = tool_available.then(|| {
            return FetchPackageFix {
                package: path.to_string(),
            };
        });
        self.diagnostics.push(Diagnostic {
            fix,
            message,
            range: literal.start.saturating_add(edge_width(text.chars().next()))
                ..literal.end.saturating_sub(edge_width(text.chars().next_back())),
            severity: Severity::UnknownSymbol,
        });
        return;
    }

    /// Report a reference or type reference whose own name does not resolve.
    /// `identifier` is the range of the name token, `name` its text.
    pub fn unresolved_reference(&mut self, kind: NodeKind, identifier: Range<u32>, name: &str) {
        let what = if kind == NodeKind::TypeReference { "type" } else { "reference" };
        self.diagnostics.push(Diagnostic {
            fix: None,
            message: format!("Unresolved {what} '{name}'"),
            range: identifier,
            severity: Severity::UnknownSymbol,
        });
        return;
    }
}

/// Byte width of the first or last character of a literal.
fn edge_width(c: Option<char>) -> u32 {
    return c.map_or(0, |c| return u32::try_from(c.len_utf8()).unwrap_or(1));
}

/// Strip matching surrounding quotes. Text that is not quoted on both ends
/// with the same delimiter is returned unchanged.
pub fn unquote(text: &str) -> &str {
    for quote in QUOTES {
        if let Some(inner) = text.strip_prefix(quote).and_then(|rest| return rest.strip_suffix(quote)) {
            return inner;
        }
    }
    return text;
}
