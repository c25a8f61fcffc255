//! The classified span type produced by tokenization.
//!
//! A [`Token`] describes one span of the source text: where it starts, how
//! long it is, what category it belongs to, and which smaller spans nest
//! inside it. Tokens are pure data. They are created by the tree builder,
//! never mutated afterwards, and owned exclusively by their parent.
//!
//! Two invariants hold for every tree the builder returns: each child's
//! span lies fully inside its parent's span, and siblings are ordered by
//! ascending offset without overlap. Text not covered by any child is a
//! gap between siblings, recoverable from the offsets.

use serde::Serialize;

/// One classified span of text with its nested sub-spans.
///
/// Field order matters: the derived `Ord` compares `(offset, length)`
/// first, which gives tokens a deterministic ordering for tests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Token {
    offset: usize,
    length: usize,
    kind: String,
    value: String,
    children: Vec<Token>,
}

/// Category tag of the synthetic token wrapping the whole input.
pub const ROOT_KIND: &str = "root";

impl Token {
    pub(crate) fn new(
        offset: usize,
        length: usize,
        kind: impl Into<String>,
        value: impl Into<String>,
        children: Vec<Token>,
    ) -> Self {
        Self {
            offset,
            length,
            kind: kind.into(),
            value: value.into(),
            children,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn end_offset(&self) -> usize {
        self.offset + self.length
    }

    /// Category tag, e.g. `"keyword"` or `"string"`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The source slice this token covers, denormalized for convenience.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn children(&self) -> &[Token] {
        &self.children
    }

    /// Consumes the token, yielding its direct children.
    pub fn into_children(self) -> Vec<Token> {
        self.children
    }

    /// Pre-order listing of all descendants, excluding `self`.
    pub fn flatten(&self) -> Vec<Token> {
        let mut out = Vec::new();
        for child in &self.children {
            out.push(child.clone());
            out.extend(child.flatten());
        }
        out
    }

    /// Depth-first search for the first descendant of the given kind.
    pub fn find(&self, kind: &str) -> Option<&Token> {
        for child in &self.children {
            if child.kind == kind {
                return Some(child);
            }
            if let Some(found) = child.find(kind) {
                return Some(found);
            }
        }
        None
    }
}
