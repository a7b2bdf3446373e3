//! Syntax tree surrogate used to resolve lazy source locations.
//!
//! The core never inspects syntax. It only needs to turn a node index stored
//! in lowered IR back into a byte span, so the tree is a flat node table.

use crate::Span;

/// Flat table of syntax node spans produced by parsing one file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyntaxTree {
    nodes: Vec<Span>,
}

impl SyntaxTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node, returning its index.
    pub fn push(&mut self, span: Span) -> u32 {
        let index = u32::try_from(self.nodes.len()).unwrap_or(u32::MAX);
        self.nodes.push(span);
        index
    }

    /// Widen an existing node, e.g. once a declaration's end is known.
    pub fn set_span(&mut self, node: u32, span: Span) {
        if let Some(slot) = self.nodes.get_mut(node as usize) {
            *slot = span;
        }
    }

    pub fn node_span(&self, node: u32) -> Option<Span> {
        self.nodes.get(node as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
