//! Lazily resolved source locations.

use kiln_ir::{FileIndex, TrackedInstIndex};

/// What a location is relative to.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum SrcBase {
    /// A tracked instruction, usually the declaration being analyzed.
    /// Survives edits that move the declaration.
    Inst(TrackedInstIndex),
    /// A whole file, for errors reported before any instruction exists.
    File(FileIndex),
}

/// Where within the base the location points.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum SrcOffset {
    /// The base's own syntax node.
    Whole,
    /// A syntax node relative to the base's node.
    NodeOffset(i32),
    /// An absolute byte offset in the base's file.
    Byte(u32),
}

/// A source location that is resolved only when an error is rendered.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct LazySrcLoc {
    pub base: SrcBase,
    pub offset: SrcOffset,
}

impl LazySrcLoc {
    pub fn inst(base: TrackedInstIndex) -> Self {
        LazySrcLoc {
            base: SrcBase::Inst(base),
            offset: SrcOffset::Whole,
        }
    }

    /// The node `absolute_node`, expressed relative to `base_node`.
    pub fn node(base: TrackedInstIndex, base_node: u32, absolute_node: u32) -> Self {
        let delta = i64::from(absolute_node) - i64::from(base_node);
        LazySrcLoc {
            base: SrcBase::Inst(base),
            offset: SrcOffset::NodeOffset(i32::try_from(delta).unwrap_or(0)),
        }
    }

    pub fn file_byte(file: FileIndex, byte: u32) -> Self {
        LazySrcLoc {
            base: SrcBase::File(file),
            offset: SrcOffset::Byte(byte),
        }
    }

    pub fn file(file: FileIndex) -> Self {
        LazySrcLoc {
            base: SrcBase::File(file),
            offset: SrcOffset::Whole,
        }
    }

    /// Apply a node offset to the base's node index.
    pub fn node_index(&self, base_node: u32) -> Option<u32> {
        match self.offset {
            SrcOffset::Whole => Some(base_node),
            SrcOffset::NodeOffset(delta) => {
                u32::try_from(i64::from(base_node) + i64::from(delta)).ok()
            }
            SrcOffset::Byte(_) => None,
        }
    }
}
