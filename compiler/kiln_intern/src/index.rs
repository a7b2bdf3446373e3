//! Generation-tagged handles into the pool.

use std::fmt;

/// Handle to an interned type or value.
///
/// `slot` addresses the pool's storage; `generation` changes every time the
/// slot is freed, so handles to removed entries never alias new ones.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Index {
    slot: u32,
    generation: u32,
}

impl Index {
    pub const VOID_TYPE: Index = Index::fixed(0);
    pub const BOOL_TYPE: Index = Index::fixed(1);
    pub const TYPE_TYPE: Index = Index::fixed(2);
    pub const COMPTIME_INT_TYPE: Index = Index::fixed(3);
    pub const NORETURN_TYPE: Index = Index::fixed(4);
    pub const ANYERROR_TYPE: Index = Index::fixed(5);
    pub const U8_TYPE: Index = Index::fixed(6);
    pub const I32_TYPE: Index = Index::fixed(7);
    pub const USIZE_TYPE: Index = Index::fixed(8);
    pub const VOID_VALUE: Index = Index::fixed(9);
    pub const BOOL_TRUE: Index = Index::fixed(10);
    pub const BOOL_FALSE: Index = Index::fixed(11);
    pub const EMPTY_ERROR_SET: Index = Index::fixed(12);

    /// Number of pre-interned entries.
    pub(crate) const STATIC_LEN: u32 = 13;

    const fn fixed(slot: u32) -> Self {
        Index {
            slot,
            generation: 0,
        }
    }

    pub(crate) const fn new(slot: u32, generation: u32) -> Self {
        Index { slot, generation }
    }

    #[inline]
    pub const fn slot(self) -> u32 {
        self.slot
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// True for entries that exist in every pool and are never removed.
    pub const fn is_static(self) -> bool {
        self.slot < Self::STATIC_LEN && self.generation == 0
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "Index({})", self.slot)
        } else {
            write!(f, "Index({}@{})", self.slot, self.generation)
        }
    }
}

kiln_ir::static_assert_size!(Index, 8);
