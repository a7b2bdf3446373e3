//! Dense `u32` handles into the compiler's arenas.
//!
//! Handles are plain indices: they are only meaningful for the table that
//! issued them and are never reused for a different entity while that entity
//! is alive.

use std::fmt;

macro_rules! define_index {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn new(raw: u32) -> Self {
                $name(raw)
            }

            /// Handle for the `index`-th element of a `Vec`-backed arena.
            ///
            /// # Panics
            /// Panics if the arena grew past `u32::MAX` entries.
            #[inline]
            pub fn from_usize(index: usize) -> Self {
                match u32::try_from(index) {
                    Ok(raw) => $name(raw),
                    Err(_) => panic!(concat!(stringify!($name), " overflow: {}"), index),
                }
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        crate::static_assert_size!($name, 4);
    };
}

define_index!(
    /// A source file registered with the compilation.
    FileIndex,
    "file#"
);
define_index!(
    /// A build module (a named root directory of source files).
    ModuleIndex,
    "module#"
);
define_index!(
    /// A declaration: the unit of named, memoized comptime analysis.
    DeclIndex,
    "decl#"
);
define_index!(
    /// The member table of a container type.
    NamespaceIndex,
    "ns#"
);
define_index!(
    /// A runtime function whose body is analyzed separately from its decl.
    FuncIndex,
    "func#"
);
define_index!(
    /// A stable handle to a lowered instruction that survives edits.
    TrackedInstIndex,
    "inst#"
);
define_index!(
    /// An export record.
    ExportIndex,
    "export#"
);
