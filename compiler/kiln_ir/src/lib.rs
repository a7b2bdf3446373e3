//! Kiln IR - lowered instruction format and shared identifiers.
//!
//! This crate holds the data every later stage agrees on:
//! - `Name` and `StringInterner` for interned identifiers
//! - `Span` for byte ranges in source files
//! - Dense index newtypes (`FileIndex`, `DeclIndex`, ...)
//! - `ContentHash` for source and field hashes
//! - `LoweredIr`, the flat per-file instruction stream produced by lowering
//! - `SyntaxTree`, the node table used to resolve lazy source locations
//! - The on-disk codec for cached lowered IR
//!
//! # Design Philosophy
//!
//! - **Intern Everything**: strings become `Name(u32)`
//! - **Flatten Everything**: instructions live in parallel arrays addressed by
//!   `InstIndex(u32)`, variable-length payloads live in `extra`

/// Compile-time assertion that a type has a specific size.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

pub mod cache;
mod hash;
mod ids;
mod interner;
pub mod lowered;
mod name;
mod span;
mod tree;

pub use cache::{CacheHeader, FileStat, IrCacheError};
pub use hash::{ContentHash, SourceHasher};
pub use ids::{
    DeclIndex, ExportIndex, FileIndex, FuncIndex, ModuleIndex, NamespaceIndex, TrackedInstIndex,
};
pub use interner::{InternError, SharedInterner, StringInterner};
pub use lowered::{
    ContainerKind, DeclName, Declaration, InstData, InstIndex, InstTag, IrBuilder, IrCompileError,
    Linkage, LoweredIr, NullTerminatedString, Primitive,
};
pub use name::Name;
pub use span::Span;
pub use tree::SyntaxTree;
