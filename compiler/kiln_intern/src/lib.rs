//! Intern table for comptime types and values.
//!
//! Every type and value produced by analysis is interned once in an
//! [`InternPool`] and referred to by an 8-byte [`Index`]. Structurally equal
//! keys share an index, so value equality is index equality.
//!
//! Container types (struct, union, enum, opaque) are the exception: their
//! identity is the source instruction that declares them, not their
//! contents. They are created in two phases through
//! [`InternPool::get_or_begin_type`] so a container can refer to itself
//! before its namespace is populated, and they can be removed when their
//! declaring source changes incompatibly. Slots carry a generation so a
//! removed index is detected instead of aliasing a newer entry.

mod index;
mod key;
mod pool;

pub use index::Index;
pub use key::{
    ContainerKey, DeclPtr, ErrorSet, ErrorValue, FuncType, FuncValue, IntType, IntValue, Key,
    PtrType, Signedness, SimpleType, SimpleValue,
};
pub use pool::{Container, Field, FieldsState, GetOrBegin, InternError, InternPool, WipType};
