//! Structural keys for interned entries.

use crate::Index;
use kiln_ir::{ContainerKind, DeclIndex, FuncIndex, Name, TrackedInstIndex};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum SimpleType {
    Void,
    Bool,
    Type,
    ComptimeInt,
    Noreturn,
    AnyError,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum SimpleValue {
    Void,
    True,
    False,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Signedness {
    Signed,
    Unsigned,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct IntType {
    pub signedness: Signedness,
    pub bits: u16,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PtrType {
    pub child: Index,
    pub is_const: bool,
}

/// Identity of a container type: the instruction that declares it.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ContainerKey {
    pub kind: ContainerKind,
    pub zir_index: TrackedInstIndex,
}

/// An error set; `names` is sorted and deduplicated.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct ErrorSet {
    names: Box<[Name]>,
}

impl ErrorSet {
    pub fn new(names: impl IntoIterator<Item = Name>) -> Self {
        let mut names: Vec<Name> = names.into_iter().collect();
        names.sort_unstable();
        names.dedup();
        ErrorSet {
            names: names.into_boxed_slice(),
        }
    }

    pub fn names(&self) -> &[Name] {
        &self.names
    }

    pub fn contains(&self, name: Name) -> bool {
        self.names.binary_search(&name).is_ok()
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct FuncType {
    pub params: Box<[Index]>,
    pub ret: Index,
    /// `!T`: the error set is inferred from the body.
    pub inferred_error_set: bool,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct IntValue {
    pub ty: Index,
    pub value: i64,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ErrorValue {
    pub ty: Index,
    pub name: Name,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct FuncValue {
    pub ty: Index,
    pub func: FuncIndex,
}

/// `&decl`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct DeclPtr {
    pub ty: Index,
    pub decl: DeclIndex,
}

/// Everything that can be interned.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Key {
    SimpleType(SimpleType),
    IntType(IntType),
    PtrType(PtrType),
    /// Only produced by lookups; created via `get_or_begin_type`.
    ContainerType(ContainerKey),
    ErrorSetType(ErrorSet),
    ErrorUnionType { error_set: Index, payload: Index },
    FuncType(FuncType),
    SimpleValue(SimpleValue),
    Int(IntValue),
    Err(ErrorValue),
    Func(FuncValue),
    DeclPtr(DeclPtr),
}

impl Key {
    /// True if the key describes a type rather than a value.
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            Key::SimpleType(_)
                | Key::IntType(_)
                | Key::PtrType(_)
                | Key::ContainerType(_)
                | Key::ErrorSetType(_)
                | Key::ErrorUnionType { .. }
                | Key::FuncType(_)
        )
    }

    /// The type of a value key. Types have type `type`.
    pub fn type_of(&self) -> Index {
        match self {
            Key::SimpleValue(SimpleValue::Void) => Index::VOID_TYPE,
            Key::SimpleValue(SimpleValue::True | SimpleValue::False) => Index::BOOL_TYPE,
            Key::Int(int) => int.ty,
            Key::Err(err) => err.ty,
            Key::Func(func) => func.ty,
            Key::DeclPtr(ptr) => ptr.ty,
            _ => Index::TYPE_TYPE,
        }
    }
}
