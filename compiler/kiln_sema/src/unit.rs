//! Analysis units and the facts they depend on.

use kiln_ir::{DeclIndex, FuncIndex, Name, TrackedInstIndex};
use smallvec::SmallVec;

/// The granularity at which analysis is memoized and re-run.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum AnalUnit {
    /// Resolution of a declaration's type and value.
    Decl(DeclIndex),
    /// Analysis of a runtime function body.
    Func(FuncIndex),
}

/// A fact an analysis unit can read, and therefore depend on.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Dependee {
    /// The source hash of a tracked instruction.
    SrcHash(TrackedInstIndex),
    /// The resolved value of a declaration.
    DeclVal(DeclIndex),
    /// The type of a pointer to a declaration (its type, alignment, section).
    DeclRef(DeclIndex),
    /// The resolved inferred error set of a function.
    FuncIes(FuncIndex),
    /// The full member list of a namespace, keyed by its declaring instruction.
    Namespace(TrackedInstIndex),
    /// Whether a namespace has a member with this name.
    NamespaceName(TrackedInstIndex, Name),
}

impl AnalUnit {
    /// Facts about this unit's result that other units depend on.
    pub fn result_facts(self) -> SmallVec<[Dependee; 2]> {
        match self {
            AnalUnit::Decl(decl) => {
                SmallVec::from_buf([Dependee::DeclVal(decl), Dependee::DeclRef(decl)])
            }
            AnalUnit::Func(func) => {
                let mut facts = SmallVec::new();
                facts.push(Dependee::FuncIes(func));
                facts
            }
        }
    }

    pub fn as_decl(self) -> Option<DeclIndex> {
        match self {
            AnalUnit::Decl(decl) => Some(decl),
            AnalUnit::Func(_) => None,
        }
    }
}
