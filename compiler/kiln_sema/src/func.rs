//! Runtime function records.

use kiln_intern::Index;
use kiln_ir::{DeclIndex, TrackedInstIndex};

/// Body analysis progress of a function.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum FuncAnalysis {
    #[default]
    None,
    Queued,
    InProgress,
    SemaFailure,
    DependencyFailure,
    CodegenFailure,
    Success,
}

/// Functions are deduplicated by owner, body and type, so re-analyzing an
/// unchanged owner yields the same function.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct FuncKey {
    pub owner_decl: DeclIndex,
    pub zir_body_inst: TrackedInstIndex,
    pub ty: Index,
}

#[derive(Clone, Debug)]
pub struct Func {
    pub owner_decl: DeclIndex,
    pub zir_body_inst: TrackedInstIndex,
    pub ty: Index,
    /// The interned function value.
    pub value: Index,
    pub analysis: FuncAnalysis,
    pub has_inferred_error_set: bool,
    /// The inferred error set type once the body has been analyzed.
    pub resolved_error_set: Option<Index>,
    /// Orphaned: its owner no longer refers to it.
    pub deleted: bool,
}
