//! The semantic analyzer interface.
//!
//! The incremental core decides *when* a unit is analyzed; an `Analyzer`
//! decides *what* it means. Every fact the analyzer reads must go through
//! the [`Sema`] handle so the dependency is recorded.

use crate::errors::AnalysisError;
use crate::sema::Sema;
use kiln_intern::{Field, Index};
use kiln_ir::{DeclIndex, FuncIndex, Name};

/// The result of analyzing one declaration.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct DeclValue {
    pub ty: Index,
    pub val: Index,
    pub alignment: u32,
    pub link_section: Option<Name>,
}

impl DeclValue {
    pub fn new(ty: Index, val: Index) -> Self {
        DeclValue {
            ty,
            val,
            alignment: 0,
            link_section: None,
        }
    }
}

/// The result of analyzing a function body.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct FuncBody {
    /// Errors the body can return; becomes the inferred error set.
    pub errors: Vec<Name>,
}

pub trait Analyzer: Send + Sync {
    /// Resolve the type and value of a declaration with source.
    fn analyze_decl(&self, sema: &mut Sema<'_, '_>, decl: DeclIndex)
        -> Result<DeclValue, AnalysisError>;

    fn analyze_func_body(
        &self,
        sema: &mut Sema<'_, '_>,
        func: FuncIndex,
    ) -> Result<FuncBody, AnalysisError>;

    /// Resolve the field types of a container type.
    fn resolve_container_fields(
        &self,
        sema: &mut Sema<'_, '_>,
        ty: Index,
    ) -> Result<Vec<Field>, AnalysisError>;
}
