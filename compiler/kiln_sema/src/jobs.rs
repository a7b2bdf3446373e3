//! Work queued by analysis and drained after the outdated set.

use kiln_ir::{DeclIndex, FuncIndex};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Job {
    /// Analyze a declaration that must be analyzed even if unreferenced
    /// (exports, `comptime` blocks, `usingnamespace`, selected tests).
    AnalyzeDecl(DeclIndex),
    /// Analyze a runtime function body.
    AnalyzeFunc(FuncIndex),
    /// Hand a completed declaration to the backend.
    CodegenDecl(DeclIndex),
    /// Hand an analyzed function body to the backend.
    CodegenFunc(FuncIndex),
}
