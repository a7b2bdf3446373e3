//! Declaration records.

use kiln_intern::Index;
use kiln_ir::{ContentHash, FileIndex, Name, NamespaceIndex, TrackedInstIndex};
use smallvec::SmallVec;

/// What kind of source construct a declaration came from.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DeclKind {
    Named,
    Test,
    Comptime,
    Usingnamespace,
    /// Created by analysis to own a comptime value; has no source.
    Anon,
    /// The implicit struct of a whole file.
    FileRoot,
}

/// Analysis progress of a declaration.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum DeclAnalysis {
    #[default]
    Unreferenced,
    /// On the analysis stack. Never observed outside of it.
    InProgress,
    /// The declaring file failed to load or lower.
    FileFailure,
    /// A dependency failed; no diagnostic of its own.
    DependencyFailure,
    /// Analysis reported an error.
    SemaFailure,
    /// The backend rejected the declaration.
    CodegenFailure,
    Complete,
}

impl DeclAnalysis {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            DeclAnalysis::FileFailure
                | DeclAnalysis::DependencyFailure
                | DeclAnalysis::SemaFailure
                | DeclAnalysis::CodegenFailure
        )
    }
}

#[derive(Clone, Debug)]
pub struct Decl {
    pub name: Name,
    /// Dotted path from the file root.
    pub fqn: Name,
    pub kind: DeclKind,
    pub file: FileIndex,
    /// `None` only for file roots.
    pub src_namespace: Option<NamespaceIndex>,
    /// The `Declaration` instruction, or the main struct for file roots.
    /// `None` for anonymous decls.
    pub zir_decl_index: Option<TrackedInstIndex>,
    pub ty: Option<Index>,
    pub val: Option<Index>,
    /// Destroying this decl destroys its value (an owned type or function).
    pub owns_tv: bool,
    pub analysis: DeclAnalysis,
    pub is_pub: bool,
    pub is_exported: bool,
    /// 0 means natural alignment.
    pub alignment: u32,
    pub link_section: Option<Name>,
    /// Source hash at the last analysis; a change means owned types must be
    /// recreated rather than kept.
    pub last_src_hash: Option<ContentHash>,
    /// Container types created by the last analysis.
    pub owned_types: SmallVec<[Index; 1]>,
    /// Dropped from its namespace; never analyzed again.
    pub deleted: bool,
}

impl Decl {
    pub fn new(name: Name, fqn: Name, kind: DeclKind, file: FileIndex) -> Self {
        Decl {
            name,
            fqn,
            kind,
            file,
            src_namespace: None,
            zir_decl_index: None,
            ty: None,
            val: None,
            owns_tv: false,
            analysis: DeclAnalysis::Unreferenced,
            is_pub: false,
            is_exported: false,
            alignment: 0,
            link_section: None,
            last_src_hash: None,
            owned_types: SmallVec::new(),
            deleted: false,
        }
    }

    pub fn has_tv(&self) -> bool {
        self.val.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.kind == DeclKind::FileRoot
    }
}
