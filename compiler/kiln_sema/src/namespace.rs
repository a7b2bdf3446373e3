//! Namespaces: the member lists of file roots and container types.

use indexmap::IndexMap;
use kiln_ir::{DeclIndex, FileIndex, Name, NamespaceIndex, TrackedInstIndex};
use rustc_hash::FxBuildHasher;

#[derive(Clone, Debug)]
pub struct Namespace {
    pub parent: Option<NamespaceIndex>,
    pub file: FileIndex,
    pub owner_decl: DeclIndex,
    /// The container instruction declaring this namespace.
    pub zir_index: TrackedInstIndex,
    /// Members in source order, unique by name. Unnamed members carry
    /// synthesized names (`comptime`, `test_0`, ...).
    pub decls: IndexMap<Name, DeclIndex, FxBuildHasher>,
    /// `usingnamespace` members and whether they are `pub`.
    pub usingnamespace: IndexMap<DeclIndex, bool, FxBuildHasher>,
}

impl Namespace {
    pub fn new(
        parent: Option<NamespaceIndex>,
        file: FileIndex,
        owner_decl: DeclIndex,
        zir_index: TrackedInstIndex,
    ) -> Self {
        Namespace {
            parent,
            file,
            owner_decl,
            zir_index,
            decls: IndexMap::default(),
            usingnamespace: IndexMap::default(),
        }
    }

    pub fn get(&self, name: Name) -> Option<DeclIndex> {
        self.decls.get(&name).copied()
    }
}
