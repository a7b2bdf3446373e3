//! Mapping instructions of a file's previous IR to its new IR.
//!
//! Only namespace-declaring instructions and declarations are mapped.
//! Named members correlate by name; unnamed tests, `comptime` blocks and
//! `usingnamespace` declarations correlate by their order among members of
//! the same kind. Namespaces nested in a matched declaration pair up in
//! discovery order.

use kiln_ir::{DeclName, InstIndex, LoweredIr};
use rustc_hash::FxHashMap;

/// Correlate `old` with `new`, starting from the two main structs.
#[tracing::instrument(level = "debug", skip_all, fields(old = old.inst_count(), new = new.inst_count()))]
pub fn map_old_ir_to_new(old: &LoweredIr, new: &LoweredIr) -> FxHashMap<InstIndex, InstIndex> {
    let mut map = FxHashMap::default();
    let mut stack = vec![(InstIndex::MAIN_STRUCT, InstIndex::MAIN_STRUCT)];
    while let Some((old_ns, new_ns)) = stack.pop() {
        map.insert(old_ns, new_ns);
        let (Some(old_container), Some(new_container)) =
            (old.container(old_ns), new.container(new_ns))
        else {
            continue;
        };

        let mut members = NewMembers::default();
        for decl in new_container.decls() {
            if let Some(view) = new.declaration(decl) {
                members.add(new, view.name, decl);
            }
        }

        let mut cursor = UnnamedCursor::default();
        for old_decl in old_container.decls() {
            let Some(view) = old.declaration(old_decl) else {
                continue;
            };
            let Some(new_decl) = members.find(old, view.name, &mut cursor) else {
                continue;
            };
            map.insert(old_decl, new_decl);
            let old_nested = old.find_decls(old_decl);
            let new_nested = new.find_decls(new_decl);
            stack.extend(old_nested.into_iter().zip(new_nested));
        }
    }
    tracing::debug!(mapped = map.len(), "correlated");
    map
}

/// Members of a new namespace, grouped by how they correlate.
#[derive(Default)]
struct NewMembers<'a> {
    named: FxHashMap<&'a str, InstIndex>,
    named_tests: FxHashMap<&'a str, InstIndex>,
    unnamed_tests: Vec<InstIndex>,
    comptimes: Vec<InstIndex>,
    usingnamespaces: Vec<InstIndex>,
}

#[derive(Default)]
struct UnnamedCursor {
    tests: usize,
    comptimes: usize,
    usingnamespaces: usize,
}

impl<'a> NewMembers<'a> {
    fn add(&mut self, ir: &'a LoweredIr, name: DeclName, decl: InstIndex) {
        match name {
            DeclName::Named(s) => {
                self.named.entry(ir.string(s)).or_insert(decl);
            }
            DeclName::NamedTest(s) => {
                self.named_tests.entry(ir.string(s)).or_insert(decl);
            }
            DeclName::UnnamedTest => self.unnamed_tests.push(decl),
            DeclName::Comptime => self.comptimes.push(decl),
            DeclName::Usingnamespace => self.usingnamespaces.push(decl),
        }
    }

    fn find(&self, old: &LoweredIr, name: DeclName, cursor: &mut UnnamedCursor) -> Option<InstIndex> {
        fn nth(list: &[InstIndex], position: &mut usize) -> Option<InstIndex> {
            let found = list.get(*position).copied();
            *position += 1;
            found
        }
        match name {
            DeclName::Named(s) => self.named.get(old.string(s)).copied(),
            DeclName::NamedTest(s) => self.named_tests.get(old.string(s)).copied(),
            DeclName::UnnamedTest => nth(&self.unnamed_tests, &mut cursor.tests),
            DeclName::Comptime => nth(&self.comptimes, &mut cursor.comptimes),
            DeclName::Usingnamespace => nth(&self.usingnamespaces, &mut cursor.usingnamespaces),
        }
    }
}
