//! Turning a file's IR change into outdated facts.
//!
//! Planning needs only the two IRs and the file's tracked instructions, so
//! it runs on worker threads. Applying a plan repoints the tracked
//! instructions and marks the facts under the compilation lock.

use crate::correlate::map_old_ir_to_new;
use crate::db::IncrementalDb;
use crate::outdated::MarkedPo;
use crate::unit::Dependee;
use kiln_ir::{DeclName, FileIndex, InstIndex, LoweredIr, StringInterner, TrackedInstIndex};
use rustc_hash::FxHashSet;

/// Repointing and marking for one changed file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ZirRefsPlan {
    pub file: FileIndex,
    pub repoint: Vec<(TrackedInstIndex, Option<InstIndex>)>,
    pub marks: Vec<Dependee>,
}

/// The members of a namespace, as far as lookups and scanning can tell.
#[derive(Debug, Default, PartialEq, Eq)]
struct MemberKeys<'a> {
    named: FxHashSet<&'a str>,
    tests: FxHashSet<&'a str>,
    unnamed_tests: usize,
    comptimes: usize,
    usingnamespaces: usize,
}

impl<'a> MemberKeys<'a> {
    fn of(ir: &'a LoweredIr, namespace: InstIndex) -> Self {
        let mut keys = MemberKeys::default();
        let Some(container) = ir.container(namespace) else {
            return keys;
        };
        for decl in container.decls() {
            let Some(view) = ir.declaration(decl) else {
                continue;
            };
            match view.name {
                DeclName::Named(s) => {
                    keys.named.insert(ir.string(s));
                }
                DeclName::NamedTest(s) => {
                    keys.tests.insert(ir.string(s));
                }
                DeclName::UnnamedTest => keys.unnamed_tests += 1,
                DeclName::Comptime => keys.comptimes += 1,
                DeclName::Usingnamespace => keys.usingnamespaces += 1,
            }
        }
        keys
    }
}

/// Work out what changed between `old` and `new` for every tracked
/// instruction of `file`.
#[tracing::instrument(level = "debug", skip_all, fields(file = ?file))]
pub(crate) fn plan_zir_refs(
    file: FileIndex,
    tracked: &[(TrackedInstIndex, InstIndex)],
    old: &LoweredIr,
    new: &LoweredIr,
    names: &StringInterner,
) -> ZirRefsPlan {
    let map = map_old_ir_to_new(old, new);
    let mut plan = ZirRefsPlan {
        file,
        repoint: Vec::new(),
        marks: Vec::new(),
    };

    for &(ti, old_inst) in tracked {
        let is_namespace = old.tag(old_inst).is_some_and(|tag| tag.is_namespace_decl());
        let Some(&new_inst) = map.get(&old_inst) else {
            tracing::debug!(?ti, ?old_inst, "tracked instruction lost");
            plan.repoint.push((ti, None));
            plan.marks.push(Dependee::SrcHash(ti));
            if is_namespace {
                let keys = MemberKeys::of(old, old_inst);
                let mut lost: Vec<&str> = keys.named.into_iter().collect();
                lost.sort_unstable();
                plan.marks.extend(
                    lost.into_iter()
                        .map(|name| Dependee::NamespaceName(ti, names.intern(name))),
                );
                plan.marks.push(Dependee::Namespace(ti));
            }
            continue;
        };
        plan.repoint.push((ti, Some(new_inst)));

        let old_hash = old.associated_src_hash(old_inst);
        let new_hash = new.associated_src_hash(new_inst);
        if old_hash.is_none() || new_hash.is_none() || old_hash != new_hash {
            plan.marks.push(Dependee::SrcHash(ti));
        }

        if !is_namespace {
            continue;
        }
        let old_keys = MemberKeys::of(old, old_inst);
        let new_keys = MemberKeys::of(new, new_inst);
        if old_keys == new_keys {
            continue;
        }
        let mut changed: Vec<&str> = old_keys
            .named
            .symmetric_difference(&new_keys.named)
            .copied()
            .collect();
        changed.sort_unstable();
        plan.marks.extend(
            changed
                .into_iter()
                .map(|name| Dependee::NamespaceName(ti, names.intern(name))),
        );
        plan.marks.push(Dependee::Namespace(ti));
    }
    tracing::debug!(
        repointed = plan.repoint.len(),
        marks = plan.marks.len(),
        "planned invalidation"
    );
    plan
}

/// Repoint the file's tracked instructions and mark the planned facts.
pub(crate) fn apply_zir_refs(db: &mut IncrementalDb, plan: &ZirRefsPlan) {
    db.tracked.repoint(plan.file, &plan.repoint);
    for &dependee in &plan.marks {
        db.mark_outdated(MarkedPo::No, dependee);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Tests can panic")]

    use super::*;
    use kiln_ir::lowered::{ContainerSpec, DeclSpec};
    use kiln_ir::{ContainerKind, ContentHash, IrBuilder};
    use pretty_assertions::assert_eq;

    /// A file of named `const` decls with the given hashes.
    fn file_ir(decls: &[(&str, u64)]) -> (LoweredIr, Vec<InstIndex>) {
        let mut b = IrBuilder::new();
        let mut insts = Vec::new();
        for &(name, hash) in decls {
            let value = b.add_int(1);
            let name = b.string(name);
            insts.push(b.add_declaration(&DeclSpec {
                name: DeclName::Named(name),
                is_pub: false,
                is_export: false,
                src_hash: ContentHash::new(hash),
                src_node: 0,
                body: &[value],
            }));
        }
        b.set_main_struct(&ContainerSpec {
            kind: ContainerKind::Struct,
            fields_hash: ContentHash::ZERO,
            src_node: 0,
            fields: &[],
            decls: &insts,
        });
        (b.finish(), insts)
    }

    #[test]
    fn only_edited_declarations_are_marked() {
        let names = StringInterner::new();
        let (old, old_insts) = file_ir(&[("a", 1), ("b", 2)]);
        let (new, new_insts) = file_ir(&[("a", 1), ("b", 20)]);
        let tracked = [
            (TrackedInstIndex::new(0), InstIndex::MAIN_STRUCT),
            (TrackedInstIndex::new(1), old_insts[0]),
            (TrackedInstIndex::new(2), old_insts[1]),
        ];

        let plan = plan_zir_refs(FileIndex::new(0), &tracked, &old, &new, &names);

        assert_eq!(plan.marks, vec![Dependee::SrcHash(TrackedInstIndex::new(2))]);
        assert_eq!(plan.repoint[1], (TrackedInstIndex::new(1), Some(new_insts[0])));
    }

    #[test]
    fn member_changes_mark_the_namespace() {
        let names = StringInterner::new();
        let (old, old_insts) = file_ir(&[("a", 1), ("gone", 2)]);
        let (new, _) = file_ir(&[("a", 1), ("added", 3)]);
        let main = TrackedInstIndex::new(0);
        let tracked = [
            (main, InstIndex::MAIN_STRUCT),
            (TrackedInstIndex::new(1), old_insts[1]),
        ];

        let plan = plan_zir_refs(FileIndex::new(0), &tracked, &old, &new, &names);

        assert_eq!(
            plan.marks,
            vec![
                Dependee::NamespaceName(main, names.intern("added")),
                Dependee::NamespaceName(main, names.intern("gone")),
                Dependee::Namespace(main),
                Dependee::SrcHash(TrackedInstIndex::new(1)),
            ]
        );
        assert_eq!(plan.repoint[1], (TrackedInstIndex::new(1), None));
    }

    #[test]
    fn reordering_marks_nothing() {
        let names = StringInterner::new();
        let (old, old_insts) = file_ir(&[("a", 1), ("b", 2)]);
        let (new, new_insts) = file_ir(&[("b", 2), ("a", 1)]);
        let tracked = [
            (TrackedInstIndex::new(0), InstIndex::MAIN_STRUCT),
            (TrackedInstIndex::new(1), old_insts[0]),
        ];

        let plan = plan_zir_refs(FileIndex::new(0), &tracked, &old, &new, &names);

        assert!(plan.marks.is_empty());
        assert_eq!(plan.repoint[1], (TrackedInstIndex::new(1), Some(new_insts[1])));
    }
}
