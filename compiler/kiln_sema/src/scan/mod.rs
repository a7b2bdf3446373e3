//! Populating a namespace from its container instruction.
//!
//! Scanning is repeated whenever the owning declaration is re-analyzed.
//! Existing declarations are matched by their tracked instruction, so an
//! unchanged member keeps its `DeclIndex`; members that disappeared are
//! detached.

use crate::decl::{Decl, DeclAnalysis, DeclKind};
use crate::driver::AnalysisCx;
use crate::jobs::Job;
use kiln_ir::{
    DeclIndex, DeclName, InstIndex, LoweredIr, Name, NamespaceIndex, TrackedInstIndex,
};
use rustc_hash::{FxHashMap, FxHashSet};

/// A member declaration as found in the IR, before it is given a `Decl`.
#[derive(Debug)]
struct Member {
    position: usize,
    inst: InstIndex,
    name: String,
    kind: DeclKind,
    is_named_test: bool,
    is_pub: bool,
    is_export: bool,
}

/// Collect the members of `container`, naming the unnamed ones.
///
/// Named members are taken first so synthesized names never shadow them.
fn collect_members(ir: &LoweredIr, container: InstIndex) -> Vec<Member> {
    let Some(view) = ir.container(container) else {
        return Vec::new();
    };
    let insts: Vec<InstIndex> = view.decls().collect();
    let mut taken: FxHashSet<String> = FxHashSet::default();
    let mut members = Vec::with_capacity(insts.len());

    for named_pass in [true, false] {
        for (position, &inst) in insts.iter().enumerate() {
            let Some(decl) = ir.declaration(inst) else {
                continue;
            };
            let (base, kind, is_named_test) = match (decl.name, named_pass) {
                (DeclName::Named(s), true) => (ir.string(s).to_owned(), DeclKind::Named, false),
                (DeclName::NamedTest(s), true) => {
                    (format!("test.{}", ir.string(s)), DeclKind::Test, true)
                }
                (DeclName::UnnamedTest, false) => ("test".to_owned(), DeclKind::Test, false),
                (DeclName::Comptime, false) => ("comptime".to_owned(), DeclKind::Comptime, false),
                (DeclName::Usingnamespace, false) => {
                    ("usingnamespace".to_owned(), DeclKind::Usingnamespace, false)
                }
                _ => continue,
            };
            let name = if kind == DeclKind::Named {
                if taken.contains(&base) {
                    tracing::warn!(name = %base, "duplicate member skipped");
                    continue;
                }
                base
            } else {
                avoid_name_conflict(&taken, base)
            };
            taken.insert(name.clone());
            members.push(Member {
                position,
                inst,
                name,
                kind,
                is_named_test,
                is_pub: decl.is_pub,
                is_export: decl.is_export,
            });
        }
    }
    members
}

fn avoid_name_conflict(taken: &FxHashSet<String>, base: String) -> String {
    if !taken.contains(&base) {
        return base;
    }
    (1..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(base)
}

/// Bring `namespace` in line with `container` in `ir`.
#[tracing::instrument(level = "debug", skip(cx, ir))]
pub(crate) fn scan_namespace(
    cx: &mut AnalysisCx<'_>,
    namespace: NamespaceIndex,
    ir: &LoweredIr,
    container: InstIndex,
) {
    let members = collect_members(ir, container);
    let db = &mut *cx.db;
    let ns = db.namespace(namespace);
    let file = ns.file;
    let owner_fqn = db.fqn(ns.owner_decl);
    let mut existing: FxHashMap<TrackedInstIndex, DeclIndex> = ns
        .decls
        .values()
        .filter_map(|&decl| db.decl(decl).zir_decl_index.map(|tracked| (tracked, decl)))
        .collect();
    let in_main_module = db.files.main_module() == Some(db.files.file(file).module);

    let mut placed: Vec<(usize, Name, DeclIndex)> = Vec::with_capacity(members.len());
    let mut usings: Vec<(DeclIndex, bool)> = Vec::new();
    for member in members {
        let tracked = db.tracked.track(file, member.inst);
        let name = db.intern_name(&member.name);
        let fqn_text = format!("{owner_fqn}.{}", member.name);
        let fqn = db.intern_name(&fqn_text);

        let reused = existing
            .remove(&tracked)
            .filter(|&decl| !db.decl(decl).deleted);
        let (decl_index, was_exported) = match reused {
            Some(decl_index) => {
                let decl = db.decl_mut(decl_index);
                let was_exported = decl.is_exported;
                decl.name = name;
                decl.fqn = fqn;
                decl.kind = member.kind;
                decl.is_pub = member.is_pub;
                decl.is_exported = member.is_export;
                (decl_index, was_exported)
            }
            None => {
                let mut decl = Decl::new(name, fqn, member.kind, file);
                decl.src_namespace = Some(namespace);
                decl.zir_decl_index = Some(tracked);
                decl.is_pub = member.is_pub;
                decl.is_exported = member.is_export;
                let decl_index = db.add_decl(decl);
                tracing::trace!(fqn = %fqn_text, ?decl_index, "new declaration");
                (decl_index, false)
            }
        };
        placed.push((member.position, name, decl_index));

        let eager = match member.kind {
            DeclKind::Comptime => true,
            DeclKind::Usingnamespace => {
                usings.push((decl_index, member.is_pub));
                true
            }
            DeclKind::Test => {
                let selected = db.config.is_test
                    && in_main_module
                    && db.config.test_matches(&fqn_text, member.is_named_test);
                if selected {
                    db.test_functions.insert(decl_index);
                } else {
                    db.test_functions.shift_remove(&decl_index);
                }
                selected
            }
            DeclKind::Named | DeclKind::Anon | DeclKind::FileRoot => false,
        } || member.is_export;
        let unreferenced = db.decl(decl_index).analysis == DeclAnalysis::Unreferenced;
        if eager && (unreferenced || was_exported != member.is_export) {
            db.jobs.push_back(Job::AnalyzeDecl(decl_index));
        }
    }

    placed.sort_by_key(|&(position, _, _)| position);
    let ns = db.namespace_mut(namespace);
    ns.decls = placed.iter().map(|&(_, name, decl)| (name, decl)).collect();
    ns.usingnamespace = usings.into_iter().collect();

    let mut removed: Vec<DeclIndex> = existing.into_values().collect();
    removed.sort_unstable();
    for decl in removed {
        cx.detach_decl(decl);
    }
}
