//! The per-unit analysis handle given to an [`Analyzer`](crate::Analyzer).
//!
//! Every read of another unit's result goes through a `Sema` method, which
//! records the dependency edge and the reference before the result is
//! returned. A `Sema` lives for one analysis of one unit.

mod container;

use crate::analyzer::DeclValue;
use crate::db::IncrementalDb;
use crate::decl::{Decl, DeclAnalysis, DeclKind};
use crate::driver::AnalysisCx;
use crate::errors::{AnalysisFail, SemaResult};
use crate::export::{Export, ExportStatus, Exported};
use crate::func::{Func, FuncAnalysis, FuncKey};
use crate::jobs::Job;
use crate::unit::{AnalUnit, Dependee};
use kiln_diagnostic::{ErrorCode, ErrorMsg, LazySrcLoc};
use kiln_intern::{DeclPtr, FuncValue, Index, Key, PtrType};
use kiln_ir::{
    DeclIndex, FileIndex, FuncIndex, InstIndex, Linkage, LoweredIr, Name, NamespaceIndex,
    StringInterner, TrackedInstIndex,
};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::sync::Arc;

/// A declaration's or function's instruction, resolved in the IR
/// analysis currently reads for its file.
#[derive(Clone, Debug)]
pub struct DeclIr {
    pub file: FileIndex,
    pub ir: Arc<LoweredIr>,
    pub inst: InstIndex,
    pub tracked: TrackedInstIndex,
}

impl DeclIr {
    /// The instruction as a whole.
    pub fn loc(&self) -> LazySrcLoc {
        LazySrcLoc::inst(self.tracked)
    }

    /// Syntax node `node`, relative to the instruction so it follows edits
    /// that move the declaration.
    pub fn node_loc(&self, node: u32) -> LazySrcLoc {
        let base = self.ir.inst_src_node(self.inst).unwrap_or(node);
        LazySrcLoc::node(self.tracked, base, node)
    }
}

/// What a finished analysis leaves behind for the driver.
#[derive(Debug, Default)]
pub(crate) struct SemaOutput {
    pub owned_types: SmallVec<[Index; 1]>,
    pub fields_changed: bool,
}

pub struct Sema<'s, 'a> {
    cx: &'s mut AnalysisCx<'a>,
    owner: AnalUnit,
    /// Dependencies already recorded by this analysis.
    declared: FxHashSet<Dependee>,
    /// Container types owned by the owner must be recreated rather than
    /// reused, because the owner's source changed.
    type_outdated: bool,
    owned_types: SmallVec<[Index; 1]>,
    fields_changed: bool,
}

impl<'s, 'a> Sema<'s, 'a> {
    pub(crate) fn new(cx: &'s mut AnalysisCx<'a>, owner: AnalUnit, type_outdated: bool) -> Self {
        Sema {
            cx,
            owner,
            declared: FxHashSet::default(),
            type_outdated,
            owned_types: SmallVec::new(),
            fields_changed: false,
        }
    }

    pub(crate) fn finish(self) -> SemaOutput {
        SemaOutput {
            owned_types: self.owned_types,
            fields_changed: self.fields_changed,
        }
    }

    pub fn owner(&self) -> AnalUnit {
        self.owner
    }

    /// The declaration owning the unit: itself, or a function's owner.
    pub fn owner_decl(&self) -> DeclIndex {
        match self.owner {
            AnalUnit::Decl(decl) => decl,
            AnalUnit::Func(func) => self.db().func(func).owner_decl,
        }
    }

    /// Read-only access to everything analysis has produced so far.
    ///
    /// Reading another unit's result through this bypasses dependency
    /// tracking; use the dedicated methods for that.
    pub fn db(&self) -> &IncrementalDb {
        &*self.cx.db
    }

    pub(crate) fn db_mut(&mut self) -> &mut IncrementalDb {
        &mut *self.cx.db
    }

    pub fn names(&self) -> &StringInterner {
        &self.cx.db.names
    }

    pub fn intern(&mut self, key: Key) -> Index {
        self.cx.db.pool.intern(key)
    }

    pub fn decl(&self, decl: DeclIndex) -> &Decl {
        self.cx.db.decl(decl)
    }

    pub fn format_value(&self, index: Index) -> String {
        self.cx.db.format_value(index)
    }

    pub fn track(&mut self, file: FileIndex, inst: InstIndex) -> TrackedInstIndex {
        self.cx.db.tracked.track(file, inst)
    }

    /// The declaring instruction of `decl`. A file root resolves to its
    /// main struct.
    pub fn decl_ir(&self, decl: DeclIndex) -> Option<DeclIr> {
        let db = self.db();
        let d = db.decl(decl);
        let tracked = match d.zir_decl_index {
            Some(tracked) => tracked,
            None => db.tracked.find(d.file, InstIndex::MAIN_STRUCT)?,
        };
        self.resolve_ir(tracked)
    }

    /// The body instruction of `func`.
    pub fn func_ir(&self, func: FuncIndex) -> Option<DeclIr> {
        self.resolve_ir(self.db().func(func).zir_body_inst)
    }

    fn resolve_ir(&self, tracked: TrackedInstIndex) -> Option<DeclIr> {
        let db = self.db();
        let (file, inst) = db.tracked.resolve(tracked)?;
        let ir = db.files.file(file).analysis_ir()?.clone();
        Some(DeclIr {
            file,
            ir,
            inst,
            tracked,
        })
    }

    /// Record that the owner read `dependee`.
    pub fn declare_dependency(&mut self, dependee: Dependee) {
        if let Dependee::DeclVal(decl) | Dependee::DeclRef(decl) = dependee {
            if self.owner == AnalUnit::Decl(decl) {
                return;
            }
        }
        if self.declared.insert(dependee) {
            self.cx.db.graph.add_dependency(self.owner, dependee);
        }
    }

    pub fn fail(&mut self, code: ErrorCode, src: LazySrcLoc, message: impl Into<String>) -> AnalysisFail {
        self.fail_with(ErrorMsg::new(code, src, message))
    }

    /// Record `msg` as the owner's failure.
    pub fn fail_with(&mut self, msg: ErrorMsg) -> AnalysisFail {
        self.cx.db.record_failure(self.owner, msg);
        AnalysisFail
    }

    /// Make sure `decl` is analyzed on behalf of the owner.
    fn ensure_referenced_decl(&mut self, decl: DeclIndex, src: LazySrcLoc) -> SemaResult<()> {
        self.cx
            .db
            .references
            .add(self.owner, AnalUnit::Decl(decl), src);
        if self.db().decl(decl).analysis == DeclAnalysis::InProgress {
            if self.has_known_type(decl) {
                return Ok(());
            }
            let fqn = self.db().fqn(decl);
            return Err(self.fail(
                ErrorCode::E1002,
                src,
                format!("dependency loop detected: '{fqn}' depends on its own value"),
            ));
        }
        self.cx.ensure_decl_analyzed(decl)
    }

    /// A container declaration being re-analyzed keeps its type while the
    /// fields are resolved again.
    fn has_known_type(&self, decl: DeclIndex) -> bool {
        let db = self.db();
        db.decl(decl)
            .val
            .is_some_and(|val| db.pool.container(val).is_ok_and(|c| c.owner_decl == decl))
    }

    /// The resolved type and value of `decl`.
    pub fn analyze_decl_val(&mut self, decl: DeclIndex, src: LazySrcLoc) -> SemaResult<DeclValue> {
        self.declare_dependency(Dependee::DeclVal(decl));
        self.ensure_referenced_decl(decl, src)?;
        let d = self.db().decl(decl);
        match (d.ty, d.val) {
            (Some(ty), Some(val)) => Ok(DeclValue {
                ty,
                val,
                alignment: d.alignment,
                link_section: d.link_section,
            }),
            _ => Err(AnalysisFail),
        }
    }

    /// A constant pointer to `decl`.
    pub fn analyze_decl_ref(&mut self, decl: DeclIndex, src: LazySrcLoc) -> SemaResult<Index> {
        self.declare_dependency(Dependee::DeclRef(decl));
        self.ensure_referenced_decl(decl, src)?;
        let Some(ty) = self.db().decl(decl).ty else {
            return Err(AnalysisFail);
        };
        let ptr_ty = self.intern(Key::PtrType(PtrType {
            child: ty,
            is_const: true,
        }));
        Ok(self.intern(Key::DeclPtr(DeclPtr { ty: ptr_ty, decl })))
    }

    /// Resolve `name` from `start` outwards through the parent namespaces.
    pub fn lookup_name(
        &mut self,
        start: NamespaceIndex,
        name: Name,
        src: LazySrcLoc,
    ) -> SemaResult<Option<DeclIndex>> {
        let mut current = Some(start);
        while let Some(namespace) = current {
            let mut visited = SmallVec::<[NamespaceIndex; 4]>::new();
            if let Some(found) = self.lookup_in_namespace(namespace, name, false, src, &mut visited)? {
                return Ok(Some(found));
            }
            current = self.db().namespace(namespace).parent;
        }
        Ok(None)
    }

    /// Resolve `name` as a member of one namespace, including public
    /// members brought in by `usingnamespace`.
    pub fn lookup_member(
        &mut self,
        namespace: NamespaceIndex,
        name: Name,
        src: LazySrcLoc,
    ) -> SemaResult<Option<DeclIndex>> {
        let mut visited = SmallVec::<[NamespaceIndex; 4]>::new();
        self.lookup_in_namespace(namespace, name, false, src, &mut visited)
    }

    fn lookup_in_namespace(
        &mut self,
        namespace: NamespaceIndex,
        name: Name,
        only_pub: bool,
        src: LazySrcLoc,
        visited: &mut SmallVec<[NamespaceIndex; 4]>,
    ) -> SemaResult<Option<DeclIndex>> {
        if visited.contains(&namespace) {
            return Ok(None);
        }
        visited.push(namespace);
        self.ensure_namespace_up_to_date(namespace)?;
        let ns = self.db().namespace(namespace);
        let zir_index = ns.zir_index;
        let direct = ns.get(name);
        let usings: Vec<(DeclIndex, bool)> =
            ns.usingnamespace.iter().map(|(&d, &p)| (d, p)).collect();
        self.declare_dependency(Dependee::NamespaceName(zir_index, name));

        if let Some(decl) = direct {
            let d = self.db().decl(decl);
            if d.kind == DeclKind::Named && !d.deleted && (!only_pub || d.is_pub) {
                return Ok(Some(decl));
            }
        }

        for (using_decl, is_pub) in usings {
            if only_pub && !is_pub {
                continue;
            }
            // The `usingnamespace` operand itself may be what is being
            // resolved.
            if self.owner == AnalUnit::Decl(using_decl)
                || self.db().decl(using_decl).analysis == DeclAnalysis::InProgress
            {
                continue;
            }
            let value = self.analyze_decl_val(using_decl, src)?;
            let Ok(target) = self.db().pool.container(value.val).map(|c| c.namespace) else {
                continue;
            };
            if let Some(found) = self.lookup_in_namespace(target, name, true, src, visited)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Rescan `namespace` first if its member list is known to be stale.
    ///
    /// Members are only added and removed when the namespace's owner is
    /// analyzed, so an owner still outdated from an edit is brought up to
    /// date before its members are read.
    fn ensure_namespace_up_to_date(&mut self, namespace: NamespaceIndex) -> SemaResult<()> {
        let owner = self.db().namespace(namespace).owner_decl;
        let unit = AnalUnit::Decl(owner);
        if self.owner == unit {
            return Ok(());
        }
        let db = self.db();
        let stale = db.outdated.is_outdated(unit) || db.outdated.is_file_root(owner);
        if !stale || db.decl(owner).analysis == DeclAnalysis::InProgress {
            return Ok(());
        }
        tracing::debug!(owner = db.fqn(owner), "namespace owner outdated; rescanning first");
        self.cx.ensure_decl_analyzed(owner)
    }

    /// The function with body `body` and type `ty`, owned by the owner's
    /// declaration, and its value.
    pub fn get_or_create_func(&mut self, body: TrackedInstIndex, ty: Index) -> (FuncIndex, Index) {
        let owner_decl = self.owner_decl();
        let key = FuncKey {
            owner_decl,
            zir_body_inst: body,
            ty,
        };
        let db = self.db_mut();
        if let Some(&func) = db.func_by_key.get(&key) {
            let existing = db.func(func);
            if !existing.deleted {
                return (func, existing.value);
            }
        }
        let has_inferred_error_set =
            matches!(db.pool.key(ty), Ok(Key::FuncType(ft)) if ft.inferred_error_set);
        let index = FuncIndex::from_usize(db.funcs.len());
        let value = db.pool.intern(Key::Func(FuncValue { ty, func: index }));
        db.add_func(Func {
            owner_decl,
            zir_body_inst: body,
            ty,
            value,
            analysis: FuncAnalysis::None,
            has_inferred_error_set,
            resolved_error_set: None,
            deleted: false,
        });
        tracing::debug!(?index, owner = db.fqn(owner_decl), "created function");
        (index, value)
    }

    /// Queue the body of `func` for analysis.
    pub fn queue_func_analysis(&mut self, func: FuncIndex) {
        self.cx.queue_func_analysis(func);
    }

    /// The error set inferred from `func`'s body, analyzing it if needed.
    pub fn resolve_inferred_error_set(&mut self, func: FuncIndex, src: LazySrcLoc) -> SemaResult<Index> {
        let f = self.db().func(func);
        if !f.has_inferred_error_set {
            return Ok(Index::EMPTY_ERROR_SET);
        }
        let owner_in_progress = self.db().decl(f.owner_decl).analysis == DeclAnalysis::InProgress;
        if f.analysis == FuncAnalysis::InProgress || owner_in_progress {
            let fqn = self.db().fqn(f.owner_decl);
            return Err(self.fail(
                ErrorCode::E1002,
                src,
                format!("unable to resolve inferred error set of '{fqn}': it depends on itself"),
            ));
        }
        self.declare_dependency(Dependee::FuncIes(func));
        self.cx
            .db
            .references
            .add(self.owner, AnalUnit::Func(func), src);
        self.cx.ensure_func_body_analyzed(func)?;
        self.db().func(func).resolved_error_set.ok_or(AnalysisFail)
    }

    /// Request that `exported` be exposed under `name`.
    pub fn export(
        &mut self,
        exported: Exported,
        name: &str,
        linkage: Linkage,
        section: Option<&str>,
        src: LazySrcLoc,
    ) -> SemaResult<()> {
        if name.is_empty() {
            return Err(self.fail(ErrorCode::E1009, src, "exported symbol name cannot be empty"));
        }
        let value = match exported {
            Exported::Value(val) => Some(val),
            Exported::Decl(decl) => self.db().decl(decl).val,
        };
        if let Some(val) = value {
            if self.db().pool.is_type(val) {
                let rendered = self.format_value(val);
                return Err(self.fail(
                    ErrorCode::E1009,
                    src,
                    format!("unable to export type '{rendered}'"),
                ));
            }
        }
        let owner = self.owner;
        let db = self.db_mut();
        let name = db.intern_name(name);
        let section = section.map(|s| db.intern_name(s));
        let index = db.exports.add(Export {
            owner,
            exported,
            name,
            linkage,
            section,
            src,
            status: ExportStatus::InProgress,
        });
        tracing::debug!(?index, name = self.names().lookup(name), "export requested");
        Ok(())
    }

    /// A declaration holding a value computed by the owner, e.g. the
    /// target of a pointer to a temporary.
    pub fn create_anon_decl(&mut self, ty: Index, val: Index) -> DeclIndex {
        let owner_decl = self.owner_decl();
        let db = self.db_mut();
        let owner = db.decl(owner_decl);
        let (file, src_namespace) = (owner.file, owner.src_namespace);
        let fqn = db
            .names
            .intern_fmt(format_args!("{}__anon_{}", db.fqn(owner_decl), db.decls.len()));
        let mut decl = Decl::new(fqn, fqn, DeclKind::Anon, file);
        decl.src_namespace = src_namespace;
        decl.ty = Some(ty);
        decl.val = Some(val);
        decl.analysis = DeclAnalysis::Complete;
        let index = db.add_decl(decl);
        db.jobs.push_back(Job::CodegenDecl(index));
        index
    }
}
