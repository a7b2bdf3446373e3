//! Driving analysis of declarations and function bodies.
//!
//! `ensure_decl_analyzed` and `ensure_func_body_analyzed` are the only
//! entry points into analysis. Each consults the outdated set, re-runs the
//! unit if needed, and then settles the unit's result facts: changed facts
//! mark their dependers outdated, unchanged ones release them.

mod codegen;
mod delete;

use crate::analyzer::{Analyzer, DeclValue};
use crate::backend::Backend;
use crate::db::IncrementalDb;
use crate::decl::{DeclAnalysis, DeclKind};
use crate::errors::{AnalysisError, AnalysisFail, SemaResult};
use crate::func::FuncAnalysis;
use crate::jobs::Job;
use crate::outdated::MarkedPo;
use crate::sema::Sema;
use crate::unit::{AnalUnit, Dependee};
use kiln_diagnostic::{ErrorCode, ErrorMsg, LazySrcLoc};
use kiln_intern::{ErrorSet, Index, Key};
use kiln_ir::{DeclIndex, FileIndex, FuncIndex, InstIndex, Linkage};
use smallvec::SmallVec;

/// Everything analysis needs: the database, the analyzer that gives
/// instructions meaning, and the backend that receives results.
pub struct AnalysisCx<'a> {
    pub(crate) db: &'a mut IncrementalDb,
    pub(crate) analyzer: &'a dyn Analyzer,
    pub(crate) backend: &'a mut dyn Backend,
}

/// Which result facts of a re-analyzed declaration changed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct DeclChange {
    val: bool,
    ptr: bool,
}

impl DeclChange {
    fn both(changed: bool) -> Self {
        DeclChange {
            val: changed,
            ptr: changed,
        }
    }
}

impl<'a> AnalysisCx<'a> {
    pub fn new(
        db: &'a mut IncrementalDb,
        analyzer: &'a dyn Analyzer,
        backend: &'a mut dyn Backend,
    ) -> Self {
        AnalysisCx {
            db,
            analyzer,
            backend,
        }
    }

    pub fn db(&self) -> &IncrementalDb {
        &*self.db
    }

    /// Re-analyze outdated units and drain the job queue, then settle
    /// exports.
    pub(crate) fn analyze_until_done(&mut self) {
        loop {
            if let Some(unit) = self.db.find_outdated() {
                let result = match unit {
                    AnalUnit::Decl(decl) => self.ensure_decl_analyzed(decl),
                    AnalUnit::Func(func) => self.ensure_func_body_analyzed(func),
                };
                if result.is_err() {
                    tracing::trace!(unit = %self.db.unit_name(unit), "outdated unit failed");
                }
                if self.db.outdated.is_outdated(unit) || self.db.outdated.is_potentially_outdated(unit) {
                    tracing::warn!(unit = %self.db.unit_name(unit), "unit was not settled; dropping it");
                    self.db.outdated.forget(unit);
                }
                continue;
            }
            if let Some(job) = self.db.jobs.pop_front() {
                self.run_job(job);
                continue;
            }
            break;
        }
        self.process_exports();
    }

    /// Bring `decl_index` up to date, analyzing it if it never was or is
    /// outdated.
    #[tracing::instrument(level = "debug", skip(self), fields(fqn = self.db.fqn(decl_index)))]
    pub fn ensure_decl_analyzed(&mut self, decl_index: DeclIndex) -> SemaResult<()> {
        let unit = AnalUnit::Decl(decl_index);
        if self.db.decl(decl_index).deleted {
            return Err(AnalysisFail);
        }
        let decl_was_outdated = self.db.outdated.take(unit);
        let root_outdated = self.db.outdated.take_file_root(decl_index);
        let was_outdated = decl_was_outdated || root_outdated;

        let decl = self.db.decl(decl_index);
        match decl.analysis {
            DeclAnalysis::InProgress => {
                panic!("{} is already being analyzed", self.db.fqn(decl_index))
            }
            DeclAnalysis::FileFailure if !decl.is_root() => {
                if decl_was_outdated {
                    self.db.mark_results_outdated(MarkedPo::Yes, unit);
                }
                return Err(AnalysisFail);
            }
            DeclAnalysis::FileFailure
            | DeclAnalysis::DependencyFailure
            | DeclAnalysis::SemaFailure
            | DeclAnalysis::CodegenFailure => {
                if !was_outdated {
                    return Err(AnalysisFail);
                }
            }
            DeclAnalysis::Complete => {
                if !was_outdated {
                    return Ok(());
                }
            }
            DeclAnalysis::Unreferenced => {}
        }

        if was_outdated {
            self.db.failures.clear_unit(unit);
            self.delete_unit_exports(unit);
            self.db.references.remove_for_unit(unit);
        }
        self.db.analyzed.push(unit);

        let result = if self.db.decl(decl_index).is_root() {
            self.sema_file_update(decl_index, decl_was_outdated)
        } else {
            self.sema_decl(decl_index, was_outdated)
        };

        match result {
            Ok(change) => {
                if decl_was_outdated {
                    self.settle(Dependee::DeclVal(decl_index), change.val);
                    self.settle(Dependee::DeclRef(decl_index), change.ptr);
                } else if root_outdated && change != DeclChange::default() {
                    self.db.mark_results_outdated(MarkedPo::No, unit);
                }
                Ok(())
            }
            Err(fail) => {
                let decl = self.db.decl_mut(decl_index);
                if decl.analysis == DeclAnalysis::InProgress {
                    decl.analysis = DeclAnalysis::DependencyFailure;
                }
                if decl_was_outdated {
                    self.db.mark_results_outdated(MarkedPo::Yes, unit);
                } else if root_outdated {
                    self.db.mark_results_outdated(MarkedPo::No, unit);
                }
                Err(fail)
            }
        }
    }

    /// A fact of a unit that was outdated has been recomputed.
    fn settle(&mut self, dependee: Dependee, changed: bool) {
        if changed {
            self.db.mark_outdated(MarkedPo::Yes, dependee);
        } else {
            self.db.mark_up_to_date(dependee);
        }
    }

    fn sema_decl(&mut self, decl_index: DeclIndex, was_outdated: bool) -> SemaResult<DeclChange> {
        let unit = AnalUnit::Decl(decl_index);
        let decl = self.db.decl(decl_index);
        let Some(tracked) = decl.zir_decl_index else {
            // Anonymous declarations are complete from creation.
            self.db.decl_mut(decl_index).analysis = DeclAnalysis::Complete;
            return Ok(DeclChange::default());
        };
        if !self.db.files.file(decl.file).is_ok() {
            self.db.decl_mut(decl_index).analysis = DeclAnalysis::FileFailure;
            return Err(AnalysisFail);
        }
        let current_hash = self.db.tracked.resolve(tracked).and_then(|(file, inst)| {
            let ir = self.db.files.file(file).analysis_ir()?;
            ir.declaration(inst).map(|d| d.src_hash)
        });
        let Some(current_hash) = current_hash else {
            tracing::debug!(fqn = self.db.fqn(decl_index), "declaration no longer in the IR");
            self.db.decl_mut(decl_index).analysis = DeclAnalysis::DependencyFailure;
            return Err(AnalysisFail);
        };

        let type_outdated = was_outdated && decl.last_src_hash != Some(current_hash);
        let old = DeclValue {
            ty: decl.ty.unwrap_or(Index::VOID_TYPE),
            val: decl.val.unwrap_or(Index::VOID_VALUE),
            alignment: decl.alignment,
            link_section: decl.link_section,
        };
        let had_value = decl.has_tv();
        let decl = self.db.decl_mut(decl_index);
        let old_owned = std::mem::take(&mut decl.owned_types);
        decl.analysis = DeclAnalysis::InProgress;
        decl.last_src_hash = Some(current_hash);
        self.db.graph.remove_dependencies_for_depender(unit);

        let analyzer = self.analyzer;
        let mut sema = Sema::new(self, unit, type_outdated);
        sema.declare_dependency(Dependee::SrcHash(tracked));
        let result = match analyzer.analyze_decl(&mut sema, decl_index) {
            Ok(value) => export_if_marked(&mut sema, decl_index, value, LazySrcLoc::inst(tracked)),
            Err(err) => Err(err),
        };
        let output = sema.finish();

        let value = match result {
            Ok(value) => value,
            Err(err) => {
                self.keep_owned_types(decl_index, old_owned, output.owned_types);
                return Err(self.absorb_error(unit, err, LazySrcLoc::inst(tracked)));
            }
        };
        self.commit_owned_types(decl_index, &old_owned, output.owned_types);

        let db = &mut *self.db;
        let owned_func = match db.pool.key(value.val) {
            Ok(Key::Func(f)) if db.func(f.func).owner_decl == decl_index => Some(f.func),
            _ => None,
        };
        let decl = db.decl_mut(decl_index);
        decl.owns_tv = owned_func.is_some() || decl.owned_types.contains(&value.val);
        decl.ty = Some(value.ty);
        decl.val = Some(value.val);
        decl.alignment = value.alignment;
        decl.link_section = value.link_section;
        decl.analysis = DeclAnalysis::Complete;

        if let Some(func) = owned_func {
            self.queue_func_analysis(func);
        }
        self.db.jobs.push_back(Job::CodegenDecl(decl_index));

        let ty_changed = !had_value || old.ty != value.ty;
        Ok(DeclChange {
            val: ty_changed || old.val != value.val || output.fields_changed,
            ptr: ty_changed
                || old.alignment != value.alignment
                || old.link_section != value.link_section,
        })
    }

    /// Re-check a file's main struct. Creates the file's root type on first
    /// analysis and rescans its namespace afterwards.
    #[tracing::instrument(level = "debug", skip(self))]
    fn sema_file_update(&mut self, root: DeclIndex, type_outdated: bool) -> SemaResult<DeclChange> {
        let unit = AnalUnit::Decl(root);
        let decl = self.db.decl(root);
        let file = decl.file;
        let was_file_failure = decl.analysis == DeclAnalysis::FileFailure;
        let old_val = decl.val;
        if !self.db.files.file(file).is_ok() {
            tracing::debug!(?file, "file has errors; root not analyzed");
            self.db.decl_mut(root).analysis = DeclAnalysis::FileFailure;
            return Err(AnalysisFail);
        }
        if was_file_failure {
            self.recover_file_decls(file);
        }

        let main = self.db.main_struct(file);
        let decl = self.db.decl_mut(root);
        let old_owned = std::mem::take(&mut decl.owned_types);
        decl.analysis = DeclAnalysis::InProgress;
        self.db.graph.remove_dependencies_for_depender(unit);

        let src = LazySrcLoc::inst(main);
        let mut sema = Sema::new(self, unit, type_outdated || was_file_failure);
        sema.declare_dependency(Dependee::SrcHash(main));
        let result = sema.create_container_type(file, InstIndex::MAIN_STRUCT, None, src);
        let output = sema.finish();

        let ty = match result {
            Ok(ty) => ty,
            Err(fail) => {
                self.keep_owned_types(root, old_owned, output.owned_types);
                return Err(fail);
            }
        };
        self.commit_owned_types(root, &old_owned, output.owned_types);
        let decl = self.db.decl_mut(root);
        decl.ty = Some(Index::TYPE_TYPE);
        decl.val = Some(ty);
        decl.owns_tv = true;
        decl.analysis = DeclAnalysis::Complete;
        self.db.jobs.push_back(Job::CodegenDecl(root));

        Ok(DeclChange::both(
            old_val != Some(ty) || output.fields_changed || was_file_failure,
        ))
    }

    /// The file is analyzable again: declarations that failed because of
    /// it start over, and whatever read them is outdated.
    fn recover_file_decls(&mut self, file: FileIndex) {
        let failed: Vec<DeclIndex> = self
            .db
            .live_decls()
            .filter(|&d| {
                let decl = self.db.decl(d);
                decl.file == file && !decl.is_root() && decl.analysis == DeclAnalysis::FileFailure
            })
            .collect();
        tracing::debug!(?file, count = failed.len(), "recovering declarations");
        for decl_index in failed {
            let decl = self.db.decl_mut(decl_index);
            decl.analysis = DeclAnalysis::Unreferenced;
            let eager = decl.is_exported
                || matches!(decl.kind, DeclKind::Comptime | DeclKind::Usingnamespace);
            let eager = eager || self.db.test_functions.contains(&decl_index);
            self.db
                .mark_results_outdated(MarkedPo::No, AnalUnit::Decl(decl_index));
            if eager {
                self.db.jobs.push_back(Job::AnalyzeDecl(decl_index));
            }
        }
    }

    /// Turn an analyzer error into a recorded failure.
    fn absorb_error(&mut self, unit: AnalUnit, err: AnalysisError, src: LazySrcLoc) -> AnalysisFail {
        match err {
            AnalysisError::Fail(fail) => fail,
            other => {
                self.db.push_retryable(unit);
                self.db.record_failure(
                    unit,
                    ErrorMsg::new(ErrorCode::E1007, src, format!("unable to analyze: {other}")),
                );
                AnalysisFail
            }
        }
    }

    /// Adopt the types created by a successful analysis and destroy the
    /// previously owned ones it did not recreate or reuse.
    fn commit_owned_types(
        &mut self,
        decl_index: DeclIndex,
        old: &[Index],
        created: SmallVec<[Index; 1]>,
    ) {
        let decl = self.db.decl_mut(decl_index);
        for ty in created {
            if !decl.owned_types.contains(&ty) {
                decl.owned_types.push(ty);
            }
        }
        let current = decl.owned_types.clone();
        for &ty in old {
            if !current.contains(&ty) && self.db.pool.is_live(ty) {
                self.destroy_owned_type(ty);
            }
        }
    }

    /// After a failure keep every type the declaration ever owned, so the
    /// next successful analysis can clean them up.
    fn keep_owned_types(
        &mut self,
        decl_index: DeclIndex,
        old: SmallVec<[Index; 1]>,
        created: SmallVec<[Index; 1]>,
    ) {
        let decl = self.db.decl_mut(decl_index);
        for ty in old.into_iter().chain(created) {
            if !decl.owned_types.contains(&ty) {
                decl.owned_types.push(ty);
            }
        }
    }

    /// Bring a function body up to date, analyzing it if needed.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn ensure_func_body_analyzed(&mut self, func: FuncIndex) -> SemaResult<()> {
        let unit = AnalUnit::Func(func);
        let f = self.db.func(func);
        if f.deleted {
            return Err(AnalysisFail);
        }
        let (owner, value) = (f.owner_decl, f.value);

        if let Err(fail) = self.ensure_decl_analyzed(owner) {
            if self.db.outdated.take(unit) {
                self.db.mark_outdated(MarkedPo::Yes, Dependee::FuncIes(func));
            }
            return Err(fail);
        }
        let owner_decl = self.db.decl(owner);
        if owner_decl.val != Some(value) {
            self.delete_orphaned_func(func);
            return Err(AnalysisFail);
        }
        let owner_tracked = owner_decl.zir_decl_index;

        let was_outdated = self.db.outdated.take(unit);
        let f = self.db.func(func);
        match f.analysis {
            FuncAnalysis::InProgress => {
                panic!("body of {} is already being analyzed", self.db.fqn(owner))
            }
            FuncAnalysis::SemaFailure
            | FuncAnalysis::DependencyFailure
            | FuncAnalysis::CodegenFailure => {
                if !was_outdated {
                    return Err(AnalysisFail);
                }
            }
            FuncAnalysis::Success => {
                if !was_outdated {
                    return Ok(());
                }
            }
            FuncAnalysis::None | FuncAnalysis::Queued => {}
        }
        let old_ies = f.resolved_error_set;
        let has_ies = f.has_inferred_error_set;

        if was_outdated {
            self.db.failures.clear_unit(unit);
            self.delete_unit_exports(unit);
            self.db.references.remove_for_unit(unit);
        }
        self.db.analyzed.push(unit);
        self.db.graph.remove_dependencies_for_depender(unit);
        self.db.func_mut(func).analysis = FuncAnalysis::InProgress;

        let analyzer = self.analyzer;
        let mut sema = Sema::new(self, unit, false);
        if let Some(tracked) = owner_tracked {
            sema.declare_dependency(Dependee::SrcHash(tracked));
        }
        let result = analyzer.analyze_func_body(&mut sema, func);
        sema.finish();

        let src = owner_tracked.map_or_else(
            || LazySrcLoc::file(self.db.decl(owner).file),
            LazySrcLoc::inst,
        );
        let body = match result {
            Ok(body) => body,
            Err(err) => {
                let fail = self.absorb_error(unit, err, src);
                let f = self.db.func_mut(func);
                if f.analysis == FuncAnalysis::InProgress {
                    f.analysis = FuncAnalysis::DependencyFailure;
                }
                if was_outdated {
                    self.db.mark_outdated(MarkedPo::Yes, Dependee::FuncIes(func));
                }
                return Err(fail);
            }
        };

        let ies = has_ies.then(|| {
            self.db
                .pool
                .intern(Key::ErrorSetType(ErrorSet::new(body.errors)))
        });
        let f = self.db.func_mut(func);
        f.resolved_error_set = ies;
        f.analysis = FuncAnalysis::Success;
        if was_outdated {
            self.settle(Dependee::FuncIes(func), !has_ies || ies != old_ies);
        }
        self.db.jobs.push_back(Job::CodegenFunc(func));
        Ok(())
    }

    pub(crate) fn queue_func_analysis(&mut self, func: FuncIndex) {
        let f = self.db.func_mut(func);
        if f.analysis == FuncAnalysis::None {
            f.analysis = FuncAnalysis::Queued;
            self.db.jobs.push_back(Job::AnalyzeFunc(func));
        }
    }
}

/// Request the export of a declaration marked `export`.
///
/// The value is published first so the export sees it.
fn export_if_marked(
    sema: &mut Sema<'_, '_>,
    decl_index: DeclIndex,
    value: DeclValue,
    src: LazySrcLoc,
) -> Result<DeclValue, AnalysisError> {
    let db = sema.db_mut();
    let decl = db.decl_mut(decl_index);
    decl.ty = Some(value.ty);
    decl.val = Some(value.val);
    let (is_exported, name) = (decl.is_exported, decl.name);
    if !is_exported {
        return Ok(value);
    }
    let name = db.names.lookup(name);
    let section = value.link_section.map(|s| db.names.lookup(s));
    sema.export(
        crate::export::Exported::Decl(decl_index),
        name,
        Linkage::Strong,
        section,
        src,
    )?;
    Ok(value)
}
