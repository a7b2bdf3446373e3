//! Running jobs and handing analyzed units to the backend.

use super::AnalysisCx;
use crate::backend::CodegenError;
use crate::decl::DeclAnalysis;
use crate::export::{ExportStatus, Exported};
use crate::func::FuncAnalysis;
use crate::jobs::Job;
use crate::sema::Sema;
use crate::unit::AnalUnit;
use indexmap::IndexMap;
use kiln_diagnostic::{ErrorCode, ErrorMsg, LazySrcLoc};
use kiln_intern::{Index, Key};
use kiln_ir::{DeclIndex, ExportIndex, FuncIndex};
use rustc_hash::FxBuildHasher;

impl AnalysisCx<'_> {
    pub(crate) fn run_job(&mut self, job: Job) {
        tracing::trace!(?job, "running job");
        match job {
            Job::AnalyzeDecl(decl) => {
                // Failures are already recorded.
                let _ = self.ensure_decl_analyzed(decl);
            }
            Job::AnalyzeFunc(func) => {
                let _ = self.ensure_func_body_analyzed(func);
            }
            Job::CodegenDecl(decl) => self.codegen_decl(decl),
            Job::CodegenFunc(func) => self.codegen_func(func),
        }
    }

    #[tracing::instrument(level = "debug", skip(self), fields(fqn = self.db.fqn(decl_index)))]
    fn codegen_decl(&mut self, decl_index: DeclIndex) {
        let decl = self.db.decl(decl_index);
        if decl.deleted || decl.analysis != DeclAnalysis::Complete {
            return;
        }
        let (Some(ty), Some(val)) = (decl.ty, decl.val) else {
            return;
        };
        let src = decl
            .zir_decl_index
            .map_or_else(|| LazySrcLoc::file(decl.file), LazySrcLoc::inst);

        if self.db.pool.container(val).is_ok() {
            let unit = AnalUnit::Decl(decl_index);
            let mut sema = Sema::new(self, unit, false);
            let result = sema.resolve_type_fields(val, src);
            sema.finish();
            if result.is_err() {
                let decl = self.db.decl_mut(decl_index);
                if decl.analysis == DeclAnalysis::Complete {
                    decl.analysis = DeclAnalysis::DependencyFailure;
                }
            }
            return;
        }
        if self.is_comptime_only(ty) || matches!(self.db.pool.key(val), Ok(Key::Func(_))) {
            return;
        }

        let fqn = self.db.fqn(decl_index);
        if let Err(err) = self.backend.update_decl(decl_index, fqn) {
            self.db.decl_mut(decl_index).analysis = DeclAnalysis::CodegenFailure;
            self.codegen_failed(AnalUnit::Decl(decl_index), src, &err);
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn codegen_func(&mut self, func: FuncIndex) {
        let f = self.db.func(func);
        if f.deleted || f.analysis != FuncAnalysis::Success {
            return;
        }
        let owner = self.db.decl(f.owner_decl);
        let src = owner
            .zir_decl_index
            .map_or_else(|| LazySrcLoc::file(owner.file), LazySrcLoc::inst);
        let fqn = self.db.fqn(f.owner_decl);
        if let Err(err) = self.backend.update_func(func, fqn) {
            self.db.func_mut(func).analysis = FuncAnalysis::CodegenFailure;
            self.codegen_failed(AnalUnit::Func(func), src, &err);
        }
    }

    fn codegen_failed(&mut self, unit: AnalUnit, src: LazySrcLoc, err: &CodegenError) {
        tracing::debug!(unit = %self.db.unit_name(unit), %err, "codegen failed");
        self.db.failures.codegen.insert(
            unit,
            ErrorMsg::new(ErrorCode::E5001, src, format!("unable to codegen: {err}")),
        );
        if err.is_transient() {
            self.db.push_retryable(unit);
        }
    }

    /// Types whose values exist only at compile time.
    fn is_comptime_only(&self, ty: Index) -> bool {
        ty == Index::TYPE_TYPE
            || ty == Index::COMPTIME_INT_TYPE
            || matches!(self.db.pool.key(ty), Ok(Key::FuncType(_) | Key::ErrorSetType(_)))
    }

    /// Settle symbol names, then publish every pending export.
    #[tracing::instrument(level = "debug", skip(self))]
    pub(crate) fn process_exports(&mut self) {
        let retried: Vec<ExportIndex> = self
            .db
            .failures
            .exports
            .keys()
            .copied()
            .filter(|&i| {
                self.db
                    .exports
                    .get(i)
                    .is_some_and(|e| e.status == ExportStatus::FailedRetryable)
            })
            .collect();
        for index in retried {
            self.db.failures.exports.shift_remove(&index);
        }
        for collision in self.db.exports.resolve_symbols() {
            let (Some(export), Some(other)) = (
                self.db.exports.get(collision.export),
                self.db.exports.get(collision.other),
            ) else {
                continue;
            };
            let name = self.db.names.lookup(export.name);
            let msg = ErrorMsg::new(
                ErrorCode::E2001,
                export.src,
                format!("exported symbol collision: '{name}'"),
            )
            .with_note(other.src, "other symbol here");
            self.db.failures.exports.insert(collision.export, msg);
        }

        let mut pending: IndexMap<Exported, Vec<ExportIndex>, FxBuildHasher> = IndexMap::default();
        for index in self.db.exports.ordered() {
            if let Some(export) = self.db.exports.get(index) {
                if export.status == ExportStatus::InProgress {
                    pending.entry(export.exported).or_default().push(index);
                }
            }
        }

        for (exported, indices) in pending {
            let names: Vec<&str> = indices
                .iter()
                .filter_map(|&i| self.db.exports.get(i))
                .map(|export| self.db.names.lookup(export.name))
                .collect();
            let result = self.backend.update_exports(exported, &names);
            for &index in &indices {
                let Some(export) = self.db.exports.get_mut(index) else {
                    continue;
                };
                match &result {
                    Ok(()) => export.status = ExportStatus::Complete,
                    Err(err) => {
                        let transient = err.is_transient();
                        export.status = if transient {
                            ExportStatus::FailedRetryable
                        } else {
                            ExportStatus::Failed
                        };
                        let (owner, src) = (export.owner, export.src);
                        self.db.failures.exports.insert(
                            index,
                            ErrorMsg::new(ErrorCode::E5001, src, format!("unable to export: {err}")),
                        );
                        if transient {
                            self.db.push_retryable(owner);
                        }
                    }
                }
            }
        }
    }
}
