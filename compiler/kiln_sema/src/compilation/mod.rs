//! The update cycle.
//!
//! A `Compilation` owns the incremental database behind one coarse lock.
//! Each [`Compilation::update`] reloads changed files in parallel without
//! the lock, correlates their old and new IR in parallel, then applies the
//! resulting invalidation and re-analyzes what is outdated under the lock.

use crate::analyzer::Analyzer;
use crate::backend::Backend;
use crate::collect::all_errors;
use crate::config::CompilationConfig;
use crate::db::IncrementalDb;
use crate::driver::AnalysisCx;
use crate::file::{FileStatus, LoadFlags};
use crate::invalidate::{apply_zir_refs, plan_zir_refs, ZirRefsPlan};
use crate::jobs::Job;
use crate::lowering::{load_file, IrCache, LoadInput, LoadOutcome, Lowerer};
use crate::unit::AnalUnit;
use kiln_diagnostic::{Diagnostic, ErrorCode, ErrorMsg, LazySrcLoc};
use kiln_ir::{FileIndex, InstIndex, LoweredIr, ModuleIndex, SharedInterner, TrackedInstIndex};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CompilationError {
    #[error("unable to start worker threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// What one update did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Units analyzed, in order, by name.
    pub analyzed: Vec<String>,
    /// Files whose lowered IR changed.
    pub changed_files: usize,
    pub error_count: usize,
}

struct State {
    db: IncrementalDb,
    backend: Box<dyn Backend>,
}

/// A file whose new IR must be correlated with the IR its tracked
/// instructions point into.
struct Correlation {
    file: FileIndex,
    tracked: Vec<(TrackedInstIndex, InstIndex)>,
    old: Arc<LoweredIr>,
    new: Arc<LoweredIr>,
}

pub struct Compilation {
    state: Mutex<State>,
    /// Serializes updates; the state lock is released while loading.
    updating: Mutex<()>,
    names: SharedInterner,
    lowerer: Arc<dyn Lowerer>,
    analyzer: Arc<dyn Analyzer>,
    cache: Option<IrCache>,
    thread_pool: Option<rayon::ThreadPool>,
}

impl Compilation {
    pub fn new(
        config: CompilationConfig,
        lowerer: Arc<dyn Lowerer>,
        analyzer: Arc<dyn Analyzer>,
        backend: Box<dyn Backend>,
    ) -> Result<Self, CompilationError> {
        let cache = config
            .cache_dir
            .as_deref()
            .map(|dir| IrCache::new(dir, config.compiler_hash));
        let thread_pool = match config.jobs {
            Some(jobs) => Some(rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?),
            None => None,
        };
        let names = SharedInterner::new();
        Ok(Compilation {
            state: Mutex::new(State {
                db: IncrementalDb::new(config, names.clone()),
                backend,
            }),
            updating: Mutex::new(()),
            names,
            lowerer,
            analyzer,
            cache,
            thread_pool,
        })
    }

    pub fn names(&self) -> &SharedInterner {
        &self.names
    }

    /// Register a build module. The first one is the main module.
    pub fn add_module(&self, name: &str, root_dir: impl Into<PathBuf>) -> ModuleIndex {
        let mut state = self.state.lock();
        let name = state.db.intern_name(name);
        state.db.files.add_module(name, root_dir.into())
    }

    /// Register a source file of `module`, relative to its root.
    pub fn add_root_file(&self, module: ModuleIndex, sub_path: impl AsRef<Path>) -> FileIndex {
        self.state.lock().db.files.add_file(module, sub_path.as_ref())
    }

    /// Run `f` with the database locked.
    pub fn with_db<R>(&self, f: impl FnOnce(&IncrementalDb) -> R) -> R {
        f(&self.state.lock().db)
    }

    fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        match &self.thread_pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }

    /// Bring every result up to date with the files on disk.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn update(&self) -> UpdateSummary {
        let _updating = self.updating.lock();

        let inputs = {
            let mut state = self.state.lock();
            let db = &mut state.db;
            db.analyzed.clear();
            for unit in std::mem::take(&mut db.retryable) {
                let live = match unit {
                    AnalUnit::Decl(decl) => !db.decl(decl).deleted,
                    AnalUnit::Func(func) => !db.func(func).deleted,
                };
                if live {
                    tracing::debug!(unit = %db.unit_name(unit), "retrying");
                    db.outdated.mark_unit_outdated(&db.graph, unit);
                }
            }
            db.files
                .indices()
                .map(|file| {
                    let f = db.files.file(file);
                    LoadInput {
                        file,
                        path: db.files.full_path(file),
                        prev_stat: f.stat,
                        has_current_ir: f.has_current_ir(),
                    }
                })
                .collect::<Vec<_>>()
        };

        let lowerer = &*self.lowerer;
        let cache = self.cache.as_ref();
        let outcomes: Vec<(FileIndex, LoadOutcome)> = self.install(|| {
            inputs
                .par_iter()
                .map(|input| (input.file, load_file(input, lowerer, cache)))
                .collect()
        });

        let (correlations, changed_files) = {
            let mut state = self.state.lock();
            let mut changed_files = 0;
            let mut correlations = Vec::new();
            for (file, outcome) in outcomes {
                let changed = !matches!(outcome, LoadOutcome::Unchanged);
                apply_load_outcome(&mut state.db, file, outcome);
                if changed {
                    changed_files += 1;
                }
                let f = state.db.files.file(file);
                if let (Some(old), Some(new)) = (f.prev_ir.clone(), f.ir.clone()) {
                    correlations.push(Correlation {
                        file,
                        tracked: state.db.tracked.for_file(file),
                        old,
                        new,
                    });
                }
            }
            (correlations, changed_files)
        };

        let names = &*self.names;
        let plans: Vec<ZirRefsPlan> = self.install(|| {
            correlations
                .par_iter()
                .map(|c| plan_zir_refs(c.file, &c.tracked, &c.old, &c.new, names))
                .collect()
        });

        // Each file's plan is applied under its own lock hold.
        for plan in &plans {
            let mut state = self.state.lock();
            apply_zir_refs(&mut state.db, plan);
            state.db.files.file_mut(plan.file).prev_ir = None;
        }

        let mut state = self.state.lock();
        let State { db, backend } = &mut *state;

        if !db.config.incremental && db.decl_count() > 0 {
            db.reset_semantic_state();
        }
        let files: Vec<FileIndex> = db.files.indices().collect();
        for file in files {
            if db.files.file(file).root_decl.is_none() {
                let root = db.ensure_file_root(file);
                db.jobs.push_back(Job::AnalyzeDecl(root));
            }
        }

        let mut cx = AnalysisCx::new(db, &*self.analyzer, &mut **backend);
        cx.analyze_until_done();

        let summary = UpdateSummary {
            analyzed: db.analyzed.iter().map(|&unit| db.unit_name(unit)).collect(),
            changed_files,
            error_count: db.failures.len(),
        };
        tracing::debug!(
            analyzed = summary.analyzed.len(),
            changed = summary.changed_files,
            errors = summary.error_count,
            "update finished"
        );
        summary
    }

    /// Every current error, rendered.
    pub fn all_errors(&self) -> Vec<Diagnostic> {
        let mut state = self.state.lock();
        all_errors(&mut state.db, &*self.lowerer)
    }

    /// Drop loaded sources and syntax trees; errors reload them on demand.
    pub fn unload_file_trees(&self) {
        let mut state = self.state.lock();
        let files: Vec<FileIndex> = state.db.files.indices().collect();
        for file in files {
            state.db.files.file_mut(file).unload_tree();
        }
    }
}

/// Record a load outcome on the file, keeping the IR tracked instructions
/// point into, and requeue the file root when the file starts or stops
/// failing.
fn apply_load_outcome(db: &mut IncrementalDb, file: FileIndex, outcome: LoadOutcome) {
    let root = db.files.file(file).root_decl;
    let f = db.files.file_mut(file);
    let was_ok = f.is_ok();
    let file_errors = match outcome {
        LoadOutcome::Unchanged => return,
        LoadOutcome::Lowered(lowered) => {
            f.stat = Some(lowered.stat);
            f.loaded = LoadFlags::IR;
            if lowered.source.is_some() {
                f.loaded |= LoadFlags::SOURCE;
            }
            if lowered.tree.is_some() {
                f.loaded |= LoadFlags::TREE;
            }
            f.source = lowered.source;
            f.tree = lowered.tree;
            f.load_error = None;
            if lowered.ir.has_compile_errors() {
                if was_ok {
                    f.last_success_ir = f.ir.take();
                }
                let errors = lowered
                    .ir
                    .compile_errors()
                    .into_iter()
                    .map(|e| {
                        ErrorMsg::new(ErrorCode::E0001, LazySrcLoc::file_byte(file, e.byte_offset), e.message)
                    })
                    .collect();
                f.ir = Some(lowered.ir);
                f.status = FileStatus::LoweringFailure;
                Some(errors)
            } else {
                let old = f.last_success_ir.take().or_else(|| f.ir.take().filter(|_| was_ok));
                if old.as_ref().is_some_and(|old| **old != *lowered.ir) {
                    f.prev_ir = old;
                }
                f.ir = Some(lowered.ir);
                f.status = FileStatus::Success;
                None
            }
        }
        LoadOutcome::ParseFailed {
            stat,
            source,
            error,
        } => {
            f.stat = Some(stat);
            f.source = Some(source);
            f.tree = None;
            f.loaded = LoadFlags::SOURCE;
            if was_ok {
                f.last_success_ir = f.ir.take();
            } else {
                f.ir = None;
            }
            f.status = FileStatus::ParseFailure;
            f.load_error = Some((error.message.clone(), error.byte_offset));
            Some(vec![ErrorMsg::new(
                ErrorCode::E0001,
                LazySrcLoc::file_byte(file, error.byte_offset),
                error.message,
            )])
        }
        LoadOutcome::ReadFailed(error) => {
            f.stat = None;
            f.unload_tree();
            if was_ok {
                f.last_success_ir = f.ir.take();
            }
            f.status = FileStatus::RetryableFailure;
            f.load_error = Some((error.to_string(), 0));
            Some(vec![ErrorMsg::new(
                ErrorCode::E0002,
                LazySrcLoc::file(file),
                error.to_string(),
            )])
        }
    };
    let is_ok = f.is_ok();
    tracing::debug!(?file, status = ?f.status, "file loaded");

    match file_errors {
        Some(errors) => {
            db.failures.files.insert(file, errors);
        }
        None => {
            db.failures.files.shift_remove(&file);
        }
    }
    if let Some(root) = root {
        if was_ok != is_ok {
            db.outdated.add_file_root(root);
        }
    }
}
