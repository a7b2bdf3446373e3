//! All state that survives between updates.
//!
//! `IncrementalDb` owns the semantic tables (declarations, namespaces,
//! functions, the intern pool) and the incremental bookkeeping (dependency
//! graph, outdated sets, exports, references, failures). It is guarded by
//! the compilation lock; analysis borrows it mutably through
//! [`AnalysisCx`](crate::driver::AnalysisCx).

use crate::config::CompilationConfig;
use crate::decl::{Decl, DeclAnalysis, DeclKind};
use crate::deps::DependencyGraph;
use crate::errors::Failures;
use crate::export::ExportTable;
use crate::file::FileTable;
use crate::func::{Func, FuncAnalysis, FuncKey};
use crate::jobs::Job;
use crate::namespace::Namespace;
use crate::outdated::{MarkedPo, OutdatedTracker};
use crate::reference::ReferenceTable;
use crate::tracked::TrackedInsts;
use crate::unit::{AnalUnit, Dependee};
use indexmap::IndexSet;
use kiln_diagnostic::ErrorMsg;
use kiln_intern::{Index, InternPool};
use kiln_ir::{
    DeclIndex, FileIndex, FuncIndex, InstIndex, Name, NamespaceIndex, SharedInterner,
    TrackedInstIndex,
};
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::collections::VecDeque;

#[derive(Debug)]
pub struct IncrementalDb {
    pub(crate) config: CompilationConfig,
    pub(crate) names: SharedInterner,
    pub(crate) pool: InternPool,
    pub(crate) files: FileTable,
    pub(crate) tracked: TrackedInsts,
    pub(crate) decls: Vec<Decl>,
    pub(crate) namespaces: Vec<Namespace>,
    /// Namespaces by declaring instruction, so a recreated type keeps its
    /// namespace and the declarations in it.
    pub(crate) namespace_by_inst: FxHashMap<TrackedInstIndex, NamespaceIndex>,
    pub(crate) funcs: Vec<Func>,
    pub(crate) func_by_key: FxHashMap<FuncKey, FuncIndex>,
    pub(crate) graph: DependencyGraph,
    pub(crate) outdated: OutdatedTracker,
    pub(crate) exports: ExportTable,
    pub(crate) references: ReferenceTable,
    pub(crate) failures: Failures,
    /// Units whose failure was not the program's fault; re-run next update.
    pub(crate) retryable: Vec<AnalUnit>,
    pub(crate) jobs: VecDeque<Job>,
    pub(crate) test_functions: IndexSet<DeclIndex, FxBuildHasher>,
    /// Units analyzed during the current update, in order.
    pub(crate) analyzed: Vec<AnalUnit>,
}

impl IncrementalDb {
    pub fn new(config: CompilationConfig, names: SharedInterner) -> Self {
        IncrementalDb {
            config,
            names,
            pool: InternPool::new(),
            files: FileTable::default(),
            tracked: TrackedInsts::default(),
            decls: Vec::new(),
            namespaces: Vec::new(),
            namespace_by_inst: FxHashMap::default(),
            funcs: Vec::new(),
            func_by_key: FxHashMap::default(),
            graph: DependencyGraph::new(),
            outdated: OutdatedTracker::new(),
            exports: ExportTable::default(),
            references: ReferenceTable::default(),
            failures: Failures::default(),
            retryable: Vec::new(),
            jobs: VecDeque::new(),
            test_functions: IndexSet::default(),
            analyzed: Vec::new(),
        }
    }

    pub fn config(&self) -> &CompilationConfig {
        &self.config
    }

    pub fn names(&self) -> &SharedInterner {
        &self.names
    }

    pub fn pool(&self) -> &InternPool {
        &self.pool
    }

    pub fn files(&self) -> &FileTable {
        &self.files
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn outdated(&self) -> &OutdatedTracker {
        &self.outdated
    }

    pub fn exports(&self) -> &ExportTable {
        &self.exports
    }

    pub fn failures(&self) -> &Failures {
        &self.failures
    }

    pub fn tracked(&self) -> &TrackedInsts {
        &self.tracked
    }

    pub fn decl(&self, index: DeclIndex) -> &Decl {
        &self.decls[index.index()]
    }

    pub(crate) fn decl_mut(&mut self, index: DeclIndex) -> &mut Decl {
        &mut self.decls[index.index()]
    }

    pub fn decl_count(&self) -> usize {
        self.decls.len()
    }

    /// Live declarations in creation order.
    pub fn live_decls(&self) -> impl Iterator<Item = DeclIndex> + '_ {
        self.decls
            .iter()
            .enumerate()
            .filter(|(_, decl)| !decl.deleted)
            .map(|(i, _)| DeclIndex::from_usize(i))
    }

    /// The live declaration whose fully qualified name is `fqn`.
    pub fn find_decl(&self, fqn: &str) -> Option<DeclIndex> {
        let name = self.names.find(fqn)?;
        self.live_decls().find(|&decl| self.decl(decl).fqn == name)
    }

    pub fn namespace(&self, index: NamespaceIndex) -> &Namespace {
        &self.namespaces[index.index()]
    }

    pub(crate) fn namespace_mut(&mut self, index: NamespaceIndex) -> &mut Namespace {
        &mut self.namespaces[index.index()]
    }

    pub fn func(&self, index: FuncIndex) -> &Func {
        &self.funcs[index.index()]
    }

    pub(crate) fn func_mut(&mut self, index: FuncIndex) -> &mut Func {
        &mut self.funcs[index.index()]
    }

    /// Live functions in creation order.
    pub fn live_funcs(&self) -> impl Iterator<Item = FuncIndex> + '_ {
        self.funcs
            .iter()
            .enumerate()
            .filter(|(_, func)| !func.deleted)
            .map(|(i, _)| FuncIndex::from_usize(i))
    }

    pub fn test_functions(&self) -> impl Iterator<Item = DeclIndex> + '_ {
        self.test_functions.iter().copied()
    }

    pub fn analyzed_units(&self) -> &[AnalUnit] {
        &self.analyzed
    }

    pub fn fqn(&self, decl: DeclIndex) -> &'static str {
        self.names.lookup(self.decl(decl).fqn)
    }

    /// Human-readable name of a unit, for logs and summaries.
    pub fn unit_name(&self, unit: AnalUnit) -> String {
        match unit {
            AnalUnit::Decl(decl) => self.fqn(decl).to_owned(),
            AnalUnit::Func(func) => format!("{} (body)", self.fqn(self.func(func).owner_decl)),
        }
    }

    /// Render a type or value for an error message.
    pub fn format_value(&self, index: Index) -> String {
        self.pool
            .format(index, &self.names, &|decl| self.fqn(decl).to_owned())
    }

    pub(crate) fn add_decl(&mut self, decl: Decl) -> DeclIndex {
        let index = DeclIndex::from_usize(self.decls.len());
        self.decls.push(decl);
        index
    }

    pub(crate) fn add_namespace(&mut self, namespace: Namespace) -> NamespaceIndex {
        let index = NamespaceIndex::from_usize(self.namespaces.len());
        self.namespace_by_inst.insert(namespace.zir_index, index);
        self.namespaces.push(namespace);
        index
    }

    pub(crate) fn add_func(&mut self, func: Func) -> FuncIndex {
        let index = FuncIndex::from_usize(self.funcs.len());
        self.func_by_key.insert(
            FuncKey {
                owner_decl: func.owner_decl,
                zir_body_inst: func.zir_body_inst,
                ty: func.ty,
            },
            index,
        );
        self.funcs.push(func);
        index
    }

    /// The root declaration of `file`, created on first use.
    ///
    /// A root has no declaring instruction; its namespace is the file's
    /// main struct.
    pub(crate) fn ensure_file_root(&mut self, file: FileIndex) -> DeclIndex {
        if let Some(root) = self.files.file(file).root_decl {
            return root;
        }
        let stem = self
            .files
            .file(file)
            .sub_path
            .file_stem()
            .map_or_else(|| "root".to_owned(), |s| s.to_string_lossy().into_owned());
        let name = self.names.intern(&stem);
        let mut decl = Decl::new(name, name, DeclKind::FileRoot, file);
        decl.is_pub = true;
        let root = self.add_decl(decl);
        self.files.file_mut(file).root_decl = Some(root);
        tracing::debug!(?file, %stem, ?root, "created file root");
        root
    }

    /// The tracked main struct instruction of `file`.
    pub(crate) fn main_struct(&mut self, file: FileIndex) -> TrackedInstIndex {
        self.tracked.track(file, InstIndex::MAIN_STRUCT)
    }

    pub(crate) fn mark_outdated(&mut self, marked_po: MarkedPo, dependee: Dependee) {
        self.outdated
            .mark_dependee_outdated(&self.graph, marked_po, dependee);
    }

    pub(crate) fn mark_up_to_date(&mut self, dependee: Dependee) {
        self.outdated.mark_po_dependee_up_to_date(&self.graph, dependee);
    }

    /// Mark every result fact of `unit` as changed.
    pub(crate) fn mark_results_outdated(&mut self, marked_po: MarkedPo, unit: AnalUnit) {
        for fact in unit.result_facts() {
            self.mark_outdated(marked_po, fact);
        }
    }

    /// Record the first failure of `unit`; later ones are dropped.
    pub(crate) fn record_failure(&mut self, unit: AnalUnit, msg: ErrorMsg) {
        tracing::debug!(unit = %self.unit_name(unit), message = %msg.message, "analysis failed");
        self.failures.analysis.entry(unit).or_insert(msg);
        match unit {
            AnalUnit::Decl(decl) => self.decl_mut(decl).analysis = DeclAnalysis::SemaFailure,
            AnalUnit::Func(func) => self.func_mut(func).analysis = FuncAnalysis::SemaFailure,
        }
    }

    pub(crate) fn push_retryable(&mut self, unit: AnalUnit) {
        if !self.retryable.contains(&unit) {
            self.retryable.push(unit);
        }
    }

    /// The next unit to re-analyze, or `None` when incremental tracking is
    /// off.
    pub(crate) fn find_outdated(&self) -> Option<AnalUnit> {
        if !self.config.incremental {
            return None;
        }
        self.outdated.find_outdated_to_analyze(&self.graph)
    }

    /// Drop every semantic result, keeping loaded files and tracked
    /// instructions. Used when incremental tracking is off.
    pub(crate) fn reset_semantic_state(&mut self) {
        tracing::debug!("resetting semantic state");
        self.pool = InternPool::new();
        self.decls.clear();
        self.namespaces.clear();
        self.namespace_by_inst.clear();
        self.funcs.clear();
        self.func_by_key.clear();
        self.graph = DependencyGraph::new();
        self.outdated = OutdatedTracker::new();
        self.exports = ExportTable::default();
        self.references = ReferenceTable::default();
        let file_failures = std::mem::take(&mut self.failures.files);
        self.failures = Failures {
            files: file_failures,
            ..Failures::default()
        };
        self.retryable.clear();
        self.jobs.clear();
        self.test_functions.clear();
        let files: Vec<FileIndex> = self.files.indices().collect();
        for file in files {
            self.files.file_mut(file).root_decl = None;
        }
    }

    /// The `Name` of `s`, interned.
    pub(crate) fn intern_name(&self, s: &str) -> Name {
        self.names.intern(s)
    }
}
