//! In-memory databases for unit tests.

#![allow(clippy::unwrap_used, reason = "Tests can panic")]

use super::mocks::{lower_lines, ConstAnalyzer};
use crate::backend::NullBackend;
use crate::config::CompilationConfig;
use crate::db::IncrementalDb;
use crate::driver::AnalysisCx;
use crate::file::FileStatus;
use kiln_ir::{DeclIndex, FileIndex, LoweredIr, NamespaceIndex, SharedInterner};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A database with one file, `main.kn`, lowered from `source`.
pub(crate) fn db_with_file(config: CompilationConfig, source: &str) -> (IncrementalDb, FileIndex) {
    let mut db = IncrementalDb::new(config, SharedInterner::new());
    let name = db.intern_name("main");
    let module = db.files.add_module(name, PathBuf::from("/virtual"));
    let file = db.files.add_file(module, Path::new("main.kn"));
    set_ir(&mut db, file, lower_lines(source).unwrap());
    (db, file)
}

pub(crate) fn set_ir(db: &mut IncrementalDb, file: FileIndex, ir: LoweredIr) {
    let f = db.files.file_mut(file);
    f.status = if ir.has_compile_errors() {
        FileStatus::LoweringFailure
    } else {
        FileStatus::Success
    };
    f.ir = Some(Arc::new(ir));
}

/// Analyze the file root and everything it queues.
pub(crate) fn analyze_root(db: &mut IncrementalDb, file: FileIndex) -> DeclIndex {
    let root = db.ensure_file_root(file);
    let mut backend = NullBackend;
    let mut cx = AnalysisCx::new(db, &ConstAnalyzer, &mut backend);
    cx.ensure_decl_analyzed(root).unwrap();
    cx.analyze_until_done();
    root
}

/// The namespace of the type a root declaration holds.
pub(crate) fn root_namespace(db: &IncrementalDb, root: DeclIndex) -> NamespaceIndex {
    let ty = db.decl(root).val.unwrap();
    db.pool.container(ty).unwrap().namespace
}

/// Member names of a namespace in order.
pub(crate) fn member_names(db: &IncrementalDb, namespace: NamespaceIndex) -> Vec<&'static str> {
    db.namespace(namespace)
        .decls
        .keys()
        .map(|&name| db.names.lookup(name))
        .collect()
}
