//! Shared harness: a compilation over files in a temporary directory.

#![allow(clippy::unwrap_used, reason = "Tests can panic")]
#![allow(dead_code, reason = "Each test crate uses a subset")]

use kiln_eval::{ComptimeAnalyzer, FrontEnd};
use kiln_intern::Key;
use kiln_ir::{DeclIndex, FileIndex, FuncIndex, ModuleIndex};
use kiln_sema::testing::{BackendLog, RecordingBackend};
use kiln_sema::{Compilation, CompilationConfig, UpdateSummary};
use std::sync::Arc;
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    pub comp: Compilation,
    pub log: BackendLog,
    pub module: ModuleIndex,
}

impl Harness {
    /// A compilation of `main.kn` holding `source`.
    pub fn new(source: &str) -> Self {
        Self::with_config(CompilationConfig::new(), source)
    }

    pub fn with_config(config: CompilationConfig, source: &str) -> Self {
        kiln_sema::init_tracing();
        let dir = TempDir::new().unwrap();
        let (backend, log) = RecordingBackend::new();
        let comp = Compilation::new(
            config,
            Arc::new(FrontEnd),
            Arc::new(ComptimeAnalyzer),
            Box::new(backend),
        )
        .unwrap();
        let module = comp.add_module("main", dir.path());
        let harness = Harness {
            dir,
            comp,
            log,
            module,
        };
        harness.add_file("main.kn", source);
        harness
    }

    pub fn add_file(&self, name: &str, source: &str) -> FileIndex {
        self.write(name, source);
        self.comp.add_root_file(self.module, name)
    }

    /// Overwrite a file. Callers change its length so the stat differs
    /// even within one mtime tick.
    pub fn write(&self, name: &str, source: &str) {
        std::fs::write(self.dir.path().join(name), source).unwrap();
    }

    /// Rewrite `main.kn` and update.
    pub fn edit(&self, source: &str) -> UpdateSummary {
        self.write("main.kn", source);
        self.comp.update()
    }

    pub fn decl(&self, fqn: &str) -> DeclIndex {
        self.comp.with_db(|db| db.find_decl(fqn)).unwrap()
    }

    pub fn has_decl(&self, fqn: &str) -> bool {
        self.comp.with_db(|db| db.find_decl(fqn)).is_some()
    }

    /// The value of a declaration, rendered.
    pub fn value(&self, fqn: &str) -> String {
        let decl = self.decl(fqn);
        self.comp
            .with_db(|db| db.format_value(db.decl(decl).val.unwrap()))
    }

    /// The type of a declaration, rendered.
    pub fn type_of(&self, fqn: &str) -> String {
        let decl = self.decl(fqn);
        self.comp
            .with_db(|db| db.format_value(db.decl(decl).ty.unwrap()))
    }

    /// The function a declaration holds.
    pub fn func(&self, fqn: &str) -> FuncIndex {
        let decl = self.decl(fqn);
        self.comp.with_db(|db| match db.pool().key(db.decl(decl).val.unwrap()) {
            Ok(Key::Func(func)) => func.func,
            _ => panic!("{fqn} is not a function"),
        })
    }

    /// The inferred error set of the function a declaration holds.
    pub fn error_set(&self, fqn: &str) -> String {
        let decl = self.decl(fqn);
        self.comp.with_db(|db| {
            let Ok(Key::Func(func)) = db.pool().key(db.decl(decl).val.unwrap()) else {
                panic!("{fqn} is not a function");
            };
            db.format_value(db.func(func.func).resolved_error_set.unwrap())
        })
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.comp
            .all_errors()
            .iter()
            .map(|d| match &d.location {
                Some(loc) => format!("{loc}: {}", d.message),
                None => d.message.clone(),
            })
            .collect()
    }
}

/// Unit names in sorted order, for updates whose order is not the point.
pub fn sorted(summary: &UpdateSummary) -> Vec<&str> {
    let mut names: Vec<&str> = summary.analyzed.iter().map(String::as_str).collect();
    names.sort_unstable();
    names
}
