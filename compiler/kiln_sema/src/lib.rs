//! Incremental semantic analysis for Kiln.
//!
//! This crate decides which parts of a program must be re-analyzed after
//! source files change, and re-analyzes only those. A language plugs in
//! through two traits:
//!
//! - [`Lowerer`] turns source text into a syntax tree and [`LoweredIr`]
//! - [`Analyzer`] gives IR instructions meaning, reading every fact through
//!   a [`Sema`] handle so the dependency is recorded
//!
//! Results go to a [`Backend`].
//!
//! # Update cycle
//!
//! [`Compilation::update`] reloads changed files on worker threads,
//! correlates old and new IR so tracked instructions keep their identity,
//! marks the facts whose source changed as outdated, and re-analyzes
//! outdated units in dependency order. A unit whose results come out equal
//! releases its dependers without re-analyzing them.
//!
//! # Debug Environment Variables
//!
//! - `RUST_LOG=kiln_sema=debug`: updates, analyzed units, invalidation.
//! - `RUST_LOG=kiln_sema=trace`: every job and dependency edge.
//!
//! [`LoweredIr`]: kiln_ir::LoweredIr

pub mod analyzer;
pub mod backend;
mod collect;
pub mod compilation;
pub mod config;
pub mod correlate;
pub mod db;
pub mod decl;
pub mod deps;
mod driver;
pub mod errors;
pub mod export;
pub mod file;
pub mod func;
mod invalidate;
pub mod jobs;
pub mod lowering;
pub mod namespace;
pub mod outdated;
pub mod reference;
mod scan;
pub mod sema;
pub mod testing;
pub mod tracked;
pub mod unit;

pub use analyzer::{Analyzer, DeclValue, FuncBody};
pub use backend::{Backend, CodegenError, NullBackend};
pub use compilation::{Compilation, CompilationError, UpdateSummary};
pub use config::CompilationConfig;
pub use db::IncrementalDb;
pub use decl::{Decl, DeclAnalysis, DeclKind};
pub use driver::AnalysisCx;
pub use errors::{AnalysisError, AnalysisFail, Failures, SemaResult};
pub use export::{Export, ExportStatus, Exported};
pub use file::{File, FileStatus, FileTable};
pub use func::{Func, FuncAnalysis};
pub use lowering::{LoadError, Lowerer, ParseError};
pub use sema::{DeclIr, Sema};
pub use unit::{AnalUnit, Dependee};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call more than once. Does nothing unless `RUST_LOG` is set.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
