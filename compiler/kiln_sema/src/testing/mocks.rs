//! Minimal front-end, analyzer and backend for exercising the incremental
//! core without a real language.
//!
//! [`LineLowerer`] reads one declaration per line:
//!
//! ```text
//! pub answer = 42
//! alias = answer
//! export entry = 7
//! test "math" = 1
//! comptime = 0
//! !lowering error message
//! ?? (parse error)
//! ```
//!
//! [`ConstAnalyzer`] gives every integer type `i32` and resolves references
//! to other lines by name.

use crate::analyzer::{Analyzer, DeclValue, FuncBody};
use crate::backend::{Backend, CodegenError};
use crate::errors::AnalysisError;
use crate::export::Exported;
use crate::lowering::{Lowerer, ParseError};
use crate::sema::Sema;
use kiln_diagnostic::ErrorCode;
use kiln_intern::{Field, Index, IntValue, Key};
use kiln_ir::lowered::{ContainerSpec, DeclSpec};
use kiln_ir::{
    ContainerKind, ContentHash, DeclIndex, DeclName, FuncIndex, InstIndex, InstTag, IrBuilder,
    LoweredIr, Span, SyntaxTree,
};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// Lowers the line format described in the module docs.
#[derive(Copy, Clone, Debug, Default)]
pub struct LineLowerer;

impl LineLowerer {
    fn lines(source: &str) -> impl Iterator<Item = (u32, &str)> {
        let mut offset = 0u32;
        source.split('\n').map(move |line| {
            let start = offset;
            offset += u32::try_from(line.len() + 1).unwrap_or(u32::MAX);
            (start, line.trim_end())
        })
    }
}

impl Lowerer for LineLowerer {
    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError> {
        let mut tree = SyntaxTree::new();
        tree.push(Span::new(0, u32::try_from(source.len()).unwrap_or(u32::MAX)));
        for (start, line) in Self::lines(source) {
            if line.is_empty() {
                continue;
            }
            if line.starts_with("??") {
                return Err(ParseError {
                    message: "expected declaration".to_owned(),
                    byte_offset: start,
                });
            }
            let end = start + u32::try_from(line.len()).unwrap_or(0);
            tree.push(Span::new(start, end));
        }
        Ok(tree)
    }

    fn lower(&self, source: &str, _tree: &SyntaxTree) -> LoweredIr {
        let mut b = IrBuilder::new();
        let mut decls = Vec::new();
        let mut node = 0;
        for (start, line) in Self::lines(source) {
            if line.is_empty() {
                continue;
            }
            node += 1;
            if let Some(message) = line.strip_prefix('!') {
                b.add_compile_error(message.trim(), start);
                continue;
            }
            let Some((lhs, rhs)) = line.split_once('=') else {
                b.add_compile_error("expected '='", start);
                continue;
            };
            let (rhs, mut words) = (rhs.trim(), lhs.split_whitespace().peekable());
            let is_pub = words.next_if_eq(&"pub").is_some();
            let is_export = words.next_if_eq(&"export").is_some();
            let name = match (words.next(), words.next()) {
                (Some("test"), Some(quoted)) => DeclName::NamedTest(b.string(quoted.trim_matches('"'))),
                (Some("test"), None) => DeclName::UnnamedTest,
                (Some("comptime"), None) => DeclName::Comptime,
                (Some(ident), None) => DeclName::Named(b.string(ident)),
                _ => {
                    b.add_compile_error("malformed declaration", start);
                    continue;
                }
            };
            let value = match rhs.parse::<i64>() {
                Ok(int) => b.add_int(int),
                Err(_) => {
                    let target = b.string(rhs);
                    b.add_with_node(InstTag::DeclVal, target.0, node)
                }
            };
            decls.push(b.add_declaration(&DeclSpec {
                name,
                is_pub,
                is_export,
                src_hash: ContentHash::of_bytes(line.as_bytes()),
                src_node: node,
                body: &[value],
            }));
        }
        b.set_main_struct(&ContainerSpec {
            kind: ContainerKind::Struct,
            fields_hash: ContentHash::ZERO,
            src_node: 0,
            fields: &[],
            decls: &decls,
        });
        b.finish()
    }
}

/// Resolves integer literals and references by name.
#[derive(Copy, Clone, Debug, Default)]
pub struct ConstAnalyzer;

impl Analyzer for ConstAnalyzer {
    fn analyze_decl(&self, sema: &mut Sema<'_, '_>, decl: DeclIndex) -> Result<DeclValue, AnalysisError> {
        let Some(dir) = sema.decl_ir(decl) else {
            return Err(AnalysisError::Unexpected("declaration has no IR".to_owned()));
        };
        let Some(value) = dir.ir.declaration(dir.inst).and_then(|d| d.value()) else {
            return Err(AnalysisError::Unexpected("declaration has no value".to_owned()));
        };
        match dir.ir.tag(value) {
            Some(InstTag::Int) => {
                let int = dir.ir.int_value(value).unwrap_or_default();
                let val = sema.intern(Key::Int(IntValue {
                    ty: Index::I32_TYPE,
                    value: int,
                }));
                Ok(DeclValue::new(Index::I32_TYPE, val))
            }
            Some(InstTag::DeclVal) => {
                let data = dir.ir.data(value);
                let text = dir.ir.string(kiln_ir::NullTerminatedString(data.a));
                let name = sema.names().intern(text);
                let src = dir.node_loc(data.b);
                let Some(namespace) = sema.decl(decl).src_namespace else {
                    return Err(AnalysisError::Unexpected("declaration has no namespace".to_owned()));
                };
                let Some(target) = sema.lookup_name(namespace, name, src)? else {
                    return Err(sema
                        .fail(ErrorCode::E1001, src, format!("use of undeclared identifier '{text}'"))
                        .into());
                };
                let value = sema.analyze_decl_val(target, src)?;
                Ok(DeclValue::new(value.ty, value.val))
            }
            other => Err(AnalysisError::Unexpected(format!("unsupported instruction {other:?}"))),
        }
    }

    fn analyze_func_body(&self, _sema: &mut Sema<'_, '_>, _func: FuncIndex) -> Result<FuncBody, AnalysisError> {
        Ok(FuncBody::default())
    }

    fn resolve_container_fields(&self, _sema: &mut Sema<'_, '_>, _ty: Index) -> Result<Vec<Field>, AnalysisError> {
        Ok(Vec::new())
    }
}

/// One call a [`RecordingBackend`] received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendEvent {
    UpdateDecl(String),
    UpdateFunc(String),
    UpdateExports(Exported, Vec<String>),
    DeleteExport(String),
    DeleteFunc(FuncIndex),
}

#[derive(Debug, Default)]
struct LogState {
    events: Vec<BackendEvent>,
    unsupported: FxHashSet<String>,
    flaky: FxHashSet<String>,
}

/// Shared handle to a [`RecordingBackend`]: what it saw, and which names it
/// refuses.
#[derive(Clone, Debug, Default)]
pub struct BackendLog(Arc<Mutex<LogState>>);

impl BackendLog {
    /// Everything recorded so far, clearing the log.
    pub fn take(&self) -> Vec<BackendEvent> {
        std::mem::take(&mut self.0.lock().events)
    }

    /// Reject `fqn` as unsupported from now on.
    pub fn reject(&self, fqn: &str) {
        self.0.lock().unsupported.insert(fqn.to_owned());
    }

    /// Fail `fqn` with a transient I/O error from now on.
    pub fn make_flaky(&self, fqn: &str) {
        self.0.lock().flaky.insert(fqn.to_owned());
    }

    /// Accept `fqn` again.
    pub fn heal(&self, fqn: &str) {
        let mut state = self.0.lock();
        state.unsupported.remove(fqn);
        state.flaky.remove(fqn);
    }

    fn record(&self, fqn: &str, event: BackendEvent) -> Result<(), CodegenError> {
        let mut state = self.0.lock();
        if state.unsupported.contains(fqn) {
            return Err(CodegenError::Unsupported(format!("cannot lower '{fqn}'")));
        }
        if state.flaky.contains(fqn) {
            return Err(CodegenError::Io(std::io::Error::other("disk full")));
        }
        state.events.push(event);
        Ok(())
    }
}

/// A backend that logs its calls and fails on request.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    log: BackendLog,
}

impl RecordingBackend {
    pub fn new() -> (Self, BackendLog) {
        let backend = RecordingBackend::default();
        let log = backend.log.clone();
        (backend, log)
    }
}

impl Backend for RecordingBackend {
    fn update_decl(&mut self, _decl: DeclIndex, fqn: &str) -> Result<(), CodegenError> {
        self.log.record(fqn, BackendEvent::UpdateDecl(fqn.to_owned()))
    }

    fn update_func(&mut self, _func: FuncIndex, fqn: &str) -> Result<(), CodegenError> {
        self.log.record(fqn, BackendEvent::UpdateFunc(fqn.to_owned()))
    }

    fn update_exports(&mut self, exported: Exported, names: &[&str]) -> Result<(), CodegenError> {
        let owned: Vec<String> = names.iter().map(|&n| n.to_owned()).collect();
        let key = owned.join(",");
        self.log.record(&key, BackendEvent::UpdateExports(exported, owned))
    }

    fn delete_export(&mut self, name: &str) {
        self.log.0.lock().events.push(BackendEvent::DeleteExport(name.to_owned()));
    }

    fn delete_func(&mut self, func: FuncIndex) {
        self.log.0.lock().events.push(BackendEvent::DeleteFunc(func));
    }
}

/// Parse and lower `source` with [`LineLowerer`].
pub fn lower_lines(source: &str) -> Result<LoweredIr, ParseError> {
    let tree = LineLowerer.parse(source)?;
    Ok(LineLowerer.lower(source, &tree))
}

/// The `Declaration` instructions of the main struct, in source order.
pub fn main_decls(ir: &LoweredIr) -> Vec<InstIndex> {
    ir.container(InstIndex::MAIN_STRUCT)
        .map(|c| c.decls().collect())
        .unwrap_or_default()
}
