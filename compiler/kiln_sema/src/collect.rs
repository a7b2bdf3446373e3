//! Rendering stored failures into diagnostics.
//!
//! Failures are stored as [`ErrorMsg`]s with lazy locations. Collection
//! resolves each location against the IR analysis currently reads,
//! reloading a file's source and syntax tree if they were unloaded.

use crate::db::IncrementalDb;
use crate::file::LoadFlags;
use crate::lowering::{read_source, Lowerer};
use crate::reference::ReferenceTable;
use crate::unit::AnalUnit;
use kiln_diagnostic::span_utils::LineOffsetTable;
use kiln_diagnostic::{Diagnostic, ErrorMsg, LazySrcLoc, SourceLocation, SrcBase, SrcOffset};
use kiln_ir::{FileIndex, Span};
use rustc_hash::FxHashMap;
use std::sync::Arc;

struct Collector<'a> {
    db: &'a mut IncrementalDb,
    lowerer: &'a dyn Lowerer,
    lines: FxHashMap<FileIndex, Option<(Arc<str>, LineOffsetTable)>>,
}

impl Collector<'_> {
    /// The file and span `src` points at, if it can still be found.
    fn resolve(&mut self, src: LazySrcLoc) -> Option<(FileIndex, Span)> {
        let (file, base_node) = match src.base {
            SrcBase::File(file) => (file, 0),
            SrcBase::Inst(tracked) => {
                let (file, inst) = self.db.tracked.resolve(tracked)?;
                let ir = self.db.files.file(file).analysis_ir()?;
                (file, ir.inst_src_node(inst)?)
            }
        };
        if let SrcOffset::Byte(byte) = src.offset {
            return Some((file, Span::point(byte)));
        }
        let node = src.node_index(base_node)?;
        let span = self.ensure_tree(file)?.node_span(node)?;
        Some((file, span))
    }

    /// The file's syntax tree, reparsing the source if it was unloaded.
    fn ensure_tree(&mut self, file: FileIndex) -> Option<Arc<kiln_ir::SyntaxTree>> {
        if let Some(tree) = &self.db.files.file(file).tree {
            return Some(Arc::clone(tree));
        }
        let source = self.ensure_source(file)?;
        match self.lowerer.parse(&source) {
            Ok(tree) => {
                let tree = Arc::new(tree);
                let f = self.db.files.file_mut(file);
                f.tree = Some(Arc::clone(&tree));
                f.loaded.insert(LoadFlags::TREE);
                tracing::trace!(?file, "reloaded syntax tree");
                Some(tree)
            }
            Err(e) => {
                tracing::debug!(?file, error = %e, "unable to reparse for error locations");
                None
            }
        }
    }

    fn ensure_source(&mut self, file: FileIndex) -> Option<Arc<str>> {
        if let Some(source) = &self.db.files.file(file).source {
            return Some(Arc::clone(source));
        }
        let path = self.db.files.full_path(file);
        match read_source(&path) {
            Ok(source) => {
                let f = self.db.files.file_mut(file);
                f.source = Some(Arc::clone(&source));
                f.loaded.insert(LoadFlags::SOURCE);
                Some(source)
            }
            Err(e) => {
                tracing::debug!(?file, error = %e, "unable to reload source for error locations");
                None
            }
        }
    }

    fn location(&mut self, src: LazySrcLoc) -> Option<(SourceLocation, Span)> {
        let (file, span) = self.resolve(src)?;
        if !self.lines.contains_key(&file) {
            let entry = self
                .ensure_source(file)
                .map(|source| {
                    let table = LineOffsetTable::build(&source);
                    (source, table)
                });
            self.lines.insert(file, entry);
        }
        let (source, table) = self.lines.get(&file)?.as_ref()?;
        let (line, column) = table.offset_to_line_col(source, span.start);
        let location = SourceLocation {
            path: self.db.files.display_path(file),
            line,
            column,
        };
        Some((location, span))
    }

    fn render(&mut self, msg: &ErrorMsg) -> Diagnostic {
        let mut diag = Diagnostic::error(msg.code).with_message(msg.message.clone());
        match self.location(msg.src) {
            Some((location, span)) => {
                diag = diag.with_location(location).with_label(span, String::new());
            }
            None => tracing::trace!(src = ?msg.src, "error location unresolved"),
        }
        for note in &msg.notes {
            let text = match self.location(note.src) {
                Some((location, _)) => format!("{location}: {}", note.message),
                None => note.message.clone(),
            };
            diag = diag.with_note(text);
        }
        diag
    }

    fn with_trace(
        &mut self,
        mut diag: Diagnostic,
        reverse: &FxHashMap<AnalUnit, (AnalUnit, LazySrcLoc)>,
        unit: AnalUnit,
    ) -> Diagnostic {
        for (referencer, src) in ReferenceTable::trace(reverse, unit) {
            let name = self.db.unit_name(referencer);
            let text = match self.location(src) {
                Some((location, _)) => format!("referenced by '{name}' at {location}"),
                None => format!("referenced by '{name}'"),
            };
            diag = diag.with_note(text);
        }
        diag
    }
}

fn is_live(db: &IncrementalDb, unit: AnalUnit) -> bool {
    match unit {
        AnalUnit::Decl(decl) => !db.decl(decl).deleted,
        AnalUnit::Func(func) => !db.func(func).deleted,
    }
}

/// Every failure on record, rendered and sorted by location.
#[tracing::instrument(level = "debug", skip_all)]
pub(crate) fn all_errors(db: &mut IncrementalDb, lowerer: &dyn Lowerer) -> Vec<Diagnostic> {
    let file_msgs: Vec<ErrorMsg> = db.failures.files.values().flatten().cloned().collect();
    let unit_msgs: Vec<(AnalUnit, ErrorMsg)> = db
        .failures
        .analysis
        .iter()
        .chain(&db.failures.codegen)
        .filter(|(&unit, _)| is_live(db, unit))
        .map(|(&unit, msg)| (unit, msg.clone()))
        .collect();
    let export_msgs: Vec<ErrorMsg> = db.failures.exports.values().cloned().collect();
    let reverse = db.references.resolve();

    let mut collector = Collector {
        db,
        lowerer,
        lines: FxHashMap::default(),
    };
    let mut diagnostics = Vec::with_capacity(file_msgs.len() + unit_msgs.len() + export_msgs.len());
    for msg in &file_msgs {
        diagnostics.push(collector.render(msg));
    }
    for (unit, msg) in &unit_msgs {
        let diag = collector.render(msg);
        diagnostics.push(collector.with_trace(diag, &reverse, *unit));
    }
    for msg in &export_msgs {
        diagnostics.push(collector.render(msg));
    }

    diagnostics.sort_by(|a, b| {
        let key = |d: &Diagnostic| {
            d.location
                .as_ref()
                .map(|l| (l.path.clone(), l.line, l.column))
        };
        key(a).cmp(&key(b)).then_with(|| a.message.cmp(&b.message))
    });
    tracing::debug!(count = diagnostics.len(), "collected errors");
    diagnostics
}
