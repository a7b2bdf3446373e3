//! A small Zig-like language for driving the Kiln incremental core.
//!
//! [`FrontEnd`] implements [`Lowerer`] and [`ComptimeAnalyzer`] implements
//! [`Analyzer`](kiln_sema::Analyzer). Together they make a complete
//! compiler front half: files are containers of declarations and fields,
//! declarations are evaluated at compile time, and function bodies are
//! checked against their return types with error sets inferred.
//!
//! ```text
//! const Point = struct { x: i32, y: i32 };
//! const size = @sizeOf(Point);
//! fn check() !void { return error.Unsupported; }
//! export fn run() !void { check(); }
//! test "size" { check(); }
//! ```
//!
//! # Debug Environment Variables
//!
//! - `RUST_LOG=kiln_eval=trace`: every evaluated declaration.

pub mod ast;
mod analyzer;
mod astgen;
pub mod lexer;
pub mod parser;

pub use analyzer::ComptimeAnalyzer;
pub use parser::{parse, SourceFile};

use kiln_ir::lowered::ContainerSpec;
use kiln_ir::{ContainerKind, ContentHash, IrBuilder, LoweredIr, SyntaxTree};
use kiln_sema::{Lowerer, ParseError};

/// Parse and lower `source`.
pub fn lower_source(source: &str) -> Result<LoweredIr, ParseError> {
    parse(source).map(|file| astgen::lower(&file))
}

/// The front-end for [`Compilation`](kiln_sema::Compilation).
#[derive(Copy, Clone, Debug, Default)]
pub struct FrontEnd;

impl Lowerer for FrontEnd {
    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError> {
        parse(source).map(|file| file.tree)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(len = source.len()))]
    fn lower(&self, source: &str, _tree: &SyntaxTree) -> LoweredIr {
        match lower_source(source) {
            Ok(ir) => ir,
            // Only reachable if the source changed between the two calls.
            Err(err) => {
                let mut b = IrBuilder::new();
                b.add_compile_error(&err.message, err.byte_offset);
                b.set_main_struct(&ContainerSpec {
                    kind: ContainerKind::Struct,
                    fields_hash: ContentHash::ZERO,
                    src_node: 0,
                    fields: &[],
                    decls: &[],
                });
                b.finish()
            }
        }
    }
}
