//! Diagnostics for the Kiln compiler.
//!
//! Analysis records failures as [`ErrorMsg`]s anchored at a [`LazySrcLoc`]:
//! a tracked instruction plus a relative offset. Nothing is resolved to a
//! file, line and column until errors are collected, so recording an error
//! never needs the syntax tree to be loaded. Collection turns each `ErrorMsg`
//! into a rendered [`Diagnostic`].

mod diagnostic;
mod error_code;
mod error_msg;
pub mod span_utils;
mod src_loc;

pub use diagnostic::{Diagnostic, Label, Severity, SourceLocation};
pub use error_code::ErrorCode;
pub use error_msg::ErrorMsg;
pub use src_loc::{LazySrcLoc, SrcBase, SrcOffset};
