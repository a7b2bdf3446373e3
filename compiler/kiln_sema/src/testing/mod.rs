//! Test doubles for the incremental core.
//!
//! - **mocks**: a line-based front-end, a constant-folding analyzer and a
//!   backend that records what it was asked to emit

pub mod mocks;

pub use mocks::{
    lower_lines, main_decls, BackendEvent, BackendLog, ConstAnalyzer, LineLowerer, RecordingBackend,
};

#[cfg(test)]
pub(crate) mod fixture;
