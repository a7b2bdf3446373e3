//! Analysis failure channels and stored failures.

use crate::unit::AnalUnit;
use indexmap::IndexMap;
use kiln_diagnostic::ErrorMsg;
use kiln_ir::{ExportIndex, FileIndex};
use rustc_hash::FxBuildHasher;

/// Analysis of a unit failed and the failure has already been recorded, or
/// a dependency failed. Propagated silently.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, thiserror::Error)]
#[error("analysis failed")]
pub struct AnalysisFail;

pub type SemaResult<T> = Result<T, AnalysisFail>;

/// The analyzer's failure channel.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Fail(#[from] AnalysisFail),
    /// Not a problem with the program; the unit is retried next update.
    #[error("{0}")]
    Unexpected(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Every failure currently on record.
#[derive(Debug, Default)]
pub struct Failures {
    pub files: IndexMap<FileIndex, Vec<ErrorMsg>, FxBuildHasher>,
    pub analysis: IndexMap<AnalUnit, ErrorMsg, FxBuildHasher>,
    pub codegen: IndexMap<AnalUnit, ErrorMsg, FxBuildHasher>,
    pub exports: IndexMap<ExportIndex, ErrorMsg, FxBuildHasher>,
}

impl Failures {
    /// Forget the failures of a unit about to be re-analyzed.
    pub fn clear_unit(&mut self, unit: AnalUnit) {
        self.analysis.shift_remove(&unit);
        self.codegen.shift_remove(&unit);
    }

    pub fn len(&self) -> usize {
        self.files.values().map(Vec::len).sum::<usize>()
            + self.analysis.len()
            + self.codegen.len()
            + self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
