//! Loading, parsing and lowering source files.
//!
//! Loading runs on worker threads without the compilation lock: each file
//! is handled by [`load_file`] from a [`LoadInput`] snapshot, and the
//! resulting [`LoadOutcome`] is applied to the file table afterwards.

mod cache;

pub use cache::{CacheEntry, IrCache};

use kiln_ir::cache::FileStat;
use kiln_ir::{FileIndex, LoweredIr, SyntaxTree};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The front-end: turns source text into a syntax tree and lowered IR.
pub trait Lowerer: Send + Sync {
    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError>;

    /// Lower a parsed file. Lowering errors are recorded in the IR.
    fn lower(&self, source: &str, tree: &SyntaxTree) -> LoweredIr;
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub byte_offset: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unable to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("'{}' is not valid UTF-8", path.display())]
    InvalidUtf8 { path: PathBuf },
}

/// What a worker needs to know about a file to load it.
#[derive(Clone, Debug)]
pub(crate) struct LoadInput {
    pub file: FileIndex,
    pub path: PathBuf,
    pub prev_stat: Option<FileStat>,
    pub has_current_ir: bool,
}

#[derive(Debug)]
pub(crate) struct Lowered {
    pub stat: FileStat,
    pub ir: Arc<LoweredIr>,
    /// Absent on a cache hit; loaded again on demand.
    pub source: Option<Arc<str>>,
    pub tree: Option<Arc<SyntaxTree>>,
}

#[derive(Debug)]
pub(crate) enum LoadOutcome {
    /// Same stat as last time.
    Unchanged,
    Lowered(Lowered),
    ParseFailed {
        stat: FileStat,
        source: Arc<str>,
        error: ParseError,
    },
    ReadFailed(LoadError),
}

pub(crate) fn read_source(path: &Path) -> Result<Arc<str>, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|_| LoadError::InvalidUtf8 {
        path: path.to_path_buf(),
    })?;
    Ok(Arc::from(text))
}

/// Load one file: skip it if its stat is unchanged, else read its IR from
/// the cache or parse and lower it.
#[tracing::instrument(level = "debug", skip_all, fields(path = %input.path.display()))]
pub(crate) fn load_file(
    input: &LoadInput,
    lowerer: &dyn Lowerer,
    cache: Option<&IrCache>,
) -> LoadOutcome {
    let metadata = match std::fs::metadata(&input.path) {
        Ok(metadata) => metadata,
        Err(source) => {
            return LoadOutcome::ReadFailed(LoadError::Io {
                path: input.path.clone(),
                source,
            })
        }
    };
    let stat = FileStat::from_metadata(&metadata);
    if input.has_current_ir && input.prev_stat == Some(stat) {
        tracing::trace!("stat unchanged");
        return LoadOutcome::Unchanged;
    }

    let mut entry = cache.and_then(|cache| match cache.open(&input.path) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!(error = %e, "unable to open lowered IR cache entry");
            None
        }
    });

    if let Some(entry) = entry.as_mut() {
        if let Some(ir) = entry.read(stat) {
            tracing::debug!("cache hit");
            return LoadOutcome::Lowered(Lowered {
                stat,
                ir: Arc::new(ir),
                source: None,
                tree: None,
            });
        }
        // Another process may regenerate the entry between the unlock and
        // the exclusive lock; check again once we hold it.
        match entry.upgrade() {
            Ok(()) => {
                if let Some(ir) = entry.read(stat) {
                    tracing::debug!("cache hit after upgrade");
                    return LoadOutcome::Lowered(Lowered {
                        stat,
                        ir: Arc::new(ir),
                        source: None,
                        tree: None,
                    });
                }
            }
            Err(e) => tracing::warn!(error = %e, "unable to lock lowered IR cache entry"),
        }
    }

    tracing::debug!("cache miss");
    let source = match read_source(&input.path) {
        Ok(source) => source,
        Err(e) => return LoadOutcome::ReadFailed(e),
    };
    let tree = match lowerer.parse(&source) {
        Ok(tree) => tree,
        Err(error) => {
            return LoadOutcome::ParseFailed {
                stat,
                source,
                error,
            }
        }
    };
    let ir = lowerer.lower(&source, &tree);
    if let Some(entry) = entry.as_mut() {
        if let Err(e) = entry.write(&ir, stat) {
            tracing::warn!(error = %e, "unable to write lowered IR cache entry");
        }
    }
    LoadOutcome::Lowered(Lowered {
        stat,
        ir: Arc::new(ir),
        source: Some(source),
        tree: Some(Arc::new(tree)),
    })
}

#[cfg(test)]
mod tests;
