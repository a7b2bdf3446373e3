//! Compilation options.

use kiln_ir::ContentHash;
use std::path::PathBuf;

/// Options fixed for the lifetime of a `Compilation`.
#[derive(Clone, Debug)]
pub struct CompilationConfig {
    /// Root of the on-disk lowered IR cache. `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    /// Fingerprint of the compiler build and options, mixed into every cache
    /// file name.
    pub compiler_hash: ContentHash,
    /// Analyze tests in the main module.
    pub is_test: bool,
    /// Named tests run only if their qualified name contains one of these.
    /// Unnamed tests always run.
    pub test_filters: Vec<String>,
    /// Track dependencies and re-analyze only what changed. When off, every
    /// update re-analyzes from scratch.
    pub incremental: bool,
    /// Threads for loading and lowering. `None` uses the global pool.
    pub jobs: Option<usize>,
}

impl Default for CompilationConfig {
    fn default() -> Self {
        CompilationConfig {
            cache_dir: None,
            compiler_hash: ContentHash::ZERO,
            is_test: false,
            test_filters: Vec::new(),
            incremental: true,
            jobs: None,
        }
    }
}

impl CompilationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_compiler_hash(mut self, hash: ContentHash) -> Self {
        self.compiler_hash = hash;
        self
    }

    #[must_use]
    pub fn with_tests(mut self, filters: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.is_test = true;
        self.test_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Whether a test with qualified name `fqn` passes the filters.
    pub fn test_matches(&self, fqn: &str, is_named: bool) -> bool {
        if !is_named || self.test_filters.is_empty() {
            return true;
        }
        self.test_filters.iter().any(|filter| fqn.contains(filter.as_str()))
    }
}
