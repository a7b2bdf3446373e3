//! Sharded string interner.
//!
//! Names are handed out from 16 shards, each behind its own `RwLock`, so the
//! parallel load phase can intern declaration names without contending on
//! the compilation lock.

use super::Name;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHasher};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Shard {
    map: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

/// Error when interning a string fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InternError {
    #[error("interner shard {shard} is full ({count} strings, max {max})", max = Name::MAX_LOCAL)]
    ShardOverflow { shard: usize, count: usize },
}

/// Sharded string interner for concurrent access.
pub struct StringInterner {
    shards: [RwLock<Shard>; Name::NUM_SHARDS],
    total: AtomicUsize,
}

impl StringInterner {
    pub fn new() -> Self {
        let shards: [RwLock<Shard>; Name::NUM_SHARDS] = std::array::from_fn(|_| RwLock::default());
        {
            let mut zero = shards[0].write();
            zero.map.insert("", 0);
            zero.strings.push("");
        }
        StringInterner {
            shards,
            total: AtomicUsize::new(1),
        }
    }

    #[inline]
    fn shard_for(s: &str) -> usize {
        if s.is_empty() {
            return 0;
        }
        let mut hasher = FxHasher::default();
        s.hash(&mut hasher);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "reduced modulo NUM_SHARDS"
        )]
        let shard = (hasher.finish() % Name::NUM_SHARDS as u64) as usize;
        shard
    }

    /// Intern `s`, or report that its shard is full.
    pub fn try_intern(&self, s: &str) -> Result<Name, InternError> {
        let shard_idx = Self::shard_for(s);
        if let Some(name) = self.find_in(shard_idx, s) {
            return Ok(name);
        }

        let mut shard = self.shards[shard_idx].write();
        if let Some(&local) = shard.map.get(s) {
            return Ok(Self::name(shard_idx, local));
        }
        let count = shard.strings.len();
        let local = u32::try_from(count)
            .ok()
            .filter(|local| *local <= Name::MAX_LOCAL)
            .ok_or(InternError::ShardOverflow {
                shard: shard_idx,
                count,
            })?;
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        shard.strings.push(leaked);
        shard.map.insert(leaked, local);
        self.total.fetch_add(1, Ordering::Relaxed);
        Ok(Self::name(shard_idx, local))
    }

    /// Intern `s`.
    ///
    /// # Panics
    /// Panics if a shard exceeds `Name::MAX_LOCAL` strings.
    #[inline]
    pub fn intern(&self, s: &str) -> Name {
        self.try_intern(s).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Intern the result of formatting `args`.
    pub fn intern_fmt(&self, args: std::fmt::Arguments<'_>) -> Name {
        match args.as_str() {
            Some(s) => self.intern(s),
            None => self.intern(&args.to_string()),
        }
    }

    /// Look up `s` without interning it.
    pub fn find(&self, s: &str) -> Option<Name> {
        self.find_in(Self::shard_for(s), s)
    }

    fn find_in(&self, shard_idx: usize, s: &str) -> Option<Name> {
        let shard = self.shards[shard_idx].read();
        shard.map.get(s).map(|&local| Self::name(shard_idx, local))
    }

    #[inline]
    fn name(shard_idx: usize, local: u32) -> Name {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "shard index is bounded by NUM_SHARDS"
        )]
        let shard = shard_idx as u32;
        Name::new(shard, local)
    }

    /// The string behind `name`.
    ///
    /// Strings are leaked on interning, so the reference outlives the lock.
    pub fn lookup(&self, name: Name) -> &'static str {
        let shard = self.shards[name.shard()].read();
        shard.strings.get(name.local()).copied().unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// True if only the empty string is interned.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StringInterner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringInterner")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Cheaply clonable handle to a `StringInterner`.
#[derive(Clone, Debug, Default)]
pub struct SharedInterner(Arc<StringInterner>);

impl SharedInterner {
    pub fn new() -> Self {
        SharedInterner(Arc::new(StringInterner::new()))
    }
}

impl std::ops::Deref for SharedInterner {
    type Target = StringInterner;

    fn deref(&self) -> &StringInterner {
        &self.0
    }
}
