//! Content hashes for change detection.

use rustc_hash::FxHasher;
use std::hash::Hasher;

/// A 64-bit content hash.
///
/// Lowered IR stores hashes split into two `u32` words (`lo`, `hi`) so they
/// fit the `extra` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentHash(u64);

impl ContentHash {
    pub const ZERO: ContentHash = ContentHash(0);

    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Hash raw bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = SourceHasher::new();
        hasher.write_bytes(bytes);
        hasher.finish()
    }

    /// Mix another hash into this one. Order matters.
    #[must_use]
    pub fn combine(self, other: ContentHash) -> Self {
        let mut hasher = SourceHasher::new();
        hasher.write_u64(self.0);
        hasher.write_u64(other.0);
        hasher.finish()
    }

    #[must_use]
    pub const fn to_words(self) -> [u32; 2] {
        #[expect(clippy::cast_possible_truncation, reason = "splitting into words")]
        let lo = self.0 as u32;
        #[expect(clippy::cast_possible_truncation, reason = "splitting into words")]
        let hi = (self.0 >> 32) as u32;
        [lo, hi]
    }

    #[must_use]
    pub const fn from_words(lo: u32, hi: u32) -> Self {
        Self(((hi as u64) << 32) | lo as u64)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        u64::from_str_radix(s, 16).ok().map(Self)
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Incremental hasher used by lowering to hash declaration tokens.
///
/// Each `write_*` call is length-delimited so `"ab" + "c"` and `"a" + "bc"`
/// hash differently.
#[derive(Default, Clone)]
pub struct SourceHasher {
    inner: FxHasher,
}

impl SourceHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.inner.write_usize(bytes.len());
        self.inner.write(bytes);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.inner.write_u32(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.inner.write_u64(value);
    }

    #[must_use]
    pub fn finish(&self) -> ContentHash {
        ContentHash(self.inner.finish())
    }
}

impl std::fmt::Debug for SourceHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SourceHasher").field(&self.finish()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn words_round_trip() {
        let hash = ContentHash::new(0x0123_4567_89ab_cdef);
        let [lo, hi] = hash.to_words();
        assert_eq!(lo, 0x89ab_cdef);
        assert_eq!(hi, 0x0123_4567);
        assert_eq!(ContentHash::from_words(lo, hi), hash);
    }

    #[test]
    fn writes_are_length_delimited() {
        let mut a = SourceHasher::new();
        a.write_str("ab");
        a.write_str("c");
        let mut b = SourceHasher::new();
        b.write_str("a");
        b.write_str("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn hex_round_trip() {
        let hash = ContentHash::of_bytes(b"const A = 1;");
        assert_eq!(ContentHash::from_hex(&hash.to_hex()), Some(hash));
        assert_eq!(ContentHash::from_hex("not hex"), None);
    }
}
