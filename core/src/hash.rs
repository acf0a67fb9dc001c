//! Stable hashing primitives for content-addressed caches.
//!
//! Cache keys must be identical across runs and platforms, so nothing here
//! goes through `std::hash::Hasher` (whose `DefaultHasher` is randomly seeded
//! and allowed to change between Rust releases). Strings and bytes are hashed
//! with xxh3, and keys are built by folding field hashes with
//! [`hash_combine`] in a fixed order.

use xxhash_rust::xxh3::xxh3_64;

/// 64-bit golden ratio constant used by [`hash_combine`].
pub const GOLDEN_RATIO: u64 = 0x9e37_79b9_7f4a_7c15;

/// Mix `value` into `seed`.
///
/// Order-sensitive: `hash_combine(hash_combine(s, a), b)` and
/// `hash_combine(hash_combine(s, b), a)` differ for `a != b`.
#[inline]
pub fn hash_combine(seed: u64, value: u64) -> u64 {
    seed ^ value
        .wrapping_add(GOLDEN_RATIO)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

/// Hash a string's UTF-8 bytes.
#[inline]
pub fn hash_str(value: &str) -> u64 {
    xxh3_64(value.as_bytes())
}

/// Hash an arbitrary byte buffer (shader bytecode, file contents).
#[inline]
pub fn content_hash(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

/// Builder that folds fields into a running key with [`hash_combine`].
///
/// ```
/// use kiln_core::hash::KeyHasher;
///
/// let a = KeyHasher::new().str("m1").str("forward").finish();
/// let b = KeyHasher::new().str("forward").str("m1").finish();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyHasher {
    state: u64,
}

impl KeyHasher {
    /// Start a new key with a zero seed.
    pub fn new() -> Self {
        Self { state: 0 }
    }

    /// Start a new key from an explicit seed (e.g. an entry count).
    pub fn with_seed(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Fold a string field.
    pub fn str(mut self, value: &str) -> Self {
        self.state = hash_combine(self.state, hash_str(value));
        self
    }

    /// Fold an integer field.
    pub fn u64(mut self, value: u64) -> Self {
        self.state = hash_combine(self.state, value);
        self
    }

    /// Fold an optional string; `None` folds the same as an empty string.
    pub fn opt_str(self, value: Option<&str>) -> Self {
        self.str(value.unwrap_or(""))
    }

    /// Current key value.
    pub fn finish(self) -> u64 {
        self.state
    }
}
