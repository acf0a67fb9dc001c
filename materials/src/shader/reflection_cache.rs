//! Reflection results keyed by bytecode content.
//!
//! Entries are keyed by a content hash of the bytecode, never by shader
//! identity, so two shaders that compile to identical bytes share one
//! entry. Identities are tracked separately (identity → hash and
//! hash → identities) only so that a hot-reloaded shader can drop its entry
//! without evicting one still used by another shader.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use kiln_core::hash::content_hash;
use parking_lot::RwLock;

use super::{ResourceBinding, ShaderBytecode, ShaderReflector};
use crate::error::{MaterialError, Result};

/// Hit/miss counters of a [`ReflectionCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReflectionStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<u64, Arc<[ResourceBinding]>>,
    identities_by_hash: HashMap<u64, HashSet<String>>,
    hash_by_identity: HashMap<String, u64>,
}

impl Inner {
    /// Point `identity` at `hash`, detaching it from any previous hash.
    fn bind_identity(&mut self, identity: &str, hash: u64) {
        if let Some(previous) = self.hash_by_identity.insert(identity.to_string(), hash) {
            if previous != hash {
                self.detach(identity, previous);
            }
        }
        self.identities_by_hash
            .entry(hash)
            .or_default()
            .insert(identity.to_string());
    }

    /// Remove `identity` from `hash`; drop the entry if nobody else maps to it.
    fn detach(&mut self, identity: &str, hash: u64) -> bool {
        let orphaned = match self.identities_by_hash.get_mut(&hash) {
            Some(identities) => {
                identities.remove(identity);
                identities.is_empty()
            }
            None => true,
        };
        if orphaned {
            self.identities_by_hash.remove(&hash);
            self.entries.remove(&hash).is_some()
        } else {
            false
        }
    }
}

/// Thread-safe cache of reflected bindings.
///
/// Lookups take a read lock; population and invalidation take the write
/// lock. Reflection itself runs outside the lock.
#[derive(Default)]
pub struct ReflectionCache {
    inner: RwLock<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ReflectionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the bindings of `bytecode`, reflecting it on a miss.
    ///
    /// `identity` names the shader the bytecode came from (source file,
    /// entry point, profile and defines). Reflection failures are returned
    /// and not cached.
    pub fn get_or_reflect(
        &self,
        bytecode: &ShaderBytecode,
        identity: &str,
        reflector: &dyn ShaderReflector,
    ) -> Result<Arc<[ResourceBinding]>> {
        let hash = content_hash(&bytecode.bytes);

        {
            let inner = self.inner.read();
            if inner.hash_by_identity.get(identity) == Some(&hash) {
                if let Some(bindings) = inner.entries.get(&hash) {
                    return Ok(self.hit(bindings.clone(), identity, hash));
                }
            }
        }

        // Entry lookup and identity binding share one write lock.
        {
            let mut inner = self.inner.write();
            if let Some(bindings) = inner.entries.get(&hash).cloned() {
                inner.bind_identity(identity, hash);
                drop(inner);
                return Ok(self.hit(bindings, identity, hash));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let reflected: Arc<[ResourceBinding]> = reflector
            .reflect(bytecode)
            .map_err(|message| {
                log::error!("Reflection failed for '{}': {}", identity, message);
                MaterialError::Reflection {
                    identity: identity.to_string(),
                    message,
                }
            })?
            .into();

        let mut inner = self.inner.write();
        let bindings = inner.entries.entry(hash).or_insert(reflected).clone();
        inner.bind_identity(identity, hash);
        log::debug!(
            "Reflected '{}': {} binding(s) ({:#018x})",
            identity,
            bindings.len(),
            hash
        );
        Ok(bindings)
    }

    fn hit(&self, bindings: Arc<[ResourceBinding]>, identity: &str, hash: u64) -> Arc<[ResourceBinding]> {
        self.hits.fetch_add(1, Ordering::Relaxed);
        log::trace!("Reflection cache hit for '{}' ({:#018x})", identity, hash);
        bindings
    }

    /// Forget `identity`. Its entry is dropped only if no other identity
    /// maps to the same bytecode hash. Returns whether an entry was dropped.
    pub fn invalidate(&self, identity: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(hash) = inner.hash_by_identity.remove(identity) else {
            return false;
        };
        let dropped = inner.detach(identity, hash);
        log::debug!(
            "Invalidated reflection for '{}' (entry {})",
            identity,
            if dropped { "dropped" } else { "still shared" }
        );
        dropped
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.identities_by_hash.clear();
        inner.hash_by_identity.clear();
    }

    /// Number of distinct bytecode entries.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `identity` currently maps to a cached entry.
    pub fn contains_identity(&self, identity: &str) -> bool {
        self.inner.read().hash_by_identity.contains_key(identity)
    }

    /// Every tracked identity maps to a live entry.
    #[cfg(test)]
    fn identities_resolve(&self) -> bool {
        let inner = self.inner.read();
        inner
            .hash_by_identity
            .values()
            .all(|hash| inner.entries.contains_key(hash))
    }

    /// Entry count and hit/miss counters.
    pub fn stats(&self) -> ReflectionStats {
        ReflectionStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
