use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::{CompiledPipeline, PipelineHash};
use crate::error::{MaterialError, Result};

/// Counters of a [`PipelineCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub refreshes: u64,
}

/// Compiled pipelines keyed by [`PipelineHash`].
///
/// Every entry remembers the material, pass and render pass it was built
/// for. Storing under an occupied hash replaces the entry when it comes
/// from the same origin (a rebuild) and is a fatal collision otherwise.
#[derive(Default)]
pub struct PipelineCache {
    entries: RwLock<HashMap<PipelineHash, Arc<CompiledPipeline>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached pipeline for `hash`.
    pub fn get(&self, hash: PipelineHash) -> Option<Arc<CompiledPipeline>> {
        let found = self.entries.read().get(&hash).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Insert `pipeline` under its hash.
    pub fn store(&self, pipeline: CompiledPipeline) -> Result<Arc<CompiledPipeline>> {
        let hash = pipeline.hash;
        if !hash.is_valid() {
            let error = MaterialError::InvalidPipelineHash {
                material: pipeline.material_id.clone(),
                pass: pipeline.pass_label().to_string(),
            };
            log::error!("{error}");
            return Err(error);
        }

        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&hash) {
            if !existing.same_origin(&pipeline) {
                let error = MaterialError::HashCollision {
                    hash: hash.value(),
                    existing_material: existing.material_id.clone(),
                    existing_pass: existing.pass_label().to_string(),
                    material: pipeline.material_id.clone(),
                    pass: pipeline.pass_label().to_string(),
                };
                log::error!("{error}");
                return Err(error);
            }
            self.refreshes.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "Refreshing pipeline {} for '{}' pass '{}'",
                hash,
                pipeline.material_id,
                pipeline.pass_label()
            );
        }

        let pipeline = Arc::new(pipeline);
        entries.insert(hash, pipeline.clone());
        Ok(pipeline)
    }

    /// Drop every pipeline built for `material_id`. Returns how many were dropped.
    pub fn invalidate_by_material(&self, material_id: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, pipeline| pipeline.material_id != material_id);
        let dropped = before - entries.len();
        if dropped > 0 {
            log::debug!("Invalidated {} pipeline(s) of material '{}'", dropped, material_id);
        }
        dropped
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PipelineCacheStats {
        PipelineCacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GpuBindingLayout, GpuPipeline};
    use crate::layout::BindingLayoutSpec;

    fn compiled(hash: u64, material: &str, pass: Option<&str>, id: u64) -> CompiledPipeline {
        CompiledPipeline {
            hash: PipelineHash(hash),
            pipeline: GpuPipeline::Dummy {
                id,
                label: material.to_string(),
                compute: false,
            },
            layout: Arc::new(GpuBindingLayout::Dummy {
                id: 0,
                size_in_words: 0,
            }),
            spec: BindingLayoutSpec::default(),
            material_id: material.into(),
            pass_name: pass.map(str::to_string),
            render_pass: "main".into(),
        }
    }

    fn pipeline_id(pipeline: &CompiledPipeline) -> u64 {
        match pipeline.pipeline {
            GpuPipeline::Dummy { id, .. } => id,
            GpuPipeline::Native(_) => unreachable!(),
        }
    }

    #[test]
    fn test_store_and_get() {
        let cache = PipelineCache::new();
        assert!(cache.get(PipelineHash(7)).is_none());
        cache.store(compiled(7, "m1", Some("forward"), 1)).unwrap();

        let hit = cache.get(PipelineHash(7)).unwrap();
        assert_eq!(hit.material_id, "m1");
        assert_eq!(
            cache.stats(),
            PipelineCacheStats {
                entries: 1,
                hits: 1,
                misses: 1,
                refreshes: 0
            }
        );
    }

    #[test]
    fn test_same_origin_refreshes() {
        let cache = PipelineCache::new();
        cache.store(compiled(7, "m1", Some("forward"), 1)).unwrap();
        cache.store(compiled(7, "m1", Some("forward"), 2)).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(pipeline_id(&cache.get(PipelineHash(7)).unwrap()), 2);
        assert_eq!(cache.stats().refreshes, 1);
    }

    #[test]
    fn test_different_origin_collides() {
        let cache = PipelineCache::new();
        cache.store(compiled(7, "m1", Some("forward"), 1)).unwrap();

        let error = cache.store(compiled(7, "m2", Some("forward"), 2)).unwrap_err();
        assert!(matches!(error, MaterialError::HashCollision { hash: 7, .. }));
        assert!(error.is_fatal());
        assert_eq!(pipeline_id(&cache.get(PipelineHash(7)).unwrap()), 1);

        let error = cache.store(compiled(7, "m1", Some("shadow"), 3)).unwrap_err();
        assert!(matches!(error, MaterialError::HashCollision { .. }));
    }

    #[test]
    fn test_invalid_hash_rejected() {
        let cache = PipelineCache::new();
        let error = cache.store(compiled(0, "m1", None, 1)).unwrap_err();
        assert!(matches!(error, MaterialError::InvalidPipelineHash { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_by_material() {
        let cache = PipelineCache::new();
        cache.store(compiled(1, "m1", Some("forward"), 1)).unwrap();
        cache.store(compiled(2, "m1", Some("shadow"), 2)).unwrap();
        cache.store(compiled(3, "m2", None, 3)).unwrap();

        assert_eq!(cache.invalidate_by_material("m1"), 2);
        assert_eq!(cache.invalidate_by_material("m1"), 0);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
