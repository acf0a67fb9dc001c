use std::collections::HashMap;
use std::sync::Arc;

use kiln_core::hash::KeyHasher;
use parking_lot::RwLock;

use super::{BindingLayoutSpec, NativeLayoutDescriptor};
use crate::backend::{GpuBackend, GpuBindingLayout};
use crate::error::{MaterialError, Result};

/// Order-sensitive hash of a layout spec.
pub fn hash_layout(spec: &BindingLayoutSpec) -> u64 {
    let mut seed = spec.bindings.len() as u64;
    for binding in &spec.bindings {
        seed = KeyHasher::with_seed(seed)
            .str(&binding.name)
            .u64(binding.kind.tag())
            .u64(binding.slot.map_or(u64::MAX, u64::from))
            .u64(u64::from(binding.stages.bits()))
            .finish();
    }
    seed
}

struct Entry {
    spec: BindingLayoutSpec,
    layout: Arc<GpuBindingLayout>,
}

/// Realized binding layouts keyed by [`hash_layout`].
#[derive(Default)]
pub struct LayoutCache {
    entries: RwLock<HashMap<u64, Entry>>,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the layout for `spec`, realizing it through `backend` on a miss.
    ///
    /// Two different specs hashing to the same key is fatal.
    pub fn get_or_create(
        &self,
        spec: &BindingLayoutSpec,
        backend: &dyn GpuBackend,
    ) -> Result<Arc<GpuBindingLayout>> {
        let hash = hash_layout(spec);

        if let Some(entry) = self.entries.read().get(&hash) {
            return Self::checked(hash, entry, spec);
        }

        let descriptor = NativeLayoutDescriptor::from_spec(spec).inspect_err(|e| log::error!("{e}"))?;
        let layout = Arc::new(backend.create_binding_layout(&descriptor)?);

        let mut entries = self.entries.write();
        // Another thread may have realized the same layout meanwhile.
        if let Some(entry) = entries.get(&hash) {
            return Self::checked(hash, entry, spec);
        }
        log::debug!(
            "Created binding layout {:#018x}: {} binding(s), {} word(s)",
            hash,
            spec.len(),
            descriptor.size_in_words
        );
        entries.insert(
            hash,
            Entry {
                spec: spec.clone(),
                layout: layout.clone(),
            },
        );
        Ok(layout)
    }

    fn checked(hash: u64, entry: &Entry, spec: &BindingLayoutSpec) -> Result<Arc<GpuBindingLayout>> {
        if entry.spec != *spec {
            let error = MaterialError::LayoutCollision { hash };
            log::error!("{error}");
            return Err(error);
        }
        Ok(entry.layout.clone())
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
}
