//! Dummy GPU backend for testing and tooling.
//!
//! No GPU objects are created; every call hands out a fresh id and bumps a
//! counter so tests can observe how often the caches reach the backend.

use std::sync::atomic::{AtomicU64, Ordering};

use super::{GpuBackend, GpuBindingLayout, GpuPipeline};
use crate::error::Result;
use crate::layout::NativeLayoutDescriptor;
use crate::pipeline::PipelineDescriptor;

/// Dummy GPU backend.
#[derive(Debug, Default)]
pub struct DummyBackend {
    next_id: AtomicU64,
    layouts: AtomicU64,
    pipelines: AtomicU64,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of binding layouts created so far.
    pub fn layouts_created(&self) -> u64 {
        self.layouts.load(Ordering::Relaxed)
    }

    /// Number of pipelines created so far.
    pub fn pipelines_created(&self) -> u64 {
        self.pipelines.load(Ordering::Relaxed)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_binding_layout(&self, descriptor: &NativeLayoutDescriptor) -> Result<GpuBindingLayout> {
        self.layouts.fetch_add(1, Ordering::Relaxed);
        let id = self.next_id();
        log::trace!(
            "DummyBackend: creating binding layout #{} ({} parameter(s), {} word(s))",
            id,
            descriptor.parameters.len(),
            descriptor.size_in_words
        );
        Ok(GpuBindingLayout::Dummy {
            id,
            size_in_words: descriptor.size_in_words,
        })
    }

    fn create_pipeline(&self, descriptor: &PipelineDescriptor<'_>) -> Result<GpuPipeline> {
        self.pipelines.fetch_add(1, Ordering::Relaxed);
        let id = self.next_id();
        log::trace!(
            "DummyBackend: creating {} pipeline #{} '{}' ({} stage(s))",
            if descriptor.is_compute() { "compute" } else { "graphics" },
            id,
            descriptor.label,
            descriptor.stages.len()
        );
        Ok(GpuPipeline::Dummy {
            id,
            label: descriptor.label.clone(),
            compute: descriptor.is_compute(),
        })
    }
}
