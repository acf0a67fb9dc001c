//! GPU backend abstraction.
//!
//! The material system never talks to a graphics API directly. Binding
//! layouts and pipelines are realized through a [`GpuBackend`], and bound
//! through a [`PassEncoder`] supplied by the caller at draw time.
//!
//! # Available Backends
//!
//! - [`DummyBackend`]: no GPU objects, counts creations; used by tests and
//!   the command-line tool.
//! - Embedders implement [`GpuBackend`] and return [`GpuPipeline::Native`] /
//!   [`GpuBindingLayout::Native`] handles wrapping their API objects.

mod dummy;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::layout::NativeLayoutDescriptor;
use crate::pipeline::PipelineDescriptor;

pub use dummy::DummyBackend;

/// Handle to a realized binding layout.
#[derive(Clone)]
pub enum GpuBindingLayout {
    /// Dummy backend layout.
    Dummy { id: u64, size_in_words: u32 },
    /// Backend-specific object.
    Native(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for GpuBindingLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dummy { id, size_in_words } => f
                .debug_struct("GpuBindingLayout::Dummy")
                .field("id", id)
                .field("size_in_words", size_in_words)
                .finish(),
            Self::Native(_) => f.debug_tuple("GpuBindingLayout::Native").finish_non_exhaustive(),
        }
    }
}

/// Handle to a realized pipeline state object.
#[derive(Clone)]
pub enum GpuPipeline {
    /// Dummy backend pipeline.
    Dummy { id: u64, label: String, compute: bool },
    /// Backend-specific object.
    Native(Arc<dyn Any + Send + Sync>),
}

impl GpuPipeline {
    /// Downcast a native handle to the backend's concrete type.
    pub fn native<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Self::Native(object) => object.downcast_ref(),
            Self::Dummy { .. } => None,
        }
    }
}

impl fmt::Debug for GpuPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dummy { id, label, compute } => f
                .debug_struct("GpuPipeline::Dummy")
                .field("id", id)
                .field("label", label)
                .field("compute", compute)
                .finish(),
            Self::Native(_) => f.debug_tuple("GpuPipeline::Native").finish_non_exhaustive(),
        }
    }
}

/// Creates GPU objects for the material system.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Realize a binding layout.
    fn create_binding_layout(&self, descriptor: &NativeLayoutDescriptor) -> Result<GpuBindingLayout>;

    /// Create a graphics or compute pipeline.
    fn create_pipeline(&self, descriptor: &PipelineDescriptor<'_>) -> Result<GpuPipeline>;
}

/// Command recording target for one pass.
pub trait PassEncoder {
    fn set_pipeline(&mut self, pipeline: &GpuPipeline);
    fn set_binding_layout(&mut self, layout: &GpuBindingLayout);
}
