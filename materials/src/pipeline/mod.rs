//! Pipeline compilation and caching.
//!
//! [`PipelineBuilder`] turns one material pass plus a [`RenderPassConfig`]
//! into a backend pipeline: shaders are compiled, reflected through the
//! reflection cache, merged into a binding layout and combined with the
//! referenced state blocks. Results are cached in a [`PipelineCache`] under
//! [`compute_pipeline_hash`].

mod builder;
mod cache;
mod key;
mod render_pass;

use std::sync::Arc;

use crate::backend::{GpuBindingLayout, GpuPipeline};
use crate::definition::PrimitiveTopology;
use crate::layout::BindingLayoutSpec;
use crate::shader::{ShaderBytecode, ShaderStage};
use crate::state::{BlendState, DepthStencilState, RasterizerState, RenderTargetState, VertexFormat};

pub use builder::PipelineBuilder;
pub use cache::{PipelineCache, PipelineCacheStats};
pub use key::{PipelineHash, compute_pipeline_hash};
pub use render_pass::RenderPassConfig;

/// Everything a backend needs to create a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineDescriptor<'a> {
    /// `material/pass@render_pass`, for debugging.
    pub label: String,
    /// One module per declared stage.
    pub stages: Vec<ShaderBytecode>,
    pub layout: &'a GpuBindingLayout,
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    pub blend: BlendState,
    pub render_target: RenderTargetState,
    /// Input layout; `None` for compute pipelines.
    pub vertex_format: Option<VertexFormat>,
    pub topology: PrimitiveTopology,
}

impl PipelineDescriptor<'_> {
    pub fn is_compute(&self) -> bool {
        !self.stages.is_empty() && self.stages.iter().all(|s| s.stage == ShaderStage::Compute)
    }

    pub fn stage(&self, stage: ShaderStage) -> Option<&ShaderBytecode> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

/// A cached pipeline together with its layout and origin.
#[derive(Debug, Clone)]
pub struct CompiledPipeline {
    pub hash: PipelineHash,
    pub pipeline: GpuPipeline,
    pub layout: Arc<GpuBindingLayout>,
    pub spec: BindingLayoutSpec,
    pub material_id: String,
    pub pass_name: Option<String>,
    pub render_pass: String,
}

impl CompiledPipeline {
    pub fn pass_label(&self) -> &str {
        self.pass_name.as_deref().unwrap_or("<default>")
    }

    /// Whether `other` was built for the same material, pass and render pass.
    pub fn same_origin(&self, other: &CompiledPipeline) -> bool {
        self.material_id == other.material_id
            && self.pass_name == other.pass_name
            && self.render_pass == other.render_pass
    }
}
