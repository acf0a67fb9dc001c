use kiln_core::profiling::profile_function;

use super::{CompiledPipeline, PipelineDescriptor, RenderPassConfig, compute_pipeline_hash};
use crate::backend::GpuBackend;
use crate::definition::{MaterialDefinition, MaterialPass};
use crate::error::{MaterialError, Result};
use crate::layout::{BindingLayoutBuilder, LayoutCache};
use crate::shader::{ReflectionCache, ShaderCompiler, ShaderReflector, ShaderStage};
use crate::state::{StateRegistry, VertexFormat};

/// Builds pipelines for material passes.
///
/// The builder borrows everything it needs; it owns no state of its own.
pub struct PipelineBuilder<'a> {
    pub compiler: &'a dyn ShaderCompiler,
    pub reflector: &'a dyn ShaderReflector,
    pub backend: &'a dyn GpuBackend,
    pub states: &'a StateRegistry,
    pub reflection_cache: &'a ReflectionCache,
    pub layout_cache: &'a LayoutCache,
}

impl PipelineBuilder<'_> {
    /// Build the pipeline of `material`'s pass `pass_name` for `render_pass`.
    ///
    /// Errors are logged before being returned. Nothing is cached here except
    /// reflection results and binding layouts.
    pub fn build(
        &self,
        material: &MaterialDefinition,
        pass_name: Option<&str>,
        render_pass: &RenderPassConfig,
    ) -> Result<CompiledPipeline> {
        profile_function!();
        self.build_inner(material, pass_name, render_pass)
            .inspect_err(|error| log::error!("Pipeline build failed: {error}"))
    }

    fn build_inner(
        &self,
        material: &MaterialDefinition,
        pass_name: Option<&str>,
        render_pass: &RenderPassConfig,
    ) -> Result<CompiledPipeline> {
        let pass = material.resolve_pass(pass_name)?;
        check_stages(material, pass)?;
        let compute = pass.is_compute();
        let referrer = format!("material '{}' pass '{}'", material.id, pass.label());

        let rasterizer = lookup(&pass.states.rasterizer, "rasterizer", &referrer, |id| {
            self.states.rasterizer(id)
        })?;
        let depth_stencil = lookup(&pass.states.depth_stencil, "depthStencil", &referrer, |id| {
            self.states.depth_stencil(id)
        })?;
        let blend = lookup(&pass.states.blend, "blend", &referrer, |id| self.states.blend(id))?;

        // The material's own render-target block overrides the render pass formats.
        let render_target = match &pass.states.render_target {
            Some(_) => lookup(&pass.states.render_target, "renderTarget", &referrer, |id| {
                self.states.render_target(id)
            })?,
            None => render_pass.target_state(),
        };

        let mut stages = Vec::with_capacity(pass.shaders.len());
        let mut layout_builder = BindingLayoutBuilder::new();
        for shader in &pass.shaders {
            let bytecode = self
                .compiler
                .compile(
                    &shader.file_path,
                    &shader.entry_point,
                    &shader.target_profile,
                    &shader.defines,
                )
                .map_err(|message| MaterialError::ShaderCompilation {
                    material: material.id.clone(),
                    pass: pass.label().to_string(),
                    stage: shader.stage.name().to_string(),
                    message,
                })?;

            let bindings =
                self.reflection_cache
                    .get_or_reflect(&bytecode, &shader.identity(), self.reflector)?;
            layout_builder.add(bindings.iter())?;
            stages.push(bytecode);
        }
        layout_builder.add(&pass.bindings)?;
        let spec = layout_builder.build();
        let layout = self.layout_cache.get_or_create(&spec, self.backend)?;

        let vertex_format = if compute {
            None
        } else {
            Some(self.vertex_format(material)?)
        };

        let descriptor = PipelineDescriptor {
            label: format!("{}/{}@{}", material.id, pass.label(), render_pass.name),
            stages,
            layout: layout.as_ref(),
            rasterizer,
            depth_stencil,
            blend,
            render_target,
            vertex_format,
            topology: pass.topology,
        };
        let pipeline = self.backend.create_pipeline(&descriptor)?;
        log::debug!(
            "Built {} pipeline '{}' with {} binding(s)",
            if compute { "compute" } else { "graphics" },
            descriptor.label,
            spec.len()
        );

        Ok(CompiledPipeline {
            hash: compute_pipeline_hash(material, pass_name, &render_pass.name),
            pipeline,
            layout,
            spec,
            material_id: material.id.clone(),
            pass_name: pass.name.clone(),
            render_pass: render_pass.name.clone(),
        })
    }

    fn vertex_format(&self, material: &MaterialDefinition) -> Result<VertexFormat> {
        match &material.vertex_format_id {
            None => Ok(VertexFormat::fallback()),
            Some(id) => self.states.vertex_format(id).cloned().ok_or_else(|| {
                MaterialError::MissingStateBlock {
                    category: "vertexFormat".into(),
                    id: id.clone(),
                    referrer: format!("material '{}'", material.id),
                }
            }),
        }
    }
}

/// Graphics passes need a vertex stage; compute passes must be compute only.
fn check_stages(material: &MaterialDefinition, pass: &MaterialPass) -> Result<()> {
    let has_compute = pass.shader(ShaderStage::Compute).is_some();
    if has_compute && pass.shaders.len() > 1 {
        return Err(MaterialError::MixedComputeStages {
            material: material.id.clone(),
            pass: pass.label().to_string(),
        });
    }
    if !has_compute && pass.shader(ShaderStage::Vertex).is_none() {
        return Err(MaterialError::MissingVertexShader {
            material: material.id.clone(),
            pass: pass.label().to_string(),
        });
    }
    Ok(())
}

/// Resolve an optional state reference; `None` gives the category default.
fn lookup<'s, T: Clone + Default + 's>(
    id: &Option<String>,
    category: &str,
    referrer: &str,
    find: impl Fn(&str) -> Option<&'s T>,
) -> Result<T> {
    match id {
        None => Ok(T::default()),
        Some(id) => find(id).cloned().ok_or_else(|| MaterialError::MissingStateBlock {
            category: category.to_string(),
            id: id.clone(),
            referrer: referrer.to_string(),
        }),
    }
}
