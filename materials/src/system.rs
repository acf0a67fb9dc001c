//! The material system context.
//!
//! A [`MaterialSystem`] owns everything loaded from one root document
//! (materials, render passes, state blocks) and the three caches behind
//! pipeline creation. There is no global state; create as many systems as
//! needed.

use std::collections::HashMap;
use std::sync::Arc;

use kiln_core::profiling::{profile_function, profile_message, profile_scope_dynamic};

use crate::backend::GpuBackend;
use crate::config::{DuplicateIdPolicy, MaterialSystemConfig};
use crate::definition::{
    MaterialDefinition, MaterialPass, ParseContext, RenderPassDefinition, parse_material,
    parse_render_pass,
};
use crate::document::{DocumentLoader, validate_document};
use crate::error::{LoadFailure, MaterialError, Result};
use crate::layout::LayoutCache;
use crate::pipeline::{
    CompiledPipeline, PipelineBuilder, PipelineCache, PipelineCacheStats, RenderPassConfig,
    compute_pipeline_hash,
};
use crate::shader::{ReflectionCache, ReflectionStats, ShaderCompiler, ShaderReflector};
use crate::source::{DocumentSource, path};
use crate::state::{
    BlendState, DepthStencilState, RasterizerState, RenderTargetState, StateRegistry, VertexFormat,
};

/// Opaque index of a loaded material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(u32);

impl MaterialHandle {
    pub const INVALID: Self = Self(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

impl Default for MaterialHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Snapshot of the system's contents and cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub materials: usize,
    pub render_passes: usize,
    pub reflection: ReflectionStats,
    pub layouts: usize,
    pub pipelines: PipelineCacheStats,
}

/// Receives file change notifications.
pub trait HotReloadSink {
    /// React to a change of the source file at `path`. Returns how many
    /// materials were affected.
    fn file_changed(&self, path: &str) -> usize;
}

/// Collect `error`, or drop it with a warning when invalid entries are skipped.
/// Fatal errors are always collected.
fn triage(errors: &mut Vec<MaterialError>, error: MaterialError, what: &str, config: &MaterialSystemConfig) {
    if !error.is_fatal() && config.skip_invalid_materials {
        log::warn!("Skipping {what}: {error}");
    } else {
        errors.push(error);
    }
}

/// `MissingStateBlock` when `id` is set but `exists` does not find it.
fn missing_block(
    category: &str,
    id: &Option<String>,
    referrer: &str,
    exists: impl Fn(&str) -> bool,
) -> Option<MaterialError> {
    let id = id.as_deref()?;
    (!exists(id)).then(|| MaterialError::MissingStateBlock {
        category: category.to_string(),
        id: id.to_string(),
        referrer: referrer.to_string(),
    })
}

/// Everything parsed from one load of the root document.
#[derive(Debug, Default)]
struct Catalog {
    materials: Vec<MaterialDefinition>,
    material_index: HashMap<String, u32>,
    render_passes: Vec<RenderPassDefinition>,
    render_pass_index: HashMap<String, usize>,
    states: StateRegistry,
    /// Shader file path → ids of the materials that use it.
    shader_users: HashMap<String, Vec<String>>,
    files: Vec<String>,
}

impl Catalog {
    fn load(
        source: &dyn DocumentSource,
        root: &str,
        config: &MaterialSystemConfig,
    ) -> std::result::Result<Self, LoadFailure> {
        profile_function!();

        let document = DocumentLoader::new(source).load(root)?;
        let mut errors: Vec<MaterialError> = Vec::new();

        if config.validate_on_load {
            let report = validate_document(&document);
            for error in report.errors {
                match error {
                    MaterialError::Schema(_) => errors.push(error),
                    error => triage(&mut errors, error, "invalid entry", config),
                }
            }
            for duplicate in report.duplicates {
                match config.duplicate_ids {
                    DuplicateIdPolicy::Warn => log::warn!(
                        "Duplicate id '{}' in {}; the first definition is kept",
                        duplicate.id,
                        duplicate.category
                    ),
                    DuplicateIdPolicy::Reject => {
                        let error = MaterialError::from(duplicate);
                        log::error!("{error}");
                        errors.push(error);
                    }
                }
            }
            if !errors.is_empty() {
                return Err(LoadFailure { errors });
            }
        }

        let states = StateRegistry::parse(document.states()).inspect_err(|e| log::error!("{e}"))?;
        let ctx = ParseContext::new(source, config.shader_root.as_str()).with_document(&document);

        let mut catalog = Catalog {
            states,
            files: document.files().to_vec(),
            ..Default::default()
        };

        for json in document.materials() {
            match parse_material(json, &ctx) {
                Ok(material) if !material.enabled => {
                    log::debug!("Material '{}' is disabled", material.id);
                }
                Ok(material) if catalog.material_index.contains_key(&material.id) => {
                    log::warn!("Material '{}' defined twice; keeping the first", material.id);
                }
                Ok(material) => catalog.add_material(material),
                Err(error) => triage(&mut errors, error, "material", config),
            }
        }

        for json in document.render_passes() {
            match parse_render_pass(json) {
                Ok(pass) if catalog.render_pass_index.contains_key(&pass.name) => {
                    log::warn!("Render pass '{}' defined twice; keeping the first", pass.name);
                }
                Ok(pass) => {
                    catalog
                        .render_pass_index
                        .insert(pass.name.clone(), catalog.render_passes.len());
                    catalog.render_passes.push(pass);
                }
                Err(error) => triage(&mut errors, error, "render pass", config),
            }
        }

        for error in catalog.unresolved_references() {
            log::error!("{error}");
            triage(&mut errors, error, "reference", config);
        }

        if !errors.is_empty() {
            return Err(LoadFailure { errors });
        }

        log::info!(
            "Loaded {} material(s), {} render pass(es) and {} state block(s) from {} file(s)",
            catalog.materials.len(),
            catalog.render_passes.len(),
            catalog.states.len(),
            catalog.files.len()
        );
        Ok(catalog)
    }

    /// State blocks and render passes named by materials and render passes
    /// that the document does not define.
    fn unresolved_references(&self) -> Vec<MaterialError> {
        let states = &self.states;
        let mut errors = Vec::new();

        for material in &self.materials {
            let referrer = format!("material '{}'", material.id);
            errors.extend(missing_block("vertexFormat", &material.vertex_format_id, &referrer, |id| {
                states.vertex_format(id).is_some()
            }));

            for pass in &material.passes {
                let referrer = format!("material '{}' pass '{}'", material.id, pass.label());
                let refs = &pass.states;
                errors.extend(
                    [
                        missing_block("rasterizer", &refs.rasterizer, &referrer, |id| {
                            states.rasterizer(id).is_some()
                        }),
                        missing_block("depthStencil", &refs.depth_stencil, &referrer, |id| {
                            states.depth_stencil(id).is_some()
                        }),
                        missing_block("blend", &refs.blend, &referrer, |id| states.blend(id).is_some()),
                        missing_block("renderTarget", &refs.render_target, &referrer, |id| {
                            states.render_target(id).is_some()
                        }),
                    ]
                    .into_iter()
                    .flatten(),
                );

                if let Some(name) = pass.name.as_deref()
                    && !self.render_pass_index.contains_key(name)
                {
                    errors.push(MaterialError::UnknownRenderPass(name.to_string()));
                }
            }
        }

        for pass in &self.render_passes {
            let referrer = format!("render pass '{}'", pass.name);
            errors.extend(missing_block("renderTarget", &pass.render_target, &referrer, |id| {
                states.render_target(id).is_some()
            }));
        }
        errors
    }

    fn add_material(&mut self, material: MaterialDefinition) {
        for pass in &material.passes {
            for shader in &pass.shaders {
                let users = self.shader_users.entry(shader.file_path.clone()).or_default();
                if !users.contains(&material.id) {
                    users.push(material.id.clone());
                }
            }
        }
        let index = self.materials.len() as u32;
        self.material_index.insert(material.id.clone(), index);
        self.materials.push(material);
    }
}

/// Configures and loads a [`MaterialSystem`].
pub struct MaterialSystemBuilder {
    source: Arc<dyn DocumentSource>,
    config: MaterialSystemConfig,
    compiler: Option<Arc<dyn ShaderCompiler>>,
    reflector: Option<Arc<dyn ShaderReflector>>,
    backend: Option<Arc<dyn GpuBackend>>,
}

impl MaterialSystemBuilder {
    pub fn with_config(mut self, config: MaterialSystemConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn ShaderCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn with_reflector(mut self, reflector: Arc<dyn ShaderReflector>) -> Self {
        self.reflector = Some(reflector);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn GpuBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Load `root` and everything it includes.
    pub fn load(self, root: &str) -> std::result::Result<MaterialSystem, LoadFailure> {
        let root = path::normalize(root)?;
        let (compiler, reflector) = self.shader_tools()?;
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(crate::backend::DummyBackend::new()));

        let catalog = Catalog::load(self.source.as_ref(), &root, &self.config)?;
        log::debug!("Material system using backend '{}'", backend.name());

        Ok(MaterialSystem {
            config: self.config,
            source: self.source,
            root,
            compiler,
            reflector,
            backend,
            catalog,
            reflection_cache: ReflectionCache::new(),
            layout_cache: LayoutCache::new(),
            pipeline_cache: PipelineCache::new(),
        })
    }

    #[cfg(feature = "naga-shaders")]
    fn shader_tools(&self) -> Result<(Arc<dyn ShaderCompiler>, Arc<dyn ShaderReflector>)> {
        let compiler = self.compiler.clone().unwrap_or_else(|| {
            Arc::new(crate::shader::NagaShaderCompiler::new(self.source.clone()))
        });
        let reflector = self
            .reflector
            .clone()
            .unwrap_or_else(|| Arc::new(crate::shader::SpirvReflector::new()));
        Ok((compiler, reflector))
    }

    #[cfg(not(feature = "naga-shaders"))]
    fn shader_tools(&self) -> Result<(Arc<dyn ShaderCompiler>, Arc<dyn ShaderReflector>)> {
        match (&self.compiler, &self.reflector) {
            (Some(compiler), Some(reflector)) => Ok((compiler.clone(), reflector.clone())),
            _ => Err(MaterialError::Config(
                "a shader compiler and reflector are required without the naga-shaders feature"
                    .into(),
            )),
        }
    }
}

/// Loaded materials plus the reflection, layout and pipeline caches.
pub struct MaterialSystem {
    config: MaterialSystemConfig,
    source: Arc<dyn DocumentSource>,
    root: String,
    compiler: Arc<dyn ShaderCompiler>,
    reflector: Arc<dyn ShaderReflector>,
    backend: Arc<dyn GpuBackend>,
    catalog: Catalog,
    reflection_cache: ReflectionCache,
    layout_cache: LayoutCache,
    pipeline_cache: PipelineCache,
}

impl MaterialSystem {
    /// Start configuring a system that reads from `source`.
    pub fn builder(source: Arc<dyn DocumentSource>) -> MaterialSystemBuilder {
        MaterialSystemBuilder {
            source,
            config: MaterialSystemConfig::default(),
            compiler: None,
            reflector: None,
            backend: None,
        }
    }

    pub fn config(&self) -> &MaterialSystemConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn DocumentSource> {
        &self.source
    }

    /// Normalized path of the root document.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn backend(&self) -> &dyn GpuBackend {
        self.backend.as_ref()
    }

    /// Document files that made up the last successful load, in merge order.
    pub fn files(&self) -> &[String] {
        &self.catalog.files
    }

    /// Shader files referenced by loaded materials.
    pub fn shader_files(&self) -> impl Iterator<Item = &str> {
        self.catalog.shader_users.keys().map(String::as_str)
    }

    // Materials

    pub fn material_handle(&self, id: &str) -> MaterialHandle {
        self.catalog
            .material_index
            .get(id)
            .map_or(MaterialHandle::INVALID, |&index| MaterialHandle(index))
    }

    pub fn material(&self, handle: MaterialHandle) -> Option<&MaterialDefinition> {
        self.catalog.materials.get(handle.0 as usize)
    }

    pub fn material_by_id(&self, id: &str) -> Option<&MaterialDefinition> {
        self.material(self.material_handle(id))
    }

    /// Every loaded material with its handle, in document order.
    pub fn materials(&self) -> impl Iterator<Item = (MaterialHandle, &MaterialDefinition)> {
        self.catalog
            .materials
            .iter()
            .enumerate()
            .map(|(index, material)| (MaterialHandle(index as u32), material))
    }

    pub fn material_count(&self) -> usize {
        self.catalog.materials.len()
    }

    pub fn material_pass(&self, handle: MaterialHandle, pass: &str) -> Option<&MaterialPass> {
        self.material(handle)?.pass(pass)
    }

    pub fn has_material_pass(&self, handle: MaterialHandle, pass: &str) -> bool {
        self.material_pass(handle, pass).is_some()
    }

    /// The material `id`, or the configured fallback material if `id` is unknown.
    pub fn material_or_fallback(&self, id: &str) -> Option<&MaterialDefinition> {
        if let Some(material) = self.material_by_id(id) {
            return Some(material);
        }
        let fallback = self.config.fallback_material.as_deref()?;
        let material = self.material_by_id(fallback)?;
        log::warn!("Unknown material '{id}', using fallback '{fallback}'");
        Some(material)
    }

    // Render passes and states

    pub fn render_pass(&self, name: &str) -> Option<&RenderPassDefinition> {
        let index = *self.catalog.render_pass_index.get(name)?;
        self.catalog.render_passes.get(index)
    }

    /// Every render pass, in document order.
    pub fn render_passes(&self) -> &[RenderPassDefinition] {
        &self.catalog.render_passes
    }

    /// Formats of the render pass `name`. An unknown pass or a missing
    /// render-target block is fatal.
    pub fn render_pass_config(&self, name: &str) -> Result<RenderPassConfig> {
        let definition = self.render_pass(name).ok_or_else(|| {
            let error = MaterialError::UnknownRenderPass(name.to_string());
            log::error!("{error}");
            error
        })?;
        RenderPassConfig::resolve(definition, &self.catalog.states)
            .inspect_err(|error| log::error!("{error}"))
    }

    pub fn states(&self) -> &StateRegistry {
        &self.catalog.states
    }

    pub fn rasterizer_state(&self, id: &str) -> Option<&RasterizerState> {
        self.catalog.states.rasterizer(id)
    }

    pub fn depth_stencil_state(&self, id: &str) -> Option<&DepthStencilState> {
        self.catalog.states.depth_stencil(id)
    }

    pub fn blend_state(&self, id: &str) -> Option<&BlendState> {
        self.catalog.states.blend(id)
    }

    pub fn render_target_state(&self, id: &str) -> Option<&RenderTargetState> {
        self.catalog.states.render_target(id)
    }

    pub fn vertex_format(&self, id: &str) -> Option<&VertexFormat> {
        self.catalog.states.vertex_format(id)
    }

    // Pipelines

    fn pipeline_builder(&self) -> PipelineBuilder<'_> {
        PipelineBuilder {
            compiler: self.compiler.as_ref(),
            reflector: self.reflector.as_ref(),
            backend: self.backend.as_ref(),
            states: &self.catalog.states,
            reflection_cache: &self.reflection_cache,
            layout_cache: &self.layout_cache,
        }
    }

    /// Pipeline of a material pass in `render_pass`, built on first use.
    ///
    /// `pass` may be `None` for single-pass materials.
    pub fn pipeline_for(
        &self,
        handle: MaterialHandle,
        pass: Option<&str>,
        render_pass: &str,
    ) -> Result<Arc<CompiledPipeline>> {
        let material = self
            .material(handle)
            .ok_or_else(|| MaterialError::UnknownMaterial(format!("handle #{}", handle.0)))?;

        let hash = compute_pipeline_hash(material, pass, render_pass);
        if !hash.is_valid() {
            // Surface why the pass did not resolve.
            material
                .resolve_pass(pass)
                .inspect_err(|error| log::error!("{error}"))?;
        }
        if let Some(cached) = self.pipeline_cache.get(hash) {
            log::debug!("Pipeline cache hit {} for '{}'", hash, material.id);
            return Ok(cached);
        }

        profile_scope_dynamic!(material.id.as_str());
        let config = self.render_pass_config(render_pass)?;
        let compiled = self.pipeline_builder().build(material, pass, &config)?;
        self.pipeline_cache.store(compiled)
    }

    /// Pipeline of `pass` in the render pass of the same name. Failures are
    /// logged and give `None`.
    pub fn pipeline_state(&self, handle: MaterialHandle, pass: &str) -> Option<Arc<CompiledPipeline>> {
        self.pipeline_for(handle, Some(pass), pass).ok()
    }

    // Invalidation

    /// Drop every cached pipeline of material `id`. Returns how many were dropped.
    pub fn invalidate_material(&self, id: &str) -> usize {
        self.pipeline_cache.invalidate_by_material(id)
    }

    /// Invalidate everything derived from the shader file at `file`.
    ///
    /// Reflection entries of every shader compiled from the file are
    /// released and the pipelines of every material using it are dropped;
    /// they are rebuilt on next use. Returns the number of affected
    /// materials. Does nothing when hot reload is disabled.
    pub fn on_shader_changed(&self, file: &str) -> usize {
        if !self.config.hot_reload {
            return 0;
        }
        let Ok(file) = path::normalize(file) else {
            log::warn!("Ignoring change notification for invalid path '{file}'");
            return 0;
        };
        let Some(users) = self.catalog.shader_users.get(&file) else {
            return 0;
        };

        let mut pipelines = 0;
        for id in users {
            if let Some(material) = self.material_by_id(id) {
                material
                    .passes
                    .iter()
                    .flat_map(|pass| &pass.shaders)
                    .filter(|shader| shader.file_path == file)
                    .for_each(|shader| {
                        self.reflection_cache.invalidate(&shader.identity());
                    });
            }
            pipelines += self.pipeline_cache.invalidate_by_material(id);
        }
        log::info!(
            "Shader '{}' changed: {} material(s), {} pipeline(s) invalidated",
            file,
            users.len(),
            pipelines
        );
        users.len()
    }

    /// Reload the root document and clear every cache.
    ///
    /// On failure the previously loaded content stays active.
    pub fn reload(&mut self) -> std::result::Result<(), LoadFailure> {
        let catalog = Catalog::load(self.source.as_ref(), &self.root, &self.config)
            .inspect_err(|failure| log::error!("Reload of '{}' failed: {failure}", self.root))?;
        self.catalog = catalog;
        self.clear_caches();
        profile_message!("material documents reloaded");
        Ok(())
    }

    pub fn clear_caches(&self) {
        self.pipeline_cache.clear();
        self.layout_cache.clear();
        self.reflection_cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            materials: self.catalog.materials.len(),
            render_passes: self.catalog.render_passes.len(),
            reflection: self.reflection_cache.stats(),
            layouts: self.layout_cache.len(),
            pipelines: self.pipeline_cache.stats(),
        }
    }
}

impl HotReloadSink for MaterialSystem {
    fn file_changed(&self, path: &str) -> usize {
        self.on_shader_changed(path)
    }
}
