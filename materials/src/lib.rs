//! # Kiln Materials
//!
//! Data-driven material and pipeline compilation.
//!
//! Materials, render passes and fixed-function state blocks are authored as
//! JSON documents that may include each other. This crate loads and merges
//! them, validates and parses them into typed definitions, and turns
//! material passes into backend pipelines on demand.
//!
//! ## Overview
//!
//! - [`document`] - include resolution, merging and validation
//! - [`definition`] - typed materials, passes, shaders and parameters
//! - [`state`] - rasterizer, depth-stencil, blend, render-target and vertex format blocks
//! - [`shader`] - stages, bytecode, compilation and reflection
//! - [`layout`] - binding layouts built from reflection
//! - [`pipeline`] - pipeline hashing, building and caching
//! - [`MaterialSystem`] - the owning context, with hot reload
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kiln_materials::{FileSystemSource, MaterialInstance, MaterialSystem};
//!
//! let source = Arc::new(FileSystemSource::new("assets"));
//! let system = MaterialSystem::builder(source).load("materials/root.json")?;
//!
//! let instance = MaterialInstance::new(&system, "pbr");
//! if instance.setup_for_pass("forward", &mut encoder) {
//!     // draw...
//! }
//! ```

pub mod backend;
pub mod config;
pub mod definition;
pub mod document;
pub mod error;
pub mod instance;
pub mod layout;
pub mod pipeline;
pub mod shader;
pub mod source;
pub mod state;
pub mod system;

pub use backend::{DummyBackend, GpuBackend, GpuBindingLayout, GpuPipeline, PassEncoder};
pub use config::{DuplicateIdPolicy, MaterialSystemConfig};
pub use definition::{MaterialDefinition, MaterialPass, RenderPassDefinition};
pub use document::{Document, DocumentLoader};
pub use error::{LoadFailure, MaterialError, Result, Severity};
pub use instance::MaterialInstance;
pub use pipeline::{CompiledPipeline, PipelineHash, RenderPassConfig, compute_pipeline_hash};
pub use shader::{ShaderBytecode, ShaderCompiler, ShaderReflector, ShaderStage};
pub use source::{DocumentSource, FileSystemSource, MemorySource};
pub use system::{CacheStats, HotReloadSink, MaterialHandle, MaterialSystem, MaterialSystemBuilder};

/// Materials library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
