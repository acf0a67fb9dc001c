//! Shared fixtures for the material system integration tests.
//!
//! Everything runs against a [`MemorySource`] with a counting compiler, a
//! table-driven reflector and the dummy backend, so no GPU or shader
//! toolchain is needed.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kiln_materials::shader::{BindingKind, ResourceBinding};
use kiln_materials::{
    DocumentSource, DummyBackend, GpuBindingLayout, GpuPipeline, LoadFailure, MaterialSystem,
    MaterialSystemConfig, MemorySource, PassEncoder, ShaderBytecode, ShaderCompiler,
    ShaderReflector, ShaderStage,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Documents
// ============================================================================

pub const ROOT: &str = "materials/root.json";

pub const ROOT_JSON: &str = r#"{
    "includes": ["states.json", "shaders.json"],
    "defines": {"QUALITY": 2},
    "materials": [
        {
            "id": "m1",
            "vertexFormat": "pos_norm_uv",
            "states": {"rasterizer": "solid", "depthStencil": "depth_less", "blend": "opaque"},
            "parameters": [{"name": "tint", "type": "float4", "default": [1, 1, 1, 1]}],
            "passes": [
                {
                    "name": "forward",
                    "shaders": {
                        "vertex": "lit_vs",
                        "pixel": {"file": "lit.hlsl", "profile": "ps_6_0", "entry": "ps_main"}
                    }
                },
                {
                    "name": "shadow",
                    "states": {"rasterizer": "shadow_bias"},
                    "shaders": {
                        "vertex": {"file": "shadow.hlsl", "profile": "vs_6_0", "entry": "vs_main"}
                    }
                }
            ]
        },
        {
            "id": "m2",
            "pass": "forward",
            "states": {"blend": "additive"},
            "shaders": {
                "vertex": "lit_vs",
                "pixel": {"file": "unlit.hlsl", "profile": "ps_6_0", "entry": "ps_main"}
            }
        },
        {
            "id": "particles",
            "pass": "simulate",
            "shaders": {
                "compute": {"file": "particles.hlsl", "profile": "cs_6_0", "entry": "cs_main"}
            }
        }
    ],
    "renderPasses": [
        {"name": "forward", "states": {"renderTarget": "hdr"}},
        {"name": "shadow", "states": {"renderTarget": "shadow_map"}},
        {"name": "simulate", "queue": "compute"}
    ]
}"#;

pub const STATES_JSON: &str = r#"{
    "states": {
        "rasterizerStates": {
            "solid": {"fillMode": "Solid", "cullMode": "Back"},
            "shadow_bias": {"base": "solid", "depthBias": 100, "slopeScaledDepthBias": 1.5}
        },
        "depthStencilStates": {
            "depth_less": {"depthEnable": true, "depthFunc": "Less"}
        },
        "blendStates": {
            "opaque": {},
            "additive": {"renderTargets": [
                {"blendEnable": true, "srcBlend": "One", "destBlend": "One"}
            ]}
        },
        "renderTargetStates": {
            "hdr": {"rtvFormats": ["R16G16B16A16_FLOAT"], "dsvFormat": "D32_FLOAT"},
            "shadow_map": {"rtvFormats": [], "dsvFormat": "D32_FLOAT"}
        },
        "vertexFormats": {
            "pos_norm_uv": {"elements": [
                {"semantic": "POSITION", "format": "R32G32B32_FLOAT"},
                {"semantic": "NORMAL", "format": "R32G32B32_FLOAT"},
                {"semantic": "TEXCOORD", "format": "R32G32_FLOAT"}
            ]}
        }
    }
}"#;

pub const SHADERS_JSON: &str = r#"{
    "shaders": {
        "vertex": {
            "lit_vs": {"file": "lit.hlsl", "profile": "vs_6_0", "entry": "vs_main"}
        }
    }
}"#;

/// The standard fixture: three materials and three render passes.
pub fn fixture_source() -> MemorySource {
    let source = MemorySource::new();
    source.insert_str(ROOT, ROOT_JSON);
    source.insert_str("materials/states.json", STATES_JSON);
    source.insert_str("materials/shaders.json", SHADERS_JSON);
    source.insert_str("shaders/lit.hlsl", "// lit v1");
    source.insert_str("shaders/shadow.hlsl", "// shadow v1");
    source.insert_str("shaders/unlit.hlsl", "// unlit v1");
    source.insert_str("shaders/particles.hlsl", "// particles v1");
    source
}

// ============================================================================
// Shader tools
// ============================================================================

/// Produces `path|entry|profile|defines|content` as bytecode and counts calls.
///
/// Sources starting with `error:` fail to compile.
pub struct CountingCompiler {
    source: MemorySource,
    compiles: AtomicUsize,
}

impl CountingCompiler {
    pub fn new(source: MemorySource) -> Self {
        Self {
            source,
            compiles: AtomicUsize::new(0),
        }
    }

    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

impl ShaderCompiler for CountingCompiler {
    fn compile(
        &self,
        path: &str,
        entry_point: &str,
        profile: &str,
        defines: &[String],
    ) -> Result<ShaderBytecode, String> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        let stage = ShaderStage::from_profile(profile).ok_or_else(|| format!("bad profile {profile}"))?;
        let text = self.source.read_to_string(path).map_err(|e| e.to_string())?;
        if let Some(message) = text.strip_prefix("error:") {
            return Err(message.trim().to_string());
        }
        let bytes = format!("{path}|{entry_point}|{profile}|{}|{text}", defines.join(","));
        Ok(ShaderBytecode::new(stage, entry_point, bytes.into_bytes()))
    }
}

/// Looks bindings up by `path:entry`, read back from [`CountingCompiler`] bytecode.
pub struct TableReflector {
    table: HashMap<String, Vec<(&'static str, BindingKind, u32)>>,
}

impl TableReflector {
    pub fn new() -> Self {
        use BindingKind::*;

        let table = HashMap::from([
            (
                "shaders/lit.hlsl:vs_main".to_string(),
                vec![("camera", ConstantBuffer, 0), ("object", ConstantBuffer, 1)],
            ),
            (
                "shaders/lit.hlsl:ps_main".to_string(),
                vec![
                    ("camera", ConstantBuffer, 0),
                    ("albedo", ReadOnlyResource, 0),
                    ("linear_sampler", Sampler, 0),
                ],
            ),
            (
                "shaders/shadow.hlsl:vs_main".to_string(),
                vec![("camera", ConstantBuffer, 0), ("object", ConstantBuffer, 1)],
            ),
            (
                "shaders/unlit.hlsl:ps_main".to_string(),
                vec![("tint", ConstantBuffer, 2)],
            ),
            (
                "shaders/particles.hlsl:cs_main".to_string(),
                vec![("particles", ReadWriteResource, 0), ("sim_params", ConstantBuffer, 0)],
            ),
        ]);
        Self { table }
    }
}

impl ShaderReflector for TableReflector {
    fn reflect(&self, bytecode: &ShaderBytecode) -> Result<Vec<ResourceBinding>, String> {
        let text = std::str::from_utf8(&bytecode.bytes).map_err(|e| e.to_string())?;
        let path = text.split('|').next().unwrap_or_default();
        let key = format!("{path}:{}", bytecode.entry_point);
        let entries = self.table.get(&key).ok_or_else(|| format!("no reflection data for {key}"))?;
        Ok(entries
            .iter()
            .map(|&(name, kind, slot)| {
                ResourceBinding::new(name, kind)
                    .with_slot(slot)
                    .with_stages(bytecode.stage.flag())
            })
            .collect())
    }
}

// ============================================================================
// System harness
// ============================================================================

pub struct Harness {
    pub source: MemorySource,
    pub compiler: Arc<CountingCompiler>,
    pub backend: Arc<DummyBackend>,
    pub system: MaterialSystem,
}

pub fn try_load(source: MemorySource, config: MaterialSystemConfig) -> Result<Harness, LoadFailure> {
    init_logger();
    let compiler = Arc::new(CountingCompiler::new(source.clone()));
    let backend = Arc::new(DummyBackend::new());
    let system = MaterialSystem::builder(Arc::new(source.clone()))
        .with_config(config.with_shader_root("shaders"))
        .with_compiler(compiler.clone())
        .with_reflector(Arc::new(TableReflector::new()))
        .with_backend(backend.clone())
        .load(ROOT)?;
    Ok(Harness {
        source,
        compiler,
        backend,
        system,
    })
}

pub fn load() -> Harness {
    try_load(fixture_source(), MaterialSystemConfig::default()).expect("fixture loads")
}

// ============================================================================
// Pass encoder
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderCall {
    BindingLayout(u64),
    Pipeline(String),
}

/// Records every bind call made on it.
#[derive(Debug, Default)]
pub struct RecordingEncoder {
    pub calls: Vec<EncoderCall>,
}

impl PassEncoder for RecordingEncoder {
    fn set_pipeline(&mut self, pipeline: &GpuPipeline) {
        let label = match pipeline {
            GpuPipeline::Dummy { label, .. } => label.clone(),
            GpuPipeline::Native(_) => "<native>".to_string(),
        };
        self.calls.push(EncoderCall::Pipeline(label));
    }

    fn set_binding_layout(&mut self, layout: &GpuBindingLayout) {
        let id = match layout {
            GpuBindingLayout::Dummy { id, .. } => *id,
            GpuBindingLayout::Native(_) => u64::MAX,
        };
        self.calls.push(EncoderCall::BindingLayout(id));
    }
}
