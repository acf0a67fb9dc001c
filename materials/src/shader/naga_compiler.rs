//! Shader compilation to SPIR-V through naga.
//!
//! WGSL (`.wgsl`) and GLSL (`.glsl`, `.vert`, `.frag`, `.comp`) sources are
//! supported. `#include "path"` lines are resolved against the including
//! file through the [`DocumentSource`], each file at most once. Defines are
//! handed to naga's GLSL preprocessor; for WGSL, which has no preprocessor,
//! `#ifdef`/`#ifndef`/`#else`/`#endif` blocks are evaluated here.
//!
//! naga has no tessellation or geometry stages, so hull, domain and geometry
//! profiles fail to compile with a descriptive message.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kiln_core::profiling::profile_scope;

use super::{ShaderBytecode, ShaderCompiler, ShaderStage};
use crate::source::{DocumentSource, path};

/// Source language, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Language {
    Wgsl,
    Glsl,
}

impl Language {
    fn from_path(file: &str) -> Option<Self> {
        let extension = file.rsplit_once('.')?.1;
        match extension {
            "wgsl" => Some(Self::Wgsl),
            "glsl" | "vert" | "frag" | "comp" => Some(Self::Glsl),
            _ => None,
        }
    }
}

/// [`ShaderCompiler`] producing SPIR-V with naga.
pub struct NagaShaderCompiler {
    source: Arc<dyn DocumentSource>,
    lang_version: (u8, u8),
}

impl NagaShaderCompiler {
    /// Create a compiler reading shader files from `source`.
    pub fn new(source: Arc<dyn DocumentSource>) -> Self {
        Self {
            source,
            lang_version: (1, 3),
        }
    }

    /// Target a different SPIR-V version (default 1.3).
    pub fn with_lang_version(mut self, major: u8, minor: u8) -> Self {
        self.lang_version = (major, minor);
        self
    }

    fn parse(
        &self,
        file: &str,
        stage: naga::ShaderStage,
        defines: &HashMap<String, String>,
    ) -> Result<naga::Module, String> {
        let language =
            Language::from_path(file).ok_or_else(|| format!("unsupported shader file '{file}'"))?;
        let text = self
            .source
            .read_to_string(file)
            .map_err(|e| e.to_string())?;

        let mut included = HashSet::new();
        included.insert(file.to_string());
        let resolved = self.resolve_includes(file, &text, &mut included)?;

        match language {
            Language::Wgsl => {
                let processed = preprocess(&resolved, defines)?;
                naga::front::wgsl::parse_str(&processed)
                    .map_err(|e| format!("WGSL parse error: {}", e.emit_to_string(&processed)))
            }
            Language::Glsl => {
                let mut naga_defines = naga::FastHashMap::default();
                for (name, value) in defines {
                    naga_defines.insert(name.clone(), value.clone());
                }
                let options = naga::front::glsl::Options {
                    stage,
                    defines: naga_defines,
                };
                let mut frontend = naga::front::glsl::Frontend::default();
                frontend
                    .parse(&options, &resolved)
                    .map_err(|errors| format!("GLSL parse error:\n{errors}"))
            }
        }
    }

    /// Resolve `#include "path"` directives recursively.
    fn resolve_includes(
        &self,
        file: &str,
        text: &str,
        included: &mut HashSet<String>,
    ) -> Result<String, String> {
        let mut result = String::with_capacity(text.len());

        for line in text.lines() {
            let Some(target) = parse_include_directive(line.trim()) else {
                result.push_str(line);
                result.push('\n');
                continue;
            };

            let target = path::resolve_include(file, target).map_err(|e| e.to_string())?;
            if !included.insert(target.clone()) {
                continue;
            }
            let include_text = self
                .source
                .read_to_string(&target)
                .map_err(|e| format!("include \"{target}\" from {file}: {e}"))?;
            let resolved = self.resolve_includes(&target, &include_text, included)?;
            result.push_str(&resolved);
            result.push('\n');
        }

        Ok(result)
    }
}

impl ShaderCompiler for NagaShaderCompiler {
    fn compile(
        &self,
        file: &str,
        entry_point: &str,
        profile: &str,
        defines: &[String],
    ) -> Result<ShaderBytecode, String> {
        profile_scope!("naga_compile");

        let stage = ShaderStage::from_profile(profile)
            .ok_or_else(|| format!("unknown target profile '{profile}'"))?;
        let naga_stage = match stage {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Pixel => naga::ShaderStage::Fragment,
            ShaderStage::Compute => naga::ShaderStage::Compute,
            other => return Err(format!("{other} shaders are not supported by naga")),
        };

        let defines = parse_defines(defines, stage);
        let module = self.parse(file, naga_stage, &defines)?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        let info = validator
            .validate(&module)
            .map_err(|e| format!("Validation error: {e}"))?;

        if !module
            .entry_points
            .iter()
            .any(|ep| ep.name == entry_point && ep.stage == naga_stage)
        {
            return Err(format!(
                "Entry point '{entry_point}' not found for {stage} stage in {file}"
            ));
        }

        let options = naga::back::spv::Options {
            lang_version: self.lang_version,
            flags: naga::back::spv::WriterFlags::DEBUG,
            capabilities: None,
            bounds_check_policies: naga::proc::BoundsCheckPolicies::default(),
            binding_map: Default::default(),
            debug_info: None,
            zero_initialize_workgroup_memory:
                naga::back::spv::ZeroInitializeWorkgroupMemoryMode::None,
        };
        let pipeline_options = naga::back::spv::PipelineOptions {
            shader_stage: naga_stage,
            entry_point: entry_point.to_string(),
        };

        let words = naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
            .map_err(|e| format!("SPIR-V generation error: {e}"))?;
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();

        log::debug!(
            "Compiled {}:{} ({}) to {} bytes of SPIR-V",
            file,
            entry_point,
            profile,
            bytes.len()
        );
        Ok(ShaderBytecode::new(stage, entry_point, bytes))
    }
}

/// Split `NAME` / `NAME=VALUE` entries and add the stage define.
fn parse_defines(defines: &[String], stage: ShaderStage) -> HashMap<String, String> {
    let mut map = HashMap::new();
    map.insert(stage.name().to_ascii_uppercase(), String::new());
    for define in defines {
        match define.split_once('=') {
            Some((name, value)) => map.insert(name.trim().to_string(), value.trim().to_string()),
            None => map.insert(define.trim().to_string(), String::new()),
        };
    }
    map
}

/// Parse `#include "path"` and return the path.
fn parse_include_directive(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("#include")?.trim();
    rest.strip_prefix('"')?.strip_suffix('"')
}

/// Evaluate `#ifdef`/`#ifndef`/`#else`/`#endif` against `defines`.
///
/// Skipped lines are replaced by empty lines so naga's error locations still
/// point at the right source line.
fn preprocess(text: &str, defines: &HashMap<String, String>) -> Result<String, String> {
    // Each entry: (this branch active, parent active).
    let mut stack: Vec<(bool, bool)> = Vec::new();
    let mut output = String::with_capacity(text.len());

    for (number, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        let active = stack.last().is_none_or(|&(branch, _)| branch);

        if let Some(name) = trimmed.strip_prefix("#ifdef") {
            stack.push((active && defines.contains_key(name.trim()), active));
        } else if let Some(name) = trimmed.strip_prefix("#ifndef") {
            stack.push((active && !defines.contains_key(name.trim()), active));
        } else if trimmed.starts_with("#else") {
            let Some((branch, parent)) = stack.pop() else {
                return Err(format!("line {}: #else without #ifdef", number + 1));
            };
            stack.push((parent && !branch, parent));
        } else if trimmed.starts_with("#endif") {
            if stack.pop().is_none() {
                return Err(format!("line {}: #endif without #ifdef", number + 1));
            }
        } else if active {
            output.push_str(line);
        }
        output.push('\n');
    }

    if !stack.is_empty() {
        return Err("unterminated #ifdef block".to_string());
    }
    Ok(output)
}
