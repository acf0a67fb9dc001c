use std::fmt;

use kiln_core::hash::KeyHasher;

use crate::definition::MaterialDefinition;

/// Key of a compiled pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineHash(pub u64);

impl PipelineHash {
    /// Returned when no pipeline can be identified; never cached.
    pub const INVALID: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PipelineHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Hash identifying the pipeline of `material`'s pass in `render_pass`.
///
/// Folds, in order: the material id, the pass name (when the resolved pass
/// has one), the render pass name, each shader's stage and id, then the
/// rasterizer, depth-stencil and blend ids. A pass that cannot be resolved
/// gives [`PipelineHash::INVALID`].
pub fn compute_pipeline_hash(
    material: &MaterialDefinition,
    pass_name: Option<&str>,
    render_pass: &str,
) -> PipelineHash {
    let Ok(pass) = material.resolve_pass(pass_name) else {
        return PipelineHash::INVALID;
    };

    let mut key = KeyHasher::new().str(&material.id);
    if let Some(name) = &pass.name {
        key = key.str(name);
    }
    key = key.str(render_pass);
    for shader in &pass.shaders {
        key = key.u64(shader.stage.tag()).str(&shader.id);
    }
    let value = key
        .opt_str(pass.states.rasterizer.as_deref())
        .opt_str(pass.states.depth_stencil.as_deref())
        .opt_str(pass.states.blend.as_deref())
        .finish();

    // Zero is reserved for the invalid hash.
    PipelineHash(if value == 0 { 1 } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{
        MaterialPass, PrimitiveTopology, ShaderReference, StateReferences,
    };
    use crate::shader::ShaderStage;

    fn shader(stage: ShaderStage, id: &str) -> ShaderReference {
        ShaderReference {
            stage,
            id: id.into(),
            file_path: "shaders/lit.wgsl".into(),
            entry_point: "main".into(),
            target_profile: "vs_6_0".into(),
            defines: Vec::new(),
        }
    }

    fn pass(name: Option<&str>, blend: Option<&str>) -> MaterialPass {
        MaterialPass {
            name: name.map(str::to_string),
            shaders: vec![shader(ShaderStage::Vertex, "lit_vs"), shader(ShaderStage::Pixel, "lit_ps")],
            states: StateReferences {
                blend: blend.map(str::to_string),
                ..Default::default()
            },
            parameters: Vec::new(),
            topology: PrimitiveTopology::Triangle,
            bindings: Vec::new(),
        }
    }

    fn material(id: &str, passes: Vec<MaterialPass>) -> MaterialDefinition {
        MaterialDefinition {
            id: id.into(),
            passes,
            vertex_format_id: None,
            enabled: true,
            version_hash: String::new(),
        }
    }

    #[test]
    fn test_deterministic() {
        let m = material("m1", vec![pass(Some("forward"), None)]);
        let a = compute_pipeline_hash(&m, Some("forward"), "main");
        let b = compute_pipeline_hash(&m.clone(), Some("forward"), "main");
        assert_eq!(a, b);
        assert!(a.is_valid());
    }

    #[test]
    fn test_single_pass_resolves_without_name() {
        let m = material("m1", vec![pass(Some("forward"), None)]);
        assert_eq!(
            compute_pipeline_hash(&m, None, "main"),
            compute_pipeline_hash(&m, Some("forward"), "main")
        );
    }

    #[test]
    fn test_sensitive_to_each_input() {
        let m = material("m1", vec![pass(Some("forward"), None), pass(Some("shadow"), None)]);
        let base = compute_pipeline_hash(&m, Some("forward"), "main");

        assert_ne!(base, compute_pipeline_hash(&m, Some("shadow"), "main"));
        assert_ne!(base, compute_pipeline_hash(&m, Some("forward"), "ui"));

        let renamed = material("m2", m.passes.clone());
        assert_ne!(base, compute_pipeline_hash(&renamed, Some("forward"), "main"));

        let blended = material("m1", vec![pass(Some("forward"), Some("alpha")), pass(Some("shadow"), None)]);
        assert_ne!(base, compute_pipeline_hash(&blended, Some("forward"), "main"));
    }

    #[test]
    fn test_absent_state_hashes_like_empty_id() {
        let absent = material("m1", vec![pass(None, None)]);
        let empty = material("m1", vec![pass(None, Some(""))]);
        assert_eq!(
            compute_pipeline_hash(&absent, None, "main"),
            compute_pipeline_hash(&empty, None, "main")
        );
    }

    #[test]
    fn test_invalid_when_unresolvable() {
        let multi = material("m1", vec![pass(Some("a"), None), pass(Some("b"), None)]);
        assert_eq!(compute_pipeline_hash(&multi, None, "main"), PipelineHash::INVALID);
        assert_eq!(compute_pipeline_hash(&multi, Some("c"), "main"), PipelineHash::INVALID);
        assert_eq!(
            compute_pipeline_hash(&material("m1", Vec::new()), None, "main"),
            PipelineHash::INVALID
        );
    }
}
