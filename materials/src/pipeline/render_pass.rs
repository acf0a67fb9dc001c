use crate::definition::RenderPassDefinition;
use crate::error::{MaterialError, Result};
use crate::state::{Format, RenderTargetState, StateRegistry};

/// Target formats a pipeline is compiled against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPassConfig {
    pub name: String,
    pub rtv_formats: Vec<Format>,
    pub dsv_format: Format,
    pub sample_count: u32,
    pub sample_quality: u32,
}

impl RenderPassConfig {
    /// Config with the default render-target state.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_target(name, &RenderTargetState::default())
    }

    pub fn with_target(name: impl Into<String>, target: &RenderTargetState) -> Self {
        Self {
            name: name.into(),
            rtv_formats: target.rtv_formats.clone(),
            dsv_format: target.dsv_format,
            sample_count: target.sample_count,
            sample_quality: target.sample_quality,
        }
    }

    /// Resolve a render pass declaration against the registry. A referenced
    /// render-target block that does not exist is fatal.
    pub fn resolve(definition: &RenderPassDefinition, states: &StateRegistry) -> Result<Self> {
        match &definition.render_target {
            None => Ok(Self::new(&definition.name)),
            Some(id) => states
                .render_target(id)
                .map(|target| Self::with_target(&definition.name, target))
                .ok_or_else(|| MaterialError::MissingStateBlock {
                    category: "renderTarget".into(),
                    id: id.clone(),
                    referrer: format!("render pass '{}'", definition.name),
                }),
        }
    }

    /// Render-target state equivalent of this config.
    pub fn target_state(&self) -> RenderTargetState {
        RenderTargetState {
            rtv_formats: self.rtv_formats.clone(),
            dsv_format: self.dsv_format,
            sample_count: self.sample_count,
            sample_quality: self.sample_quality,
        }
    }

    pub fn render_target_count(&self) -> usize {
        self.rtv_formats.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve() {
        let states = StateRegistry::parse(
            json!({
                "renderTargetStates": {
                    "hdr": {"rtvFormats": ["R16G16B16A16_FLOAT"], "dsvFormat": "D32_FLOAT"}
                }
            })
            .as_object(),
        )
        .unwrap();

        let forward = RenderPassDefinition {
            name: "forward".into(),
            queue: "geometry".into(),
            render_target: Some("hdr".into()),
        };
        let config = RenderPassConfig::resolve(&forward, &states).unwrap();
        assert_eq!(config.rtv_formats, [Format::R16G16B16A16Float]);
        assert_eq!(config.dsv_format, Format::D32Float);
        assert_eq!(config.render_target_count(), 1);

        let untargeted = RenderPassDefinition {
            render_target: None,
            ..forward.clone()
        };
        assert_eq!(
            RenderPassConfig::resolve(&untargeted, &states).unwrap(),
            RenderPassConfig::new("forward")
        );

        let broken = RenderPassDefinition {
            render_target: Some("ldr".into()),
            ..forward
        };
        let error = RenderPassConfig::resolve(&broken, &states).unwrap_err();
        assert!(error.is_fatal());
    }
}
