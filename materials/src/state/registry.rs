use std::collections::HashMap;

use serde_json::{Map, Value};

use super::{
    BlendState, DepthStencilState, RasterizerState, RenderTargetState, StateBlock, VertexFormat,
};
use crate::error::{MaterialError, Result};

pub const RASTERIZER_STATES: &str = "rasterizerStates";
pub const DEPTH_STENCIL_STATES: &str = "depthStencilStates";
pub const BLEND_STATES: &str = "blendStates";
pub const RENDER_TARGET_STATES: &str = "renderTargetStates";
pub const VERTEX_FORMATS: &str = "vertexFormats";

/// Named state blocks of every category, with `base` inheritance resolved.
#[derive(Debug, Clone, Default)]
pub struct StateRegistry {
    rasterizer: HashMap<String, RasterizerState>,
    depth_stencil: HashMap<String, DepthStencilState>,
    blend: HashMap<String, BlendState>,
    render_target: HashMap<String, RenderTargetState>,
    vertex_format: HashMap<String, VertexFormat>,
}

impl StateRegistry {
    /// Parse the document's `states` object. `None` yields an empty registry.
    pub fn parse(states: Option<&Map<String, Value>>) -> Result<Self> {
        let registry = Self {
            rasterizer: parse_category(states, RASTERIZER_STATES)?,
            depth_stencil: parse_category(states, DEPTH_STENCIL_STATES)?,
            blend: parse_category(states, BLEND_STATES)?,
            render_target: parse_category(states, RENDER_TARGET_STATES)?,
            vertex_format: parse_category(states, VERTEX_FORMATS)?,
        };
        log::debug!(
            "State registry: {} rasterizer, {} depth-stencil, {} blend, {} render-target, {} vertex format(s)",
            registry.rasterizer.len(),
            registry.depth_stencil.len(),
            registry.blend.len(),
            registry.render_target.len(),
            registry.vertex_format.len()
        );
        Ok(registry)
    }

    pub fn rasterizer(&self, id: &str) -> Option<&RasterizerState> {
        self.rasterizer.get(id)
    }

    pub fn depth_stencil(&self, id: &str) -> Option<&DepthStencilState> {
        self.depth_stencil.get(id)
    }

    pub fn blend(&self, id: &str) -> Option<&BlendState> {
        self.blend.get(id)
    }

    pub fn render_target(&self, id: &str) -> Option<&RenderTargetState> {
        self.render_target.get(id)
    }

    pub fn vertex_format(&self, id: &str) -> Option<&VertexFormat> {
        self.vertex_format.get(id)
    }

    /// Total number of blocks across categories.
    pub fn len(&self) -> usize {
        self.rasterizer.len()
            + self.depth_stencil.len()
            + self.blend.len()
            + self.render_target.len()
            + self.vertex_format.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collect `(id, json)` pairs of one category, in either the keyed-object
/// or the array-of-`{id}` form.
fn raw_blocks<'a>(
    states: Option<&'a Map<String, Value>>,
    key: &str,
) -> Result<Vec<(&'a str, &'a Map<String, Value>)>> {
    let not_object = |id: &str| MaterialError::InvalidDocument {
        path: format!("states.{key}.{id}"),
        reason: "state block must be an object".into(),
    };

    match states.and_then(|s| s.get(key)) {
        None => Ok(Vec::new()),
        Some(Value::Object(blocks)) => blocks
            .iter()
            .map(|(id, block)| {
                block
                    .as_object()
                    .map(|b| (id.as_str(), b))
                    .ok_or_else(|| not_object(id))
            })
            .collect(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .map(|block| {
                let block = block.as_object().ok_or_else(|| not_object("[]"))?;
                let id = block.get("id").and_then(Value::as_str).ok_or_else(|| {
                    MaterialError::MissingField {
                        context: format!("states.{key}"),
                        field: "id".into(),
                    }
                })?;
                Ok((id, block))
            })
            .collect(),
        Some(_) => Err(MaterialError::InvalidDocument {
            path: format!("states.{key}"),
            reason: "must be an object or an array".into(),
        }),
    }
}

fn parse_category<T: StateBlock>(
    states: Option<&Map<String, Value>>,
    key: &str,
) -> Result<HashMap<String, T>> {
    let raw = raw_blocks(states, key)?;
    let by_id: HashMap<&str, &Map<String, Value>> = raw.iter().copied().collect();

    let mut resolved = HashMap::with_capacity(raw.len());
    let mut chain = Vec::new();
    for (id, _) in &raw {
        resolve(id, &by_id, &mut resolved, &mut chain)?;
    }
    Ok(resolved)
}

/// Resolve `id`, resolving its `base` first. `chain` holds the ids being
/// resolved further up the recursion.
fn resolve<T: StateBlock>(
    id: &str,
    raw: &HashMap<&str, &Map<String, Value>>,
    resolved: &mut HashMap<String, T>,
    chain: &mut Vec<String>,
) -> Result<()> {
    if resolved.contains_key(id) {
        return Ok(());
    }
    if let Some(start) = chain.iter().position(|c| c == id) {
        let mut cycle = chain[start..].to_vec();
        cycle.push(id.to_string());
        return Err(MaterialError::StateInheritanceCycle {
            category: T::CATEGORY.to_string(),
            chain: cycle,
        });
    }
    let Some(json) = raw.get(id) else {
        return Ok(());
    };

    let mut block = match json.get("base").and_then(Value::as_str) {
        Some(base) => {
            if !raw.contains_key(base) {
                return Err(MaterialError::MissingStateBlock {
                    category: T::CATEGORY.to_string(),
                    id: base.to_string(),
                    referrer: format!("{} state '{id}'", T::CATEGORY),
                });
            }
            chain.push(id.to_string());
            let outcome = resolve(base, raw, resolved, chain);
            chain.pop();
            outcome?;
            resolved.get(base).cloned().unwrap_or_default()
        }
        None => T::default(),
    };

    block.apply(json)?;
    resolved.insert(id.to_string(), block);
    Ok(())
}
