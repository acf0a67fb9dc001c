//! Field-wise JSON overrides for state blocks.
//!
//! Absent fields keep the value already in the block, so applying a child's
//! JSON on top of a clone of its base block yields inheritance.

use serde_json::{Map, Value};

use super::{
    BlendState, ColorWriteMask, DepthStencilState, Enumerated, Format, MAX_RENDER_TARGETS,
    RasterizerState, RenderTargetBlend, RenderTargetState, StencilFace, VertexElement,
    VertexFormat,
};
use crate::error::{MaterialError, Result};

/// A state block that can be read from a document.
pub trait StateBlock: Clone + Default {
    /// Category name used in diagnostics (`rasterizer`, `blend`, ...).
    const CATEGORY: &'static str;

    /// Override the fields present in `json`.
    fn apply(&mut self, json: &Map<String, Value>) -> Result<()>;
}

/// Typed accessors over one JSON object.
struct Fields<'a> {
    category: &'static str,
    json: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn new(category: &'static str, json: &'a Map<String, Value>) -> Self {
        Self { category, json }
    }

    fn invalid(&self, field: &str, value: &Value) -> MaterialError {
        MaterialError::InvalidStateValue {
            category: self.category.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    fn bool(&self, field: &str, target: &mut bool) -> Result<()> {
        if let Some(value) = self.json.get(field) {
            *target = value.as_bool().ok_or_else(|| self.invalid(field, value))?;
        }
        Ok(())
    }

    fn u32(&self, field: &str, target: &mut u32) -> Result<()> {
        if let Some(value) = self.json.get(field) {
            *target = value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| self.invalid(field, value))?;
        }
        Ok(())
    }

    fn u8(&self, field: &str, target: &mut u8) -> Result<()> {
        if let Some(value) = self.json.get(field) {
            *target = value
                .as_u64()
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| self.invalid(field, value))?;
        }
        Ok(())
    }

    fn i32(&self, field: &str, target: &mut i32) -> Result<()> {
        if let Some(value) = self.json.get(field) {
            *target = value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| self.invalid(field, value))?;
        }
        Ok(())
    }

    fn f32(&self, field: &str, target: &mut f32) -> Result<()> {
        if let Some(value) = self.json.get(field) {
            *target = value.as_f64().ok_or_else(|| self.invalid(field, value))? as f32;
        }
        Ok(())
    }

    fn enumerated<T: Enumerated>(&self, field: &str, target: &mut T) -> Result<()> {
        if let Some(value) = self.json.get(field) {
            *target = value
                .as_str()
                .and_then(T::from_name)
                .ok_or_else(|| self.invalid(field, value))?;
        }
        Ok(())
    }

    fn object(&self, field: &str) -> Result<Option<&'a Map<String, Value>>> {
        match self.json.get(field) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(other) => Err(self.invalid(field, other)),
        }
    }

    fn array(&self, field: &str) -> Result<Option<&'a [Value]>> {
        match self.json.get(field) {
            None => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items)),
            Some(other) => Err(self.invalid(field, other)),
        }
    }

    fn format(&self, field: &str, value: &Value) -> Result<Format> {
        value
            .as_str()
            .and_then(Format::from_name)
            .ok_or_else(|| self.invalid(field, value))
    }
}

impl StateBlock for RasterizerState {
    const CATEGORY: &'static str = "rasterizer";

    fn apply(&mut self, json: &Map<String, Value>) -> Result<()> {
        let f = Fields::new(Self::CATEGORY, json);
        f.enumerated("fillMode", &mut self.fill_mode)?;
        f.enumerated("cullMode", &mut self.cull_mode)?;
        f.bool("frontCounterClockwise", &mut self.front_counter_clockwise)?;
        f.i32("depthBias", &mut self.depth_bias)?;
        f.f32("depthBiasClamp", &mut self.depth_bias_clamp)?;
        f.f32("slopeScaledDepthBias", &mut self.slope_scaled_depth_bias)?;
        f.bool("depthClipEnable", &mut self.depth_clip_enable)?;
        f.bool("multisampleEnable", &mut self.multisample_enable)?;
        f.bool("antialiasedLineEnable", &mut self.antialiased_line_enable)?;
        f.u32("forcedSampleCount", &mut self.forced_sample_count)?;
        f.bool("conservativeRaster", &mut self.conservative_raster)
    }
}

fn apply_stencil_face(face: &mut StencilFace, json: &Map<String, Value>) -> Result<()> {
    let f = Fields::new(DepthStencilState::CATEGORY, json);
    f.enumerated("stencilFailOp", &mut face.fail_op)?;
    f.enumerated("stencilDepthFailOp", &mut face.depth_fail_op)?;
    f.enumerated("stencilPassOp", &mut face.pass_op)?;
    f.enumerated("stencilFunc", &mut face.func)
}

impl StateBlock for DepthStencilState {
    const CATEGORY: &'static str = "depthStencil";

    fn apply(&mut self, json: &Map<String, Value>) -> Result<()> {
        let f = Fields::new(Self::CATEGORY, json);
        f.bool("depthEnable", &mut self.depth_enable)?;
        f.enumerated("depthWriteMask", &mut self.depth_write_mask)?;
        f.enumerated("depthFunc", &mut self.depth_func)?;
        f.bool("stencilEnable", &mut self.stencil_enable)?;
        f.u8("stencilReadMask", &mut self.stencil_read_mask)?;
        f.u8("stencilWriteMask", &mut self.stencil_write_mask)?;
        if let Some(face) = f.object("frontFace")? {
            apply_stencil_face(&mut self.front_face, face)?;
        }
        if let Some(face) = f.object("backFace")? {
            apply_stencil_face(&mut self.back_face, face)?;
        }
        Ok(())
    }
}

fn apply_target_blend(target: &mut RenderTargetBlend, json: &Map<String, Value>) -> Result<()> {
    let f = Fields::new(BlendState::CATEGORY, json);
    f.bool("blendEnable", &mut target.blend_enable)?;
    f.bool("logicOpEnable", &mut target.logic_op_enable)?;
    f.enumerated("srcBlend", &mut target.src_blend)?;
    f.enumerated("destBlend", &mut target.dest_blend)?;
    f.enumerated("blendOp", &mut target.blend_op)?;
    f.enumerated("srcBlendAlpha", &mut target.src_blend_alpha)?;
    f.enumerated("destBlendAlpha", &mut target.dest_blend_alpha)?;
    f.enumerated("blendOpAlpha", &mut target.blend_op_alpha)?;
    f.enumerated("logicOp", &mut target.logic_op)?;

    // A single channel name or a list of them.
    if let Some(value) = json.get("renderTargetWriteMask") {
        let names: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        let mut mask = ColorWriteMask::empty();
        for name in names {
            mask |= name
                .as_str()
                .and_then(ColorWriteMask::from_channel_name)
                .ok_or_else(|| f.invalid("renderTargetWriteMask", value))?;
        }
        target.write_mask = mask;
    }
    Ok(())
}

impl StateBlock for BlendState {
    const CATEGORY: &'static str = "blend";

    fn apply(&mut self, json: &Map<String, Value>) -> Result<()> {
        let f = Fields::new(Self::CATEGORY, json);
        f.bool("alphaToCoverageEnable", &mut self.alpha_to_coverage_enable)?;
        f.bool("independentBlendEnable", &mut self.independent_blend_enable)?;
        if let Some(targets) = f.array("renderTargets")? {
            if targets.len() > MAX_RENDER_TARGETS {
                log::warn!(
                    "Blend state lists {} render targets, only the first {} are used",
                    targets.len(),
                    MAX_RENDER_TARGETS
                );
            }
            for (slot, value) in self.render_targets.iter_mut().zip(targets) {
                let target = value
                    .as_object()
                    .ok_or_else(|| f.invalid("renderTargets", value))?;
                apply_target_blend(slot, target)?;
            }
        }
        Ok(())
    }
}

impl StateBlock for RenderTargetState {
    const CATEGORY: &'static str = "renderTarget";

    fn apply(&mut self, json: &Map<String, Value>) -> Result<()> {
        let f = Fields::new(Self::CATEGORY, json);
        if let Some(formats) = f.array("rtvFormats")? {
            if formats.len() > MAX_RENDER_TARGETS {
                return Err(f.invalid("rtvFormats", &Value::from(formats.len())));
            }
            self.rtv_formats = formats
                .iter()
                .map(|value| f.format("rtvFormats", value))
                .collect::<Result<_>>()?;
        }
        if let Some(value) = json.get("dsvFormat") {
            self.dsv_format = f.format("dsvFormat", value)?;
        }
        f.u32("sampleCount", &mut self.sample_count)?;
        f.u32("sampleQuality", &mut self.sample_quality)
    }
}

impl StateBlock for VertexFormat {
    const CATEGORY: &'static str = "vertexFormat";

    fn apply(&mut self, json: &Map<String, Value>) -> Result<()> {
        let f = Fields::new(Self::CATEGORY, json);
        if let Some(elements) = f.array("elements")? {
            let mut parsed: Vec<VertexElement> = Vec::with_capacity(elements.len());
            for value in elements {
                let element = value
                    .as_object()
                    .ok_or_else(|| f.invalid("elements", value))?;
                let ef = Fields::new(Self::CATEGORY, element);

                let semantic = element
                    .get("semantic")
                    .and_then(Value::as_str)
                    .ok_or_else(|| MaterialError::MissingField {
                        context: "vertex element".into(),
                        field: "semantic".into(),
                    })?;
                let format = element.get("format").ok_or_else(|| MaterialError::MissingField {
                    context: format!("vertex element '{semantic}'"),
                    field: "format".into(),
                })?;
                let format = ef.format("format", format)?;

                // Without an explicit offset the element follows the previous one.
                let mut offset = parsed
                    .last()
                    .map(|prev| prev.offset + prev.format.byte_size())
                    .unwrap_or(0);
                ef.u32("offset", &mut offset)?;

                let mut semantic_index = 0;
                ef.u32("semanticIndex", &mut semantic_index)?;
                let mut input_slot = 0;
                ef.u32("inputSlot", &mut input_slot)?;

                parsed.push(VertexElement {
                    semantic: semantic.to_string(),
                    semantic_index,
                    format,
                    offset,
                    input_slot,
                });
            }
            self.elements = parsed;
            self.stride = self.packed_size();
        }
        f.u32("stride", &mut self.stride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BlendFactor, ComparisonFunc, CullMode, FillMode, StencilOp};
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_rasterizer_overrides_only_present_fields() {
        let mut state = RasterizerState::default();
        state
            .apply(&object(json!({"fillMode": "Wireframe", "depthBias": -4})))
            .unwrap();
        assert_eq!(state.fill_mode, FillMode::Wireframe);
        assert_eq!(state.depth_bias, -4);
        assert_eq!(state.cull_mode, CullMode::Back);
        assert!(state.depth_clip_enable);
    }

    #[test]
    fn test_unknown_enumerator_is_fatal() {
        let mut state = RasterizerState::default();
        let error = state
            .apply(&object(json!({"cullMode": "Sideways"})))
            .unwrap_err();
        assert!(matches!(
            error,
            MaterialError::InvalidStateValue { ref field, .. } if field == "cullMode"
        ));
        assert!(error.is_fatal());
    }

    #[test]
    fn test_depth_stencil_faces() {
        let mut state = DepthStencilState::default();
        state
            .apply(&object(json!({
                "stencilEnable": true,
                "stencilReadMask": 15,
                "frontFace": {"stencilPassOp": "Replace", "stencilFunc": "Equal"}
            })))
            .unwrap();
        assert!(state.stencil_enable);
        assert_eq!(state.stencil_read_mask, 0x0F);
        assert_eq!(state.front_face.pass_op, StencilOp::Replace);
        assert_eq!(state.front_face.func, ComparisonFunc::Equal);
        assert_eq!(state.back_face, StencilFace::default());
    }

    #[test]
    fn test_stencil_mask_out_of_range() {
        let mut state = DepthStencilState::default();
        assert!(state.apply(&object(json!({"stencilWriteMask": 256}))).is_err());
    }

    #[test]
    fn test_blend_targets_and_write_mask() {
        let mut state = BlendState::default();
        state
            .apply(&object(json!({
                "renderTargets": [
                    {"blendEnable": true, "srcBlend": "SrcAlpha", "destBlend": "InvSrcAlpha"},
                    {"renderTargetWriteMask": ["Red", "Alpha"]}
                ]
            })))
            .unwrap();
        assert!(state.render_targets[0].blend_enable);
        assert_eq!(state.render_targets[0].dest_blend, BlendFactor::InvSrcAlpha);
        assert_eq!(
            state.render_targets[1].write_mask,
            ColorWriteMask::RED | ColorWriteMask::ALPHA
        );
        assert_eq!(state.render_targets[2], RenderTargetBlend::default());
    }

    #[test]
    fn test_render_target_formats() {
        let mut state = RenderTargetState::default();
        state
            .apply(&object(json!({
                "rtvFormats": ["R16G16B16A16_FLOAT", "R8G8B8A8_UNORM"],
                "dsvFormat": "D32_FLOAT",
                "sampleCount": 4
            })))
            .unwrap();
        assert_eq!(
            state.rtv_formats,
            [Format::R16G16B16A16Float, Format::R8G8B8A8Unorm]
        );
        assert_eq!(state.dsv_format, Format::D32Float);
        assert_eq!(state.sample_count, 4);

        assert!(state.apply(&object(json!({"dsvFormat": "D99"}))).is_err());
    }

    #[test]
    fn test_vertex_format_packs_missing_offsets() {
        let mut format = VertexFormat::default();
        format
            .apply(&object(json!({
                "elements": [
                    {"semantic": "POSITION", "format": "R32G32B32_FLOAT"},
                    {"semantic": "NORMAL", "format": "R32G32B32_FLOAT"},
                    {"semantic": "TEXCOORD", "format": "R32G32_FLOAT", "offset": 32}
                ]
            })))
            .unwrap();
        let offsets: Vec<u32> = format.elements.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, [0, 12, 32]);
        assert_eq!(format.stride, 40);
    }

    #[test]
    fn test_vertex_format_explicit_stride_wins() {
        let mut format = VertexFormat::default();
        format
            .apply(&object(json!({
                "stride": 64,
                "elements": [{"semantic": "POSITION", "format": "R32G32B32_FLOAT"}]
            })))
            .unwrap();
        assert_eq!(format.stride, 64);
    }
}
