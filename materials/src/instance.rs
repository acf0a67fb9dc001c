//! Per-material facade over a [`MaterialSystem`].
//!
//! A [`MaterialInstance`] resolves its material id once and then hands out
//! passes and pipelines by pass name. Pipelines are owned by the system's
//! cache; the instance only borrows the system.

use std::sync::Arc;

use crate::backend::PassEncoder;
use crate::definition::{MaterialDefinition, MaterialPass};
use crate::pipeline::CompiledPipeline;
use crate::system::{MaterialHandle, MaterialSystem};

/// A material looked up by id, ready to bind passes for drawing.
#[derive(Clone, Copy)]
pub struct MaterialInstance<'a> {
    system: &'a MaterialSystem,
    handle: MaterialHandle,
}

impl<'a> MaterialInstance<'a> {
    /// Look up `material_id`. Unknown ids give an invalid instance.
    pub fn new(system: &'a MaterialSystem, material_id: &str) -> Self {
        let handle = system.material_handle(material_id);
        if !handle.is_valid() {
            log::warn!("MaterialInstance: unknown material '{material_id}'");
        }
        Self { system, handle }
    }

    pub fn handle(&self) -> MaterialHandle {
        self.handle
    }

    /// True when the material exists and has at least one pass.
    pub fn is_valid(&self) -> bool {
        self.material().is_some_and(|material| !material.passes.is_empty())
    }

    pub fn has_pass(&self, pass: &str) -> bool {
        self.system.has_material_pass(self.handle, pass)
    }

    pub fn material(&self) -> Option<&'a MaterialDefinition> {
        self.system.material(self.handle)
    }

    pub fn pass(&self, pass: &str) -> Option<&'a MaterialPass> {
        self.system.material_pass(self.handle, pass)
    }

    pub fn pipeline_state(&self, pass: &str) -> Option<Arc<CompiledPipeline>> {
        if !self.handle.is_valid() {
            return None;
        }
        self.system.pipeline_state(self.handle, pass)
    }

    /// Bind the pipeline and binding layout of `pass` on `encoder`.
    ///
    /// Returns false, without touching the encoder, when the pass is unknown
    /// or its pipeline could not be built.
    pub fn setup_for_pass(&self, pass: &str, encoder: &mut dyn PassEncoder) -> bool {
        if !self.has_pass(pass) {
            return false;
        }
        let Some(compiled) = self.pipeline_state(pass) else {
            return false;
        };
        encoder.set_binding_layout(&compiled.layout);
        encoder.set_pipeline(&compiled.pipeline);
        true
    }
}

impl std::fmt::Debug for MaterialInstance<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterialInstance")
            .field("handle", &self.handle)
            .field("material", &self.material().map(|m| m.id.as_str()))
            .finish()
    }
}
