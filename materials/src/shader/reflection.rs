//! Resource bindings recovered from compiled shaders.

use std::fmt;

use super::{ShaderBytecode, ShaderStageFlags};

/// Abstract kind of a bound resource.
///
/// The order of the variants is the order in which descriptor tables are
/// emitted when a layout is realized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingKind {
    /// Small uniform data bound directly (constant/uniform buffer).
    ConstantBuffer,
    /// Textures and buffers the shader only reads.
    ReadOnlyResource,
    /// Storage buffers and storage images the shader writes.
    ReadWriteResource,
    /// Texture sampler.
    Sampler,
}

impl BindingKind {
    /// Parse an explicit binding kind as written in material documents.
    ///
    /// Both the long names and the short `cbv`/`srv`/`uav` forms are accepted.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "constantbuffer" | "cbv" => Some(Self::ConstantBuffer),
            "readonlyresource" | "srv" | "texture" => Some(Self::ReadOnlyResource),
            "readwriteresource" | "uav" | "storage" => Some(Self::ReadWriteResource),
            "sampler" => Some(Self::Sampler),
            _ => None,
        }
    }

    /// Stable tag folded into layout keys.
    pub fn tag(self) -> u64 {
        self as u64
    }

    /// True for kinds bound directly rather than through a table.
    pub fn is_direct(self) -> bool {
        self == Self::ConstantBuffer
    }
}

/// One resource a shader uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceBinding {
    pub name: String,
    pub kind: BindingKind,
    /// Assigned slot, or `None` until layout assembly assigns one.
    pub slot: Option<u32>,
    /// Stages that access the binding.
    pub stages: ShaderStageFlags,
}

impl ResourceBinding {
    /// Create a binding without a slot or stage visibility.
    pub fn new(name: impl Into<String>, kind: BindingKind) -> Self {
        Self {
            name: name.into(),
            kind,
            slot: None,
            stages: ShaderStageFlags::empty(),
        }
    }

    /// Set the slot.
    pub fn with_slot(mut self, slot: u32) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Set the stage visibility.
    pub fn with_stages(mut self, stages: ShaderStageFlags) -> Self {
        self.stages = stages;
        self
    }
}

impl fmt::Display for ResourceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            Some(slot) => write!(f, "{:?}@{}", self.kind, slot),
            None => write!(f, "{:?}@unassigned", self.kind),
        }
    }
}

/// Extracts the bindings a compiled shader actually uses.
///
/// Declared but unused resources must not be reported: the layout size
/// tracks usage, not declaration.
pub trait ShaderReflector: Send + Sync {
    fn reflect(&self, bytecode: &ShaderBytecode) -> Result<Vec<ResourceBinding>, String>;
}

#[cfg(feature = "naga-shaders")]
pub use spirv::SpirvReflector;

#[cfg(feature = "naga-shaders")]
mod spirv {
    use naga::{AddressSpace, ImageClass, StorageAccess, TypeInner};

    use super::{BindingKind, ResourceBinding, ShaderReflector};
    use crate::shader::{ShaderBytecode, ShaderStageFlags};
    use kiln_core::profiling::profile_function;

    /// Reflects SPIR-V modules through naga's SPIR-V frontend.
    ///
    /// A global counts as used when any entry point's function info records
    /// a use of it (calls into helper functions included). Slots are the
    /// SPIR-V binding indices; descriptor set numbers are not kept.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SpirvReflector;

    impl SpirvReflector {
        pub fn new() -> Self {
            Self
        }
    }

    impl ShaderReflector for SpirvReflector {
        fn reflect(&self, bytecode: &ShaderBytecode) -> Result<Vec<ResourceBinding>, String> {
            profile_function!();

            let options = naga::front::spv::Options::default();
            let module = naga::front::spv::parse_u8_slice(&bytecode.bytes, &options)
                .map_err(|e| format!("SPIR-V parse error: {e}"))?;

            let mut validator = naga::valid::Validator::new(
                naga::valid::ValidationFlags::all(),
                naga::valid::Capabilities::all(),
            );
            let info = validator
                .validate(&module)
                .map_err(|e| format!("Validation error: {e}"))?;

            let mut bindings: Vec<ResourceBinding> = Vec::new();

            for (index, entry_point) in module.entry_points.iter().enumerate() {
                let stage = stage_flag(entry_point.stage);
                let function_info = info.get_entry_point(index);

                for (handle, var) in module.global_variables.iter() {
                    if function_info[handle].is_empty() {
                        continue;
                    }
                    let Some(resource) = &var.binding else {
                        continue;
                    };
                    let Some(kind) = classify(&module, var) else {
                        continue;
                    };

                    let name = var.name.clone().unwrap_or_else(|| {
                        format!("set{}_binding{}", resource.group, resource.binding)
                    });

                    match bindings.iter_mut().find(|b| b.name == name) {
                        Some(existing) => existing.stages |= stage,
                        None => bindings.push(
                            ResourceBinding::new(name, kind)
                                .with_slot(resource.binding)
                                .with_stages(stage),
                        ),
                    }
                }
            }

            log::trace!(
                "Reflected {} binding(s) from {} bytes of {} bytecode",
                bindings.len(),
                bytecode.len(),
                bytecode.stage
            );
            Ok(bindings)
        }
    }

    fn stage_flag(stage: naga::ShaderStage) -> ShaderStageFlags {
        match stage {
            naga::ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            naga::ShaderStage::Fragment => ShaderStageFlags::PIXEL,
            naga::ShaderStage::Compute => ShaderStageFlags::COMPUTE,
        }
    }

    /// Map a global variable onto one of the four abstract kinds.
    fn classify(module: &naga::Module, var: &naga::GlobalVariable) -> Option<BindingKind> {
        match var.space {
            AddressSpace::Uniform => Some(BindingKind::ConstantBuffer),
            AddressSpace::Storage { access } => Some(writable(access)),
            AddressSpace::Handle => {
                let mut inner = &module.types[var.ty].inner;
                if let TypeInner::BindingArray { base, .. } = inner {
                    inner = &module.types[*base].inner;
                }
                match inner {
                    TypeInner::Sampler { .. } => Some(BindingKind::Sampler),
                    TypeInner::Image {
                        class: ImageClass::Storage { access, .. },
                        ..
                    } => Some(writable(*access)),
                    TypeInner::Image { .. } => Some(BindingKind::ReadOnlyResource),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn writable(access: StorageAccess) -> BindingKind {
        if access.contains(StorageAccess::STORE) {
            BindingKind::ReadWriteResource
        } else {
            BindingKind::ReadOnlyResource
        }
    }
}
