//! Binding layouts assembled from reflected and declared bindings.

mod cache;

use std::collections::BTreeMap;

use crate::error::{MaterialError, Result};
use crate::shader::{BindingKind, ResourceBinding, ShaderStageFlags};

pub use cache::{LayoutCache, hash_layout};

/// Root-parameter budget of a layout, in 32-bit words.
pub const MAX_LAYOUT_WORDS: u32 = 64;
/// Cost of a direct constant-buffer parameter.
pub const DIRECT_PARAMETER_WORDS: u32 = 2;
/// Cost of a descriptor table parameter.
pub const TABLE_PARAMETER_WORDS: u32 = 1;

/// Order in which descriptor tables are emitted.
pub const TABLE_KINDS: [BindingKind; 3] = [
    BindingKind::ReadOnlyResource,
    BindingKind::ReadWriteResource,
    BindingKind::Sampler,
];

/// Merged, slot-assigned bindings of one pass, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BindingLayoutSpec {
    pub bindings: Vec<ResourceBinding>,
}

impl BindingLayoutSpec {
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn binding(&self, name: &str) -> Option<&ResourceBinding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    /// Bindings bound directly (constant buffers).
    pub fn direct(&self) -> impl Iterator<Item = &ResourceBinding> {
        self.bindings.iter().filter(|b| b.kind.is_direct())
    }

    /// Bindings of a table kind.
    pub fn table(&self, kind: BindingKind) -> impl Iterator<Item = &ResourceBinding> {
        self.bindings.iter().filter(move |b| b.kind == kind)
    }

    /// Stages any binding is visible to.
    pub fn stages(&self) -> ShaderStageFlags {
        self.bindings
            .iter()
            .fold(ShaderStageFlags::empty(), |flags, b| flags | b.stages)
    }
}

/// One entry of a realized layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LayoutParameter {
    /// A constant buffer bound directly at `slot`.
    Direct {
        name: String,
        slot: u32,
        stages: ShaderStageFlags,
    },
    /// A descriptor table with one range per binding, as `(name, slot)`.
    Table {
        kind: BindingKind,
        ranges: Vec<(String, u32)>,
        stages: ShaderStageFlags,
    },
}

impl LayoutParameter {
    pub fn cost(&self) -> u32 {
        match self {
            Self::Direct { .. } => DIRECT_PARAMETER_WORDS,
            Self::Table { .. } => TABLE_PARAMETER_WORDS,
        }
    }
}

/// Backend-neutral description of a binding layout: direct constant
/// buffers first, then one table per non-empty kind in [`TABLE_KINDS`] order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NativeLayoutDescriptor {
    pub parameters: Vec<LayoutParameter>,
    pub size_in_words: u32,
}

impl NativeLayoutDescriptor {
    /// Realize `spec`, failing if it exceeds [`MAX_LAYOUT_WORDS`].
    pub fn from_spec(spec: &BindingLayoutSpec) -> Result<Self> {
        let mut parameters: Vec<LayoutParameter> = spec
            .direct()
            .map(|b| LayoutParameter::Direct {
                name: b.name.clone(),
                slot: b.slot.unwrap_or_default(),
                stages: b.stages,
            })
            .collect();

        for kind in TABLE_KINDS {
            let members: Vec<&ResourceBinding> = spec.table(kind).collect();
            if members.is_empty() {
                continue;
            }
            parameters.push(LayoutParameter::Table {
                kind,
                ranges: members
                    .iter()
                    .map(|b| (b.name.clone(), b.slot.unwrap_or_default()))
                    .collect(),
                stages: members
                    .iter()
                    .fold(ShaderStageFlags::empty(), |flags, b| flags | b.stages),
            });
        }

        let size_in_words = parameters.iter().map(LayoutParameter::cost).sum();
        if size_in_words > MAX_LAYOUT_WORDS {
            return Err(MaterialError::LayoutTooLarge {
                words: size_in_words,
                limit: MAX_LAYOUT_WORDS,
            });
        }
        Ok(Self {
            parameters,
            size_in_words,
        })
    }
}

/// Merges bindings from several stages and declarations into one spec.
#[derive(Debug, Default)]
pub struct BindingLayoutBuilder {
    bindings: BTreeMap<String, ResourceBinding>,
}

impl BindingLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `bindings` into the layout.
    ///
    /// A name seen before must have the same kind, and its slot must agree
    /// unless one side is unassigned. Stage visibility is unioned.
    pub fn add<'a>(&mut self, bindings: impl IntoIterator<Item = &'a ResourceBinding>) -> Result<()> {
        for incoming in bindings {
            match self.bindings.get_mut(&incoming.name) {
                None => {
                    self.bindings.insert(incoming.name.clone(), incoming.clone());
                }
                Some(existing) => {
                    let slots_agree = match (existing.slot, incoming.slot) {
                        (Some(a), Some(b)) => a == b,
                        _ => true,
                    };
                    if existing.kind != incoming.kind || !slots_agree {
                        let error = MaterialError::DuplicateBinding {
                            name: incoming.name.clone(),
                            existing: existing.to_string(),
                            incoming: incoming.to_string(),
                        };
                        log::error!("{error}");
                        return Err(error);
                    }
                    existing.stages |= incoming.stages;
                    existing.slot = existing.slot.or(incoming.slot);
                }
            }
        }
        Ok(())
    }

    /// Finish the layout: bindings sorted by name, unassigned slots given
    /// consecutive numbers after the highest assigned one.
    pub fn build(self) -> BindingLayoutSpec {
        let mut next_slot = self
            .bindings
            .values()
            .filter_map(|b| b.slot)
            .max()
            .map_or(0, |max| max + 1);

        let bindings = self
            .bindings
            .into_values()
            .map(|mut binding| {
                if binding.slot.is_none() {
                    binding.slot = Some(next_slot);
                    next_slot += 1;
                }
                binding
            })
            .collect();
        BindingLayoutSpec { bindings }
    }
}
