use crate::error::{LpcError, Result};
use std::collections::HashMap;
use wgpu::util::{BufferInitDescriptor, DeviceExt};
use wgpu::{Buffer, BufferDescriptor, BufferUsages, Device};

/// Semantic slot of every GPU buffer the point store owns.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferRole {
    SourcePoints,
    VisiblePoints,
    /// Gather target of the reorder stage; aliases `VisiblePoints` unless a dedicated
    /// scratch allocation was requested.
    ReorderScratch,
    IndirectDraw,
    CameraUniforms,
    MortonCodes,
    SortIndices,
    BitonicParams,
    HeadFlags,
    ScannedIndices,
    UniqueCodes,
    VoxelStarts,
    Nodes,
    LpcUniforms,
}

impl BufferRole {
    pub const ALL: [BufferRole; 14] = [
        BufferRole::SourcePoints,
        BufferRole::VisiblePoints,
        BufferRole::ReorderScratch,
        BufferRole::IndirectDraw,
        BufferRole::CameraUniforms,
        BufferRole::MortonCodes,
        BufferRole::SortIndices,
        BufferRole::BitonicParams,
        BufferRole::HeadFlags,
        BufferRole::ScannedIndices,
        BufferRole::UniqueCodes,
        BufferRole::VoxelStarts,
        BufferRole::Nodes,
        BufferRole::LpcUniforms,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BufferRole::SourcePoints => "source points buffer",
            BufferRole::VisiblePoints => "visible points buffer",
            BufferRole::ReorderScratch => "reorder scratch buffer",
            BufferRole::IndirectDraw => "indirect draw buffer",
            BufferRole::CameraUniforms => "camera uniforms buffer",
            BufferRole::MortonCodes => "morton codes buffer",
            BufferRole::SortIndices => "sort indices buffer",
            BufferRole::BitonicParams => "bitonic params buffer",
            BufferRole::HeadFlags => "head flags buffer",
            BufferRole::ScannedIndices => "scanned indices buffer",
            BufferRole::UniqueCodes => "unique codes buffer",
            BufferRole::VoxelStarts => "voxel starts buffer",
            BufferRole::Nodes => "nodes buffer",
            BufferRole::LpcUniforms => "lpc uniforms buffer",
        }
    }

    pub fn is_uniform(self) -> bool {
        matches!(
            self,
            BufferRole::CameraUniforms | BufferRole::BitonicParams | BufferRole::LpcUniforms
        )
    }

    pub fn usage(self) -> BufferUsages {
        match self {
            BufferRole::IndirectDraw => {
                BufferUsages::INDIRECT
                    | BufferUsages::STORAGE
                    | BufferUsages::COPY_DST
                    | BufferUsages::COPY_SRC
            }
            role if role.is_uniform() => {
                BufferUsages::UNIFORM | BufferUsages::COPY_DST | BufferUsages::COPY_SRC
            }
            _ => BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
        }
    }
}

/// Owns every buffer of a point store, keyed by role. Dropping the registry releases
/// all of them at once.
#[derive(Default)]
pub struct BufferRegistry {
    buffers: HashMap<BufferRole, Buffer>,
    aliases: HashMap<BufferRole, BufferRole>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_size(device: &Device, role: BufferRole, bytes: u64) -> Result<u64> {
        let limits = device.limits();
        let too_large = |limit: u64| LpcError::BufferTooLarge {
            label: role.label(),
            bytes,
            limit,
        };
        if bytes > limits.max_buffer_size {
            return Err(too_large(limits.max_buffer_size));
        }
        let binding_limit = if role.is_uniform() {
            limits.max_uniform_buffer_binding_size as u64
        } else {
            limits.max_storage_buffer_binding_size as u64
        };
        if bytes > binding_limit {
            return Err(too_large(binding_limit));
        }
        Ok(bytes)
    }

    /// Create an uninitialised buffer for `role`.
    pub fn allocate(&mut self, device: &Device, role: BufferRole, bytes: u64) -> Result<()> {
        let size = Self::check_size(device, role, bytes)?;
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(role.label()),
            size,
            usage: role.usage(),
            mapped_at_creation: false,
        });
        self.insert(role, buffer);
        Ok(())
    }

    /// Create a buffer for `role` initialised from host memory.
    pub fn allocate_init(&mut self, device: &Device, role: BufferRole, contents: &[u8]) -> Result<()> {
        Self::check_size(device, role, contents.len() as u64)?;
        let buffer = device.create_buffer_init(&BufferInitDescriptor {
            label: Some(role.label()),
            contents,
            usage: role.usage(),
        });
        self.insert(role, buffer);
        Ok(())
    }

    fn insert(&mut self, role: BufferRole, buffer: Buffer) {
        self.aliases.remove(&role);
        if let Some(old) = self.buffers.insert(role, buffer) {
            old.destroy();
        }
    }

    /// Make `role` resolve to the allocation of `target`.
    pub fn alias(&mut self, role: BufferRole, target: BufferRole) {
        if let Some(old) = self.buffers.remove(&role) {
            old.destroy();
        }
        self.aliases.insert(role, target);
    }

    pub fn is_alias(&self, role: BufferRole) -> bool {
        self.aliases.contains_key(&role)
    }

    /// Every `(role, target)` pair where `role` shares the allocation of `target`.
    pub fn aliases(&self) -> impl Iterator<Item = (BufferRole, BufferRole)> + '_ {
        self.aliases.iter().map(|(role, target)| (*role, *target))
    }

    fn resolve(&self, role: BufferRole) -> BufferRole {
        self.aliases.get(&role).copied().unwrap_or(role)
    }

    pub fn get(&self, role: BufferRole) -> Option<&Buffer> {
        self.buffers.get(&self.resolve(role))
    }

    pub fn require(&self, role: BufferRole) -> Result<&Buffer> {
        self.get(role).ok_or(LpcError::MissingBuffer(role))
    }

    pub fn size(&self, role: BufferRole) -> Option<u64> {
        self.get(role).map(Buffer::size)
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }
}

impl Drop for BufferRegistry {
    fn drop(&mut self) {
        for buffer in self.buffers.values() {
            buffer.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_roles_are_uniform_buffers() {
        for role in BufferRole::ALL {
            let usage = role.usage();
            assert_eq!(role.is_uniform(), usage.contains(BufferUsages::UNIFORM), "{role:?}");
            assert_ne!(role.is_uniform(), usage.contains(BufferUsages::STORAGE), "{role:?}");
        }
    }

    #[test]
    fn head_flags_can_be_downloaded() {
        assert!(BufferRole::HeadFlags.usage().contains(BufferUsages::COPY_SRC));
        assert!(BufferRole::IndirectDraw.usage().contains(BufferUsages::INDIRECT));
    }

    #[test]
    fn empty_registry_resolves_nothing() {
        let mut registry = BufferRegistry::new();
        registry.alias(BufferRole::ReorderScratch, BufferRole::VisiblePoints);
        assert!(registry.is_empty());
        assert!(registry.is_alias(BufferRole::ReorderScratch));
        assert_eq!(
            registry.aliases().collect::<Vec<_>>(),
            vec![(BufferRole::ReorderScratch, BufferRole::VisiblePoints)]
        );
        assert!(registry.get(BufferRole::ReorderScratch).is_none());
        assert!(matches!(
            registry.require(BufferRole::Nodes),
            Err(LpcError::MissingBuffer(BufferRole::Nodes))
        ));
    }
}
