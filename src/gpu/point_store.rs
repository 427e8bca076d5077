use crate::error::Result;
use crate::geometry::aabb::Aabb;
use crate::gpu::buffers::{BufferRegistry, BufferRole};
use crate::gpu::context::GpuContext;
use crate::gpu::kernels::{Kernel, KernelSet};
use crate::gpu::types::{BitonicParams, CameraUniforms, DrawIndirectCommand, LpcUniforms};
use crate::lpc::radix_tree::Node;
use crate::point_cloud::{Point, PointCloudData};
use bytemuck::{bytes_of, cast_slice};
use wgpu::Buffer;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Give the reorder stage its own allocation instead of borrowing the visible
    /// point buffer.
    pub dedicated_scratch: bool,
}

const POINT_BYTES: u64 = size_of::<Point>() as u64;
const WORD_BYTES: u64 = size_of::<u32>() as u64;
const NODE_BYTES: u64 = size_of::<Node>() as u64;

/// Owns the decoded cloud and every GPU buffer derived from it.
///
/// An empty cloud allocates nothing and every accessor returns `None`.
pub struct PointStore {
    cloud: PointCloudData,
    registry: BufferRegistry,
    kernels: Option<KernelSet>,
}

impl PointStore {
    pub fn new(ctx: &GpuContext, cloud: PointCloudData, options: StoreOptions) -> Result<Self> {
        let mut registry = BufferRegistry::new();
        if cloud.is_empty() {
            log::warn!("point store is empty, no GPU buffers created");
            return Ok(Self {
                cloud,
                registry,
                kernels: None,
            });
        }

        let device = &ctx.device;
        let n = cloud.len() as u64;
        let points_bytes = n * POINT_BYTES;
        let words_bytes = n * WORD_BYTES;

        registry.allocate_init(device, BufferRole::SourcePoints, cast_slice(cloud.points()))?;
        registry.allocate(device, BufferRole::VisiblePoints, points_bytes)?;
        if options.dedicated_scratch {
            registry.allocate(device, BufferRole::ReorderScratch, points_bytes)?;
        } else {
            registry.alias(BufferRole::ReorderScratch, BufferRole::VisiblePoints);
        }
        registry.allocate_init(
            device,
            BufferRole::IndirectDraw,
            bytes_of(&DrawIndirectCommand::quads()),
        )?;
        registry.allocate(
            device,
            BufferRole::CameraUniforms,
            size_of::<CameraUniforms>() as u64,
        )?;

        for role in [
            BufferRole::MortonCodes,
            BufferRole::SortIndices,
            BufferRole::HeadFlags,
            BufferRole::ScannedIndices,
            BufferRole::UniqueCodes,
            BufferRole::VoxelStarts,
        ] {
            registry.allocate(device, role, words_bytes)?;
        }
        registry.allocate(
            device,
            BufferRole::BitonicParams,
            size_of::<BitonicParams>() as u64,
        )?;
        // Two slots per point: U leaves plus U - 1 internal nodes always fit.
        registry.allocate(device, BufferRole::Nodes, 2 * n * NODE_BYTES)?;
        registry.allocate_init(
            device,
            BufferRole::LpcUniforms,
            bytes_of(&LpcUniforms::new(&cloud.bounds(), n as u32, 0)),
        )?;

        let mut kernels = vec![Kernel::Cull];
        kernels.extend(Kernel::LPC);
        let kernels = KernelSet::new(device, &registry, &kernels)?;

        log::info!(
            "point store ready: {} points, {} buffers, {} scratch",
            n,
            registry.len(),
            if options.dedicated_scratch { "dedicated" } else { "aliased" }
        );

        Ok(Self {
            cloud,
            registry,
            kernels: Some(kernels),
        })
    }

    pub fn cloud(&self) -> &PointCloudData {
        &self.cloud
    }

    pub fn point_count(&self) -> u32 {
        self.cloud.len() as u32
    }

    pub fn bounds(&self) -> Aabb {
        self.cloud.bounds()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn registry(&self) -> &BufferRegistry {
        &self.registry
    }

    pub fn kernels(&self) -> Option<&KernelSet> {
        self.kernels.as_ref()
    }

    pub fn buffer(&self, role: BufferRole) -> Option<&Buffer> {
        self.registry.get(role)
    }

    pub fn source_points(&self) -> Option<&Buffer> {
        self.buffer(BufferRole::SourcePoints)
    }

    /// Culling output. After a build with aliased scratch it holds the points in
    /// Morton order until the next culling frame overwrites it.
    pub fn visible_points(&self) -> Option<&Buffer> {
        self.buffer(BufferRole::VisiblePoints)
    }

    pub fn indirect_draw(&self) -> Option<&Buffer> {
        self.buffer(BufferRole::IndirectDraw)
    }

    pub fn camera_uniforms(&self) -> Option<&Buffer> {
        self.buffer(BufferRole::CameraUniforms)
    }

    pub fn morton_codes(&self) -> Option<&Buffer> {
        self.buffer(BufferRole::MortonCodes)
    }

    pub fn sort_indices(&self) -> Option<&Buffer> {
        self.buffer(BufferRole::SortIndices)
    }

    pub fn head_flags(&self) -> Option<&Buffer> {
        self.buffer(BufferRole::HeadFlags)
    }

    pub fn scanned_indices(&self) -> Option<&Buffer> {
        self.buffer(BufferRole::ScannedIndices)
    }

    pub fn unique_codes(&self) -> Option<&Buffer> {
        self.buffer(BufferRole::UniqueCodes)
    }

    pub fn voxel_starts(&self) -> Option<&Buffer> {
        self.buffer(BufferRole::VoxelStarts)
    }

    pub fn nodes(&self) -> Option<&Buffer> {
        self.buffer(BufferRole::Nodes)
    }

    pub fn lpc_uniforms(&self) -> Option<&Buffer> {
        self.buffer(BufferRole::LpcUniforms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Option<GpuContext> {
        GpuContext::headless().ok()
    }

    #[test]
    fn empty_cloud_allocates_nothing() {
        let Some(ctx) = context() else {
            return;
        };
        let store = PointStore::new(&ctx, PointCloudData::empty(), StoreOptions::default()).unwrap();
        assert!(store.is_empty());
        assert!(store.kernels().is_none());
        for role in BufferRole::ALL {
            assert!(store.buffer(role).is_none(), "{role:?}");
        }
    }

    #[test]
    fn scratch_aliases_visible_points_by_default() {
        let Some(ctx) = context() else {
            return;
        };
        let cloud = PointCloudData::from_points(vec![Point::at([0.0; 3]), Point::at([1.0; 3])]);

        let store = PointStore::new(&ctx, cloud.clone(), StoreOptions::default()).unwrap();
        assert!(store.registry().is_alias(BufferRole::ReorderScratch));
        assert_eq!(store.nodes().map(Buffer::size), Some(4 * NODE_BYTES));
        assert_eq!(store.head_flags().map(Buffer::size), Some(2 * WORD_BYTES));

        let options = StoreOptions {
            dedicated_scratch: true,
        };
        let store = PointStore::new(&ctx, cloud, options).unwrap();
        assert!(!store.registry().is_alias(BufferRole::ReorderScratch));
        assert_eq!(
            store.registry().size(BufferRole::ReorderScratch),
            Some(2 * POINT_BYTES)
        );
    }
}
