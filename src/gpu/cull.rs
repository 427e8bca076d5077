use crate::camera::Camera;
use crate::error::Result;
use crate::gpu::buffers::BufferRole;
use crate::gpu::context::{GpuContext, cast_readback};
use crate::gpu::kernels::Kernel;
use crate::gpu::point_store::PointStore;
use crate::gpu::recorder::{PipelineStage, Recorder};
use crate::gpu::types::DrawIndirectCommand;
use bytemuck::bytes_of;

/// Per-frame frustum cull: compacts visible points and fills the indirect draw.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CullStage {
    pub camera: Camera,
}

impl CullStage {
    pub fn new(camera: Camera) -> Self {
        Self { camera }
    }

    /// Append one frame's sequence to `rec`. Nothing is recorded for an empty cloud.
    pub fn record(&self, rec: &mut Recorder, point_count: u32) -> Result<()> {
        if point_count == 0 {
            return Ok(());
        }
        rec.inline_update(
            BufferRole::IndirectDraw,
            DrawIndirectCommand::INSTANCE_COUNT_OFFSET,
            bytes_of(&0u32),
        )?;
        rec.inline_update(
            BufferRole::CameraUniforms,
            0,
            bytes_of(&self.camera.uniforms(point_count)),
        )?;
        rec.barrier(PipelineStage::Transfer, PipelineStage::Compute);
        rec.dispatch_items(Kernel::Cull, point_count)?;
        rec.barrier(PipelineStage::Compute, PipelineStage::DrawIndirect);
        Ok(())
    }

    /// Record and submit a frame without waiting for it.
    pub fn run(&self, ctx: &GpuContext, store: &PointStore) -> Result<()> {
        let Some(kernels) = store.kernels() else {
            return Ok(());
        };
        let mut rec = Recorder::for_registry(store.registry());
        self.record(&mut rec, store.point_count())?;
        ctx.submit(&rec, kernels, store.registry())
    }

    /// Instance count of the last culled frame. Blocks until the device is idle.
    pub fn visible_count(ctx: &GpuContext, store: &PointStore) -> Result<u32> {
        let Some(kernels) = store.kernels() else {
            return Ok(0);
        };
        let mut rec = Recorder::for_registry(store.registry());
        rec.download(BufferRole::IndirectDraw)?;
        let readbacks = ctx.submit_and_wait(&rec, kernels, store.registry())?;
        let command = readbacks
            .get(&BufferRole::IndirectDraw)
            .and_then(|bytes| cast_readback::<DrawIndirectCommand>(bytes).first().copied())
            .unwrap_or_else(DrawIndirectCommand::quads);
        Ok(command.instance_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::is_visible;
    use crate::gpu::recorder::Command;
    use crate::gpu::point_store::StoreOptions;
    use crate::point_cloud::{Point, PointCloudData};

    #[test]
    fn empty_cloud_records_nothing() {
        let mut rec = Recorder::new();
        CullStage::new(Camera::default()).record(&mut rec, 0).unwrap();
        assert!(rec.is_empty());
    }

    #[test]
    fn frame_is_reset_barrier_dispatch_barrier() {
        let mut rec = Recorder::new();
        CullStage::new(Camera::default()).record(&mut rec, 1000).unwrap();
        let commands = rec.commands();
        assert_eq!(commands.len(), 5);
        assert!(matches!(
            &commands[0],
            Command::Write { role: BufferRole::IndirectDraw, offset: 4, data } if data == &[0; 4]
        ));
        assert!(matches!(
            commands[1],
            Command::Write {
                role: BufferRole::CameraUniforms,
                ..
            }
        ));
        assert_eq!(
            commands[2],
            Command::Barrier {
                src: PipelineStage::Transfer,
                dst: PipelineStage::Compute
            }
        );
        assert_eq!(
            commands[3],
            Command::Dispatch {
                kernel: Kernel::Cull,
                groups: [4, 1, 1]
            }
        );
        assert_eq!(
            commands[4],
            Command::Barrier {
                src: PipelineStage::Compute,
                dst: PipelineStage::DrawIndirect
            }
        );
    }

    #[test]
    fn gpu_count_matches_host_test() {
        let Ok(ctx) = GpuContext::headless() else {
            return;
        };
        let mut points = Vec::new();
        for x in 0..20 {
            for z in 0..20 {
                points.push(Point::at([x as f32 * 10.0, 100.0, z as f32 * 10.0]));
            }
        }
        let cloud = PointCloudData::from_points(points);
        let camera = Camera::default();
        let vp = camera.view_proj();
        let expected = cloud
            .points()
            .iter()
            .filter(|p| is_visible(&vp, p.position))
            .count() as u32;
        assert!(expected > 0);

        let store = PointStore::new(&ctx, cloud, StoreOptions::default()).unwrap();
        let stage = CullStage::new(camera);
        stage.run(&ctx, &store).unwrap();
        assert_eq!(CullStage::visible_count(&ctx, &store).unwrap(), expected);

        // A second frame starts from a reset counter.
        stage.run(&ctx, &store).unwrap();
        assert_eq!(CullStage::visible_count(&ctx, &store).unwrap(), expected);
    }
}
