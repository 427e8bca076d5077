use crate::error::{LpcError, Result};
use crate::gpu::buffers::{BufferRegistry, BufferRole};
use crate::gpu::kernels::KernelSet;
use crate::gpu::recorder::{Command, Recorder};
use std::collections::HashMap;
use wgpu::util::{BufferInitDescriptor, DeviceExt};
use wgpu::{
    Buffer, BufferDescriptor, BufferUsages, CommandBuffer, CommandEncoderDescriptor,
    ComputePassDescriptor, Device, DeviceDescriptor, Features, MapMode, PollType,
    PowerPreference, Queue, RequestAdapterOptions,
};

/// Bytes downloaded by a blocking submission, keyed by buffer role.
pub type Readbacks = HashMap<BufferRole, Vec<u8>>;

pub struct GpuContext {
    pub device: Device,
    pub queue: Queue,
}

struct Encoded {
    commands: CommandBuffer,
    staging: Vec<(BufferRole, Buffer)>,
}

impl GpuContext {
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);

        let limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(&DeviceDescriptor {
                label: Some("pointspire device"),
                required_features: Features::empty(),
                required_limits: limits,
                experimental_features: Default::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await?;

        Ok(Self { device, queue })
    }

    /// Blocking constructor for command line use and tests.
    pub fn headless() -> Result<Self> {
        pollster::block_on(Self::new())
    }

    fn encode(
        &self,
        recorder: &Recorder,
        kernels: &KernelSet,
        registry: &BufferRegistry,
    ) -> Result<Encoded> {
        let commands = recorder.commands();

        // One upload arena per submission; copies out of it keep host writes ordered
        // with respect to the dispatches around them.
        let mut arena = Vec::new();
        let mut arena_offsets = Vec::new();
        for command in commands {
            if let Command::Write { data, .. } = command {
                arena_offsets.push(arena.len() as u64);
                arena.extend_from_slice(data);
                arena.resize(arena.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);
            }
        }
        let arena_buffer = (!arena.is_empty()).then(|| {
            self.device.create_buffer_init(&BufferInitDescriptor {
                label: Some("upload arena buffer"),
                contents: &arena,
                usage: BufferUsages::COPY_SRC,
            })
        });

        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("recorded submission"),
        });
        let mut staging = Vec::with_capacity(recorder.downloads().count());
        let mut writes = arena_offsets.into_iter();
        let mut i = 0;
        while i < commands.len() {
            match &commands[i] {
                Command::Write { role, offset, data } => {
                    let target = registry.require(*role)?;
                    if let (Some(arena_buffer), Some(src_offset)) = (&arena_buffer, writes.next()) {
                        let len = (data.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
                        encoder.copy_buffer_to_buffer(arena_buffer, src_offset, target, *offset, len);
                    }
                    i += 1;
                }
                // wgpu derives the pipeline barriers from pass usage scopes; closing the
                // pass is enough.
                Command::Barrier { .. } => i += 1,
                Command::Dispatch { .. } => {
                    let end = commands[i..]
                        .iter()
                        .position(|c| !matches!(c, Command::Dispatch { .. }))
                        .map_or(commands.len(), |p| i + p);
                    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                        label: Some("recorded dispatches"),
                        timestamp_writes: None,
                    });
                    for command in &commands[i..end] {
                        if let Command::Dispatch { kernel, groups } = command {
                            let (pipeline, bind_group) =
                                kernels.get(*kernel).ok_or(LpcError::MissingKernel(*kernel))?;
                            pass.set_pipeline(pipeline);
                            pass.set_bind_group(0, bind_group, &[]);
                            let [x, y, z] = *groups;
                            pass.dispatch_workgroups(x, y, z);
                        }
                    }
                    i = end;
                }
                Command::Download { role } => {
                    let source = registry.require(*role)?;
                    let readback = self.device.create_buffer(&BufferDescriptor {
                        label: Some("readback buffer"),
                        size: source.size(),
                        usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    });
                    encoder.copy_buffer_to_buffer(source, 0, &readback, 0, source.size());
                    staging.push((*role, readback));
                    i += 1;
                }
            }
        }

        Ok(Encoded {
            commands: encoder.finish(),
            staging,
        })
    }

    /// Submit without waiting. Downloads in the recording are not collected.
    pub fn submit(
        &self,
        recorder: &Recorder,
        kernels: &KernelSet,
        registry: &BufferRegistry,
    ) -> Result<()> {
        let encoded = self.encode(recorder, kernels, registry)?;
        self.queue.submit([encoded.commands]);
        Ok(())
    }

    /// Submit, block until the device is idle and return every downloaded buffer.
    pub fn submit_and_wait(
        &self,
        recorder: &Recorder,
        kernels: &KernelSet,
        registry: &BufferRegistry,
    ) -> Result<Readbacks> {
        let encoded = self.encode(recorder, kernels, registry)?;
        self.queue.submit([encoded.commands]);
        self.device.poll(PollType::wait_indefinitely())?;

        let mut readbacks = Readbacks::new();
        for (role, buffer) in encoded.staging {
            let bytes = self.map_read(&buffer)?;
            buffer.destroy();
            readbacks.insert(role, bytes);
        }
        Ok(readbacks)
    }

    fn map_read(&self, buffer: &Buffer) -> Result<Vec<u8>> {
        let slice = buffer.slice(..);
        let (tx, rx) = flume::bounded(1);
        slice.map_async(MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device.poll(PollType::wait_indefinitely())?;
        rx.recv().map_err(|_| LpcError::ReadbackChannel)??;

        let bytes = slice.get_mapped_range().to_vec();
        buffer.unmap();
        Ok(bytes)
    }
}

/// Decode a readback into typed values, ignoring a trailing partial element.
pub fn cast_readback<T: bytemuck::Pod>(bytes: &[u8]) -> Vec<T> {
    let whole = bytes.len() - bytes.len() % size_of::<T>();
    bytemuck::pod_collect_to_vec(&bytes[..whole])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cast_readback_handles_unaligned_vec() {
        let values = [1u32, 2, 3];
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(bytemuck::cast_slice(&values));
        assert_eq!(cast_readback::<u32>(&bytes[1..]), values);
        assert_eq!(cast_readback::<u32>(&bytes[1..12]), vec![1, 2]);
    }
}
