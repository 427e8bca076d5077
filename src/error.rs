use crate::gpu::buffers::BufferRole;
use crate::gpu::kernels::Kernel;
use crate::gpu::recorder::PipelineStage;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LpcError {
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("{label} size {bytes} exceeds device limit {limit}")]
    BufferTooLarge {
        label: &'static str,
        bytes: u64,
        limit: u64,
    },

    #[error("buffer role {0:?} is not allocated")]
    MissingBuffer(BufferRole),

    #[error("kernel {0:?} was not compiled into this kernel set")]
    MissingKernel(Kernel),

    #[error("{kernel:?} accesses {role:?} written by {writer:?} without a barrier to {stage:?}")]
    MissingBarrier {
        kernel: Option<Kernel>,
        role: BufferRole,
        writer: PipelineStage,
        stage: PipelineStage,
    },

    #[error("inline update of {role:?} is {bytes} bytes, limit is {limit}")]
    InlineUpdateTooLarge {
        role: BufferRole,
        bytes: usize,
        limit: usize,
    },

    #[error("failed to map readback buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("readback completion channel closed")]
    ReadbackChannel,

    #[error("failed to read point file {path}: {source}")]
    PointFile {
        path: PathBuf,
        #[source]
        source: las::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("LPC validation failed: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, LpcError>;
