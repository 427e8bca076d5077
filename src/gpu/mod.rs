pub mod buffers;
pub mod context;
pub mod cull;
pub mod dispatch;
pub mod kernels;
pub mod lpc_pipeline;
pub mod point_store;
pub mod recorder;
pub mod shader_loader;
pub mod types;
