//! GPU construction of a linearized point cloud: Morton ordering, voxel
//! deduplication and a binary radix tree over the voxels, plus per-frame culling.

pub mod camera;
pub mod config;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod lpc;
pub mod point_cloud;

pub use error::{LpcError, Result};
