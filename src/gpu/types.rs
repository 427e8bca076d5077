use crate::geometry::aabb::Aabb;
use bytemuck::{Pod, Zeroable};

/// Build-wide constants shared by every LPC kernel.
///
/// `unique_count` is a placeholder (0) until the host scan has run.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct LpcUniforms {
    pub bounds_min: [f32; 4],
    pub bounds_max: [f32; 4],
    pub point_count: u32,
    pub unique_count: u32,
    _pad: [u32; 2],
}

impl LpcUniforms {
    pub fn new(bounds: &Aabb, point_count: u32, unique_count: u32) -> Self {
        let [x0, y0, z0] = bounds.min;
        let [x1, y1, z1] = bounds.max;
        Self {
            bounds_min: [x0, y0, z0, 0.0],
            bounds_max: [x1, y1, z1, 0.0],
            point_count,
            unique_count,
            _pad: [0; 2],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct BitonicParams {
    pub j: u32,
    pub k: u32,
    pub count: u32,
    _pad: u32,
}

impl BitonicParams {
    pub fn new(j: u32, k: u32, count: u32) -> Self {
        Self { j, k, count, _pad: 0 }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub point_count: u32,
    _pad: [u32; 3],
}

impl CameraUniforms {
    pub fn new(view_proj: [[f32; 4]; 4], point_count: u32) -> Self {
        Self {
            view_proj,
            point_count,
            _pad: [0; 3],
        }
    }
}

/// Arguments of a non-indexed indirect draw; one camera-facing quad per visible point.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndirectCommand {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

impl DrawIndirectCommand {
    pub const QUAD_VERTICES: u32 = 6;
    pub const INSTANCE_COUNT_OFFSET: u64 = 4;

    pub fn quads() -> Self {
        Self {
            vertex_count: Self::QUAD_VERTICES,
            instance_count: 0,
            first_vertex: 0,
            first_instance: 0,
        }
    }
}
