use crate::gpu::types::CameraUniforms;
use glam::{Mat4, Vec3, Vec4};
use serde::Deserialize;

/// Perspective camera used to build the culling frame's view-projection.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Camera {
    pub eye: [f32; 3],
    pub target: [f32; 3],
    pub up: [f32; 3],
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    // Looking along yaw -135 degrees from (100, 100, 100).
    fn default() -> Self {
        Self {
            eye: [100.0, 100.0, 100.0],
            target: [0.0, 100.0, 0.0],
            up: [0.0, 1.0, 0.0],
            fov_y_degrees: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 10000.0,
        }
    }
}

impl Camera {
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(
            Vec3::from(self.eye),
            Vec3::from(self.target),
            Vec3::from(self.up),
        )
    }

    /// Depth maps to [0, 1].
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect,
            self.near,
            self.far,
        )
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection() * self.view()
    }

    pub fn uniforms(&self, point_count: u32) -> CameraUniforms {
        CameraUniforms::new(self.view_proj().to_cols_array_2d(), point_count)
    }
}

/// Host version of the cull kernel's clip-space test.
pub fn is_visible(view_proj: &Mat4, position: [f32; 3]) -> bool {
    let clip: Vec4 = *view_proj * Vec3::from(position).extend(1.0);
    clip.w > 0.0
        && clip.x.abs() <= clip.w
        && clip.y.abs() <= clip.w
        && clip.z >= 0.0
        && clip.z <= clip.w
}
