//! Camera and frustum parameters consumed by the render phases.

use glam::{Mat4, Vec3};

/// Perspective frustum description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Frustum {
    pub fn new(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y,
            aspect,
            near,
            far,
        }
    }

    /// Right-handed projection with a [0, 1] depth range.
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Returns a copy with the aspect ratio of a `width` x `height` target.
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
        self
    }
}

impl Default for Frustum {
    fn default() -> Self {
        Self::new(std::f32::consts::FRAC_PI_4, 4.0 / 3.0, 0.1, 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
}

impl Camera {
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3, frustum: &Frustum) -> Self {
        Self {
            position: eye,
            view: Mat4::look_at_rh(eye, target, up),
            projection: frustum.projection(),
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::look_at(Vec3::new(0.0, 2.0, 6.0), Vec3::ZERO, Vec3::Y, &Frustum::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn look_at_places_target_in_front() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y, &Frustum::default());
        let in_view = camera.view.transform_point3(Vec3::ZERO);
        assert!((in_view.z + 5.0).abs() < 1e-5);
    }

    #[test]
    fn projection_maps_near_and_far_to_unit_depth() {
        let frustum = Frustum::new(1.0, 1.0, 0.5, 50.0);
        let proj = frustum.projection();
        let near = proj.project_point3(Vec3::new(0.0, 0.0, -0.5));
        let far = proj.project_point3(Vec3::new(0.0, 0.0, -50.0));
        assert!(near.z.abs() < 1e-5);
        assert!((far.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn with_viewport_updates_aspect() {
        let f = Frustum::default().with_viewport(800, 400);
        assert_eq!(f.aspect, 2.0);
    }
}
