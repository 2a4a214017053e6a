//! Host-side light registry.
//!
//! Nothing here touches the GPU; the lighting phase reads the registry once
//! per pass and marshals it into shader variables.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Maximum number of point lights uploaded per lighting pass.
pub const MAX_POINT_LIGHTS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels (xyz); w is ignored.
    pub direction: Vec4,
    /// Color intensity (rgb); w scales specular.
    pub intensity: Vec4,
}

impl DirectionalLight {
    pub fn new(direction: Vec3, intensity: Vec3) -> Self {
        Self {
            direction: direction.normalize_or_zero().extend(0.0),
            intensity: intensity.extend(1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// World position (xyz); w is ignored.
    pub position: Vec4,
    pub intensity: Vec3,
    /// Distance at which the contribution reaches zero.
    pub radius: f32,
}

impl PointLight {
    pub fn new(position: Vec3, intensity: Vec3, radius: f32) -> Self {
        Self {
            position: position.extend(1.0),
            intensity,
            radius,
        }
    }
}

/// Point light as laid out in the lighting shader's storage array.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct GpuPointLight {
    pub position: [f32; 4],
    pub intensity: [f32; 3],
    pub radius: f32,
}

impl From<&PointLight> for GpuPointLight {
    fn from(light: &PointLight) -> Self {
        Self {
            position: light.position.to_array(),
            intensity: light.intensity.to_array(),
            radius: light.radius,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LightRegistry {
    directional: Option<DirectionalLight>,
    point_lights: Vec<PointLight>,
    ambient: Vec3,
}

impl LightRegistry {
    pub fn new(ambient: Vec3) -> Self {
        Self {
            ambient,
            ..Default::default()
        }
    }

    /// Replaces the directional light. Last write wins.
    pub fn set_directional(&mut self, light: DirectionalLight) {
        self.directional = Some(light);
    }

    pub fn clear_directional(&mut self) {
        self.directional = None;
    }

    pub fn directional(&self) -> Option<&DirectionalLight> {
        self.directional.as_ref()
    }

    /// Appends a point light and returns its index.
    ///
    /// Indices start at zero and follow insertion order.
    pub fn add_point_light(&mut self, light: PointLight) -> usize {
        self.point_lights.push(light);
        self.point_lights.len() - 1
    }

    /// Mutable access to a previously added light.
    pub fn point_light_mut(&mut self, index: usize) -> Option<&mut PointLight> {
        self.point_lights.get_mut(index)
    }

    pub fn point_lights(&self) -> &[PointLight] {
        &self.point_lights
    }

    pub fn set_ambient(&mut self, color: Vec3) {
        self.ambient = color;
    }

    pub fn ambient(&self) -> Vec3 {
        self.ambient
    }

    /// GPU copies of the first `max` point lights.
    pub fn gpu_point_lights(&self, max: usize) -> Vec<GpuPointLight> {
        self.point_lights
            .iter()
            .take(max)
            .map(GpuPointLight::from)
            .collect()
    }
}
