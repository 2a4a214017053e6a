//! Screen-space ambient occlusion stage.
//!
//! Reads the Position and Normal channels, writes raw occlusion into PreSSAO
//! and a blurred copy into PostSSAO. No other channel is touched.

use std::f32::consts::TAU;

use glam::{Vec2, Vec3};

use crate::camera::{Camera, Frustum};
use crate::error::RenderError;
use crate::gfx::{
    Effect, EffectDesc, GraphicsDevice, PassDesc, TechniqueDesc, TextureSample, Variable,
    VariableDesc, VariableKind,
};

use super::config::{SsaoConfig, MAX_SSAO_KERNEL_SIZE};
use super::gbuffer::{GBuffer, GBufferSet};
use super::quad::{FullscreenQuad, QUAD_INPUT_LAYOUT};

const SSAO_VARIABLES: &[VariableDesc] = &[
    VariableDesc::new("gView", VariableKind::Mat4),
    VariableDesc::new("gProjection", VariableKind::Mat4),
    VariableDesc::new("gNearFar", VariableKind::Vec2),
    VariableDesc::new("gRadius", VariableKind::Float),
    VariableDesc::new("gBias", VariableKind::Float),
    VariableDesc::new("gIntensity", VariableKind::Float),
    VariableDesc::new("gKernelSize", VariableKind::Int),
    VariableDesc::new("gBlurRadius", VariableKind::Int),
    VariableDesc::new("gTexelSize", VariableKind::Vec2),
    VariableDesc::new(
        "gKernel",
        VariableKind::Buffer {
            element_size: 16,
            max_elements: MAX_SSAO_KERNEL_SIZE,
        },
    ),
    VariableDesc::new(
        "gPositionBuffer",
        VariableKind::Texture(TextureSample::UnfilterableFloat),
    ),
    VariableDesc::new(
        "gNormalBuffer",
        VariableKind::Texture(TextureSample::UnfilterableFloat),
    ),
    VariableDesc::new(
        "gOcclusionInput",
        VariableKind::Texture(TextureSample::UnfilterableFloat),
    ),
];

pub const SSAO_EFFECT: EffectDesc = EffectDesc {
    label: "ssao",
    source: include_str!("shaders/ssao.wgsl"),
    input_layout: QUAD_INPUT_LAYOUT,
    techniques: &[
        TechniqueDesc {
            name: "Occlusion",
            passes: &[PassDesc::new("P0", "vs_main", "fs_occlusion")],
        },
        TechniqueDesc {
            name: "Blur",
            passes: &[PassDesc::new("P0", "vs_main", "fs_blur")],
        },
    ],
    variables: SSAO_VARIABLES,
};

/// Deterministic sample kernel over the +z unit hemisphere.
///
/// Directions follow a Hammersley sequence with cosine weighting; lengths grow
/// quadratically so most samples stay close to the shaded point.
pub fn hemisphere_kernel(size: u32) -> Vec<[f32; 4]> {
    let n = size.max(1) as f32;
    (0..size)
        .map(|i| {
            let u = (i as f32 + 0.5) / n;
            let v = i.reverse_bits() as f32 * (1.0 / 4_294_967_296.0);

            let cos_theta = (1.0 - u).sqrt();
            let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
            let phi = TAU * v;
            let dir = Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta);

            let t = i as f32 / n;
            let scale = 0.1 + 0.9 * t * t;
            (dir * scale).extend(0.0).to_array()
        })
        .collect()
}

pub struct SsaoStage<D: GraphicsDevice> {
    effect: D::Effect,
    config: SsaoConfig,
}

impl<D: GraphicsDevice> SsaoStage<D> {
    pub fn new(device: &mut D, config: SsaoConfig) -> Result<Self, RenderError> {
        let mut effect = device
            .create_effect(&SSAO_EFFECT)
            .map_err(RenderError::allocation("ssao effect"))?;

        let kernel = hemisphere_kernel(config.kernel_size.min(MAX_SSAO_KERNEL_SIZE));
        effect.set_variable("gKernel", Variable::raw(&kernel));
        effect.set_variable("gKernelSize", kernel.len() as i32);
        effect.set_variable("gRadius", config.radius);
        effect.set_variable("gBias", config.bias);
        effect.set_variable("gIntensity", config.intensity);
        effect.set_variable("gBlurRadius", config.blur_radius as i32);

        Ok(Self { effect, config })
    }

    pub fn config(&self) -> &SsaoConfig {
        &self.config
    }

    /// Runs occlusion then blur and returns the PostSSAO view.
    ///
    /// Leaves no render targets bound.
    pub fn apply<'g>(
        &mut self,
        device: &mut D,
        quad: &FullscreenQuad<D>,
        gbuffer: &'g GBufferSet<D>,
        camera: &Camera,
        frustum: &Frustum,
    ) -> &'g D::ShaderResourceView {
        let (width, height) = gbuffer.size();
        let effect = &mut self.effect;

        effect.set_variable("gView", camera.view);
        effect.set_variable("gProjection", camera.projection);
        effect.set_variable("gNearFar", Vec2::new(frustum.near, frustum.far));
        effect.set_variable(
            "gTexelSize",
            Vec2::new(1.0 / width as f32, 1.0 / height as f32),
        );
        effect.set_variable("gPositionBuffer", gbuffer.srv(GBuffer::Position));
        effect.set_variable("gNormalBuffer", gbuffer.srv(GBuffer::Normal));

        if let Some(target) = gbuffer.rtv(GBuffer::PreSsao) {
            // PreSSAO is the target; it must not be sampled in the same pass.
            effect.set("gOcclusionInput", Variable::Texture(None));
            device.set_render_targets(&[target], None);
            quad.draw_technique(device, effect, "Occlusion");
        }

        if let Some(target) = gbuffer.rtv(GBuffer::PostSsao) {
            effect.set_variable("gOcclusionInput", gbuffer.srv(GBuffer::PreSsao));
            device.set_render_targets(&[target], None);
            quad.draw_technique(device, effect, "Blur");
        }

        // Drop the sampled views so later passes may render into them.
        effect.unbind_textures();
        device.unbind_render_targets();

        log::trace!("ssao applied at {width}x{height}");
        gbuffer.srv(GBuffer::PostSsao)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_has_requested_size() {
        assert_eq!(hemisphere_kernel(16).len(), 16);
        assert!(hemisphere_kernel(0).is_empty());
    }

    #[test]
    fn kernel_lies_in_unit_hemisphere() {
        for s in hemisphere_kernel(64) {
            let v = Vec3::new(s[0], s[1], s[2]);
            assert!(v.z >= 0.0, "sample below the surface: {v:?}");
            assert!(v.length() <= 1.0 + 1e-5);
            assert!(v.length() >= 0.1 - 1e-5);
            assert_eq!(s[3], 0.0);
        }
    }

    #[test]
    fn kernel_is_deterministic() {
        assert_eq!(hemisphere_kernel(32), hemisphere_kernel(32));
    }

    #[test]
    fn effect_description_is_valid() {
        assert!(SSAO_EFFECT.validate().is_ok());
    }
}
