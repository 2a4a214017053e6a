use glam::{Vec3, Vec4};

use crate::camera::{Camera, Frustum};
use crate::error::RenderError;
use crate::gfx::{
    Effect, EffectDesc, GraphicsDevice, PassDesc, TechniqueDesc, TextureSample, Variable,
    VariableDesc, VariableKind, ViewInfo, ViewSource,
};

use super::config::RendererConfig;
use super::gbuffer::{GBuffer, GBufferSet, GBufferView};
use super::lights::{DirectionalLight, LightRegistry, PointLight, MAX_POINT_LIGHTS};
use super::phase::{Phase, PhaseTracker};
use super::quad::{FullscreenQuad, QUAD_INPUT_LAYOUT};
use super::ssao::SsaoStage;

const LIGHTING_VARIABLES: &[VariableDesc] = &[
    VariableDesc::new("gView", VariableKind::Mat4),
    VariableDesc::new("gProjection", VariableKind::Mat4),
    VariableDesc::new("gCameraPosition", VariableKind::Vec3),
    VariableDesc::new("gPointLightCount", VariableKind::Int),
    VariableDesc::new("gAmbientLight", VariableKind::Vec3),
    VariableDesc::new("gDirectionalLightEnabled", VariableKind::Bool),
    VariableDesc::new("gDirectionalLightDirection", VariableKind::Vec4),
    VariableDesc::new("gDirectionalLightIntensity", VariableKind::Vec4),
    VariableDesc::new("gSSAOEnabled", VariableKind::Bool),
    VariableDesc::new(
        "gPointLights",
        VariableKind::Buffer {
            element_size: 32,
            max_elements: MAX_POINT_LIGHTS as u32,
        },
    ),
    VariableDesc::new(
        "gColorBuffer",
        VariableKind::Texture(TextureSample::UnfilterableFloat),
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
        "gMaterialBuffer",
        VariableKind::Texture(TextureSample::UnfilterableFloat),
    ),
    VariableDesc::new("gDepthBuffer", VariableKind::Texture(TextureSample::Depth)),
    VariableDesc::new(
        "gOcclusion",
        VariableKind::Texture(TextureSample::UnfilterableFloat),
    ),
];

pub const LIGHTING_EFFECT: EffectDesc = EffectDesc {
    label: "deferred lighting",
    source: include_str!("shaders/lighting.wgsl"),
    input_layout: QUAD_INPUT_LAYOUT,
    techniques: &[TechniqueDesc {
        name: "Lighting",
        passes: &[PassDesc::new("P0", "vs_main", "fs_lighting")],
    }],
    variables: LIGHTING_VARIABLES,
};

const BUFFER_VIEW_VARIABLES: &[VariableDesc] = &[
    VariableDesc::new("gChannelCount", VariableKind::Int),
    VariableDesc::new("gDepthExponent", VariableKind::Float),
    VariableDesc::new(
        "gTexture",
        VariableKind::Texture(TextureSample::UnfilterableFloat),
    ),
    VariableDesc::new("gDepthTexture", VariableKind::Texture(TextureSample::Depth)),
];

pub const BUFFER_VIEW_EFFECT: EffectDesc = EffectDesc {
    label: "buffer view",
    source: include_str!("shaders/buffer_view.wgsl"),
    input_layout: QUAD_INPUT_LAYOUT,
    techniques: &[
        TechniqueDesc {
            name: "ShowColor",
            passes: &[PassDesc::new("P0", "vs_main", "fs_color")],
        },
        TechniqueDesc {
            name: "ShowDepth",
            passes: &[PassDesc::new("P0", "vs_main", "fs_depth")],
        },
    ],
    variables: BUFFER_VIEW_VARIABLES,
};

/// Values written by [`DeferredRenderer::clear_geometry_buffers`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GBufferClear {
    /// Background color; pixels left untouched by geometry show it after lighting.
    pub color: [f32; 4],
    pub depth: f32,
}

impl Default for GBufferClear {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
        }
    }
}

/// Deferred renderer.
///
/// Owns the g-buffer, the light registry, the SSAO stage and the lighting and
/// buffer-view effects. The graphics device is borrowed per call.
///
/// Frame outline:
/// 1. `clear_geometry_buffers` (optional, caller's choice)
/// 2. `begin_deferred_state`, draw opaque geometry, `end_deferred_state`
/// 3. `apply_lighting_phase` into the back buffer
/// 4. `begin_forward_state`, draw forward geometry, `end_forward_state`
pub struct DeferredRenderer<D: GraphicsDevice> {
    config: RendererConfig,
    gbuffer: GBufferSet<D>,
    lights: LightRegistry,
    ssao: SsaoStage<D>,
    ssao_enabled: bool,
    phase: PhaseTracker,
    quad: FullscreenQuad<D>,
    light_effect: D::Effect,
    buffer_effect: D::Effect,
    warned_light_cap: bool,
}

impl<D: GraphicsDevice> DeferredRenderer<D> {
    /// Allocates every g-buffer channel and effect.
    ///
    /// Any allocation failure aborts construction; nothing partial is returned.
    pub fn new(device: &mut D, config: RendererConfig) -> Result<Self, RenderError> {
        config.validate()?;

        let gbuffer = GBufferSet::new(device, config.width, config.height, 0)?;
        let quad = FullscreenQuad::new(device)?;
        let ssao = SsaoStage::new(device, config.ssao.clone())?;
        let light_effect = device
            .create_effect(&LIGHTING_EFFECT)
            .map_err(RenderError::allocation("lighting effect"))?;
        let mut buffer_effect = device
            .create_effect(&BUFFER_VIEW_EFFECT)
            .map_err(RenderError::allocation("buffer view effect"))?;
        buffer_effect.set_variable("gDepthExponent", 32.0f32);

        log::info!(
            "deferred renderer ready at {}x{} (ssao {})",
            config.width,
            config.height,
            if config.ssao_enabled { "on" } else { "off" }
        );

        Ok(Self {
            lights: LightRegistry::new(config.ambient_light),
            ssao_enabled: config.ssao_enabled,
            config,
            gbuffer,
            ssao,
            phase: PhaseTracker::default(),
            quad,
            light_effect,
            buffer_effect,
            warned_light_cap: false,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn size(&self) -> (u32, u32) {
        self.gbuffer.size()
    }

    pub fn phase(&self) -> Phase {
        self.phase.phase()
    }

    /// Whether the g-buffer holds a completed deferred pass that lighting can read.
    pub fn gbuffer_resolved(&self) -> bool {
        self.phase.gbuffer_resolved()
    }

    // ── lights ────────────────────────────────────────────────────────────

    pub fn set_directional_light(&mut self, light: DirectionalLight) {
        self.lights.set_directional(light);
    }

    /// Returns the index of the new light, counting from zero.
    pub fn add_point_light(&mut self, light: PointLight) -> usize {
        self.lights.add_point_light(light)
    }

    pub fn set_ambient_light(&mut self, color: Vec3) {
        self.lights.set_ambient(color);
    }

    pub fn lights(&self) -> &LightRegistry {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut LightRegistry {
        &mut self.lights
    }

    // ── ssao ──────────────────────────────────────────────────────────────

    /// Takes effect at the next lighting pass.
    pub fn toggle_ssao(&mut self, enabled: bool) {
        self.ssao_enabled = enabled;
    }

    pub fn ssao_toggle(&self) -> bool {
        self.ssao_enabled
    }

    // ── phases ────────────────────────────────────────────────────────────

    /// Clears every g-buffer channel. Only valid while idle.
    ///
    /// Position, normal and material are zeroed, both occlusion channels are
    /// set to "unoccluded" and depth to `clear.depth`.
    #[track_caller]
    pub fn clear_geometry_buffers(&mut self, device: &mut D, clear: &GBufferClear) {
        self.phase.expect_idle("clear_geometry_buffers");

        for kind in GBuffer::ALL {
            let value = match kind {
                GBuffer::Color => clear.color,
                GBuffer::PreSsao | GBuffer::PostSsao => [1.0; 4],
                _ => [0.0; 4],
            };
            if let Some(rtv) = self.gbuffer.rtv(kind) {
                device.clear_render_target(rtv, value);
            }
        }
        if let Some(dsv) = self.gbuffer.depth_stencil() {
            device.clear_depth_stencil(dsv, clear.depth);
        }
    }

    /// Binds Color, Position, Normal and Material plus the g-buffer depth.
    ///
    /// Clears nothing. Panics unless idle.
    #[track_caller]
    pub fn begin_deferred_state(&mut self, device: &mut D) {
        self.phase.begin_deferred();
        self.bind_geometry_targets(device);
        log::debug!("deferred geometry phase begin");
    }

    /// Unbinds the geometry targets and runs SSAO.
    ///
    /// Panics unless `begin_deferred_state` came first.
    #[track_caller]
    pub fn end_deferred_state(&mut self, device: &mut D, camera: &Camera, frustum: &Frustum) {
        self.phase.end_deferred();
        device.unbind_render_targets();

        self.ssao
            .apply(device, &self.quad, &self.gbuffer, camera, frustum);

        device.reset_render_target();
        log::debug!("deferred geometry phase end");
    }

    /// Lights the g-buffer into the back buffer.
    ///
    /// Panics unless idle after a completed deferred pass.
    #[track_caller]
    pub fn apply_lighting_phase(&mut self, device: &mut D, camera: &Camera) {
        self.phase.check_lighting();
        let output = output_view(device, "apply_lighting_phase");

        let point_lights = self.lights.gpu_point_lights(MAX_POINT_LIGHTS);
        if self.lights.point_lights().len() > MAX_POINT_LIGHTS && !self.warned_light_cap {
            log::warn!(
                "{} point lights registered; only the first {MAX_POINT_LIGHTS} are lit",
                self.lights.point_lights().len()
            );
            self.warned_light_cap = true;
        }

        let effect = &mut self.light_effect;
        effect.set_variable("gView", camera.view);
        effect.set_variable("gProjection", camera.projection);
        effect.set_variable("gCameraPosition", camera.position);
        effect.set_variable("gAmbientLight", self.lights.ambient());

        match self.lights.directional() {
            Some(light) => {
                effect.set_variable("gDirectionalLightEnabled", true);
                effect.set_variable("gDirectionalLightDirection", light.direction);
                effect.set_variable("gDirectionalLightIntensity", light.intensity);
            }
            None => {
                effect.set_variable("gDirectionalLightEnabled", false);
                effect.set_variable("gDirectionalLightDirection", Vec4::ZERO);
                effect.set_variable("gDirectionalLightIntensity", Vec4::ZERO);
            }
        }

        effect.set_variable("gPointLights", Variable::raw(&point_lights));
        effect.set_variable("gPointLightCount", point_lights.len() as i32);

        let gbuffer = &self.gbuffer;
        effect.set_variable("gColorBuffer", gbuffer.srv(GBuffer::Color));
        effect.set_variable("gPositionBuffer", gbuffer.srv(GBuffer::Position));
        effect.set_variable("gNormalBuffer", gbuffer.srv(GBuffer::Normal));
        effect.set_variable("gMaterialBuffer", gbuffer.srv(GBuffer::Material));
        effect.set_variable("gDepthBuffer", gbuffer.srv(GBuffer::Depth));

        // With SSAO off the shader ignores the occlusion slot entirely.
        effect.set_variable("gSSAOEnabled", self.ssao_enabled);
        let occlusion = self
            .ssao_enabled
            .then(|| gbuffer.srv(GBuffer::PostSsao));
        effect.set_variable("gOcclusion", occlusion);

        device.set_render_targets(&[&output], None);
        let technique = effect.technique_by_index(0);
        for pass in 0..effect.pass_count(technique) {
            self.quad.draw(device, effect, technique.pass(pass));
        }

        effect.unbind_textures();
        device.reset_render_target();
        log::trace!("lighting applied with {} point lights", point_lights.len());
    }

    /// Binds the back buffer with the g-buffer depth for unlit geometry.
    ///
    /// Falls back to the device depth buffer when the output size differs
    /// from the g-buffer size.
    #[track_caller]
    pub fn begin_forward_state(&mut self, device: &mut D) {
        self.phase.begin_forward();
        self.bind_forward_targets(device);
        log::debug!("forward phase begin");
    }

    #[track_caller]
    pub fn end_forward_state(&mut self, device: &mut D) {
        self.phase.end_forward();
        device.reset_render_target();
        log::debug!("forward phase end");
    }

    /// Draws `source` over the back buffer, then restores the current phase's bindings.
    ///
    /// Valid in any phase. Panics when given a g-buffer view from a set that
    /// has since been reallocated.
    #[track_caller]
    pub fn render_buffer(
        &mut self,
        device: &mut D,
        source: &impl ViewSource<D::ShaderResourceView>,
    ) {
        if let Some(generation) = source.gbuffer_generation() {
            let current = self.gbuffer.generation();
            assert!(
                generation == current,
                "render_buffer given a stale g-buffer view (generation {generation}, current {current})"
            );
        }
        let view = source.view();
        let output = output_view(device, "render_buffer");

        let effect = &mut self.buffer_effect;
        let technique = if view.is_depth() {
            effect.set_variable("gDepthTexture", view);
            "ShowDepth"
        } else {
            effect.set_variable("gTexture", view);
            effect.set_variable("gChannelCount", view.channel_count() as i32);
            "ShowColor"
        };

        device.set_render_targets(&[&output], None);
        self.quad.draw_technique(device, effect, technique);
        effect.unbind_textures();

        self.bind_phase_targets(device);
    }

    /// `render_buffer` for one of the renderer's own channels.
    #[track_caller]
    pub fn show_gbuffer(&mut self, device: &mut D, kind: GBuffer) {
        let view = self.gbuffer.view(kind).clone();
        self.render_buffer(device, &view);
    }

    /// Reallocates the g-buffer at `width` x `height`.
    ///
    /// Panics if a phase is active. On error the previous g-buffer stays in
    /// place. On success the old channels are released, views cloned from them
    /// are rejected by `render_buffer`, and lighting requires a new deferred pass.
    #[track_caller]
    pub fn resize(&mut self, device: &mut D, width: u32, height: u32) -> Result<(), RenderError> {
        self.phase.expect_idle("resize");
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidResolution { width, height });
        }

        let next = GBufferSet::new(device, width, height, self.gbuffer.generation() + 1)?;
        self.gbuffer = next;
        self.phase.invalidate("resize");
        self.config.width = width;
        self.config.height = height;

        log::info!("deferred renderer resized to {width}x{height}");
        Ok(())
    }

    // ── g-buffer access ───────────────────────────────────────────────────

    pub fn gbuffer(&self, kind: GBuffer) -> &GBufferView<D::ShaderResourceView> {
        self.gbuffer.view(kind)
    }

    pub fn gbuffer_by_index(
        &self,
        index: u32,
    ) -> Result<&GBufferView<D::ShaderResourceView>, RenderError> {
        Ok(self.gbuffer(GBuffer::try_from(index)?))
    }

    pub fn gbuffer_set(&self) -> &GBufferSet<D> {
        &self.gbuffer
    }

    pub fn color_buffer(&self) -> &GBufferView<D::ShaderResourceView> {
        self.gbuffer(GBuffer::Color)
    }

    pub fn position_buffer(&self) -> &GBufferView<D::ShaderResourceView> {
        self.gbuffer(GBuffer::Position)
    }

    pub fn normal_buffer(&self) -> &GBufferView<D::ShaderResourceView> {
        self.gbuffer(GBuffer::Normal)
    }

    pub fn material_buffer(&self) -> &GBufferView<D::ShaderResourceView> {
        self.gbuffer(GBuffer::Material)
    }

    pub fn pre_ssao_buffer(&self) -> &GBufferView<D::ShaderResourceView> {
        self.gbuffer(GBuffer::PreSsao)
    }

    pub fn post_ssao_buffer(&self) -> &GBufferView<D::ShaderResourceView> {
        self.gbuffer(GBuffer::PostSsao)
    }

    pub fn depth_stencil_buffer(&self) -> &GBufferView<D::ShaderResourceView> {
        self.gbuffer(GBuffer::Depth)
    }

    // ── bindings ──────────────────────────────────────────────────────────

    fn bind_geometry_targets(&self, device: &mut D) {
        let targets = self.gbuffer.geometry_targets();
        device.set_render_targets(&targets, self.gbuffer.depth_stencil());
    }

    #[track_caller]
    fn bind_forward_targets(&self, device: &mut D) {
        let output = output_view(device, "begin_forward_state");

        let depth = if device.viewport_size() == self.gbuffer.size() {
            self.gbuffer.depth_stencil().cloned()
        } else {
            device.depth_stencil_view()
        };
        device.set_render_targets(&[&output], depth.as_ref());
    }

    #[track_caller]
    fn bind_phase_targets(&self, device: &mut D) {
        match self.phase.phase() {
            Phase::Idle => device.reset_render_target(),
            Phase::DeferredGeometry => self.bind_geometry_targets(device),
            Phase::Forward => self.bind_forward_targets(device),
        }
    }
}

/// The back buffer of the active frame. Output passes outside a frame are
/// programming errors.
#[track_caller]
fn output_view<D: GraphicsDevice>(device: &D, operation: &str) -> D::RenderTargetView {
    match device.back_buffer_view() {
        Some(view) => view,
        None => panic!("{operation} requires an active frame, the device has no back buffer"),
    }
}
