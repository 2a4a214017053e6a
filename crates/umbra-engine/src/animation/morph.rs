use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::bounds::Aabb;
use crate::camera::Camera;
use crate::error::{AnimationError, RenderError};
use crate::gfx::{
    DepthMode, Effect, EffectDesc, GraphicsDevice, InputElement, PassDesc, TechniqueDesc,
    TextureSample, Topology, VariableDesc, VariableKind, VertexFormat,
};

use super::keyframes::KeyframeCursor;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct AnimationVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl AnimationVertex {
    pub fn new(position: Vec3, normal: Vec3, uv: [f32; 2]) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            uv,
        }
    }
}

/// Slot 0 carries the current key frame, slot 1 the next one.
pub const MORPH_INPUT_LAYOUT: &[InputElement] = &[
    InputElement::new("POSITION", VertexFormat::Float32x3, 0),
    InputElement::new("NORMAL", VertexFormat::Float32x3, 0),
    InputElement::new("TEXCOORD", VertexFormat::Float32x2, 0),
    InputElement::new("POSITION", VertexFormat::Float32x3, 1),
    InputElement::new("NORMAL", VertexFormat::Float32x3, 1),
    InputElement::new("TEXCOORD", VertexFormat::Float32x2, 1),
];

const MORPH_VARIABLES: &[VariableDesc] = &[
    VariableDesc::new("gWorld", VariableKind::Mat4),
    VariableDesc::new("gMVP", VariableKind::Mat4),
    VariableDesc::new("gBlend", VariableKind::Float),
    VariableDesc::new("gKa", VariableKind::Float),
    VariableDesc::new("gKd", VariableKind::Float),
    VariableDesc::new("gKs", VariableKind::Float),
    VariableDesc::new("gSpecularExponent", VariableKind::Float),
    VariableDesc::new("gGlowEnabled", VariableKind::Bool),
    VariableDesc::new("gTexture", VariableKind::Texture(TextureSample::Float)),
    VariableDesc::new("gGlowMap", VariableKind::Texture(TextureSample::Float)),
];

/// Blends two key frames and writes the four geometry channels of the g-buffer.
pub const MORPH_EFFECT: EffectDesc = EffectDesc {
    label: "morph",
    source: include_str!("shaders/morph.wgsl"),
    input_layout: MORPH_INPUT_LAYOUT,
    techniques: &[TechniqueDesc {
        name: "Morph",
        passes: &[PassDesc::new("P0", "vs_main", "fs_main").with_depth(DepthMode::TestWrite)],
    }],
    variables: MORPH_VARIABLES,
};

/// Surface constants shared by every key frame.
#[derive(Debug)]
pub struct MorphMaterial<'a, V> {
    pub ambient: f32,
    pub diffuse: f32,
    pub specular: f32,
    pub specular_exponent: f32,
    /// Untextured meshes sample white.
    pub texture: Option<&'a V>,
    pub glow_map: Option<&'a V>,
}

impl<V> Default for MorphMaterial<'_, V> {
    fn default() -> Self {
        Self {
            ambient: 1.0,
            diffuse: 1.0,
            specular: 0.5,
            specular_exponent: 32.0,
            texture: None,
            glow_map: None,
        }
    }
}

/// A mesh animated by blending between key frames with identical topology.
///
/// Draws into whatever targets are bound, normally the deferred geometry
/// phase.
pub struct MorphAnimation<D: GraphicsDevice> {
    frames: Vec<D::VertexBuffer>,
    bounds: Vec<Aabb>,
    vertex_count: u32,
    cursor: KeyframeCursor,
    effect: D::Effect,
}

impl<D: GraphicsDevice> MorphAnimation<D> {
    /// Uploads one vertex buffer per key frame.
    ///
    /// `time_spans[i]` is how long the blend from frame `i` to `i + 1` takes.
    pub fn new<F>(
        device: &mut D,
        frames: &[F],
        time_spans: &[f32],
        material: &MorphMaterial<'_, D::ShaderResourceView>,
    ) -> Result<Self, RenderError>
    where
        F: AsRef<[AnimationVertex]>,
    {
        if frames.len() != time_spans.len() {
            return Err(AnimationError::SpanCountMismatch {
                frames: frames.len(),
                spans: time_spans.len(),
            }
            .into());
        }
        let cursor = KeyframeCursor::new(time_spans.to_vec())?;

        let expected = frames[0].as_ref().len();
        let mut bounds = Vec::with_capacity(frames.len());
        for (index, frame) in frames.iter().enumerate() {
            let vertices = frame.as_ref();
            let aabb = Aabb::from_points(vertices.iter().map(|v| Vec3::from(v.position)))
                .ok_or(AnimationError::EmptyKeyFrame { index })?;
            if vertices.len() != expected {
                return Err(AnimationError::VertexCountMismatch {
                    index,
                    expected,
                    found: vertices.len(),
                }
                .into());
            }
            bounds.push(aabb);
        }

        let stride = std::mem::size_of::<AnimationVertex>() as u32;
        let frames = frames
            .iter()
            .map(|frame| {
                device
                    .create_vertex_buffer("morph key frame", bytemuck::cast_slice(frame.as_ref()), stride)
                    .map_err(RenderError::allocation("morph key frame"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut effect = device
            .create_effect(&MORPH_EFFECT)
            .map_err(RenderError::allocation("morph effect"))?;
        effect.set_variable("gBlend", 0.0f32);
        effect.set_variable("gKa", material.ambient);
        effect.set_variable("gKd", material.diffuse);
        effect.set_variable("gKs", material.specular);
        effect.set_variable("gSpecularExponent", material.specular_exponent);
        effect.set_variable("gTexture", material.texture);
        effect.set_variable("gGlowEnabled", material.glow_map.is_some());
        effect.set_variable("gGlowMap", material.glow_map);

        log::debug!(
            "morph animation with {} key frames of {expected} vertices",
            frames.len()
        );

        Ok(Self {
            frames,
            bounds,
            vertex_count: expected as u32,
            cursor,
            effect,
        })
    }

    /// Advances playback and uploads the new blend factor.
    pub fn update(&mut self, dt: f32) {
        self.cursor.advance(dt);
        self.effect.set_variable("gBlend", self.cursor.blend());
    }

    /// Draws the blended mesh with `model` as its world transform.
    pub fn draw(&mut self, device: &mut D, camera: &Camera, model: Mat4) {
        self.effect.set_variable("gWorld", model);
        self.effect.set_variable("gMVP", camera.view_projection() * model);

        let streams = [
            &self.frames[self.cursor.current()],
            &self.frames[self.cursor.next()],
        ];
        let technique = self.effect.technique_by_index(0);
        for pass in 0..self.effect.pass_count(technique) {
            device.draw(
                &mut self.effect,
                technique.pass(pass),
                &streams,
                Topology::TriangleList,
                0..self.vertex_count,
            );
        }
    }

    /// Bounds of the current key frame in model space.
    pub fn aabb(&self) -> &Aabb {
        &self.bounds[self.cursor.current()]
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.cursor.set_looping(looping);
    }

    pub fn cursor(&self) -> &KeyframeCursor {
        &self.cursor
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::null::NullDevice;
    use crate::gfx::{BindFlags, BoundValue, Format, TextureDesc};

    fn frame(scale: f32) -> Vec<AnimationVertex> {
        [Vec3::ZERO, Vec3::X, Vec3::Y]
            .into_iter()
            .map(|p| AnimationVertex::new(p * scale, Vec3::Z, [0.0, 0.0]))
            .collect()
    }

    fn animation(device: &mut NullDevice) -> MorphAnimation<NullDevice> {
        let frames = [frame(1.0), frame(2.0), frame(3.0)];
        MorphAnimation::new(device, &frames, &[1.0, 1.0, 1.0], &MorphMaterial::default()).unwrap()
    }

    #[test]
    fn effect_description_is_valid() {
        assert!(MORPH_EFFECT.validate().is_ok());
        assert_eq!(MORPH_EFFECT.slot_count(), 2);
        assert_eq!(
            MORPH_EFFECT.slot_stride(0),
            std::mem::size_of::<AnimationVertex>() as u32
        );
    }

    // ── construction ──────────────────────────────────────────────────────

    #[test]
    fn span_count_must_match() {
        let mut device = NullDevice::new(4, 4);
        let frames = [frame(1.0), frame(2.0)];
        let err = MorphAnimation::new(&mut device, &frames, &[1.0], &MorphMaterial::default())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            RenderError::Animation(AnimationError::SpanCountMismatch { frames: 2, spans: 1 })
        ));
    }

    #[test]
    fn vertex_counts_must_match() {
        let mut device = NullDevice::new(4, 4);
        let mut short = frame(2.0);
        short.pop();
        let frames = [frame(1.0), short];
        let err = MorphAnimation::new(&mut device, &frames, &[1.0, 1.0], &MorphMaterial::default())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            RenderError::Animation(AnimationError::VertexCountMismatch {
                index: 1,
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn empty_frames_are_rejected() {
        let mut device = NullDevice::new(4, 4);
        let frames: [Vec<AnimationVertex>; 2] = [Vec::new(), Vec::new()];
        let err = MorphAnimation::new(&mut device, &frames, &[1.0, 1.0], &MorphMaterial::default())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            RenderError::Animation(AnimationError::EmptyKeyFrame { index: 0 })
        ));
    }

    // ── playback ──────────────────────────────────────────────────────────

    #[test]
    fn update_uploads_blend_factor() {
        let mut device = NullDevice::new(4, 4);
        let mut anim = animation(&mut device);
        anim.update(0.25);
        anim.draw(&mut device, &Camera::default(), Mat4::IDENTITY);

        let draw = device.draws().next().unwrap();
        assert_eq!(draw.value("gBlend"), Some(&BoundValue::Float(0.25)));
    }

    #[test]
    fn draw_binds_current_and_next_frame() {
        let mut device = NullDevice::new(4, 4);
        let mut anim = animation(&mut device);
        anim.draw(&mut device, &Camera::default(), Mat4::IDENTITY);
        anim.update(1.5);
        anim.draw(&mut device, &Camera::default(), Mat4::IDENTITY);

        let draws: Vec<_> = device.draws().collect();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].vertex_buffers[1], draws[1].vertex_buffers[0]);
        assert_ne!(draws[0].vertex_buffers[0], draws[1].vertex_buffers[1]);
        assert_eq!(draws[1].topology, Topology::TriangleList);
        assert_eq!(draws[1].vertices, 0..3);
    }

    #[test]
    fn draw_uploads_world_and_mvp() {
        let mut device = NullDevice::new(4, 4);
        let mut anim = animation(&mut device);
        let camera = Camera::default();
        let model = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        anim.draw(&mut device, &camera, model);

        let draw = device.draws().next().unwrap();
        assert_eq!(draw.value("gWorld"), Some(&BoundValue::Mat4(model)));
        assert_eq!(
            draw.value("gMVP"),
            Some(&BoundValue::Mat4(camera.view_projection() * model))
        );
    }

    #[test]
    fn aabb_follows_current_frame() {
        let mut device = NullDevice::new(4, 4);
        let mut anim = animation(&mut device);
        assert_eq!(anim.aabb().max, Vec3::new(1.0, 1.0, 0.0));

        anim.update(1.5);
        assert_eq!(anim.aabb().max, Vec3::new(2.0, 2.0, 0.0));
    }

    #[test]
    fn material_textures_are_bound_once() {
        let mut device = NullDevice::new(4, 4);
        let desc = TextureDesc::new("glow", 2, 2, Format::Rgba8Unorm, BindFlags::SHADER_RESOURCE);
        let texture = device.create_texture(&desc).unwrap();
        let glow = device.create_shader_resource_view(&texture).unwrap();

        let material = MorphMaterial {
            glow_map: Some(&glow),
            ..MorphMaterial::default()
        };
        let frames = [frame(1.0), frame(2.0)];
        let mut anim = MorphAnimation::new(&mut device, &frames, &[1.0, 1.0], &material).unwrap();
        anim.draw(&mut device, &Camera::default(), Mat4::IDENTITY);

        let draw = device.draws().next().unwrap();
        assert_eq!(draw.value("gGlowEnabled"), Some(&BoundValue::Bool(true)));
        assert_eq!(draw.texture("gGlowMap"), Some(glow.id()));
        assert_eq!(draw.texture("gTexture"), None);
    }
}
