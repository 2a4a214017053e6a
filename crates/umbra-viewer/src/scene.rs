//! Demo scene: a floor, a pedestal, a morphing blob and orbiting lights.

use std::f32::consts::TAU;

use glam::{Mat4, Vec3, Vec4};
use umbra_engine::animation::{AnimationVertex, MorphAnimation, MorphMaterial};
use umbra_engine::bounds::Aabb;
use umbra_engine::camera::{Camera, Frustum};
use umbra_engine::gfx::{
    BindFlags, DepthMode, Effect, EffectDesc, Format, GraphicsDevice, InputElement, PassDesc,
    TechniqueDesc, TextureDesc, Topology, VariableDesc, VariableKind, VertexFormat,
};
use umbra_engine::renderer::{DeferredRenderer, DirectionalLight, PointLight};
use umbra_engine::RenderError;

use crate::mesh;

const MESH_INPUT_LAYOUT: &[InputElement] = &[
    InputElement::new("POSITION", VertexFormat::Float32x3, 0),
    InputElement::new("NORMAL", VertexFormat::Float32x3, 0),
    InputElement::new("TEXCOORD", VertexFormat::Float32x2, 0),
];

/// Untextured static meshes into the geometry channels.
pub const GEOMETRY_EFFECT: EffectDesc = EffectDesc {
    label: "geometry",
    source: include_str!("shaders/geometry.wgsl"),
    input_layout: MESH_INPUT_LAYOUT,
    techniques: &[TechniqueDesc {
        name: "Geometry",
        passes: &[PassDesc::new("P0", "vs_main", "fs_main").with_depth(DepthMode::TestWrite)],
    }],
    variables: &[
        VariableDesc::new("gWorld", VariableKind::Mat4),
        VariableDesc::new("gMVP", VariableKind::Mat4),
        VariableDesc::new("gAlbedo", VariableKind::Vec4),
        VariableDesc::new("gSpecular", VariableKind::Float),
        VariableDesc::new("gShininess", VariableKind::Float),
        VariableDesc::new("gEmissive", VariableKind::Float),
    ],
};

/// Flat-colored light gizmos for the forward phase.
pub const MARKER_EFFECT: EffectDesc = EffectDesc {
    label: "light marker",
    source: include_str!("shaders/marker.wgsl"),
    input_layout: MESH_INPUT_LAYOUT,
    techniques: &[TechniqueDesc {
        name: "Marker",
        passes: &[PassDesc::new("P0", "vs_main", "fs_main").with_depth(DepthMode::Test)],
    }],
    variables: &[
        VariableDesc::new("gMVP", VariableKind::Mat4),
        VariableDesc::new("gColor", VariableKind::Vec4),
    ],
};

const LIGHT_COLORS: [Vec3; 4] = [
    Vec3::new(1.0, 0.35, 0.25),
    Vec3::new(0.3, 1.0, 0.4),
    Vec3::new(0.35, 0.5, 1.0),
    Vec3::new(1.0, 0.9, 0.4),
];
const LIGHT_ORBIT_RADIUS: f32 = 3.0;
const LIGHT_HEIGHT: f32 = 1.2;
const CAMERA_DISTANCE: f32 = 7.0;
const TEXTURE_SIZE: u32 = 64;
const BOUNDS_COLOR: Vec4 = Vec4::new(1.0, 1.0, 1.0, 1.0);

struct StaticMesh<D: GraphicsDevice> {
    buffer: D::VertexBuffer,
    vertex_count: u32,
    model: Mat4,
    albedo: Vec4,
    specular: f32,
    shininess: f32,
}

impl<D: GraphicsDevice> StaticMesh<D> {
    fn upload(
        device: &mut D,
        label: &'static str,
        vertices: &[AnimationVertex],
        model: Mat4,
    ) -> Result<Self, RenderError> {
        let stride = std::mem::size_of::<AnimationVertex>() as u32;
        let buffer = device
            .create_vertex_buffer(label, bytemuck::cast_slice(vertices), stride)
            .map_err(RenderError::allocation(label))?;
        Ok(Self {
            buffer,
            vertex_count: vertices.len() as u32,
            model,
            albedo: Vec4::ONE,
            specular: 0.3,
            shininess: 16.0,
        })
    }

    fn with_surface(mut self, albedo: Vec3, specular: f32, shininess: f32) -> Self {
        self.albedo = albedo.extend(1.0);
        self.specular = specular;
        self.shininess = shininess;
        self
    }
}

pub struct Scene<D: GraphicsDevice> {
    frustum: Frustum,
    camera: Camera,
    time: f32,
    floor: StaticMesh<D>,
    pedestal: StaticMesh<D>,
    morph: MorphAnimation<D>,
    marker: D::VertexBuffer,
    marker_vertices: u32,
    /// Unit cube outline, scaled onto the morph bounds when shown.
    bounds_lines: D::VertexBuffer,
    show_bounds: bool,
    geometry_effect: D::Effect,
    marker_effect: D::Effect,
    lights: Vec<usize>,
    // Views hold their textures, but keep the owners for the scene's lifetime.
    _textures: Vec<D::Texture>,
}

impl<D: GraphicsDevice> Scene<D> {
    /// Uploads meshes and textures and registers the scene lights with `renderer`.
    pub fn new(
        device: &mut D,
        renderer: &mut DeferredRenderer<D>,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        let frustum = Frustum::default().with_viewport(width, height);

        let floor = StaticMesh::upload(device, "floor", &mesh::plane(6.0), Mat4::IDENTITY)?
            .with_surface(Vec3::splat(0.75), 0.1, 8.0);
        let pedestal = StaticMesh::upload(
            device,
            "pedestal",
            &mesh::cube(0.5),
            Mat4::from_scale_rotation_translation(
                Vec3::new(1.6, 0.8, 1.6),
                glam::Quat::IDENTITY,
                Vec3::new(0.0, 0.4, 0.0),
            ),
        )?
        .with_surface(Vec3::new(0.55, 0.5, 0.45), 0.6, 48.0);

        let checker = checker_texture(device)?;
        let glow = glow_texture(device)?;
        let checker_view = device
            .create_shader_resource_view(&checker)
            .map_err(RenderError::allocation("checker view"))?;
        let glow_view = device
            .create_shader_resource_view(&glow)
            .map_err(RenderError::allocation("glow view"))?;

        let frames = mesh::morph_frames(24, 32, 0.8);
        let spans = [1.5f32, 1.0, 1.5];
        let material = MorphMaterial {
            specular: 0.8,
            specular_exponent: 64.0,
            texture: Some(&checker_view),
            glow_map: Some(&glow_view),
            ..MorphMaterial::default()
        };
        let morph = MorphAnimation::new(device, &frames, &spans, &material)?;

        let marker_mesh = mesh::cube(0.5);
        let stride = std::mem::size_of::<AnimationVertex>() as u32;
        let marker = device
            .create_vertex_buffer("light marker", bytemuck::cast_slice(&marker_mesh), stride)
            .map_err(RenderError::allocation("light marker"))?;

        let outline: Vec<_> = Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5))
            .edges()
            .into_iter()
            .map(|p| AnimationVertex::new(p, Vec3::Y, [0.0, 0.0]))
            .collect();
        let bounds_lines = device
            .create_vertex_buffer("bounds outline", bytemuck::cast_slice(&outline), stride)
            .map_err(RenderError::allocation("bounds outline"))?;

        let geometry_effect = device
            .create_effect(&GEOMETRY_EFFECT)
            .map_err(RenderError::allocation("geometry effect"))?;
        let marker_effect = device
            .create_effect(&MARKER_EFFECT)
            .map_err(RenderError::allocation("marker effect"))?;

        renderer.set_ambient_light(Vec3::splat(0.15));
        renderer.set_directional_light(DirectionalLight::new(
            Vec3::new(-0.4, -1.0, -0.3),
            Vec3::splat(0.35),
        ));
        let lights = LIGHT_COLORS
            .iter()
            .enumerate()
            .map(|(i, &color)| {
                renderer.add_point_light(PointLight::new(light_position(i, 0.0), color * 2.0, 5.0))
            })
            .collect();

        let mut scene = Self {
            frustum,
            camera: Camera::look_at(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y, &frustum),
            time: 0.0,
            floor,
            pedestal,
            morph,
            marker,
            marker_vertices: marker_mesh.len() as u32,
            bounds_lines,
            show_bounds: false,
            geometry_effect,
            marker_effect,
            lights,
            _textures: vec![checker, glow],
        };
        scene.update_camera();

        log::info!(
            "scene ready: {} point lights, morph mesh of {} vertices",
            scene.lights.len(),
            scene.morph.vertex_count()
        );
        Ok(scene)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Flips the morph bounds overlay and returns the new state.
    pub fn toggle_bounds(&mut self) -> bool {
        self.show_bounds = !self.show_bounds;
        self.show_bounds
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.frustum = self.frustum.with_viewport(width, height);
        self.update_camera();
    }

    /// Advances the animation, the camera orbit and the light orbits.
    pub fn update(&mut self, renderer: &mut DeferredRenderer<D>, dt: f32) {
        self.time += dt;
        self.morph.update(dt);
        self.update_camera();

        for (i, &index) in self.lights.iter().enumerate() {
            if let Some(light) = renderer.lights_mut().point_light_mut(index) {
                light.position = light_position(i, self.time).extend(1.0);
            }
        }
    }

    /// Records the geometry phase draws. Targets must already be bound.
    pub fn draw_geometry(&mut self, device: &mut D) {
        let view_projection = self.camera.view_projection();
        for mesh in [&self.floor, &self.pedestal] {
            let effect = &mut self.geometry_effect;
            effect.set_variable("gWorld", mesh.model);
            effect.set_variable("gMVP", view_projection * mesh.model);
            effect.set_variable("gAlbedo", mesh.albedo);
            effect.set_variable("gSpecular", mesh.specular);
            effect.set_variable("gShininess", mesh.shininess);
            effect.set_variable("gEmissive", 0.0f32);
            draw_all_passes(
                device,
                effect,
                &mesh.buffer,
                Topology::TriangleList,
                mesh.vertex_count,
            );
        }

        let model = self.morph_model();
        self.morph.draw(device, &self.camera, model);
    }

    /// Draws a small unlit cube at every point light, plus the morph bounds
    /// outline when enabled.
    pub fn draw_forward(&mut self, device: &mut D, renderer: &DeferredRenderer<D>) {
        let view_projection = self.camera.view_projection();
        let lights = renderer.lights().point_lights();
        for &index in &self.lights {
            let Some(light) = lights.get(index) else { continue };
            let model = Mat4::from_translation(light.position.truncate())
                * Mat4::from_scale(Vec3::splat(0.12));
            let color = light.intensity / light.intensity.max_element().max(1e-3);

            self.marker_effect.set_variable("gMVP", view_projection * model);
            self.marker_effect.set_variable("gColor", color.extend(1.0));
            draw_all_passes(
                device,
                &mut self.marker_effect,
                &self.marker,
                Topology::TriangleList,
                self.marker_vertices,
            );
        }

        if self.show_bounds {
            let aabb = self.morph.aabb();
            let model = self.morph_model()
                * Mat4::from_translation(aabb.center())
                * Mat4::from_scale(aabb.extents());
            self.marker_effect.set_variable("gMVP", view_projection * model);
            self.marker_effect.set_variable("gColor", BOUNDS_COLOR);
            draw_all_passes(
                device,
                &mut self.marker_effect,
                &self.bounds_lines,
                Topology::LineList,
                24,
            );
        }
    }

    fn morph_model(&self) -> Mat4 {
        Mat4::from_translation(Vec3::new(0.0, 1.7, 0.0)) * Mat4::from_rotation_y(self.time * 0.4)
    }

    fn update_camera(&mut self) {
        let angle = self.time * 0.15;
        let eye = Vec3::new(angle.sin(), 0.45, angle.cos()) * CAMERA_DISTANCE;
        self.camera = Camera::look_at(eye, Vec3::new(0.0, 1.0, 0.0), Vec3::Y, &self.frustum);
    }
}

fn draw_all_passes<D: GraphicsDevice>(
    device: &mut D,
    effect: &mut D::Effect,
    buffer: &D::VertexBuffer,
    topology: Topology,
    vertex_count: u32,
) {
    let technique = effect.technique_by_index(0);
    for pass in 0..effect.pass_count(technique) {
        device.draw(
            effect,
            technique.pass(pass),
            &[buffer],
            topology,
            0..vertex_count,
        );
    }
}

fn light_position(index: usize, time: f32) -> Vec3 {
    let phase = index as f32 / LIGHT_COLORS.len() as f32 * TAU;
    let angle = phase + time * 0.6;
    let bob = (time * 1.3 + phase).sin() * 0.3;
    Vec3::new(
        angle.cos() * LIGHT_ORBIT_RADIUS,
        LIGHT_HEIGHT + bob,
        angle.sin() * LIGHT_ORBIT_RADIUS,
    )
}

fn checker_texture<D: GraphicsDevice>(device: &mut D) -> Result<D::Texture, RenderError> {
    let pixels = texels(|x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            [235, 235, 230, 255]
        } else {
            [70, 90, 140, 255]
        }
    });
    upload_texture(device, "checker", &pixels)
}

fn glow_texture<D: GraphicsDevice>(device: &mut D) -> Result<D::Texture, RenderError> {
    let pixels = texels(|x, y| {
        let band = (x + y) % 16 < 2;
        if band {
            [255, 180, 60, 255]
        } else {
            [0, 0, 0, 255]
        }
    });
    upload_texture(device, "glow map", &pixels)
}

fn texels(f: impl Fn(u32, u32) -> [u8; 4]) -> Vec<u8> {
    (0..TEXTURE_SIZE)
        .flat_map(|y| (0..TEXTURE_SIZE).map(move |x| (x, y)))
        .flat_map(|(x, y)| f(x, y))
        .collect()
}

fn upload_texture<D: GraphicsDevice>(
    device: &mut D,
    label: &'static str,
    pixels: &[u8],
) -> Result<D::Texture, RenderError> {
    let desc = TextureDesc::new(
        label,
        TEXTURE_SIZE,
        TEXTURE_SIZE,
        Format::Rgba8Unorm,
        BindFlags::SHADER_RESOURCE,
    );
    device
        .create_texture_with_data(&desc, pixels)
        .map_err(RenderError::allocation(label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_engine::backend::null::NullDevice;
    use umbra_engine::gfx::BoundValue;
    use umbra_engine::renderer::RendererConfig;

    fn setup() -> (NullDevice, DeferredRenderer<NullDevice>, Scene<NullDevice>) {
        let mut device = NullDevice::new(800, 600);
        let mut renderer = DeferredRenderer::new(&mut device, RendererConfig::default()).unwrap();
        let scene = Scene::new(&mut device, &mut renderer, 800, 600).unwrap();
        (device, renderer, scene)
    }

    // ── construction ──────────────────────────────────────────────────────

    #[test]
    fn registers_lights() {
        let (_, renderer, _) = setup();
        assert_eq!(renderer.lights().point_lights().len(), LIGHT_COLORS.len());
        assert!(renderer.lights().directional().is_some());
        assert_eq!(renderer.lights().ambient(), Vec3::splat(0.15));
    }

    #[test]
    fn allocation_failure_is_reported() {
        let mut device = NullDevice::new(800, 600);
        let mut renderer = DeferredRenderer::new(&mut device, RendererConfig::default()).unwrap();
        device.fail_allocations_after(1);
        assert!(matches!(
            Scene::new(&mut device, &mut renderer, 800, 600),
            Err(RenderError::Allocation { .. })
        ));
    }

    // ── frame ─────────────────────────────────────────────────────────────

    #[test]
    fn update_moves_lights() {
        let (_, mut renderer, mut scene) = setup();
        let before = renderer.lights().point_lights()[0].position;
        scene.update(&mut renderer, 0.5);
        assert_ne!(renderer.lights().point_lights()[0].position, before);
        assert!((scene.time() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn geometry_phase_draws_every_mesh() {
        let (mut device, mut renderer, mut scene) = setup();
        device.take_commands();

        renderer.begin_deferred_state(&mut device);
        scene.draw_geometry(&mut device);
        let effects: Vec<_> = device.draws().map(|d| d.effect).collect();
        assert_eq!(effects, ["geometry", "geometry", "morph"]);

        let floor = device.draws().next().unwrap();
        assert_eq!(floor.value("gShininess"), Some(&BoundValue::Float(8.0)));
    }

    #[test]
    fn forward_phase_draws_one_marker_per_light() {
        let (mut device, renderer, mut scene) = setup();
        device.take_commands();
        scene.draw_forward(&mut device, &renderer);
        assert_eq!(
            device.draws().filter(|d| d.effect == "light marker").count(),
            LIGHT_COLORS.len()
        );
    }

    #[test]
    fn bounds_outline_is_drawn_as_lines_when_enabled() {
        let (mut device, renderer, mut scene) = setup();
        device.take_commands();
        scene.draw_forward(&mut device, &renderer);
        assert!(device.draws().all(|d| d.topology == Topology::TriangleList));

        assert!(scene.toggle_bounds());
        device.take_commands();
        scene.draw_forward(&mut device, &renderer);

        let outline = device.draws().last().unwrap();
        assert_eq!(outline.topology, Topology::LineList);
        assert_eq!(outline.vertices, 0..24);
        assert_eq!(outline.value("gColor"), Some(&BoundValue::Vec4(BOUNDS_COLOR)));
        assert_eq!(device.draws().count(), LIGHT_COLORS.len() + 1);
    }

    #[test]
    fn aspect_follows_viewport() {
        let (_, _, mut scene) = setup();
        scene.set_aspect(1000, 500);
        assert!((scene.frustum().aspect - 2.0).abs() < 1e-6);
    }
}
