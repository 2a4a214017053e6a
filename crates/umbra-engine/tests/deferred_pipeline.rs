use glam::{Vec3, Vec4};

use umbra_engine::backend::null::{NullDevice, ResourceId};
use umbra_engine::camera::{Camera, Frustum};
use umbra_engine::gfx::{BoundValue, GraphicsDevice, ViewInfo};
use umbra_engine::renderer::{
    DeferredRenderer, DirectionalLight, GBuffer, GBufferClear, Phase, PointLight, RendererConfig,
};
use umbra_engine::RenderError;

fn camera(frustum: &Frustum) -> Camera {
    Camera::look_at(Vec3::new(0.0, 2.0, 6.0), Vec3::ZERO, Vec3::Y, frustum)
}

fn renderer_800x600() -> (NullDevice, DeferredRenderer<NullDevice>) {
    let mut device = NullDevice::new(800, 600);
    let renderer = DeferredRenderer::new(&mut device, RendererConfig::default()).unwrap();
    (device, renderer)
}

/// One lit frame with no geometry draws.
fn run_frame(device: &mut NullDevice, renderer: &mut DeferredRenderer<NullDevice>) {
    let frustum = Frustum::default().with_viewport(800, 600);
    let camera = camera(&frustum);

    renderer.clear_geometry_buffers(device, &GBufferClear::default());
    renderer.begin_deferred_state(device);
    renderer.end_deferred_state(device, &camera, &frustum);
    renderer.apply_lighting_phase(device, &camera);
    renderer.begin_forward_state(device);
    renderer.end_forward_state(device);
}

fn gbuffer_ids(renderer: &DeferredRenderer<NullDevice>) -> Vec<ResourceId> {
    GBuffer::ALL
        .iter()
        .map(|&kind| renderer.gbuffer(kind).id())
        .collect()
}

// ── full frame ────────────────────────────────────────────────────────────

#[test]
fn full_frame_with_two_point_lights() {
    let (mut device, mut renderer) = renderer_800x600();
    renderer.set_directional_light(DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE));
    renderer.add_point_light(PointLight::new(Vec3::new(1.0, 1.0, 0.0), Vec3::X, 4.0));
    renderer.add_point_light(PointLight::new(Vec3::new(-1.0, 1.0, 0.0), Vec3::Z, 4.0));

    run_frame(&mut device, &mut renderer);
    assert_eq!(renderer.phase(), Phase::Idle);

    let effects: Vec<_> = device.draws().map(|d| d.effect).collect();
    assert_eq!(effects, ["ssao", "ssao", "deferred lighting"]);

    let lighting = device
        .draws()
        .find(|d| d.effect == "deferred lighting")
        .unwrap();
    assert_eq!(lighting.value("gPointLightCount"), Some(&BoundValue::Int(2)));
    assert_eq!(
        lighting.targets,
        vec![device.back_buffer_view().unwrap().id()]
    );
    assert_eq!(
        lighting.texture("gNormalBuffer"),
        Some(renderer.normal_buffer().id())
    );
}

#[test]
fn gbuffer_channels_have_documented_formats() {
    let (_, renderer) = renderer_800x600();
    for kind in GBuffer::ALL {
        let view = renderer.gbuffer(kind);
        assert_eq!(view.format(), kind.format());
        assert_eq!(view.size(), (800, 600));
    }
    assert!(renderer.depth_stencil_buffer().is_depth());
    assert_eq!(renderer.pre_ssao_buffer().channel_count(), 1);
}

// ── index access ──────────────────────────────────────────────────────────

#[test]
fn index_access_matches_named_accessors() {
    let (_, renderer) = renderer_800x600();

    assert_eq!(
        renderer.gbuffer_by_index(GBuffer::Normal as u32).unwrap(),
        renderer.normal_buffer()
    );
    assert_eq!(
        renderer.gbuffer_by_index(0).unwrap(),
        renderer.color_buffer()
    );
    assert_eq!(
        renderer.gbuffer_by_index(6).unwrap(),
        renderer.depth_stencil_buffer()
    );
    assert!(matches!(
        renderer.gbuffer_by_index(7),
        Err(RenderError::GBufferIndexOutOfRange { index: 7, count: 7 })
    ));
}

// ── ssao toggle ───────────────────────────────────────────────────────────

#[test]
fn disabling_ssao_detaches_occlusion_from_lighting() {
    let (mut device, mut renderer) = renderer_800x600();
    renderer.toggle_ssao(false);
    run_frame(&mut device, &mut renderer);

    let lighting = device
        .draws()
        .find(|d| d.effect == "deferred lighting")
        .unwrap();
    assert_eq!(lighting.value("gSSAOEnabled"), Some(&BoundValue::Bool(false)));
    assert_eq!(lighting.texture("gOcclusion"), None);

    // Everything else the lighting pass reads is unchanged.
    assert_eq!(
        lighting.texture("gColorBuffer"),
        Some(renderer.color_buffer().id())
    );
    assert_eq!(
        lighting.texture("gDepthBuffer"),
        Some(renderer.depth_stencil_buffer().id())
    );
}

#[test]
fn ssao_toggle_round_trips_between_frames() {
    let (mut device, mut renderer) = renderer_800x600();
    renderer.toggle_ssao(false);
    run_frame(&mut device, &mut renderer);
    device.take_commands();

    renderer.toggle_ssao(true);
    run_frame(&mut device, &mut renderer);
    let lighting = device
        .draws()
        .find(|d| d.effect == "deferred lighting")
        .unwrap();
    assert_eq!(
        lighting.texture("gOcclusion"),
        Some(renderer.post_ssao_buffer().id())
    );
}

// ── resize ────────────────────────────────────────────────────────────────

#[test]
fn resize_releases_previous_channels() {
    let (mut device, mut renderer) = renderer_800x600();
    run_frame(&mut device, &mut renderer);

    let old = gbuffer_ids(&renderer);
    assert!(old.iter().all(|&id| device.is_live(id)));

    device.resize(1024, 768);
    renderer.resize(&mut device, 1024, 768).unwrap();

    assert!(old.iter().all(|&id| !device.is_live(id)));
    let new = gbuffer_ids(&renderer);
    assert_eq!(new.len(), GBuffer::COUNT);
    for kind in GBuffer::ALL {
        assert_eq!(renderer.gbuffer(kind).size(), (1024, 768));
    }
    assert_eq!(renderer.size(), (1024, 768));
}

#[test]
#[should_panic(expected = "before a completed deferred pass")]
fn lighting_after_resize_needs_a_new_deferred_pass() {
    let (mut device, mut renderer) = renderer_800x600();
    run_frame(&mut device, &mut renderer);
    assert!(renderer.gbuffer_resolved());
    renderer.resize(&mut device, 640, 480).unwrap();
    assert!(!renderer.gbuffer_resolved());

    let frustum = Frustum::default();
    renderer.apply_lighting_phase(&mut device, &camera(&frustum));
}

#[test]
#[should_panic(expected = "stale g-buffer view")]
fn view_cloned_before_resize_cannot_be_shown() {
    let (mut device, mut renderer) = renderer_800x600();
    let stale = renderer.color_buffer().clone();

    device.resize(640, 480);
    renderer.resize(&mut device, 640, 480).unwrap();

    // The clone still holds its texture, so the generation is what rejects it.
    assert!(device.is_live(stale.id()));
    assert_ne!(stale.generation(), renderer.color_buffer().generation());
    renderer.render_buffer(&mut device, &stale);
}

#[test]
fn lights_survive_resize() {
    let (mut device, mut renderer) = renderer_800x600();
    renderer.add_point_light(PointLight::new(Vec3::ONE, Vec3::ONE, 2.0));
    renderer.resize(&mut device, 320, 240).unwrap();

    assert_eq!(renderer.lights().point_lights().len(), 1);
    assert_eq!(
        renderer.lights().point_lights()[0].position,
        Vec4::new(1.0, 1.0, 1.0, 1.0)
    );
}
