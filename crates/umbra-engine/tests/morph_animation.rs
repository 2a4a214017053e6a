use glam::{Mat4, Vec3};

use umbra_engine::animation::{AnimationVertex, MorphAnimation, MorphMaterial};
use umbra_engine::backend::null::NullDevice;
use umbra_engine::camera::{Camera, Frustum};
use umbra_engine::gfx::BoundValue;
use umbra_engine::renderer::{DeferredRenderer, GBuffer, RendererConfig};
use umbra_engine::{AnimationError, RenderError};

fn quad(z: f32) -> Vec<AnimationVertex> {
    [
        Vec3::new(-1.0, -1.0, z),
        Vec3::new(1.0, -1.0, z),
        Vec3::new(1.0, 1.0, z),
        Vec3::new(-1.0, -1.0, z),
        Vec3::new(1.0, 1.0, z),
        Vec3::new(-1.0, 1.0, z),
    ]
    .into_iter()
    .map(|p| AnimationVertex::new(p, Vec3::Z, [p.x * 0.5 + 0.5, p.y * 0.5 + 0.5]))
    .collect()
}

fn three_frames(device: &mut NullDevice) -> MorphAnimation<NullDevice> {
    let frames = [quad(0.0), quad(1.0), quad(2.0)];
    MorphAnimation::new(device, &frames, &[1.0, 1.0, 1.0], &MorphMaterial::default()).unwrap()
}

fn blend_of_last_draw(device: &NullDevice) -> Option<f32> {
    match device.draws().last()?.value("gBlend")? {
        BoundValue::Float(v) => Some(*v),
        _ => None,
    }
}

// ── inside the renderer ───────────────────────────────────────────────────

#[test]
fn morph_writes_into_the_geometry_targets() {
    let mut device = NullDevice::new(800, 600);
    let mut renderer = DeferredRenderer::new(&mut device, RendererConfig::default()).unwrap();
    let mut anim = three_frames(&mut device);

    let frustum = Frustum::default().with_viewport(800, 600);
    let camera = Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y, &frustum);

    renderer.begin_deferred_state(&mut device);
    anim.update(0.5);
    anim.draw(&mut device, &camera, Mat4::IDENTITY);
    renderer.end_deferred_state(&mut device, &camera, &frustum);

    let draw = device.draws().find(|d| d.effect == "morph").unwrap();
    let expected_targets: Vec<_> = GBuffer::GEOMETRY
        .iter()
        .map(|&kind| renderer.gbuffer_set().rtv(kind).unwrap().id())
        .collect();
    assert_eq!(draw.targets, expected_targets);
    assert_eq!(
        draw.depth,
        renderer.gbuffer_set().depth_stencil().map(|v| v.id())
    );
    assert_eq!(draw.vertices, 0..6);
    assert_eq!(draw.vertex_buffers.len(), 2);
}

// ── playback ──────────────────────────────────────────────────────────────

#[test]
fn ping_pong_playback_over_three_frames() {
    let mut device = NullDevice::new(4, 4);
    let mut anim = three_frames(&mut device);
    let camera = Camera::default();

    let mut step = |anim: &mut MorphAnimation<NullDevice>, dt: f32| {
        anim.update(dt);
        anim.draw(&mut device, &camera, Mat4::IDENTITY);
        (anim.cursor().current(), anim.cursor().is_forwards())
    };

    assert_eq!(step(&mut anim, 0.5), (0, true));
    assert_eq!(step(&mut anim, 0.6), (1, true));
    // Past the end of the last segment: turn around on the final pose.
    assert_eq!(step(&mut anim, 1.1), (1, false));
    assert_eq!(step(&mut anim, 0.5), (1, false));
    assert_eq!(step(&mut anim, 0.6), (0, false));
    assert!((anim.cursor().blend() - 1.0).abs() < 1e-6);
    assert_eq!(step(&mut anim, 1.1), (0, true));
    assert_eq!(anim.cursor().blend(), 0.0);
}

#[test]
fn non_looping_animation_holds_final_pose() {
    let mut device = NullDevice::new(4, 4);
    let mut anim = three_frames(&mut device);
    anim.set_looping(false);

    for _ in 0..10 {
        anim.update(0.7);
    }
    anim.draw(&mut device, &Camera::default(), Mat4::IDENTITY);

    assert_eq!(anim.cursor().current(), 1);
    assert!(anim.cursor().is_forwards());
    assert_eq!(blend_of_last_draw(&device), Some(1.0));
    assert_eq!(anim.aabb().max.z, 1.0);
}

// ── construction errors ───────────────────────────────────────────────────

#[test]
fn single_frame_is_rejected() {
    let mut device = NullDevice::new(4, 4);
    let err = MorphAnimation::new(&mut device, &[quad(0.0)], &[1.0], &MorphMaterial::default())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        RenderError::Animation(AnimationError::TooFewKeyFrames(1))
    ));
}

#[test]
fn non_positive_span_is_rejected() {
    let mut device = NullDevice::new(4, 4);
    let frames = [quad(0.0), quad(1.0)];
    let err = MorphAnimation::new(&mut device, &frames, &[1.0, 0.0], &MorphMaterial::default())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        RenderError::Animation(AnimationError::InvalidTimeSpan { index: 1, .. })
    ));
}

#[test]
fn failed_upload_reports_allocation_error() {
    let mut device = NullDevice::new(4, 4);
    device.fail_allocations_after(1);
    let frames = [quad(0.0), quad(1.0)];
    let err = MorphAnimation::new(&mut device, &frames, &[1.0, 1.0], &MorphMaterial::default())
        .err()
        .unwrap();
    assert!(matches!(err, RenderError::Allocation { .. }));
}
