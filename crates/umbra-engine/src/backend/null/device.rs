use std::collections::HashMap;
use std::ops::Range;
use std::rc::{Rc, Weak};

use crate::gfx::{
    BindFlags, BoundValue, DeviceError, Effect, EffectDesc, EffectState, Format, GraphicsDevice,
    PassRef, TextureDesc, Topology, Variable, ViewInfo, ViewSource,
};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceId(u64);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ResourceKind {
    Texture,
    View,
    VertexBuffer,
    Effect,
}

// ── handles ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct NullTexture {
    id: ResourceId,
    desc: TextureDesc,
    alive: Rc<()>,
}

impl NullTexture {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }
}

/// View handle; used for render-target, depth-stencil and shader-resource views.
///
/// A view keeps its texture alive, like GPU APIs with reference-counted views.
#[derive(Debug, Clone)]
pub struct NullView {
    id: ResourceId,
    texture: ResourceId,
    format: Format,
    size: (u32, u32),
    _alive: Rc<()>,
    _texture_alive: Rc<()>,
}

impl NullView {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn texture_id(&self) -> ResourceId {
        self.texture
    }
}

impl PartialEq for NullView {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl ViewInfo for NullView {
    fn format(&self) -> Format {
        self.format
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl ViewSource<NullView> for NullView {
    fn view(&self) -> &NullView {
        self
    }
}

#[derive(Debug)]
pub struct NullVertexBuffer {
    id: ResourceId,
    len: usize,
    stride: u32,
    _alive: Rc<()>,
}

impl NullVertexBuffer {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn vertex_count(&self) -> u32 {
        (self.len / self.stride.max(1) as usize) as u32
    }
}

#[derive(Debug)]
pub struct NullEffect {
    id: ResourceId,
    state: EffectState<NullView>,
    _alive: Rc<()>,
}

impl NullEffect {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn value(&self, name: &str) -> Option<&BoundValue<NullView>> {
        self.state.value(name)
    }
}

impl Effect for NullEffect {
    type ShaderResourceView = NullView;

    fn desc(&self) -> &EffectDesc {
        self.state.desc()
    }

    #[track_caller]
    fn set(&mut self, name: &str, value: Variable<'_, NullView>) {
        self.state.set(name, value);
    }
}

// ── command log ───────────────────────────────────────────────────────────

/// One recorded draw with the effect values it saw.
#[derive(Debug, Clone)]
pub struct DrawCall {
    pub effect: &'static str,
    pub technique: &'static str,
    pub pass: &'static str,
    pub targets: Vec<ResourceId>,
    pub depth: Option<ResourceId>,
    pub vertex_buffers: Vec<ResourceId>,
    pub topology: Topology,
    pub vertices: Range<u32>,
    /// Variable values at draw time; textures are recorded by view id.
    pub values: Vec<(&'static str, BoundValue<ResourceId>)>,
}

impl DrawCall {
    pub fn value(&self, name: &str) -> Option<&BoundValue<ResourceId>> {
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Id of the view bound to texture variable `name`, if any.
    pub fn texture(&self, name: &str) -> Option<ResourceId> {
        self.value(name).and_then(BoundValue::as_texture).copied()
    }
}

#[derive(Debug, Clone)]
pub enum Command {
    SetRenderTargets {
        colors: Vec<ResourceId>,
        depth: Option<ResourceId>,
    },
    UnbindRenderTargets,
    ResetRenderTarget,
    ClearRenderTarget {
        view: ResourceId,
        color: [f32; 4],
    },
    ClearDepthStencil {
        view: ResourceId,
        depth: f32,
    },
    Draw(DrawCall),
}

// ── device ────────────────────────────────────────────────────────────────

struct Output {
    back_buffer: NullView,
    depth: NullView,
}

pub struct NullDevice {
    next_id: u64,
    size: (u32, u32),
    live: HashMap<ResourceId, (ResourceKind, Weak<()>)>,
    commands: Vec<Command>,
    bound_colors: Vec<ResourceId>,
    bound_depth: Option<ResourceId>,
    allocations_left: Option<usize>,
    output: Option<Output>,
}

impl NullDevice {
    /// Creates a device with a `width` x `height` back buffer and depth buffer.
    pub fn new(width: u32, height: u32) -> Self {
        let mut device = Self {
            next_id: 1,
            size: (width.max(1), height.max(1)),
            live: HashMap::new(),
            commands: Vec::new(),
            bound_colors: Vec::new(),
            bound_depth: None,
            allocations_left: None,
            output: None,
        };
        device.rebuild_output();
        device.reset_render_target();
        device.commands.clear();
        device
    }

    /// Resizes the back buffer and the main depth buffer.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width.max(1), height.max(1));
        self.rebuild_output();
    }

    /// Drops the back buffer and main depth buffer, like a windowed device
    /// between frames. `resize` brings them back.
    pub fn release_output(&mut self) {
        self.output = None;
        self.bound_colors.clear();
        self.bound_depth = None;
    }

    /// Makes every allocation after the next `n` fail with `OutOfMemory`.
    pub fn fail_allocations_after(&mut self, n: usize) {
        self.allocations_left = Some(n);
    }

    pub fn allow_allocations(&mut self) {
        self.allocations_left = None;
    }

    /// Whether a handle with `id` (or a clone of it) still exists.
    pub fn is_live(&self, id: ResourceId) -> bool {
        self.live
            .get(&id)
            .is_some_and(|(_, alive)| alive.strong_count() > 0)
    }

    /// Number of textures still referenced, including the back and depth buffers.
    pub fn live_texture_count(&self) -> usize {
        self.live_count(ResourceKind::Texture)
    }

    pub fn live_effect_count(&self) -> usize {
        self.live_count(ResourceKind::Effect)
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawCall> + '_ {
        self.commands.iter().filter_map(|c| match c {
            Command::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    /// Ids of the currently bound color targets.
    pub fn bound_render_targets(&self) -> &[ResourceId] {
        &self.bound_colors
    }

    pub fn bound_depth_stencil(&self) -> Option<ResourceId> {
        self.bound_depth
    }

    fn live_count(&self, kind: ResourceKind) -> usize {
        self.live
            .values()
            .filter(|(k, alive)| *k == kind && alive.strong_count() > 0)
            .count()
    }

    fn register(&mut self, kind: ResourceKind) -> (ResourceId, Rc<()>) {
        let id = ResourceId(self.next_id);
        self.next_id += 1;

        let alive = Rc::new(());
        self.live.retain(|_, (_, weak)| weak.strong_count() > 0);
        self.live.insert(id, (kind, Rc::downgrade(&alive)));
        (id, alive)
    }

    fn allocate(&mut self, resource: &str) -> Result<(), DeviceError> {
        if let Some(left) = &mut self.allocations_left {
            if *left == 0 {
                log::debug!("null device: injected allocation failure for {resource}");
                return Err(DeviceError::OutOfMemory {
                    resource: resource.to_string(),
                });
            }
            *left -= 1;
        }
        Ok(())
    }

    fn make_texture(&mut self, desc: &TextureDesc) -> NullTexture {
        let (id, alive) = self.register(ResourceKind::Texture);
        NullTexture {
            id,
            desc: *desc,
            alive,
        }
    }

    fn make_view(&mut self, texture: &NullTexture) -> NullView {
        let (id, alive) = self.register(ResourceKind::View);
        NullView {
            id,
            texture: texture.id,
            format: texture.desc.format,
            size: (texture.desc.width, texture.desc.height),
            _alive: alive,
            _texture_alive: Rc::clone(&texture.alive),
        }
    }

    fn make_checked_view(
        &mut self,
        texture: &NullTexture,
        required: BindFlags,
    ) -> Result<NullView, DeviceError> {
        if !texture.desc.bind.contains(required) {
            return Err(DeviceError::MissingBindFlag {
                label: texture.desc.label,
                required,
            });
        }
        self.allocate(texture.desc.label)?;
        Ok(self.make_view(texture))
    }

    fn rebuild_output(&mut self) {
        let (width, height) = self.size;

        let color_desc = TextureDesc::new(
            "back buffer",
            width,
            height,
            Format::Rgba8Unorm,
            BindFlags::RENDER_TARGET,
        );
        let depth_desc = TextureDesc::new(
            "main depth",
            width,
            height,
            Format::Depth32Float,
            BindFlags::DEPTH_STENCIL,
        );

        let color = self.make_texture(&color_desc);
        let depth = self.make_texture(&depth_desc);
        self.output = Some(Output {
            back_buffer: self.make_view(&color),
            depth: self.make_view(&depth),
        });
    }
}

impl GraphicsDevice for NullDevice {
    type Texture = NullTexture;
    type RenderTargetView = NullView;
    type DepthStencilView = NullView;
    type ShaderResourceView = NullView;
    type VertexBuffer = NullVertexBuffer;
    type Effect = NullEffect;

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<NullTexture, DeviceError> {
        desc.validate()?;
        self.allocate(desc.label)?;
        Ok(self.make_texture(desc))
    }

    fn create_texture_with_data(
        &mut self,
        desc: &TextureDesc,
        data: &[u8],
    ) -> Result<NullTexture, DeviceError> {
        desc.validate()?;
        if data.len() != desc.byte_len() {
            return Err(DeviceError::DataSizeMismatch {
                label: desc.label,
                expected: desc.byte_len(),
                found: data.len(),
            });
        }
        self.allocate(desc.label)?;
        Ok(self.make_texture(desc))
    }

    fn create_render_target_view(&mut self, texture: &NullTexture) -> Result<NullView, DeviceError> {
        self.make_checked_view(texture, BindFlags::RENDER_TARGET)
    }

    fn create_depth_stencil_view(&mut self, texture: &NullTexture) -> Result<NullView, DeviceError> {
        self.make_checked_view(texture, BindFlags::DEPTH_STENCIL)
    }

    fn create_shader_resource_view(
        &mut self,
        texture: &NullTexture,
    ) -> Result<NullView, DeviceError> {
        self.make_checked_view(texture, BindFlags::SHADER_RESOURCE)
    }

    fn create_vertex_buffer(
        &mut self,
        label: &str,
        data: &[u8],
        stride: u32,
    ) -> Result<NullVertexBuffer, DeviceError> {
        self.allocate(label)?;
        let (id, alive) = self.register(ResourceKind::VertexBuffer);
        Ok(NullVertexBuffer {
            id,
            len: data.len(),
            stride,
            _alive: alive,
        })
    }

    fn create_effect(&mut self, desc: &EffectDesc) -> Result<NullEffect, DeviceError> {
        desc.validate()?;
        self.allocate(desc.label)?;
        let (id, alive) = self.register(ResourceKind::Effect);
        Ok(NullEffect {
            id,
            state: EffectState::new(desc),
            _alive: alive,
        })
    }

    fn viewport_size(&self) -> (u32, u32) {
        self.size
    }

    fn back_buffer_view(&self) -> Option<NullView> {
        self.output.as_ref().map(|o| o.back_buffer.clone())
    }

    fn depth_stencil_view(&self) -> Option<NullView> {
        self.output.as_ref().map(|o| o.depth.clone())
    }

    fn set_render_targets(&mut self, colors: &[&NullView], depth: Option<&NullView>) {
        self.bound_colors = colors.iter().map(|v| v.id).collect();
        self.bound_depth = depth.map(|v| v.id);
        self.commands.push(Command::SetRenderTargets {
            colors: self.bound_colors.clone(),
            depth: self.bound_depth,
        });
    }

    fn unbind_render_targets(&mut self) {
        self.bound_colors.clear();
        self.bound_depth = None;
        self.commands.push(Command::UnbindRenderTargets);
    }

    fn reset_render_target(&mut self) {
        self.bound_colors = self
            .output
            .as_ref()
            .map(|o| vec![o.back_buffer.id])
            .unwrap_or_default();
        self.bound_depth = self.output.as_ref().map(|o| o.depth.id);
        self.commands.push(Command::ResetRenderTarget);
    }

    fn clear_render_target(&mut self, view: &NullView, color: [f32; 4]) {
        self.commands.push(Command::ClearRenderTarget {
            view: view.id,
            color,
        });
    }

    fn clear_depth_stencil(&mut self, view: &NullView, depth: f32) {
        self.commands.push(Command::ClearDepthStencil {
            view: view.id,
            depth,
        });
    }

    fn draw(
        &mut self,
        effect: &mut NullEffect,
        pass: PassRef,
        vertex_buffers: &[&NullVertexBuffer],
        topology: Topology,
        vertices: Range<u32>,
    ) {
        let desc = effect.desc();
        let technique = &desc.techniques[pass.technique];
        let pass_desc = &technique.passes[pass.pass];

        let slots = desc.slot_count() as usize;
        assert!(
            vertex_buffers.len() == slots,
            "effect `{}` expects {slots} vertex buffers, got {}",
            desc.label,
            vertex_buffers.len()
        );

        let draw = DrawCall {
            effect: desc.label,
            technique: technique.name,
            pass: pass_desc.name,
            targets: self.bound_colors.clone(),
            depth: self.bound_depth,
            vertex_buffers: vertex_buffers.iter().map(|vb| vb.id).collect(),
            topology,
            vertices,
            values: effect
                .state
                .values()
                .map(|(var, value)| (var.name, value.map_texture(NullView::id)))
                .collect(),
        };
        log::trace!(
            "null device: draw {}::{}::{}",
            draw.effect,
            draw.technique,
            draw.pass
        );
        self.commands.push(Command::Draw(draw));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_desc() -> TextureDesc {
        TextureDesc::new(
            "color",
            8,
            8,
            Format::Rgba8Unorm,
            BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE,
        )
    }

    #[test]
    fn views_keep_texture_alive() {
        let mut device = NullDevice::new(4, 4);
        let texture = device.create_texture(&color_desc()).unwrap();
        let id = texture.id();
        let view = device.create_shader_resource_view(&texture).unwrap();

        drop(texture);
        assert!(device.is_live(id));

        drop(view);
        assert!(!device.is_live(id));
    }

    #[test]
    fn view_equality_is_identity() {
        let mut device = NullDevice::new(4, 4);
        let texture = device.create_texture(&color_desc()).unwrap();
        let a = device.create_shader_resource_view(&texture).unwrap();
        let b = device.create_shader_resource_view(&texture).unwrap();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn view_requires_matching_bind_flag() {
        let mut device = NullDevice::new(4, 4);
        let desc = TextureDesc::new("srv only", 4, 4, Format::R32Float, BindFlags::SHADER_RESOURCE);
        let texture = device.create_texture(&desc).unwrap();
        assert!(matches!(
            device.create_render_target_view(&texture),
            Err(DeviceError::MissingBindFlag { .. })
        ));
    }

    #[test]
    fn injected_failure_trips_after_budget() {
        let mut device = NullDevice::new(4, 4);
        device.fail_allocations_after(1);
        assert!(device.create_texture(&color_desc()).is_ok());
        assert!(matches!(
            device.create_texture(&color_desc()),
            Err(DeviceError::OutOfMemory { .. })
        ));

        device.allow_allocations();
        assert!(device.create_texture(&color_desc()).is_ok());
    }

    #[test]
    fn texture_data_size_is_checked() {
        let mut device = NullDevice::new(4, 4);
        let desc = TextureDesc::new("tex", 2, 2, Format::Rgba8Unorm, BindFlags::SHADER_RESOURCE);
        assert!(device.create_texture_with_data(&desc, &[0; 16]).is_ok());
        assert!(device.create_texture_with_data(&desc, &[0; 15]).is_err());
    }

    #[test]
    fn reset_binds_back_buffer_and_depth() {
        let mut device = NullDevice::new(4, 4);
        device.unbind_render_targets();
        device.reset_render_target();

        let back = device.back_buffer_view().unwrap();
        let depth = device.depth_stencil_view().unwrap();
        assert_eq!(device.bound_render_targets(), &[back.id()]);
        assert_eq!(device.bound_depth_stencil(), Some(depth.id()));
    }

    #[test]
    fn resize_replaces_output_buffers() {
        let mut device = NullDevice::new(4, 4);
        let before = device.back_buffer_view().unwrap();
        device.resize(16, 8);
        let after = device.back_buffer_view().unwrap();

        assert_ne!(before, after);
        assert_eq!(after.size(), (16, 8));
        assert_eq!(device.viewport_size(), (16, 8));
    }
}
