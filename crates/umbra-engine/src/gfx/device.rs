use std::fmt::Debug;
use std::ops::Range;

use thiserror::Error;

use super::{BindFlags, Effect, EffectDesc, Format, PassRef, TextureDesc, Topology};

/// Failure reported by a graphics backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeviceError {
    #[error("invalid texture size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("format {format:?} cannot be bound as {bind:?}")]
    UnsupportedBinding { format: Format, bind: BindFlags },

    #[error("texture `{label}` was not created with {required:?}")]
    MissingBindFlag {
        label: &'static str,
        required: BindFlags,
    },

    #[error("initial data for `{label}` is {found} bytes, expected {expected}")]
    DataSizeMismatch {
        label: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("out of device memory while creating {resource}")]
    OutOfMemory { resource: String },

    #[error("effect `{effect}` failed to build: {reason}")]
    Effect { effect: &'static str, reason: String },
}

/// Metadata every shader-resource view exposes.
pub trait ViewInfo {
    fn format(&self) -> Format;

    /// Size in pixels of the viewed texture.
    fn size(&self) -> (u32, u32);

    fn is_depth(&self) -> bool {
        self.format().is_depth()
    }

    fn channel_count(&self) -> u32 {
        self.format().channel_count()
    }
}

/// A shader-resource view as handed to the buffer viewer.
///
/// Plain backend views report no generation. Views of the renderer's own
/// g-buffer carry the generation of the set they came from.
pub trait ViewSource<V> {
    fn view(&self) -> &V;

    fn gbuffer_generation(&self) -> Option<u64> {
        None
    }
}

/// Device collaborator used by every render phase.
///
/// Resource handles release their GPU memory on drop. Views are cheap handles
/// with identity equality: two views compare equal only when they were
/// produced by the same `create_*_view` call (or are clones of it).
///
/// Binding and draw calls are recorded immediately in submission order; there
/// is no deferred command list on this interface.
pub trait GraphicsDevice {
    type Texture;
    type RenderTargetView: Clone + PartialEq + Debug;
    type DepthStencilView: Clone + PartialEq + Debug;
    type ShaderResourceView: ViewInfo
        + ViewSource<Self::ShaderResourceView>
        + Clone
        + PartialEq
        + Debug;
    type VertexBuffer;
    type Effect: Effect<ShaderResourceView = Self::ShaderResourceView>;

    // ── resources ─────────────────────────────────────────────────────────

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<Self::Texture, DeviceError>;

    /// Creates a texture and uploads `data` (tightly packed rows).
    fn create_texture_with_data(
        &mut self,
        desc: &TextureDesc,
        data: &[u8],
    ) -> Result<Self::Texture, DeviceError>;

    fn create_render_target_view(
        &mut self,
        texture: &Self::Texture,
    ) -> Result<Self::RenderTargetView, DeviceError>;

    fn create_depth_stencil_view(
        &mut self,
        texture: &Self::Texture,
    ) -> Result<Self::DepthStencilView, DeviceError>;

    fn create_shader_resource_view(
        &mut self,
        texture: &Self::Texture,
    ) -> Result<Self::ShaderResourceView, DeviceError>;

    fn create_vertex_buffer(
        &mut self,
        label: &str,
        data: &[u8],
        stride: u32,
    ) -> Result<Self::VertexBuffer, DeviceError>;

    fn create_effect(&mut self, desc: &EffectDesc) -> Result<Self::Effect, DeviceError>;

    // ── output ────────────────────────────────────────────────────────────

    /// Size of the presentable back buffer in pixels.
    fn viewport_size(&self) -> (u32, u32);

    /// Render-target view of the current back buffer, if a frame is active.
    fn back_buffer_view(&self) -> Option<Self::RenderTargetView>;

    /// The device's main depth-stencil view, sized like the back buffer.
    fn depth_stencil_view(&self) -> Option<Self::DepthStencilView>;

    // ── bindings ──────────────────────────────────────────────────────────

    fn set_render_targets(
        &mut self,
        colors: &[&Self::RenderTargetView],
        depth: Option<&Self::DepthStencilView>,
    );

    fn unbind_render_targets(&mut self);

    /// Rebinds the back buffer and the main depth-stencil view.
    fn reset_render_target(&mut self);

    fn clear_render_target(&mut self, view: &Self::RenderTargetView, color: [f32; 4]);

    fn clear_depth_stencil(&mut self, view: &Self::DepthStencilView, depth: f32);

    // ── drawing ───────────────────────────────────────────────────────────

    /// Draws `vertices` with one pass of `effect` into the bound targets.
    ///
    /// `vertex_buffers[i]` feeds input slot `i` of the effect's input layout.
    fn draw(
        &mut self,
        effect: &mut Self::Effect,
        pass: PassRef,
        vertex_buffers: &[&Self::VertexBuffer],
        topology: Topology,
        vertices: Range<u32>,
    );
}
