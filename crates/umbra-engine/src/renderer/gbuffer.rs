//! G-buffer channels and the set that owns them.

use std::ops::Deref;

use crate::error::RenderError;
use crate::gfx::{BindFlags, Format, GraphicsDevice, TextureDesc, ViewSource};

use super::target::RenderTexture;

/// G-buffer channel slots, in binding order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum GBuffer {
    Color = 0,
    Position = 1,
    Normal = 2,
    Material = 3,
    PreSsao = 4,
    PostSsao = 5,
    Depth = 6,
}

impl GBuffer {
    pub const COUNT: usize = 7;

    pub const ALL: [GBuffer; GBuffer::COUNT] = [
        GBuffer::Color,
        GBuffer::Position,
        GBuffer::Normal,
        GBuffer::Material,
        GBuffer::PreSsao,
        GBuffer::PostSsao,
        GBuffer::Depth,
    ];

    /// Channels written by the geometry phase, in render-target order.
    pub const GEOMETRY: [GBuffer; 4] = [
        GBuffer::Color,
        GBuffer::Position,
        GBuffer::Normal,
        GBuffer::Material,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The four geometry formats add up to 32 bytes per sample, wgpu's
    /// default color attachment budget.
    pub fn format(self) -> Format {
        match self {
            GBuffer::Color | GBuffer::Material => Format::Rgba8Unorm,
            GBuffer::Position | GBuffer::Normal => Format::Rgba16Float,
            GBuffer::PreSsao | GBuffer::PostSsao => Format::R32Float,
            GBuffer::Depth => Format::Depth32Float,
        }
    }

    pub fn bind_flags(self) -> BindFlags {
        match self {
            GBuffer::Depth => BindFlags::DEPTH_STENCIL | BindFlags::SHADER_RESOURCE,
            _ => BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GBuffer::Color => "gbuffer color",
            GBuffer::Position => "gbuffer position",
            GBuffer::Normal => "gbuffer normal",
            GBuffer::Material => "gbuffer material",
            GBuffer::PreSsao => "gbuffer pre-ssao",
            GBuffer::PostSsao => "gbuffer post-ssao",
            GBuffer::Depth => "gbuffer depth",
        }
    }

    pub fn texture_desc(self, width: u32, height: u32) -> TextureDesc {
        TextureDesc::new(self.label(), width, height, self.format(), self.bind_flags())
    }
}

impl TryFrom<u32> for GBuffer {
    type Error = RenderError;

    fn try_from(index: u32) -> Result<Self, Self::Error> {
        GBuffer::ALL
            .get(index as usize)
            .copied()
            .ok_or(RenderError::GBufferIndexOutOfRange {
                index,
                count: GBuffer::COUNT as u32,
            })
    }
}

/// Shader-resource view of one g-buffer channel, tagged with the generation
/// of the set that produced it.
///
/// Derefs to the backend view.
#[derive(Debug, Clone, PartialEq)]
pub struct GBufferView<V> {
    view: V,
    kind: GBuffer,
    generation: u64,
}

impl<V> GBufferView<V> {
    pub fn kind(&self) -> GBuffer {
        self.kind
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<V> Deref for GBufferView<V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.view
    }
}

impl<V> ViewSource<V> for GBufferView<V> {
    fn view(&self) -> &V {
        &self.view
    }

    fn gbuffer_generation(&self) -> Option<u64> {
        Some(self.generation)
    }
}

/// All seven channels at one resolution.
///
/// The set is built completely or not at all. Replacing it (on resize) drops
/// every channel of the old set. A view cloned earlier keeps its texture
/// alive but carries the old generation, and the renderer rejects it.
pub struct GBufferSet<D: GraphicsDevice> {
    views: Vec<GBufferView<D::ShaderResourceView>>,
    channels: Vec<RenderTexture<D>>,
    width: u32,
    height: u32,
    generation: u64,
}

impl<D: GraphicsDevice> GBufferSet<D> {
    pub fn new(device: &mut D, width: u32, height: u32, generation: u64) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidResolution { width, height });
        }

        let channels = GBuffer::ALL
            .iter()
            .map(|kind| RenderTexture::new(device, &kind.texture_desc(width, height)))
            .collect::<Result<Vec<_>, _>>()?;

        let views = GBuffer::ALL
            .iter()
            .zip(&channels)
            .map(|(&kind, channel)| GBufferView {
                view: channel.srv().clone(),
                kind,
                generation,
            })
            .collect();

        log::debug!("g-buffer generation {generation} allocated at {width}x{height}");

        Ok(Self {
            views,
            channels,
            width,
            height,
            generation,
        })
    }

    pub fn channel(&self, kind: GBuffer) -> &RenderTexture<D> {
        &self.channels[kind.index()]
    }

    pub fn srv(&self, kind: GBuffer) -> &D::ShaderResourceView {
        self.channel(kind).srv()
    }

    pub fn view(&self, kind: GBuffer) -> &GBufferView<D::ShaderResourceView> {
        &self.views[kind.index()]
    }

    /// Render-target views of the geometry channels, in target order.
    pub fn geometry_targets(&self) -> Vec<&D::RenderTargetView> {
        GBuffer::GEOMETRY
            .iter()
            .filter_map(|kind| self.channel(*kind).rtv())
            .collect()
    }

    pub fn rtv(&self, kind: GBuffer) -> Option<&D::RenderTargetView> {
        self.channel(kind).rtv()
    }

    pub fn depth_stencil(&self) -> Option<&D::DepthStencilView> {
        self.channel(GBuffer::Depth).dsv()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Incremented each time the renderer reallocates the set.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
