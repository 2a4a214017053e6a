use crate::error::RenderError;
use crate::gfx::{BindFlags, GraphicsDevice, TextureDesc};

/// Write-side view of a render texture.
pub enum TargetView<D: GraphicsDevice> {
    Color(D::RenderTargetView),
    Depth(D::DepthStencilView),
}

/// A texture together with its write and read views.
///
/// The three handles are created together and dropped together. Fields drop in
/// declaration order, so both views are released before the texture.
pub struct RenderTexture<D: GraphicsDevice> {
    target: TargetView<D>,
    srv: D::ShaderResourceView,
    texture: D::Texture,
}

impl<D: GraphicsDevice> RenderTexture<D> {
    /// Allocates the texture and both views.
    ///
    /// `desc.bind` selects the write view: `DEPTH_STENCIL` yields a depth view,
    /// anything else a render-target view. A shader-resource view is always made.
    pub fn new(device: &mut D, desc: &TextureDesc) -> Result<Self, RenderError> {
        let desc = TextureDesc {
            bind: desc.bind | BindFlags::SHADER_RESOURCE,
            ..*desc
        };
        let failed = RenderError::allocation;

        let texture = device.create_texture(&desc).map_err(failed(desc.label))?;
        let target = if desc.bind.contains(BindFlags::DEPTH_STENCIL) {
            TargetView::Depth(
                device
                    .create_depth_stencil_view(&texture)
                    .map_err(failed(desc.label))?,
            )
        } else {
            TargetView::Color(
                device
                    .create_render_target_view(&texture)
                    .map_err(failed(desc.label))?,
            )
        };
        let srv = device
            .create_shader_resource_view(&texture)
            .map_err(failed(desc.label))?;

        Ok(Self {
            target,
            srv,
            texture,
        })
    }

    pub fn texture(&self) -> &D::Texture {
        &self.texture
    }

    pub fn srv(&self) -> &D::ShaderResourceView {
        &self.srv
    }

    pub fn rtv(&self) -> Option<&D::RenderTargetView> {
        match &self.target {
            TargetView::Color(rtv) => Some(rtv),
            TargetView::Depth(_) => None,
        }
    }

    pub fn dsv(&self) -> Option<&D::DepthStencilView> {
        match &self.target {
            TargetView::Depth(dsv) => Some(dsv),
            TargetView::Color(_) => None,
        }
    }
}
