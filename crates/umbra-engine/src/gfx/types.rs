use bitflags::bitflags;

use super::DeviceError;

/// Texture pixel formats used by the renderer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Format {
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
    R32Float,
    Depth32Float,
}

impl Format {
    pub fn is_depth(self) -> bool {
        matches!(self, Format::Depth32Float)
    }

    pub fn channel_count(self) -> u32 {
        match self {
            Format::Rgba8Unorm | Format::Rgba16Float | Format::Rgba32Float => 4,
            Format::R32Float | Format::Depth32Float => 1,
        }
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Format::Rgba8Unorm | Format::R32Float | Format::Depth32Float => 4,
            Format::Rgba16Float => 8,
            Format::Rgba32Float => 16,
        }
    }

    /// Whether the format supports filtered sampling without extra device features.
    pub fn is_filterable(self) -> bool {
        matches!(self, Format::Rgba8Unorm | Format::Rgba16Float)
    }
}

bitflags! {
    /// How a texture may be bound to the pipeline.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct BindFlags: u32 {
        const RENDER_TARGET = 1 << 0;
        const SHADER_RESOURCE = 1 << 1;
        const DEPTH_STENCIL = 1 << 2;
    }
}

/// 2D texture description.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub bind: BindFlags,
}

impl TextureDesc {
    pub fn new(label: &'static str, width: u32, height: u32, format: Format, bind: BindFlags) -> Self {
        Self {
            label,
            width,
            height,
            format,
            bind,
        }
    }

    /// Checks the description before any backend allocation happens.
    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.width == 0 || self.height == 0 {
            return Err(DeviceError::InvalidSize {
                width: self.width,
                height: self.height,
            });
        }

        let misbound = if self.format.is_depth() {
            self.bind.contains(BindFlags::RENDER_TARGET)
        } else {
            self.bind.contains(BindFlags::DEPTH_STENCIL)
        };
        if misbound {
            return Err(DeviceError::UnsupportedBinding {
                format: self.format,
                bind: self.bind,
            });
        }

        Ok(())
    }

    /// Byte size of a tightly packed upload for this texture.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel() as usize
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Topology {
    TriangleList,
    TriangleStrip,
    /// Independent segments, two vertices each.
    LineList,
}

/// Vertex attribute formats.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn size(self) -> u32 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(format: Format, bind: BindFlags) -> TextureDesc {
        TextureDesc::new("test", 4, 4, format, bind)
    }

    #[test]
    fn zero_size_is_rejected() {
        let d = TextureDesc::new("test", 0, 4, Format::Rgba8Unorm, BindFlags::SHADER_RESOURCE);
        assert!(matches!(
            d.validate(),
            Err(DeviceError::InvalidSize { width: 0, height: 4 })
        ));
    }

    #[test]
    fn color_render_target_is_valid() {
        let bind = BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE;
        assert!(desc(Format::Rgba16Float, bind).validate().is_ok());
    }

    #[test]
    fn depth_stencil_is_valid() {
        let bind = BindFlags::DEPTH_STENCIL | BindFlags::SHADER_RESOURCE;
        assert!(desc(Format::Depth32Float, bind).validate().is_ok());
    }

    #[test]
    fn depth_format_as_render_target_is_rejected() {
        let bind = BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE;
        assert!(desc(Format::Depth32Float, bind).validate().is_err());
    }

    #[test]
    fn color_format_as_depth_stencil_is_rejected() {
        assert!(desc(Format::R32Float, BindFlags::DEPTH_STENCIL).validate().is_err());
    }

    #[test]
    fn byte_len_uses_pixel_size() {
        assert_eq!(desc(Format::Rgba32Float, BindFlags::SHADER_RESOURCE).byte_len(), 4 * 4 * 16);
    }
}
