//! Mapping from backend-neutral descriptions to wgpu types.

use crate::gfx::{BindFlags, BlendMode, DepthMode, Format, TextureSample, Topology, VertexFormat};

pub(super) fn texture_format(format: Format) -> wgpu::TextureFormat {
    match format {
        Format::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        Format::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        Format::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        Format::R32Float => wgpu::TextureFormat::R32Float,
        Format::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

/// Bytes per sample taken by `formats` bound together as color attachments,
/// counted the way wgpu checks `max_color_attachment_bytes_per_sample`.
pub(super) fn attachment_bytes_per_sample(formats: impl IntoIterator<Item = Format>) -> u32 {
    formats
        .into_iter()
        .map(texture_format)
        .fold(0, |total, format| {
            let align = format.target_component_alignment().unwrap_or(1);
            total.next_multiple_of(align) + format.target_pixel_byte_cost().unwrap_or(0)
        })
}

pub(super) fn texture_usage(bind: BindFlags) -> wgpu::TextureUsages {
    let mut usage = wgpu::TextureUsages::COPY_DST;
    if bind.intersects(BindFlags::RENDER_TARGET | BindFlags::DEPTH_STENCIL) {
        usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if bind.contains(BindFlags::SHADER_RESOURCE) {
        usage |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    usage
}

pub(super) fn vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
    }
}

pub(super) fn topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        Topology::LineList => wgpu::PrimitiveTopology::LineList,
    }
}

pub(super) fn blend_state(blend: BlendMode) -> Option<wgpu::BlendState> {
    match blend {
        BlendMode::Replace => None,
        BlendMode::Additive => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        }),
        BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
    }
}

/// `(depth_write_enabled, depth_compare)`.
pub(super) fn depth_state(depth: DepthMode) -> (bool, wgpu::CompareFunction) {
    match depth {
        DepthMode::Disabled => (false, wgpu::CompareFunction::Always),
        DepthMode::Test => (false, wgpu::CompareFunction::LessEqual),
        DepthMode::TestWrite => (true, wgpu::CompareFunction::Less),
    }
}

pub(super) fn sample_type(sample: TextureSample) -> wgpu::TextureSampleType {
    match sample {
        TextureSample::Float => wgpu::TextureSampleType::Float { filterable: true },
        TextureSample::UnfilterableFloat => wgpu::TextureSampleType::Float { filterable: false },
        TextureSample::Depth => wgpu::TextureSampleType::Depth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::GBuffer;

    #[test]
    fn gbuffer_formats_map_one_to_one() {
        assert_eq!(
            texture_format(Format::Rgba32Float),
            wgpu::TextureFormat::Rgba32Float
        );
        assert_eq!(
            texture_format(Format::Depth32Float),
            wgpu::TextureFormat::Depth32Float
        );
    }

    #[test]
    fn geometry_targets_fit_default_attachment_budget() {
        let bytes = attachment_bytes_per_sample(GBuffer::GEOMETRY.map(GBuffer::format));
        assert_eq!(bytes, 32);
        assert!(bytes <= wgpu::Limits::default().max_color_attachment_bytes_per_sample);
    }

    #[test]
    fn full_float_position_overflows_attachment_budget() {
        let bytes = attachment_bytes_per_sample([
            Format::Rgba8Unorm,
            Format::Rgba32Float,
            Format::Rgba16Float,
            Format::Rgba8Unorm,
        ]);
        assert_eq!(bytes, 40);
    }

    #[test]
    fn usage_follows_bind_flags() {
        let usage = texture_usage(BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE);
        assert!(usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
        assert!(usage.contains(wgpu::TextureUsages::TEXTURE_BINDING));

        let usage = texture_usage(BindFlags::SHADER_RESOURCE);
        assert!(!usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
    }

    #[test]
    fn disabled_depth_never_writes() {
        assert_eq!(
            depth_state(DepthMode::Disabled),
            (false, wgpu::CompareFunction::Always)
        );
        assert!(depth_state(DepthMode::TestWrite).0);
    }
}
