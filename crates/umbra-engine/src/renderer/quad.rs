use bytemuck::{Pod, Zeroable};

use crate::error::RenderError;
use crate::gfx::{Effect, GraphicsDevice, InputElement, PassRef, Topology, VertexFormat};

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2], // clip space
    pub tex_coord: [f32; 2],
}

/// Input layout shared by every fullscreen effect.
pub const QUAD_INPUT_LAYOUT: &[InputElement] = &[
    InputElement::new("POSITION", VertexFormat::Float32x2, 0),
    InputElement::new("TEXCOORD", VertexFormat::Float32x2, 0),
];

/// Strip order: two triangles covering clip space, uv origin top-left.
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, 1.0],
        tex_coord: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        tex_coord: [1.0, 0.0],
    },
    QuadVertex {
        position: [-1.0, -1.0],
        tex_coord: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        tex_coord: [1.0, 1.0],
    },
];

/// Immutable fullscreen quad used by the lighting, SSAO and buffer-view passes.
pub struct FullscreenQuad<D: GraphicsDevice> {
    vertices: D::VertexBuffer,
}

impl<D: GraphicsDevice> FullscreenQuad<D> {
    pub fn new(device: &mut D) -> Result<Self, RenderError> {
        let vertices = device
            .create_vertex_buffer(
                "fullscreen quad",
                bytemuck::cast_slice(&QUAD_VERTICES),
                std::mem::size_of::<QuadVertex>() as u32,
            )
            .map_err(RenderError::allocation("fullscreen quad"))?;
        Ok(Self { vertices })
    }

    pub fn draw(&self, device: &mut D, effect: &mut D::Effect, pass: PassRef) {
        device.draw(
            effect,
            pass,
            &[&self.vertices],
            Topology::TriangleStrip,
            0..QUAD_VERTICES.len() as u32,
        );
    }

    /// Draws every pass of `technique`.
    pub fn draw_technique(&self, device: &mut D, effect: &mut D::Effect, technique: &str) {
        let technique = effect.technique_by_name(technique);
        for pass in 0..effect.pass_count(technique) {
            self.draw(device, effect, technique.pass(pass));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_matches_input_layout_stride() {
        let stride: u32 = QUAD_INPUT_LAYOUT.iter().map(|e| e.format.size()).sum();
        assert_eq!(stride as usize, std::mem::size_of::<QuadVertex>());
    }

    #[test]
    fn strip_covers_clip_space_corners() {
        let mut corners: Vec<_> = QUAD_VERTICES.iter().map(|v| v.position).collect();
        corners.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(
            corners,
            vec![[-1.0, -1.0], [-1.0, 1.0], [1.0, -1.0], [1.0, 1.0]]
        );
    }
}
