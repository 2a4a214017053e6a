//! Procedural meshes for the demo scene. All meshes are triangle lists.

use std::f32::consts::{PI, TAU};

use glam::Vec3;
use umbra_engine::animation::AnimationVertex;

/// Square floor in the XZ plane facing +Y, `half` units from center to edge.
pub fn plane(half: f32) -> Vec<AnimationVertex> {
    let corners = [
        (Vec3::new(-half, 0.0, -half), [0.0, 0.0]),
        (Vec3::new(half, 0.0, -half), [1.0, 0.0]),
        (Vec3::new(half, 0.0, half), [1.0, 1.0]),
        (Vec3::new(-half, 0.0, half), [0.0, 1.0]),
    ];
    [0, 2, 1, 0, 3, 2]
        .into_iter()
        .map(|i| AnimationVertex::new(corners[i].0, Vec3::Y, corners[i].1))
        .collect()
}

/// Axis-aligned cube centered on the origin.
pub fn cube(half: f32) -> Vec<AnimationVertex> {
    let mut vertices = Vec::with_capacity(36);
    for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
        for sign in [1.0, -1.0] {
            let n = axis * sign;
            let (u, v) = face_basis(n);
            let corner = |a: f32, b: f32| (n + u * a + v * b) * half;
            let quad = [
                (corner(-1.0, -1.0), [0.0, 0.0]),
                (corner(1.0, -1.0), [1.0, 0.0]),
                (corner(1.0, 1.0), [1.0, 1.0]),
                (corner(-1.0, 1.0), [0.0, 1.0]),
            ];
            for i in [0, 1, 2, 0, 2, 3] {
                vertices.push(AnimationVertex::new(quad[i].0, n, quad[i].1));
            }
        }
    }
    vertices
}

fn face_basis(n: Vec3) -> (Vec3, Vec3) {
    let helper = if n.y.abs() > 0.5 { Vec3::Z } else { Vec3::Y };
    let u = helper.cross(n).normalize();
    (u, n.cross(u))
}

/// Morph key frames over one latitude/longitude grid: sphere, rounded cube,
/// squashed sphere. Every frame has the same vertex count and order.
pub fn morph_frames(stacks: u32, slices: u32, radius: f32) -> Vec<Vec<AnimationVertex>> {
    let squash = Vec3::new(1.25, 0.6, 1.25);
    let shapes: [&dyn Fn(Vec3) -> (Vec3, Vec3); 3] = [
        &|dir| (dir * radius, dir),
        &|dir| {
            let max = dir.abs().max_element().max(1e-4);
            (dir / max * radius * 0.8, dominant_axis(dir))
        },
        &|dir| (dir * squash * radius, (dir / squash).normalize()),
    ];

    shapes
        .iter()
        .map(|shape| {
            grid_triangles(stacks, slices)
                .map(|(dir, uv)| {
                    let (position, normal) = shape(dir);
                    AnimationVertex::new(position, normal, uv)
                })
                .collect()
        })
        .collect()
}

fn dominant_axis(dir: Vec3) -> Vec3 {
    let a = dir.abs();
    if a.x >= a.y && a.x >= a.z {
        Vec3::X * dir.x.signum()
    } else if a.y >= a.z {
        Vec3::Y * dir.y.signum()
    } else {
        Vec3::Z * dir.z.signum()
    }
}

/// Unit directions and uvs of a lat/long grid, two triangles per cell.
fn grid_triangles(stacks: u32, slices: u32) -> impl Iterator<Item = (Vec3, [f32; 2])> {
    let point = move |i: u32, j: u32| {
        let (u, v) = (j as f32 / slices as f32, i as f32 / stacks as f32);
        let (theta, phi) = (v * PI, u * TAU);
        let dir = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
        (dir, [u, v])
    };

    (0..stacks).flat_map(move |i| {
        (0..slices).flat_map(move |j| {
            [
                point(i, j),
                point(i + 1, j),
                point(i + 1, j + 1),
                point(i, j),
                point(i + 1, j + 1),
                point(i, j + 1),
            ]
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_six_faces() {
        let c = cube(0.5);
        assert_eq!(c.len(), 36);
        assert!(c.iter().all(|v| v.position.iter().all(|p| p.abs() <= 0.5 + 1e-5)));
    }

    #[test]
    fn morph_frames_share_vertex_count() {
        let frames = morph_frames(8, 12, 1.0);
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() == 8 * 12 * 6));
    }

    #[test]
    fn sphere_frame_has_unit_radius() {
        let frames = morph_frames(4, 4, 1.0);
        for v in &frames[0] {
            assert!((Vec3::from(v.position).length() - 1.0).abs() < 1e-4);
        }
    }
}
