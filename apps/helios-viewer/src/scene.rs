//! Procedural demo scene: a textured cube on a checkerboard.

use helios_app::DemoScene;
use helios_core::{MeshData, PixelData, Transform, Vertex};

const CHECKER_SIZE: u32 = 256;
const CHECKER_CELLS: u32 = 8;

/// Build the static scene content.
pub fn demo_scene() -> DemoScene {
    DemoScene {
        mesh: cube_mesh(),
        texture: checkerboard_texture(),
        model: Transform::IDENTITY,
    }
}

/// Unit cube centered at the origin, four vertices per face so each face
/// gets the full texture.
fn cube_mesh() -> MeshData {
    // (normal axis, two in-plane axes) per face.
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, u_axis, v_axis) in faces {
        let base = vertices.len() as u32;
        for (u, v) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = [
                0.5 * (normal[0] + u * u_axis[0] + v * v_axis[0]),
                0.5 * (normal[1] + u * u_axis[1] + v * v_axis[1]),
                0.5 * (normal[2] + u * u_axis[2] + v * v_axis[2]),
            ];
            let tex_coord = [0.5 * (u + 1.0), 0.5 * (1.0 - v)];
            vertices.push(Vertex::new(position, tex_coord));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    MeshData { vertices, indices }
}

/// Orange/white checkerboard, RGBA8.
fn checkerboard_texture() -> PixelData {
    let cell = CHECKER_SIZE / CHECKER_CELLS;
    let mut pixels = Vec::with_capacity((CHECKER_SIZE * CHECKER_SIZE * 4) as usize);

    for y in 0..CHECKER_SIZE {
        for x in 0..CHECKER_SIZE {
            let even = ((x / cell) + (y / cell)) % 2 == 0;
            if even {
                pixels.extend_from_slice(&[235, 235, 235, 255]);
            } else {
                pixels.extend_from_slice(&[230, 120, 30, 255]);
            }
        }
    }

    PixelData {
        pixels,
        width: CHECKER_SIZE,
        height: CHECKER_SIZE,
        bytes_per_pixel: 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_is_a_valid_mesh() {
        let mesh = cube_mesh();
        assert!(mesh.validate().is_ok());
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.triangle_count(), 12);
    }

    #[test]
    fn checkerboard_dimensions_match_byte_length() {
        let texture = checkerboard_texture();
        assert!(texture.validate().is_ok());
    }
}
