//! Decoded scene data handed over by the asset loader.
//!
//! The renderer never parses asset files; it consumes vertex/index arrays and
//! pixel buffers that have already been decoded.

use bytemuck::{Pod, Zeroable};

/// Vertex layout shared by the rasterization pipeline and acceleration
/// structure build (position must come first and be tightly packed).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position.
    pub position: [f32; 3],
    /// Texture coordinate.
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Byte stride of one vertex.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    /// Create a vertex.
    #[inline]
    pub const fn new(position: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            tex_coord,
        }
    }
}

/// A decoded static triangle mesh.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    /// Vertex array.
    pub vertices: Vec<Vertex>,
    /// Triangle-list indices into `vertices`.
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Number of triangles.
    #[inline]
    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }

    /// Mesh validity: indices come in triangles and stay in bounds.
    pub fn validate(&self) -> crate::Result<()> {
        if self.indices.len() % 3 != 0 {
            return Err(crate::Error::InvalidData(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        let vertex_count = self.vertices.len() as u32;
        if let Some(&bad) = self.indices.iter().find(|&&i| i >= vertex_count) {
            return Err(crate::Error::InvalidData(format!(
                "index {bad} out of bounds for {vertex_count} vertices"
            )));
        }
        Ok(())
    }
}

/// A decoded pixel buffer with explicit dimensions and byte layout.
#[derive(Clone, Debug)]
pub struct PixelData {
    /// Raw pixel bytes, row-major, tightly packed.
    pub pixels: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes per pixel (4 for RGBA8).
    pub bytes_per_pixel: u32,
}

impl PixelData {
    /// Total byte size of the buffer.
    #[inline]
    pub fn byte_size(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(self.bytes_per_pixel)
    }

    /// Pixel buffer validity: dimensions match the byte length.
    pub fn validate(&self) -> crate::Result<()> {
        if self.pixels.len() as u64 != self.byte_size() {
            return Err(crate::Error::InvalidData(format!(
                "pixel buffer is {} bytes, expected {} for {}x{}x{}",
                self.pixels.len(),
                self.byte_size(),
                self.width,
                self.height,
                self.bytes_per_pixel
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshData {
        MeshData {
            vertices: vec![
                Vertex::new([0.0, 0.0, 0.0], [0.0, 0.0]),
                Vertex::new([1.0, 0.0, 0.0], [1.0, 0.0]),
                Vertex::new([1.0, 1.0, 0.0], [1.0, 1.0]),
                Vertex::new([0.0, 1.0, 0.0], [0.0, 1.0]),
            ],
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }

    #[test]
    fn vertex_stride() {
        assert_eq!(Vertex::STRIDE, 20);
    }

    #[test]
    fn valid_mesh() {
        let mesh = quad();
        assert!(mesh.validate().is_ok());
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn rejects_partial_triangle() {
        let mut mesh = quad();
        mesh.indices.pop();
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn rejects_out_of_bounds_index() {
        let mut mesh = quad();
        mesh.indices[0] = 17;
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn pixel_size_check() {
        let pixels = PixelData {
            pixels: vec![0; 16],
            width: 2,
            height: 2,
            bytes_per_pixel: 4,
        };
        assert!(pixels.validate().is_ok());

        let truncated = PixelData {
            pixels: vec![0; 15],
            width: 2,
            height: 2,
            bytes_per_pixel: 4,
        };
        assert!(truncated.validate().is_err());
    }
}
