//! GLSL shaders for the Helios renderer.
//!
//! Shaders are compiled to SPIR-V at build time with shaderc and embedded in
//! the binary. Accessors return 4-byte-aligned `u32` slices ready for
//! `vkCreateShaderModule`.

use std::sync::OnceLock;

/// Embedded SPIR-V bytecode (raw bytes, may not be aligned).
mod spirv_bytes {
    pub static RASTER_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/raster_vert.spv"));
    pub static RASTER_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/raster_frag.spv"));
    pub static COPY_TO_SWAPCHAIN: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/copy_to_swapchain.spv"));
    pub static SCENE_RGEN: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/scene_rgen.spv"));
    pub static SCENE_RMISS: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/scene_rmiss.spv"));
    pub static SCENE_RCHIT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/scene_rchit.spv"));
}

/// Convert a byte slice to an aligned u32 Vec (SPIR-V requires 4-byte words).
fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    assert!(
        bytes.len() % 4 == 0,
        "SPIR-V bytecode must be a whole number of words"
    );
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

macro_rules! shader_accessor {
    ($fn_name:ident, $static_name:ident, $bytes:path) => {
        static $static_name: OnceLock<Vec<u32>> = OnceLock::new();

        pub fn $fn_name() -> &'static [u32] {
            $static_name.get_or_init(|| bytes_to_spirv($bytes))
        }
    };
}

shader_accessor!(raster_vertex_shader, RASTER_VERT, spirv_bytes::RASTER_VERT);
shader_accessor!(raster_fragment_shader, RASTER_FRAG, spirv_bytes::RASTER_FRAG);
shader_accessor!(
    copy_to_swapchain_shader,
    COPY_TO_SWAPCHAIN,
    spirv_bytes::COPY_TO_SWAPCHAIN
);
shader_accessor!(scene_raygen_shader, SCENE_RGEN, spirv_bytes::SCENE_RGEN);
shader_accessor!(scene_miss_shader, SCENE_RMISS, spirv_bytes::SCENE_RMISS);
shader_accessor!(scene_closest_hit_shader, SCENE_RCHIT, spirv_bytes::SCENE_RCHIT);

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn all_shaders_carry_the_spirv_magic() {
        for shader in [
            raster_vertex_shader(),
            raster_fragment_shader(),
            copy_to_swapchain_shader(),
            scene_raygen_shader(),
            scene_miss_shader(),
            scene_closest_hit_shader(),
        ] {
            assert_eq!(shader[0], SPIRV_MAGIC, "Invalid SPIR-V magic number");
            assert!(shader.len() > 8, "Shader suspiciously small");
        }
    }
}
