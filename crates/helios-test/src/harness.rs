//! Headless rendering and visual regression testing.
//!
//! Renders the raster pipeline into the offscreen output image without a
//! window, reads the pixels back, and compares them against baselines.

use ash::vk;
use glam::{Mat4, Vec3};
use gpu_allocator::MemoryLocation;
use image::{ImageBuffer, Rgba};
use std::path::Path;

use helios_core::{math, MeshData, PixelData};
use helios_gpu::barrier::record_image_layout_transition;
use helios_gpu::command::execute_single_time_commands;
use helios_gpu::GpuBuffer;
use helios_render::{OutputImage, RasterResources, RenderDevice};

use crate::{Result, TestError, VisualTestConfig};

/// Headless renderer for testing.
///
/// Owns a windowless [`RenderDevice`] and an output image; each render call
/// uploads the scene, draws it, and reads the pixels back.
pub struct HeadlessRenderer {
    device: RenderDevice,
    output: Option<OutputImage>,
    readback: GpuBuffer,
    width: u32,
    height: u32,
}

impl HeadlessRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let device = RenderDevice::new("helios-test", true)?;

        let extent = vk::Extent2D { width, height };
        let output = OutputImage::new(&device, extent)?;

        let readback = device.gpu().allocator().lock().create_buffer(
            u64::from(width) * u64::from(height) * 4,
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
            "test readback",
        )?;

        Ok(Self {
            device,
            output: Some(output),
            readback,
            width,
            height,
        })
    }

    /// Render a textured mesh with the given model-view-projection and
    /// return the resulting image.
    pub fn render_mesh(
        &mut self,
        mesh: &MeshData,
        texture: &PixelData,
        mvp: Mat4,
    ) -> Result<ImageBuffer<Rgba<u8>, Vec<u8>>> {
        let mut gpu_mesh = self.device.create_mesh(mesh)?;
        let mut gpu_texture = self.device.create_texture(texture)?;
        let mut raster = RasterResources::new(&mut self.device, &gpu_texture)?;

        let output = self
            .output
            .as_ref()
            .ok_or_else(|| TestError::Gpu("output image destroyed".to_string()))?;
        raster.create_resolution_dependent(&self.device, output)?;
        raster.update(mvp)?;

        let extent = vk::Extent2D {
            width: self.width,
            height: self.height,
        };
        let mut record_result: helios_gpu::Result<()> = Ok(());
        unsafe {
            execute_single_time_commands(
                self.device.device(),
                self.device.command_pool(),
                self.device.gpu().graphics_queue(),
                |cmd| {
                    record_result = raster.record(&self.device, cmd, extent, &gpu_mesh);
                    if record_result.is_err() {
                        return;
                    }

                    record_image_layout_transition(
                        self.device.device(),
                        cmd,
                        output.image.image,
                        vk::ImageLayout::GENERAL,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                        vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                        vk::PipelineStageFlags2::TRANSFER,
                        vk::AccessFlags2::TRANSFER_READ,
                    );

                    let region = vk::BufferImageCopy::default()
                        .image_subresource(
                            vk::ImageSubresourceLayers::default()
                                .aspect_mask(vk::ImageAspectFlags::COLOR)
                                .layer_count(1),
                        )
                        .image_extent(vk::Extent3D {
                            width: self.width,
                            height: self.height,
                            depth: 1,
                        });
                    self.device.device().cmd_copy_image_to_buffer(
                        cmd,
                        output.image.image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        self.readback.buffer,
                        &[region],
                    );

                    record_image_layout_transition(
                        self.device.device(),
                        cmd,
                        output.image.image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        vk::ImageLayout::GENERAL,
                        vk::PipelineStageFlags2::TRANSFER,
                        vk::AccessFlags2::TRANSFER_READ,
                        vk::PipelineStageFlags2::ALL_COMMANDS,
                        vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                    );
                },
            )?;
        }
        record_result?;

        let data = self.readback.read_bytes()?;

        raster.destroy(&mut self.device)?;
        self.device.destroy_texture(&mut gpu_texture)?;
        self.device.destroy_mesh(&mut gpu_mesh)?;

        ImageBuffer::from_raw(self.width, self.height, data)
            .ok_or_else(|| TestError::Gpu("readback size mismatch".to_string()))
    }

    /// Get the output dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for HeadlessRenderer {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        if let Some(mut output) = self.output.take() {
            let _ = output.destroy(&self.device);
        }
        let _ = self.device.destroy_buffer(&mut self.readback);
        let _ = self.device.shutdown();
    }
}

/// Visual regression test runner.
///
/// Compares rendered images against baseline images and reports differences.
pub struct VisualRegressionTest {
    config: VisualTestConfig,
    renderer: HeadlessRenderer,
}

impl VisualRegressionTest {
    pub fn new(config: VisualTestConfig) -> Result<Self> {
        let renderer = HeadlessRenderer::new(256, 256)?;
        Ok(Self { config, renderer })
    }

    /// Create with custom dimensions.
    pub fn with_dimensions(config: VisualTestConfig, width: u32, height: u32) -> Result<Self> {
        let renderer = HeadlessRenderer::new(width, height)?;
        Ok(Self { config, renderer })
    }

    /// Render a scene and compare against the stored baseline. A missing
    /// baseline is created from the current output.
    pub fn run_test(
        &mut self,
        name: &str,
        mesh: &MeshData,
        texture: &PixelData,
        mvp: Mat4,
    ) -> Result<()> {
        let image = self.renderer.render_mesh(mesh, texture, mvp)?;
        self.compare_and_save(name, &image)
    }

    fn compare_and_save(&self, name: &str, image: &ImageBuffer<Rgba<u8>, Vec<u8>>) -> Result<()> {
        std::fs::create_dir_all(&self.config.baseline_dir)?;
        std::fs::create_dir_all(&self.config.output_dir)?;

        let baseline_path = format!("{}/{}.png", self.config.baseline_dir, name);
        let output_path = format!("{}/{}.png", self.config.output_dir, name);

        image.save(&output_path)?;

        if Path::new(&baseline_path).exists() {
            let baseline = image::open(&baseline_path)
                .map_err(|e| TestError::Io(std::io::Error::other(e)))?
                .to_rgba8();

            let diff = compare_images(&baseline, image)?;
            if diff > self.config.threshold {
                let diff_path = format!("{}/{}_diff.png", self.config.output_dir, name);
                create_diff_image(&baseline, image).save(&diff_path)?;

                return Err(TestError::ImageComparison(format!(
                    "Image difference {:.4} exceeds threshold {:.4} (see {})",
                    diff, self.config.threshold, diff_path
                )));
            }
        } else {
            image.save(&baseline_path)?;
            tracing::info!("Created new baseline: {}", baseline_path);
        }

        Ok(())
    }
}

/// Compare two images and return the normalized difference (0.0-1.0).
pub fn compare_images(
    a: &ImageBuffer<Rgba<u8>, Vec<u8>>,
    b: &ImageBuffer<Rgba<u8>, Vec<u8>>,
) -> Result<f64> {
    if a.dimensions() != b.dimensions() {
        return Err(TestError::ImageComparison(format!(
            "Image dimensions don't match: {:?} vs {:?}",
            a.dimensions(),
            b.dimensions()
        )));
    }

    let total_diff: u64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(pa, pb)| {
            let diff_r = u64::from((i32::from(pa[0]) - i32::from(pb[0])).unsigned_abs());
            let diff_g = u64::from((i32::from(pa[1]) - i32::from(pb[1])).unsigned_abs());
            let diff_b = u64::from((i32::from(pa[2]) - i32::from(pb[2])).unsigned_abs());
            diff_r + diff_g + diff_b
        })
        .sum();

    let max_diff = (a.width() as u64 * a.height() as u64 * 3 * 255) as f64;
    Ok(total_diff as f64 / max_diff)
}

/// Create a visual diff image highlighting differences in red.
pub fn create_diff_image(
    a: &ImageBuffer<Rgba<u8>, Vec<u8>>,
    b: &ImageBuffer<Rgba<u8>, Vec<u8>>,
) -> ImageBuffer<Rgba<u8>, Vec<u8>> {
    let (width, height) = a.dimensions();
    let mut diff = ImageBuffer::new(width, height);

    for (x, y, pixel) in diff.enumerate_pixels_mut() {
        let pa = a.get_pixel(x, y);
        let pb = b.get_pixel(x, y);

        let diff_r = (i32::from(pa[0]) - i32::from(pb[0])).unsigned_abs();
        let diff_g = (i32::from(pa[1]) - i32::from(pb[1])).unsigned_abs();
        let diff_b = (i32::from(pa[2]) - i32::from(pb[2])).unsigned_abs();

        let max_diff = diff_r.max(diff_g).max(diff_b);
        if max_diff > 10 {
            *pixel = Rgba([255, 0, 0, 255]);
        } else {
            *pixel = Rgba([pa[0] / 2, pa[1] / 2, pa[2] / 2, 255]);
        }
    }

    diff
}

/// Model-view-projection looking at the origin from slightly above.
pub fn test_mvp(aspect: f32) -> Mat4 {
    let view = Mat4::look_at_rh(Vec3::new(0.0, 1.2, 3.0), Vec3::ZERO, Vec3::Y);
    math::perspective(std::f32::consts::FRAC_PI_4, aspect, 0.1, 100.0) * view
}

#[cfg(test)]
mod tests {
    use super::*;
    use helios_core::Vertex;

    fn solid_image(value: u8) -> ImageBuffer<Rgba<u8>, Vec<u8>> {
        ImageBuffer::from_pixel(8, 8, Rgba([value, value, value, 255]))
    }

    #[test]
    fn identical_images_have_zero_difference() {
        let a = solid_image(100);
        let b = solid_image(100);
        assert_eq!(compare_images(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn opposite_images_have_full_difference() {
        let a = solid_image(0);
        let b = solid_image(255);
        assert!((compare_images(&a, &b).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let a = solid_image(0);
        let b = ImageBuffer::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        assert!(compare_images(&a, &b).is_err());
    }

    #[test]
    fn diff_image_marks_changed_pixels_red() {
        let a = solid_image(100);
        let mut b = solid_image(100);
        b.put_pixel(3, 3, Rgba([200, 100, 100, 255]));

        let diff = create_diff_image(&a, &b);
        assert_eq!(*diff.get_pixel(3, 3), Rgba([255, 0, 0, 255]));
        assert_eq!(*diff.get_pixel(0, 0), Rgba([50, 50, 50, 255]));
    }

    fn unit_quad() -> MeshData {
        MeshData {
            vertices: vec![
                Vertex::new([-1.0, -1.0, 0.0], [0.0, 0.0]),
                Vertex::new([1.0, -1.0, 0.0], [1.0, 0.0]),
                Vertex::new([1.0, 1.0, 0.0], [1.0, 1.0]),
                Vertex::new([-1.0, 1.0, 0.0], [0.0, 1.0]),
            ],
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }

    fn white_texture() -> PixelData {
        PixelData {
            pixels: vec![255; 4 * 4 * 4],
            width: 4,
            height: 4,
            bytes_per_pixel: 4,
        }
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn headless_renderer_creation() {
        let _renderer = HeadlessRenderer::new(256, 256).unwrap();
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn quad_covers_the_image_center() {
        let mut renderer = HeadlessRenderer::new(256, 256).unwrap();
        let image = renderer
            .render_mesh(&unit_quad(), &white_texture(), test_mvp(1.0))
            .unwrap();

        assert_eq!(image.dimensions(), (256, 256));
        // White quad at the center, dark clear color at the corner.
        let center = image.get_pixel(128, 128);
        let corner = image.get_pixel(0, 0);
        assert!(center[0] > 200);
        assert!(corner[0] < 30);
    }
}
