//! Resolution-dependent render targets.

use crate::device::RenderDevice;
use ash::vk;
use gpu_allocator::MemoryLocation;
use helios_gpu::error::{vk_call, Result};
use helios_gpu::{barrier, GpuImage};

/// Format of the shared output image both backends render into.
pub const OUTPUT_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Depth attachment format for the raster pass.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// The off-screen image every backend renders into.
///
/// Rasterization writes it as a color attachment, raytracing as a storage
/// image, and the swapchain copy reads it as a storage image. Headless tests
/// copy it out through a transfer. Its steady-state layout between frames is
/// `GENERAL`.
pub struct OutputImage {
    pub image: GpuImage,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
}

impl OutputImage {
    /// Create the output image and transition it to `GENERAL`.
    pub fn new(device: &RenderDevice, extent: vk::Extent2D) -> Result<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(OUTPUT_FORMAT)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::STORAGE
                    | vk::ImageUsageFlags::TRANSFER_SRC,
            )
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = device.gpu().allocator().lock().create_image(
            &create_info,
            MemoryLocation::GpuOnly,
            "output image",
        )?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(OUTPUT_FORMAT)
            .subresource_range(image.whole_color_range());
        let view = unsafe {
            device
                .device()
                .create_image_view(&view_info, None)
                .map_err(vk_call("vkCreateImageView"))?
        };

        unsafe {
            helios_gpu::command::execute_single_time_commands(
                device.device(),
                device.command_pool(),
                device.gpu().graphics_queue(),
                |cmd| {
                    barrier::record_image_layout_transition(
                        device.device(),
                        cmd,
                        image.image,
                        vk::ImageLayout::UNDEFINED,
                        vk::ImageLayout::GENERAL,
                        vk::PipelineStageFlags2::NONE,
                        vk::AccessFlags2::NONE,
                        vk::PipelineStageFlags2::ALL_COMMANDS,
                        vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                    );
                },
            )?;
        }

        Ok(Self {
            image,
            view,
            extent,
        })
    }

    /// Destroy the view and free the image.
    pub fn destroy(&mut self, device: &RenderDevice) -> Result<()> {
        unsafe {
            device.device().destroy_image_view(self.view, None);
        }
        device.gpu().allocator().lock().free_image(&mut self.image)?;
        Ok(())
    }
}

/// Depth attachment for the raster pass.
pub struct DepthBuffer {
    pub image: GpuImage,
    pub view: vk::ImageView,
}

impl DepthBuffer {
    pub fn new(device: &RenderDevice, extent: vk::Extent2D) -> Result<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = device.gpu().allocator().lock().create_image(
            &create_info,
            MemoryLocation::GpuOnly,
            "depth buffer",
        )?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::DEPTH)
                    .level_count(1)
                    .layer_count(1),
            );
        let view = unsafe {
            device
                .device()
                .create_image_view(&view_info, None)
                .map_err(vk_call("vkCreateImageView"))?
        };

        Ok(Self { image, view })
    }

    pub fn destroy(&mut self, device: &RenderDevice) -> Result<()> {
        unsafe {
            device.device().destroy_image_view(self.view, None);
        }
        device.gpu().allocator().lock().free_image(&mut self.image)?;
        Ok(())
    }
}
