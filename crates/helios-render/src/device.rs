//! Process-lifetime render device.

use ash::vk;
use gpu_allocator::MemoryLocation;
use helios_core::{MeshData, PixelData};
use helios_gpu::command::execute_single_time_commands;
use helios_gpu::error::{vk_call, GpuError, Result};
use helios_gpu::{
    barrier, CommandPool, DescriptorPool, GpuBuffer, GpuContext, GpuContextBuilder, GpuImage,
    PipelineCache, StagingBuffer,
};

/// Everything whose lifetime matches the process, independent of the window
/// size: device context, pools, staging buffer, and the pipeline cache.
///
/// A [`crate::Display`] borrows this to render to a window; headless tests
/// use it directly.
pub struct RenderDevice {
    gpu: GpuContext,
    command_pool: CommandPool,
    descriptor_pool: DescriptorPool,
    staging: StagingBuffer,
    pipeline_cache: PipelineCache,
}

impl RenderDevice {
    /// Initialize the device. Fails if no GPU meets the raytracing and
    /// Vulkan 1.3 requirements.
    pub fn new(app_name: &str, enable_validation: bool) -> Result<Self> {
        let gpu = GpuContextBuilder::new()
            .app_name(app_name)
            .validation(enable_validation)
            .build()?;

        let command_pool = unsafe {
            CommandPool::new(
                gpu.device(),
                gpu.graphics_queue_family(),
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )
        }?;

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(16),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(16),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_IMAGE)
                .descriptor_count(32),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
                .descriptor_count(4),
        ];
        let descriptor_pool = unsafe { DescriptorPool::new(gpu.device(), 64, &pool_sizes) }?;

        Ok(Self {
            gpu,
            command_pool,
            descriptor_pool,
            staging: StagingBuffer::new(),
            pipeline_cache: PipelineCache::new(),
        })
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn device(&self) -> &ash::Device {
        self.gpu.device()
    }

    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    pub fn descriptor_pool(&self) -> &DescriptorPool {
        &self.descriptor_pool
    }

    pub fn pipeline_cache(&mut self) -> &mut PipelineCache {
        &mut self.pipeline_cache
    }

    /// Block until all submitted GPU work retires.
    pub fn wait_idle(&self) -> Result<()> {
        self.gpu.wait_idle()
    }

    /// Destroy a render pass after evicting every cached pipeline built
    /// against it. Handles get recycled by drivers, so skipping the purge
    /// could alias a future render pass with stale pipelines.
    pub fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.pipeline_cache
            .purge_render_pass(self.gpu.device(), render_pass);
        unsafe {
            self.gpu.device().destroy_render_pass(render_pass, None);
        }
    }

    /// Create a device-local buffer and fill it through the staging buffer.
    pub fn create_buffer_with_data(
        &mut self,
        usage: vk::BufferUsageFlags,
        data: &[u8],
        name: &str,
    ) -> Result<GpuBuffer> {
        let buffer = self.gpu.allocator().lock().create_buffer(
            data.len() as vk::DeviceSize,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            name,
        )?;

        self.stage_to_buffer(&buffer, data)?;
        Ok(buffer)
    }

    /// Create a persistently mapped host-visible buffer.
    pub fn create_mapped_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<GpuBuffer> {
        let buffer =
            self.gpu
                .allocator()
                .lock()
                .create_buffer(size, usage, MemoryLocation::CpuToGpu, name)?;

        if buffer.mapped_ptr().is_none() {
            return Err(GpuError::AllocationFailed(format!(
                "{name}: host-visible allocation is not mapped"
            )));
        }
        Ok(buffer)
    }

    fn stage_to_buffer(&mut self, dst: &GpuBuffer, data: &[u8]) -> Result<()> {
        self.staging
            .ensure_allocation(&mut self.gpu.allocator().lock(), data.len() as u64)?;
        self.staging.write_bytes(0, data)?;
        let staging = self.staging.buffer()?;

        unsafe {
            execute_single_time_commands(
                self.gpu.device(),
                &self.command_pool,
                self.gpu.graphics_queue(),
                |cmd| {
                    let region = vk::BufferCopy::default().size(data.len() as u64);
                    self.gpu
                        .device()
                        .cmd_copy_buffer(cmd, staging, dst.buffer, &[region]);
                },
            )
        }
    }

    /// Upload a mesh to device-local vertex and index buffers.
    pub fn create_mesh(&mut self, mesh: &MeshData) -> Result<GpuMesh> {
        mesh.validate().map_err(|e| GpuError::Other(e.to_string()))?;

        let vertex_buffer = self.create_buffer_with_data(
            vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR,
            bytemuck::cast_slice(&mesh.vertices),
            "mesh vertices",
        )?;

        let index_buffer = self.create_buffer_with_data(
            vk::BufferUsageFlags::INDEX_BUFFER
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR,
            bytemuck::cast_slice(&mesh.indices),
            "mesh indices",
        )?;

        Ok(GpuMesh {
            vertex_buffer,
            index_buffer,
            vertex_count: mesh.vertices.len() as u32,
            index_count: mesh.indices.len() as u32,
        })
    }

    /// Upload pixel data into a sampled texture, leaving it in
    /// `SHADER_READ_ONLY_OPTIMAL`.
    pub fn create_texture(&mut self, pixels: &PixelData) -> Result<Texture> {
        pixels
            .validate()
            .map_err(|e| GpuError::Other(e.to_string()))?;

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_UNORM)
            .extent(vk::Extent3D {
                width: pixels.width,
                height: pixels.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = self.gpu.allocator().lock().create_image(
            &create_info,
            MemoryLocation::GpuOnly,
            "texture",
        )?;

        self.staging
            .ensure_allocation(&mut self.gpu.allocator().lock(), pixels.byte_size())?;
        self.staging.write_bytes(0, &pixels.pixels)?;
        let staging = self.staging.buffer()?;

        unsafe {
            execute_single_time_commands(
                self.gpu.device(),
                &self.command_pool,
                self.gpu.graphics_queue(),
                |cmd| {
                    barrier::record_image_layout_transition(
                        self.gpu.device(),
                        cmd,
                        image.image,
                        vk::ImageLayout::UNDEFINED,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        vk::PipelineStageFlags2::NONE,
                        vk::AccessFlags2::NONE,
                        vk::PipelineStageFlags2::COPY,
                        vk::AccessFlags2::TRANSFER_WRITE,
                    );

                    let region = vk::BufferImageCopy::default()
                        .image_subresource(
                            vk::ImageSubresourceLayers::default()
                                .aspect_mask(vk::ImageAspectFlags::COLOR)
                                .layer_count(1),
                        )
                        .image_extent(create_info.extent);
                    self.gpu.device().cmd_copy_buffer_to_image(
                        cmd,
                        staging,
                        image.image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );

                    barrier::record_image_layout_transition(
                        self.gpu.device(),
                        cmd,
                        image.image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        vk::PipelineStageFlags2::COPY,
                        vk::AccessFlags2::TRANSFER_WRITE,
                        vk::PipelineStageFlags2::FRAGMENT_SHADER,
                        vk::AccessFlags2::SHADER_SAMPLED_READ,
                    );
                },
            )?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(create_info.format)
            .subresource_range(image.whole_color_range());
        let view = unsafe {
            self.gpu
                .device()
                .create_image_view(&view_info, None)
                .map_err(vk_call("vkCreateImageView"))?
        };

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT);
        let sampler = unsafe {
            self.gpu
                .device()
                .create_sampler(&sampler_info, None)
                .map_err(vk_call("vkCreateSampler"))?
        };

        Ok(Texture {
            image,
            view,
            sampler,
        })
    }

    /// Free a mesh's GPU buffers.
    pub fn destroy_mesh(&self, mesh: &mut GpuMesh) -> Result<()> {
        let mut allocator = self.gpu.allocator().lock();
        allocator.free_buffer(&mut mesh.vertex_buffer)?;
        allocator.free_buffer(&mut mesh.index_buffer)?;
        Ok(())
    }

    /// Free a texture's image, view, and sampler.
    pub fn destroy_texture(&self, texture: &mut Texture) -> Result<()> {
        unsafe {
            self.gpu.device().destroy_sampler(texture.sampler, None);
            self.gpu.device().destroy_image_view(texture.view, None);
        }
        self.gpu.allocator().lock().free_image(&mut texture.image)?;
        Ok(())
    }

    /// Free a buffer.
    pub fn destroy_buffer(&self, buffer: &mut GpuBuffer) -> Result<()> {
        self.gpu.allocator().lock().free_buffer(buffer)
    }

    /// Tear down device-lifetime resources in reverse creation order. The
    /// context itself is destroyed when `self` drops.
    pub fn shutdown(&mut self) -> Result<()> {
        self.wait_idle()?;
        self.pipeline_cache.destroy_all(self.gpu.device());
        self.staging.destroy(&mut self.gpu.allocator().lock())?;
        unsafe {
            self.descriptor_pool.destroy(self.gpu.device());
            self.command_pool.destroy(self.gpu.device());
        }
        tracing::info!("Render device shut down");
        Ok(())
    }
}

/// Mesh uploaded to device-local memory.
pub struct GpuMesh {
    pub vertex_buffer: GpuBuffer,
    pub index_buffer: GpuBuffer,
    pub vertex_count: u32,
    pub index_count: u32,
}

/// Sampled texture with its view and sampler.
pub struct Texture {
    pub image: GpuImage,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}
