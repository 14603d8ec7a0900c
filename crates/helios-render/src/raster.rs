//! Rasterization backend rendering into the shared output image.

use crate::device::{GpuMesh, RenderDevice, Texture};
use crate::targets::{DepthBuffer, OutputImage, DEPTH_FORMAT, OUTPUT_FORMAT};
use ash::vk;
use glam::Mat4;
use helios_core::Vertex;
use helios_gpu::error::{vk_call, GpuError, Result};
use helios_gpu::pipeline::{create_graphics_pipeline, create_shader_module, GraphicsPipelineConfig};
use helios_gpu::{DescriptorSetLayoutBuilder, GpuBuffer, PipelineKey};

/// Rasterization resources.
///
/// The render pass, descriptor machinery, shaders, and uniform buffer live
/// for the lifetime of the device. The framebuffer and depth buffer track
/// the output image and are rebuilt with it on resize.
pub struct RasterResources {
    render_pass: vk::RenderPass,
    descriptor_set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    descriptor_set: vk::DescriptorSet,
    uniform_buffer: GpuBuffer,
    vertex_shader: vk::ShaderModule,
    fragment_shader: vk::ShaderModule,
    pipeline: vk::Pipeline,

    depth: Option<DepthBuffer>,
    framebuffer: Option<vk::Framebuffer>,
}

impl RasterResources {
    /// Create the resolution-independent half of the raster backend.
    pub fn new(device: &mut RenderDevice, texture: &Texture) -> Result<Self> {
        let render_pass = unsafe { create_render_pass(device.device()) }?;

        let descriptor_set_layout = unsafe {
            DescriptorSetLayoutBuilder::new()
                .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
                .combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
                .build(device.device())
        }?;

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(std::slice::from_ref(&descriptor_set_layout));
        let pipeline_layout = unsafe {
            device
                .device()
                .create_pipeline_layout(&layout_info, None)
                .map_err(vk_call("vkCreatePipelineLayout"))?
        };

        let uniform_buffer = device.create_mapped_buffer(
            std::mem::size_of::<Mat4>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "raster transforms",
        )?;

        let descriptor_set = unsafe {
            device
                .descriptor_pool()
                .allocate(device.device(), &[descriptor_set_layout])?[0]
        };

        unsafe {
            helios_gpu::descriptors::write_uniform_buffer(
                device.device(),
                descriptor_set,
                0,
                uniform_buffer.buffer,
                0,
                uniform_buffer.size,
            );
            helios_gpu::descriptors::write_combined_image_sampler(
                device.device(),
                descriptor_set,
                1,
                texture.view,
                texture.sampler,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }

        let vertex_shader =
            unsafe { create_shader_module(device.device(), helios_shaders::raster_vertex_shader()) }?;
        let fragment_shader = unsafe {
            create_shader_module(device.device(), helios_shaders::raster_fragment_shader())
        }?;

        let config = GraphicsPipelineConfig {
            vertex_bindings: vec![vk::VertexInputBindingDescription::default()
                .binding(0)
                .stride(Vertex::STRIDE)
                .input_rate(vk::VertexInputRate::VERTEX)],
            vertex_attributes: vec![
                vk::VertexInputAttributeDescription::default()
                    .location(0)
                    .binding(0)
                    .format(vk::Format::R32G32B32_SFLOAT)
                    .offset(0),
                vk::VertexInputAttributeDescription::default()
                    .location(1)
                    .binding(0)
                    .format(vk::Format::R32G32_SFLOAT)
                    .offset(12),
            ],
            // The projection flips Y for Vulkan clip space, which inverts the
            // winding of counter-clockwise meshes.
            front_face: vk::FrontFace::CLOCKWISE,
            ..GraphicsPipelineConfig::default()
        };

        let key = PipelineKey::new(vertex_shader, fragment_shader, render_pass, pipeline_layout);
        let raw_device = device.device().clone();
        let pipeline = device.pipeline_cache().find_or_create(key, || unsafe {
            create_graphics_pipeline(
                &raw_device,
                vertex_shader,
                fragment_shader,
                render_pass,
                pipeline_layout,
                &config,
            )
        })?;

        Ok(Self {
            render_pass,
            descriptor_set_layout,
            pipeline_layout,
            descriptor_set,
            uniform_buffer,
            vertex_shader,
            fragment_shader,
            pipeline,
            depth: None,
            framebuffer: None,
        })
    }

    /// Build the framebuffer and depth buffer for the current output image.
    pub fn create_resolution_dependent(
        &mut self,
        device: &RenderDevice,
        output: &OutputImage,
    ) -> Result<()> {
        if self.framebuffer.is_some() {
            return Err(GpuError::InvalidState(
                "raster framebuffer already exists".to_string(),
            ));
        }

        let depth = DepthBuffer::new(device, output.extent)?;

        let attachments = [output.view, depth.view];
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(self.render_pass)
            .attachments(&attachments)
            .width(output.extent.width)
            .height(output.extent.height)
            .layers(1);
        let framebuffer = unsafe {
            device
                .device()
                .create_framebuffer(&framebuffer_info, None)
                .map_err(vk_call("vkCreateFramebuffer"))?
        };

        self.depth = Some(depth);
        self.framebuffer = Some(framebuffer);
        Ok(())
    }

    /// Tear down the framebuffer and depth buffer. Safe to call when they
    /// were never created.
    pub fn destroy_resolution_dependent(&mut self, device: &RenderDevice) -> Result<()> {
        if let Some(framebuffer) = self.framebuffer.take() {
            unsafe {
                device.device().destroy_framebuffer(framebuffer, None);
            }
        }
        if let Some(mut depth) = self.depth.take() {
            depth.destroy(device)?;
        }
        Ok(())
    }

    /// Update the model-view-projection uniform for the next frame.
    pub fn update(&self, model_view_proj: Mat4) -> Result<()> {
        self.uniform_buffer
            .write(&model_view_proj.to_cols_array())
    }

    /// Record the raster pass into the frame command buffer.
    pub fn record(
        &self,
        device: &RenderDevice,
        cmd: vk::CommandBuffer,
        extent: vk::Extent2D,
        mesh: &GpuMesh,
    ) -> Result<()> {
        let framebuffer = self.framebuffer.ok_or_else(|| {
            GpuError::InvalidState("raster framebuffer not created".to_string())
        })?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.02, 0.02, 0.03, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        let raw = device.device();
        unsafe {
            raw.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);

            let viewport = vk::Viewport::default()
                .width(extent.width as f32)
                .height(extent.height as f32)
                .max_depth(1.0);
            raw.cmd_set_viewport(cmd, 0, &[viewport]);
            raw.cmd_set_scissor(
                cmd,
                0,
                &[vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                }],
            );

            raw.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            raw.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                0,
                &[self.descriptor_set],
                &[],
            );
            raw.cmd_bind_vertex_buffers(cmd, 0, &[mesh.vertex_buffer.buffer], &[0]);
            raw.cmd_bind_index_buffer(cmd, mesh.index_buffer.buffer, 0, vk::IndexType::UINT32);
            raw.cmd_draw_indexed(cmd, mesh.index_count, 1, 0, 0, 0);

            raw.cmd_end_render_pass(cmd);
        }
        Ok(())
    }

    /// Record a pass that only clears the output image, drawing nothing.
    pub fn record_background_only(
        &self,
        device: &RenderDevice,
        cmd: vk::CommandBuffer,
        extent: vk::Extent2D,
    ) -> Result<()> {
        let framebuffer = self.framebuffer.ok_or_else(|| {
            GpuError::InvalidState("raster framebuffer not created".to_string())
        })?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.02, 0.02, 0.03, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device
                .device()
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
            device.device().cmd_end_render_pass(cmd);
        }
        Ok(())
    }

    /// Destroy everything, evicting cached pipelines before the render pass
    /// goes away.
    pub fn destroy(&mut self, device: &mut RenderDevice) -> Result<()> {
        self.destroy_resolution_dependent(device)?;

        device.destroy_render_pass(self.render_pass);

        let raw = device.device();
        unsafe {
            raw.destroy_shader_module(self.vertex_shader, None);
            raw.destroy_shader_module(self.fragment_shader, None);
            device
                .descriptor_pool()
                .free(raw, &[self.descriptor_set])?;
            raw.destroy_pipeline_layout(self.pipeline_layout, None);
            raw.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
        }
        device.destroy_buffer(&mut self.uniform_buffer)?;
        Ok(())
    }
}

/// Render pass with one color attachment (the shared output image) and a
/// depth attachment. The output image enters and leaves in `GENERAL` so the
/// swapchain copy can read it without another transition.
unsafe fn create_render_pass(device: &ash::Device) -> Result<vk::RenderPass> {
    let attachments = [
        vk::AttachmentDescription::default()
            .format(OUTPUT_FORMAT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::GENERAL)
            .final_layout(vk::ImageLayout::GENERAL),
        vk::AttachmentDescription::default()
            .format(DEPTH_FORMAT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    ];

    let color_ref = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    let depth_ref = vk::AttachmentReference::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(std::slice::from_ref(&color_ref))
        .depth_stencil_attachment(&depth_ref);

    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        );

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(std::slice::from_ref(&dependency));

    device
        .create_render_pass(&create_info, None)
        .map_err(vk_call("vkCreateRenderPass"))
}
