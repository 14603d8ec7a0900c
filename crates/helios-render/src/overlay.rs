//! Overlay pass drawing onto the output image before the swapchain copy.

use crate::device::RenderDevice;
use crate::targets::{OutputImage, OUTPUT_FORMAT};
use ash::vk;
use helios_gpu::error::{vk_call, GpuError, Result};

/// Hook for UI or debug overlays.
///
/// Implementations record draw commands inside an already-begun render pass
/// whose single color attachment is the shared output image.
pub trait OverlayRenderer {
    fn record(&mut self, device: &ash::Device, cmd: vk::CommandBuffer, extent: vk::Extent2D);
}

/// Render pass hosting [`OverlayRenderer`] draws.
///
/// Loads the output image as-is, composites the overlay on top of the backend
/// output, and leaves the image in `GENERAL` for the copy pass to read.
pub struct UiPass {
    render_pass: vk::RenderPass,
    framebuffer: Option<vk::Framebuffer>,
    extent: vk::Extent2D,
}

impl UiPass {
    pub fn new(device: &RenderDevice) -> Result<Self> {
        let attachment = vk::AttachmentDescription::default()
            .format(OUTPUT_FORMAT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::GENERAL)
            .final_layout(vk::ImageLayout::GENERAL);

        let color_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(std::slice::from_ref(&color_ref));

        // The backend that filled the output image may have been either a
        // raster pass or a trace-rays dispatch.
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR,
            )
            .src_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::SHADER_WRITE,
            )
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            );

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(std::slice::from_ref(&attachment))
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(std::slice::from_ref(&dependency));

        let render_pass = unsafe {
            device
                .device()
                .create_render_pass(&create_info, None)
                .map_err(vk_call("vkCreateRenderPass"))?
        };

        Ok(Self {
            render_pass,
            framebuffer: None,
            extent: vk::Extent2D::default(),
        })
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Build the framebuffer over the current output image.
    pub fn create_resolution_dependent(
        &mut self,
        device: &RenderDevice,
        output: &OutputImage,
    ) -> Result<()> {
        if self.framebuffer.is_some() {
            return Err(GpuError::InvalidState(
                "overlay framebuffer already exists".to_string(),
            ));
        }

        let info = vk::FramebufferCreateInfo::default()
            .render_pass(self.render_pass)
            .attachments(std::slice::from_ref(&output.view))
            .width(output.extent.width)
            .height(output.extent.height)
            .layers(1);
        let framebuffer = unsafe {
            device
                .device()
                .create_framebuffer(&info, None)
                .map_err(vk_call("vkCreateFramebuffer"))?
        };
        self.framebuffer = Some(framebuffer);
        self.extent = output.extent;
        Ok(())
    }

    pub fn destroy_resolution_dependent(&mut self, device: &RenderDevice) {
        if let Some(framebuffer) = self.framebuffer.take() {
            unsafe {
                device.device().destroy_framebuffer(framebuffer, None);
            }
        }
    }

    /// Record the overlay render pass over the output image.
    pub fn record(
        &self,
        device: &RenderDevice,
        cmd: vk::CommandBuffer,
        overlay: &mut dyn OverlayRenderer,
    ) -> Result<()> {
        let framebuffer = self
            .framebuffer
            .ok_or_else(|| GpuError::InvalidState("overlay framebuffer missing".to_string()))?;

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            });

        unsafe {
            device
                .device()
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
        }
        overlay.record(device.device(), cmd, self.extent);
        unsafe {
            device.device().cmd_end_render_pass(cmd);
        }
        Ok(())
    }

    /// Destroy the pass, evicting any cached pipelines built against it.
    pub fn destroy(&mut self, device: &mut RenderDevice) {
        self.destroy_resolution_dependent(device);
        device.destroy_render_pass(self.render_pass);
    }
}
