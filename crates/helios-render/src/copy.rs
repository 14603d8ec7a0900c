//! Compute pass copying the output image into the swapchain.

use crate::device::RenderDevice;
use crate::targets::OutputImage;
use ash::vk;
use helios_gpu::error::{GpuError, Result};
use helios_gpu::{barrier, ComputePipeline, DescriptorSetLayoutBuilder, Swapchain};

const WORKGROUP_SIZE: u32 = 8;

/// Push constants for the copy shader: the extent being copied.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CopyPushConstants {
    width: u32,
    height: u32,
}

/// Compute pass that stores the output image into the acquired swapchain
/// image.
///
/// The pipeline and layout are device-lifetime; one descriptor set per
/// swapchain image is (re)allocated whenever the swapchain is rebuilt, since
/// both the image views and the image count can change.
pub struct CopyToSwapchain {
    descriptor_set_layout: vk::DescriptorSetLayout,
    pipeline: ComputePipeline,
    sets: Vec<vk::DescriptorSet>,
}

impl CopyToSwapchain {
    pub fn new(device: &RenderDevice) -> Result<Self> {
        let descriptor_set_layout = unsafe {
            DescriptorSetLayoutBuilder::new()
                .storage_image(0, vk::ShaderStageFlags::COMPUTE)
                .storage_image(1, vk::ShaderStageFlags::COMPUTE)
                .build(device.device())
        }?;

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .size(std::mem::size_of::<CopyPushConstants>() as u32);

        let pipeline = unsafe {
            ComputePipeline::new(
                device.device(),
                helios_shaders::copy_to_swapchain_shader(),
                &[descriptor_set_layout],
                &[push_range],
            )
        }?;

        Ok(Self {
            descriptor_set_layout,
            pipeline,
            sets: Vec::new(),
        })
    }

    /// Allocate and write one descriptor set per swapchain image.
    pub fn create_resolution_dependent(
        &mut self,
        device: &RenderDevice,
        output: &OutputImage,
        swapchain: &Swapchain,
    ) -> Result<()> {
        if !self.sets.is_empty() {
            return Err(GpuError::InvalidState(
                "copy descriptor sets already exist".to_string(),
            ));
        }

        let layouts = vec![self.descriptor_set_layout; swapchain.image_views.len()];
        let sets = unsafe { device.descriptor_pool().allocate(device.device(), &layouts) }?;

        for (&set, &view) in sets.iter().zip(&swapchain.image_views) {
            unsafe {
                helios_gpu::descriptors::write_storage_image(
                    device.device(),
                    set,
                    0,
                    output.view,
                    vk::ImageLayout::GENERAL,
                );
                helios_gpu::descriptors::write_storage_image(
                    device.device(),
                    set,
                    1,
                    view,
                    vk::ImageLayout::GENERAL,
                );
            }
        }

        self.sets = sets;
        Ok(())
    }

    /// Return the per-image descriptor sets to the pool.
    pub fn destroy_resolution_dependent(&mut self, device: &RenderDevice) -> Result<()> {
        if !self.sets.is_empty() {
            unsafe {
                device.descriptor_pool().free(device.device(), &self.sets)?;
            }
            self.sets.clear();
        }
        Ok(())
    }

    /// Record the copy dispatch. The swapchain image is transitioned into
    /// `GENERAL` and left there for the present transition.
    pub fn record(
        &self,
        device: &RenderDevice,
        cmd: vk::CommandBuffer,
        swapchain_image: vk::Image,
        image_index: u32,
        extent: vk::Extent2D,
    ) -> Result<()> {
        let set = *self
            .sets
            .get(image_index as usize)
            .ok_or_else(|| GpuError::InvalidState("copy descriptor sets missing".to_string()))?;

        let raw = device.device();
        unsafe {
            barrier::record_image_layout_transition(
                raw,
                cmd,
                swapchain_image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::GENERAL,
                vk::PipelineStageFlags2::NONE,
                vk::AccessFlags2::NONE,
                vk::PipelineStageFlags2::COMPUTE_SHADER,
                vk::AccessFlags2::SHADER_STORAGE_WRITE,
            );

            // The backend finished writing the output image; make it visible
            // to the compute read.
            barrier::record_memory_barrier(
                raw,
                cmd,
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
                vk::AccessFlags2::COLOR_ATTACHMENT_WRITE | vk::AccessFlags2::SHADER_STORAGE_WRITE,
                vk::PipelineStageFlags2::COMPUTE_SHADER,
                vk::AccessFlags2::SHADER_STORAGE_READ,
            );

            raw.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.pipeline.pipeline);
            raw.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                self.pipeline.layout,
                0,
                &[set],
                &[],
            );

            let push = CopyPushConstants {
                width: extent.width,
                height: extent.height,
            };
            raw.cmd_push_constants(
                cmd,
                self.pipeline.layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                bytemuck::bytes_of(&push),
            );

            raw.cmd_dispatch(
                cmd,
                extent.width.div_ceil(WORKGROUP_SIZE),
                extent.height.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }
        Ok(())
    }

    /// Transition the swapchain image from `GENERAL` to `PRESENT_SRC`.
    ///
    /// Recorded after [`record`](Self::record) as the last command of the
    /// frame.
    pub fn record_present_transition(
        &self,
        device: &RenderDevice,
        cmd: vk::CommandBuffer,
        swapchain_image: vk::Image,
    ) {
        unsafe {
            barrier::record_image_layout_transition(
                device.device(),
                cmd,
                swapchain_image,
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::PRESENT_SRC_KHR,
                vk::PipelineStageFlags2::COMPUTE_SHADER,
                vk::AccessFlags2::SHADER_STORAGE_WRITE,
                vk::PipelineStageFlags2::NONE,
                vk::AccessFlags2::NONE,
            );
        }
    }

    pub fn destroy(&mut self, device: &RenderDevice) -> Result<()> {
        self.destroy_resolution_dependent(device)?;
        unsafe {
            self.pipeline.destroy(device.device());
            device
                .device()
                .destroy_descriptor_set_layout(self.descriptor_set_layout, None);
        }
        Ok(())
    }
}
