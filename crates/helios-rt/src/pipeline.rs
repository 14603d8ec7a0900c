//! Raytracing pipeline and per-frame dispatch.

use crate::acceleration::{SceneAccelerationStructure, TriangleGeometry};
use crate::sbt::ShaderBindingTable;
use ash::vk;
use helios_core::Transform;
use helios_gpu::error::{vk_call, GpuError, Result};
use helios_gpu::pipeline::create_shader_module;
use helios_gpu::{DescriptorSetLayoutBuilder, GpuBuffer};
use helios_render::{GpuMesh, OutputImage, RenderDevice};

/// Camera parameters for the raygen shader (std140 layout).
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniform {
    camera_to_world: [f32; 16],
    tan_half_fov_y: f32,
    aspect: f32,
    _pad: [f32; 2],
}

/// Hardware raytracing backend.
///
/// Owns the acceleration structures, raytracing pipeline, shader binding
/// table, and camera uniform. Everything here is resolution-independent
/// except the storage-image descriptor pointing at the output image, which
/// is rewritten whenever the output image is rebuilt.
pub struct RaytracingResources {
    as_loader: ash::khr::acceleration_structure::Device,
    scene: Option<SceneAccelerationStructure>,

    descriptor_set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    descriptor_set: vk::DescriptorSet,
    camera_buffer: GpuBuffer,
    sbt: Option<ShaderBindingTable>,
    rt_loader: ash::khr::ray_tracing_pipeline::Device,
}

impl RaytracingResources {
    /// Build the raytracing backend for a mesh already resident on the GPU.
    ///
    /// The BLAS and TLAS are built synchronously before this returns.
    pub fn new(device: &RenderDevice, mesh: &GpuMesh, model: &Transform) -> Result<Self> {
        let gpu = device.gpu();
        let as_loader =
            ash::khr::acceleration_structure::Device::new(gpu.instance(), gpu.device());
        let rt_loader = ash::khr::ray_tracing_pipeline::Device::new(gpu.instance(), gpu.device());

        let geometry = TriangleGeometry {
            vertex_address: mesh.vertex_buffer.device_address(gpu.device()),
            vertex_count: mesh.vertex_count,
            index_address: mesh.index_buffer.device_address(gpu.device()),
            triangle_count: mesh.index_count / 3,
        };

        let scene = unsafe {
            SceneAccelerationStructure::new(
                gpu.device(),
                &mut gpu.allocator().lock(),
                &as_loader,
                geometry,
                model,
            )
        }?;

        unsafe {
            helios_gpu::command::execute_single_time_commands(
                gpu.device(),
                device.command_pool(),
                gpu.graphics_queue(),
                |cmd| scene.record_build(gpu.device(), &as_loader, cmd),
            )?;
        }
        tracing::debug!(
            triangles = geometry.triangle_count,
            "Built acceleration structures"
        );

        let descriptor_set_layout = unsafe {
            DescriptorSetLayoutBuilder::new()
                .acceleration_structure(0, vk::ShaderStageFlags::RAYGEN_KHR)
                .storage_image(1, vk::ShaderStageFlags::RAYGEN_KHR)
                .uniform_buffer(2, vk::ShaderStageFlags::RAYGEN_KHR)
                .build(gpu.device())
        }?;

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(std::slice::from_ref(&descriptor_set_layout));
        let pipeline_layout = unsafe {
            gpu.device()
                .create_pipeline_layout(&layout_info, None)
                .map_err(vk_call("vkCreatePipelineLayout"))?
        };

        let pipeline =
            match unsafe { create_raytracing_pipeline(gpu.device(), &rt_loader, pipeline_layout) } {
                Ok(pipeline) => pipeline,
                Err(e) => {
                    unsafe {
                        gpu.device().destroy_pipeline_layout(pipeline_layout, None);
                        gpu.device()
                            .destroy_descriptor_set_layout(descriptor_set_layout, None);
                    }
                    return Err(e);
                }
            };

        let sbt = unsafe {
            ShaderBindingTable::new(
                gpu.device(),
                &rt_loader,
                &mut gpu.allocator().lock(),
                pipeline,
                &gpu.capabilities().ray_tracing,
            )
        }?;

        let camera_buffer = device.create_mapped_buffer(
            std::mem::size_of::<CameraUniform>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "raytracing camera",
        )?;

        let descriptor_set = unsafe {
            device
                .descriptor_pool()
                .allocate(gpu.device(), &[descriptor_set_layout])?[0]
        };

        unsafe {
            helios_gpu::descriptors::write_acceleration_structure(
                gpu.device(),
                descriptor_set,
                0,
                scene.tlas_handle(),
            );
            helios_gpu::descriptors::write_uniform_buffer(
                gpu.device(),
                descriptor_set,
                2,
                camera_buffer.buffer,
                0,
                camera_buffer.size,
            );
        }

        Ok(Self {
            as_loader,
            scene: Some(scene),
            descriptor_set_layout,
            pipeline_layout,
            pipeline,
            descriptor_set,
            camera_buffer,
            sbt: Some(sbt),
            rt_loader,
        })
    }

    /// Point the output-image descriptor at the current output image.
    ///
    /// Called after every restore; the rest of the descriptor set survives
    /// resizes untouched.
    pub fn update_output_descriptor(&self, device: &RenderDevice, output: &OutputImage) {
        unsafe {
            helios_gpu::descriptors::write_storage_image(
                device.device(),
                self.descriptor_set,
                1,
                output.view,
                vk::ImageLayout::GENERAL,
            );
        }
    }

    /// Update the camera uniform for the next frame.
    pub fn update(&self, camera_to_world: &Transform, fov_y: f32, aspect: f32) -> Result<()> {
        let uniform = CameraUniform {
            camera_to_world: camera_to_world.to_mat4().to_cols_array(),
            tan_half_fov_y: (fov_y * 0.5).tan(),
            aspect,
            _pad: [0.0; 2],
        };
        self.camera_buffer.write(&[uniform])
    }

    /// Record the trace-rays dispatch into the frame command buffer.
    pub fn record(&self, device: &RenderDevice, cmd: vk::CommandBuffer, extent: vk::Extent2D) -> Result<()> {
        let sbt = self
            .sbt
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("raytracing resources destroyed".to_string()))?;

        let raw = device.device();
        unsafe {
            raw.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::RAY_TRACING_KHR, self.pipeline);
            raw.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::RAY_TRACING_KHR,
                self.pipeline_layout,
                0,
                &[self.descriptor_set],
                &[],
            );
            self.rt_loader.cmd_trace_rays(
                cmd,
                &sbt.raygen_region,
                &sbt.miss_region,
                &sbt.hit_region,
                &sbt.callable_region,
                extent.width,
                extent.height,
                1,
            );
        }
        Ok(())
    }

    /// Destroy everything, in reverse creation order.
    pub fn destroy(&mut self, device: &RenderDevice) -> Result<()> {
        let gpu = device.gpu();
        if let Some(sbt) = self.sbt.take() {
            unsafe {
                sbt.destroy(&mut gpu.allocator().lock())?;
            }
        }
        unsafe {
            device
                .descriptor_pool()
                .free(gpu.device(), &[self.descriptor_set])?;
            gpu.device().destroy_pipeline(self.pipeline, None);
            gpu.device().destroy_pipeline_layout(self.pipeline_layout, None);
            gpu.device()
                .destroy_descriptor_set_layout(self.descriptor_set_layout, None);
        }
        device.destroy_buffer(&mut self.camera_buffer)?;
        if let Some(scene) = self.scene.take() {
            unsafe {
                scene.destroy(&self.as_loader, &mut gpu.allocator().lock())?;
            }
        }
        Ok(())
    }
}

/// Three-stage pipeline: raygen, miss, triangle closest-hit.
unsafe fn create_raytracing_pipeline(
    device: &ash::Device,
    rt_loader: &ash::khr::ray_tracing_pipeline::Device,
    layout: vk::PipelineLayout,
) -> Result<vk::Pipeline> {
    let raygen = create_shader_module(device, helios_shaders::scene_raygen_shader())?;
    let miss = create_shader_module(device, helios_shaders::scene_miss_shader())?;
    let closest_hit = create_shader_module(device, helios_shaders::scene_closest_hit_shader())?;

    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::RAYGEN_KHR)
            .module(raygen)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::MISS_KHR)
            .module(miss)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::CLOSEST_HIT_KHR)
            .module(closest_hit)
            .name(c"main"),
    ];

    let groups = [
        vk::RayTracingShaderGroupCreateInfoKHR::default()
            .ty(vk::RayTracingShaderGroupTypeKHR::GENERAL)
            .general_shader(0)
            .closest_hit_shader(vk::SHADER_UNUSED_KHR)
            .any_hit_shader(vk::SHADER_UNUSED_KHR)
            .intersection_shader(vk::SHADER_UNUSED_KHR),
        vk::RayTracingShaderGroupCreateInfoKHR::default()
            .ty(vk::RayTracingShaderGroupTypeKHR::GENERAL)
            .general_shader(1)
            .closest_hit_shader(vk::SHADER_UNUSED_KHR)
            .any_hit_shader(vk::SHADER_UNUSED_KHR)
            .intersection_shader(vk::SHADER_UNUSED_KHR),
        vk::RayTracingShaderGroupCreateInfoKHR::default()
            .ty(vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP)
            .general_shader(vk::SHADER_UNUSED_KHR)
            .closest_hit_shader(2)
            .any_hit_shader(vk::SHADER_UNUSED_KHR)
            .intersection_shader(vk::SHADER_UNUSED_KHR),
    ];

    let create_info = vk::RayTracingPipelineCreateInfoKHR::default()
        .stages(&stages)
        .groups(&groups)
        .max_pipeline_ray_recursion_depth(1)
        .layout(layout);

    let result = rt_loader.create_ray_tracing_pipelines(
        vk::DeferredOperationKHR::null(),
        vk::PipelineCache::null(),
        &[create_info],
        None,
    );

    device.destroy_shader_module(raygen, None);
    device.destroy_shader_module(miss, None);
    device.destroy_shader_module(closest_hit, None);

    let pipelines =
        result.map_err(|(_pipelines, e)| GpuError::PipelineCreation(e.to_string()))?;
    Ok(pipelines[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_uniform_matches_std140_layout() {
        let uniform = CameraUniform {
            camera_to_world: [0.0; 16],
            tan_half_fov_y: 1.0,
            aspect: 2.0,
            _pad: [0.0; 2],
        };

        let bytes = bytemuck::bytes_of(&uniform);
        assert_eq!(bytes.len(), 80);
        // The scalars directly follow the mat4.
        assert_eq!(bytes[64..68], 1.0_f32.to_le_bytes());
        assert_eq!(bytes[68..72], 2.0_f32.to_le_bytes());
    }
}
