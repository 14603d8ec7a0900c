//! Shader binding table layout and upload.

use ash::vk;
use gpu_allocator::MemoryLocation;
use helios_gpu::error::{vk_call, GpuError, Result};
use helios_gpu::{GpuAllocator, GpuBuffer, RayTracingProperties};

/// Byte layout of the table: raygen, miss, then hit group, each region
/// padded to the device's base alignment.
///
/// Pure arithmetic over the device properties so it can be checked without
/// a GPU. Handle sizes are queried once at device selection and reused for
/// every table built afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbtLayout {
    pub handle_size: u32,
    pub aligned_handle_size: u32,
    pub raygen_size: u32,
    pub miss_size: u32,
    pub hit_size: u32,
}

impl SbtLayout {
    /// One raygen shader, one miss shader, one hit group.
    pub fn for_single_hit_group(properties: &RayTracingProperties) -> Self {
        let aligned_handle_size = align_up(
            properties.shader_group_handle_size,
            properties.shader_group_handle_alignment,
        );
        let region = align_up(aligned_handle_size, properties.shader_group_base_alignment);

        Self {
            handle_size: properties.shader_group_handle_size,
            aligned_handle_size,
            raygen_size: region,
            miss_size: region,
            hit_size: region,
        }
    }

    pub fn total_size(&self) -> u32 {
        self.raygen_size + self.miss_size + self.hit_size
    }

    fn region_offsets(&self) -> [u32; 3] {
        [0, self.raygen_size, self.raygen_size + self.miss_size]
    }
}

/// Shader binding table for a raytracing pipeline with one raygen shader,
/// one miss shader, and one triangle hit group.
pub struct ShaderBindingTable {
    pub buffer: GpuBuffer,
    pub raygen_region: vk::StridedDeviceAddressRegionKHR,
    pub miss_region: vk::StridedDeviceAddressRegionKHR,
    pub hit_region: vk::StridedDeviceAddressRegionKHR,
    pub callable_region: vk::StridedDeviceAddressRegionKHR,
}

impl ShaderBindingTable {
    /// Query the pipeline's group handles and pack them into a host-visible
    /// table.
    ///
    /// # Safety
    /// Device, loader, and allocator must be valid; the pipeline must be a
    /// raytracing pipeline with exactly three shader groups.
    pub unsafe fn new(
        device: &ash::Device,
        rt_loader: &ash::khr::ray_tracing_pipeline::Device,
        allocator: &mut GpuAllocator,
        pipeline: vk::Pipeline,
        properties: &RayTracingProperties,
    ) -> Result<Self> {
        let layout = SbtLayout::for_single_hit_group(properties);
        let group_count = 3_u32;

        let handles = rt_loader
            .get_ray_tracing_shader_group_handles(
                pipeline,
                0,
                group_count,
                (layout.handle_size * group_count) as usize,
            )
            .map_err(vk_call("vkGetRayTracingShaderGroupHandlesKHR"))?;

        let buffer = allocator.create_buffer(
            u64::from(layout.total_size()),
            vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::CpuToGpu,
            "shader binding table",
        )?;

        let sbt_ptr = buffer
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("SBT buffer not mapped".to_string()))?;

        let handle_size = layout.handle_size as usize;
        for (group, offset) in layout.region_offsets().into_iter().enumerate() {
            std::ptr::copy_nonoverlapping(
                handles.as_ptr().add(group * handle_size),
                sbt_ptr.add(offset as usize),
                handle_size,
            );
        }

        let base = buffer.device_address(device);
        let stride = u64::from(layout.aligned_handle_size);

        // The raygen region's size must equal its stride
        // (VUID-vkCmdTraceRaysKHR-size-04023).
        let raygen_region = vk::StridedDeviceAddressRegionKHR {
            device_address: base,
            stride,
            size: stride,
        };
        let miss_region = vk::StridedDeviceAddressRegionKHR {
            device_address: base + u64::from(layout.raygen_size),
            stride,
            size: u64::from(layout.miss_size),
        };
        let hit_region = vk::StridedDeviceAddressRegionKHR {
            device_address: base + u64::from(layout.raygen_size) + u64::from(layout.miss_size),
            stride,
            size: u64::from(layout.hit_size),
        };
        let callable_region = vk::StridedDeviceAddressRegionKHR::default();

        Ok(Self {
            buffer,
            raygen_region,
            miss_region,
            hit_region,
            callable_region,
        })
    }

    /// Free the table buffer.
    ///
    /// # Safety
    /// The table must not be in use.
    pub unsafe fn destroy(mut self, allocator: &mut GpuAllocator) -> Result<()> {
        allocator.free_buffer(&mut self.buffer)?;
        Ok(())
    }
}

fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(handle_size: u32, handle_alignment: u32, base_alignment: u32) -> RayTracingProperties {
        RayTracingProperties {
            shader_group_handle_size: handle_size,
            shader_group_handle_alignment: handle_alignment,
            shader_group_base_alignment: base_alignment,
            max_ray_recursion_depth: 1,
        }
    }

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(32, 64), 64);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(65, 64), 128);
        assert_eq!(align_up(1, 4), 4);
    }

    #[test]
    fn layout_matches_typical_nvidia_properties() {
        // handle 32, handle alignment 32, base alignment 64
        let layout = SbtLayout::for_single_hit_group(&properties(32, 32, 64));
        assert_eq!(layout.aligned_handle_size, 32);
        assert_eq!(layout.raygen_size, 64);
        assert_eq!(layout.total_size(), 192);
        assert_eq!(layout.region_offsets(), [0, 64, 128]);
    }

    #[test]
    fn regions_never_overlap() {
        let layout = SbtLayout::for_single_hit_group(&properties(64, 64, 256));
        let [raygen, miss, hit] = layout.region_offsets();
        assert!(raygen + layout.aligned_handle_size <= miss);
        assert!(miss + layout.aligned_handle_size <= hit);
        assert!(hit + layout.aligned_handle_size <= layout.total_size());
    }
}
