//! GPU capability detection.

use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            other => Self::Other(other),
        }
    }
}

/// Raytracing pipeline properties the renderer needs.
///
/// Queried once at device selection; `shader_group_handle_size` is the record
/// header size used to lay out the shader binding table.
#[derive(Debug, Clone, Copy, Default)]
pub struct RayTracingProperties {
    /// Size of one shader group handle in bytes.
    pub shader_group_handle_size: u32,
    /// Required alignment of handles within a table.
    pub shader_group_handle_alignment: u32,
    /// Required alignment of each table region's base address.
    pub shader_group_base_alignment: u32,
    /// Maximum supported ray recursion depth.
    pub max_ray_recursion_depth: u32,
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,

    /// Device-local memory in MB
    pub device_local_memory_mb: u64,

    /// Raytracing pipeline properties.
    pub ray_tracing: RayTracingProperties,

    /// Available device extensions.
    pub available_extensions: HashSet<String>,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);

        let extensions = instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default();

        let available_extensions: HashSet<String> = extensions
            .iter()
            .filter_map(|ext| {
                CStr::from_ptr(ext.extension_name.as_ptr())
                    .to_str()
                    .ok()
                    .map(String::from)
            })
            .collect();

        let vendor = GpuVendor::from_vendor_id(properties.vendor_id);
        let device_name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let mut rt_properties = vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
        let mut properties2 = vk::PhysicalDeviceProperties2::default().push_next(&mut rt_properties);
        instance.get_physical_device_properties2(physical_device, &mut properties2);

        Self {
            vendor,
            device_name,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            device_local_memory_mb,
            ray_tracing: RayTracingProperties {
                shader_group_handle_size: rt_properties.shader_group_handle_size,
                shader_group_handle_alignment: rt_properties.shader_group_handle_alignment,
                shader_group_base_alignment: rt_properties.shader_group_base_alignment,
                max_ray_recursion_depth: rt_properties.max_ray_recursion_depth,
            },
            available_extensions,
        }
    }

    /// Check whether a required extension is available.
    pub fn has_extension(&self, name: &CStr) -> bool {
        name.to_str()
            .map(|n| self.available_extensions.contains(n))
            .unwrap_or(false)
    }

    /// Check if the GPU meets the renderer's hard requirements. Both backends
    /// must be supported: a missing raytracing extension is a startup failure.
    pub fn meets_requirements(&self) -> bool {
        let api_major = vk::api_version_major(self.api_version);
        let api_minor = vk::api_version_minor(self.api_version);
        if api_major < 1 || (api_major == 1 && api_minor < 3) {
            return false;
        }

        for required in [
            ash::khr::swapchain::NAME,
            ash::khr::acceleration_structure::NAME,
            ash::khr::ray_tracing_pipeline::NAME,
            ash::khr::deferred_host_operations::NAME,
        ] {
            if !self.has_extension(required) {
                return false;
            }
        }

        self.ray_tracing.shader_group_handle_size > 0
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM - RT handle size {}",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
            self.ray_tracing.shader_group_handle_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }
}
