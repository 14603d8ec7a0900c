//! Acceleration structures over triangle geometry.

use ash::vk;
use gpu_allocator::MemoryLocation;
use helios_core::{Transform, Vertex};
use helios_gpu::error::{vk_call, GpuError, Result};
use helios_gpu::{GpuAllocator, GpuBuffer};

/// Geometry description for a triangle BLAS build.
///
/// Addresses reference buffers uploaded with the
/// `ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR` usage.
#[derive(Clone, Copy)]
pub struct TriangleGeometry {
    pub vertex_address: vk::DeviceAddress,
    pub vertex_count: u32,
    pub index_address: vk::DeviceAddress,
    pub triangle_count: u32,
}

impl TriangleGeometry {
    fn to_vk(self) -> vk::AccelerationStructureGeometryKHR<'static> {
        vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
            .flags(vk::GeometryFlagsKHR::OPAQUE)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                triangles: vk::AccelerationStructureGeometryTrianglesDataKHR::default()
                    .vertex_format(vk::Format::R32G32B32_SFLOAT)
                    .vertex_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: self.vertex_address,
                    })
                    .vertex_stride(vk::DeviceSize::from(Vertex::STRIDE))
                    .max_vertex(self.vertex_count.saturating_sub(1))
                    .index_type(vk::IndexType::UINT32)
                    .index_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: self.index_address,
                    }),
            })
    }
}

/// Bottom-level acceleration structure over an indexed triangle mesh.
pub struct TriangleBlas {
    pub acceleration_structure: vk::AccelerationStructureKHR,
    pub buffer: GpuBuffer,
    pub device_address: vk::DeviceAddress,
    geometry: TriangleGeometry,
}

impl TriangleBlas {
    /// Allocate the BLAS. The structure is empty until
    /// [`record_build`](Self::record_build) runs on the GPU.
    ///
    /// # Safety
    /// Device, allocator, and loader must be valid; the geometry addresses
    /// must point at live buffers.
    pub unsafe fn new(
        allocator: &mut GpuAllocator,
        as_loader: &ash::khr::acceleration_structure::Device,
        geometry: TriangleGeometry,
    ) -> Result<Self> {
        let vk_geometry = geometry.to_vk();

        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&vk_geometry));

        let mut build_sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
        as_loader.get_acceleration_structure_build_sizes(
            vk::AccelerationStructureBuildTypeKHR::DEVICE,
            &build_info,
            &[geometry.triangle_count],
            &mut build_sizes,
        );

        let buffer = allocator.create_buffer(
            build_sizes.acceleration_structure_size,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
            "blas buffer",
        )?;

        let create_info = vk::AccelerationStructureCreateInfoKHR::default()
            .buffer(buffer.buffer)
            .offset(0)
            .size(build_sizes.acceleration_structure_size)
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL);

        let acceleration_structure = as_loader
            .create_acceleration_structure(&create_info, None)
            .map_err(vk_call("vkCreateAccelerationStructureKHR"))?;

        let address_info = vk::AccelerationStructureDeviceAddressInfoKHR::default()
            .acceleration_structure(acceleration_structure);
        let device_address = as_loader.get_acceleration_structure_device_address(&address_info);

        Ok(Self {
            acceleration_structure,
            buffer,
            device_address,
            geometry,
        })
    }

    /// Scratch size needed to build this BLAS.
    ///
    /// # Safety
    /// The loader must be valid.
    pub unsafe fn build_scratch_size(
        &self,
        as_loader: &ash::khr::acceleration_structure::Device,
    ) -> vk::DeviceSize {
        let vk_geometry = self.geometry.to_vk();
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&vk_geometry));

        let mut build_sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
        as_loader.get_acceleration_structure_build_sizes(
            vk::AccelerationStructureBuildTypeKHR::DEVICE,
            &build_info,
            &[self.geometry.triangle_count],
            &mut build_sizes,
        );
        build_sizes.build_scratch_size
    }

    /// Record the BLAS build.
    ///
    /// # Safety
    /// The command buffer must be recording and the scratch buffer large
    /// enough.
    pub unsafe fn record_build(
        &self,
        device: &ash::Device,
        as_loader: &ash::khr::acceleration_structure::Device,
        cmd: vk::CommandBuffer,
        scratch_buffer: &GpuBuffer,
    ) {
        let vk_geometry = self.geometry.to_vk();

        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .dst_acceleration_structure(self.acceleration_structure)
            .geometries(std::slice::from_ref(&vk_geometry))
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: scratch_buffer.device_address(device),
            });

        let build_range = vk::AccelerationStructureBuildRangeInfoKHR::default()
            .primitive_count(self.geometry.triangle_count)
            .primitive_offset(0)
            .first_vertex(0)
            .transform_offset(0);

        as_loader.cmd_build_acceleration_structures(
            cmd,
            &[build_info],
            &[std::slice::from_ref(&build_range)],
        );
    }

    /// Destroy the BLAS and free its buffer.
    ///
    /// # Safety
    /// The BLAS must not be in use.
    pub unsafe fn destroy(
        mut self,
        as_loader: &ash::khr::acceleration_structure::Device,
        allocator: &mut GpuAllocator,
    ) -> Result<()> {
        as_loader.destroy_acceleration_structure(self.acceleration_structure, None);
        allocator.free_buffer(&mut self.buffer)?;
        Ok(())
    }
}

/// Top-level acceleration structure with a single BLAS instance.
pub struct Tlas {
    pub acceleration_structure: vk::AccelerationStructureKHR,
    pub buffer: GpuBuffer,
    pub instance_buffer: GpuBuffer,
}

impl Tlas {
    /// Allocate the TLAS referencing `blas` with the given model transform.
    ///
    /// # Safety
    /// Device, allocator, and loader must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        allocator: &mut GpuAllocator,
        as_loader: &ash::khr::acceleration_structure::Device,
        blas: &TriangleBlas,
        model: &Transform,
    ) -> Result<Self> {
        let transform = vk::TransformMatrixKHR {
            matrix: model.to_rows_3x4(),
        };

        let instance = vk::AccelerationStructureInstanceKHR {
            transform,
            instance_custom_index_and_mask: vk::Packed24_8::new(0, 0xFF),
            instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(
                0,
                vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw() as u8,
            ),
            acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
                device_handle: blas.device_address,
            },
        };

        let instance_buffer = allocator.create_buffer(
            std::mem::size_of::<vk::AccelerationStructureInstanceKHR>() as u64,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::CpuToGpu,
            "tlas instances",
        )?;

        let ptr = instance_buffer
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Instance buffer not mapped".to_string()))?;
        std::ptr::copy_nonoverlapping(
            std::ptr::from_ref(&instance).cast::<u8>(),
            ptr,
            std::mem::size_of::<vk::AccelerationStructureInstanceKHR>(),
        );

        let geometry = Self::instances_geometry(instance_buffer.device_address(device));

        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&geometry));

        let mut build_sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
        as_loader.get_acceleration_structure_build_sizes(
            vk::AccelerationStructureBuildTypeKHR::DEVICE,
            &build_info,
            &[1],
            &mut build_sizes,
        );

        let buffer = allocator.create_buffer(
            build_sizes.acceleration_structure_size,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
            "tlas buffer",
        )?;

        let create_info = vk::AccelerationStructureCreateInfoKHR::default()
            .buffer(buffer.buffer)
            .offset(0)
            .size(build_sizes.acceleration_structure_size)
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL);

        let acceleration_structure = as_loader
            .create_acceleration_structure(&create_info, None)
            .map_err(vk_call("vkCreateAccelerationStructureKHR"))?;

        Ok(Self {
            acceleration_structure,
            buffer,
            instance_buffer,
        })
    }

    fn instances_geometry(
        instance_address: vk::DeviceAddress,
    ) -> vk::AccelerationStructureGeometryKHR<'static> {
        vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::INSTANCES)
            .flags(vk::GeometryFlagsKHR::OPAQUE)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                instances: vk::AccelerationStructureGeometryInstancesDataKHR::default()
                    .array_of_pointers(false)
                    .data(vk::DeviceOrHostAddressConstKHR {
                        device_address: instance_address,
                    }),
            })
    }

    /// Scratch size needed to build this TLAS.
    ///
    /// # Safety
    /// The loader must be valid.
    pub unsafe fn build_scratch_size(
        &self,
        device: &ash::Device,
        as_loader: &ash::khr::acceleration_structure::Device,
    ) -> vk::DeviceSize {
        let geometry = Self::instances_geometry(self.instance_buffer.device_address(device));
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&geometry));

        let mut build_sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
        as_loader.get_acceleration_structure_build_sizes(
            vk::AccelerationStructureBuildTypeKHR::DEVICE,
            &build_info,
            &[1],
            &mut build_sizes,
        );
        build_sizes.build_scratch_size
    }

    /// Record the TLAS build. The referenced BLAS must already be built, or
    /// be built earlier in this command buffer with a barrier between.
    ///
    /// # Safety
    /// The command buffer must be recording and the scratch buffer large
    /// enough.
    pub unsafe fn record_build(
        &self,
        device: &ash::Device,
        as_loader: &ash::khr::acceleration_structure::Device,
        cmd: vk::CommandBuffer,
        scratch_buffer: &GpuBuffer,
    ) {
        let geometry = Self::instances_geometry(self.instance_buffer.device_address(device));

        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .dst_acceleration_structure(self.acceleration_structure)
            .geometries(std::slice::from_ref(&geometry))
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: scratch_buffer.device_address(device),
            });

        let build_range = vk::AccelerationStructureBuildRangeInfoKHR::default()
            .primitive_count(1)
            .primitive_offset(0)
            .first_vertex(0)
            .transform_offset(0);

        as_loader.cmd_build_acceleration_structures(
            cmd,
            &[build_info],
            &[std::slice::from_ref(&build_range)],
        );
    }

    /// Destroy the TLAS and free its buffers.
    ///
    /// # Safety
    /// The TLAS must not be in use.
    pub unsafe fn destroy(
        mut self,
        as_loader: &ash::khr::acceleration_structure::Device,
        allocator: &mut GpuAllocator,
    ) -> Result<()> {
        as_loader.destroy_acceleration_structure(self.acceleration_structure, None);
        allocator.free_buffer(&mut self.buffer)?;
        allocator.free_buffer(&mut self.instance_buffer)?;
        Ok(())
    }
}

/// BLAS + TLAS pair with a shared scratch buffer, built in one submission.
pub struct SceneAccelerationStructure {
    pub blas: TriangleBlas,
    pub tlas: Tlas,
    scratch_buffer: GpuBuffer,
}

impl SceneAccelerationStructure {
    /// Allocate both structures and a scratch buffer sized for the larger
    /// of the two builds.
    ///
    /// # Safety
    /// Device, allocator, and loader must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        allocator: &mut GpuAllocator,
        as_loader: &ash::khr::acceleration_structure::Device,
        geometry: TriangleGeometry,
        model: &Transform,
    ) -> Result<Self> {
        let blas = TriangleBlas::new(allocator, as_loader, geometry)?;
        let tlas = Tlas::new(device, allocator, as_loader, &blas, model)?;

        let scratch_size = blas
            .build_scratch_size(as_loader)
            .max(tlas.build_scratch_size(device, as_loader));

        let scratch_buffer = allocator.create_buffer(
            scratch_size,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
            "acceleration scratch",
        )?;

        Ok(Self {
            blas,
            tlas,
            scratch_buffer,
        })
    }

    /// Record BLAS then TLAS builds with the required barrier between them.
    ///
    /// # Safety
    /// The command buffer must be recording.
    pub unsafe fn record_build(
        &self,
        device: &ash::Device,
        as_loader: &ash::khr::acceleration_structure::Device,
        cmd: vk::CommandBuffer,
    ) {
        self.blas
            .record_build(device, as_loader, cmd, &self.scratch_buffer);

        helios_gpu::barrier::record_memory_barrier(
            device,
            cmd,
            vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
            vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
            vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
            vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR
                | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
        );

        self.tlas
            .record_build(device, as_loader, cmd, &self.scratch_buffer);
    }

    pub fn tlas_handle(&self) -> vk::AccelerationStructureKHR {
        self.tlas.acceleration_structure
    }

    /// Destroy both structures and the scratch buffer.
    ///
    /// # Safety
    /// The structures must not be in use.
    pub unsafe fn destroy(
        mut self,
        as_loader: &ash::khr::acceleration_structure::Device,
        allocator: &mut GpuAllocator,
    ) -> Result<()> {
        self.tlas.destroy(as_loader, allocator)?;
        self.blas.destroy(as_loader, allocator)?;
        allocator.free_buffer(&mut self.scratch_buffer)?;
        Ok(())
    }
}
