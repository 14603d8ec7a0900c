//! Pipeline barrier helpers.

use ash::vk;

/// Record an image layout transition using synchronization2.
///
/// Covers the whole color subresource range; depth images pass their own
/// aspect via [`record_image_barrier`].
///
/// # Safety
/// The device, command buffer, and image must be valid.
#[allow(clippy::too_many_arguments)]
pub unsafe fn record_image_layout_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_stage: vk::PipelineStageFlags2,
    src_access: vk::AccessFlags2,
    dst_stage: vk::PipelineStageFlags2,
    dst_access: vk::AccessFlags2,
) {
    record_image_barrier(
        device,
        cmd,
        image,
        vk::ImageAspectFlags::COLOR,
        old_layout,
        new_layout,
        src_stage,
        src_access,
        dst_stage,
        dst_access,
    );
}

/// Record an image memory barrier for the given aspect.
///
/// # Safety
/// The device, command buffer, and image must be valid.
#[allow(clippy::too_many_arguments)]
pub unsafe fn record_image_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_stage: vk::PipelineStageFlags2,
    src_access: vk::AccessFlags2,
    dst_stage: vk::PipelineStageFlags2,
    dst_access: vk::AccessFlags2,
) {
    let barrier = vk::ImageMemoryBarrier2::default()
        .image(image)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_stage_mask(src_stage)
        .src_access_mask(src_access)
        .dst_stage_mask(dst_stage)
        .dst_access_mask(dst_access)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    let dependency_info =
        vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));

    device.cmd_pipeline_barrier2(cmd, &dependency_info);
}

/// Record a global memory barrier.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn record_memory_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src_stage: vk::PipelineStageFlags2,
    src_access: vk::AccessFlags2,
    dst_stage: vk::PipelineStageFlags2,
    dst_access: vk::AccessFlags2,
) {
    let barrier = vk::MemoryBarrier2::default()
        .src_stage_mask(src_stage)
        .src_access_mask(src_access)
        .dst_stage_mask(dst_stage)
        .dst_access_mask(dst_access);

    let dependency_info =
        vk::DependencyInfo::default().memory_barriers(std::slice::from_ref(&barrier));

    device.cmd_pipeline_barrier2(cmd, &dependency_info);
}
