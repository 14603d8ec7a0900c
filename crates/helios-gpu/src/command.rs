//! Command buffer management.

use crate::error::{vk_call, Result};
use ash::vk;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = device
            .create_command_pool(&create_info, None)
            .map_err(vk_call("vkCreateCommandPool"))?;

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate a single primary command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffer(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = device
            .allocate_command_buffers(&alloc_info)
            .map_err(vk_call("vkAllocateCommandBuffers"))?;
        Ok(buffers[0])
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    device
        .begin_command_buffer(cmd, &begin_info)
        .map_err(vk_call("vkBeginCommandBuffer"))?;
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device
        .end_command_buffer(cmd)
        .map_err(vk_call("vkEndCommandBuffer"))?;
    Ok(())
}

/// Submit a command buffer with synchronization2 semaphore info.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn submit_command_buffer(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    wait_semaphore: Option<(vk::Semaphore, vk::PipelineStageFlags2)>,
    signal_semaphore: Option<(vk::Semaphore, vk::PipelineStageFlags2)>,
    fence: vk::Fence,
) -> Result<()> {
    let cmd_info = vk::CommandBufferSubmitInfo::default().command_buffer(cmd);

    let wait_infos: Vec<_> = wait_semaphore
        .into_iter()
        .map(|(semaphore, stage)| {
            vk::SemaphoreSubmitInfo::default()
                .semaphore(semaphore)
                .stage_mask(stage)
        })
        .collect();

    let signal_infos: Vec<_> = signal_semaphore
        .into_iter()
        .map(|(semaphore, stage)| {
            vk::SemaphoreSubmitInfo::default()
                .semaphore(semaphore)
                .stage_mask(stage)
        })
        .collect();

    let submit_info = vk::SubmitInfo2::default()
        .command_buffer_infos(std::slice::from_ref(&cmd_info))
        .wait_semaphore_infos(&wait_infos)
        .signal_semaphore_infos(&signal_infos);

    device
        .queue_submit2(queue, &[submit_info], fence)
        .map_err(vk_call("vkQueueSubmit2"))?;
    Ok(())
}

/// Record, submit, and synchronously wait for a one-shot command buffer.
///
/// Used for uploads and acceleration structure builds outside the frame
/// loop; blocks the calling thread until the queue drains.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn execute_single_time_commands<F>(
    device: &ash::Device,
    pool: &CommandPool,
    queue: vk::Queue,
    record: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let cmd = pool.allocate_command_buffer(device)?;

    begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
    record(cmd);
    end_command_buffer(device, cmd)?;

    let cmd_info = vk::CommandBufferSubmitInfo::default().command_buffer(cmd);
    let submit_info =
        vk::SubmitInfo2::default().command_buffer_infos(std::slice::from_ref(&cmd_info));
    device
        .queue_submit2(queue, &[submit_info], vk::Fence::null())
        .map_err(vk_call("vkQueueSubmit2"))?;
    device
        .queue_wait_idle(queue)
        .map_err(vk_call("vkQueueWaitIdle"))?;

    device.free_command_buffers(pool.handle(), &[cmd]);

    Ok(())
}
