//! Window surface, swapchain, and the per-frame loop.

use crate::device::RenderDevice;
use ash::vk;
use helios_gpu::command::{begin_command_buffer, end_command_buffer, submit_command_buffer};
use helios_gpu::error::{GpuError, Result};
use helios_gpu::{AcquireResult, FrameSync, PresentOutcome, SubmissionLedger, SurfaceContext, Swapchain};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// A frame whose swapchain image has been acquired and whose command buffer
/// is open for recording.
#[derive(Clone, Copy)]
pub struct AcquiredFrame {
    pub image_index: u32,
    pub cmd: vk::CommandBuffer,
    /// The swapchain still works but no longer matches the surface exactly.
    /// Render this frame, then rebuild.
    pub suboptimal: bool,
}

/// Everything tied to one window: surface, swapchain, frame sync, and the
/// single frame command buffer.
///
/// One frame is in flight at a time. [`Display::begin_frame`] blocks until
/// the previous submission retires, which is the only CPU/GPU sync point;
/// after it returns, all per-frame resources are safe to overwrite.
pub struct Display {
    surface: SurfaceContext,
    swapchain: Option<Swapchain>,
    sync: FrameSync,
    ledger: SubmissionLedger,
    frame_cmd: vk::CommandBuffer,
    vsync: bool,
}

impl Display {
    /// Create the surface and initial swapchain for a window.
    pub fn new<W>(
        device: &RenderDevice,
        window: &W,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let surface = unsafe { SurfaceContext::from_window(device.gpu(), window) }?;
        let swapchain =
            unsafe { surface.create_swapchain(device.gpu(), width, height, vsync, None) }?;
        let sync = unsafe { FrameSync::new(device.device()) }?;
        let frame_cmd = unsafe { device.command_pool().allocate_command_buffer(device.device()) }?;

        Ok(Self {
            surface,
            swapchain: Some(swapchain),
            sync,
            ledger: SubmissionLedger::new(),
            frame_cmd,
            vsync,
        })
    }

    pub fn vsync(&self) -> bool {
        self.vsync
    }

    /// Current swapchain extent.
    pub fn extent(&self) -> Result<vk::Extent2D> {
        Ok(self.swapchain()?.extent)
    }

    pub fn swapchain(&self) -> Result<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("Swapchain released".to_string()))
    }

    /// Wait for the previous frame, acquire the next swapchain image, and
    /// open the frame command buffer.
    ///
    /// Returns `None` when the swapchain is out of date; no image was
    /// acquired and the caller must [`release`](Self::release) /
    /// [`restore`](Self::restore) before the next frame.
    pub fn begin_frame(&mut self, device: &RenderDevice) -> Result<Option<AcquiredFrame>> {
        unsafe {
            device
                .device()
                .wait_for_fences(&[self.sync.frame_fence], true, u64::MAX)
                .map_err(helios_gpu::error::vk_call("vkWaitForFences"))?;
        }

        let acquired = unsafe {
            self.swapchain()?.acquire_next_image(
                &self.surface.swapchain_loader,
                self.sync.image_acquired,
                u64::MAX,
            )
        }?;

        let (image_index, suboptimal) = match acquired {
            AcquireResult::Acquired { index, suboptimal } => (index, suboptimal),
            AcquireResult::OutOfDate => {
                tracing::debug!("Swapchain out of date at acquire");
                return Ok(None);
            }
        };

        // The fence stays signaled across an out-of-date acquire, so it is
        // only reset once a submission for this frame is certain.
        unsafe {
            device
                .device()
                .reset_fences(&[self.sync.frame_fence])
                .map_err(helios_gpu::error::vk_call("vkResetFences"))?;
        }
        self.ledger.acknowledge_wait();

        unsafe {
            begin_command_buffer(
                device.device(),
                self.frame_cmd,
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            )?;
        }

        Ok(Some(AcquiredFrame {
            image_index,
            cmd: self.frame_cmd,
            suboptimal,
        }))
    }

    /// Close the frame command buffer, submit it, and present.
    ///
    /// A `NeedsRebuild` outcome is not an error: the frame was consumed, but
    /// the swapchain must be rebuilt before the next one.
    pub fn end_frame(&mut self, device: &RenderDevice, frame: AcquiredFrame) -> Result<PresentOutcome> {
        unsafe {
            end_command_buffer(device.device(), frame.cmd)?;

            submit_command_buffer(
                device.device(),
                device.gpu().graphics_queue(),
                frame.cmd,
                Some((
                    self.sync.image_acquired,
                    vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
                        | vk::PipelineStageFlags2::COMPUTE_SHADER,
                )),
                Some((
                    self.sync.rendering_finished,
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                )),
                self.sync.frame_fence,
            )?;
        }
        self.ledger.note_submit()?;

        let outcome = unsafe {
            self.swapchain()?.present(
                &self.surface.swapchain_loader,
                device.gpu().graphics_queue(),
                frame.image_index,
                &[self.sync.rendering_finished],
            )
        }?;

        if outcome == PresentOutcome::NeedsRebuild || frame.suboptimal {
            return Ok(PresentOutcome::NeedsRebuild);
        }
        Ok(PresentOutcome::Presented)
    }

    /// Tear down the resolution-dependent half of the display.
    ///
    /// Waits for the GPU to go idle, then destroys the swapchain. The surface
    /// and sync objects survive; [`restore`](Self::restore) pairs with this.
    pub fn release(&mut self, device: &RenderDevice) -> Result<()> {
        device.wait_idle()?;
        if let Some(swapchain) = self.swapchain.take() {
            unsafe {
                swapchain.destroy(device.device(), &self.surface.swapchain_loader);
            }
        }
        Ok(())
    }

    /// Rebuild the swapchain after [`release`](Self::release).
    ///
    /// `vsync` is latched here; toggling it goes through a release/restore
    /// cycle like a resize does.
    pub fn restore(
        &mut self,
        device: &RenderDevice,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<()> {
        if self.swapchain.is_some() {
            return Err(GpuError::InvalidState(
                "restore without matching release".to_string(),
            ));
        }
        self.vsync = vsync;
        let swapchain =
            unsafe { self.surface.create_swapchain(device.gpu(), width, height, vsync, None) }?;
        tracing::info!(
            width = swapchain.extent.width,
            height = swapchain.extent.height,
            vsync,
            "Restored swapchain"
        );
        self.swapchain = Some(swapchain);
        Ok(())
    }

    /// Destroy the display. Must run before the render device shuts down.
    pub fn destroy(&mut self, device: &RenderDevice) -> Result<()> {
        device.wait_idle()?;
        if let Some(swapchain) = self.swapchain.take() {
            unsafe {
                swapchain.destroy(device.device(), &self.surface.swapchain_loader);
            }
        }
        unsafe {
            self.sync.destroy(device.device());
            self.surface.destroy();
        }
        Ok(())
    }
}
