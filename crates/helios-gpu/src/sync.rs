//! Synchronization primitives.

use crate::error::{vk_call, GpuError, Result};
use ash::vk;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = device
        .create_semaphore(&create_info, None)
        .map_err(vk_call("vkCreateSemaphore"))?;
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = device
        .create_fence(&create_info, None)
        .map_err(vk_call("vkCreateFence"))?;
    Ok(fence)
}

/// Synchronization objects for the single frame in flight.
///
/// There is exactly one of these per display. Waiting on `frame_fence` at the
/// start of a frame is the only CPU/GPU sync point; once it returns, every
/// resource the previous frame used is free to reuse.
pub struct FrameSync {
    /// Signaled when the acquired swapchain image is ready to render into.
    pub image_acquired: vk::Semaphore,
    /// Signaled when the frame's submission finishes; present waits on it.
    pub rendering_finished: vk::Semaphore,
    /// Signaled when the frame's submission retires on the GPU.
    pub frame_fence: vk::Fence,
}

impl FrameSync {
    /// Create frame synchronization resources. The fence starts signaled so
    /// the first frame does not block.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        Ok(Self {
            image_acquired: create_semaphore(device)?,
            rendering_finished: create_semaphore(device)?,
            frame_fence: create_fence(device, true)?,
        })
    }

    /// Destroy synchronization resources.
    ///
    /// # Safety
    /// The device must be valid and the resources must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.image_acquired, None);
        device.destroy_semaphore(self.rendering_finished, None);
        device.destroy_fence(self.frame_fence, None);
    }
}

/// Bookkeeping for the one-frame-in-flight submission protocol.
///
/// Pure state, no Vulkan handles, so the protocol itself is testable: a
/// submit while another submission is still pending is a caller bug and is
/// rejected before it reaches the queue.
#[derive(Default)]
pub struct SubmissionLedger {
    pending: bool,
    submitted_frames: u64,
}

impl SubmissionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a submission is still pending retirement.
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Total frames submitted since creation.
    pub fn submitted_frames(&self) -> u64 {
        self.submitted_frames
    }

    /// Record that the frame fence wait completed. Returns `true` if there
    /// was a pending submission to wait for.
    pub fn acknowledge_wait(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    /// Record a queue submission. Fails if the previous submission has not
    /// been waited on.
    pub fn note_submit(&mut self) -> Result<()> {
        if self.pending {
            return Err(GpuError::InvalidState(
                "Submission while previous frame still in flight".to_string(),
            ));
        }
        self.pending = true;
        self.submitted_frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_most_one_submission_in_flight() {
        let mut ledger = SubmissionLedger::new();

        assert!(!ledger.acknowledge_wait());
        ledger.note_submit().unwrap();
        assert!(ledger.has_pending());

        // A second submit without an intervening wait is rejected.
        assert!(ledger.note_submit().is_err());

        assert!(ledger.acknowledge_wait());
        ledger.note_submit().unwrap();
        assert_eq!(ledger.submitted_frames(), 2);
    }

    #[test]
    fn wait_without_pending_submission_is_a_no_op() {
        let mut ledger = SubmissionLedger::new();
        assert!(!ledger.acknowledge_wait());
        assert!(!ledger.acknowledge_wait());
        assert_eq!(ledger.submitted_frames(), 0);
    }
}
