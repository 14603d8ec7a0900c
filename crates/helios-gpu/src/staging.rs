//! Host-visible staging buffer for CPU → GPU transfers.

use crate::error::{GpuError, Result};
use crate::memory::{GpuAllocator, GpuBuffer};
use ash::vk;
use gpu_allocator::MemoryLocation;

/// Granularity for staging buffer growth.
const STAGING_ALIGNMENT: vk::DeviceSize = 64 * 1024;

/// A persistently mapped staging buffer that only ever grows.
///
/// [`StagingBuffer::ensure_allocation`] guarantees at least the requested
/// capacity. Growth replaces the underlying Vulkan buffer; any previously
/// obtained mapped pointer or handle is invalid after a call that returns
/// `true`, so callers must re-fetch both each time.
pub struct StagingBuffer {
    buffer: Option<GpuBuffer>,
}

impl StagingBuffer {
    /// Create an empty staging buffer. No GPU memory is allocated until the
    /// first [`ensure_allocation`](Self::ensure_allocation) call.
    pub fn new() -> Self {
        Self { buffer: None }
    }

    /// Current capacity in bytes.
    pub fn capacity(&self) -> vk::DeviceSize {
        self.buffer.as_ref().map_or(0, |b| b.size)
    }

    /// Ensure the buffer holds at least `size` bytes.
    ///
    /// Returns `true` if the buffer was reallocated. Never shrinks.
    pub fn ensure_allocation(
        &mut self,
        allocator: &mut GpuAllocator,
        size: vk::DeviceSize,
    ) -> Result<bool> {
        if size <= self.capacity() {
            return Ok(false);
        }

        let new_capacity = grown_capacity(self.capacity(), size);
        tracing::debug!(
            old = self.capacity(),
            new = new_capacity,
            "Growing staging buffer"
        );

        if let Some(mut old) = self.buffer.take() {
            allocator.free_buffer(&mut old)?;
        }

        let buffer = allocator.create_buffer(
            new_capacity,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "staging buffer",
        )?;

        if buffer.mapped_ptr().is_none() {
            return Err(GpuError::AllocationFailed(
                "Staging buffer is not host-visible".to_string(),
            ));
        }

        self.buffer = Some(buffer);
        Ok(true)
    }

    /// The underlying buffer handle. Errors until the first allocation.
    pub fn buffer(&self) -> Result<vk::Buffer> {
        self.buffer
            .as_ref()
            .map(|b| b.buffer)
            .ok_or_else(|| GpuError::InvalidState("Staging buffer not allocated".to_string()))
    }

    /// Write bytes at the given offset. The range must fit the current
    /// capacity; call [`ensure_allocation`](Self::ensure_allocation) first.
    pub fn write_bytes(&self, offset: vk::DeviceSize, data: &[u8]) -> Result<()> {
        self.buffer
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("Staging buffer not allocated".to_string()))?
            .write_bytes(offset, data)
    }

    /// Release the GPU allocation. Safe to call more than once.
    pub fn destroy(&mut self, allocator: &mut GpuAllocator) -> Result<()> {
        if let Some(mut buffer) = self.buffer.take() {
            allocator.free_buffer(&mut buffer)?;
        }
        Ok(())
    }
}

impl Default for StagingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Growth policy: double the current capacity or take the requested size,
/// whichever is larger, rounded up to the allocation granularity.
fn grown_capacity(current: vk::DeviceSize, requested: vk::DeviceSize) -> vk::DeviceSize {
    let target = requested.max(current.saturating_mul(2));
    target.div_ceil(STAGING_ALIGNMENT) * STAGING_ALIGNMENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_rounds_up_to_granularity() {
        assert_eq!(grown_capacity(0, 1), STAGING_ALIGNMENT);
        assert_eq!(grown_capacity(0, STAGING_ALIGNMENT), STAGING_ALIGNMENT);
        assert_eq!(
            grown_capacity(0, STAGING_ALIGNMENT + 1),
            2 * STAGING_ALIGNMENT
        );
    }

    #[test]
    fn growth_at_least_doubles() {
        let current = 4 * STAGING_ALIGNMENT;
        assert_eq!(grown_capacity(current, current + 1), 8 * STAGING_ALIGNMENT);
    }

    #[test]
    fn large_request_wins_over_doubling() {
        let current = 2 * STAGING_ALIGNMENT;
        let requested = 100 * STAGING_ALIGNMENT;
        assert_eq!(grown_capacity(current, requested), requested);
    }
}
