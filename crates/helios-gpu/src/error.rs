//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
///
/// Any non-presentation Vulkan error is unrecoverable for the renderer. The
/// recoverable surface conditions (out-of-date, suboptimal) never surface as
/// this type; acquire and present report them as outcomes instead.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error returned by a named call.
    #[error("Vulkan error: {status} returned by {call}")]
    VulkanCall {
        /// The API call that failed.
        call: &'static str,
        /// The returned status code.
        status: vk::Result,
    },

    /// Vulkan error without call-site attribution.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found: {0}")]
    NoSuitableDevice(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader module creation failed.
    #[error("Shader module creation failed: {0}")]
    ShaderCreation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

/// Attach the failing call's name to a raw Vulkan status.
pub fn vk_call(call: &'static str) -> impl FnOnce(vk::Result) -> GpuError {
    move |status| GpuError::VulkanCall { call, status }
}
