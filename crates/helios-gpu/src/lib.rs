//! Vulkan abstraction layer for the Helios renderer.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - GPU capability detection, including raytracing properties
//! - Memory allocation via gpu-allocator, plus a growing staging buffer
//! - Command buffer and descriptor management
//! - Swapchain handling with non-fatal out-of-date reporting
//! - A graphics pipeline cache keyed by structural identity

pub mod barrier;
pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod pipeline_cache;
pub mod staging;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use capabilities::{GpuCapabilities, GpuVendor, RayTracingProperties};
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{DescriptorPool, DescriptorSetLayoutBuilder};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{ComputePipeline, GraphicsPipelineConfig};
pub use pipeline_cache::{PipelineCache, PipelineKey};
pub use staging::StagingBuffer;
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::{AcquireResult, PresentOutcome, Swapchain};
pub use sync::{FrameSync, SubmissionLedger};
