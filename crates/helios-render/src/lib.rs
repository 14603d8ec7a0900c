//! Rasterization pipeline, frame loop, and presentation for the Helios
//! renderer.
//!
//! This crate provides:
//! - [`RenderDevice`]: process-lifetime GPU state (context, pools, staging,
//!   pipeline cache)
//! - [`Display`]: a window's surface, swapchain, and single-frame-in-flight
//!   loop with release/restore for resizes
//! - [`RasterResources`]: the raster backend drawing into the shared output
//!   image
//! - [`CopyToSwapchain`]: the compute pass presenting the output image
//! - [`UiPass`] and [`OverlayRenderer`]: the overlay seam

pub mod copy;
pub mod device;
pub mod display;
pub mod overlay;
pub mod raster;
pub mod targets;

pub use copy::CopyToSwapchain;
pub use device::{GpuMesh, RenderDevice, Texture};
pub use display::{AcquiredFrame, Display};
pub use helios_gpu::PresentOutcome;
pub use overlay::{OverlayRenderer, UiPass};
pub use raster::RasterResources;
pub use targets::{DepthBuffer, OutputImage, DEPTH_FORMAT, OUTPUT_FORMAT};
