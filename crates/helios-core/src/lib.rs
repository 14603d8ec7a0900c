//! Core math and scene data types for the Helios renderer.
//!
//! This crate provides the foundational types shared by every render crate:
//! - 3x4 affine transforms for model/view composition
//! - Decoded mesh and pixel buffers handed over by the asset loader
//! - Common error types

pub mod error;
pub mod geometry;
pub mod math;

pub use error::{Error, Result};
pub use geometry::{MeshData, PixelData, Vertex};
pub use math::Transform;
