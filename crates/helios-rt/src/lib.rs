//! Hardware raytracing backend: acceleration structures, shader binding
//! table, and the raytracing pipeline.

pub mod acceleration;
pub mod pipeline;
pub mod sbt;

pub use acceleration::{SceneAccelerationStructure, TriangleBlas, TriangleGeometry, Tlas};
pub use pipeline::RaytracingResources;
pub use sbt::{SbtLayout, ShaderBindingTable};
