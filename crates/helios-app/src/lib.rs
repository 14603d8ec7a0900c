//! Demo application: frame scheduling, the demo controller, and the window
//! runner.

pub mod demo;
pub mod runner;
pub mod scheduler;

pub use demo::{Demo, DemoScene};
pub use runner::{run_demo, AppConfig};
pub use scheduler::{FramePlan, FrameScheduler, RenderMode};
