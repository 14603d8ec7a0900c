//! Helios demo viewer.
//!
//! Renders a textured cube with either the rasterizer or the hardware
//! raytracer, composited to the window by a compute pass.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p helios-viewer
//! ```
//!
//! ## Controls
//!
//! - `R`: toggle rasterization / raytracing
//! - `V`: toggle vsync
//! - `U`: toggle UI overlay
//! - `A`: toggle animation
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod scene;

use helios_app::{run_demo, AppConfig};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    run_demo(
        AppConfig::new("Helios").with_size(WIDTH, HEIGHT),
        scene::demo_scene(),
    )
}
