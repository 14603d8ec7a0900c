//! Window creation and event loop.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::demo::{Demo, DemoScene};

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Helios".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }
}

/// Run the demo with the given configuration and scene content.
///
/// Initializes logging, creates the window and GPU device, and runs the
/// event loop until the window closes.
pub fn run_demo(config: AppConfig, scene: DemoScene) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = DemoRunner {
        config,
        scene,
        state: None,
    };

    if let Err(e) = event_loop.run_app(&mut runner) {
        error!("Event loop error: {e}");
    }

    Ok(())
}

/// Internal runner implementing winit's ApplicationHandler.
struct DemoRunner {
    config: AppConfig,
    scene: DemoScene,
    state: Option<DemoState>,
}

struct DemoState {
    window: Arc<Window>,
    demo: Demo,
    last_frame: Instant,
}

impl ApplicationHandler for DemoRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Demo ready");
            }
            Err(e) => {
                error!("Failed to initialize: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    if let Err(e) = state.demo.shutdown() {
                        error!("Shutdown error: {e}");
                    }
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    let now = Instant::now();
                    let dt = now.duration_since(state.last_frame).as_secs_f32();
                    state.last_frame = now;

                    if let Err(e) = state.demo.run_frame(dt) {
                        error!("Render error: {e}");
                        event_loop.exit();
                        return;
                    }
                    state.window.request_redraw();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    state.demo.note_resized(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if let Some(state) = &mut self.state {
                    state.handle_key(code);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

impl DemoRunner {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<DemoState> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let size = window.inner_size();
        let demo = Demo::new(
            window.as_ref(),
            &self.config.title,
            size.width,
            size.height,
            self.config.vsync,
            self.config.validation,
            &self.scene,
        )?;

        Ok(DemoState {
            window,
            demo,
            last_frame: Instant::now(),
        })
    }
}

impl DemoState {
    fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::KeyR => {
                info!("Toggling raytracing");
                self.demo.toggle_raytracing();
            }
            KeyCode::KeyV => {
                info!("Toggling vsync");
                self.demo.toggle_vsync();
            }
            KeyCode::KeyU => {
                info!("Toggling UI overlay");
                self.demo.toggle_ui();
            }
            KeyCode::KeyA => {
                info!("Toggling animation");
                self.demo.toggle_animation();
            }
            _ => {}
        }
    }
}
