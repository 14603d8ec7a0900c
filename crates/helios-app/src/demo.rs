//! Demo controller: owns every renderer object and sequences each frame.

use anyhow::Result;
use glam::{Mat4, Vec3};
use helios_core::{math, MeshData, PixelData, Transform};
use helios_render::{
    AcquiredFrame, CopyToSwapchain, Display, GpuMesh, OutputImage, OverlayRenderer,
    PresentOutcome, RasterResources, RenderDevice, Texture, UiPass,
};
use helios_rt::RaytracingResources;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;

use crate::scheduler::{FrameScheduler, RenderMode};

const FOV_Y: f32 = std::f32::consts::FRAC_PI_3;
const ORBIT_RADIUS: f32 = 3.5;
const ORBIT_HEIGHT: f32 = 1.4;

/// Decoded scene content handed over by the caller.
pub struct DemoScene {
    pub mesh: MeshData,
    pub texture: PixelData,
    pub model: Transform,
}

/// Owns the GPU device, the windowed display, both backends, and the
/// composition passes, and drives them one frame at a time.
pub struct Demo {
    device: RenderDevice,
    display: Display,
    scheduler: FrameScheduler,
    raster: RasterResources,
    raytracing: RaytracingResources,
    copy: CopyToSwapchain,
    ui_pass: UiPass,
    overlay: Option<Box<dyn OverlayRenderer>>,
    output: Option<OutputImage>,
    mesh: GpuMesh,
    texture: Texture,
    model: Transform,
    window_size: (u32, u32),
    vsync_request: Option<bool>,
    angle: f32,
}

impl Demo {
    pub fn new<W>(
        window: &W,
        title: &str,
        width: u32,
        height: u32,
        vsync: bool,
        validation: bool,
        scene: &DemoScene,
    ) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let mut device = RenderDevice::new(title, validation)?;
        info!("GPU: {}", device.gpu().capabilities().summary());

        let display = Display::new(&device, window, width, height, vsync)?;

        let mesh = device.create_mesh(&scene.mesh)?;
        let texture = device.create_texture(&scene.texture)?;

        let raster = RasterResources::new(&mut device, &texture)?;
        let raytracing = RaytracingResources::new(&device, &mesh, &scene.model)?;
        let copy = CopyToSwapchain::new(&device)?;
        let ui_pass = UiPass::new(&device)?;

        let mut demo = Self {
            device,
            display,
            scheduler: FrameScheduler::new(RenderMode::Raster),
            raster,
            raytracing,
            copy,
            ui_pass,
            overlay: None,
            output: None,
            mesh,
            texture,
            model: scene.model,
            window_size: (width, height),
            vsync_request: None,
            angle: 0.0,
        };
        demo.create_resolution_dependent()?;
        info!("Demo initialized at {width}x{height}");
        Ok(demo)
    }

    /// Install the UI overlay drawn on top of the backend output.
    pub fn set_overlay(&mut self, overlay: Box<dyn OverlayRenderer>) {
        self.overlay = Some(overlay);
    }

    pub fn toggle_raytracing(&mut self) {
        self.scheduler.toggle_backend();
    }

    pub fn toggle_ui(&mut self) {
        self.scheduler.toggle_ui();
    }

    pub fn toggle_animation(&mut self) {
        self.scheduler.toggle_animation();
    }

    /// Flip vsync. The new presentation mode takes effect through a full
    /// swapchain rebuild before the next frame.
    pub fn toggle_vsync(&mut self) {
        let current = self.vsync_request.unwrap_or_else(|| self.display.vsync());
        self.vsync_request = Some(!current);
        self.scheduler.request_rebuild();
    }

    /// The window was resized. Zero-sized windows (minimized) pause rendering.
    pub fn note_resized(&mut self, width: u32, height: u32) {
        self.window_size = (width, height);
        if width > 0 && height > 0 {
            self.scheduler.request_rebuild();
        }
    }

    /// Run one frame: rebuild if requested, plan, record, submit, present.
    pub fn run_frame(&mut self, dt: f32) -> Result<()> {
        let (width, height) = self.window_size;
        if width == 0 || height == 0 {
            return Ok(());
        }

        if self.scheduler.take_rebuild_request() {
            self.rebuild_resolution_dependent()?;
        }

        let plan = self.scheduler.plan_frame();
        if plan.animate {
            self.angle += dt * 0.6;
        }

        let Some(frame) = self.display.begin_frame(&self.device)? else {
            // Out-of-date at acquire. Rebuild, then try again next frame.
            self.scheduler.request_rebuild();
            return Ok(());
        };

        self.record_frame(&frame, plan.mode, plan.draw_background_only, plan.overlay)?;

        match self.display.end_frame(&self.device, frame)? {
            PresentOutcome::NeedsRebuild => self.scheduler.request_rebuild(),
            PresentOutcome::Presented => {}
        }
        Ok(())
    }

    fn record_frame(
        &mut self,
        frame: &AcquiredFrame,
        mode: RenderMode,
        background_only: bool,
        overlay: bool,
    ) -> Result<()> {
        let extent = self.display.extent()?;
        let aspect = extent.width as f32 / extent.height as f32;
        let view = orbit_view(self.angle);

        if background_only {
            self.raster
                .record_background_only(&self.device, frame.cmd, extent)?;
        } else {
            match mode {
                RenderMode::Raster => {
                    let mvp = math::perspective(FOV_Y, aspect, 0.1, 100.0)
                        * view
                        * self.model.to_mat4();
                    self.raster.update(mvp)?;
                    self.raster.record(&self.device, frame.cmd, extent, &self.mesh)?;
                }
                RenderMode::Raytraced => {
                    let camera_to_world = Transform::from_mat4(view.inverse());
                    self.raytracing.update(&camera_to_world, FOV_Y, aspect)?;
                    self.raytracing.record(&self.device, frame.cmd, extent)?;
                }
            }
        }

        if overlay {
            if let Some(renderer) = self.overlay.as_mut() {
                self.ui_pass.record(&self.device, frame.cmd, renderer.as_mut())?;
            }
        }

        let swapchain_image = self.display.swapchain()?.images[frame.image_index as usize];
        self.copy.record(
            &self.device,
            frame.cmd,
            swapchain_image,
            frame.image_index,
            extent,
        )?;
        self.copy
            .record_present_transition(&self.device, frame.cmd, swapchain_image);
        Ok(())
    }

    /// Tear down and recreate everything tied to the surface resolution.
    ///
    /// Backends drop their bindings into the output image first, then the
    /// swapchain goes, then everything comes back in the reverse order.
    fn rebuild_resolution_dependent(&mut self) -> Result<()> {
        let (width, height) = self.window_size;
        self.device.wait_idle()?;
        self.destroy_resolution_dependent()?;
        self.display.release(&self.device)?;

        let vsync = self.vsync_request.take().unwrap_or_else(|| self.display.vsync());
        self.display.restore(&self.device, width, height, vsync)?;
        self.create_resolution_dependent()?;
        self.scheduler.note_restored();
        Ok(())
    }

    fn create_resolution_dependent(&mut self) -> Result<()> {
        let extent = self.display.extent()?;
        let output = OutputImage::new(&self.device, extent)?;

        self.raster
            .create_resolution_dependent(&self.device, &output)?;
        self.raytracing.update_output_descriptor(&self.device, &output);
        self.copy
            .create_resolution_dependent(&self.device, &output, self.display.swapchain()?)?;
        self.ui_pass
            .create_resolution_dependent(&self.device, &output)?;

        self.output = Some(output);
        Ok(())
    }

    fn destroy_resolution_dependent(&mut self) -> Result<()> {
        self.ui_pass.destroy_resolution_dependent(&self.device);
        self.copy.destroy_resolution_dependent(&self.device)?;
        self.raster.destroy_resolution_dependent(&self.device)?;
        if let Some(mut output) = self.output.take() {
            output.destroy(&self.device)?;
        }
        Ok(())
    }

    /// Drain the in-flight frame and destroy everything, in reverse
    /// creation order.
    pub fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down");
        self.device.wait_idle()?;

        self.destroy_resolution_dependent()?;
        self.ui_pass.destroy(&mut self.device);
        self.copy.destroy(&self.device)?;
        self.raytracing.destroy(&self.device)?;
        self.raster.destroy(&mut self.device)?;
        self.device.destroy_mesh(&mut self.mesh)?;
        self.device.destroy_texture(&mut self.texture)?;
        self.display.destroy(&self.device)?;
        self.device.shutdown()?;
        Ok(())
    }
}

fn orbit_view(angle: f32) -> Mat4 {
    let eye = Vec3::new(
        ORBIT_RADIUS * angle.sin(),
        ORBIT_HEIGHT,
        ORBIT_RADIUS * angle.cos(),
    );
    Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y)
}
