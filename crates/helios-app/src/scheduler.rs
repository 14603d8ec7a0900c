//! Frame scheduling state machine.
//!
//! Tracks which backend draws the next frame and when the
//! resolution-dependent resources need a rebuild. All toggles latch here and
//! take effect at the next frame boundary, never mid-frame.

/// Which backend fills the output image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    Raster,
    Raytraced,
}

/// Plan for one frame, produced at the frame boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramePlan {
    pub mode: RenderMode,
    /// Clear the output image without any backend draw. Set for the first
    /// frame after a restore, while the new surface settles.
    pub draw_background_only: bool,
    pub overlay: bool,
    pub animate: bool,
}

/// Per-frame decision state for the demo controller.
pub struct FrameScheduler {
    mode: RenderMode,
    pending_mode: Option<RenderMode>,
    show_ui: bool,
    animate: bool,
    rebuild_requested: bool,
    settling: bool,
}

impl FrameScheduler {
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            pending_mode: None,
            show_ui: true,
            animate: true,
            rebuild_requested: false,
            settling: false,
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Latch a backend switch for the next frame boundary.
    pub fn request_mode(&mut self, mode: RenderMode) {
        self.pending_mode = Some(mode);
    }

    pub fn toggle_backend(&mut self) {
        let target = match self.pending_mode.unwrap_or(self.mode) {
            RenderMode::Raster => RenderMode::Raytraced,
            RenderMode::Raytraced => RenderMode::Raster,
        };
        self.pending_mode = Some(target);
    }

    pub fn toggle_ui(&mut self) {
        self.show_ui = !self.show_ui;
    }

    pub fn toggle_animation(&mut self) {
        self.animate = !self.animate;
    }

    /// A window resize or an out-of-date/suboptimal present was observed.
    pub fn request_rebuild(&mut self) {
        self.rebuild_requested = true;
    }

    /// Consume the rebuild latch. The caller rebuilds the
    /// resolution-dependent resources before beginning the next frame.
    pub fn take_rebuild_request(&mut self) -> bool {
        std::mem::take(&mut self.rebuild_requested)
    }

    /// Resolution-dependent resources were just rebuilt; the next frame
    /// draws only the background.
    pub fn note_restored(&mut self) {
        self.settling = true;
    }

    /// Apply latched toggles and decide what the next frame draws.
    pub fn plan_frame(&mut self) -> FramePlan {
        if let Some(mode) = self.pending_mode.take() {
            self.mode = mode;
        }
        FramePlan {
            mode: self.mode,
            draw_background_only: std::mem::take(&mut self.settling),
            overlay: self.show_ui,
            animate: self.animate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_switch_waits_for_the_frame_boundary() {
        let mut scheduler = FrameScheduler::new(RenderMode::Raster);
        assert_eq!(scheduler.plan_frame().mode, RenderMode::Raster);

        scheduler.toggle_backend();
        // Still mid-frame from the scheduler's point of view until the next
        // plan_frame call.
        assert_eq!(scheduler.mode(), RenderMode::Raster);
        assert_eq!(scheduler.plan_frame().mode, RenderMode::Raytraced);
        assert_eq!(scheduler.plan_frame().mode, RenderMode::Raytraced);
    }

    #[test]
    fn double_toggle_within_one_frame_cancels_out() {
        let mut scheduler = FrameScheduler::new(RenderMode::Raster);
        scheduler.toggle_backend();
        scheduler.toggle_backend();
        assert_eq!(scheduler.plan_frame().mode, RenderMode::Raster);
    }

    #[test]
    fn rebuild_latch_is_consumed_once() {
        let mut scheduler = FrameScheduler::new(RenderMode::Raster);
        assert!(!scheduler.take_rebuild_request());

        scheduler.request_rebuild();
        scheduler.request_rebuild();
        assert!(scheduler.take_rebuild_request());
        assert!(!scheduler.take_rebuild_request());
    }

    #[test]
    fn restore_forces_one_background_only_frame() {
        let mut scheduler = FrameScheduler::new(RenderMode::Raytraced);
        scheduler.note_restored();

        let settling = scheduler.plan_frame();
        assert!(settling.draw_background_only);
        assert_eq!(settling.mode, RenderMode::Raytraced);

        assert!(!scheduler.plan_frame().draw_background_only);
    }

    #[test]
    fn switch_then_resize_sequence() {
        let mut scheduler = FrameScheduler::new(RenderMode::Raster);
        for _ in 0..3 {
            let plan = scheduler.plan_frame();
            assert_eq!(plan.mode, RenderMode::Raster);
            assert!(!plan.draw_background_only);
        }

        scheduler.toggle_backend();
        for _ in 0..2 {
            assert_eq!(scheduler.plan_frame().mode, RenderMode::Raytraced);
        }

        scheduler.request_rebuild();
        assert!(scheduler.take_rebuild_request());
        scheduler.note_restored();

        let plan = scheduler.plan_frame();
        assert!(plan.draw_background_only);
        assert_eq!(plan.mode, RenderMode::Raytraced);
    }

    #[test]
    fn ui_and_animation_toggles() {
        let mut scheduler = FrameScheduler::new(RenderMode::Raster);
        assert!(scheduler.plan_frame().overlay);
        assert!(scheduler.plan_frame().animate);

        scheduler.toggle_ui();
        scheduler.toggle_animation();
        let plan = scheduler.plan_frame();
        assert!(!plan.overlay);
        assert!(!plan.animate);
    }
}
