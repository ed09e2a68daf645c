//! # Viewport Module
//!
//! Zoom, pan and auto-follow state for one pitch graph, plus the mapping
//! between timeline seconds and pixels.
//!
//! Each graph instance owns its own [`ViewportController`]. Nothing here is
//! global: a parent that wants two graphs to share a zoom level passes it in
//! through [`ViewportController::apply_external_zoom`].
//!
//! ## Follow state machine
//! ```text
//! Idle ──activity starts──▶ AutoFollowing ──drag/wheel──▶ ManualPanning
//!   ▲                            ▲                            │ release
//!   └────── cooldown, idle ──────┴──── cooldown elapsed ── Settling
//! ```

use std::time::{Duration, Instant};

pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 4.0;

/// Lower bound on the timeline length so an empty graph still has width.
pub const MIN_TIMELINE_SECS: f64 = 10.0;

/// Fraction of the remaining distance the follow offset moves per frame.
pub const FOLLOW_EASING: f32 = 0.15;

/// Time after the last manual gesture before auto-follow resumes.
pub const MANUAL_PAN_COOLDOWN: Duration = Duration::from_secs(2);

/// Zoom multiplier applied per wheel line.
pub const WHEEL_ZOOM_STEP: f32 = 1.1;

/// Pixel geometry of a graph surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotArea {
    pub width: f32,
    pub height: f32,
    pub padding_left: f32,
    pub padding_right: f32,
    pub padding_top: f32,
    pub padding_bottom: f32,
}

impl Default for PlotArea {
    fn default() -> Self {
        Self::new(800.0, 300.0)
    }
}

impl PlotArea {
    /// A surface of the given size with the default axis paddings.
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            padding_left: 56.0,
            padding_right: 16.0,
            padding_top: 16.0,
            padding_bottom: 28.0,
        }
    }

    pub fn plot_width(&self) -> f32 {
        (self.width - self.padding_left - self.padding_right).max(1.0)
    }

    pub fn plot_height(&self) -> f32 {
        (self.height - self.padding_top - self.padding_bottom).max(1.0)
    }

    pub fn plot_left(&self) -> f32 {
        self.padding_left
    }

    pub fn plot_right(&self) -> f32 {
        self.padding_left + self.plot_width()
    }

    pub fn plot_top(&self) -> f32 {
        self.padding_top
    }

    pub fn plot_bottom(&self) -> f32 {
        self.padding_top + self.plot_height()
    }

    /// Whether a pixel lies inside the plotting rectangle.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.plot_left() && x <= self.plot_right() && y >= self.plot_top() && y <= self.plot_bottom()
    }

    /// Horizontal position of `time`, clamped into the plot so nothing is
    /// ever drawn outside the frame.
    pub fn time_to_x(&self, time: f64, window: TimeWindow) -> f32 {
        let fraction = (time - window.min) / window.range();
        let x = self.padding_left as f64 + fraction * self.plot_width() as f64;
        (x as f32).clamp(self.plot_left(), self.plot_right())
    }

    /// Inverse of [`time_to_x`](Self::time_to_x), used for click-to-seek.
    pub fn x_to_time(&self, x: f32, window: TimeWindow) -> f64 {
        let x = x.clamp(self.plot_left(), self.plot_right());
        window.min + ((x - self.padding_left) / self.plot_width()) as f64 * window.range()
    }

    /// Vertical position of `frequency` within `[min_hz, max_hz]`, clamped.
    pub fn frequency_to_y(&self, frequency: f32, min_hz: f32, max_hz: f32) -> f32 {
        let span = (max_hz - min_hz).max(f32::EPSILON);
        let y = self.plot_bottom() - ((frequency - min_hz) / span) * self.plot_height();
        y.clamp(self.plot_top(), self.plot_bottom())
    }

    pub fn y_to_frequency(&self, y: f32, min_hz: f32, max_hz: f32) -> f32 {
        let y = y.clamp(self.plot_top(), self.plot_bottom());
        min_hz + (self.plot_bottom() - y) / self.plot_height() * (max_hz - min_hz)
    }

    /// Seconds covered by one horizontal pixel.
    pub fn seconds_per_pixel(&self, window: TimeWindow) -> f64 {
        window.range() / self.plot_width() as f64
    }
}

/// The visible span of the timeline in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub min: f64,
    pub max: f64,
}

impl TimeWindow {
    pub fn range(&self) -> f64 {
        (self.max - self.min).max(f64::EPSILON)
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.min && time <= self.max
    }

    pub fn center(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

/// What the viewport is following.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Timeline {
    /// Known length of the reference audio, 0 if none is loaded.
    pub audio_duration: f64,
    /// Playback or recording position in seconds.
    pub current_time: f64,
}

impl Timeline {
    pub fn new(audio_duration: f64, current_time: f64) -> Self {
        Self {
            audio_duration: audio_duration.max(0.0),
            current_time: current_time.max(0.0),
        }
    }

    /// `max(audio_duration, current_time, 10)`.
    pub fn base_max_time(&self) -> f64 {
        self.audio_duration.max(self.current_time).max(MIN_TIMELINE_SECS)
    }

    /// Where the window centre should sit while following. Stops advancing
    /// once playback passes the end of the reference.
    fn desired_center(&self) -> f64 {
        if self.audio_duration > 0.0 {
            self.current_time.min(self.audio_duration)
        } else {
            self.current_time
        }
    }

    /// How far the window centre may go right while following, so the
    /// graph can finish at the tracking line.
    fn follow_limit(&self) -> f64 {
        if self.audio_duration > 0.0 {
            self.audio_duration
        } else {
            self.current_time
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FollowPhase {
    Idle,
    AutoFollowing,
    ManualPanning,
    Settling { since: Instant },
}

#[derive(Debug, Clone)]
pub struct ViewportController {
    zoom: f32,
    pan_offset_px: f32,
    auto_follow: bool,
    manual_pan_active: bool,
    phase: FollowPhase,
    activity_active: bool,
    plot: PlotArea,
    drag_anchor: Option<f32>,
    cooldown: Duration,
}

impl Default for ViewportController {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewportController {
    pub fn new() -> Self {
        Self {
            zoom: 1.0,
            pan_offset_px: 0.0,
            auto_follow: true,
            manual_pan_active: false,
            phase: FollowPhase::Idle,
            activity_active: false,
            plot: PlotArea::default(),
            drag_anchor: None,
            cooldown: MANUAL_PAN_COOLDOWN,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn pan_offset_px(&self) -> f32 {
        self.pan_offset_px
    }

    pub fn auto_follow(&self) -> bool {
        self.auto_follow
    }

    pub fn manual_pan_active(&self) -> bool {
        self.manual_pan_active
    }

    pub fn phase(&self) -> FollowPhase {
        self.phase
    }

    pub fn plot(&self) -> PlotArea {
        self.plot
    }

    /// Updates the surface geometry, keeping the pan position in seconds.
    pub fn set_plot(&mut self, plot: PlotArea) {
        let old_width = self.plot.plot_width();
        self.plot = plot;
        let new_width = self.plot.plot_width();
        if old_width > 0.0 {
            self.pan_offset_px *= new_width / old_width;
        }
    }

    /// Sets the pixel offset directly. The window computation still keeps
    /// the result inside the timeline.
    pub fn set_pan_offset_px(&mut self, offset: f32) {
        if offset.is_finite() {
            self.pan_offset_px = offset;
        }
    }

    pub fn visible_range(&self, timeline: &Timeline) -> f64 {
        timeline.base_max_time() / self.zoom as f64
    }

    fn pixels_per_second(&self, timeline: &Timeline) -> f64 {
        self.plot.plot_width() as f64 / self.visible_range(timeline)
    }

    fn pan_time(&self, timeline: &Timeline) -> f64 {
        self.pan_offset_px as f64 / self.pixels_per_second(timeline)
    }

    /// The time span currently visible.
    ///
    /// `min` never drops below 0 and `max` never exceeds the timeline by more
    /// than half a visible range.
    pub fn visible_window(&self, timeline: &Timeline) -> TimeWindow {
        let base = timeline.base_max_time();
        let range = self.visible_range(timeline);
        let upper = (base - range / 2.0).max(timeline.follow_limit().min(base));
        let center = (base / 2.0 + self.pan_time(timeline))
            .min(upper)
            .max(range / 2.0);
        TimeWindow {
            min: center - range / 2.0,
            max: center + range / 2.0,
        }
    }

    /// Clamps a pan time so the window stays inside `[0, base]`.
    fn clamp_manual_pan_time(&self, pan_time: f64, timeline: &Timeline) -> f64 {
        let base = timeline.base_max_time();
        let range = self.visible_range(timeline);
        let lower = range / 2.0 - base / 2.0;
        let upper = base / 2.0 - range / 2.0;
        pan_time.min(upper).max(lower)
    }

    /// Like the manual clamp, but the centre may reach the end of the
    /// reference even when that leaves part of the window past it.
    fn clamp_follow_pan_time(&self, pan_time: f64, timeline: &Timeline) -> f64 {
        let base = timeline.base_max_time();
        let range = self.visible_range(timeline);
        let lower = range / 2.0 - base / 2.0;
        let upper = (base - range / 2.0).max(timeline.follow_limit().min(base)) - base / 2.0;
        pan_time.min(upper).max(lower)
    }

    /// Tells the controller whether recording/playback is running.
    pub fn set_activity_active(&mut self, active: bool) {
        self.activity_active = active;
        match (active, self.phase) {
            (true, FollowPhase::Idle) if !self.manual_pan_active => {
                self.phase = FollowPhase::AutoFollowing;
                self.auto_follow = true;
            }
            (false, FollowPhase::AutoFollowing) => {
                self.phase = FollowPhase::Idle;
            }
            _ => {}
        }
    }

    fn enter_manual(&mut self) {
        self.auto_follow = false;
        self.manual_pan_active = true;
    }

    pub fn begin_drag(&mut self, x: f32) {
        self.enter_manual();
        self.phase = FollowPhase::ManualPanning;
        self.drag_anchor = Some(x);
    }

    /// Moves the view by the pixel distance since the last drag position.
    /// Dragging right reveals earlier time.
    pub fn drag_to(&mut self, x: f32, timeline: &Timeline) {
        let Some(anchor) = self.drag_anchor else {
            return;
        };
        let delta = x - anchor;
        self.drag_anchor = Some(x);

        let pps = self.pixels_per_second(timeline);
        let pan_time = (self.pan_offset_px - delta) as f64 / pps;
        self.pan_offset_px = (self.clamp_manual_pan_time(pan_time, timeline) * pps) as f32;
    }

    pub fn end_drag(&mut self, now: Instant) {
        self.drag_anchor = None;
        if self.phase == FollowPhase::ManualPanning {
            self.phase = FollowPhase::Settling { since: now };
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_anchor.is_some()
    }

    /// Zooms by `lines` wheel steps around the pixel `cursor_x`, keeping the
    /// time under the cursor where it is.
    pub fn wheel_zoom(&mut self, cursor_x: f32, lines: f32, timeline: &Timeline, now: Instant) {
        let before = self.visible_window(timeline);
        let mouse_time = self.plot.x_to_time(cursor_x, before);
        let fraction = ((cursor_x.clamp(self.plot.plot_left(), self.plot.plot_right())
            - self.plot.plot_left())
            / self.plot.plot_width()) as f64;

        self.zoom = (self.zoom * WHEEL_ZOOM_STEP.powf(lines)).clamp(MIN_ZOOM, MAX_ZOOM);

        let range = self.visible_range(timeline);
        let new_min = mouse_time - fraction * range;
        let pan_time = new_min + range / 2.0 - timeline.base_max_time() / 2.0;
        let pan_time = self.clamp_manual_pan_time(pan_time, timeline);
        self.pan_offset_px = (pan_time * self.pixels_per_second(timeline)) as f32;

        if self.phase != FollowPhase::Idle {
            self.enter_manual();
            self.phase = FollowPhase::Settling { since: now };
        }
    }

    /// Sets the zoom level keeping the current window centre.
    pub fn set_zoom(&mut self, zoom: f32, timeline: &Timeline) {
        let center = self.visible_window(timeline).center();
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        let pan_time = self.clamp_manual_pan_time(center - timeline.base_max_time() / 2.0, timeline);
        self.pan_offset_px = (pan_time * self.pixels_per_second(timeline)) as f32;
    }

    /// A zoom imposed by a paired component. Always wins over local state.
    pub fn apply_external_zoom(&mut self, zoom: f32) {
        if zoom.is_finite() {
            self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        }
    }

    /// Shows the whole timeline again.
    pub fn fit_to_data(&mut self) {
        self.zoom = 1.0;
        self.pan_offset_px = 0.0;
    }

    /// Advances the follow animation by one frame. Returns whether anything
    /// visible changed.
    pub fn tick(&mut self, now: Instant, timeline: &Timeline) -> bool {
        if let FollowPhase::Settling { since } = self.phase {
            if now.saturating_duration_since(since) >= self.cooldown {
                self.manual_pan_active = false;
                self.auto_follow = true;
                self.phase = if self.activity_active {
                    FollowPhase::AutoFollowing
                } else {
                    FollowPhase::Idle
                };
                log::debug!("Viewport cooldown elapsed, phase now {:?}", self.phase);
            }
        }

        if self.phase != FollowPhase::AutoFollowing {
            return false;
        }

        let pan_time_needed = timeline.desired_center() - timeline.base_max_time() / 2.0;
        let pan_time = self.clamp_follow_pan_time(pan_time_needed, timeline);
        let target = (pan_time * self.pixels_per_second(timeline)) as f32;

        let step = (target - self.pan_offset_px) * FOLLOW_EASING;
        if step.abs() < 0.01 {
            let changed = self.pan_offset_px != target;
            self.pan_offset_px = target;
            return changed;
        }
        self.pan_offset_px += step;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn following(timeline: &Timeline) -> ViewportController {
        let mut viewport = ViewportController::new();
        viewport.set_plot(PlotArea::new(1000.0, 300.0));
        viewport.set_activity_active(true);
        let now = Instant::now();
        for _ in 0..400 {
            viewport.tick(now, timeline);
        }
        viewport
    }

    #[test]
    fn full_zoom_shows_whole_timeline() {
        let viewport = ViewportController::new();
        let timeline = Timeline::new(30.0, 0.0);
        let window = viewport.visible_window(&timeline);
        assert!((window.min - 0.0).abs() < 1e-9);
        assert!((window.max - 30.0).abs() < 1e-9);
    }

    #[test]
    fn empty_timeline_has_ten_second_floor() {
        let viewport = ViewportController::new();
        let window = viewport.visible_window(&Timeline::default());
        assert!((window.range() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn activity_starts_follow() {
        let mut viewport = ViewportController::new();
        assert_eq!(viewport.phase(), FollowPhase::Idle);
        viewport.set_activity_active(true);
        assert_eq!(viewport.phase(), FollowPhase::AutoFollowing);
        viewport.set_activity_active(false);
        assert_eq!(viewport.phase(), FollowPhase::Idle);
    }

    #[test]
    fn follow_centres_on_current_time_when_zoomed() {
        let timeline = Timeline::new(40.0, 20.0);
        let mut viewport = ViewportController::new();
        viewport.set_plot(PlotArea::new(1000.0, 300.0));
        viewport.apply_external_zoom(4.0);
        viewport.set_activity_active(true);
        let now = Instant::now();
        for _ in 0..400 {
            viewport.tick(now, &timeline);
        }
        let window = viewport.visible_window(&timeline);
        assert!((window.center() - 20.0).abs() < 0.01, "{window:?}");
    }

    #[test]
    fn follow_stops_at_end_of_reference() {
        let mut viewport = ViewportController::new();
        viewport.apply_external_zoom(2.0);
        let timeline = Timeline::new(40.0, 44.0);
        let viewport = {
            viewport.set_plot(PlotArea::new(1000.0, 300.0));
            viewport.set_activity_active(true);
            let now = Instant::now();
            for _ in 0..400 {
                viewport.tick(now, &timeline);
            }
            viewport
        };
        let window = viewport.visible_window(&timeline);
        assert!((window.center() - 40.0).abs() < 0.01, "{window:?}");
        assert!(window.max <= timeline.base_max_time() + viewport.visible_range(&timeline) / 2.0);
    }

    #[test]
    fn early_playback_keeps_window_at_zero() {
        let timeline = Timeline::new(30.0, 3.0);
        let viewport = following(&timeline);
        let window = viewport.visible_window(&timeline);
        assert!(window.min.abs() < 1e-6);
    }

    #[test]
    fn drag_suspends_follow_until_cooldown() {
        let timeline = Timeline::new(60.0, 30.0);
        let mut viewport = following(&timeline);
        viewport.apply_external_zoom(2.0);
        let start = Instant::now();

        viewport.begin_drag(500.0);
        assert_eq!(viewport.phase(), FollowPhase::ManualPanning);
        assert!(!viewport.auto_follow());
        viewport.drag_to(600.0, &timeline);
        viewport.end_drag(start);
        assert!(matches!(viewport.phase(), FollowPhase::Settling { .. }));

        let offset = viewport.pan_offset_px();
        assert!(!viewport.tick(start + Duration::from_millis(500), &timeline));
        assert_eq!(viewport.pan_offset_px(), offset);

        viewport.tick(start + Duration::from_millis(2100), &timeline);
        assert_eq!(viewport.phase(), FollowPhase::AutoFollowing);
        assert!(viewport.auto_follow());
        assert!(!viewport.manual_pan_active());
    }

    #[test]
    fn drag_cannot_leave_timeline() {
        let timeline = Timeline::new(20.0, 0.0);
        let mut viewport = ViewportController::new();
        viewport.set_plot(PlotArea::new(1000.0, 300.0));
        viewport.apply_external_zoom(2.0);
        viewport.begin_drag(100.0);
        viewport.drag_to(5000.0, &timeline);
        let window = viewport.visible_window(&timeline);
        assert!(window.min.abs() < 1e-6);
        viewport.drag_to(-20000.0, &timeline);
        let window = viewport.visible_window(&timeline);
        assert!((window.max - 20.0).abs() < 1e-6);
    }

    #[test]
    fn wheel_zoom_keeps_time_under_cursor() {
        let timeline = Timeline::new(40.0, 0.0);
        let mut viewport = ViewportController::new();
        let plot = PlotArea::new(1000.0, 300.0);
        viewport.set_plot(plot);
        let cursor_x = plot.plot_left() + plot.plot_width() * 0.3;
        let before = plot.x_to_time(cursor_x, viewport.visible_window(&timeline));

        viewport.wheel_zoom(cursor_x, 5.0, &timeline, Instant::now());
        assert!(viewport.zoom() > 1.0);
        let after = plot.x_to_time(cursor_x, viewport.visible_window(&timeline));
        assert!((before - after).abs() < 1e-3, "{before} vs {after}");
    }

    #[test]
    fn zoom_is_bounded() {
        let timeline = Timeline::new(40.0, 0.0);
        let mut viewport = ViewportController::new();
        viewport.wheel_zoom(400.0, 100.0, &timeline, Instant::now());
        assert_eq!(viewport.zoom(), MAX_ZOOM);
        viewport.wheel_zoom(400.0, -100.0, &timeline, Instant::now());
        assert_eq!(viewport.zoom(), MIN_ZOOM);
        viewport.apply_external_zoom(9.0);
        assert_eq!(viewport.zoom(), MAX_ZOOM);
    }

    #[test]
    fn resizing_keeps_pan_seconds() {
        let timeline = Timeline::new(40.0, 0.0);
        let mut viewport = ViewportController::new();
        viewport.set_plot(PlotArea::new(1000.0, 300.0));
        viewport.apply_external_zoom(2.0);
        viewport.begin_drag(500.0);
        viewport.drag_to(300.0, &timeline);
        let before = viewport.visible_window(&timeline);
        viewport.set_plot(PlotArea::new(1600.0, 300.0));
        let after = viewport.visible_window(&timeline);
        assert!((before.min - after.min).abs() < 1e-3);
    }
}
