//! # Dual-Curve Renderer
//!
//! Turns the two pitch contours, the visible window and the overlays into a
//! [`Scene`]: a flat list of pixel-space primitives. The GUI canvas only has
//! to stroke and fill what it finds here, which keeps every layout rule in
//! this module and testable without a window.

use crate::compare::{ALIGNMENT_TOLERANCE_SECS, MISMATCH_THRESHOLD_CENTS, detect_mismatches};
use crate::marker::{Marker, Region, Severity};
use crate::sample::{PitchSample, nearest_note};
use crate::viewport::{PlotArea, TimeWindow};

/// Upper limit of the auto-ranged frequency axis. Human voice display never
/// needs more, and a single octave error should not squash the whole graph.
pub const AUTO_RANGE_CEILING_HZ: f32 = 600.0;

/// Band used by the auto axis before any voiced sample exists.
pub const DEFAULT_AXIS_BAND: (f32, f32) = (80.0, 400.0);

/// Samples above this confidence are drawn solid, the rest dashed.
pub const SOLID_CONFIDENCE: f32 = 0.5;

/// Gaps wider than this multiple of the expected point spacing become an
/// explicit bridge segment.
pub const BRIDGE_SPACING_FACTOR: f32 = 2.0;

/// How the frequency axis is scaled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrequencyAxis {
    /// Fit the voiced data with some headroom, capped at [`AUTO_RANGE_CEILING_HZ`].
    Auto,
    /// A locked band so the axis does not jump while singing.
    Fixed { min_hz: f32, max_hz: f32 },
}

impl FrequencyAxis {
    /// The `(min, max)` band for the given data.
    pub fn resolve(&self, curves: &[&[PitchSample]]) -> (f32, f32) {
        match *self {
            FrequencyAxis::Fixed { min_hz, max_hz } => {
                let lo = min_hz.min(max_hz).max(0.0);
                let hi = min_hz.max(max_hz);
                if hi - lo < 1.0 { (lo, lo + 1.0) } else { (lo, hi) }
            }
            FrequencyAxis::Auto => {
                let bounds = curves
                    .iter()
                    .flat_map(|curve| curve.iter().filter_map(PitchSample::voiced_frequency))
                    .fold(None, |acc: Option<(f32, f32)>, f| match acc {
                        None => Some((f, f)),
                        Some((lo, hi)) => Some((lo.min(f), hi.max(f))),
                    });
                let Some((lo, hi)) = bounds else {
                    return DEFAULT_AXIS_BAND;
                };
                let headroom = ((hi - lo) * 0.1).max(10.0);
                let hi = (hi + headroom).min(AUTO_RANGE_CEILING_HZ);
                let lo = (lo - headroom).max(0.0).min(hi - 20.0).max(0.0);
                (lo, hi.max(lo + 20.0))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveOptions {
    /// Draw across unvoiced gaps instead of breaking the line.
    pub bridge_gaps: bool,
    /// Continue the reference flat to the end of the audio.
    pub extend_reference: bool,
    pub show_mismatches: bool,
}

impl Default for CurveOptions {
    fn default() -> Self {
        Self {
            bridge_gaps: false,
            extend_reference: true,
            show_mismatches: true,
        }
    }
}

/// Everything needed to lay out one frame.
#[derive(Debug, Clone, Copy)]
pub struct SceneInput<'a> {
    pub plot: PlotArea,
    pub window: TimeWindow,
    pub reference: &'a [PitchSample],
    pub live: &'a [PitchSample],
    pub current_time: Option<f64>,
    pub audio_duration: Option<f64>,
    pub markers: &'a [Marker],
    pub regions: &'a [Region],
    pub axis: FrequencyAxis,
    pub options: CurveOptions,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenePoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeKind {
    /// Confident detection.
    Solid,
    /// Low confidence: dashed and semi-transparent in the same hue.
    Tentative,
    /// Straight connection across a gap in the data.
    Bridge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurveSegment {
    pub kind: StrokeKind,
    pub points: Vec<ScenePoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridLine {
    /// x for time lines, y for frequency lines.
    pub position: f32,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerGlyph {
    pub x: f32,
    pub time: f64,
    pub severity: Severity,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MismatchGlyph {
    pub x: f32,
    pub y: f32,
    pub time: f64,
    pub cents: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionRect {
    pub x_start: f32,
    pub x_end: f32,
    pub score: Option<f32>,
}

/// A laid-out frame of the pitch graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub plot: PlotArea,
    pub window: TimeWindow,
    pub frequency_range: (f32, f32),
    pub time_grid: Vec<GridLine>,
    pub frequency_grid: Vec<GridLine>,
    pub regions: Vec<RegionRect>,
    pub reference: Vec<CurveSegment>,
    pub live: Vec<CurveSegment>,
    pub cursor_x: Option<f32>,
    pub markers: Vec<MarkerGlyph>,
    pub mismatches: Vec<MismatchGlyph>,
}

impl Scene {
    /// The marker whose glyph lies within `tolerance_px` of `x`, closest first.
    pub fn hit_test_marker(&self, x: f32, tolerance_px: f32) -> Option<&MarkerGlyph> {
        self.markers
            .iter()
            .filter(|m| (m.x - x).abs() <= tolerance_px)
            .min_by(|a, b| {
                (a.x - x)
                    .abs()
                    .partial_cmp(&(b.x - x).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Timeline position under a pixel, for click-to-seek.
    pub fn time_at(&self, x: f32) -> f64 {
        self.plot.x_to_time(x, self.window)
    }
}

/// Lays out one frame.
pub fn render_scene(input: &SceneInput<'_>) -> Scene {
    let plot = input.plot;
    let window = input.window;
    let frequency_range = input.axis.resolve(&[input.reference, input.live]);

    let mut reference = build_curve(input.reference, &plot, window, frequency_range, input.options);
    if input.options.extend_reference {
        if let Some(duration) = input.audio_duration {
            extend_to_duration(&mut reference, input.reference, &plot, window, frequency_range, duration);
        }
    }
    let live = build_curve(input.live, &plot, window, frequency_range, input.options);

    let cursor_x = input
        .current_time
        .filter(|t| window.contains(*t))
        .map(|t| plot.time_to_x(t, window));

    let markers = input
        .markers
        .iter()
        .filter(|m| window.contains(m.time))
        .map(|m| MarkerGlyph {
            x: plot.time_to_x(m.time, window),
            time: m.time,
            severity: m.severity,
            label: m.label.clone(),
        })
        .collect();

    let regions = input
        .regions
        .iter()
        .filter(|r| r.end >= window.min && r.start <= window.max)
        .map(|r| RegionRect {
            x_start: plot.time_to_x(r.start, window),
            x_end: plot.time_to_x(r.end, window),
            score: r.score,
        })
        .collect();

    let mismatches = if input.options.show_mismatches {
        let (min_hz, max_hz) = frequency_range;
        detect_mismatches(
            input.reference,
            visible_slice(input.live, window),
            ALIGNMENT_TOLERANCE_SECS,
            MISMATCH_THRESHOLD_CENTS,
        )
        .into_iter()
        .filter(|m| window.contains(m.time))
        .map(|m| MismatchGlyph {
            x: plot.time_to_x(m.time, window),
            y: plot.frequency_to_y(m.live_frequency, min_hz, max_hz),
            time: m.time,
            cents: m.cents,
        })
        .collect()
    } else {
        Vec::new()
    };

    Scene {
        plot,
        window,
        frequency_range,
        time_grid: time_grid(&plot, window),
        frequency_grid: frequency_grid(&plot, frequency_range),
        regions,
        reference,
        live,
        cursor_x,
        markers,
        mismatches,
    }
}

/// The samples inside the window plus one neighbour on each side, so lines
/// still reach the plot edges.
fn visible_slice(samples: &[PitchSample], window: TimeWindow) -> &[PitchSample] {
    let start = samples.partition_point(|s| s.time < window.min).saturating_sub(1);
    let end = (samples.partition_point(|s| s.time <= window.max) + 1).min(samples.len());
    if start >= end { &[] } else { &samples[start..end] }
}

fn stroke_for(confidence: f32) -> StrokeKind {
    if confidence > SOLID_CONFIDENCE {
        StrokeKind::Solid
    } else {
        StrokeKind::Tentative
    }
}

/// Average horizontal distance between consecutive visible samples.
fn expected_spacing(samples: &[PitchSample], plot: &PlotArea, window: TimeWindow) -> f32 {
    if samples.len() < 2 {
        return f32::INFINITY;
    }
    let span = samples[samples.len() - 1].time - samples[0].time;
    let dt = span / (samples.len() - 1) as f64;
    (dt / plot.seconds_per_pixel(window)) as f32
}

fn build_curve(
    samples: &[PitchSample],
    plot: &PlotArea,
    window: TimeWindow,
    (min_hz, max_hz): (f32, f32),
    options: CurveOptions,
) -> Vec<CurveSegment> {
    let samples = visible_slice(samples, window);
    let spacing = expected_spacing(samples, plot, window);

    let mut segments = Vec::new();
    let mut current: Option<CurveSegment> = None;
    let mut last_point: Option<ScenePoint> = None;
    let mut in_gap = false;

    for sample in samples {
        let Some(frequency) = sample.voiced_frequency() else {
            if let Some(segment) = current.take() {
                segments.push(segment);
            }
            in_gap = true;
            continue;
        };

        let point = ScenePoint {
            x: plot.time_to_x(sample.time, window),
            y: plot.frequency_to_y(frequency, min_hz, max_hz),
        };
        let kind = stroke_for(sample.confidence);

        match (in_gap, last_point) {
            (true, Some(previous)) if options.bridge_gaps => {
                if point.x - previous.x > spacing * BRIDGE_SPACING_FACTOR {
                    segments.push(CurveSegment {
                        kind: StrokeKind::Bridge,
                        points: vec![previous, point],
                    });
                    current = Some(CurveSegment { kind, points: vec![point] });
                } else {
                    current = Some(CurveSegment {
                        kind,
                        points: vec![previous, point],
                    });
                }
            }
            (true, _) => {
                current = Some(CurveSegment { kind, points: vec![point] });
            }
            (false, _) => match current.as_mut() {
                Some(segment) if segment.kind == kind => segment.points.push(point),
                Some(segment) => {
                    // Style change: start the new stroke where the old one ended.
                    let joint = segment.points.last().copied().unwrap_or(point);
                    if let Some(done) = current.replace(CurveSegment {
                        kind,
                        points: vec![joint, point],
                    }) {
                        segments.push(done);
                    }
                }
                None => current = Some(CurveSegment { kind, points: vec![point] }),
            },
        }

        in_gap = false;
        last_point = Some(point);
    }

    if let Some(segment) = current {
        segments.push(segment);
    }
    segments
}

/// Draws the reference flat from its last voiced sample to the end of the
/// audio when extraction stopped early.
fn extend_to_duration(
    segments: &mut Vec<CurveSegment>,
    samples: &[PitchSample],
    plot: &PlotArea,
    window: TimeWindow,
    (min_hz, max_hz): (f32, f32),
    duration: f64,
) {
    let Some(last) = samples.iter().rev().find(|s| s.is_voiced()) else {
        return;
    };
    let Some(frequency) = last.voiced_frequency() else {
        return;
    };
    if duration <= last.time || window.max < last.time || window.min > duration {
        return;
    }
    let y = plot.frequency_to_y(frequency, min_hz, max_hz);
    segments.push(CurveSegment {
        kind: stroke_for(last.confidence),
        points: vec![
            ScenePoint { x: plot.time_to_x(last.time, window), y },
            ScenePoint { x: plot.time_to_x(duration, window), y },
        ],
    });
}

const TIME_STEPS: [f64; 9] = [0.5, 1.0, 2.0, 5.0, 10.0, 15.0, 30.0, 60.0, 120.0];
const FREQUENCY_STEPS: [f32; 6] = [10.0, 25.0, 50.0, 100.0, 200.0, 500.0];

fn time_grid(plot: &PlotArea, window: TimeWindow) -> Vec<GridLine> {
    let step = TIME_STEPS
        .iter()
        .copied()
        .find(|step| window.range() / step <= 10.0)
        .unwrap_or(300.0);
    let first = (window.min / step).ceil() as i64;
    let last = (window.max / step).floor() as i64;
    (first..=last)
        .map(|i| {
            let time = i as f64 * step;
            GridLine {
                position: plot.time_to_x(time, window),
                label: format_time(time),
            }
        })
        .collect()
}

fn frequency_grid(plot: &PlotArea, (min_hz, max_hz): (f32, f32)) -> Vec<GridLine> {
    let step = FREQUENCY_STEPS
        .iter()
        .copied()
        .find(|step| (max_hz - min_hz) / step <= 8.0)
        .unwrap_or(1000.0);
    let first = (min_hz / step).ceil() as i32;
    let last = (max_hz / step).floor() as i32;
    (first..=last)
        .map(|i| {
            let frequency = i as f32 * step;
            let label = match nearest_note(frequency) {
                Some((note, _)) => format!("{frequency:.0} Hz {note}"),
                None => format!("{frequency:.0} Hz"),
            };
            GridLine {
                position: plot.frequency_to_y(frequency, min_hz, max_hz),
                label,
            }
        })
        .collect()
}

/// `m:ss`, with a decimal when the value is not a whole second.
pub fn format_time(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let minutes = (seconds / 60.0).floor() as u64;
    let rest = seconds - minutes as f64 * 60.0;
    if (rest - rest.round()).abs() < 1e-6 {
        format!("{minutes}:{:02}", rest.round() as u64)
    } else {
        format!("{minutes}:{:04.1}", rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(min: f64, max: f64) -> TimeWindow {
        TimeWindow { min, max }
    }

    fn input<'a>(reference: &'a [PitchSample], live: &'a [PitchSample], w: TimeWindow) -> SceneInput<'a> {
        SceneInput {
            plot: PlotArea::new(1000.0, 300.0),
            window: w,
            reference,
            live,
            current_time: None,
            audio_duration: None,
            markers: &[],
            regions: &[],
            axis: FrequencyAxis::Fixed { min_hz: 60.0, max_hz: 600.0 },
            options: CurveOptions {
                extend_reference: false,
                ..CurveOptions::default()
            },
        }
    }

    fn track(points: &[(f64, Option<f32>, f32)]) -> Vec<PitchSample> {
        points
            .iter()
            .map(|&(time, frequency, confidence)| PitchSample { time, frequency, confidence })
            .collect()
    }

    #[test]
    fn auto_axis_is_capped() {
        let data = track(&[(0.0, Some(150.0), 0.9), (1.0, Some(900.0), 0.9)]);
        let (lo, hi) = FrequencyAxis::Auto.resolve(&[&data]);
        assert_eq!(hi, AUTO_RANGE_CEILING_HZ);
        assert!(lo < 150.0);
    }

    #[test]
    fn auto_axis_without_data_uses_default_band() {
        assert_eq!(FrequencyAxis::Auto.resolve(&[&[]]), DEFAULT_AXIS_BAND);
    }

    #[test]
    fn unvoiced_sample_breaks_the_line() {
        let data = track(&[
            (0.0, Some(200.0), 0.9),
            (0.1, Some(205.0), 0.9),
            (0.2, None, 0.0),
            (0.3, Some(210.0), 0.9),
            (0.4, Some(215.0), 0.9),
        ]);
        let scene = render_scene(&input(&data, &[], window(0.0, 10.0)));
        assert_eq!(scene.reference.len(), 2);
        assert_eq!(scene.reference[0].points.len(), 2);
        assert_eq!(scene.reference[1].points.len(), 2);
    }

    #[test]
    fn wide_gap_is_bridged_when_enabled() {
        let mut data = track(&[(0.0, Some(200.0), 0.9), (0.1, Some(200.0), 0.9), (0.2, Some(200.0), 0.9)]);
        data.push(PitchSample::unvoiced(0.3));
        data.push(PitchSample::voiced(3.0, 220.0, 0.9));
        let mut scene_input = input(&data, &[], window(0.0, 10.0));
        scene_input.options.bridge_gaps = true;
        let scene = render_scene(&scene_input);
        assert!(scene.reference.iter().any(|s| s.kind == StrokeKind::Bridge));
    }

    #[test]
    fn confidence_selects_stroke() {
        let data = track(&[
            (0.0, Some(200.0), 0.9),
            (0.1, Some(200.0), 0.9),
            (0.2, Some(200.0), 0.3),
            (0.3, Some(200.0), 0.3),
        ]);
        let scene = render_scene(&input(&[], &data, window(0.0, 10.0)));
        let kinds: Vec<StrokeKind> = scene.live.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![StrokeKind::Solid, StrokeKind::Tentative]);
        // The dashed part starts where the solid part ended.
        assert_eq!(scene.live[1].points[0], *scene.live[0].points.last().unwrap());
    }

    #[test]
    fn points_outside_window_are_clamped_to_edges() {
        let data = track(&[(1.0, Some(200.0), 0.9), (5.0, Some(200.0), 0.9), (20.0, Some(200.0), 0.9)]);
        let scene = render_scene(&input(&data, &[], window(4.0, 8.0)));
        let plot = scene.plot;
        let xs: Vec<f32> = scene.reference[0].points.iter().map(|p| p.x).collect();
        assert_eq!(xs[0], plot.plot_left());
        assert_eq!(xs[2], plot.plot_right());
        for x in xs {
            assert!(x >= plot.plot_left() && x <= plot.plot_right());
        }
    }

    #[test]
    fn reference_extends_to_duration() {
        let data = track(&[(0.0, Some(200.0), 0.9), (8.0, Some(210.0), 0.9)]);
        let mut scene_input = input(&data, &[], window(0.0, 10.0));
        scene_input.options.extend_reference = true;
        scene_input.audio_duration = Some(10.0);
        let scene = render_scene(&scene_input);
        let tail = scene.reference.last().unwrap();
        assert_eq!(tail.points.len(), 2);
        assert_eq!(tail.points[0].y, tail.points[1].y);
        assert_eq!(tail.points[1].x, scene.plot.plot_right());
    }

    #[test]
    fn cursor_only_inside_window() {
        let mut scene_input = input(&[], &[], window(0.0, 10.0));
        scene_input.current_time = Some(5.0);
        let scene = render_scene(&scene_input);
        let plot = scene.plot;
        let expected = plot.plot_left() + plot.plot_width() / 2.0;
        assert!((scene.cursor_x.unwrap() - expected).abs() < 1e-3);

        scene_input.current_time = Some(12.0);
        assert!(render_scene(&scene_input).cursor_x.is_none());
    }

    #[test]
    fn mismatch_glyphs_follow_live_curve() {
        let reference = track(&[(5.0, Some(220.0), 0.9)]);
        let live = track(&[(5.02, Some(247.0), 0.9), (6.0, Some(300.0), 0.9)]);
        let scene = render_scene(&input(&reference, &live, window(0.0, 10.0)));
        assert_eq!(scene.mismatches.len(), 1);
        assert_eq!(scene.mismatches[0].time, 5.02);
    }

    #[test]
    fn markers_hit_test() {
        let markers = [Marker::new(2.0, Severity::High), Marker::new(20.0, Severity::Low)];
        let mut scene_input = input(&[], &[], window(0.0, 10.0));
        scene_input.markers = &markers;
        let scene = render_scene(&scene_input);
        assert_eq!(scene.markers.len(), 1);
        let x = scene.markers[0].x;
        assert_eq!(scene.hit_test_marker(x + 3.0, 6.0).map(|m| m.time), Some(2.0));
        assert!(scene.hit_test_marker(x + 30.0, 6.0).is_none());
    }

    #[test]
    fn grid_labels() {
        let scene = render_scene(&input(&[], &[], window(0.0, 30.0)));
        assert_eq!(scene.time_grid.first().unwrap().label, "0:00");
        assert!(scene.frequency_grid.iter().any(|g| g.label.starts_with("100 Hz")));
        assert_eq!(format_time(75.0), "1:15");
        assert_eq!(format_time(2.5), "0:02.5");
    }
}
