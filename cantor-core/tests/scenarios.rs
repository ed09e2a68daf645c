//! End-to-end behaviour of the pitch pipeline, graph layout and player sync.

use std::time::{Duration, Instant};

use cantor_core::activity::ActivityKind;
use cantor_core::alignment::{Alignment, LiveAppender, TimeAligner};
use cantor_core::compare::{ALIGNMENT_TOLERANCE_SECS, MISMATCH_THRESHOLD_CENTS, detect_mismatches};
use cantor_core::conditioner::{clamp_range, median_filter, moving_average, tension_smooth};
use cantor_core::pitch::DetectedPitch;
use cantor_core::render::{CurveOptions, FrequencyAxis, SceneInput, render_scene};
use cantor_core::session::{PracticeSession, SessionEvent};
use cantor_core::sync::{EngineId, PlaybackEngine, PlaybackSynchronizer, SYNC_SUPPRESSION, SeekOutcome};
use cantor_core::viewport::{MAX_ZOOM, MIN_ZOOM, PlotArea, TimeWindow, Timeline, ViewportController};
use cantor_core::{PitchSample, PitchSeries, SeriesKind};

fn wobbly_series() -> Vec<PitchSample> {
    let mut samples = Vec::new();
    for i in 0..40 {
        let time = i as f64 * 0.05;
        let sample = match i % 7 {
            0 => PitchSample::unvoiced(time),
            1 => PitchSample::voiced(time, 40.0, 0.4),
            2 => PitchSample::voiced(time, 900.0, 0.6),
            _ => PitchSample::voiced(time, 180.0 + (i as f32 * 1.7).sin() * 30.0, 0.9),
        };
        samples.push(sample);
    }
    samples
}

#[test]
fn live_series_is_monotonic() {
    let start = Instant::now();
    let mut session = PracticeSession::default();
    session.start(ActivityKind::Recording, start).unwrap();

    // Bursty and out-of-order delivery offsets, in milliseconds.
    let offsets = [10, 40, 35, 41, 90, 90, 120, 119, 200, 260, 255, 400];
    for ms in offsets {
        let detected = DetectedPitch {
            frequency: Some(200.0),
            confidence: 0.9,
            midi: None,
        };
        session.on_pitch(&detected, start + Duration::from_millis(ms));
    }

    for series in [session.live_raw(), session.live()] {
        let samples = series.samples();
        assert!(samples.len() > 3);
        assert!(samples.windows(2).all(|w| w[1].time >= w[0].time));
    }
}

#[test]
fn clamp_is_idempotent() {
    let series = wobbly_series();
    let once = clamp_range(&series, 80.0, 350.0);
    let twice = clamp_range(&once, 80.0, 350.0);
    assert_eq!(once, twice);
    assert!(once.iter().all(|s| s.voiced_frequency().is_none_or(|f| (80.0..=350.0).contains(&f))));
}

#[test]
fn smoothing_keeps_endpoints() {
    let series: Vec<PitchSample> = wobbly_series().into_iter().filter(|s| s.is_voiced()).collect();
    for tension in [0.0, 0.3, 0.8, 1.0, 1.7] {
        for passes in [0, 1, 2, 5] {
            let smoothed = tension_smooth(&series, tension, passes);
            assert_eq!(smoothed.first().unwrap().frequency, series.first().unwrap().frequency);
            assert_eq!(smoothed.last().unwrap().frequency, series.last().unwrap().frequency);
        }
    }
    let pair = [PitchSample::voiced(0.0, 200.0, 1.0), PitchSample::voiced(0.1, 300.0, 1.0)];
    assert_eq!(tension_smooth(&pair, 0.8, 2), pair.to_vec());
}

#[test]
fn short_series_is_untouched() {
    let series = vec![
        PitchSample::voiced(0.0, 200.0, 0.9),
        PitchSample::voiced(0.1, 400.0, 0.9),
        PitchSample::voiced(0.2, 210.0, 0.9),
    ];
    assert_eq!(median_filter(&series, 5), series);
    assert_eq!(moving_average(&series, 4), series);
}

#[test]
fn viewport_window_stays_in_bounds() {
    let mut viewport = ViewportController::new();
    viewport.set_plot(PlotArea::new(900.0, 300.0));
    let timelines = [
        Timeline::new(0.0, 0.0),
        Timeline::new(30.0, 0.0),
        Timeline::new(30.0, 29.0),
        Timeline::new(30.0, 36.0),
        Timeline::new(0.0, 42.0),
    ];
    let zooms = [MIN_ZOOM, 0.75, 1.0, 1.5, 2.0, 3.3, MAX_ZOOM];
    let offsets = [-1e6, -5000.0, -120.0, 0.0, 33.0, 800.0, 1e6];

    for timeline in &timelines {
        for &zoom in &zooms {
            for &offset in &offsets {
                viewport.apply_external_zoom(zoom);
                viewport.set_pan_offset_px(offset);
                let window = viewport.visible_window(timeline);
                let range = viewport.visible_range(timeline);
                assert!(window.min >= -1e-9, "{window:?} {zoom} {offset}");
                assert!(
                    window.max <= timeline.base_max_time() + range / 2.0 + 1e-9,
                    "{window:?} {zoom} {offset}"
                );
            }
        }
    }
}

#[test]
fn pixel_round_trip_for_click_to_seek() {
    let plot = PlotArea::new(1000.0, 300.0);
    let window = TimeWindow { min: 12.0, max: 27.0 };
    let resolution = plot.seconds_per_pixel(window);
    let mut time = window.min;
    while time <= window.max {
        let back = plot.x_to_time(plot.time_to_x(time, window), window);
        assert!((back - time).abs() <= resolution, "{time} -> {back}");
        time += 0.37;
    }
}

#[test]
fn off_window_points_clamp_to_plot_edges() {
    let plot = PlotArea::new(1000.0, 300.0);
    let window = TimeWindow { min: 10.0, max: 20.0 };
    assert_eq!(plot.time_to_x(3.0, window), plot.padding_left);
    assert_eq!(plot.time_to_x(25.0, window), plot.width - plot.padding_right);

    let reference = [
        PitchSample::voiced(2.0, 200.0, 0.9),
        PitchSample::voiced(15.0, 210.0, 0.9),
        PitchSample::voiced(40.0, 220.0, 0.9),
    ];
    let scene = render_scene(&SceneInput {
        plot,
        window,
        reference: &reference,
        live: &[],
        current_time: None,
        audio_duration: None,
        markers: &[],
        regions: &[],
        axis: FrequencyAxis::Auto,
        options: CurveOptions::default(),
    });
    for segment in scene.reference.iter() {
        for point in &segment.points {
            assert!(point.x >= plot.padding_left && point.x <= plot.width - plot.padding_right);
        }
    }
}

#[test]
fn whole_tone_off_is_flagged_and_small_error_is_not() {
    let reference = [PitchSample::voiced(5.0, 220.0, 0.9)];

    let sharp = [PitchSample::voiced(5.02, 247.0, 0.9)];
    let found = detect_mismatches(&reference, &sharp, ALIGNMENT_TOLERANCE_SECS, MISMATCH_THRESHOLD_CENTS);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].time, 5.02);
    assert!(found[0].cents > MISMATCH_THRESHOLD_CENTS);

    let close = [PitchSample::voiced(5.02, 225.0, 0.9)];
    let found = detect_mismatches(&reference, &close, ALIGNMENT_TOLERANCE_SECS, MISMATCH_THRESHOLD_CENTS);
    assert!(found.is_empty());
}

#[test]
fn near_duplicate_live_sample_is_dropped() {
    let mut appender = LiveAppender::new();
    appender.push(PitchSample::voiced(1.000, 210.0, 0.9));
    appender.push(PitchSample::voiced(1.015, 212.0, 0.9));
    assert_eq!(appender.samples().len(), 1);
    assert_eq!(appender.samples()[0].time, 1.000);
}

#[test]
fn overrun_clamps_then_force_stops() {
    let start = Instant::now();
    let aligner = TimeAligner::new(start, Some(10.0));
    match aligner.map(start + Duration::from_millis(11_500)) {
        Alignment::Mapped(t) => assert!((t - 11.0).abs() < 1e-9),
        other => panic!("expected a mapped time, got {other:?}"),
    }
    assert!(matches!(
        aligner.map(start + Duration::from_millis(12_100)),
        Alignment::ForceStop { .. }
    ));

    let mut session = PracticeSession::default();
    let reference = (0..50).map(|i| PitchSample::voiced(i as f64 * 0.2, 220.0, 0.9)).collect();
    session.set_reference(PitchSeries::from_samples(SeriesKind::Reference, reference), Some(10.0));
    session.start(ActivityKind::Practicing, start).unwrap();
    let detected = DetectedPitch {
        frequency: Some(230.0),
        confidence: 0.9,
        midi: None,
    };
    assert!(session.on_pitch(&detected, start + Duration::from_millis(11_500)).is_none());
    assert!((session.live_raw().last().unwrap().time - 11.0).abs() < 1e-9);
    assert!(matches!(
        session.on_pitch(&detected, start + Duration::from_millis(12_100)),
        Some(SessionEvent::ForceStopped { .. })
    ));
    assert!(!session.state().is_active());
    assert_eq!(session.live_raw().len(), 1);
}

#[derive(Default)]
struct CountingEngine {
    duration: f64,
    position: f64,
    seek_calls: usize,
    playing: bool,
}

impl PlaybackEngine for CountingEngine {
    fn play(&mut self) -> cantor_core::Result<()> {
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn seek_to(&mut self, fraction: f64) {
        self.seek_calls += 1;
        self.position = fraction * self.duration;
    }

    fn current_time(&self) -> f64 {
        self.position
    }

    fn duration(&self) -> Option<f64> {
        Some(self.duration)
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn has_finished(&self) -> bool {
        self.position >= self.duration
    }
}

#[test]
fn mirrored_seek_does_not_echo_back() {
    let a = CountingEngine {
        duration: 20.0,
        ..CountingEngine::default()
    };
    let b = CountingEngine {
        duration: 25.0,
        ..CountingEngine::default()
    };
    let mut sync = PlaybackSynchronizer::new(a, b);
    let now = Instant::now();

    sync.user_seek(EngineId::Reference, 0.4, now);
    assert_eq!(sync.reference().seek_calls, 1);
    assert_eq!(sync.student().seek_calls, 1);
    assert!((sync.student().current_time() - 10.0).abs() < 1e-9);
    assert!(sync.is_syncing(EngineId::Student, now));

    // B's own seek handler fires inside the window.
    let outcome = sync.on_seek_event(EngineId::Student, 0.4, now + SYNC_SUPPRESSION / 2);
    assert_eq!(outcome, SeekOutcome::Suppressed);
    assert_eq!(sync.reference().seek_calls, 1);
}
