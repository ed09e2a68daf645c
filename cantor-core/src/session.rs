//! # Practice Session
//!
//! Owns everything one practice screen shows: the reference contour, the
//! live contour, the activity state, recorded audio and score overlays.
//! The GUI feeds capture events and clock ticks in, and reads series and
//! the current time out.
//!
//! Every change that should reach the screen bumps a generation counter.
//! Graphs compare it with the generation they last drew to know when to
//! clear their cache.

use std::time::Instant;

use crate::activity::{ActivityCommand, ActivityKind, ActivityState, transition};
use crate::alignment::{Alignment, LiveAppender, OVERRUN_FACTOR, TimeAligner};
use crate::conditioner::{LiveConditioning, ReferenceConditioning};
use crate::error::Result;
use crate::marker::{Marker, Region};
use crate::pitch::DetectedPitch;
use crate::sample::{PitchSample, PitchSeries, SeriesKind};
use crate::viewport::Timeline;

/// Something the caller has to act on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionEvent {
    /// The activity ran past the hard stop and was ended. Capture and
    /// playback must be torn down.
    ForceStopped { elapsed: f64 },
}

#[derive(Debug, Clone)]
pub struct PracticeSession {
    reference_raw: PitchSeries,
    reference: PitchSeries,
    reference_duration: Option<f64>,
    reference_available: bool,
    live: LiveAppender,
    live_conditioned: PitchSeries,
    live_conditioning: LiveConditioning,
    reference_conditioning: ReferenceConditioning,
    aligner: Option<TimeAligner>,
    state: ActivityState,
    recorded: Vec<f32>,
    recording_rate: u32,
    markers: Vec<Marker>,
    regions: Vec<Region>,
    /// Time shown while no activity drives it.
    resting_time: f64,
    playback_position: f64,
    generation: u64,
}

impl Default for PracticeSession {
    fn default() -> Self {
        Self::new(LiveConditioning::default(), ReferenceConditioning::default())
    }
}

impl PracticeSession {
    pub fn new(live_conditioning: LiveConditioning, reference_conditioning: ReferenceConditioning) -> Self {
        Self {
            reference_raw: PitchSeries::new(SeriesKind::Reference),
            reference: PitchSeries::new(SeriesKind::Reference),
            reference_duration: None,
            reference_available: false,
            live: LiveAppender::new(),
            live_conditioned: PitchSeries::new(SeriesKind::Live),
            live_conditioning,
            reference_conditioning,
            aligner: None,
            state: ActivityState::Idle,
            recorded: Vec::new(),
            recording_rate: 44_100,
            markers: Vec::new(),
            regions: Vec::new(),
            resting_time: 0.0,
            playback_position: 0.0,
            generation: 0,
        }
    }

    pub fn state(&self) -> ActivityState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forces the next frame to redraw.
    pub fn invalidate(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Whether the graph has anything to animate or show.
    pub fn needs_redraw(&self) -> bool {
        self.state.is_active() || !self.reference.is_empty() || !self.live.series().is_empty()
    }

    /// Conditioned reference contour.
    pub fn reference(&self) -> &PitchSeries {
        &self.reference
    }

    pub fn reference_raw(&self) -> &PitchSeries {
        &self.reference_raw
    }

    pub fn reference_duration(&self) -> Option<f64> {
        self.reference_duration
    }

    /// False when extraction failed and the reference curve is missing.
    pub fn reference_available(&self) -> bool {
        self.reference_available
    }

    /// Conditioned live contour.
    pub fn live(&self) -> &PitchSeries {
        &self.live_conditioned
    }

    pub fn live_raw(&self) -> &PitchSeries {
        self.live.series()
    }

    pub fn recorded(&self) -> &[f32] {
        &self.recorded
    }

    pub fn recording_rate(&self) -> u32 {
        self.recording_rate
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Swaps in a new reference. Live data belongs to the old one and is
    /// dropped together with its score overlays.
    pub fn set_reference(&mut self, series: PitchSeries, duration: Option<f64>) {
        self.reference_available = !series.is_empty();
        self.reference = PitchSeries::from_samples(
            SeriesKind::Reference,
            self.reference_conditioning.apply(series.samples()),
        );
        self.reference_raw = series;
        self.reference_duration = duration.filter(|d| d.is_finite() && *d > 0.0);
        self.clear_live();
        self.markers.clear();
        self.regions.clear();
        self.resting_time = 0.0;
        self.invalidate();
        log::info!(
            "Reference set: {} samples, duration {:?}",
            self.reference.len(),
            self.reference_duration
        );
    }

    /// Re-applies conditioning with new parameters.
    pub fn set_conditioning(&mut self, live: LiveConditioning, reference: ReferenceConditioning) {
        self.live_conditioning = live;
        self.reference_conditioning = reference;
        self.reference.replace(reference.apply(self.reference_raw.samples()));
        self.recondition_live();
        self.invalidate();
    }

    pub fn set_score_overlays(&mut self, markers: Vec<Marker>, regions: Vec<Region>) {
        self.markers = markers;
        self.regions = regions;
        self.invalidate();
    }

    fn clear_live(&mut self) {
        self.live.clear();
        self.live_conditioned.clear();
        self.recorded.clear();
    }

    fn recondition_live(&mut self) {
        let conditioned = self.live_conditioning.apply(self.live.samples());
        self.live_conditioned.replace(conditioned);
    }

    /// Starts an activity. Capturing activities clear the previous live
    /// take; the reference is never touched.
    pub fn start(&mut self, kind: ActivityKind, now: Instant) -> Result<()> {
        let next = transition(self.state, ActivityCommand::Start(kind), now)?;
        if kind.captures() {
            self.clear_live();
            let duration = if kind.follows_reference() {
                self.reference_duration
            } else {
                None
            };
            self.aligner = Some(TimeAligner::new(now, duration));
        } else {
            self.aligner = None;
            self.playback_position = 0.0;
        }
        self.state = next;
        self.invalidate();
        log::info!("Activity started: {kind:?}");
        Ok(())
    }

    /// Stops the running activity. Plotted data stays.
    pub fn stop(&mut self, now: Instant) -> Result<()> {
        self.freeze_time(now);
        self.state = transition(self.state, ActivityCommand::Stop, now)?;
        self.aligner = None;
        self.invalidate();
        Ok(())
    }

    /// The reference player finished. Time resets to zero, data stays.
    pub fn on_playback_ended(&mut self, now: Instant) -> Result<()> {
        let next = transition(self.state, ActivityCommand::PlaybackEnded, now)?;
        if !next.is_active() {
            self.aligner = None;
            self.resting_time = 0.0;
            self.playback_position = 0.0;
        }
        self.state = next;
        self.invalidate();
        Ok(())
    }

    fn force_stop(&mut self, elapsed: f64, now: Instant) -> Option<SessionEvent> {
        let last_time = match self.aligner.and_then(|a| a.reference_duration()) {
            Some(duration) => elapsed.min(duration * OVERRUN_FACTOR),
            None => elapsed,
        };
        self.freeze_time_at(last_time);
        self.state = transition(self.state, ActivityCommand::ForceStop, now).ok()?;
        self.aligner = None;
        self.invalidate();
        log::info!("Activity force-stopped after {elapsed:.2}s");
        Some(SessionEvent::ForceStopped { elapsed })
    }

    fn freeze_time(&mut self, now: Instant) {
        let time = self.current_time(now);
        self.freeze_time_at(time);
    }

    fn freeze_time_at(&mut self, time: f64) {
        self.resting_time = time;
    }

    fn is_capturing(&self) -> bool {
        self.state.kind().is_some_and(ActivityKind::captures)
    }

    /// Adds one extracted pitch to the live contour.
    pub fn on_pitch(&mut self, detected: &DetectedPitch, at: Instant) -> Option<SessionEvent> {
        if !self.is_capturing() {
            return None;
        }
        let aligner = self.aligner?;
        match aligner.map(at) {
            Alignment::Mapped(time) => {
                let sample = PitchSample {
                    time,
                    frequency: detected.frequency,
                    confidence: detected.confidence,
                };
                if self.live.push(sample) {
                    self.recondition_live();
                    self.invalidate();
                }
                None
            }
            Alignment::ForceStop { elapsed } => self.force_stop(elapsed, at),
        }
    }

    /// Appends captured PCM while a capturing activity runs.
    pub fn on_audio(&mut self, chunk: &[f32], sample_rate: u32) {
        if self.is_capturing() {
            self.recording_rate = sample_rate;
            self.recorded.extend_from_slice(chunk);
        }
    }

    /// Enforces the hard stop even when no pitch arrives.
    pub fn tick(&mut self, now: Instant) -> Option<SessionEvent> {
        if !self.is_capturing() {
            return None;
        }
        match self.aligner?.map(now) {
            Alignment::ForceStop { elapsed } => self.force_stop(elapsed, now),
            Alignment::Mapped(_) => None,
        }
    }

    /// Playback position reported by the reference player.
    pub fn set_playback_position(&mut self, seconds: f64) {
        if seconds.is_finite() {
            self.playback_position = seconds.max(0.0);
        }
    }

    /// The time the cursor, viewport and renderer use.
    pub fn current_time(&self, now: Instant) -> f64 {
        match self.state {
            ActivityState::PlayingBack { .. } => self.playback_position,
            ActivityState::Idle => self.resting_time,
            _ => match self.aligner.map(|a| a.map(now)) {
                Some(Alignment::Mapped(t)) => t,
                _ => self.resting_time,
            },
        }
    }

    pub fn timeline(&self, now: Instant) -> Timeline {
        Timeline::new(self.reference_duration.unwrap_or(0.0), self.current_time(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pitch(frequency: f32) -> DetectedPitch {
        DetectedPitch {
            frequency: Some(frequency),
            confidence: 0.9,
            midi: None,
        }
    }

    fn with_reference() -> PracticeSession {
        let mut session = PracticeSession::default();
        let samples = (0..100)
            .map(|i| PitchSample::voiced(i as f64 * 0.1, 220.0, 0.9))
            .collect();
        session.set_reference(PitchSeries::from_samples(SeriesKind::Reference, samples), Some(10.0));
        session
    }

    #[test]
    fn live_samples_follow_the_activity_clock() {
        let mut session = with_reference();
        let start = Instant::now();
        session.start(ActivityKind::Practicing, start).unwrap();
        session.on_pitch(&pitch(200.0), start + Duration::from_millis(500));
        session.on_pitch(&pitch(205.0), start + Duration::from_millis(510));
        session.on_pitch(&pitch(210.0), start + Duration::from_millis(600));
        let times: Vec<f64> = session.live_raw().samples().iter().map(|s| s.time).collect();
        assert_eq!(times.len(), 2);
        assert!((times[0] - 0.5).abs() < 1e-9);
        assert!((times[1] - 0.6).abs() < 1e-9);
        assert_eq!(session.live().len(), 2);
    }

    #[test]
    fn stop_keeps_data_and_restart_clears_live_only() {
        let mut session = with_reference();
        let start = Instant::now();
        session.start(ActivityKind::Recording, start).unwrap();
        session.on_pitch(&pitch(200.0), start + Duration::from_millis(100));
        session.on_audio(&[0.1; 64], 48_000);
        session.stop(start + Duration::from_millis(200)).unwrap();
        assert_eq!(session.live().len(), 1);
        assert_eq!(session.recorded().len(), 64);
        assert!((session.current_time(start + Duration::from_secs(5)) - 0.2).abs() < 1e-9);

        session.start(ActivityKind::Recording, start + Duration::from_secs(1)).unwrap();
        assert!(session.live().is_empty());
        assert!(session.recorded().is_empty());
        assert_eq!(session.reference().len(), 100);
    }

    #[test]
    fn hard_stop_ends_activity() {
        let mut session = with_reference();
        let start = Instant::now();
        session.start(ActivityKind::FollowingReference, start).unwrap();
        assert!(session.tick(start + Duration::from_secs(5)).is_none());
        let event = session.tick(start + Duration::from_millis(12_500));
        assert!(matches!(event, Some(SessionEvent::ForceStopped { .. })));
        assert_eq!(session.state(), ActivityState::Idle);
        assert!((session.current_time(start + Duration::from_secs(20)) - 11.0).abs() < 1e-9);
    }

    #[test]
    fn pitch_is_ignored_while_idle_or_playing_back() {
        let mut session = with_reference();
        let now = Instant::now();
        session.on_pitch(&pitch(200.0), now);
        assert!(session.live().is_empty());
        session.start(ActivityKind::PlayingBack, now).unwrap();
        session.on_pitch(&pitch(200.0), now);
        session.on_audio(&[0.2; 8], 44_100);
        assert!(session.live().is_empty());
        assert!(session.recorded().is_empty());
    }

    #[test]
    fn playback_end_resets_time_but_keeps_curves() {
        let mut session = with_reference();
        let start = Instant::now();
        session.start(ActivityKind::Practicing, start).unwrap();
        session.on_pitch(&pitch(200.0), start + Duration::from_millis(300));
        session.on_playback_ended(start + Duration::from_secs(10)).unwrap();
        assert_eq!(session.state(), ActivityState::Idle);
        assert_eq!(session.current_time(start + Duration::from_secs(11)), 0.0);
        assert_eq!(session.live().len(), 1);
    }

    #[test]
    fn new_reference_clears_live_data() {
        let mut session = with_reference();
        let start = Instant::now();
        session.start(ActivityKind::Recording, start).unwrap();
        session.on_pitch(&pitch(200.0), start + Duration::from_millis(100));
        session.stop(start + Duration::from_millis(200)).unwrap();
        let before = session.generation();
        session.set_reference(PitchSeries::new(SeriesKind::Reference), None);
        assert!(session.live().is_empty());
        assert!(!session.reference_available());
        assert!(session.generation() > before);
    }

    #[test]
    fn starting_twice_is_rejected() {
        let mut session = with_reference();
        let now = Instant::now();
        session.start(ActivityKind::Recording, now).unwrap();
        assert!(session.start(ActivityKind::Practicing, now).is_err());
        assert!(matches!(session.state(), ActivityState::Recording { .. }));
    }
}
