//! # Playback Synchronizer
//!
//! Keeps the reference player and the student player in lockstep:
//! - seeks on either side are mirrored to the other as a fraction of its own
//!   duration
//! - a per-engine suppression window stops a mirrored seek from bouncing back
//! - a polling loop pulls the student back to the reference when they drift
//! - play/pause are mirrored and the end of the reference tears playback down

use std::time::{Duration, Instant};

use crate::error::Result;

/// How long after a programmatic seek the target engine's own seek events
/// are ignored.
pub const SYNC_SUPPRESSION: Duration = Duration::from_millis(100);

/// Minimum time between two drift checks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The student is only moved when it is further than this from the
/// proportional reference position.
pub const DRIFT_TOLERANCE_SECS: f64 = 0.05;

/// An audio player the synchronizer can drive.
pub trait PlaybackEngine {
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    /// Moves to `fraction` of the duration, clamped to [0, 1].
    fn seek_to(&mut self, fraction: f64);
    /// Position in seconds.
    fn current_time(&self) -> f64;
    /// Length in seconds once known.
    fn duration(&self) -> Option<f64>;
    fn is_playing(&self) -> bool;
    fn has_finished(&self) -> bool;

    /// Position as a fraction of the duration, 0 while the duration is unknown.
    fn progress(&self) -> f64 {
        match self.duration() {
            Some(duration) if duration > 0.0 => (self.current_time() / duration).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineId {
    Reference,
    Student,
}

impl EngineId {
    pub fn other(self) -> Self {
        match self {
            EngineId::Reference => EngineId::Student,
            EngineId::Student => EngineId::Reference,
        }
    }
}

/// What happened to a seek event reported by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    /// The engine was being synced; the event was ours and is dropped.
    Suppressed,
    /// A genuine user seek, mirrored to the other engine.
    Propagated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncEvent {
    /// The student was moved to `student_time` to match the reference.
    DriftCorrected { student_time: f64 },
    /// The reference reached its end; both players are stopped.
    ReferenceEnded,
}

pub struct PlaybackSynchronizer<R, S> {
    reference: R,
    student: S,
    reference_syncing_until: Option<Instant>,
    student_syncing_until: Option<Instant>,
    playing_both: bool,
    last_poll: Option<Instant>,
}

impl<R: PlaybackEngine, S: PlaybackEngine> PlaybackSynchronizer<R, S> {
    pub fn new(reference: R, student: S) -> Self {
        Self {
            reference,
            student,
            reference_syncing_until: None,
            student_syncing_until: None,
            playing_both: false,
            last_poll: None,
        }
    }

    pub fn reference(&self) -> &R {
        &self.reference
    }

    pub fn reference_mut(&mut self) -> &mut R {
        &mut self.reference
    }

    pub fn student(&self) -> &S {
        &self.student
    }

    pub fn student_mut(&mut self) -> &mut S {
        &mut self.student
    }

    /// Replaces the student player, e.g. after a new recording.
    pub fn replace_student(&mut self, student: S) {
        self.student.pause();
        self.student = student;
        self.student_syncing_until = None;
    }

    pub fn replace_reference(&mut self, reference: R) {
        self.reference.pause();
        self.reference = reference;
        self.reference_syncing_until = None;
        self.playing_both = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing_both || self.reference.is_playing() || self.student.is_playing()
    }

    /// Whether `engine` is inside its suppression window at `now`.
    pub fn is_syncing(&self, engine: EngineId, now: Instant) -> bool {
        let deadline = match engine {
            EngineId::Reference => self.reference_syncing_until,
            EngineId::Student => self.student_syncing_until,
        };
        deadline.is_some_and(|until| now < until)
    }

    /// Seeks `engine` programmatically and opens its suppression window.
    fn sync_seek(&mut self, engine: EngineId, fraction: f64, now: Instant) {
        let until = Some(now + SYNC_SUPPRESSION);
        match engine {
            EngineId::Reference => {
                self.reference_syncing_until = until;
                self.reference.seek_to(fraction);
            }
            EngineId::Student => {
                self.student_syncing_until = until;
                self.student.seek_to(fraction);
            }
        }
    }

    /// The user moved `origin` to `fraction`; the other side follows.
    pub fn user_seek(&mut self, origin: EngineId, fraction: f64, now: Instant) {
        let fraction = fraction.clamp(0.0, 1.0);
        match origin {
            EngineId::Reference => self.reference.seek_to(fraction),
            EngineId::Student => self.student.seek_to(fraction),
        }
        self.sync_seek(origin.other(), fraction, now);
        log::debug!("Seek on {origin:?} to {fraction:.3}, mirrored");
    }

    /// Handles a seek notification coming from `engine` itself.
    pub fn on_seek_event(&mut self, engine: EngineId, fraction: f64, now: Instant) -> SeekOutcome {
        if self.is_syncing(engine, now) {
            return SeekOutcome::Suppressed;
        }
        self.sync_seek(engine.other(), fraction.clamp(0.0, 1.0), now);
        SeekOutcome::Propagated
    }

    /// Rewinds both players and starts them together.
    pub fn play_both(&mut self, now: Instant) -> Result<()> {
        self.sync_seek(EngineId::Reference, 0.0, now);
        self.sync_seek(EngineId::Student, 0.0, now);
        self.reference.play()?;
        if let Err(err) = self.student.play() {
            self.reference.pause();
            return Err(err);
        }
        self.playing_both = true;
        self.last_poll = Some(now);
        log::info!("Playing reference and student together");
        Ok(())
    }

    /// Mirrors a play request on either side.
    pub fn play(&mut self) -> Result<()> {
        self.reference.play()?;
        if self.student.duration().is_some() {
            self.student.play()?;
        }
        self.playing_both = true;
        Ok(())
    }

    pub fn pause(&mut self) {
        self.reference.pause();
        self.student.pause();
        self.playing_both = false;
    }

    /// Pauses and rewinds both players.
    pub fn stop_all(&mut self, now: Instant) {
        self.pause();
        self.sync_seek(EngineId::Reference, 0.0, now);
        self.sync_seek(EngineId::Student, 0.0, now);
        self.last_poll = None;
    }

    /// Runs one reconciliation step. Calls closer together than
    /// [`POLL_INTERVAL`] are ignored, so this can be driven from a frame tick.
    pub fn poll(&mut self, now: Instant) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        if self.reference_syncing_until.is_some_and(|until| now >= until) {
            self.reference_syncing_until = None;
        }
        if self.student_syncing_until.is_some_and(|until| now >= until) {
            self.student_syncing_until = None;
        }

        if !self.playing_both {
            return events;
        }
        if self
            .last_poll
            .is_some_and(|last| now.saturating_duration_since(last) < POLL_INTERVAL)
        {
            return events;
        }
        self.last_poll = Some(now);

        if self.reference.has_finished() {
            self.student.pause();
            self.reference.pause();
            self.playing_both = false;
            log::info!("Reference finished, stopping synchronized playback");
            events.push(SyncEvent::ReferenceEnded);
            return events;
        }

        let (Some(reference_duration), Some(student_duration)) = (self.reference.duration(), self.student.duration())
        else {
            return events;
        };
        if reference_duration <= 0.0 || student_duration <= 0.0 {
            return events;
        }

        let fraction = (self.reference.current_time() / reference_duration).clamp(0.0, 1.0);
        let expected = fraction * student_duration;
        let drift = (self.student.current_time() - expected).abs();
        if drift > DRIFT_TOLERANCE_SECS {
            self.sync_seek(EngineId::Student, fraction, now);
            log::debug!("Corrected student drift of {drift:.3}s");
            events.push(SyncEvent::DriftCorrected { student_time: expected });
        }
        events
    }
}
