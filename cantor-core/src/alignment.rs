//! # Time-Alignment Module
//!
//! Maps wall-clock time since an activity started onto the reference
//! timeline, so live samples plot on the same x-axis as the reference
//! contour regardless of how irregularly the capture callback fires.

use std::time::Instant;

use crate::sample::{PitchSample, PitchSeries, SeriesKind};

/// Mapped time may run this far past the reference end so the final note
/// is not cut off by clock skew.
pub const OVERRUN_FACTOR: f64 = 1.1;

/// Once elapsed time reaches this multiple of the reference duration the
/// activity is stopped.
pub const HARD_STOP_FACTOR: f64 = 1.2;

/// Two live samples closer than this are considered the same point.
pub const DUPLICATE_EPSILON_SECS: f64 = 0.02;

/// How many trailing samples the duplicate check looks at.
pub const DUPLICATE_LOOKBACK: usize = 5;

/// Outcome of mapping one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alignment {
    /// Position on the reference timeline, in seconds.
    Mapped(f64),
    /// The activity ran past the hard stop and must be ended.
    ForceStop { elapsed: f64 },
}

#[derive(Debug, Clone, Copy)]
pub struct TimeAligner {
    started: Instant,
    reference_duration: Option<f64>,
    overrun_factor: f64,
    hard_stop_factor: f64,
}

impl TimeAligner {
    /// Starts a mapping at `started`. Without a positive reference duration
    /// the mapping is the identity and never forces a stop.
    pub fn new(started: Instant, reference_duration: Option<f64>) -> Self {
        Self {
            started,
            reference_duration: reference_duration.filter(|d| d.is_finite() && *d > 0.0),
            overrun_factor: OVERRUN_FACTOR,
            hard_stop_factor: HARD_STOP_FACTOR,
        }
    }

    pub fn with_factors(mut self, overrun_factor: f64, hard_stop_factor: f64) -> Self {
        self.overrun_factor = overrun_factor;
        self.hard_stop_factor = hard_stop_factor.max(overrun_factor);
        self
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn reference_duration(&self) -> Option<f64> {
        self.reference_duration
    }

    /// Seconds since the activity started. Instants before the start count as 0.
    pub fn elapsed(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.started).as_secs_f64()
    }

    pub fn map(&self, now: Instant) -> Alignment {
        let elapsed = self.elapsed(now);
        match self.reference_duration {
            Some(duration) if elapsed >= duration * self.hard_stop_factor => {
                Alignment::ForceStop { elapsed }
            }
            Some(duration) => Alignment::Mapped(elapsed.min(duration * self.overrun_factor)),
            None => Alignment::Mapped(elapsed),
        }
    }
}

/// Appends mapped samples to the live series, suppressing near-duplicates.
#[derive(Debug, Clone)]
pub struct LiveAppender {
    series: PitchSeries,
    epsilon: f64,
    lookback: usize,
}

impl Default for LiveAppender {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveAppender {
    pub fn new() -> Self {
        Self {
            series: PitchSeries::new(SeriesKind::Live),
            epsilon: DUPLICATE_EPSILON_SECS,
            lookback: DUPLICATE_LOOKBACK,
        }
    }

    /// Appends `sample` unless it duplicates a recent sample or would go back
    /// in time. Returns whether the sample was kept.
    pub fn push(&mut self, sample: PitchSample) -> bool {
        if !sample.time.is_finite() {
            return false;
        }
        let samples = self.series.samples();
        if samples.last().is_some_and(|last| sample.time < last.time) {
            return false;
        }
        let duplicate = samples
            .iter()
            .rev()
            .take(self.lookback)
            .any(|existing| (existing.time - sample.time).abs() < self.epsilon);
        if duplicate {
            log::trace!("Suppressed duplicate sample at {:.3}s", sample.time);
            return false;
        }
        self.series.push_unchecked(sample);
        true
    }

    pub fn series(&self) -> &PitchSeries {
        &self.series
    }

    pub fn samples(&self) -> &[PitchSample] {
        self.series.samples()
    }

    pub fn clear(&mut self) {
        self.series.clear();
    }
}
