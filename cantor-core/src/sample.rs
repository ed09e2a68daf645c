//! # Pitch Sample Module
//!
//! The data model shared by every stage of the pipeline: single pitch
//! observations, ordered series of them, and the musical conversions used
//! by the graph labels and the cent meter.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// A single frequency observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchSample {
    /// Seconds since stream start (reference) or activity start (live).
    pub time: f64,
    /// Estimated fundamental in Hz; `None` means unvoiced.
    pub frequency: Option<f32>,
    /// Estimator confidence in [0, 1].
    pub confidence: f32,
}

impl PitchSample {
    pub fn voiced(time: f64, frequency: f32, confidence: f32) -> Self {
        Self {
            time,
            frequency: Some(frequency),
            confidence,
        }
    }

    pub fn unvoiced(time: f64) -> Self {
        Self {
            time,
            frequency: None,
            confidence: 0.0,
        }
    }

    /// The frequency if this sample carries a usable pitch.
    ///
    /// Non-positive and non-finite frequencies are treated like `None`.
    pub fn voiced_frequency(&self) -> Option<f32> {
        self.frequency.filter(|f| f.is_finite() && *f > 0.0)
    }

    pub fn is_voiced(&self) -> bool {
        self.voiced_frequency().is_some()
    }

    pub fn midi_note(&self) -> Option<f32> {
        self.voiced_frequency().map(frequency_to_midi)
    }

    /// Returns a copy with the frequency replaced, keeping time and confidence.
    pub fn with_frequency(&self, frequency: f32) -> Self {
        Self {
            frequency: Some(frequency),
            ..*self
        }
    }
}

/// Which stream a series belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesKind {
    /// Extracted once per reference audio, immutable afterwards.
    Reference,
    /// Grows while an activity runs, frozen after it stops.
    Live,
}

/// An ordered sequence of samples from one source.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchSeries {
    kind: SeriesKind,
    samples: Vec<PitchSample>,
}

impl PitchSeries {
    pub fn new(kind: SeriesKind) -> Self {
        Self {
            kind,
            samples: Vec::new(),
        }
    }

    /// Builds a series from samples, dropping any that would break time order.
    pub fn from_samples(kind: SeriesKind, samples: Vec<PitchSample>) -> Self {
        let mut ordered: Vec<PitchSample> = Vec::with_capacity(samples.len());
        for sample in samples {
            if !sample.time.is_finite() {
                continue;
            }
            if ordered.last().is_some_and(|last| sample.time < last.time) {
                log::debug!("Dropping out-of-order sample at {:.3}s", sample.time);
                continue;
            }
            ordered.push(sample);
        }
        Self {
            kind,
            samples: ordered,
        }
    }

    pub fn kind(&self) -> SeriesKind {
        self.kind
    }

    pub fn samples(&self) -> &[PitchSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&PitchSample> {
        self.samples.last()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Appends without any checks. Callers keep the ordering invariant.
    pub(crate) fn push_unchecked(&mut self, sample: PitchSample) {
        self.samples.push(sample);
    }

    /// Replaces the contents with an already ordered sequence.
    pub(crate) fn replace(&mut self, samples: Vec<PitchSample>) {
        self.samples = samples;
    }

    /// Time of the last sample, or 0 for an empty series.
    pub fn end_time(&self) -> f64 {
        self.samples.last().map_or(0.0, |s| s.time)
    }

    /// Smallest and largest voiced frequency in the series.
    pub fn frequency_bounds(&self) -> Option<(f32, f32)> {
        self.samples
            .iter()
            .filter_map(PitchSample::voiced_frequency)
            .fold(None, |acc, f| match acc {
                None => Some((f, f)),
                Some((lo, hi)) => Some((lo.min(f), hi.max(f))),
            })
    }

    /// The voiced sample closest in time to `time`, if one lies within `tolerance`.
    pub fn nearest_voiced(&self, time: f64, tolerance: f64) -> Option<&PitchSample> {
        nearest_voiced(&self.samples, time, tolerance)
    }
}

/// Closest voiced sample to `time` within `tolerance` in a time-ordered slice.
pub fn nearest_voiced(samples: &[PitchSample], time: f64, tolerance: f64) -> Option<&PitchSample> {
    let start = samples.partition_point(|s| s.time < time - tolerance);
    samples[start..]
        .iter()
        .take_while(|s| s.time <= time + tolerance)
        .filter(|s| s.is_voiced())
        .min_by(|a, b| {
            (a.time - time)
                .abs()
                .partial_cmp(&(b.time - time).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// `69 + 12 * log2(f / 440)`.
pub fn frequency_to_midi(frequency: f32) -> f32 {
    69.0 + 12.0 * (frequency / 440.0).log2()
}

pub fn midi_to_frequency(midi: f32) -> f32 {
    440.0 * 2.0_f32.powf((midi - 69.0) / 12.0)
}

/// Interval from `reference` to `frequency` in cents.
///
/// 100 cents = 1 semitone, positive values are sharp.
pub fn cents_between(frequency: f32, reference: f32) -> f32 {
    1200.0 * (frequency / reference).log2()
}

/// Equal-temperament notes from A0 to C8 with A4 = 440 Hz.
static NOTES: Lazy<Vec<(String, f32)>> = Lazy::new(|| {
    const NOTE_NAMES: [&str; 12] = [
        "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#",
    ];
    (0..88)
        .map(|i: usize| {
            let frequency = 440.0 * 2.0_f32.powf((i as f32 - 48.0) / 12.0);
            let octave = (i + 9) / 12;
            (format!("{}{}", NOTE_NAMES[i % 12], octave), frequency)
        })
        .collect()
});

/// Closest note to a frequency as `(name, target_frequency)`.
pub fn nearest_note(frequency: f32) -> Option<(&'static str, f32)> {
    if !(frequency.is_finite() && frequency > 0.0) {
        return None;
    }
    NOTES
        .iter()
        .min_by(|a, b| {
            let diff_a = (a.1 - frequency).abs();
            let diff_b = (b.1 - frequency).abs();
            diff_a
                .partial_cmp(&diff_b)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(name, f)| (name.as_str(), *f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_frequency_is_unvoiced() {
        assert!(!PitchSample::voiced(0.0, 0.0, 0.9).is_voiced());
        assert!(!PitchSample::voiced(0.0, -3.0, 0.9).is_voiced());
        assert!(!PitchSample::unvoiced(0.0).is_voiced());
        assert_eq!(PitchSample::voiced(0.0, 220.0, 0.9).voiced_frequency(), Some(220.0));
    }

    #[test]
    fn midi_of_a4_is_69() {
        let sample = PitchSample::voiced(0.0, 440.0, 1.0);
        assert!((sample.midi_note().unwrap() - 69.0).abs() < 1e-4);
        assert!((midi_to_frequency(57.0) - 220.0).abs() < 1e-3);
    }

    #[test]
    fn from_samples_keeps_time_order() {
        let series = PitchSeries::from_samples(
            SeriesKind::Reference,
            vec![
                PitchSample::voiced(0.0, 200.0, 1.0),
                PitchSample::voiced(0.2, 210.0, 1.0),
                PitchSample::voiced(0.1, 220.0, 1.0),
                PitchSample::voiced(0.3, 230.0, 1.0),
            ],
        );
        let times: Vec<f64> = series.samples().iter().map(|s| s.time).collect();
        assert_eq!(times, vec![0.0, 0.2, 0.3]);
    }

    #[test]
    fn nearest_voiced_respects_tolerance() {
        let series = PitchSeries::from_samples(
            SeriesKind::Reference,
            vec![
                PitchSample::voiced(4.90, 210.0, 1.0),
                PitchSample::unvoiced(4.99),
                PitchSample::voiced(5.00, 220.0, 1.0),
                PitchSample::voiced(5.20, 230.0, 1.0),
            ],
        );
        let hit = series.nearest_voiced(5.02, 0.05).unwrap();
        assert_eq!(hit.voiced_frequency(), Some(220.0));
        assert!(series.nearest_voiced(5.11, 0.05).is_none());
    }

    #[test]
    fn nearest_note_names() {
        assert_eq!(nearest_note(440.0).unwrap().0, "A4");
        assert_eq!(nearest_note(261.0).unwrap().0, "C4");
        assert!(nearest_note(0.0).is_none());
    }

    #[test]
    fn cents_of_whole_tone() {
        assert!((cents_between(246.94, 220.0) - 200.0).abs() < 0.1);
    }
}
