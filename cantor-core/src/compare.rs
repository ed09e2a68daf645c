//! Point-by-point comparison of the live contour against the reference.

use crate::sample::{PitchSample, cents_between, nearest_voiced};

/// Deviations larger than this are flagged on the graph.
pub const MISMATCH_THRESHOLD_CENTS: f32 = 150.0;

/// Maximum time distance between a live and a reference sample for them to
/// be compared.
pub const ALIGNMENT_TOLERANCE_SECS: f64 = 0.05;

/// A live sample that is too far from the reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    pub time: f64,
    pub live_frequency: f32,
    pub reference_frequency: f32,
    pub cents: f32,
}

/// Live samples whose pitch differs from the time-aligned reference by more
/// than `threshold_cents`. Only pairs where both sides are voiced within
/// `tolerance` seconds of each other are compared.
pub fn detect_mismatches(
    reference: &[PitchSample],
    live: &[PitchSample],
    tolerance: f64,
    threshold_cents: f32,
) -> Vec<Mismatch> {
    live.iter()
        .filter_map(|sample| {
            let live_frequency = sample.voiced_frequency()?;
            let reference_frequency = nearest_voiced(reference, sample.time, tolerance)?.voiced_frequency()?;
            let cents = cents_between(live_frequency, reference_frequency);
            (cents.abs() > threshold_cents).then_some(Mismatch {
                time: sample.time,
                live_frequency,
                reference_frequency,
                cents,
            })
        })
        .collect()
}

/// Aggregate agreement between the two contours.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComparisonSummary {
    /// Live samples that had a voiced reference partner.
    pub compared: usize,
    /// Of those, how many stayed within the threshold.
    pub within_threshold: usize,
    pub mean_abs_cents: f32,
}

impl ComparisonSummary {
    /// Share of compared samples within the threshold, 0 when nothing matched.
    pub fn accuracy(&self) -> f32 {
        if self.compared == 0 {
            0.0
        } else {
            self.within_threshold as f32 / self.compared as f32
        }
    }
}

/// Summarises how closely the live contour followed the reference. Used as a
/// local estimate while the backend score is pending or unavailable.
pub fn summarize(
    reference: &[PitchSample],
    live: &[PitchSample],
    tolerance: f64,
    threshold_cents: f32,
) -> ComparisonSummary {
    let mut summary = ComparisonSummary::default();
    let mut total_cents = 0.0;
    for sample in live {
        let Some(live_frequency) = sample.voiced_frequency() else {
            continue;
        };
        let Some(reference_frequency) =
            nearest_voiced(reference, sample.time, tolerance).and_then(PitchSample::voiced_frequency)
        else {
            continue;
        };
        let cents = cents_between(live_frequency, reference_frequency).abs();
        summary.compared += 1;
        total_cents += cents;
        if cents <= threshold_cents {
            summary.within_threshold += 1;
        }
    }
    if summary.compared > 0 {
        summary.mean_abs_cents = total_cents / summary.compared as f32;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_tone_is_a_mismatch() {
        let reference = [PitchSample::voiced(5.0, 220.0, 0.9)];
        let live = [PitchSample::voiced(5.02, 247.0, 0.9)];
        let found = detect_mismatches(&reference, &live, ALIGNMENT_TOLERANCE_SECS, MISMATCH_THRESHOLD_CENTS);
        assert_eq!(found.len(), 1);
        assert!((found[0].cents - 200.4).abs() < 0.5);
        assert_eq!(found[0].time, 5.02);
    }

    #[test]
    fn small_deviation_is_not_flagged() {
        let reference = [PitchSample::voiced(5.0, 220.0, 0.9)];
        let live = [PitchSample::voiced(5.02, 225.0, 0.9)];
        assert!(detect_mismatches(&reference, &live, 0.05, 150.0).is_empty());
    }

    #[test]
    fn unaligned_or_unvoiced_pairs_are_skipped() {
        let reference = [PitchSample::voiced(5.0, 220.0, 0.9), PitchSample::unvoiced(6.0)];
        let live = [PitchSample::voiced(5.2, 330.0, 0.9), PitchSample::voiced(6.0, 330.0, 0.9)];
        assert!(detect_mismatches(&reference, &live, 0.05, 150.0).is_empty());
    }

    #[test]
    fn summary_counts_matches() {
        let reference = [
            PitchSample::voiced(1.0, 220.0, 0.9),
            PitchSample::voiced(2.0, 220.0, 0.9),
        ];
        let live = [
            PitchSample::voiced(1.01, 222.0, 0.9),
            PitchSample::voiced(2.01, 300.0, 0.9),
            PitchSample::voiced(3.0, 220.0, 0.9),
        ];
        let summary = summarize(&reference, &live, 0.05, 150.0);
        assert_eq!(summary.compared, 2);
        assert_eq!(summary.within_threshold, 1);
        assert!((summary.accuracy() - 0.5).abs() < 1e-6);
    }
}
