//! # Signal Conditioner
//!
//! Pure functions that turn a raw pitch sequence into a cleaner one without
//! moving or dropping samples. The live microphone stream is noisy (octave
//! jumps, transient spikes), so it goes through clamp, median and moving
//! average in that order. The reference stream comes back clean from the
//! backend and only gets the tension smoothing for a flowing display.
//!
//! Every filter keeps unvoiced samples in their slot. They never contribute
//! to a neighbourhood and are never turned into voiced samples.

use serde::{Deserialize, Serialize};

use crate::sample::PitchSample;

/// Clamps every voiced frequency into `[min_hz, max_hz]`.
pub fn clamp_range(series: &[PitchSample], min_hz: f32, max_hz: f32) -> Vec<PitchSample> {
    let (lo, hi) = if min_hz <= max_hz {
        (min_hz, max_hz)
    } else {
        (max_hz, min_hz)
    };
    series
        .iter()
        .map(|sample| match sample.voiced_frequency() {
            Some(f) => sample.with_frequency(f.clamp(lo, hi)),
            None => *sample,
        })
        .collect()
}

/// Replaces each voiced sample by the median of the voiced frequencies within
/// `±floor(window_size / 2)` positions.
///
/// Returns the input unchanged when the series is shorter than the window.
pub fn median_filter(series: &[PitchSample], window_size: usize) -> Vec<PitchSample> {
    filter_neighbourhood(series, window_size, median)
}

/// Same neighbourhood as [`median_filter`], replaced by the arithmetic mean.
pub fn moving_average(series: &[PitchSample], window_size: usize) -> Vec<PitchSample> {
    filter_neighbourhood(series, window_size, |values| {
        values.iter().sum::<f32>() / values.len() as f32
    })
}

fn filter_neighbourhood<F>(series: &[PitchSample], window_size: usize, reduce: F) -> Vec<PitchSample>
where
    F: Fn(&mut [f32]) -> f32,
{
    if window_size == 0 || series.len() < window_size {
        return series.to_vec();
    }

    let half = window_size / 2;
    let mut neighbourhood = Vec::with_capacity(window_size);

    series
        .iter()
        .enumerate()
        .map(|(i, sample)| {
            if !sample.is_voiced() {
                return *sample;
            }
            let start = i.saturating_sub(half);
            let end = (i + half).min(series.len() - 1);

            neighbourhood.clear();
            neighbourhood.extend(series[start..=end].iter().filter_map(PitchSample::voiced_frequency));

            // The centre is voiced, so the neighbourhood is never empty.
            sample.with_frequency(reduce(&mut neighbourhood))
        })
        .collect()
}

/// Median of a non-empty slice. Even counts average the two middle values.
fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Multi-pass tension smoothing for the reference contour.
///
/// Each pass moves every interior voiced sample with voiced neighbours towards
/// the average of those neighbours:
/// `f' = f * (1 - tension) + avg(prev, next) * tension`.
/// A pass reads only the values produced by the previous pass. The first and
/// last samples are never modified.
pub fn tension_smooth(series: &[PitchSample], tension: f32, passes: usize) -> Vec<PitchSample> {
    let mut current = series.to_vec();
    if current.len() < 3 {
        return current;
    }
    let tension = tension.clamp(0.0, 1.0);

    for _ in 0..passes {
        let previous = current.clone();
        for i in 1..previous.len() - 1 {
            let (Some(prev), Some(freq), Some(next)) = (
                previous[i - 1].voiced_frequency(),
                previous[i].voiced_frequency(),
                previous[i + 1].voiced_frequency(),
            ) else {
                continue;
            };
            let smoothed = freq * (1.0 - tension) + (prev + next) / 2.0 * tension;
            current[i] = previous[i].with_frequency(smoothed);
        }
    }
    current
}

/// Filter chain for the live student stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiveConditioning {
    pub min_hz: f32,
    pub max_hz: f32,
    pub median_window: usize,
    pub average_window: usize,
}

impl Default for LiveConditioning {
    fn default() -> Self {
        Self {
            min_hz: 80.0,
            max_hz: 350.0,
            median_window: 5,
            average_window: 3,
        }
    }
}

impl LiveConditioning {
    /// Clamp, then median, then moving average.
    pub fn apply(&self, series: &[PitchSample]) -> Vec<PitchSample> {
        let clamped = clamp_range(series, self.min_hz, self.max_hz);
        let despiked = median_filter(&clamped, self.median_window);
        moving_average(&despiked, self.average_window)
    }
}

/// Display smoothing for the reference stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceConditioning {
    pub tension: f32,
    pub passes: usize,
}

impl Default for ReferenceConditioning {
    fn default() -> Self {
        Self {
            tension: 0.8,
            passes: 2,
        }
    }
}

impl ReferenceConditioning {
    pub fn apply(&self, series: &[PitchSample]) -> Vec<PitchSample> {
        tension_smooth(series, self.tension, self.passes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(freqs: &[Option<f32>]) -> Vec<PitchSample> {
        freqs
            .iter()
            .enumerate()
            .map(|(i, f)| PitchSample {
                time: i as f64 * 0.05,
                frequency: *f,
                confidence: 0.9,
            })
            .collect()
    }

    fn freqs(samples: &[PitchSample]) -> Vec<Option<f32>> {
        samples.iter().map(|s| s.frequency).collect()
    }

    #[test]
    fn clamp_removes_octave_jumps() {
        let input = series(&[Some(60.0), Some(200.0), Some(700.0), None]);
        let out = clamp_range(&input, 80.0, 350.0);
        assert_eq!(freqs(&out), vec![Some(80.0), Some(200.0), Some(350.0), None]);
    }

    #[test]
    fn clamp_passes_non_positive_through() {
        let input = series(&[Some(0.0), Some(-5.0)]);
        let out = clamp_range(&input, 80.0, 350.0);
        assert_eq!(freqs(&out), vec![Some(0.0), Some(-5.0)]);
    }

    #[test]
    fn median_rejects_spike() {
        let input = series(&[Some(200.0), Some(201.0), Some(340.0), Some(202.0), Some(203.0)]);
        let out = median_filter(&input, 3);
        assert_eq!(out[2].frequency, Some(202.0));
        assert_eq!(out.len(), input.len());
    }

    #[test]
    fn median_ignores_unvoiced_neighbours() {
        let input = series(&[Some(200.0), None, Some(210.0), None, Some(220.0)]);
        let out = median_filter(&input, 3);
        assert_eq!(freqs(&out), freqs(&input));
    }

    #[test]
    fn short_series_is_untouched() {
        let input = series(&[Some(200.0), Some(400.0)]);
        assert_eq!(median_filter(&input, 5), input);
        assert_eq!(moving_average(&input, 3), input);
    }

    #[test]
    fn moving_average_of_neighbours() {
        let input = series(&[Some(200.0), Some(210.0), Some(220.0)]);
        let out = moving_average(&input, 3);
        assert_eq!(out[0].frequency, Some(205.0));
        assert_eq!(out[1].frequency, Some(210.0));
        assert_eq!(out[2].frequency, Some(215.0));
    }

    #[test]
    fn tension_smooth_single_pass() {
        let input = series(&[Some(200.0), Some(300.0), Some(200.0)]);
        let out = tension_smooth(&input, 0.8, 1);
        let middle = out[1].frequency.unwrap();
        assert!((middle - 220.0).abs() < 1e-3);
    }

    #[test]
    fn tension_smooth_keeps_endpoints_and_gaps() {
        let input = series(&[Some(200.0), Some(260.0), None, Some(240.0), Some(300.0), Some(180.0)]);
        let out = tension_smooth(&input, 0.8, 4);
        assert_eq!(out[0].frequency, Some(200.0));
        assert_eq!(out[5].frequency, Some(180.0));
        // Neighbour of a gap is left alone.
        assert_eq!(out[1].frequency, Some(260.0));
        assert_eq!(out[2].frequency, None);
        assert_eq!(out[3].frequency, Some(240.0));
        assert_ne!(out[4].frequency, Some(300.0));
    }

    #[test]
    fn live_chain_preserves_slots() {
        let input = series(&[Some(190.0), Some(195.0), None, Some(780.0), Some(200.0), Some(205.0)]);
        let out = LiveConditioning::default().apply(&input);
        assert_eq!(out.len(), input.len());
        assert_eq!(out[2].frequency, None);
        for (a, b) in out.iter().zip(&input) {
            assert_eq!(a.time, b.time);
        }
        assert!(out[3].frequency.unwrap() <= 350.0);
    }
}
