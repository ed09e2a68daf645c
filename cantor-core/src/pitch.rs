//! # Pitch Detection Module
//!
//! Live fundamental-frequency estimation for the singing voice.
//!
//! ## Features
//! - YIN with the lag search limited to the configured vocal band
//! - Confidence reported as `1 - cmnd(τ)` at the chosen lag
//! - Parabolic interpolation for sub-sample lag accuracy
//! - Spectrum refinement around the YIN estimate
//! - Confidence floor and a short moving average over voiced estimates

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::fft::{perform_fft, spectrum_to_magnitudes};
use crate::sample::frequency_to_midi;

/// Frames quieter than this RMS are reported as unvoiced without analysis.
pub const SILENCE_RMS: f32 = 0.01;

/// YIN absolute threshold for the first-dip search.
const YIN_THRESHOLD: f32 = 0.15;

/// Extractor tuning, persisted with the settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// When false the band limit, confidence floor and smoothing are skipped.
    pub enabled: bool,
    pub min_hz: f32,
    pub max_hz: f32,
    pub min_confidence: f32,
    /// Number of recent voiced estimates averaged together.
    pub smoothing_window: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_hz: 70.0,
            max_hz: 500.0,
            min_confidence: 0.3,
            smoothing_window: 3,
        }
    }
}

/// Result of analysing one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedPitch {
    pub frequency: Option<f32>,
    pub confidence: f32,
    pub midi: Option<f32>,
}

impl DetectedPitch {
    pub fn unvoiced() -> Self {
        Self {
            frequency: None,
            confidence: 0.0,
            midi: None,
        }
    }

    fn voiced(frequency: f32, confidence: f32) -> Self {
        Self {
            frequency: Some(frequency),
            confidence,
            midi: Some(frequency_to_midi(frequency)),
        }
    }
}

pub struct PitchExtractor {
    config: ExtractorConfig,
    recent: VecDeque<f32>,
}

impl PitchExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            recent: VecDeque::with_capacity(config.smoothing_window.max(1)),
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Drops the smoothing history, e.g. when a new activity starts.
    pub fn reset(&mut self) {
        self.recent.clear();
    }

    pub fn process(&mut self, frame: &[f32], sample_rate: u32) -> DetectedPitch {
        let (min_hz, max_hz) = if self.config.enabled {
            (self.config.min_hz, self.config.max_hz)
        } else {
            (20.0, sample_rate as f32 / 4.0)
        };

        let Some((rough, confidence)) = detect_pitch_yin(frame, sample_rate, min_hz, max_hz) else {
            return DetectedPitch::unvoiced();
        };

        let magnitudes = spectrum_to_magnitudes(&perform_fft(frame));
        let frequency = refine_from_spectrum(&magnitudes, rough, sample_rate).unwrap_or(rough);

        if !self.config.enabled {
            return DetectedPitch::voiced(frequency, confidence);
        }
        if confidence < self.config.min_confidence || frequency < min_hz || frequency > max_hz {
            return DetectedPitch::unvoiced();
        }

        let window = self.config.smoothing_window.max(1);
        if self.recent.len() >= window {
            self.recent.pop_front();
        }
        self.recent.push_back(frequency);
        let smoothed = self.recent.iter().sum::<f32>() / self.recent.len() as f32;
        DetectedPitch::voiced(smoothed, confidence)
    }
}

/// YIN over lags corresponding to `[min_hz, max_hz]`.
///
/// Returns the estimated frequency and its confidence, or `None` for silence
/// and frames too short for the requested band.
pub fn detect_pitch_yin(signal: &[f32], sample_rate: u32, min_hz: f32, max_hz: f32) -> Option<(f32, f32)> {
    let frame_size = signal.len();
    let half = frame_size / 2;
    if half < 4 || min_hz <= 0.0 || max_hz <= min_hz {
        return None;
    }

    let rms = (signal.iter().map(|&s| s * s).sum::<f32>() / frame_size as f32).sqrt();
    if rms < SILENCE_RMS {
        return None;
    }

    let min_tau = ((sample_rate as f32 / max_hz).floor() as usize).max(2);
    let max_tau = ((sample_rate as f32 / min_hz).ceil() as usize).min(half - 1);
    if min_tau + 1 >= max_tau {
        return None;
    }

    // Difference function up to the longest lag we care about.
    let mut yin_buffer = vec![0.0_f32; max_tau + 1];
    for tau in 1..=max_tau {
        let mut diff = 0.0;
        for i in 0..half {
            let delta = signal[i] - signal[i + tau];
            diff += delta * delta;
        }
        yin_buffer[tau] = diff;
    }

    // Cumulative mean normalised difference.
    yin_buffer[0] = 1.0;
    let mut running_sum = 0.0;
    for tau in 1..=max_tau {
        running_sum += yin_buffer[tau];
        yin_buffer[tau] = if running_sum != 0.0 {
            yin_buffer[tau] * tau as f32 / running_sum
        } else {
            1.0
        };
    }

    // First dip below the threshold, followed down to its local minimum.
    let mut period = None;
    let mut tau = min_tau;
    while tau < max_tau {
        if yin_buffer[tau] < YIN_THRESHOLD {
            while tau + 1 < max_tau && yin_buffer[tau + 1] < yin_buffer[tau] {
                tau += 1;
            }
            period = Some(tau);
            break;
        }
        tau += 1;
    }
    // No clear dip: fall back to the global minimum and let the confidence
    // floor decide.
    let period = period.or_else(|| {
        (min_tau..max_tau).min_by(|&a, &b| {
            yin_buffer[a]
                .partial_cmp(&yin_buffer[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    })?;

    let confidence = (1.0 - yin_buffer[period]).clamp(0.0, 1.0);

    let period_float = if period > 0 && period < max_tau {
        let y1 = yin_buffer[period - 1];
        let y2 = yin_buffer[period];
        let y3 = yin_buffer[period + 1];
        let denominator = y1 - 2.0 * y2 + y3;
        if denominator != 0.0 {
            period as f32 + (y1 - y3) / (2.0 * denominator)
        } else {
            period as f32
        }
    } else {
        period as f32
    };

    let frequency = sample_rate as f32 / period_float;
    (frequency.is_finite() && frequency > 0.0).then_some((frequency, confidence))
}

/// Refines a frequency estimate using the magnitude spectrum.
///
/// Searches two bins either side of the estimate and interpolates the peak
/// on a log scale. Falls back to the rough estimate whenever the peak is not
/// usable.
pub fn refine_from_spectrum(spectrum_magnitudes: &[f32], rough_freq: f32, sample_rate: u32) -> Option<f32> {
    if rough_freq <= 0.0 || spectrum_magnitudes.len() < 3 {
        return None;
    }
    let buffer_size = spectrum_magnitudes.len() * 2;
    let target_bin = (rough_freq * buffer_size as f32) / sample_rate as f32;
    let search_radius = 2.0;
    let start_bin = (target_bin - search_radius).max(0.0) as usize;
    let end_bin = (target_bin + search_radius).min((spectrum_magnitudes.len() - 1) as f32) as usize;
    if start_bin >= end_bin {
        return Some(rough_freq);
    }

    let peak_bin = spectrum_magnitudes[start_bin..=end_bin]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(offset, _)| start_bin + offset)?;

    if peak_bin == 0 || peak_bin >= spectrum_magnitudes.len() - 1 {
        return Some(rough_freq);
    }

    let y1 = spectrum_magnitudes[peak_bin - 1].ln();
    let y2 = spectrum_magnitudes[peak_bin].ln();
    let y3 = spectrum_magnitudes[peak_bin + 1].ln();
    if !y1.is_finite() || !y2.is_finite() || !y3.is_finite() {
        return Some(rough_freq);
    }

    let denominator = 2.0 * y2 - y1 - y3;
    if denominator.abs() < 1e-6 {
        return Some(rough_freq);
    }

    let interpolated_bin = peak_bin as f32 + (y3 - y1) / (2.0 * denominator);
    let final_freq = (interpolated_bin * sample_rate as f32) / buffer_size as f32;

    // A refinement that jumps more than a semitone found a different peak.
    if final_freq.is_finite() && final_freq > 0.0 && (final_freq / rough_freq).log2().abs() < 1.0 / 12.0 {
        Some(final_freq)
    } else {
        Some(rough_freq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn detects_a3() {
        let mut extractor = PitchExtractor::new(ExtractorConfig::default());
        let pitch = extractor.process(&sine(220.0, 44_100, 2048, 0.5), 44_100);
        let frequency = pitch.frequency.unwrap();
        assert!((frequency - 220.0).abs() < 2.0, "{frequency}");
        assert!(pitch.confidence > 0.8);
        assert!((pitch.midi.unwrap() - 57.0).abs() < 0.2);
    }

    #[test]
    fn silence_is_unvoiced() {
        let mut extractor = PitchExtractor::new(ExtractorConfig::default());
        assert_eq!(extractor.process(&vec![0.0; 2048], 44_100), DetectedPitch::unvoiced());
    }

    #[test]
    fn out_of_band_tone_is_rejected() {
        let mut extractor = PitchExtractor::new(ExtractorConfig {
            max_hz: 300.0,
            ..ExtractorConfig::default()
        });
        let pitch = extractor.process(&sine(880.0, 44_100, 2048, 0.5), 44_100);
        assert!(pitch.frequency.map_or(true, |f| f <= 300.0));
    }

    #[test]
    fn short_frame_does_not_panic() {
        let mut extractor = PitchExtractor::new(ExtractorConfig::default());
        assert!(extractor.process(&[0.3, -0.3, 0.3], 44_100).frequency.is_none());
        assert!(extractor.process(&[], 44_100).frequency.is_none());
    }

    #[test]
    fn smoothing_averages_recent_estimates() {
        let mut extractor = PitchExtractor::new(ExtractorConfig {
            smoothing_window: 2,
            ..ExtractorConfig::default()
        });
        let first = extractor.process(&sine(200.0, 44_100, 2048, 0.5), 44_100).frequency.unwrap();
        let second = extractor.process(&sine(240.0, 44_100, 2048, 0.5), 44_100).frequency.unwrap();
        assert!((first - 200.0).abs() < 2.0);
        assert!((second - 220.0).abs() < 3.0, "{second}");
    }
}
