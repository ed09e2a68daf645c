//! # Fast Fourier Transform (FFT) Module
//!
//! Spectrum helpers used to refine YIN estimates.
//!
//! ## Features
//! - RustFFT forward transform for frames of any length
//! - Hann windowing for reduced spectral leakage
//! - DC offset removal

use rustfft::{FftPlanner, num_complex::Complex};

/// Centres a signal around zero.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// DC removal, Hann window, then a forward FFT. An empty frame gives an
/// empty spectrum.
pub fn perform_fft(signal: &[f32]) -> Vec<Complex<f32>> {
    if signal.is_empty() {
        return Vec::new();
    }
    let mut processed_signal = signal.to_vec();
    remove_dc_offset(&mut processed_signal);
    apply_hann_window(&mut processed_signal);

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(processed_signal.len());

    let mut buffer: Vec<Complex<f32>> = processed_signal
        .into_iter()
        .map(|sample| Complex { re: sample, im: 0.0 })
        .collect();

    fft.process(&mut buffer);
    buffer
}

/// Magnitudes up to the Nyquist frequency.
pub fn spectrum_to_magnitudes(spectrum: &[Complex<f32>]) -> Vec<f32> {
    spectrum.iter().take(spectrum.len() / 2).map(|c| c.norm()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_lands_in_expected_bin() {
        let n = 1024;
        let signal: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 32.0 * i as f32 / n as f32).sin())
            .collect();
        let magnitudes = spectrum_to_magnitudes(&perform_fft(&signal));
        assert_eq!(magnitudes.len(), n / 2);
        let peak = magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(peak, 32);
    }

    #[test]
    fn odd_and_empty_lengths() {
        assert!(perform_fft(&[]).is_empty());
        assert_eq!(perform_fft(&[0.1, 0.2, 0.3]).len(), 3);
    }
}
