//! # Playback Module
//!
//! A small in-memory player on top of a cpal output stream. Used for both
//! the reference audio and the student's recording, and driven by the
//! [`PlaybackSynchronizer`](crate::sync::PlaybackSynchronizer).
//!
//! The whole clip is held as mono `f32`. The output callback reads it with
//! linear interpolation, which handles both the speed factor and the
//! difference between the clip and device sample rates.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use anyhow::{Context, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, Stream, StreamConfig};

use crate::error::{CantorError, Result};
use crate::sync::PlaybackEngine;

pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

/// State shared with the audio callback.
struct Shared {
    samples: Vec<f32>,
    sample_rate: u32,
    /// Read position in clip frames, stored as `f64` bits.
    position: AtomicU64,
    playing: AtomicBool,
    finished: AtomicBool,
    /// Speed factor, stored as `f32` bits.
    speed: AtomicU32,
}

impl Shared {
    fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Relaxed))
    }

    fn set_position(&self, frames: f64) {
        self.position.store(frames.to_bits(), Ordering::Relaxed);
    }

    fn speed(&self) -> f32 {
        f32::from_bits(self.speed.load(Ordering::Relaxed))
    }

    /// Interpolated sample at a fractional frame position.
    fn sample_at(&self, position: f64) -> f32 {
        let index = position.floor() as usize;
        let Some(&current) = self.samples.get(index) else {
            return 0.0;
        };
        let next = self.samples.get(index + 1).copied().unwrap_or(current);
        let t = (position - index as f64) as f32;
        current + (next - current) * t
    }
}

pub struct PcmPlayer {
    shared: Arc<Shared>,
    stream: Option<Stream>,
}

impl PcmPlayer {
    /// A player for a mono clip. The output device is only opened on the
    /// first call to `play`.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            shared: Arc::new(Shared {
                samples,
                sample_rate: sample_rate.max(1),
                position: AtomicU64::new(0.0_f64.to_bits()),
                playing: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                speed: AtomicU32::new(1.0_f32.to_bits()),
            }),
            stream: None,
        }
    }

    /// A player with nothing loaded. Reports no duration.
    pub fn empty() -> Self {
        Self::new(Vec::new(), 44_100)
    }

    /// Decodes a WAV file, mixing all channels down to mono.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let mono = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        log::debug!(
            "Decoded WAV: {} Hz, {} channel(s), {} frames",
            spec.sample_rate,
            channels,
            interleaved.len() / channels
        );
        Ok(Self::new(mono, spec.sample_rate))
    }

    pub fn is_empty(&self) -> bool {
        self.shared.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.shared.samples
    }

    pub fn speed(&self) -> f32 {
        self.shared.speed()
    }

    pub fn set_speed(&self, speed: f32) {
        let speed = if speed.is_finite() { speed.clamp(MIN_SPEED, MAX_SPEED) } else { 1.0 };
        self.shared.speed.store(speed.to_bits(), Ordering::Relaxed);
    }

    fn ensure_stream(&mut self) -> Result<()> {
        if self.stream.is_none() {
            let stream = open_output(Arc::clone(&self.shared))
                .map_err(|err| CantorError::Audio(format!("{err:#}")))?;
            self.stream = Some(stream);
        }
        Ok(())
    }
}

impl PlaybackEngine for PcmPlayer {
    fn play(&mut self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        if self.shared.finished.swap(false, Ordering::Relaxed) {
            self.shared.set_position(0.0);
        }
        self.ensure_stream()?;
        self.shared.playing.store(true, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|err| CantorError::Audio(format!("starting output stream: {err}")))?;
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.shared.playing.store(false, Ordering::Relaxed);
    }

    fn seek_to(&mut self, fraction: f64) {
        let frames = self.shared.samples.len() as f64;
        self.shared.set_position(fraction.clamp(0.0, 1.0) * frames);
        self.shared.finished.store(false, Ordering::Relaxed);
    }

    fn current_time(&self) -> f64 {
        self.shared.position() / self.shared.sample_rate as f64
    }

    fn duration(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.shared.samples.len() as f64 / self.shared.sample_rate as f64)
    }

    fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Relaxed)
    }

    fn has_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Relaxed)
    }
}

/// Opens the default output device and starts a stream reading from `shared`.
fn open_output(shared: Arc<Shared>) -> anyhow::Result<Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No output device available"))?;
    let supported = device
        .default_output_config()
        .context("querying default output config")?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    log::info!(
        "Output device: {} ({} Hz, {} channel(s))",
        device.name().unwrap_or_else(|_| "unknown".into()),
        config.sample_rate.0,
        config.channels
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_output::<f32>(&device, &config, shared)?,
        SampleFormat::I16 => build_output::<i16>(&device, &config, shared)?,
        SampleFormat::U16 => build_output::<u16>(&device, &config, shared)?,
        other => return Err(anyhow!("Unsupported output sample format: {other:?}")),
    };
    Ok(stream)
}

fn build_output<T>(device: &cpal::Device, config: &StreamConfig, shared: Arc<Shared>) -> anyhow::Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let rate_ratio = shared.sample_rate as f64 / config.sample_rate.0.max(1) as f64;
    let err_fn = |err: cpal::StreamError| log::error!("Output stream error: {err}");

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if !shared.playing.load(Ordering::Relaxed) {
                    data.fill(T::from_sample(0.0_f32));
                    return;
                }
                let step = rate_ratio * shared.speed() as f64;
                let end = shared.samples.len() as f64;
                let mut position = shared.position();

                for frame in data.chunks_mut(channels) {
                    let value = if position < end {
                        let value = shared.sample_at(position);
                        position += step;
                        value
                    } else {
                        0.0
                    };
                    frame.fill(T::from_sample(value));
                }

                if position >= end {
                    shared.playing.store(false, Ordering::Relaxed);
                    shared.finished.store(true, Ordering::Relaxed);
                    position = end;
                }
                shared.set_position(position);
            },
            err_fn,
            None,
        )
        .context("building output stream")?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(channels: u16, frames: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &sample in frames {
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn stereo_wav_is_mixed_to_mono() {
        let bytes = wav_bytes(2, &[16_384, 0, 16_384, 0, -16_384, -16_384]);
        let player = PcmPlayer::from_wav_bytes(&bytes).unwrap();
        assert_eq!(player.samples().len(), 3);
        assert!((player.samples()[0] - 0.25).abs() < 1e-3);
        assert!((player.samples()[2] + 0.5).abs() < 1e-3);
        assert_eq!(player.sample_rate(), 8_000);
    }

    #[test]
    fn seek_and_duration() {
        let mut player = PcmPlayer::new(vec![0.0; 8_000], 4_000);
        assert_eq!(player.duration(), Some(2.0));
        player.seek_to(0.25);
        assert!((player.current_time() - 0.5).abs() < 1e-9);
        assert!((player.progress() - 0.25).abs() < 1e-9);
        player.seek_to(3.0);
        assert!((player.current_time() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn empty_player_has_no_duration() {
        let mut player = PcmPlayer::empty();
        assert_eq!(player.duration(), None);
        assert!(player.play().is_ok());
        assert!(!player.is_playing());
    }

    #[test]
    fn interpolation_between_samples() {
        let player = PcmPlayer::new(vec![0.0, 1.0], 10);
        assert!((player.shared.sample_at(0.5) - 0.5).abs() < 1e-6);
        assert_eq!(player.shared.sample_at(5.0), 0.0);
    }

    #[test]
    fn speed_is_clamped() {
        let player = PcmPlayer::empty();
        player.set_speed(10.0);
        assert_eq!(player.speed(), MAX_SPEED);
        player.set_speed(f32::NAN);
        assert_eq!(player.speed(), 1.0);
    }

    #[test]
    fn garbage_is_an_audio_error() {
        assert!(matches!(
            PcmPlayer::from_wav_bytes(b"not a wav"),
            Err(CantorError::Audio(_))
        ));
    }
}
