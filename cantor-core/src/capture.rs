//! # Audio Capture Module
//!
//! Microphone capture on a dedicated worker thread.
//!
//! ## Features
//! - Default input device selection with cpal
//! - Mixdown to mono and framing into `BUFFER_SIZE` blocks
//! - Pitch extraction on the worker, results sent over a crossbeam channel
//! - Start-up failures reported synchronously, with nothing left running
//! - Ordered shutdown: extraction loop, then device stream, then thread

use std::thread::{self, JoinHandle};
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender};

use crate::error::{CantorError, Result};
use crate::pitch::{DetectedPitch, ExtractorConfig, PitchExtractor};

/// Samples per analysis frame (~46 ms at 44.1 kHz).
pub const BUFFER_SIZE: usize = 2048;

/// Messages from the capture worker.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// One analysed frame, stamped when analysis finished.
    Pitch { detected: DetectedPitch, at: Instant },
    /// The mono samples of the same frame, for recording.
    Audio(Vec<f32>),
    /// The device stream reported an error after start-up.
    Failed(String),
}

/// A running capture. Dropping it stops the worker.
#[derive(Debug)]
pub struct CaptureHandle {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl CaptureHandle {
    /// Opens the default input device and starts extracting pitch.
    ///
    /// Blocks until the device is either streaming or has failed.
    pub fn start(config: ExtractorConfig, events: Sender<CaptureEvent>) -> Result<Self> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<u32>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let thread_handle = thread::Builder::new()
            .name("cantor-capture".into())
            .spawn(move || capture_worker(config, events, shutdown_rx, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => {
                log::info!("Capture started at {sample_rate} Hz");
                Ok(Self {
                    shutdown_tx,
                    thread_handle: Some(thread_handle),
                    sample_rate,
                })
            }
            Ok(Err(err)) => {
                let _ = thread_handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread_handle.join();
                Err(CantorError::CaptureDenied("capture thread exited during start-up".into()))
            }
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stops extraction, releases the device and joins the worker.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        let _ = self.shutdown_tx.send(());
        if handle.join().is_err() {
            log::error!("Capture thread panicked");
        }
        log::info!("Capture stopped");
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn capture_worker(
    config: ExtractorConfig,
    events: Sender<CaptureEvent>,
    shutdown_rx: Receiver<()>,
    ready_tx: Sender<Result<u32>>,
) {
    let (frame_tx, frame_rx) = crossbeam_channel::unbounded::<Vec<f32>>();
    let (stream, sample_rate) = match open_input(frame_tx, events.clone()) {
        Ok(opened) => opened,
        Err(err) => {
            log::warn!("Capture start failed: {err}");
            let _ = ready_tx.send(Err(err));
            return;
        }
    };
    if ready_tx.send(Ok(sample_rate)).is_err() {
        return;
    }

    let mut extractor = PitchExtractor::new(config);
    loop {
        crossbeam_channel::select! {
            recv(frame_rx) -> msg => match msg {
                Ok(frame) => {
                    let detected = extractor.process(&frame, sample_rate);
                    let at = Instant::now();
                    if events.send(CaptureEvent::Pitch { detected, at }).is_err()
                        || events.send(CaptureEvent::Audio(frame)).is_err()
                    {
                        log::debug!("Capture receiver gone");
                        break;
                    }
                }
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => break,
        }
    }

    if let Err(err) = stream.pause() {
        log::warn!("Error pausing input stream: {err}");
    }
    drop(stream);
}

/// Opens the default input and starts it. Frames of `BUFFER_SIZE` mono
/// samples are sent to `frames`.
fn open_input(frames: Sender<Vec<f32>>, events: Sender<CaptureEvent>) -> Result<(Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CantorError::CaptureDenied("No input device available".into()))?;
    log::info!(
        "Using audio input device: {}",
        device.name().unwrap_or_else(|_| "unknown".into())
    );

    let supported = device
        .default_input_config()
        .map_err(|err| CantorError::CaptureDenied(err.to_string()))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let sample_rate = config.sample_rate.0;

    let stream = match sample_format {
        SampleFormat::F32 => build_input::<f32>(&device, &config, frames, events),
        SampleFormat::I16 => build_input::<i16>(&device, &config, frames, events),
        SampleFormat::U16 => build_input::<u16>(&device, &config, frames, events),
        other => {
            return Err(CantorError::CaptureDenied(format!(
                "Unsupported input sample format: {other:?}"
            )));
        }
    }
    .map_err(|err| match err {
        BuildStreamError::DeviceNotAvailable => CantorError::CaptureBusy(err.to_string()),
        other => CantorError::CaptureDenied(other.to_string()),
    })?;

    stream
        .play()
        .map_err(|err| CantorError::CaptureBusy(err.to_string()))?;
    Ok((stream, sample_rate))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    frames: Sender<Vec<f32>>,
    events: Sender<CaptureEvent>,
) -> std::result::Result<Stream, BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let mut audio_buffer: Vec<f32> = Vec::with_capacity(BUFFER_SIZE * 2);

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            audio_buffer.extend(
                data.chunks(channels)
                    .map(|frame| frame.iter().map(|s| s.to_sample::<f32>()).sum::<f32>() / frame.len() as f32),
            );
            while audio_buffer.len() >= BUFFER_SIZE {
                let frame: Vec<f32> = audio_buffer.drain(..BUFFER_SIZE).collect();
                let _ = frames.try_send(frame);
            }
        },
        move |err| {
            log::error!("Input stream error: {err}");
            let _ = events.try_send(CaptureEvent::Failed(err.to_string()));
        },
        None,
    )
}
