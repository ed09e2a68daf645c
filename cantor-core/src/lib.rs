// cantor-core/src/lib.rs

//! The core logic for the Cantor vocal trainer.
//! This crate is responsible for pitch capture and conditioning, mapping
//! live singing onto the reference timeline, viewport and scene layout for
//! the pitch graph, and keeping the two audio players in sync. It is
//! completely headless and contains no GUI code.

pub mod activity;
pub mod alignment;
pub mod backend;
pub mod capture;
pub mod compare;
pub mod conditioner;
pub mod error;
pub mod fft;
pub mod history;
pub mod marker;
pub mod pitch;
pub mod playback;
pub mod recording;
pub mod render;
pub mod sample;
pub mod session;
pub mod settings;
pub mod sync;
pub mod viewport;

pub use error::{CantorError, Result};
pub use marker::{Marker, Region, Severity};
pub use sample::{PitchSample, PitchSeries, SeriesKind};
