//! # UI Module
//!
//! Layout of the practice screen and its passive display widgets.

pub mod cent_meter;
pub mod main_display;
