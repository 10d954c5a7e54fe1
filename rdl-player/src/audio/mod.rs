//! Audio playback on the host output device
//!
//! Pipeline: symphonia decode → rubato resample → ringbuf → cpal output.
//! Compiled with the `device` feature.

pub mod decoder;
pub mod device;
pub mod output;
pub mod resampler;
pub mod types;

pub use device::{DeviceBackend, DeviceSettings};
pub use types::AudioFrame;
