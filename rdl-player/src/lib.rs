//! # Ramadan Lessons Player (rdl-player)
//!
//! Fetches the lesson list once, plays lesson audio with at most one lesson
//! audible at a time, and serves a small HTML/JSON/SSE control surface.
//!
//! **Architecture:** lesson loader → shared state → playback manager →
//! event bus → SSE. Audio output uses symphonia + rubato + cpal behind the
//! `device` feature.

pub mod api;
#[cfg(feature = "device")]
pub mod audio;
pub mod error;
pub mod loader;
pub mod playback;
pub mod state;

pub use error::{Error, Result};
pub use state::SharedState;
