//! # RDL Common Library
//!
//! Shared code for the Ramadan lessons player:
//! - Lesson records and list normalization
//! - Event types (LessonEvent enum) and the event bus
//! - Configuration loading
//! - Time formatting for the display layer

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod lesson;

pub use error::{Error, Result};
pub use human_time::format_time;
pub use lesson::Lesson;
