//! Test helper modules for rdl-player integration tests
//!
//! - RecordingBackend: media backend that records every handle call
//! - LessonsApi: local stand-in for the remote lessons endpoint
//! - TestServer: router plus state and manager, driven via `oneshot`

#![allow(dead_code)]

pub mod lessons_api;
pub mod recording_backend;
pub mod test_server;

pub use lessons_api::LessonsApi;
pub use recording_backend::{HandleCall, RecordingBackend};
pub use test_server::TestServer;

use rdl_common::Lesson;

/// Lesson fixture with a predictable audio URL
pub fn lesson(id: i64, number: i64) -> Lesson {
    Lesson {
        id,
        number,
        name: format!("Lesson {}", number),
        description: format!("Description {}", number),
        audio_url: format!("https://cdn.example.com/lessons/{}.mp3", id),
    }
}
