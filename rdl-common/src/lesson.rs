//! Lesson records as served by the lessons API
//!
//! The API returns a JSON array of lesson objects. The list is normalized
//! (audio URLs) and ordered by lesson number before anything displays it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// One audio lesson
///
/// Immutable once fetched. Field names follow the API (`audioUrl`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    /// Unique key
    pub id: i64,
    /// Display order and sort key
    pub number: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Absolute URL of the audio resource
    pub audio_url: String,
}

/// Normalize a lesson audio URL.
///
/// The API already serves absolute URLs, so this is the identity.
pub fn normalize_audio_url(url: &str) -> String {
    url.to_string()
}

/// Sort lessons ascending by `number`.
///
/// Stable: lessons sharing a number keep their API order.
pub fn sort_lessons(lessons: &mut [Lesson]) {
    lessons.sort_by_key(|lesson| lesson.number);
}

/// Parse a lessons response body into a normalized, sorted list.
///
/// The body is handled as text so a server that mislabels its content type
/// still parses.
pub fn parse_lessons(body: &str) -> Result<Vec<Lesson>> {
    let mut lessons: Vec<Lesson> = serde_json::from_str(body)
        .map_err(|e| Error::Parse(format!("Invalid lessons payload: {}", e)))?;

    for lesson in lessons.iter_mut() {
        lesson.audio_url = normalize_audio_url(&lesson.audio_url);
    }
    sort_lessons(&mut lessons);

    Ok(lessons)
}
