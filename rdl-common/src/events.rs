//! Event types for the RDL event system
//!
//! Provides the shared event definitions and the EventBus used to push
//! state changes to every connected display client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Lesson player events
///
/// Broadcast via EventBus and serialized for SSE transmission. The display
/// layer re-renders from current state whenever one arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LessonEvent {
    /// Lesson list fetched and published
    LessonsLoaded {
        /// Number of lessons in the list
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Lesson list fetch failed; the list stays empty
    LessonsLoadFailed {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Audio metadata loaded for a lesson
    DurationLoaded {
        lesson_id: i64,
        duration_seconds: f64,
        timestamp: DateTime<Utc>,
    },

    /// A lesson started or stopped playing, or was seeked
    PlaybackChanged {
        lesson_id: i64,
        playing: bool,
        progress_seconds: f64,
        duration_seconds: f64,
        timestamp: DateTime<Utc>,
    },

    /// Periodic progress of the playing lesson
    PlaybackProgress {
        lesson_id: i64,
        progress_seconds: f64,
        duration_seconds: f64,
        timestamp: DateTime<Utc>,
    },

    /// Lesson audio reached its end
    PlaybackEnded {
        lesson_id: i64,
        timestamp: DateTime<Utc>,
    },

    /// Lesson audio could not be loaded
    AudioLoadFailed {
        lesson_id: i64,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl LessonEvent {
    /// SSE event name for this event
    pub fn event_type(&self) -> &'static str {
        match self {
            LessonEvent::LessonsLoaded { .. } => "LessonsLoaded",
            LessonEvent::LessonsLoadFailed { .. } => "LessonsLoadFailed",
            LessonEvent::DurationLoaded { .. } => "DurationLoaded",
            LessonEvent::PlaybackChanged { .. } => "PlaybackChanged",
            LessonEvent::PlaybackProgress { .. } => "PlaybackProgress",
            LessonEvent::PlaybackEnded { .. } => "PlaybackEnded",
            LessonEvent::AudioLoadFailed { .. } => "AudioLoadFailed",
        }
    }

    /// Lesson this event refers to, if any
    pub fn lesson_id(&self) -> Option<i64> {
        match self {
            LessonEvent::LessonsLoaded { .. } | LessonEvent::LessonsLoadFailed { .. } => None,
            LessonEvent::DurationLoaded { lesson_id, .. }
            | LessonEvent::PlaybackChanged { lesson_id, .. }
            | LessonEvent::PlaybackProgress { lesson_id, .. }
            | LessonEvent::PlaybackEnded { lesson_id, .. }
            | LessonEvent::AudioLoadFailed { lesson_id, .. } => Some(*lesson_id),
        }
    }
}

/// One-to-many event broadcaster
///
/// Wraps a tokio broadcast channel. Slow subscribers lag and lose the oldest
/// events rather than blocking emitters.
pub struct EventBus {
    tx: broadcast::Sender<LessonEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use rdl_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<LessonEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: LessonEvent,
    ) -> Result<usize, broadcast::error::SendError<LessonEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: LessonEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
