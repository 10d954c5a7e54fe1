//! Playback manager
//!
//! Owns the mapping from lesson id to media handle and playback state, and
//! enforces that at most one lesson plays at any instant. The invariant is
//! kept procedurally: the playing handle is paused before another starts.
//! All mutation goes through `&mut self`, so callers serialize access by
//! holding the manager behind one async mutex.

use chrono::Utc;
use rdl_common::events::{EventBus, LessonEvent};
use rdl_common::human_time::format_time;
use rdl_common::Lesson;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::media::{
    media_event_channel, MediaBackend, MediaEvent, MediaEventKind, MediaEventReceiver,
    MediaEventSender, MediaHandle,
};
use crate::error::{Error, Result};

/// Scrub control maximum while the duration is unknown
const UNKNOWN_DURATION_SLIDER_MAX: f64 = 100.0;

/// Per-lesson playback state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackState {
    pub currently_playing: bool,
    pub progress_seconds: f64,
    pub duration_seconds: f64,
    /// Last audio load or playback failure
    pub load_error: Option<String>,
}

/// Read view of one lesson's playback, as sent to the display layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackView {
    pub lesson_id: i64,
    pub playing: bool,
    pub progress_seconds: f64,
    pub duration_seconds: f64,
    /// Upper bound for the scrub control
    pub slider_max: f64,
    /// `MM:SS` elapsed
    pub elapsed: String,
    /// `MM:SS` total
    pub total: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}

impl PlaybackView {
    fn from_state(lesson_id: i64, state: &PlaybackState) -> Self {
        let slider_max = if state.duration_seconds > 0.0 {
            state.duration_seconds
        } else {
            UNKNOWN_DURATION_SLIDER_MAX
        };

        Self {
            lesson_id,
            playing: state.currently_playing,
            progress_seconds: state.progress_seconds,
            duration_seconds: state.duration_seconds,
            slider_max,
            elapsed: format_time(state.progress_seconds),
            total: format_time(state.duration_seconds),
            load_error: state.load_error.clone(),
        }
    }

    /// View for a lesson that has no handle yet
    pub fn idle(lesson_id: i64) -> Self {
        Self::from_state(lesson_id, &PlaybackState::default())
    }
}

/// Playback manager
pub struct PlaybackManager {
    backend: Arc<dyn MediaBackend>,
    event_bus: Arc<EventBus>,
    events_tx: MediaEventSender,
    handles: BTreeMap<i64, Box<dyn MediaHandle>>,
    states: BTreeMap<i64, PlaybackState>,
    current: Option<i64>,
    torn_down: bool,
}

impl PlaybackManager {
    /// Create a manager and the receiving end of its media event channel.
    ///
    /// The receiver must be pumped into `handle_media_event`
    /// (see `spawn_event_pump`).
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        event_bus: Arc<EventBus>,
    ) -> (Self, MediaEventReceiver) {
        let (events_tx, events_rx) = media_event_channel();
        info!("Playback manager using {} backend", backend.name());

        let manager = Self {
            backend,
            event_bus,
            events_tx,
            handles: BTreeMap::new(),
            states: BTreeMap::new(),
            current: None,
            torn_down: false,
        };
        (manager, events_rx)
    }

    /// Create the handle for `lesson` unless one exists.
    ///
    /// Returns true if a handle was created. A backend failure is recorded
    /// as the lesson's `load_error`.
    pub fn ensure_handle(&mut self, lesson: &Lesson) -> bool {
        if self.torn_down || self.handles.contains_key(&lesson.id) {
            return false;
        }

        let state = self.states.entry(lesson.id).or_default();
        match self
            .backend
            .create(lesson.id, &lesson.audio_url, self.events_tx.clone())
        {
            Ok(handle) => {
                debug!(lesson_id = lesson.id, url = %lesson.audio_url, "Created audio handle");
                self.handles.insert(lesson.id, handle);
                true
            }
            Err(e) => {
                warn!(lesson_id = lesson.id, "Failed to create audio handle: {}", e);
                state.load_error = Some(e.to_string());
                false
            }
        }
    }

    /// Ensure a handle for every lesson
    pub fn ensure_handles(&mut self, lessons: &[Lesson]) -> usize {
        let created = lessons
            .iter()
            .filter(|lesson| self.ensure_handle(lesson))
            .count();
        info!("Initialized {} audio handles", created);
        created
    }

    /// Toggle playback of `id`.
    ///
    /// Pauses any other playing lesson first. If `id` is playing it is
    /// paused; otherwise it starts and becomes the only playing lesson.
    pub fn toggle_play(&mut self, id: i64) -> Result<PlaybackView> {
        if self.torn_down {
            return Err(Error::InvalidState("playback manager released".to_string()));
        }

        if let Some(other) = self.current.filter(|&current| current != id) {
            self.pause_lesson(other);
            self.current = None;
            self.emit_changed(other);
        }

        let handle = self.handles.get_mut(&id).ok_or(Error::LessonNotFound(id))?;
        let state = self.states.entry(id).or_default();

        if self.current == Some(id) {
            handle.pause();
            state.currently_playing = false;
            state.progress_seconds = handle.position();
            self.current = None;
            info!(lesson_id = id, "Paused");
        } else {
            if let Err(e) = handle.play() {
                warn!(lesson_id = id, "Failed to start playback: {}", e);
                state.load_error = Some(e.to_string());
                self.emit_changed(id);
                return Err(e);
            }
            state.currently_playing = true;
            self.current = Some(id);
            info!(lesson_id = id, "Playing");
        }

        self.emit_changed(id);
        self.view(id).ok_or(Error::LessonNotFound(id))
    }

    /// Move the playback position of `id`.
    ///
    /// The reported progress is updated immediately, without waiting for the
    /// next time update. The value is not clamped here.
    pub fn seek(&mut self, id: i64, position_seconds: f64) -> Result<PlaybackView> {
        if self.torn_down {
            return Err(Error::InvalidState("playback manager released".to_string()));
        }

        let handle = self.handles.get_mut(&id).ok_or(Error::LessonNotFound(id))?;
        handle.set_position(position_seconds);

        let state = self.states.entry(id).or_default();
        state.progress_seconds = position_seconds;
        debug!(lesson_id = id, position_seconds, "Seek");

        self.emit_changed(id);
        self.view(id).ok_or(Error::LessonNotFound(id))
    }

    /// Pause and release every handle. Runs once; later calls do nothing.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        let count = self.handles.len();
        for (_, mut handle) in std::mem::take(&mut self.handles) {
            handle.pause();
            handle.release();
        }
        for state in self.states.values_mut() {
            state.currently_playing = false;
        }
        self.current = None;

        info!("Released {} audio handles", count);
    }

    /// Apply a notification from a handle.
    ///
    /// Ignored after teardown and for lessons the manager does not know.
    pub fn handle_media_event(&mut self, event: MediaEvent) {
        if self.torn_down {
            return;
        }

        let id = event.lesson_id;
        let Some(state) = self.states.get_mut(&id) else {
            debug!(lesson_id = id, "Ignoring event for unknown lesson");
            return;
        };

        let timestamp = Utc::now();
        let lesson_event = match event.kind {
            MediaEventKind::MetadataLoaded { duration_seconds } => {
                state.duration_seconds = if duration_seconds.is_finite() && duration_seconds > 0.0 {
                    duration_seconds
                } else {
                    0.0
                };
                state.load_error = None;
                debug!(lesson_id = id, duration = state.duration_seconds, "Metadata loaded");
                LessonEvent::DurationLoaded {
                    lesson_id: id,
                    duration_seconds: state.duration_seconds,
                    timestamp,
                }
            }
            MediaEventKind::TimeUpdate { position_seconds } => {
                // A queued update may predate a seek or pause; the handle
                // knows where it actually is
                let position_seconds = self
                    .handles
                    .get(&id)
                    .map_or(position_seconds, |handle| handle.position());
                state.progress_seconds = position_seconds;
                LessonEvent::PlaybackProgress {
                    lesson_id: id,
                    progress_seconds: position_seconds,
                    duration_seconds: state.duration_seconds,
                    timestamp,
                }
            }
            MediaEventKind::Ended => {
                state.currently_playing = false;
                if self.current == Some(id) {
                    self.current = None;
                }
                info!(lesson_id = id, "Playback ended");
                LessonEvent::PlaybackEnded {
                    lesson_id: id,
                    timestamp,
                }
            }
            MediaEventKind::LoadFailed { message } | MediaEventKind::PlaybackFailed { message } => {
                warn!(lesson_id = id, "Audio failure: {}", message);
                state.currently_playing = false;
                state.load_error = Some(message.clone());
                if self.current == Some(id) {
                    self.current = None;
                }
                LessonEvent::AudioLoadFailed {
                    lesson_id: id,
                    message,
                    timestamp,
                }
            }
        };

        self.event_bus.emit_lossy(lesson_event);
    }

    /// Playback state of one lesson
    pub fn state(&self, id: i64) -> Option<&PlaybackState> {
        self.states.get(&id)
    }

    /// Display view of one lesson
    pub fn view(&self, id: i64) -> Option<PlaybackView> {
        self.states
            .get(&id)
            .map(|state| PlaybackView::from_state(id, state))
    }

    /// Views for `lessons` in the given order; lessons without state get an
    /// idle view
    pub fn views(&self, lessons: &[Lesson]) -> Vec<PlaybackView> {
        lessons
            .iter()
            .map(|lesson| {
                self.view(lesson.id)
                    .unwrap_or_else(|| PlaybackView::idle(lesson.id))
            })
            .collect()
    }

    /// Known duration of a lesson, 0.0 while unknown
    pub fn duration(&self, id: i64) -> Option<f64> {
        self.states.get(&id).map(|state| state.duration_seconds)
    }

    /// Lesson currently marked as playing
    pub fn current(&self) -> Option<i64> {
        self.current
    }

    /// All lessons whose state says playing (at most one)
    pub fn playing_ids(&self) -> Vec<i64> {
        self.states
            .iter()
            .filter(|(_, state)| state.currently_playing)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Number of live handles
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    pub fn has_handle(&self, id: i64) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn pause_lesson(&mut self, id: i64) {
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.pause();
            if let Some(state) = self.states.get_mut(&id) {
                state.currently_playing = false;
                state.progress_seconds = handle.position();
            }
            info!(lesson_id = id, "Paused to start another lesson");
        }
    }

    fn emit_changed(&self, id: i64) {
        if let Some(state) = self.states.get(&id) {
            self.event_bus.emit_lossy(LessonEvent::PlaybackChanged {
                lesson_id: id,
                playing: state.currently_playing,
                progress_seconds: state.progress_seconds,
                duration_seconds: state.duration_seconds,
                timestamp: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::media::NullBackend;

    fn lesson(id: i64) -> Lesson {
        Lesson {
            id,
            number: id,
            name: format!("Lesson {}", id),
            description: String::new(),
            audio_url: format!("https://cdn.example.com/{}.mp3", id),
        }
    }

    fn manager() -> PlaybackManager {
        let (manager, _rx) = PlaybackManager::new(Arc::new(NullBackend), Arc::new(EventBus::new(64)));
        manager
    }

    #[test]
    fn test_ensure_handle_is_idempotent() {
        let mut manager = manager();
        assert!(manager.ensure_handle(&lesson(1)));
        assert!(!manager.ensure_handle(&lesson(1)));
        assert_eq!(manager.handle_count(), 1);
    }

    #[test]
    fn test_toggle_twice_pauses() {
        let mut manager = manager();
        manager.ensure_handles(&[lesson(1)]);

        assert!(manager.toggle_play(1).unwrap().playing);
        assert!(!manager.toggle_play(1).unwrap().playing);
        assert!(manager.playing_ids().is_empty());
        assert_eq!(manager.current(), None);
    }

    #[test]
    fn test_toggle_unknown_lesson() {
        let mut manager = manager();
        assert!(matches!(manager.toggle_play(5), Err(Error::LessonNotFound(5))));
    }

    #[test]
    fn test_seek_updates_progress_immediately() {
        let mut manager = manager();
        manager.ensure_handles(&[lesson(1)]);

        let view = manager.seek(1, 30.0).unwrap();
        assert_eq!(view.progress_seconds, 30.0);
        assert_eq!(view.elapsed, "00:30");
        assert_eq!(manager.state(1).unwrap().progress_seconds, 30.0);
    }

    #[test]
    fn test_metadata_sanitizes_duration() {
        let mut manager = manager();
        manager.ensure_handles(&[lesson(1)]);

        manager.handle_media_event(MediaEvent {
            lesson_id: 1,
            kind: MediaEventKind::MetadataLoaded {
                duration_seconds: f64::NAN,
            },
        });
        assert_eq!(manager.duration(1), Some(0.0));
        assert_eq!(manager.view(1).unwrap().slider_max, 100.0);

        manager.handle_media_event(MediaEvent {
            lesson_id: 1,
            kind: MediaEventKind::MetadataLoaded {
                duration_seconds: 125.0,
            },
        });
        let view = manager.view(1).unwrap();
        assert_eq!(view.slider_max, 125.0);
        assert_eq!(view.total, "02:05");
    }

    #[test]
    fn test_teardown_with_no_lessons() {
        let mut manager = manager();
        manager.teardown();
        assert!(manager.is_torn_down());
        manager.teardown();
        assert!(matches!(manager.toggle_play(1), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_events_ignored_after_teardown() {
        let mut manager = manager();
        manager.ensure_handles(&[lesson(1)]);
        manager.teardown();

        manager.handle_media_event(MediaEvent {
            lesson_id: 1,
            kind: MediaEventKind::TimeUpdate {
                position_seconds: 12.0,
            },
        });
        assert_eq!(manager.state(1).unwrap().progress_seconds, 0.0);
        assert!(!manager.ensure_handle(&lesson(2)));
    }

    #[test]
    fn test_idle_view() {
        let view = PlaybackView::idle(3);
        assert!(!view.playing);
        assert_eq!(view.elapsed, "00:00");
        assert_eq!(view.total, "00:00");
        assert_eq!(view.slider_max, 100.0);
    }
}
