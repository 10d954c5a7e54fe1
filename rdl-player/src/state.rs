//! Shared lesson list state
//!
//! Holds the loader's output (lesson list and load status) and the event
//! bus. Uses RwLock for concurrent read access with rare writes.

use chrono::Utc;
use rdl_common::events::{EventBus, LessonEvent};
use rdl_common::Lesson;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

/// Outcome of the one-shot lesson fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadStatus {
    /// Fetch has not resolved yet
    Loading,
    /// Lessons published
    Loaded,
    /// Fetch failed; the list stays empty
    Failed { message: String },
}

/// Shared state accessible by all components
pub struct SharedState {
    lessons: RwLock<Vec<Lesson>>,
    load_status: RwLock<LoadStatus>,
    event_bus: Arc<EventBus>,
}

impl SharedState {
    /// Create state in the `Loading` status with an empty lesson list
    pub fn new(event_capacity: usize) -> Self {
        Self {
            lessons: RwLock::new(Vec::new()),
            load_status: RwLock::new(LoadStatus::Loading),
            event_bus: Arc::new(EventBus::new(event_capacity)),
        }
    }

    /// Lessons in display order
    pub async fn lessons(&self) -> Vec<Lesson> {
        self.lessons.read().await.clone()
    }

    /// Look up one lesson by id
    pub async fn lesson(&self, id: i64) -> Option<Lesson> {
        self.lessons.read().await.iter().find(|l| l.id == id).cloned()
    }

    /// Current load status
    pub async fn load_status(&self) -> LoadStatus {
        self.load_status.read().await.clone()
    }

    /// True only before the fetch resolves (success or failure)
    pub async fn is_loading(&self) -> bool {
        matches!(*self.load_status.read().await, LoadStatus::Loading)
    }

    /// Publish a fetched lesson list and clear the loading flag
    pub async fn publish_lessons(&self, lessons: Vec<Lesson>) {
        let count = lessons.len();
        *self.lessons.write().await = lessons;
        *self.load_status.write().await = LoadStatus::Loaded;
        info!("Published {} lessons", count);

        self.event_bus.emit_lossy(LessonEvent::LessonsLoaded {
            count,
            timestamp: Utc::now(),
        });
    }

    /// Record a failed fetch and clear the loading flag.
    ///
    /// The lesson list is left as is (empty).
    pub async fn fail_load(&self, message: String) {
        *self.load_status.write().await = LoadStatus::Failed {
            message: message.clone(),
        };

        self.event_bus.emit_lossy(LessonEvent::LessonsLoadFailed {
            message,
            timestamp: Utc::now(),
        });
    }

    /// Event bus shared with the playback manager
    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Subscribe to event stream for SSE
    pub fn subscribe_events(&self) -> broadcast::Receiver<LessonEvent> {
        self.event_bus.subscribe()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(100)
    }
}
