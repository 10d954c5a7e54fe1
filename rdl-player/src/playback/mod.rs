//! Playback management
//!
//! The manager plus the media handle abstraction it drives.

pub mod manager;
pub mod media;

pub use manager::{PlaybackManager, PlaybackState, PlaybackView};
pub use media::{
    media_event_channel, MediaBackend, MediaEvent, MediaEventKind, MediaEventReceiver,
    MediaEventSender, MediaHandle, NullBackend,
};

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Manager shared between HTTP handlers, the loader and the event pump
pub type SharedManager = Arc<Mutex<PlaybackManager>>;

/// Apply media events to the manager until every sender is dropped.
///
/// Runs as a single task so handle notifications are serialized with user
/// actions through the manager lock.
pub fn spawn_event_pump(manager: SharedManager, mut events: MediaEventReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            manager.lock().await.handle_media_event(event);
        }
        debug!("Media event channel closed");
    })
}
