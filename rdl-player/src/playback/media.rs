//! Media handle abstraction
//!
//! A handle is one playable audio resource. Handles report what happens to
//! them (metadata loaded, progress, end, failures) as `MediaEvent`s on a
//! channel owned by the playback manager, instead of calling back into it.

use crate::error::Result;
use tokio::sync::mpsc;

/// Notification from a media handle
#[derive(Debug, Clone, PartialEq)]
pub struct MediaEvent {
    pub lesson_id: i64,
    pub kind: MediaEventKind,
}

/// What happened to the handle
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEventKind {
    /// Duration became known
    MetadataLoaded { duration_seconds: f64 },
    /// Playback position advanced. The handle's `position()` is updated
    /// before this is sent.
    TimeUpdate { position_seconds: f64 },
    /// Playback reached the end of the resource
    Ended,
    /// The audio resource could not be fetched or probed
    LoadFailed { message: String },
    /// Playback stopped on a decode or output error
    PlaybackFailed { message: String },
}

/// Sending side of the media event channel
pub type MediaEventSender = mpsc::UnboundedSender<MediaEvent>;

/// Receiving side of the media event channel
pub type MediaEventReceiver = mpsc::UnboundedReceiver<MediaEvent>;

/// Create a media event channel
pub fn media_event_channel() -> (MediaEventSender, MediaEventReceiver) {
    mpsc::unbounded_channel()
}

/// One playable audio resource, exclusively owned by the playback manager
pub trait MediaHandle: Send {
    /// Start or resume playback
    fn play(&mut self) -> Result<()>;

    /// Pause playback. Returns once the handle is no longer audible.
    fn pause(&mut self);

    /// Move the playback position. Out-of-range values are the handle's to
    /// interpret.
    fn set_position(&mut self, position_seconds: f64);

    /// Current playback position in seconds
    fn position(&self) -> f64;

    /// Duration in seconds, 0.0 while unknown
    fn duration(&self) -> f64;

    /// Stop and drop the underlying resource. Idempotent.
    fn release(&mut self);
}

/// Factory for media handles
pub trait MediaBackend: Send + Sync {
    /// Create a handle for `url`, reporting through `events`
    fn create(
        &self,
        lesson_id: i64,
        url: &str,
        events: MediaEventSender,
    ) -> Result<Box<dyn MediaHandle>>;

    /// Backend name for logs and health output
    fn name(&self) -> &'static str;
}

/// Backend producing inert handles
///
/// Used when no audio device is wanted. Handles track position but never
/// load metadata or make sound.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl MediaBackend for NullBackend {
    fn create(
        &self,
        _lesson_id: i64,
        _url: &str,
        _events: MediaEventSender,
    ) -> Result<Box<dyn MediaHandle>> {
        Ok(Box::new(NullHandle::default()))
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

#[derive(Debug, Default)]
struct NullHandle {
    position: f64,
    released: bool,
}

impl MediaHandle for NullHandle {
    fn play(&mut self) -> Result<()> {
        Ok(())
    }

    fn pause(&mut self) {}

    fn set_position(&mut self, position_seconds: f64) {
        if !self.released {
            self.position = position_seconds;
        }
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn duration(&self) -> f64 {
        0.0
    }

    fn release(&mut self) {
        self.released = true;
        self.position = 0.0;
    }
}
