//! Output-device media backend
//!
//! Each handle downloads its audio resource in the background, probes it for
//! duration, and plays it on the default output device when asked. A
//! playback session runs on its own thread:
//!
//! ```text
//! StreamDecoder -> StreamResampler -> ring buffer -> cpal callback
//! ```
//!
//! Sessions never touch manager state; they report through `MediaEvent`s.

use crate::audio::decoder::{probe, StreamDecoder};
use crate::audio::output::AudioOutput;
use crate::audio::resampler::StreamResampler;
use crate::audio::types::AudioFrame;
use crate::error::{Error, Result};
use crate::playback::media::{MediaBackend, MediaEvent, MediaEventKind, MediaEventSender, MediaHandle};
use rdl_common::config::TomlConfig;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Audio downloads allowed in flight at once
const MAX_CONCURRENT_FETCHES: usize = 4;

/// Ring buffer length, in seconds of device audio
const RING_SECONDS: f64 = 0.5;

/// Feeder sleep when the ring buffer is full or draining
const FEED_IDLE: Duration = Duration::from_millis(5);

/// Playback settings shared by every handle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceSettings {
    /// Output volume (0.0-1.0)
    pub volume: f32,
    /// Interval between `TimeUpdate` events
    pub progress_interval: Duration,
}

impl DeviceSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            volume: config.volume,
            progress_interval: config.progress_interval(),
        }
    }
}

/// Backend playing on the default output device
pub struct DeviceBackend {
    runtime: Handle,
    http_client: reqwest::Client,
    settings: DeviceSettings,
    fetch_permits: Arc<Semaphore>,
}

impl DeviceBackend {
    /// Create the backend. Downloads are spawned on `runtime`.
    pub fn new(runtime: Handle, settings: DeviceSettings, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("rdl-player/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            runtime,
            http_client,
            settings,
            fetch_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_FETCHES)),
        })
    }
}

impl MediaBackend for DeviceBackend {
    fn create(
        &self,
        lesson_id: i64,
        url: &str,
        events: MediaEventSender,
    ) -> Result<Box<dyn MediaHandle>> {
        let shared = Arc::new(HandleShared {
            lesson_id,
            url: url.to_string(),
            events,
            settings: self.settings,
            inner: Mutex::new(HandleInner::default()),
        });

        let fetch = self.runtime.spawn(fetch_audio(
            self.http_client.clone(),
            Arc::clone(&shared),
            Arc::clone(&self.fetch_permits),
        ));

        Ok(Box::new(DeviceHandle {
            shared,
            fetch: Some(fetch),
        }))
    }

    fn name(&self) -> &'static str {
        "device"
    }
}

/// Downloaded and probed audio resource
#[derive(Clone)]
struct LoadedAudio {
    data: Arc<[u8]>,
    extension: Option<String>,
    duration_seconds: f64,
}

struct Session {
    stop: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
}

impl Session {
    fn halt(self) {
        self.stop.store(true, Ordering::SeqCst);
        if self.thread.join().is_err() {
            warn!("Playback thread panicked");
        }
    }
}

#[derive(Default)]
struct HandleInner {
    audio: Option<LoadedAudio>,
    load_error: Option<String>,
    position_seconds: f64,
    /// Play was requested; honored as soon as audio is loaded
    play_requested: bool,
    session: Option<Session>,
    released: bool,
}

impl HandleInner {
    fn duration(&self) -> f64 {
        self.audio.as_ref().map_or(0.0, |a| a.duration_seconds)
    }

    fn owns_session(&self, stop: &Arc<AtomicBool>) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| Arc::ptr_eq(&session.stop, stop))
    }
}

/// State shared between a handle, its fetch task and its playback thread
struct HandleShared {
    lesson_id: i64,
    url: String,
    events: MediaEventSender,
    settings: DeviceSettings,
    inner: Mutex<HandleInner>,
}

impl HandleShared {
    fn lock(&self) -> MutexGuard<'_, HandleInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, kind: MediaEventKind) {
        // The manager may already be gone during shutdown
        let _ = self.events.send(MediaEvent {
            lesson_id: self.lesson_id,
            kind,
        });
    }

    fn on_loaded(self: &Arc<Self>, audio: LoadedAudio) {
        let duration_seconds = audio.duration_seconds;
        let mut inner = self.lock();
        if inner.released {
            return;
        }
        inner.audio = Some(audio);
        inner.load_error = None;

        let start_now = inner.play_requested && inner.session.is_none();
        let started = if start_now {
            self.start_session(&mut inner, true)
        } else {
            Ok(())
        };
        drop(inner);

        self.emit(MediaEventKind::MetadataLoaded { duration_seconds });
        if let Err(e) = started {
            self.emit(MediaEventKind::PlaybackFailed {
                message: e.to_string(),
            });
        }
    }

    fn on_load_failed(&self, message: String) {
        let mut inner = self.lock();
        if inner.released {
            return;
        }
        inner.load_error = Some(message.clone());
        inner.play_requested = false;
        drop(inner);

        self.emit(MediaEventKind::LoadFailed { message });
    }

    /// Spawn a playback thread from the current position.
    ///
    /// With `restart_at_end`, a position at or past the end starts over from
    /// 0; otherwise the session ends immediately.
    fn start_session(self: &Arc<Self>, inner: &mut HandleInner, restart_at_end: bool) -> Result<()> {
        let audio = inner
            .audio
            .clone()
            .ok_or_else(|| Error::InvalidState("audio not loaded".to_string()))?;

        let duration = audio.duration_seconds;
        if restart_at_end && duration > 0.0 && inner.position_seconds >= duration {
            inner.position_seconds = 0.0;
        }
        let start = inner.position_seconds;

        let stop = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(self);
        let thread_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(format!("rdl-playback-{}", self.lesson_id))
            .spawn(move || run_session(shared, audio, start, thread_stop))
            .map_err(|e| Error::Playback(format!("Failed to spawn playback thread: {}", e)))?;

        inner.session = Some(Session { stop, thread });
        debug!(lesson_id = self.lesson_id, start, "Playback session started");
        Ok(())
    }

    fn report_progress(&self, stop: &Arc<AtomicBool>, position_seconds: f64) {
        let mut inner = self.lock();
        if inner.released || !inner.owns_session(stop) {
            return;
        }
        inner.position_seconds = position_seconds;
        drop(inner);

        self.emit(MediaEventKind::TimeUpdate { position_seconds });
    }

    /// Session stopped from outside; keep where it got to
    fn record_stop(&self, position_seconds: f64) {
        let mut inner = self.lock();
        if !inner.released {
            inner.position_seconds = position_seconds;
        }
    }

    fn finish_session(&self, stop: &Arc<AtomicBool>) {
        let mut inner = self.lock();
        if inner.released || !inner.owns_session(stop) {
            return;
        }
        // Dropping the join handle detaches this (exiting) thread
        inner.session = None;
        inner.play_requested = false;
        inner.position_seconds = inner.duration();
        let position_seconds = inner.position_seconds;
        drop(inner);

        self.emit(MediaEventKind::TimeUpdate { position_seconds });
        self.emit(MediaEventKind::Ended);
    }

    fn fail_session(&self, stop: &Arc<AtomicBool>, error: Error) {
        let mut inner = self.lock();
        if inner.released || !inner.owns_session(stop) {
            return;
        }
        inner.session = None;
        inner.play_requested = false;
        drop(inner);

        warn!(lesson_id = self.lesson_id, "Playback failed: {}", error);
        self.emit(MediaEventKind::PlaybackFailed {
            message: error.to_string(),
        });
    }
}

/// Media handle backed by the output device
pub struct DeviceHandle {
    shared: Arc<HandleShared>,
    fetch: Option<JoinHandle<()>>,
}

impl DeviceHandle {
    /// Stop the running session, if any, without holding the lock while
    /// the thread winds down
    fn halt_session(&self) -> bool {
        let session = self.shared.lock().session.take();
        match session {
            Some(session) => {
                session.halt();
                true
            }
            None => false,
        }
    }
}

impl MediaHandle for DeviceHandle {
    fn play(&mut self) -> Result<()> {
        let mut inner = self.shared.lock();
        if inner.released {
            return Err(Error::InvalidState("audio handle released".to_string()));
        }
        if let Some(message) = &inner.load_error {
            return Err(Error::Playback(message.clone()));
        }

        inner.play_requested = true;
        if inner.session.is_none() && inner.audio.is_some() {
            if let Err(e) = self.shared.start_session(&mut inner, true) {
                inner.play_requested = false;
                return Err(e);
            }
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.shared.lock().play_requested = false;
        self.halt_session();
    }

    fn set_position(&mut self, position_seconds: f64) {
        let position_seconds = position_seconds.max(0.0);
        let was_playing = self.halt_session();

        let mut inner = self.shared.lock();
        if inner.released {
            return;
        }
        inner.position_seconds = position_seconds;

        if was_playing {
            if let Err(e) = self.shared.start_session(&mut inner, false) {
                inner.play_requested = false;
                drop(inner);
                self.shared.emit(MediaEventKind::PlaybackFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    fn position(&self) -> f64 {
        self.shared.lock().position_seconds
    }

    fn duration(&self) -> f64 {
        self.shared.lock().duration()
    }

    fn release(&mut self) {
        if let Some(fetch) = self.fetch.take() {
            fetch.abort();
        }

        let session = {
            let mut inner = self.shared.lock();
            if inner.released {
                return;
            }
            inner.released = true;
            inner.play_requested = false;
            inner.audio = None;
            inner.position_seconds = 0.0;
            inner.session.take()
        };

        if let Some(session) = session {
            session.halt();
        }
        debug!(lesson_id = self.shared.lesson_id, "Audio handle released");
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Download and probe one resource, then report the result
async fn fetch_audio(client: reqwest::Client, shared: Arc<HandleShared>, permits: Arc<Semaphore>) {
    let Ok(_permit) = permits.acquire_owned().await else {
        return;
    };

    match load_audio(&client, &shared.url).await {
        Ok(audio) => {
            info!(
                lesson_id = shared.lesson_id,
                duration = audio.duration_seconds,
                "Audio loaded"
            );
            shared.on_loaded(audio);
        }
        Err(e) => {
            warn!(lesson_id = shared.lesson_id, url = %shared.url, "Audio load failed: {}", e);
            shared.on_load_failed(e.to_string());
        }
    }
}

async fn load_audio(client: &reqwest::Client, url: &str) -> Result<LoadedAudio> {
    debug!(url = %url, "Fetching audio");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| rdl_common::Error::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(rdl_common::Error::Http(format!("{} returned status {}", url, status)).into());
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| rdl_common::Error::Http(e.to_string()))?;
    let data: Arc<[u8]> = Arc::from(bytes.as_ref());

    let extension = extension_hint(url);
    let probe_data = Arc::clone(&data);
    let probe_extension = extension.clone();
    let info = tokio::task::spawn_blocking(move || probe(probe_data, probe_extension.as_deref()))
        .await
        .map_err(|e| Error::Decode(format!("Probe task failed: {}", e)))??;

    Ok(LoadedAudio {
        data,
        extension,
        duration_seconds: info.duration_seconds,
    })
}

/// File extension of a URL path, used as a format hint
pub fn extension_hint(url: &str) -> Option<String> {
    let path = url.split(|c| c == '?' || c == '#').next().unwrap_or(url);
    let file = path.rsplit('/').next()?;
    let (stem, ext) = file.rsplit_once('.')?;

    let valid = !stem.is_empty()
        && (1..=5).contains(&ext.len())
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

enum SessionEnd {
    /// Stop flag raised; position reached
    Stopped(f64),
    /// All audio played out
    Finished,
}

/// Playback thread body
fn run_session(shared: Arc<HandleShared>, audio: LoadedAudio, start: f64, stop: Arc<AtomicBool>) {
    match play_from(&shared, &audio, start, &stop) {
        Ok(SessionEnd::Stopped(position)) => shared.record_stop(position),
        Ok(SessionEnd::Finished) => shared.finish_session(&stop),
        Err(e) => shared.fail_session(&stop, e),
    }
}

fn play_from(
    shared: &HandleShared,
    audio: &LoadedAudio,
    start: f64,
    stop: &Arc<AtomicBool>,
) -> Result<SessionEnd> {
    let mut decoder = StreamDecoder::open(Arc::clone(&audio.data), audio.extension.as_deref())?;
    if start > 0.0 {
        decoder.seek(start);
    }

    let mut output = AudioOutput::open_default()?;
    let device_rate = output.sample_rate();
    let mut resampler = StreamResampler::new(decoder.sample_rate(), device_rate)?;

    let capacity = ((device_rate as f64 * RING_SECONDS) as usize * 2).max(4096);
    let (mut producer, mut consumer) = HeapRb::<f32>::new(capacity).split();

    let frames_played = Arc::new(AtomicU64::new(0));
    let callback_frames = Arc::clone(&frames_played);
    output.start(
        move || {
            // Pop whole frames only; a lone sample waits for its pair
            if consumer.occupied_len() < 2 {
                return AudioFrame::zero();
            }
            let left = consumer.try_pop().unwrap_or(0.0);
            let right = consumer.try_pop().unwrap_or(0.0);
            callback_frames.fetch_add(1, Ordering::Relaxed);
            AudioFrame::from_stereo(left, right)
        },
        shared.settings.volume,
    )?;

    let duration = audio.duration_seconds;
    let position = |played: u64| {
        let position = start + played as f64 / device_rate as f64;
        if duration > 0.0 {
            position.min(duration)
        } else {
            position
        }
    };

    let mut pending: Vec<f32> = Vec::new();
    let mut offset = 0;
    let mut decoding_done = false;
    let mut last_report = Instant::now();

    loop {
        if stop.load(Ordering::SeqCst) {
            return Ok(SessionEnd::Stopped(position(frames_played.load(Ordering::Relaxed))));
        }
        if output.has_error() {
            return Err(Error::AudioOutput("output stream failed".to_string()));
        }

        if offset >= pending.len() && !decoding_done {
            pending = match decoder.next_chunk()? {
                Some(chunk) => resampler.process(&chunk)?,
                None => {
                    decoding_done = true;
                    resampler.flush()?
                }
            };
            offset = 0;
        }

        if offset < pending.len() {
            let pushed = producer.push_slice(&pending[offset..]);
            offset += pushed;
            if pushed == 0 {
                thread::sleep(FEED_IDLE);
            }
        } else if decoding_done {
            if producer.occupied_len() < 2 {
                return Ok(SessionEnd::Finished);
            }
            thread::sleep(FEED_IDLE);
        }

        if last_report.elapsed() >= shared.settings.progress_interval {
            shared.report_progress(stop, position(frames_played.load(Ordering::Relaxed)));
            last_report = Instant::now();
        }
    }
}
