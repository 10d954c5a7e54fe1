//! Media backend that records handle calls instead of playing audio

use rdl_player::playback::{
    MediaBackend, MediaEvent, MediaEventKind, MediaEventSender, MediaHandle,
};
use rdl_player::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One call made on a handle
#[derive(Debug, Clone, PartialEq)]
pub enum HandleCall {
    Create(i64),
    Play(i64),
    Pause(i64),
    SetPosition(i64, f64),
    Release(i64),
}

#[derive(Default)]
struct Recorder {
    calls: Vec<HandleCall>,
    senders: HashMap<i64, MediaEventSender>,
    positions: HashMap<i64, f64>,
    failing_creates: HashSet<i64>,
    failing_plays: HashSet<i64>,
    /// Blocking delay inside `pause`, like a device waiting on its stream
    pause_delay: Option<Duration>,
}

/// Backend whose handles log every call to a shared recorder
#[derive(Clone, Default)]
pub struct RecordingBackend {
    recorder: Arc<Mutex<Recorder>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create` fail for this lesson
    pub fn fail_create(&self, lesson_id: i64) {
        self.recorder.lock().unwrap().failing_creates.insert(lesson_id);
    }

    /// Make `play` fail for this lesson
    pub fn fail_play(&self, lesson_id: i64) {
        self.recorder.lock().unwrap().failing_plays.insert(lesson_id);
    }

    /// Make every `pause` block the calling thread for `delay`
    pub fn slow_pause(&self, delay: Duration) {
        self.recorder.lock().unwrap().pause_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<HandleCall> {
        self.recorder.lock().unwrap().calls.clone()
    }

    pub fn calls_for(&self, lesson_id: i64) -> Vec<HandleCall> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                HandleCall::Create(id)
                | HandleCall::Play(id)
                | HandleCall::Pause(id)
                | HandleCall::SetPosition(id, _)
                | HandleCall::Release(id) => *id == lesson_id,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.recorder.lock().unwrap().calls.clear();
    }

    /// Send a media event as the lesson's handle would; a time update moves
    /// the handle's position first
    pub fn emit(&self, lesson_id: i64, kind: MediaEventKind) {
        let mut recorder = self.recorder.lock().unwrap();
        if let MediaEventKind::TimeUpdate { position_seconds } = &kind {
            recorder.positions.insert(lesson_id, *position_seconds);
        }
        let sender = recorder
            .senders
            .get(&lesson_id)
            .expect("no handle created for lesson");
        sender.send(MediaEvent { lesson_id, kind }).unwrap();
    }
}

impl MediaBackend for RecordingBackend {
    fn create(
        &self,
        lesson_id: i64,
        _url: &str,
        events: MediaEventSender,
    ) -> Result<Box<dyn MediaHandle>> {
        let mut recorder = self.recorder.lock().unwrap();
        if recorder.failing_creates.contains(&lesson_id) {
            return Err(Error::Playback("unsupported source".to_string()));
        }
        recorder.calls.push(HandleCall::Create(lesson_id));
        recorder.senders.insert(lesson_id, events);

        Ok(Box::new(RecordingHandle {
            lesson_id,
            recorder: Arc::clone(&self.recorder),
        }))
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

struct RecordingHandle {
    lesson_id: i64,
    recorder: Arc<Mutex<Recorder>>,
}

impl RecordingHandle {
    fn record(&self, call: HandleCall) {
        self.recorder.lock().unwrap().calls.push(call);
    }
}

impl MediaHandle for RecordingHandle {
    fn play(&mut self) -> Result<()> {
        if self
            .recorder
            .lock()
            .unwrap()
            .failing_plays
            .contains(&self.lesson_id)
        {
            return Err(Error::Playback("output device unavailable".to_string()));
        }
        self.record(HandleCall::Play(self.lesson_id));
        Ok(())
    }

    fn pause(&mut self) {
        let delay = self.recorder.lock().unwrap().pause_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.record(HandleCall::Pause(self.lesson_id));
    }

    fn set_position(&mut self, position_seconds: f64) {
        let mut recorder = self.recorder.lock().unwrap();
        recorder.positions.insert(self.lesson_id, position_seconds);
        recorder
            .calls
            .push(HandleCall::SetPosition(self.lesson_id, position_seconds));
    }

    fn position(&self) -> f64 {
        self.recorder
            .lock()
            .unwrap()
            .positions
            .get(&self.lesson_id)
            .copied()
            .unwrap_or(0.0)
    }

    fn duration(&self) -> f64 {
        0.0
    }

    fn release(&mut self) {
        self.record(HandleCall::Release(self.lesson_id));
    }
}
