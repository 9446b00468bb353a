//! Hand-written speech adapters for tests. Interviewer behaviour is mocked with
//! `MockInterviewer`; audio is easier to script with plain fakes.

use crate::capture::{Segment, SpeechCapture, Transcript, TranscriptBuffer};
use crate::playback::SpeechPlayback;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
struct CaptureState {
    active: bool,
    buffer: TranscriptBuffer,
}

pub(crate) struct FakeCapture {
    supported: bool,
    fail_start: bool,
    state: Mutex<CaptureState>,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self {
            supported: true,
            fail_start: false,
            state: Mutex::new(CaptureState::default()),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }

    /// Simulates the recognizer finalizing `text`. Ignored unless capture is running.
    pub fn say(&self, text: &str) {
        let mut state = self.state.lock().unwrap();
        if state.active {
            state.buffer.apply(&[Segment::final_text(text)]);
        }
    }

    pub fn hear_interim(&self, text: &str) {
        let mut state = self.state.lock().unwrap();
        if state.active {
            state.buffer.apply(&[Segment::interim(text)]);
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }
}

impl SpeechCapture for FakeCapture {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn start(&self) -> Result<()> {
        if self.fail_start {
            return Err(anyhow::anyhow!("microphone permission denied"));
        }
        let mut state = self.state.lock().unwrap();
        if state.active {
            return Err(anyhow::anyhow!("recognition already started"));
        }
        state.active = true;
        Ok(())
    }

    fn stop(&self) {
        self.state.lock().unwrap().active = false;
    }

    fn transcript(&self) -> Transcript {
        self.state.lock().unwrap().buffer.snapshot()
    }

    fn reset(&self) {
        self.state.lock().unwrap().buffer.clear();
    }
}

pub(crate) struct FakePlayback {
    supported: bool,
    fail: bool,
    duration: Option<Duration>,
    spoken: Mutex<Vec<String>>,
    cancels: AtomicUsize,
    interrupt: Notify,
}

impl FakePlayback {
    pub fn new() -> Self {
        Self {
            supported: true,
            fail: false,
            duration: None,
            spoken: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
            interrupt: Notify::new(),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// The first utterance takes `duration` unless cancelled; later ones end at once.
    pub fn slow_first(duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            ..Self::new()
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechPlayback for FakePlayback {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn speak(&self, text: &str) -> Result<()> {
        let first = {
            let mut spoken = self.spoken.lock().unwrap();
            spoken.push(text.to_string());
            spoken.len() == 1
        };
        if let (true, Some(duration)) = (first, self.duration) {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = self.interrupt.notified() => {}
            }
        }
        if self.fail {
            return Err(anyhow::anyhow!("synthesis-failed"));
        }
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        // Leaves a permit behind when nothing is playing yet, so a cancel that
        // races ahead of `speak` still interrupts it.
        self.interrupt.notify_one();
    }
}
