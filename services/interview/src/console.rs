//! Terminal stand-ins for the microphone and the speaker.
//!
//! `ConsoleCapture` treats every line the candidate types while listening as a
//! finalized recognition result. `ConsolePlayback` prints the interviewer's
//! lines and holds for roughly as long as reading them aloud would take, so the
//! session paces itself like a spoken one.

use anyhow::Result;
use async_trait::async_trait;
use interview_core::capture::{
    CaptureSettings, Segment, SpeechCapture, Transcript, TranscriptBuffer,
};
use interview_core::playback::{PlaybackSettings, SpeechPlayback, Voice, select_voice};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

const DEFAULT_SPEAKER: &str = "Interviewer";

#[derive(Default)]
struct CaptureState {
    active: bool,
    buffer: TranscriptBuffer,
}

pub struct ConsoleCapture {
    settings: CaptureSettings,
    state: Mutex<CaptureState>,
}

impl ConsoleCapture {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(CaptureState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feeds one recognition event. Returns false when capture is not running
    /// and the event was dropped.
    pub fn push_segments(&self, segments: &[Segment]) -> bool {
        let mut state = self.state();
        if !state.active {
            return false;
        }
        let segments: Vec<Segment> = segments
            .iter()
            .filter(|segment| segment.is_final || self.settings.interim_results)
            .cloned()
            .collect();
        state.buffer.apply(&segments);
        if !self.settings.continuous && segments.iter().any(|segment| segment.is_final) {
            tracing::debug!("Single-shot capture got a final result, stopping");
            state.active = false;
        }
        true
    }

    pub fn push_line(&self, line: &str) -> bool {
        self.push_segments(&[Segment::final_text(line)])
    }
}

impl SpeechCapture for ConsoleCapture {
    fn start(&self) -> Result<()> {
        let mut state = self.state();
        if state.active {
            return Err(anyhow::anyhow!("Console capture is already running"));
        }
        state.active = true;
        tracing::debug!("Capturing typed answers ({})", self.settings.language);
        Ok(())
    }

    fn stop(&self) {
        self.state().active = false;
    }

    fn transcript(&self) -> Transcript {
        self.state().buffer.snapshot()
    }

    fn reset(&self) {
        self.state().buffer.clear();
    }
}

/// Voices the console can "speak" with, as a platform would list them.
pub fn console_voices() -> Vec<Voice> {
    vec![
        Voice::new("Console Default", "en-US"),
        Voice::new("Console Natural US", "en-US"),
        Voice::new("Console Natural UK", "en-GB"),
        Voice::new("Console Neural Deutsch", "de-DE"),
        Voice::new("Console Neural Français", "fr-FR"),
    ]
}

pub struct ConsolePlayback {
    settings: PlaybackSettings,
    speaker: String,
    words_per_minute: u32,
    sink: Mutex<Box<dyn Write + Send>>,
    generation: AtomicU64,
    interrupt: Notify,
}

impl ConsolePlayback {
    pub fn stdout(settings: PlaybackSettings, words_per_minute: u32) -> Self {
        Self::with_sink(settings, words_per_minute, Box::new(std::io::stdout()))
    }

    pub fn with_sink(
        settings: PlaybackSettings,
        words_per_minute: u32,
        sink: Box<dyn Write + Send>,
    ) -> Self {
        let voices = console_voices();
        let speaker = match select_voice(&voices, &settings.language) {
            Some(voice) => {
                tracing::info!("Using voice {} ({})", voice.name, voice.language);
                voice.name.clone()
            }
            None => {
                tracing::info!("No preferred voice for {}, using default", settings.language);
                DEFAULT_SPEAKER.to_string()
            }
        };
        Self {
            settings,
            speaker,
            words_per_minute,
            sink: Mutex::new(sink),
            generation: AtomicU64::new(0),
            interrupt: Notify::new(),
        }
    }

    pub fn speaker(&self) -> &str {
        &self.speaker
    }

    /// How long reading `text` aloud takes at the configured pace.
    pub fn speaking_time(&self, text: &str) -> Duration {
        let rate = f64::from(self.settings.rate);
        if self.words_per_minute == 0 || rate <= 0.0 {
            return Duration::ZERO;
        }
        let words = text.split_whitespace().count() as f64;
        Duration::from_secs_f64(words * 60.0 / (f64::from(self.words_per_minute) * rate))
    }

    fn write_line(&self, text: &str) -> Result<()> {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(sink, "\n{}: {}", self.speaker, text)?;
        sink.flush()?;
        Ok(())
    }
}

#[async_trait]
impl SpeechPlayback for ConsolePlayback {
    async fn speak(&self, text: &str) -> Result<()> {
        // Starting a new utterance cuts off the previous one.
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.interrupt.notify_waiters();

        self.write_line(text)?;

        let pace = self.speaking_time(text);
        if pace.is_zero() {
            return Ok(());
        }

        let notified = self.interrupt.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.generation.load(Ordering::SeqCst) != generation {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(pace) => {}
            _ = &mut notified => tracing::debug!("Playback interrupted"),
        }
        Ok(())
    }

    fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.interrupt.notify_waiters();
    }
}
