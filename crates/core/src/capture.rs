//! Speech-to-text capture contract.
//!
//! Recognizers deliver results incrementally: a piece of text is first reported
//! as interim (it may still change) and later as final. `TranscriptBuffer` keeps
//! the finalized text and the latest interim span apart so a submission can read
//! exactly what has been committed so far.

use anyhow::Result;

/// One recognized piece of text inside a recognition event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub is_final: bool,
}

impl Segment {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }

    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }
}

/// What has been heard so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub final_text: String,
    pub interim: String,
}

impl Transcript {
    /// The text a submission should use: the final text, or the interim span when
    /// nothing has been finalized yet. Empty when nothing was heard at all.
    pub fn submission(&self) -> Option<String> {
        [self.final_text.trim(), self.interim.trim()]
            .into_iter()
            .find(|text| !text.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    transcript: Transcript,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one recognition event. Final segments are appended to the
    /// accumulator, non-final ones become the new interim span.
    pub fn apply(&mut self, segments: &[Segment]) {
        let mut interim = String::new();
        for segment in segments {
            let text = segment.text.trim();
            if text.is_empty() {
                continue;
            }
            if segment.is_final {
                if !self.transcript.final_text.is_empty() {
                    self.transcript.final_text.push(' ');
                }
                self.transcript.final_text.push_str(text);
            } else {
                if !interim.is_empty() {
                    interim.push(' ');
                }
                interim.push_str(text);
            }
        }
        self.transcript.interim = interim;
    }

    pub fn clear(&mut self) {
        self.transcript = Transcript::default();
    }

    pub fn snapshot(&self) -> Transcript {
        self.transcript.clone()
    }
}

/// How a recognizer should be configured when capture starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub language: String,
    pub continuous: bool,
    pub interim_results: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            continuous: true,
            interim_results: true,
        }
    }
}

impl CaptureSettings {
    pub fn with_language(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Self::default()
        }
    }
}

/// A continuous speech-to-text source owned by one interview session.
///
/// Results arrive from the recognizer asynchronously and are buffered by the
/// implementation; the engine only reads them when the candidate submits.
pub trait SpeechCapture: Send + Sync {
    /// Whether this platform can capture speech at all. Checked once, before any `start`.
    fn is_supported(&self) -> bool {
        true
    }

    /// Begins capturing. Fails if the recognizer refuses, e.g. when it is already running
    /// or microphone access was denied.
    fn start(&self) -> Result<()>;

    /// Ends capturing. Everything finalized up to this point stays in the transcript.
    fn stop(&self);

    fn transcript(&self) -> Transcript;

    /// Drops both the finalized text and the interim span.
    fn reset(&self);
}
