//! Text-to-speech playback contract and voice selection.

use anyhow::Result;
use async_trait::async_trait;

/// Name fragments of voices that sound noticeably better than the platform default.
pub const PREFERRED_VOICE_MARKERS: &[&str] = &[
    "Google", "Natural", "Neural", "Premium", "Enhanced", "Samantha",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    /// BCP 47 tag such as `en-US`.
    pub language: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSettings {
    pub language: String,
    /// Speaking speed relative to normal.
    pub rate: f32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            rate: 1.0,
        }
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().replace('_', "-").to_lowercase()
}

fn primary_subtag(tag: &str) -> &str {
    tag.split('-').next().unwrap_or(tag)
}

/// Picks a higher-quality voice for `language`, or `None` to let the platform
/// default speak.
///
/// An exact language match wins over a match on the primary subtag only
/// (`en-GB` for `en-US`).
pub fn select_voice<'a>(voices: &'a [Voice], language: &str) -> Option<&'a Voice> {
    let wanted = normalize_tag(language);
    let preferred = voices.iter().filter(|voice| {
        PREFERRED_VOICE_MARKERS
            .iter()
            .any(|marker| voice.name.contains(marker))
    });

    let mut fallback = None;
    for voice in preferred {
        let tag = normalize_tag(&voice.language);
        if tag == wanted {
            return Some(voice);
        }
        if fallback.is_none() && primary_subtag(&tag) == primary_subtag(&wanted) {
            fallback = Some(voice);
        }
    }
    fallback
}

/// Speaks text to the candidate. At most one utterance is audible at a time.
#[async_trait]
pub trait SpeechPlayback: Send + Sync {
    /// Whether this platform can synthesize speech at all.
    fn is_supported(&self) -> bool {
        true
    }

    /// Cancels whatever is playing, speaks `text` and returns once the utterance ends.
    ///
    /// An `Err` only reports that playback went wrong; callers treat it exactly like
    /// a finished utterance.
    async fn speak(&self, text: &str) -> Result<()>;

    /// Stops the current utterance, if any. Never fails.
    fn cancel(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<Voice> {
        vec![
            Voice::new("Default", "en-US"),
            Voice::new("Google UK English Female", "en-GB"),
            Voice::new("Microsoft Aria Online (Natural)", "en_US"),
            Voice::new("Google Deutsch", "de-DE"),
        ]
    }

    #[test]
    fn exact_language_match_wins() {
        let voices = catalog();
        let voice = select_voice(&voices, "en-US").unwrap();
        assert_eq!(voice.name, "Microsoft Aria Online (Natural)");
    }

    #[test]
    fn falls_back_to_same_primary_language() {
        let voices = vec![
            Voice::new("Default", "en-US"),
            Voice::new("Google UK English Female", "en-GB"),
        ];
        let voice = select_voice(&voices, "en-US").unwrap();
        assert_eq!(voice.name, "Google UK English Female");
    }

    #[test]
    fn returns_none_when_no_quality_voice_matches() {
        let voices = vec![Voice::new("Default", "en-US"), Voice::new("Google Deutsch", "de-DE")];
        assert!(select_voice(&voices, "en-US").is_none());
        assert!(select_voice(&[], "en-US").is_none());
    }
}
