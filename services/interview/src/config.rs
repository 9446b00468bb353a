//! Application Configuration Module
//!
//! Settings for the interview service come from environment variables (and a
//! `.env` file during local development) and are gathered into one `Config`
//! that the rest of `main` borrows from.

use interview_core::interviewer::DEFAULT_GEMINI_MODEL;
use secrecy::SecretString;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

// --- Application Defaults ---

pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const DEFAULT_TURN_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STORE_DIR: &str = "sessions";
pub const DEFAULT_PROMPTS_DIR: &str = "prompts";
/// Roughly how fast the console voice "speaks".
pub const DEFAULT_SPEECH_WPM: u32 = 170;

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: Option<SecretString>,
    pub gemini_model: String,
    pub log_level: Level,
    pub language: String,
    pub turn_timeout: Option<Duration>,
    pub store_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub speech_wpm: u32,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for {name}: {value}")]
    InvalidNumber { name: &'static str, value: String },
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `GEMINI_API_KEY`: Secret key for the Gemini API. Only `practice` needs it.
    // *   `GEMINI_MODEL`: (Optional) Defaults to "gemini-2.0-flash".
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    // *   `INTERVIEW_LANGUAGE`: (Optional) Speech language tag. Defaults to "en-US".
    // *   `INTERVIEW_TURN_TIMEOUT_SECS`: (Optional) Per-turn limit, 0 disables. Defaults to 30.
    // *   `INTERVIEW_STORE_DIR`: (Optional) Where sessions are saved. Defaults to "sessions".
    // *   `INTERVIEW_PROMPTS_DIR`: (Optional) Prompt overrides. Defaults to "prompts".
    // *   `INTERVIEW_SPEECH_WPM`: (Optional) Console speaking pace, 0 prints instantly. Defaults to 170.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let gemini_api_key = lookup("GEMINI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);

        let gemini_model =
            lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        let language = lookup("INTERVIEW_LANGUAGE").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let timeout_secs = parse_number(
            "INTERVIEW_TURN_TIMEOUT_SECS",
            lookup("INTERVIEW_TURN_TIMEOUT_SECS"),
            DEFAULT_TURN_TIMEOUT_SECS,
        )?;
        let turn_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        let store_dir = lookup("INTERVIEW_STORE_DIR")
            .unwrap_or_else(|| DEFAULT_STORE_DIR.to_string())
            .into();
        let prompts_dir = lookup("INTERVIEW_PROMPTS_DIR")
            .unwrap_or_else(|| DEFAULT_PROMPTS_DIR.to_string())
            .into();

        let speech_wpm = parse_number(
            "INTERVIEW_SPEECH_WPM",
            lookup("INTERVIEW_SPEECH_WPM"),
            DEFAULT_SPEECH_WPM,
        )?;

        Ok(Self {
            gemini_api_key,
            gemini_model,
            log_level,
            language,
            turn_timeout,
            store_dir,
            prompts_dir,
            speech_wpm,
        })
    }

    /// The API key, or an error naming the variable to set.
    pub fn require_api_key(&self) -> Result<SecretString, ConfigError> {
        self.gemini_api_key.clone().ok_or_else(|| {
            ConfigError::MissingVar("GEMINI_API_KEY must be set to practice".to_string())
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.language, "en-US");
        assert_eq!(config.turn_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.store_dir, PathBuf::from("sessions"));
        assert_eq!(config.prompts_dir, PathBuf::from("prompts"));
        assert_eq!(config.speech_wpm, 170);
        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::MissingVar(_))
        ));
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = load(&[
            ("GEMINI_API_KEY", "secret"),
            ("GEMINI_MODEL", "gemini-1.5-pro"),
            ("RUST_LOG", "debug"),
            ("INTERVIEW_LANGUAGE", "en-GB"),
            ("INTERVIEW_TURN_TIMEOUT_SECS", "0"),
            ("INTERVIEW_STORE_DIR", "/tmp/interviews"),
            ("INTERVIEW_SPEECH_WPM", " 0 "),
        ])
        .unwrap();

        assert_eq!(config.require_api_key().unwrap().expose_secret(), "secret");
        assert_eq!(config.gemini_model, "gemini-1.5-pro");
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.language, "en-GB");
        assert_eq!(config.turn_timeout, None);
        assert_eq!(config.store_dir, PathBuf::from("/tmp/interviews"));
        assert_eq!(config.speech_wpm, 0);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            load(&[("RUST_LOG", "chatty")]),
            Err(ConfigError::InvalidLogLevel(_))
        ));
        assert!(matches!(
            load(&[("INTERVIEW_TURN_TIMEOUT_SECS", "soon")]),
            Err(ConfigError::InvalidNumber { name: "INTERVIEW_TURN_TIMEOUT_SECS", .. })
        ));
    }

    #[test]
    fn test_blank_api_key_counts_as_missing() {
        let config = load(&[("GEMINI_API_KEY", "  ")]).unwrap();
        assert!(config.gemini_api_key.is_none());
    }
}
