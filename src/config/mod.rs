//! Runtime configuration
//!
//! Layered resolution: `HARK_`-prefixed environment variables override
//! the optional `~/.config/hark/config.toml` file, which overrides
//! built-in defaults. Required values missing from every layer produce
//! a [`Error::Config`] at startup rather than a late panic.
//!
//! [`Error::Config`]: crate::Error::Config

mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub use file::{config_file_path, load_config_file, HarkConfigFile};

/// Default seconds between scheduled full restarts (8 hours)
const DEFAULT_RESTART_INTERVAL_SECS: u64 = 28_800;

/// Default max consecutive startup failures before the supervisor quits
const DEFAULT_MAX_START_FAILURES: u32 = 3;

/// Default read timeout for command requests
const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 5.0;

/// Default seconds to wait for speech to begin after the wake phrase
const DEFAULT_LISTENER_TIMEOUT_SECS: f64 = 3.0;

/// Default max seconds of a single captured utterance
const DEFAULT_LISTENER_PHRASE_LIMIT_SECS: f64 = 5.0;

/// Default output volume restored by an unmute directive
const DEFAULT_VOLUME: u8 = 70;

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Wake phrases armed by the hotword detector
    pub wake_phrases: Vec<String>,

    /// Per-phrase detector sensitivities, same length as `wake_phrases`
    pub sensitivities: Vec<f32>,

    /// Base URL of the command API
    pub server_url: String,

    /// Bearer token for the command API
    pub server_token: String,

    /// Default read timeout for command requests
    pub request_timeout: Duration,

    /// Speech timeout forwarded with each command
    pub speech_timeout: f64,

    /// Ask the server to respond with native audio payloads
    pub native_audio: bool,

    /// Interval between scheduled full restarts
    pub restart_interval: Duration,

    /// Max consecutive startup failures before the supervisor quits
    pub max_start_failures: u32,

    /// Input device index, or `None` for the system default
    pub microphone_index: Option<usize>,

    /// Seconds to wait for speech to begin after the wake phrase
    pub listener_timeout: Duration,

    /// Max duration of a single captured utterance
    pub listener_phrase_limit: Duration,

    /// Data directory for the status file, recovery marker, and
    /// transient speech responses
    pub data_dir: PathBuf,

    /// Directory holding the cue WAV files
    pub indicators_dir: PathBuf,

    /// Output volume restored by an unmute directive, 0 to 100
    pub volume: u8,

    /// Speech-to-text settings
    pub stt: SttConfig,

    /// Text-to-speech settings
    pub tts: TtsConfig,
}

/// Speech-to-text settings
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// Transcription endpoint URL
    pub api_url: String,

    /// API key
    pub api_key: String,

    /// Model identifier
    pub model: String,
}

/// Text-to-speech settings
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Synthesis endpoint URL
    pub api_url: String,

    /// API key
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// Voice identifier
    pub voice: String,

    /// Speed multiplier
    pub speed: f32,
}

impl Config {
    /// Resolve configuration from environment variables, the config
    /// file, and defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a required value (server URL or
    /// token) is missing from every layer, or when the sensitivity
    /// list cannot be reconciled with the wake phrase list.
    pub fn load() -> Result<Self> {
        let file = load_config_file();

        let wake_phrases = env_var("HARK_WAKE_PHRASES")
            .map(|v| split_csv(&v))
            .or(file.wake.phrases)
            .unwrap_or_else(|| vec!["jarvis".to_string()]);

        if wake_phrases.is_empty() {
            return Err(Error::Config("wake phrase list must not be empty".into()));
        }

        let sensitivities = match env_var("HARK_SENSITIVITIES") {
            Some(v) => parse_sensitivities(&v)?,
            None => file.wake.sensitivities.unwrap_or_else(|| vec![0.5]),
        };
        let sensitivities = broadcast_sensitivities(sensitivities, wake_phrases.len())?;

        let server_url = env_var("HARK_SERVER_URL")
            .or(file.server.url)
            .ok_or_else(|| {
                Error::Config("server URL not set (HARK_SERVER_URL or [server] url)".into())
            })?;

        let server_token = env_var("HARK_SERVER_TOKEN")
            .or(file.server.token)
            .ok_or_else(|| {
                Error::Config("server token not set (HARK_SERVER_TOKEN or [server] token)".into())
            })?;

        let request_timeout_secs = parse_env("HARK_REQUEST_TIMEOUT")?
            .or(file.server.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let speech_timeout = parse_env("HARK_SPEECH_TIMEOUT")?
            .or(file.server.speech_timeout)
            .unwrap_or(0.0);

        let native_audio = parse_env("HARK_NATIVE_AUDIO")?
            .or(file.server.native_audio)
            .unwrap_or(false);

        let restart_interval_secs = parse_env("HARK_RESTART_INTERVAL")?
            .or(file.supervisor.restart_interval_secs)
            .unwrap_or(DEFAULT_RESTART_INTERVAL_SECS);

        let max_start_failures = parse_env("HARK_MAX_START_FAILURES")?
            .or(file.supervisor.max_start_failures)
            .unwrap_or(DEFAULT_MAX_START_FAILURES);

        let microphone_index = parse_env("HARK_MICROPHONE_INDEX")?.or(file.audio.microphone_index);

        let listener_timeout_secs = parse_env("HARK_LISTENER_TIMEOUT")?
            .or(file.audio.listener_timeout_secs)
            .unwrap_or(DEFAULT_LISTENER_TIMEOUT_SECS);

        let listener_phrase_limit_secs = parse_env("HARK_LISTENER_PHRASE_LIMIT")?
            .or(file.audio.listener_phrase_limit_secs)
            .unwrap_or(DEFAULT_LISTENER_PHRASE_LIMIT_SECS);

        let data_dir = env_var("HARK_DATA_DIR").map_or_else(default_data_dir, PathBuf::from);

        let indicators_dir = env_var("HARK_INDICATORS_DIR")
            .map(PathBuf::from)
            .or(file.audio.indicators_dir)
            .unwrap_or_else(|| data_dir.join("indicators"));

        let volume = parse_env("HARK_VOLUME")?
            .or(file.audio.volume)
            .unwrap_or(DEFAULT_VOLUME)
            .min(100);

        let stt = SttConfig {
            api_url: env_var("HARK_STT_API_URL")
                .or(file.stt.api_url)
                .unwrap_or_else(|| "https://api.openai.com/v1/audio/transcriptions".to_string()),
            api_key: env_var("OPENAI_API_KEY")
                .or(file.stt.api_key)
                .unwrap_or_default(),
            model: env_var("HARK_STT_MODEL")
                .or(file.stt.model)
                .unwrap_or_else(|| "whisper-1".to_string()),
        };

        let tts = TtsConfig {
            api_url: env_var("HARK_TTS_API_URL")
                .or(file.tts.api_url)
                .unwrap_or_else(|| "https://api.openai.com/v1/audio/speech".to_string()),
            api_key: env_var("OPENAI_API_KEY")
                .or(file.tts.api_key)
                .unwrap_or_default(),
            model: env_var("HARK_TTS_MODEL")
                .or(file.tts.model)
                .unwrap_or_else(|| "tts-1".to_string()),
            voice: env_var("HARK_TTS_VOICE")
                .or(file.tts.voice)
                .unwrap_or_else(|| "alloy".to_string()),
            speed: parse_env("HARK_TTS_SPEED")?.or(file.tts.speed).unwrap_or(1.0),
        };

        Ok(Self {
            wake_phrases,
            sensitivities,
            server_url,
            server_token,
            request_timeout: Duration::from_secs_f64(request_timeout_secs),
            speech_timeout,
            native_audio,
            restart_interval: Duration::from_secs(restart_interval_secs),
            max_start_failures,
            microphone_index,
            listener_timeout: Duration::from_secs_f64(listener_timeout_secs),
            listener_phrase_limit: Duration::from_secs_f64(listener_phrase_limit_secs),
            data_dir,
            indicators_dir,
            volume,
            stt,
            tts,
        })
    }

    /// Path of the shared status file
    #[must_use]
    pub fn status_file(&self) -> PathBuf {
        self.data_dir.join("status")
    }

    /// Path of the recovery marker written after a startup failure
    #[must_use]
    pub fn marker_file(&self) -> PathBuf {
        self.data_dir.join("failed_command")
    }

    /// Path where server speech responses are written before playback
    #[must_use]
    pub fn speech_response_file(&self) -> PathBuf {
        self.data_dir.join("response.wav")
    }
}

/// Default data directory: `~/.local/share/hark`
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".hark"),
        |d| d.data_dir().join("hark"),
    )
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env_var(name) {
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid value for {name}: {v}"))),
        None => Ok(None),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn parse_sensitivities(value: &str) -> Result<Vec<f32>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| Error::Config(format!("invalid sensitivity: {s}")))
        })
        .collect()
}

/// Reconcile the sensitivity list with the phrase count. A single
/// value is broadcast to every phrase; any other length mismatch is a
/// configuration error, as are values outside [0, 1].
fn broadcast_sensitivities(values: Vec<f32>, phrases: usize) -> Result<Vec<f32>> {
    for &v in &values {
        if !(0.0..=1.0).contains(&v) {
            return Err(Error::Config(format!(
                "sensitivity {v} outside the [0, 1] range"
            )));
        }
    }

    match values.len() {
        n if n == phrases => Ok(values),
        1 => Ok(vec![values[0]; phrases]),
        n => Err(Error::Config(format!(
            "{n} sensitivities given for {phrases} wake phrases"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcasts_single_sensitivity() {
        let out = broadcast_sensitivities(vec![0.7], 3).unwrap();
        assert_eq!(out, vec![0.7, 0.7, 0.7]);
    }

    #[test]
    fn keeps_matching_sensitivities() {
        let out = broadcast_sensitivities(vec![0.2, 0.9], 2).unwrap();
        assert_eq!(out, vec![0.2, 0.9]);
    }

    #[test]
    fn rejects_length_mismatch() {
        assert!(broadcast_sensitivities(vec![0.2, 0.9], 3).is_err());
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(broadcast_sensitivities(vec![1.5], 1).is_err());
        assert!(broadcast_sensitivities(vec![-0.1], 1).is_err());
    }

    #[test]
    fn splits_and_lowercases_phrases() {
        assert_eq!(
            split_csv("Jarvis, Computer ,"),
            vec!["jarvis".to_string(), "computer".to_string()]
        );
    }
}
