//! TOML configuration file loading
//!
//! Supports `~/.config/hark/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of
//! defaults, with environment variables taking precedence over both.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HarkConfigFile {
    /// Command API server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Wake phrase configuration
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Supervisor restart policy
    #[serde(default)]
    pub supervisor: SupervisorFileConfig,

    /// Audio input configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Speech-to-text configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Text-to-speech configuration
    #[serde(default)]
    pub tts: TtsFileConfig,
}

/// Command API server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Base URL of the command API (e.g. "http://localhost:4483")
    pub url: Option<String>,

    /// Bearer token for API authentication
    pub token: Option<String>,

    /// Default request read timeout in seconds
    pub request_timeout_secs: Option<f64>,

    /// Speech timeout forwarded with each command
    pub speech_timeout: Option<f64>,

    /// Ask the server to respond with native audio payloads
    pub native_audio: Option<bool>,
}

/// Wake phrase configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Wake phrases to arm (e.g. ["jarvis"])
    pub phrases: Option<Vec<String>>,

    /// Per-phrase sensitivity in [0, 1]; a single value is broadcast
    pub sensitivities: Option<Vec<f32>>,
}

/// Supervisor restart policy
#[derive(Debug, Default, Deserialize)]
pub struct SupervisorFileConfig {
    /// Periodic restart interval in seconds
    pub restart_interval_secs: Option<u64>,

    /// Max consecutive startup failures before giving up
    pub max_start_failures: Option<u32>,
}

/// Audio input configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Input device index (default input device if unset)
    pub microphone_index: Option<usize>,

    /// Seconds to wait for speech to begin after the wake phrase
    pub listener_timeout_secs: Option<f64>,

    /// Max seconds of a single captured utterance
    pub listener_phrase_limit_secs: Option<f64>,

    /// Directory holding the cue WAV files
    pub indicators_dir: Option<PathBuf>,

    /// Output volume restored by an unmute directive, 0 to 100
    pub volume: Option<u8>,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// Transcription endpoint URL
    pub api_url: Option<String>,

    /// API key
    pub api_key: Option<String>,

    /// Model identifier (e.g. "whisper-1")
    pub model: Option<String>,
}

/// Text-to-speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Synthesis endpoint URL
    pub api_url: Option<String>,

    /// API key
    pub api_key: Option<String>,

    /// Model identifier (e.g. "tts-1")
    pub model: Option<String>,

    /// Voice identifier
    pub voice: Option<String>,

    /// Speed multiplier
    pub speed: Option<f32>,
}

/// Path of the config file: `~/.config/hark/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("hark").join("config.toml"))
}

/// Load the optional TOML config file, returning defaults when absent
/// or unparsable (a broken file must not take the listener down).
#[must_use]
pub fn load_config_file() -> HarkConfigFile {
    let Some(path) = config_file_path() else {
        return HarkConfigFile::default();
    };

    if !path.exists() {
        return HarkConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                HarkConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HarkConfigFile::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let file: HarkConfigFile = toml::from_str(
            r#"
            [server]
            url = "http://localhost:4483"

            [wake]
            phrases = ["jarvis", "computer"]
            sensitivities = [0.5]
            "#,
        )
        .unwrap();

        assert_eq!(file.server.url.as_deref(), Some("http://localhost:4483"));
        assert_eq!(file.wake.phrases.as_deref(), Some(&["jarvis".to_string(), "computer".to_string()][..]));
        assert!(file.server.token.is_none());
        assert!(file.supervisor.restart_interval_secs.is_none());
    }

    #[test]
    fn empty_file_is_default() {
        let file: HarkConfigFile = toml::from_str("").unwrap();
        assert!(file.wake.phrases.is_none());
        assert!(file.tts.voice.is_none());
    }
}
