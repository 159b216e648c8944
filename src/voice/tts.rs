//! Text-to-speech for spoken responses

use async_trait::async_trait;
use serde::Serialize;

use crate::config::TtsConfig;
use crate::error::{Error, Result};
use crate::voice::playback::{AudioPlayback, TTS_SAMPLE_RATE};

/// Speaks a response out loud
#[async_trait(?Send)]
pub trait Speaker {
    /// Synthesize and play `text`, returning when playback finishes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails.
    async fn speak(&mut self, text: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'a str,
}

/// Speaker backed by the `OpenAI` speech synthesis API
pub struct HttpSpeaker {
    client: reqwest::Client,
    config: TtsConfig,
}

impl HttpSpeaker {
    /// Create a speaker with the given synthesis settings
    #[must_use]
    pub fn new(config: TtsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let request = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice: &self.config.voice,
            speed: self.config.speed,
            response_format: "mp3",
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("synthesis failed ({status}): {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait(?Send)]
impl Speaker for HttpSpeaker {
    async fn speak(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        tracing::debug!(chars = text.len(), "synthesizing speech");
        let mp3 = self.synthesize(text).await?;

        AudioPlayback::new(TTS_SAMPLE_RATE)?.play_mp3(&mp3).await
    }
}
