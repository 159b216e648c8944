//! Speech-to-text for the command that follows the wake phrase

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SttConfig;
use crate::error::{Error, Result};
use crate::voice::capture::{samples_to_wav, FrameInput, MicrophoneInput};
use crate::voice::detector::{FRAME_LENGTH, SAMPLE_RATE};

/// Trailing silence that ends an utterance (~0.8s of frames)
const TRAILING_SILENCE_FRAMES: u32 = 25;

/// Frames used to estimate the background noise level
const CALIBRATION_FRAMES: usize = 5;

/// Captures one utterance and turns it into text
#[async_trait(?Send)]
pub trait SpeechRecognizer {
    /// Listen for a single phrase.
    ///
    /// Returns `Ok(None)` when no speech was heard before the timeout
    /// or the transcription came back empty. Transcription transport
    /// failures are logged and absorbed into `Ok(None)` so a flaky STT
    /// backend degrades to a missed command instead of a crash.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] when the microphone cannot be opened.
    async fn listen(&mut self) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper-backed recognizer using the `OpenAI` transcription API
pub struct WhisperRecognizer {
    client: reqwest::Client,
    config: SttConfig,
    input: MicrophoneInput,
    timeout: Duration,
    phrase_limit: Duration,
}

impl WhisperRecognizer {
    /// Create a recognizer reading from the given input device
    #[must_use]
    pub fn new(
        config: SttConfig,
        microphone_index: Option<usize>,
        timeout: Duration,
        phrase_limit: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            input: MicrophoneInput::new(microphone_index),
            timeout,
            phrase_limit,
        }
    }

    async fn transcribe(&self, wav: Vec<u8>) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Recognizer(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.model.clone());

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Recognizer(format!(
                "transcription failed ({status}): {body}"
            )));
        }

        let parsed: TranscriptionResponse = response.json().await?;
        Ok(parsed.text)
    }
}

#[async_trait(?Send)]
impl SpeechRecognizer for WhisperRecognizer {
    async fn listen(&mut self) -> Result<Option<String>> {
        self.input.open()?;
        let recorded = record_utterance(&mut self.input, self.timeout, self.phrase_limit).await;
        self.input.close();

        let Some(samples) = recorded? else {
            tracing::debug!("no speech detected");
            return Ok(None);
        };

        let wav = samples_to_wav(&samples, SAMPLE_RATE)?;

        match self.transcribe(wav).await {
            Ok(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    Ok(None)
                } else {
                    tracing::debug!(text = %text, "transcribed command");
                    Ok(Some(text))
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                Ok(None)
            }
        }
    }
}

/// Record a single utterance from `input`.
///
/// Waits up to `timeout` for speech to start, then captures until
/// [`TRAILING_SILENCE_FRAMES`] of silence or `phrase_limit`, whichever
/// comes first. Returns `None` when no speech started in time.
/// Durations are counted in frames so the endpointing is deterministic
/// for a scripted input.
///
/// # Errors
///
/// Propagates frame read failures from the input.
#[allow(clippy::cast_precision_loss)]
pub async fn record_utterance<I: FrameInput>(
    input: &mut I,
    timeout: Duration,
    phrase_limit: Duration,
) -> Result<Option<Vec<i16>>> {
    let frame_secs = FRAME_LENGTH as f64 / f64::from(SAMPLE_RATE);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let onset_frames = (timeout.as_secs_f64() / frame_secs).ceil() as u64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let limit_frames = (phrase_limit.as_secs_f64() / frame_secs).ceil() as u64;

    let mut noise_floor = 0.0_f64;
    let mut calibrated = 0_usize;

    // Onset phase: wait for speech to start.
    let mut started = false;
    for _ in 0..onset_frames {
        let frame = input.next_frame().await?;
        let energy = frame_energy(&frame);

        if calibrated < CALIBRATION_FRAMES {
            noise_floor = if calibrated == 0 {
                energy
            } else {
                noise_floor * 0.8 + energy * 0.2
            };
            calibrated += 1;
            continue;
        }

        if energy > speech_threshold(noise_floor) {
            started = true;
            break;
        }
        noise_floor = noise_floor * 0.95 + energy * 0.05;
    }

    if !started {
        return Ok(None);
    }

    // Capture phase: record until trailing silence or the limit.
    let mut samples = Vec::new();
    let mut silent_streak = 0_u32;
    for _ in 0..limit_frames {
        let frame = input.next_frame().await?;
        let energy = frame_energy(&frame);
        samples.extend_from_slice(&frame);

        if energy > speech_threshold(noise_floor) {
            silent_streak = 0;
        } else {
            silent_streak += 1;
            if silent_streak >= TRAILING_SILENCE_FRAMES {
                break;
            }
        }
    }

    Ok(Some(samples))
}

fn speech_threshold(noise_floor: f64) -> f64 {
    noise_floor.max(1e-4) * 4.0
}

#[allow(clippy::cast_precision_loss)]
fn frame_energy(frame: &[i16]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f64 = frame
        .iter()
        .map(|&s| {
            let v = f64::from(s) / f64::from(i16::MAX);
            v * v
        })
        .sum();
    sum / frame.len() as f64
}
