//! Audio capture from microphone

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::error::{Error, Result};
use crate::voice::detector::{FRAME_LENGTH, SAMPLE_RATE};

/// Max samples buffered before the oldest are dropped (~2s at 16kHz)
const MAX_BUFFERED_SAMPLES: usize = SAMPLE_RATE as usize * 2;

/// How long `next_frame` sleeps while waiting for samples
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A source of fixed-size PCM frames for the detection pipeline
#[async_trait(?Send)]
pub trait FrameInput {
    /// Start delivering frames
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if the source cannot be started.
    fn open(&mut self) -> Result<()>;

    /// Stop delivering frames and discard anything buffered
    fn close(&mut self);

    /// Wait for and return the next frame of [`FRAME_LENGTH`] samples
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if the source is closed or has failed.
    async fn next_frame(&mut self) -> Result<Vec<i16>>;
}

/// Captures 16kHz mono frames from an input device
pub struct MicrophoneInput {
    device_index: Option<usize>,
    buffer: Arc<Mutex<VecDeque<i16>>>,
    stream: Option<Stream>,
}

impl MicrophoneInput {
    /// Create a capture source for the given device index, or the
    /// system default input device when `None`.
    #[must_use]
    pub fn new(device_index: Option<usize>) -> Self {
        Self {
            device_index,
            buffer: Arc::new(Mutex::new(VecDeque::new())),
            stream: None,
        }
    }

    fn resolve_device(&self) -> Result<Device> {
        let host = cpal::default_host();

        match self.device_index {
            Some(index) => host
                .input_devices()
                .map_err(|e| Error::Audio(e.to_string()))?
                .nth(index)
                .ok_or_else(|| Error::Audio(format!("no input device at index {index}"))),
            None => host
                .default_input_device()
                .ok_or_else(|| Error::Audio("no input device available".to_string())),
        }
    }

    fn resolve_config(device: &Device) -> Result<StreamConfig> {
        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        Ok(supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config())
    }
}

#[async_trait(?Send)]
impl FrameInput for MicrophoneInput {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let device = self.resolve_device()?;
        let config = Self::resolve_config(&device)?;
        let buffer = Arc::clone(&self.buffer);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        for &sample in data {
                            #[allow(clippy::cast_possible_truncation)]
                            let s = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                            buf.push_back(s);
                        }
                        // A stalled consumer must not grow the buffer
                        // without bound. Dropping the oldest samples
                        // keeps detection current.
                        if buf.len() > MAX_BUFFERED_SAMPLES {
                            let excess = buf.len() - MAX_BUFFERED_SAMPLES;
                            buf.drain(..excess);
                            tracing::debug!(dropped = excess, "capture buffer overflow");
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            "audio capture started"
        );
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            if let Ok(mut buf) = self.buffer.lock() {
                buf.clear();
            }
            tracing::debug!("audio capture stopped");
        }
    }

    async fn next_frame(&mut self) -> Result<Vec<i16>> {
        if self.stream.is_none() {
            return Err(Error::Audio("capture source is closed".to_string()));
        }

        loop {
            {
                let mut buf = self
                    .buffer
                    .lock()
                    .map_err(|_| Error::Audio("capture buffer poisoned".to_string()))?;
                if buf.len() >= FRAME_LENGTH {
                    return Ok(buf.drain(..FRAME_LENGTH).collect());
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Encode i16 PCM samples as WAV bytes for STT APIs
///
/// # Errors
///
/// Returns [`Error::Audio`] if WAV encoding fails.
pub fn samples_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_encoding_produces_riff_header() {
        let samples = vec![0_i16; 1600];
        let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }

    #[tokio::test]
    async fn next_frame_on_closed_source_fails() {
        let mut input = MicrophoneInput::new(None);
        assert!(input.next_frame().await.is_err());
    }
}
