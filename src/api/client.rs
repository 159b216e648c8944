//! HTTP client for the command API server

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Connect timeout for every request
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Request body for the offline-communicator endpoint
#[derive(Debug, Serialize)]
struct CommandRequest<'a> {
    command: &'a str,
    native_audio: bool,
    speech_timeout: f64,
}

/// JSON response carrying a spoken-text answer
#[derive(Debug, Deserialize)]
struct DetailResponse {
    detail: String,
}

/// What the server sent back for a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    /// Native audio, already written to the speech response file
    Audio,
    /// Text to be spoken by the local TTS engine
    Detail(String),
}

/// Client for the command API
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    speech_file: PathBuf,
}

impl BackendClient {
    /// Create a client for the server at `base_url`.
    ///
    /// Audio replies are written to `speech_file` before playback.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(base_url: String, token: String, speech_file: PathBuf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            speech_file,
        })
    }

    /// Path audio replies are written to
    #[must_use]
    pub fn speech_file(&self) -> &PathBuf {
        &self.speech_file
    }

    /// Send a command to the server.
    ///
    /// `read_timeout` bounds the whole round trip; long-running
    /// commands pass a larger value here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] on a non-2xx response or an
    /// unintelligible body, [`Error::Http`] on transport failure.
    pub async fn offline_communicator(
        &self,
        command: &str,
        native_audio: bool,
        speech_timeout: f64,
        read_timeout: Duration,
    ) -> Result<CommandReply> {
        let request = CommandRequest {
            command,
            native_audio,
            speech_timeout,
        };

        let response = self
            .client
            .post(format!("{}/offline-communicator", self.base_url))
            .bearer_auth(&self.token)
            .timeout(read_timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Backend(format!(
                "command rejected ({status}): {body}"
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.starts_with("application/octet-stream") {
            let bytes = response.bytes().await?;
            tokio::fs::write(&self.speech_file, &bytes).await?;
            tracing::debug!(
                bytes = bytes.len(),
                path = %self.speech_file.display(),
                "received native audio reply"
            );
            return Ok(CommandReply::Audio);
        }

        let parsed: DetailResponse = response.json().await?;
        Ok(CommandReply::Detail(parsed.detail))
    }

    /// Fetch the keyword categories the server can execute
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-2xx response.
    pub async fn keywords(&self) -> Result<HashMap<String, Vec<String>>> {
        self.fetch_phrase_map("keywords").await
    }

    /// Fetch the conversational phrase categories
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-2xx response.
    pub async fn conversation(&self) -> Result<HashMap<String, Vec<String>>> {
        self.fetch_phrase_map("conversation").await
    }

    /// Fetch the categories executable over the API
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-2xx response.
    pub async fn api_compatible(&self) -> Result<HashMap<String, Vec<String>>> {
        self.fetch_phrase_map("api-compatible").await
    }

    async fn fetch_phrase_map(&self, endpoint: &str) -> Result<HashMap<String, Vec<String>>> {
        let response = self
            .client
            .get(format!("{}/{endpoint}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Backend(format!(
                "failed to fetch {endpoint}: {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}
