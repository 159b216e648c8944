//! Audible cue playback
//!
//! Short WAV files acknowledge state changes (wake phrase heard,
//! command failed, restarting) without a round trip through speech
//! synthesis. Cues are best-effort: a missing file or a headless
//! machine downgrades them to log lines, never to an error.

use std::path::PathBuf;

use crate::voice::playback::play_wav_file_blocking;

/// The audible cues the client can play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// Wake phrase heard, now listening for a command
    Acknowledgement,
    /// Command request failed
    Failed,
    /// Restart requested
    Restart,
    /// Shutting down
    Shutdown,
    /// Long-running command accepted, response will take a while
    Processing,
    /// Command understood but not executable by the server
    Unprocessable,
    /// Startup could not reach the server, restarting the connection
    ConnectionRestart,
}

impl Cue {
    const fn file_name(self) -> &'static str {
        match self {
            Self::Acknowledgement => "acknowledgement.wav",
            Self::Failed => "failed.wav",
            Self::Restart => "restart.wav",
            Self::Shutdown => "shutdown.wav",
            Self::Processing => "processing.wav",
            Self::Unprocessable => "unprocessable.wav",
            Self::ConnectionRestart => "connection_restart.wav",
        }
    }
}

/// Plays cue files from the indicators directory
#[derive(Debug, Clone)]
pub struct CuePlayer {
    dir: PathBuf,
}

impl CuePlayer {
    /// Create a player reading cue files from `dir`
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Play a cue, returning once it finishes
    pub fn play(&self, cue: Cue) {
        let path = self.dir.join(cue.file_name());

        if !path.exists() {
            tracing::debug!(cue = ?cue, path = %path.display(), "cue file missing, skipping");
            return;
        }

        if let Err(e) = play_wav_file_blocking(&path) {
            tracing::warn!(cue = ?cue, error = %e, "cue playback failed");
        }
    }

    /// Play a cue on a fire-and-forget thread
    pub fn play_detached(&self, cue: Cue) {
        let player = self.clone();
        std::thread::spawn(move || player.play(cue));
    }
}
