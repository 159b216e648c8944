//! Hark - Voice-activated client for a self-hosted command API
//!
//! This library provides the core functionality of the client:
//! - Wake-phrase detection over a live microphone stream
//! - Speech recognition and command dispatch to the command API
//! - Spoken responses via TTS and audible state cues
//! - A supervisor that restarts the listener safely
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Supervisor                         │
//! │   spawn / watch / replace the listener child        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ status file (idle/busy/restart)
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Activation Loop                      │
//! │   Capture  │  Hotword  │  Recognizer  │  Dispatch   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Command API server                     │
//! │   offline-communicator  │  keyword sets             │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod activation;
pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod status;
pub mod supervisor;
pub mod voice;

pub use activation::ActivationLoop;
pub use api::{BackendClient, CommandReply};
pub use config::Config;
pub use dispatch::{CommandDispatcher, CommandOutcome, Dispatch, KeywordSets};
pub use error::{Error, Result};
pub use status::{Status, StatusLock};
pub use supervisor::{RestartPolicy, Supervisor};
