//! Voice pipeline: capture, hotword detection, recognition, cues, and
//! speech synthesis

pub mod capture;
pub mod cues;
pub mod detector;
pub mod playback;
pub mod recognizer;
pub mod tts;
pub mod volume;

pub use capture::{samples_to_wav, FrameInput, MicrophoneInput};
pub use cues::{Cue, CuePlayer};
pub use detector::{
    Detection, EnergyGateDetector, HotwordDetector, WakePhraseSet, FRAME_LENGTH, SAMPLE_RATE,
};
pub use playback::{play_wav_file, AudioPlayback};
pub use recognizer::{SpeechRecognizer, WhisperRecognizer};
pub use tts::{HttpSpeaker, Speaker};
pub use volume::{SystemVolume, VolumeControl};
