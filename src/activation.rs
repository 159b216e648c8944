//! Wake-phrase activation loop
//!
//! The principal state machine of the listening child: read frames,
//! run the hotword detector, and on a match hand the microphone over
//! to the recognizer and the resulting phrase to the dispatcher. The
//! shared status file tracks whether a command is in flight so the
//! supervisor never restarts the process mid-command.

use std::time::Duration;

use crate::dispatch::{CommandOutcome, Dispatch};
use crate::error::Result;
use crate::status::{Status, StatusLock};
use crate::voice::capture::FrameInput;
use crate::voice::cues::{Cue, CuePlayer};
use crate::voice::detector::{Detection, HotwordDetector};
use crate::voice::recognizer::SpeechRecognizer;

/// Drives detection, recognition, and dispatch for one child process
pub struct ActivationLoop<D, I, R, P>
where
    D: HotwordDetector,
    I: FrameInput,
    R: SpeechRecognizer,
    P: Dispatch,
{
    detector: D,
    input: I,
    recognizer: R,
    dispatcher: P,
    status: StatusLock,
    cues: CuePlayer,
    wake_phrases: Vec<String>,
}

impl<D, I, R, P> ActivationLoop<D, I, R, P>
where
    D: HotwordDetector,
    I: FrameInput,
    R: SpeechRecognizer,
    P: Dispatch,
{
    /// Assemble the loop from its components
    #[must_use]
    pub fn new(
        detector: D,
        input: I,
        recognizer: R,
        dispatcher: P,
        status: StatusLock,
        cues: CuePlayer,
        wake_phrases: Vec<String>,
    ) -> Self {
        Self {
            detector,
            input,
            recognizer,
            dispatcher,
            status,
            cues,
            wake_phrases,
        }
    }

    /// Run until a stop directive or a fatal error.
    ///
    /// A restart request parks the process with the status flag set;
    /// the supervisor is responsible for killing and replacing it.
    ///
    /// # Errors
    ///
    /// Returns error on detector or capture failures and on an
    /// unwritable status file. The process exits non-zero and the
    /// supervisor counts it as a startup failure.
    pub async fn run(&mut self) -> Result<()> {
        // A command that failed against an unreachable server last run
        // is replayed before any listening starts.
        if let Some(phrase) = self.dispatcher.pending_recovery() {
            tracing::info!(phrase = %phrase, "replaying command from previous run");
            self.status.set(Status::Busy)?;
            match self.dispatcher.dispatch(&phrase).await {
                CommandOutcome::Stop => {
                    self.status.set(Status::Idle)?;
                    return Ok(());
                }
                CommandOutcome::RestartRequested => {
                    self.status.set(Status::RestartRequested)?;
                    park().await;
                }
                CommandOutcome::Continue | CommandOutcome::SpeechAudio => {
                    self.status.set(Status::Idle)?;
                }
            }
        }

        self.input.open()?;
        tracing::info!(phrases = ?self.wake_phrases, "listening for wake phrase");

        loop {
            let frame = self.input.next_frame().await?;

            let Detection::Matched(index) = self.detector.process(&frame)? else {
                continue;
            };

            let phrase = self
                .wake_phrases
                .get(index)
                .map_or("<unknown>", String::as_str);
            tracing::info!(phrase = %phrase, "wake phrase detected");

            // The microphone is handed to the recognizer; the cue must
            // not block that handoff.
            self.cues.play_detached(Cue::Acknowledgement);
            self.input.close();
            self.status.set(Status::Busy)?;

            let Some(command) = self.recognizer.listen().await? else {
                self.status.set(Status::Idle)?;
                self.input.open()?;
                continue;
            };

            match self.dispatcher.dispatch(&command).await {
                CommandOutcome::Stop => {
                    tracing::info!("stop directive received, shutting down");
                    self.status.set(Status::Idle)?;
                    return Ok(());
                }
                CommandOutcome::RestartRequested => {
                    tracing::info!("restart requested, waiting to be replaced");
                    self.status.set(Status::RestartRequested)?;
                    park().await;
                }
                CommandOutcome::Continue | CommandOutcome::SpeechAudio => {
                    self.status.set(Status::Idle)?;
                    self.input.open()?;
                }
            }
        }
    }
}

/// Sleep until the supervisor kills the process
async fn park() {
    loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;

    use async_trait::async_trait;

    use crate::error::Error;
    use crate::voice::detector::FRAME_LENGTH;

    struct ScriptedDetector {
        detections: VecDeque<Detection>,
    }

    impl HotwordDetector for ScriptedDetector {
        fn process(&mut self, frame: &[i16]) -> Result<Detection> {
            assert_eq!(frame.len(), FRAME_LENGTH);
            Ok(self.detections.pop_front().unwrap_or(Detection::None))
        }

        fn frame_length(&self) -> usize {
            FRAME_LENGTH
        }

        fn sample_rate(&self) -> u32 {
            16_000
        }
    }

    struct SilentInput {
        open: bool,
        opens: u32,
    }

    #[async_trait(?Send)]
    impl FrameInput for SilentInput {
        fn open(&mut self) -> Result<()> {
            self.open = true;
            self.opens += 1;
            Ok(())
        }

        fn close(&mut self) {
            self.open = false;
        }

        async fn next_frame(&mut self) -> Result<Vec<i16>> {
            if self.open {
                Ok(vec![0; FRAME_LENGTH])
            } else {
                Err(Error::Audio("closed".to_string()))
            }
        }
    }

    struct ScriptedRecognizer {
        phrases: VecDeque<Option<String>>,
    }

    #[async_trait(?Send)]
    impl SpeechRecognizer for ScriptedRecognizer {
        async fn listen(&mut self) -> Result<Option<String>> {
            Ok(self.phrases.pop_front().unwrap_or(None))
        }
    }

    struct ScriptedDispatcher {
        pending: Option<String>,
        outcomes: VecDeque<CommandOutcome>,
        dispatched: Vec<String>,
        status: StatusLock,
        observed: Vec<Status>,
    }

    #[async_trait(?Send)]
    impl Dispatch for ScriptedDispatcher {
        fn pending_recovery(&self) -> Option<String> {
            self.pending.clone()
        }

        async fn dispatch(&mut self, phrase: &str) -> CommandOutcome {
            self.dispatched.push(phrase.to_string());
            self.observed.push(self.status.read().unwrap());
            self.outcomes.pop_front().unwrap_or(CommandOutcome::Stop)
        }
    }

    fn status_lock(dir: &tempfile::TempDir) -> StatusLock {
        StatusLock::open(dir.path().join("status")).unwrap()
    }

    fn cues(dir: &tempfile::TempDir) -> CuePlayer {
        CuePlayer::new(dir.path().join("indicators"))
    }

    fn scripted_loop(
        detections: Vec<Detection>,
        phrases: Vec<Option<String>>,
        pending: Option<String>,
        outcomes: Vec<CommandOutcome>,
        dir: &tempfile::TempDir,
    ) -> ActivationLoop<ScriptedDetector, SilentInput, ScriptedRecognizer, ScriptedDispatcher>
    {
        let status = status_lock(dir);
        ActivationLoop::new(
            ScriptedDetector {
                detections: detections.into(),
            },
            SilentInput {
                open: false,
                opens: 0,
            },
            ScriptedRecognizer {
                phrases: phrases.into(),
            },
            ScriptedDispatcher {
                pending,
                outcomes: outcomes.into(),
                dispatched: Vec::new(),
                status: status.clone(),
                observed: Vec::new(),
            },
            status,
            cues(dir),
            vec!["jarvis".to_string()],
        )
    }

    #[tokio::test]
    async fn stop_directive_ends_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut activation = scripted_loop(
            vec![Detection::None, Detection::Matched(0)],
            vec![Some("jarvis stop running".to_string())],
            None,
            vec![CommandOutcome::Stop],
            &dir,
        );

        activation.run().await.unwrap();

        assert_eq!(activation.dispatcher.dispatched, vec!["jarvis stop running"]);
        assert_eq!(activation.status.read().unwrap(), Status::Idle);
    }

    #[tokio::test]
    async fn silence_resumes_listening() {
        let dir = tempfile::tempdir().unwrap();
        let mut activation = scripted_loop(
            vec![Detection::Matched(0), Detection::Matched(0)],
            vec![None, Some("stop running".to_string())],
            None,
            vec![CommandOutcome::Stop],
            &dir,
        );

        activation.run().await.unwrap();

        // Only the second activation produced a dispatch; the input
        // was reopened after the silent one.
        assert_eq!(activation.dispatcher.dispatched, vec!["stop running"]);
        assert_eq!(activation.input.opens, 2);
    }

    #[tokio::test]
    async fn command_outcome_continue_keeps_looping() {
        let dir = tempfile::tempdir().unwrap();
        let mut activation = scripted_loop(
            vec![Detection::Matched(0), Detection::Matched(0)],
            vec![
                Some("turn on the lights".to_string()),
                Some("stop running".to_string()),
            ],
            None,
            vec![CommandOutcome::Continue, CommandOutcome::Stop],
            &dir,
        );

        activation.run().await.unwrap();

        assert_eq!(
            activation.dispatcher.dispatched,
            vec!["turn on the lights", "stop running"]
        );
        assert_eq!(activation.input.opens, 3);
        // Every dispatch happened with the busy flag already set.
        assert_eq!(
            activation.dispatcher.observed,
            vec![Status::Busy, Status::Busy]
        );
    }

    #[tokio::test]
    async fn pending_recovery_is_replayed_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut activation = scripted_loop(
            vec![Detection::Matched(0)],
            vec![Some("stop running".to_string())],
            Some("turn on the lights".to_string()),
            vec![CommandOutcome::Continue, CommandOutcome::Stop],
            &dir,
        );

        activation.run().await.unwrap();

        assert_eq!(
            activation.dispatcher.dispatched,
            vec!["turn on the lights", "stop running"]
        );
    }

    #[tokio::test]
    async fn restart_request_parks_with_flag_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut activation = scripted_loop(
            vec![Detection::Matched(0)],
            vec![Some("jarvis restart".to_string())],
            None,
            vec![CommandOutcome::RestartRequested],
            &dir,
        );

        let parked = tokio::time::timeout(Duration::from_millis(200), activation.run()).await;

        // The loop never returns; it parks waiting for the supervisor.
        assert!(parked.is_err());
        assert_eq!(
            activation.status.read().unwrap(),
            Status::RestartRequested
        );
    }
}
