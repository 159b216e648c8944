//! Command dispatch
//!
//! Takes a transcribed phrase and decides what happens next: local
//! directives are handled in place, everything else is screened
//! against the server's keyword sets and forwarded over HTTP. The
//! dispatcher never fails; every failure mode maps to an outcome the
//! activation loop can act on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{BackendClient, CommandReply};
use crate::voice::cues::{Cue, CuePlayer};
use crate::voice::playback::play_wav_file;
use crate::voice::tts::Speaker;
use crate::voice::volume::VolumeControl;

/// Phrase fragment that shuts the client down
pub const STOP_DIRECTIVE: &str = "stop running";

/// Phrase fragment that requests a restart
pub const RESTART_DIRECTIVE: &str = "restart";

/// Read timeout for long-running command categories
pub const EXTENDED_TIMEOUT: Duration = Duration::from_secs(30);

/// Long-running categories that get a processing cue while they wait
const DELAY_WITH_ACK: &[&str] = &["car", "speed_test", "google_home", "garage"];

/// Long-running categories handled silently
const DELAY_SILENT: &[&str] = &["television"];

/// What the activation loop should do after a dispatched command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Keep listening for the next wake phrase
    Continue,
    /// Shut down cleanly
    Stop,
    /// Flag a restart and wait to be replaced
    RestartRequested,
    /// A native audio reply was played; keep listening
    SpeechAudio,
}

/// How a long-running category announces itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DelayKind {
    WithAck,
    Silent,
}

/// Phrase categories fetched from the server at startup
#[derive(Debug, Clone, Default)]
pub struct KeywordSets {
    keywords: HashMap<String, Vec<String>>,
    conversation: HashMap<String, Vec<String>>,
    api_compatible: HashMap<String, Vec<String>>,
}

impl KeywordSets {
    /// Build sets from already-fetched phrase maps
    #[must_use]
    pub fn from_parts(
        keywords: HashMap<String, Vec<String>>,
        conversation: HashMap<String, Vec<String>>,
        api_compatible: HashMap<String, Vec<String>>,
    ) -> Self {
        Self {
            keywords,
            conversation,
            api_compatible,
        }
    }

    /// Fetch all three phrase maps from the server. Best-effort: any
    /// failure leaves the sets empty, which the dispatcher treats as
    /// an unreachable server.
    pub async fn load(client: &BackendClient) -> Self {
        let keywords = client.keywords().await;
        let conversation = client.conversation().await;
        let api_compatible = client.api_compatible().await;

        match (keywords, conversation, api_compatible) {
            (Ok(keywords), Ok(conversation), Ok(api_compatible)) => {
                tracing::debug!(
                    keyword_categories = keywords.len(),
                    conversation_categories = conversation.len(),
                    "keyword sets loaded"
                );
                Self::from_parts(keywords, conversation, api_compatible)
            }
            (k, c, a) => {
                for result in [&k, &c, &a] {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "failed to load keyword sets");
                        break;
                    }
                }
                Self::default()
            }
        }
    }

    /// Whether the startup fetch succeeded
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        !self.keywords.is_empty()
    }

    /// Whether the phrase matches any known keyword or conversational
    /// phrase
    #[must_use]
    pub fn matches_known(&self, phrase: &str) -> bool {
        phrase_map_match(&self.keywords, phrase).is_some()
            || phrase_map_match(&self.conversation, phrase).is_some()
    }

    /// Whether the phrase matches a category executable over the API
    #[must_use]
    pub fn matches_api_compatible(&self, phrase: &str) -> bool {
        phrase_map_match(&self.api_compatible, phrase).is_some()
    }

    /// Long-running category the phrase falls into, if any. A phrase
    /// can match several categories; the delay lists are consulted
    /// directly so an additional non-delay match cannot shadow them.
    fn delay_kind(&self, phrase: &str) -> Option<DelayKind> {
        let in_category = |category: &&str| {
            self.keywords
                .get(*category)
                .is_some_and(|candidates| candidates_match(candidates, phrase))
        };
        if DELAY_WITH_ACK.iter().any(in_category) {
            Some(DelayKind::WithAck)
        } else if DELAY_SILENT.iter().any(in_category) {
            Some(DelayKind::Silent)
        } else {
            None
        }
    }
}

/// Find the first category whose phrase list matches `phrase`
fn phrase_map_match<'a>(
    map: &'a HashMap<String, Vec<String>>,
    phrase: &str,
) -> Option<&'a str> {
    map.iter()
        .find(|(_, candidates)| candidates_match(candidates, phrase))
        .map(|(category, _)| category.as_str())
}

/// A candidate matches when all of its words appear in the phrase
fn candidates_match(candidates: &[String], phrase: &str) -> bool {
    let words: Vec<&str> = phrase.split_whitespace().collect();

    candidates.iter().any(|candidate| {
        let mut candidate_words = candidate.split_whitespace();
        candidate_words.clone().next().is_some() && candidate_words.all(|w| words.contains(&w))
    })
}

/// Whether the phrase adjusts the local output volume. Phrases
/// mentioning the server are commands for it, not for this machine.
#[must_use]
pub fn is_volume_directive(phrase: &str) -> bool {
    (phrase.contains("volume") || phrase.contains("mute")) && !phrase.contains("server")
}

/// Level a volume directive asks for: unmute restores the configured
/// level, mute is zero, max or full is 100, anything else carries the
/// number in the phrase.
#[must_use]
pub fn volume_directive_level(phrase: &str, default_volume: u8) -> Option<u8> {
    if phrase.contains("unmute") {
        return Some(default_volume);
    }
    if phrase.contains("mute") {
        return Some(0);
    }
    if phrase.contains("max") || phrase.contains("full") {
        return Some(100);
    }

    let digits: String = phrase.chars().filter(char::is_ascii_digit).collect();
    let value: u32 = digits.parse().ok()?;
    Some(u8::try_from(value.min(100)).unwrap_or(100))
}

/// Replace response fragments that read badly out loud
#[must_use]
pub fn normalize_detail(detail: &str) -> String {
    detail
        .replace("\u{b0}F", " degrees fahrenheit")
        .replace('\n', ". ")
}

/// Handles transcribed phrases and reports what to do next
#[async_trait(?Send)]
pub trait Dispatch {
    /// Phrase stored by a previous run that should be replayed first
    fn pending_recovery(&self) -> Option<String>;

    /// Handle one transcribed phrase
    async fn dispatch(&mut self, phrase: &str) -> CommandOutcome;
}

/// Routes transcribed phrases to directives or the command API
pub struct CommandDispatcher<S: Speaker, V: VolumeControl> {
    client: BackendClient,
    sets: KeywordSets,
    cues: CuePlayer,
    speaker: S,
    volume: V,
    default_volume: u8,
    marker_file: PathBuf,
    request_timeout: Duration,
    speech_timeout: f64,
    native_audio: bool,
}

impl<S: Speaker, V: VolumeControl> CommandDispatcher<S, V> {
    /// Create a dispatcher. An existing recovery marker is left in
    /// place; its phrase surfaces through [`Dispatch::pending_recovery`]
    /// and the marker is cleared by the replay dispatch itself.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        client: BackendClient,
        sets: KeywordSets,
        cues: CuePlayer,
        speaker: S,
        volume: V,
        default_volume: u8,
        marker_file: PathBuf,
        request_timeout: Duration,
        speech_timeout: f64,
        native_audio: bool,
    ) -> Self {
        Self {
            client,
            sets,
            cues,
            speaker,
            volume,
            default_volume,
            marker_file,
            request_timeout,
            speech_timeout,
            native_audio,
        }
    }

    /// The keyword sets never loaded, so the server was unreachable at
    /// startup. Record the phrase so the next run can replay it, and
    /// request a restart to rebuild the connection. A marker that
    /// already exists means the previous restart did not help.
    fn handle_unreachable_server(&mut self, phrase: &str) -> CommandOutcome {
        if self.marker_file.exists() {
            tracing::error!(
                phrase = %phrase,
                "server still unreachable after restart, dropping command"
            );
            if let Err(e) = std::fs::remove_file(&self.marker_file) {
                tracing::warn!(error = %e, "failed to remove recovery marker");
            }
        } else {
            if let Err(e) = write_marker(&self.marker_file, phrase) {
                tracing::warn!(error = %e, "failed to write recovery marker");
            }
            self.cues.play(Cue::ConnectionRestart);
        }
        CommandOutcome::RestartRequested
    }
}

#[async_trait(?Send)]
impl<S: Speaker, V: VolumeControl> Dispatch for CommandDispatcher<S, V> {
    fn pending_recovery(&self) -> Option<String> {
        read_marker(&self.marker_file)
    }

    /// Infallible: every failure maps to an outcome.
    async fn dispatch(&mut self, phrase: &str) -> CommandOutcome {
        let phrase = phrase.to_lowercase();
        tracing::info!(phrase = %phrase, "dispatching command");

        // Directives win over all keyword checks.
        if phrase.contains(STOP_DIRECTIVE) {
            self.cues.play(Cue::Shutdown);
            return CommandOutcome::Stop;
        }
        if phrase.contains(RESTART_DIRECTIVE) {
            self.cues.play(Cue::Restart);
            return CommandOutcome::RestartRequested;
        }
        if is_volume_directive(&phrase) {
            match volume_directive_level(&phrase, self.default_volume) {
                Some(level) => {
                    tracing::info!(level, "setting output volume");
                    if let Err(e) = self.volume.set_level(level) {
                        tracing::warn!(error = %e, "failed to set output volume");
                    }
                }
                None => tracing::warn!(phrase = %phrase, "no volume level in phrase"),
            }
            return CommandOutcome::Continue;
        }

        if !self.sets.is_loaded() {
            return self.handle_unreachable_server(&phrase);
        }

        // A marker surviving into a run with loaded sets belongs to a
        // failure the restart fixed; this dispatch is its replay.
        if self.marker_file.exists() {
            if let Err(e) = std::fs::remove_file(&self.marker_file) {
                tracing::warn!(error = %e, "failed to remove recovery marker");
            } else {
                tracing::info!("recovered after a recent failure");
            }
        }

        if !self.sets.matches_known(&phrase) {
            tracing::warn!(phrase = %phrase, "phrase matched no known keyword");
            return CommandOutcome::Continue;
        }

        if !self.sets.matches_api_compatible(&phrase) {
            self.cues.play(Cue::Unprocessable);
            return CommandOutcome::Continue;
        }

        let timeout = match self.sets.delay_kind(&phrase) {
            Some(DelayKind::WithAck) => {
                self.cues.play_detached(Cue::Processing);
                EXTENDED_TIMEOUT
            }
            Some(DelayKind::Silent) => EXTENDED_TIMEOUT,
            None => self.request_timeout,
        };

        let reply = self
            .client
            .offline_communicator(&phrase, self.native_audio, self.speech_timeout, timeout)
            .await;

        match reply {
            Ok(CommandReply::Audio) => {
                let path = self.client.speech_file().clone();
                if let Err(e) = play_wav_file(&path).await {
                    tracing::warn!(error = %e, "speech reply playback failed");
                }
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::debug!(error = %e, "failed to remove speech reply file");
                }
                CommandOutcome::SpeechAudio
            }
            Ok(CommandReply::Detail(detail)) => {
                let spoken = normalize_detail(&detail);
                tracing::info!(response = %spoken, "command response");
                if let Err(e) = self.speaker.speak(&spoken).await {
                    tracing::warn!(error = %e, "speech synthesis failed");
                }
                CommandOutcome::Continue
            }
            Err(e) => {
                tracing::error!(error = %e, "command request failed");
                self.cues.play(Cue::Failed);
                CommandOutcome::RestartRequested
            }
        }
    }
}

/// Read the phrase stored in the recovery marker
#[must_use]
pub fn read_marker(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Store a failed phrase for replay after the next restart
fn write_marker(path: &Path, phrase: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, phrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sets_with(category: &str, phrases: &[&str]) -> KeywordSets {
        let mut keywords = HashMap::new();
        keywords.insert(
            category.to_string(),
            phrases.iter().map(ToString::to_string).collect(),
        );
        KeywordSets::from_parts(keywords, HashMap::new(), HashMap::new())
    }

    #[test]
    fn matches_single_word_candidate() {
        let sets = sets_with("lights", &["lights"]);
        assert!(sets.matches_known("turn on the lights"));
        assert!(!sets.matches_known("what is the weather"));
    }

    #[test]
    fn multiword_candidate_requires_all_words() {
        let sets = sets_with("garage", &["garage door"]);
        assert!(sets.matches_known("open the garage door"));
        assert!(!sets.matches_known("open the garage"));
    }

    #[test]
    fn empty_sets_are_not_loaded() {
        assert!(!KeywordSets::default().is_loaded());
        assert!(sets_with("lights", &["lights"]).is_loaded());
    }

    #[test]
    fn delay_category_detection() {
        let mut keywords = HashMap::new();
        keywords.insert("car".to_string(), vec!["start the car".to_string()]);
        keywords.insert("television".to_string(), vec!["television".to_string()]);
        keywords.insert("lights".to_string(), vec!["lights".to_string()]);
        let sets = KeywordSets::from_parts(keywords, HashMap::new(), HashMap::new());

        assert_eq!(sets.delay_kind("start the car"), Some(DelayKind::WithAck));
        assert_eq!(
            sets.delay_kind("turn on the television"),
            Some(DelayKind::Silent)
        );
        assert_eq!(sets.delay_kind("turn on the lights"), None);
    }

    #[test]
    fn delay_category_wins_over_overlapping_matches() {
        let mut keywords = HashMap::new();
        keywords.insert("car".to_string(), vec!["start the car".to_string()]);
        keywords.insert("chatter".to_string(), vec!["start".to_string()]);
        keywords.insert("television".to_string(), vec!["television".to_string()]);
        keywords.insert("power".to_string(), vec!["turn".to_string()]);
        let sets = KeywordSets::from_parts(keywords, HashMap::new(), HashMap::new());

        // Both phrases also match a non-delay category; the delay
        // timeout must not depend on map iteration order.
        assert_eq!(sets.delay_kind("start the car"), Some(DelayKind::WithAck));
        assert_eq!(
            sets.delay_kind("turn on the television"),
            Some(DelayKind::Silent)
        );
    }

    #[test]
    fn volume_directive_detection() {
        assert!(is_volume_directive("set the volume to 40"));
        assert!(is_volume_directive("mute"));
        assert!(!is_volume_directive("set the server volume to 40"));
        assert!(!is_volume_directive("turn on the lights"));
    }

    #[test]
    fn volume_directives_resolve_to_levels() {
        assert_eq!(volume_directive_level("set the volume to 40", 70), Some(40));
        assert_eq!(volume_directive_level("mute", 70), Some(0));
        assert_eq!(volume_directive_level("unmute", 70), Some(70));
        assert_eq!(volume_directive_level("volume to max", 70), Some(100));
        assert_eq!(volume_directive_level("volume to 400", 70), Some(100));
        assert_eq!(volume_directive_level("turn up the volume", 70), None);
    }

    #[test]
    fn normalizes_temperature_and_newlines() {
        assert_eq!(
            normalize_detail("It is 72\u{b0}F outside.\nClear skies."),
            "It is 72 degrees fahrenheit outside.. Clear skies."
        );
    }

    #[test]
    fn marker_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed_command");

        assert!(read_marker(&path).is_none());
        write_marker(&path, "turn on the lights").unwrap();
        assert_eq!(
            read_marker(&path).as_deref(),
            Some("turn on the lights")
        );
    }
}
