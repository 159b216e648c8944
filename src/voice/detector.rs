//! Hotword detection
//!
//! The detector consumes fixed-size PCM frames and reports which armed
//! wake phrase, if any, fired on each frame. The built-in
//! [`EnergyGateDetector`] is a short-term-energy gate: cheap, always
//! available, and good enough for a single speaker in a quiet room.
//! Anything that implements [`HotwordDetector`] can be swapped in.

use crate::error::{Error, Result};

/// Sample rate the detection pipeline runs at
pub const SAMPLE_RATE: u32 = 16_000;

/// Samples per detection frame (32 ms at 16 kHz)
pub const FRAME_LENGTH: usize = 512;

/// Consecutive hot frames required before a phrase fires
const TRIGGER_FRAMES: u32 = 3;

/// Frames of silence required before the gate re-arms
const REARM_FRAMES: u32 = 8;

/// Wake phrases paired with per-phrase sensitivities
#[derive(Debug, Clone)]
pub struct WakePhraseSet {
    phrases: Vec<String>,
    sensitivities: Vec<f32>,
}

impl WakePhraseSet {
    /// Pair phrases with sensitivities. A single sensitivity is
    /// broadcast across every phrase.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the list is empty, the lengths
    /// cannot be reconciled, or a sensitivity is outside [0, 1].
    pub fn new(phrases: Vec<String>, sensitivities: Vec<f32>) -> Result<Self> {
        if phrases.is_empty() {
            return Err(Error::Config("at least one wake phrase is required".into()));
        }

        for &s in &sensitivities {
            if !(0.0..=1.0).contains(&s) {
                return Err(Error::Config(format!(
                    "sensitivity {s} outside the [0, 1] range"
                )));
            }
        }

        let sensitivities = match sensitivities.len() {
            n if n == phrases.len() => sensitivities,
            1 => vec![sensitivities[0]; phrases.len()],
            n => {
                return Err(Error::Config(format!(
                    "{n} sensitivities given for {} wake phrases",
                    phrases.len()
                )))
            }
        };

        Ok(Self {
            phrases,
            sensitivities,
        })
    }

    /// Armed phrases, in detection-index order
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Sensitivities, aligned with [`Self::phrases`]
    #[must_use]
    pub fn sensitivities(&self) -> &[f32] {
        &self.sensitivities
    }

    /// Phrase at a detection index, if in range
    #[must_use]
    pub fn phrase(&self, index: usize) -> Option<&str> {
        self.phrases.get(index).map(String::as_str)
    }
}

/// Per-frame detection outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// No armed phrase fired on this frame
    None,
    /// The phrase at this index in the [`WakePhraseSet`] fired
    Matched(usize),
}

/// A hotword engine consuming fixed-size PCM frames
pub trait HotwordDetector: Send {
    /// Classify one frame of `frame_length()` samples.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Detector`] when the frame length is wrong or
    /// the engine is in an unrecoverable state.
    fn process(&mut self, frame: &[i16]) -> Result<Detection>;

    /// Samples per frame this engine expects
    fn frame_length(&self) -> usize;

    /// Sample rate this engine expects
    fn sample_rate(&self) -> u32;
}

/// Short-term-energy gate detector.
///
/// Tracks a rolling noise floor and fires when frame energy stays
/// above a sensitivity-derived multiple of that floor for
/// [`TRIGGER_FRAMES`] consecutive frames. When several phrases are
/// armed it reports the most sensitive one, since energy alone cannot
/// tell phrases apart. After firing, the gate holds until the signal
/// drops back near the floor so one utterance cannot fire twice.
pub struct EnergyGateDetector {
    phrases: WakePhraseSet,
    noise_floor: f64,
    hot_streak: u32,
    quiet_streak: u32,
    armed: bool,
}

impl EnergyGateDetector {
    /// Arm the detector for the given phrase set
    #[must_use]
    pub fn new(phrases: WakePhraseSet) -> Self {
        Self {
            phrases,
            noise_floor: 0.0,
            hot_streak: 0,
            quiet_streak: 0,
            armed: true,
        }
    }

    /// Index of the most sensitive armed phrase
    fn best_phrase(&self) -> usize {
        let mut best = 0;
        for (i, &s) in self.phrases.sensitivities().iter().enumerate() {
            if s > self.phrases.sensitivities()[best] {
                best = i;
            }
        }
        best
    }

    /// Trigger threshold as a multiple of the noise floor. Higher
    /// sensitivity means a lower multiple.
    fn threshold(&self) -> f64 {
        let max_sensitivity = self
            .phrases
            .sensitivities()
            .iter()
            .copied()
            .fold(0.0_f32, f32::max);
        let multiple = 8.0 - 6.0 * f64::from(max_sensitivity);
        self.noise_floor.max(1e-3) * multiple
    }
}

#[allow(clippy::cast_precision_loss)]
fn frame_energy(frame: &[i16]) -> f64 {
    let sum: f64 = frame
        .iter()
        .map(|&s| {
            let v = f64::from(s) / f64::from(i16::MAX);
            v * v
        })
        .sum();
    sum / frame.len() as f64
}

impl HotwordDetector for EnergyGateDetector {
    fn process(&mut self, frame: &[i16]) -> Result<Detection> {
        if frame.len() != FRAME_LENGTH {
            return Err(Error::Detector(format!(
                "expected {FRAME_LENGTH}-sample frames, got {}",
                frame.len()
            )));
        }

        let energy = frame_energy(frame);
        let threshold = self.threshold();

        if energy > threshold {
            self.quiet_streak = 0;
            if self.armed {
                self.hot_streak += 1;
                if self.hot_streak >= TRIGGER_FRAMES {
                    self.armed = false;
                    self.hot_streak = 0;
                    return Ok(Detection::Matched(self.best_phrase()));
                }
            }
        } else {
            self.hot_streak = 0;
            // Quiet frames feed the rolling noise floor.
            self.noise_floor = if self.noise_floor == 0.0 {
                energy
            } else {
                self.noise_floor * 0.95 + energy * 0.05
            };
            if !self.armed {
                self.quiet_streak += 1;
                if self.quiet_streak >= REARM_FRAMES {
                    self.armed = true;
                    self.quiet_streak = 0;
                }
            }
        }

        Ok(Detection::None)
    }

    fn frame_length(&self) -> usize {
        FRAME_LENGTH
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases(n: usize, sensitivities: Vec<f32>) -> WakePhraseSet {
        let names = (0..n).map(|i| format!("phrase{i}")).collect();
        WakePhraseSet::new(names, sensitivities).unwrap()
    }

    fn quiet_frame() -> Vec<i16> {
        vec![10; FRAME_LENGTH]
    }

    fn loud_frame() -> Vec<i16> {
        vec![12_000; FRAME_LENGTH]
    }

    #[test]
    fn broadcast_single_sensitivity() {
        let set = phrases(3, vec![0.4]);
        assert_eq!(set.sensitivities(), &[0.4, 0.4, 0.4]);
    }

    #[test]
    fn rejects_empty_phrase_list() {
        assert!(WakePhraseSet::new(vec![], vec![0.5]).is_err());
    }

    #[test]
    fn rejects_mismatched_sensitivities() {
        assert!(WakePhraseSet::new(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec![0.2, 0.9]
        )
        .is_err());
    }

    #[test]
    fn wrong_frame_length_is_fatal() {
        let mut detector = EnergyGateDetector::new(phrases(1, vec![0.5]));
        assert!(detector.process(&[0; 100]).is_err());
    }

    #[test]
    fn fires_after_sustained_energy() {
        let mut detector = EnergyGateDetector::new(phrases(1, vec![0.5]));

        for _ in 0..20 {
            assert_eq!(detector.process(&quiet_frame()).unwrap(), Detection::None);
        }

        let mut fired = false;
        for _ in 0..10 {
            if detector.process(&loud_frame()).unwrap() == Detection::Matched(0) {
                fired = true;
                break;
            }
        }
        assert!(fired);
    }

    #[test]
    fn does_not_refire_until_rearmed() {
        let mut detector = EnergyGateDetector::new(phrases(1, vec![0.5]));

        for _ in 0..20 {
            detector.process(&quiet_frame()).unwrap();
        }
        let mut matches = 0;
        for _ in 0..30 {
            if matches!(detector.process(&loud_frame()).unwrap(), Detection::Matched(_)) {
                matches += 1;
            }
        }
        assert_eq!(matches, 1);

        // Silence re-arms the gate, a second utterance fires again.
        for _ in 0..20 {
            detector.process(&quiet_frame()).unwrap();
        }
        let mut refired = false;
        for _ in 0..10 {
            if matches!(detector.process(&loud_frame()).unwrap(), Detection::Matched(_)) {
                refired = true;
                break;
            }
        }
        assert!(refired);
    }

    #[test]
    fn reports_most_sensitive_phrase() {
        let mut detector = EnergyGateDetector::new(phrases(3, vec![0.2, 0.9, 0.5]));

        for _ in 0..20 {
            detector.process(&quiet_frame()).unwrap();
        }
        let mut matched = None;
        for _ in 0..10 {
            if let Detection::Matched(i) = detector.process(&loud_frame()).unwrap() {
                matched = Some(i);
                break;
            }
        }
        assert_eq!(matched, Some(1));
    }
}
