//! Energy-based speech segmentation.
//!
//! A segment opens on the first chunk louder than the threshold and closes
//! once the trailing silence exceeds the pause threshold.

use std::time::Duration;

/// Sample rate for captured speech (16kHz mono).
pub const SAMPLE_RATE: u32 = 16_000;

/// Ambient RMS is scaled by this before it can raise the threshold.
const AMBIENT_MULTIPLIER: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenSettings {
    pub calibration: Duration,
    pub pause_threshold: Duration,
    pub energy_threshold: f32,
    pub min_speech: Duration,
    pub sample_rate: u32,
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self {
            calibration: Duration::from_secs(4),
            pause_threshold: Duration::from_millis(800),
            energy_threshold: 0.03,
            min_speech: Duration::from_millis(300),
            sample_rate: SAMPLE_RATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    Idle,
    Speaking,
}

pub struct SpeechSegmenter {
    settings: ListenSettings,
    threshold: f32,
    state: SegmenterState,
    speech: Vec<f32>,
    voiced_samples: usize,
    silent_samples: usize,
}

impl SpeechSegmenter {
    pub fn new(settings: ListenSettings) -> Self {
        Self {
            threshold: settings.energy_threshold,
            settings,
            state: SegmenterState::Idle,
            speech: Vec::new(),
            voiced_samples: 0,
            silent_samples: 0,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    /// Raises the threshold above the measured room noise. The configured
    /// energy threshold stays the floor.
    pub fn calibrate(&mut self, ambient: &[f32]) -> f32 {
        let ambient_energy = calculate_energy(ambient);
        self.threshold = self
            .settings
            .energy_threshold
            .max(ambient_energy * AMBIENT_MULTIPLIER);
        tracing::debug!(ambient_energy, threshold = self.threshold, "energy threshold calibrated");
        self.threshold
    }

    /// Feeds one chunk; returns the finished segment once speech is
    /// followed by a long enough pause.
    pub fn push(&mut self, chunk: &[f32]) -> Option<Vec<f32>> {
        if chunk.is_empty() {
            return None;
        }
        let is_speech = calculate_energy(chunk) > self.threshold;
        match self.state {
            SegmenterState::Idle => {
                if is_speech {
                    self.state = SegmenterState::Speaking;
                    self.speech.clear();
                    self.speech.extend_from_slice(chunk);
                    self.voiced_samples = chunk.len();
                    self.silent_samples = 0;
                }
                None
            }
            SegmenterState::Speaking => {
                self.speech.extend_from_slice(chunk);
                if is_speech {
                    self.voiced_samples += chunk.len();
                    self.silent_samples = 0;
                } else {
                    self.silent_samples += chunk.len();
                }
                if self.silent_samples < self.samples_for(self.settings.pause_threshold) {
                    return None;
                }
                let segment = std::mem::take(&mut self.speech);
                let long_enough = self.voiced_samples >= self.samples_for(self.settings.min_speech);
                self.reset();
                if long_enough {
                    Some(segment)
                } else {
                    tracing::trace!("discarding short noise burst");
                    None
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.speech.clear();
        self.voiced_samples = 0;
        self.silent_samples = 0;
    }

    fn samples_for(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * f64::from(self.settings.sample_rate)) as usize
    }
}

/// RMS energy of a chunk of samples.
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
