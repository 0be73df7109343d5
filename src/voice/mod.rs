//! Voice stress evaluation
//!
//! Scores a short voice clip 0-100. Silence is reported as `no_speech` and never
//! scored. With an injected stress classifier the score comes from its class
//! probabilities; otherwise (or when the classifier fails) a deterministic
//! energy / zero-crossing heuristic is used, so the evaluator always answers.

mod decode;
mod features;
mod mfcc;

pub use decode::{decode_wav, DecodedAudio};
pub use features::{
    frame_slices, rms, track_pitch, zero_crossing_rate, AcousticFeatures, FRAME_LENGTH,
    HOP_LENGTH, MAX_PITCH_HZ, MIN_PITCH_HZ,
};
pub use mfcc::{MfccExtractor, N_MELS};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classifier::{ClassPrediction, StressClassifier};
use crate::modality::{clamp_score, first_band, round1, Band, ModalityStatus};
use crate::vitals::RiskProbabilities;

/// Errors that can occur while processing a voice clip
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    #[error("Feature extraction failed: {0}")]
    Features(String),
}

/// Tunable voice thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Mean RMS below this (with too few voiced frames) is silence
    pub silence_energy: f32,
    /// Voiced fraction below this (with low energy) is silence
    pub silence_voiced_fraction: f32,

    /// Heuristic: `min(1, energy * energy_gain) * energy_weight + zcr * zcr_weight`
    pub energy_gain: f32,
    pub energy_weight: f32,
    pub zcr_weight: f32,

    /// Heuristic score at or above this is class 1
    pub medium_threshold: f32,
    /// Heuristic score at or above this is class 2
    pub high_threshold: f32,

    /// MFCC coefficients handed to the classifier
    pub n_mfcc: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            silence_energy: 0.008,
            silence_voiced_fraction: 0.05,
            energy_gain: 10.0,
            energy_weight: 70.0,
            zcr_weight: 30.0,
            medium_threshold: 30.0,
            high_threshold: 65.0,
            n_mfcc: 40,
        }
    }
}

/// How the stress score was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressMethod {
    Model,
    Heuristic,
    None,
}

/// Voice modality result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceStress {
    pub status: ModalityStatus,
    pub stress_score: f32,
    pub risk_class: usize,
    pub probabilities: RiskProbabilities,
    /// Mean pitch of voiced frames (Hz), diagnostic only
    pub pitch_avg: f32,
    pub energy: f32,
    pub zcr: f32,
    pub voiced_fraction: f32,
    pub no_speech: bool,
    pub method: StressMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VoiceStress {
    /// Zero-evidence result
    pub fn empty(status: ModalityStatus) -> Self {
        Self {
            status,
            stress_score: 0.0,
            risk_class: 0,
            probabilities: RiskProbabilities {
                low: 1.0,
                medium: Some(0.0),
                high: 0.0,
            },
            pitch_avg: 0.0,
            energy: 0.0,
            zcr: 0.0,
            voiced_fraction: 0.0,
            no_speech: false,
            method: StressMethod::None,
            error: None,
        }
    }

    pub fn with_error(status: ModalityStatus, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(status)
        }
    }

    pub fn detected(&self) -> bool {
        self.status.is_detected()
    }

    pub fn score(&self) -> f32 {
        self.stress_score
    }
}

/// Voice evaluator with an optional injected stress classifier
#[derive(Clone, Default)]
pub struct VoiceEvaluator {
    classifier: Option<Arc<dyn StressClassifier>>,
    config: VoiceConfig,
}

impl VoiceEvaluator {
    pub fn new(config: VoiceConfig) -> Self {
        Self {
            classifier: None,
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn StressClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    /// Decode WAV bytes and evaluate them
    pub fn evaluate_bytes(&self, bytes: &[u8]) -> VoiceStress {
        match decode_wav(bytes) {
            Ok(audio) => self.evaluate(&audio.samples, audio.sample_rate),
            Err(e) => {
                warn!("Voice clip could not be decoded: {}", e);
                VoiceStress::with_error(ModalityStatus::DecodeFailed, e.to_string())
            }
        }
    }

    /// Evaluate a mono waveform. Never fails: errors become zero-evidence results.
    pub fn evaluate(&self, samples: &[f32], sample_rate: u32) -> VoiceStress {
        match self.try_evaluate(samples, sample_rate) {
            Ok(result) => result,
            Err(e) => {
                warn!("Voice evaluation failed: {}", e);
                VoiceStress::with_error(ModalityStatus::DecodeFailed, e.to_string())
            }
        }
    }

    fn try_evaluate(&self, samples: &[f32], sample_rate: u32) -> Result<VoiceStress, VoiceError> {
        if samples.is_empty() {
            return Err(VoiceError::InvalidAudio("Empty audio".to_string()));
        }
        if sample_rate == 0 {
            return Err(VoiceError::InvalidAudio("Sample rate is zero".to_string()));
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(VoiceError::InvalidAudio("Non-finite samples".to_string()));
        }

        let acoustic = AcousticFeatures::extract(samples, sample_rate);
        debug!(
            "Voice features: energy={:.4} zcr={:.4} voiced={:.2} pitch={:.1}",
            acoustic.energy, acoustic.zcr, acoustic.voiced_fraction, acoustic.pitch_avg
        );

        let base = VoiceStress {
            pitch_avg: round1(acoustic.pitch_avg),
            energy: acoustic.energy,
            zcr: acoustic.zcr,
            voiced_fraction: acoustic.voiced_fraction,
            ..VoiceStress::empty(ModalityStatus::Ok)
        };

        if self.is_silent(&acoustic) {
            info!("No speech detected in voice clip");
            return Ok(VoiceStress {
                status: ModalityStatus::NoSpeech,
                no_speech: true,
                ..base
            });
        }

        if let Some(prediction) = self.model_prediction(samples, sample_rate) {
            if let Some(score) = prediction.score() {
                debug!("Voice stress from model: {:.1}", score);
                return Ok(VoiceStress {
                    stress_score: round1(score),
                    risk_class: prediction.predicted_class,
                    probabilities: RiskProbabilities::from_prediction(&prediction),
                    method: StressMethod::Model,
                    ..base
                });
            }
            warn!(
                "Stress classifier returned {} classes, using heuristic",
                prediction.probabilities.len()
            );
        }

        let (stress_score, risk_class, probabilities) = self.heuristic(&acoustic);
        debug!("Voice stress from heuristic: {:.1}", stress_score);
        Ok(VoiceStress {
            stress_score,
            risk_class,
            probabilities,
            method: StressMethod::Heuristic,
            ..base
        })
    }

    /// Silence needs both low energy and too few voiced frames
    fn is_silent(&self, acoustic: &AcousticFeatures) -> bool {
        acoustic.energy < self.config.silence_energy
            && acoustic.voiced_fraction < self.config.silence_voiced_fraction
    }

    /// Classifier output, `None` when there is no classifier or it failed
    fn model_prediction(&self, samples: &[f32], sample_rate: u32) -> Option<ClassPrediction> {
        let classifier = self.classifier.as_ref()?;

        let features = if classifier.needs_features() {
            let extracted = MfccExtractor::new(sample_rate, self.config.n_mfcc)
                .and_then(|mut extractor| extractor.mean_mfcc(samples));
            match extracted {
                Ok(features) => features,
                Err(e) => {
                    warn!("MFCC extraction failed, using heuristic: {}", e);
                    return None;
                }
            }
        } else {
            Vec::new()
        };

        match classifier.predict(&features) {
            Ok(prediction) => Some(prediction),
            Err(e) => {
                warn!("Stress classifier failed, using heuristic: {}", e);
                None
            }
        }
    }

    /// Energy / zero-crossing score with a synthetic class distribution
    fn heuristic(&self, acoustic: &AcousticFeatures) -> (f32, usize, RiskProbabilities) {
        let c = &self.config;
        let base = (acoustic.energy * c.energy_gain).min(1.0);
        let score = clamp_score(base * c.energy_weight + acoustic.zcr * c.zcr_weight);

        let bands = [
            Band {
                below: c.medium_threshold,
                value: (0, [1.0, 0.0, 0.0]),
            },
            Band {
                below: c.high_threshold,
                value: (1, [0.2, 0.6, 0.2]),
            },
        ];
        let (class, [low, medium, high]) = first_band(&bands, score, (2, [0.1, 0.2, 0.7]));

        (
            round1(score),
            class,
            RiskProbabilities {
                low,
                medium: Some(medium),
                high,
            },
        )
    }
}
