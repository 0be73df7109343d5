//! Seams for the pretrained models this crate consumes but never runs itself.
//!
//! Each collaborator is an injected handle (`Arc<dyn Trait>`), so callers can plug
//! in an ONNX session, an HTTP client or a deterministic fake.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::face::{FaceBox, FaceError};
use crate::modality::clamp_score;
use crate::vitals::VitalsReading;

/// Errors reported by an external classifier
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Model not loaded")]
    NotLoaded,

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Invalid classifier output: {0}")]
    InvalidOutput(String),
}

/// Categorical prediction plus class probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPrediction {
    pub predicted_class: usize,
    pub probabilities: Vec<f32>,
}

impl ClassPrediction {
    pub fn new(predicted_class: usize, probabilities: Vec<f32>) -> Self {
        Self {
            predicted_class,
            probabilities,
        }
    }

    /// Probability of class `idx`, clamped to [0, 1]; 0 when absent
    pub fn probability(&self, idx: usize) -> f32 {
        self.probabilities
            .get(idx)
            .map(|p| if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) })
            .unwrap_or(0.0)
    }

    /// Bounded 0-100 score for this prediction, `None` for unsupported widths
    pub fn score(&self) -> Option<f32> {
        probability_score(&self.probabilities)
    }
}

/// Map a probability vector to a 0-100 score.
///
/// - 2 classes (negative/positive): `P1 * 100`
/// - 3 ordered classes (low/medium/high): `P1 * 50 + P2 * 100`
pub fn probability_score(probabilities: &[f32]) -> Option<f32> {
    let p = |idx: usize| {
        let v = probabilities[idx];
        if v.is_nan() {
            0.0
        } else {
            v.clamp(0.0, 1.0)
        }
    };

    let raw = match probabilities.len() {
        2 => p(1) * 100.0,
        3 => p(1) * 50.0 + p(2) * 100.0,
        _ => return None,
    };
    Some(clamp_score(raw))
}

/// Tabular risk model over the vitals reading
pub trait VitalsClassifier: Send + Sync {
    fn predict(&self, vitals: &VitalsReading) -> Result<ClassPrediction, ClassifierError>;
}

/// Audio stress model over the mean MFCC vector
pub trait StressClassifier: Send + Sync {
    fn predict(&self, mfcc_mean: &[f32]) -> Result<ClassPrediction, ClassifierError>;

    /// Whether the model needs MFCC features at all (skips extraction when not)
    fn needs_features(&self) -> bool {
        true
    }
}

/// Facial landmark detector (468-point mesh, normalized coordinates)
pub trait LandmarkDetector: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> Result<Option<Vec<[f32; 2]>>, ClassifierError>;
}

/// Facial expression classifier over a detected face region
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, frame: &RgbImage, face: FaceBox) -> Result<String, ClassifierError>;
}

/// Decodes a clip into at most `max_frames` RGB frames
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], max_frames: usize) -> Result<Vec<RgbImage>, FaceError>;
}

/// A fixed prediction produced upstream (CLI flags, replay files, tests)
#[derive(Debug, Clone)]
pub struct PrecomputedClassifier {
    prediction: ClassPrediction,
}

impl PrecomputedClassifier {
    pub fn new(prediction: ClassPrediction) -> Self {
        Self { prediction }
    }

    /// Build from a probability vector, predicting the arg-max class
    pub fn from_probabilities(probabilities: Vec<f32>) -> Result<Self, ClassifierError> {
        if probabilities.is_empty() {
            return Err(ClassifierError::InvalidOutput(
                "empty probability vector".to_string(),
            ));
        }
        let predicted_class = probabilities
            .iter()
            .enumerate()
            .fold((0usize, f32::MIN), |best, (idx, &p)| {
                if p > best.1 {
                    (idx, p)
                } else {
                    best
                }
            })
            .0;
        Ok(Self::new(ClassPrediction::new(predicted_class, probabilities)))
    }

    pub fn prediction(&self) -> &ClassPrediction {
        &self.prediction
    }
}

impl VitalsClassifier for PrecomputedClassifier {
    fn predict(&self, _vitals: &VitalsReading) -> Result<ClassPrediction, ClassifierError> {
        Ok(self.prediction.clone())
    }
}

impl StressClassifier for PrecomputedClassifier {
    fn predict(&self, _mfcc_mean: &[f32]) -> Result<ClassPrediction, ClassifierError> {
        Ok(self.prediction.clone())
    }

    fn needs_features(&self) -> bool {
        false
    }
}

/// Parse a comma separated probability list ("0.1,0.2,0.7")
pub fn parse_probabilities(s: &str) -> Result<Vec<f32>, String> {
    s.split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| format!("Invalid probability '{}': {}", part.trim(), e))
        })
        .collect()
}
