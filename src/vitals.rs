//! Vitals risk adapter
//!
//! Turns the external tabular classifier's output into a bounded 0-100 risk score.
//! A missing or failing classifier yields score 0 with an `unavailable` status,
//! which callers must read as "no evidence" rather than "healthy".

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::classifier::{ClassPrediction, VitalsClassifier};
use crate::modality::{clamp_score, ModalityStatus};

/// Errors for vitals input. Malformed vitals are the only fatal request error.
#[derive(Debug, Error)]
pub enum VitalsError {
    #[error("Invalid vitals JSON: {0}")]
    Malformed(String),

    #[error("Vitals field '{0}' is not a finite number")]
    NonFinite(&'static str),
}

/// One vitals reading as entered by staff or streamed from a wearable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalsReading {
    pub heart_rate: f64,
    pub bp_systolic: f64,
    pub bp_diastolic: f64,
    pub spo2: f64,
    pub temperature: f64,
    pub pain_level: i32,
    pub fatigue_level: i32,
}

impl VitalsReading {
    /// Parse and validate a JSON vitals object
    pub fn from_json(json: &str) -> Result<Self, VitalsError> {
        let reading: VitalsReading =
            serde_json::from_str(json).map_err(|e| VitalsError::Malformed(e.to_string()))?;
        reading.validate()?;
        Ok(reading)
    }

    /// Reject NaN / infinite measurements
    pub fn validate(&self) -> Result<(), VitalsError> {
        let fields = [
            ("heart_rate", self.heart_rate),
            ("bp_systolic", self.bp_systolic),
            ("bp_diastolic", self.bp_diastolic),
            ("spo2", self.spo2),
            ("temperature", self.temperature),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(VitalsError::NonFinite(name));
            }
        }
        Ok(())
    }
}

/// Which kind of model produced the vitals score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalsModelKind {
    /// Sepsis / no-sepsis
    Binary,
    /// Low / medium / high severity
    ThreeClass,
}

/// Class probabilities broken out for display
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskProbabilities {
    pub low: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium: Option<f32>,
    pub high: f32,
}

impl RiskProbabilities {
    pub fn from_prediction(prediction: &ClassPrediction) -> Self {
        match prediction.probabilities.len() {
            2 => Self {
                low: prediction.probability(0),
                medium: None,
                high: prediction.probability(1),
            },
            _ => Self {
                low: prediction.probability(0),
                medium: Some(prediction.probability(1)),
                high: prediction.probability(2),
            },
        }
    }
}

/// Vitals modality result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsRisk {
    pub status: ModalityStatus,
    pub risk_score: f32,
    pub risk_class: Option<usize>,
    pub probabilities: Option<RiskProbabilities>,
    pub model_used: Option<VitalsModelKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VitalsRisk {
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            status: ModalityStatus::Unavailable,
            risk_score: 0.0,
            risk_class: None,
            probabilities: None,
            model_used: None,
            error: Some(error.into()),
        }
    }

    /// Degraded result used when the analysis task itself failed or timed out
    pub fn degraded(status: ModalityStatus, error: impl Into<String>) -> Self {
        Self {
            status,
            ..Self::unavailable(error)
        }
    }

    pub fn detected(&self) -> bool {
        self.status.is_detected()
    }

    pub fn score(&self) -> f32 {
        self.risk_score
    }
}

/// Adapter around an injected vitals classifier
#[derive(Clone, Default)]
pub struct VitalsAdapter {
    classifier: Option<Arc<dyn VitalsClassifier>>,
}

impl VitalsAdapter {
    pub fn new(classifier: Option<Arc<dyn VitalsClassifier>>) -> Self {
        Self { classifier }
    }

    pub fn is_ready(&self) -> bool {
        self.classifier.is_some()
    }

    /// Score a reading. Never fails: classifier problems become `unavailable`.
    pub fn assess(&self, vitals: &VitalsReading) -> VitalsRisk {
        let Some(classifier) = self.classifier.as_ref() else {
            debug!("No vitals classifier configured");
            return VitalsRisk::unavailable("Model not loaded");
        };

        let prediction = match classifier.predict(vitals) {
            Ok(p) => p,
            Err(e) => {
                warn!("Vitals classifier failed: {}", e);
                return VitalsRisk::unavailable(e.to_string());
            }
        };

        let model_used = match prediction.probabilities.len() {
            2 => VitalsModelKind::Binary,
            3 => VitalsModelKind::ThreeClass,
            n => {
                warn!("Vitals classifier returned {} classes, expected 2 or 3", n);
                return VitalsRisk::unavailable(format!(
                    "Unsupported class count: {}",
                    n
                ));
            }
        };

        let risk_score = clamp_score(prediction.score().unwrap_or(0.0));
        debug!(
            "Vitals risk {:.1} (class {}, {:?})",
            risk_score, prediction.predicted_class, model_used
        );

        VitalsRisk {
            status: ModalityStatus::Ok,
            risk_score,
            risk_class: Some(prediction.predicted_class),
            probabilities: Some(RiskProbabilities::from_prediction(&prediction)),
            model_used: Some(model_used),
            error: None,
        }
    }
}
