//! Weighted fusion of the three modality scores with a critical override.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::modality::{clamp_score, round1, ModalityScores};

/// Per-modality weights of the fused score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub vitals: f32,
    pub face: f32,
    pub voice: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vitals: 0.6,
            face: 0.2,
            voice: 0.2,
        }
    }
}

/// A single modality above its limit lifts the fused score to `floor`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriticalOverride {
    pub vitals_above: f32,
    pub face_above: f32,
    pub voice_above: f32,
    pub floor: f32,
}

impl Default for CriticalOverride {
    fn default() -> Self {
        Self {
            vitals_above: 90.0,
            face_above: 80.0,
            voice_above: 80.0,
            floor: 85.0,
        }
    }
}

impl CriticalOverride {
    pub fn triggered(&self, scores: &ModalityScores) -> bool {
        scores.vitals > self.vitals_above
            || scores.face > self.face_above
            || scores.voice > self.voice_above
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub weights: FusionWeights,
    pub critical: CriticalOverride,
}

impl FusionConfig {
    /// Fused 0-100 risk, rounded to one decimal.
    ///
    /// Missing modalities arrive as 0 and simply pull the weighted sum down.
    pub fn fuse(&self, scores: &ModalityScores) -> f32 {
        let scores = ModalityScores::new(scores.vitals, scores.face, scores.voice);
        let w = &self.weights;

        let weighted = w.vitals * scores.vitals + w.face * scores.face + w.voice * scores.voice;
        let mut fused = round1(clamp_score(weighted));

        if self.critical.triggered(&scores) {
            fused = fused.max(self.critical.floor);
            debug!(
                "Critical override: vitals={} face={} voice={} -> {}",
                scores.vitals, scores.face, scores.voice, fused
            );
        }

        fused
    }
}

/// Fuse with the default weights and override
pub fn fuse(scores: &ModalityScores) -> f32 {
    FusionConfig::default().fuse(scores)
}
