//! Face signal aggregation
//!
//! Turns a short clip (or a single still) into one fatigue / distress assessment:
//!
//! ```text
//!   clip bytes
//!       |
//!   FrameDecoder (<= max_frames)
//!       |
//!   per frame: luminance, LandmarkDetector, EmotionClassifier
//!       |
//!   FrameObservation --> analyze_frame --> FrameSample
//!       |
//!   aggregate_frames --> FaceAssessment
//! ```
//!
//! Fatigue is averaged across frames while the combined risk keeps the worst
//! frame, so one frame of acute distress is never diluted by calmer ones.

mod aggregate;
mod decode;
mod frame;
mod geometry;

pub use aggregate::aggregate_frames;
pub use decode::{mean_luminance, StillImageDecoder};
pub use frame::{
    analyze_frame, emotion_risk, EyelidState, FrameObservation, FrameSample,
    SignalQuality, EMOTION_RISK, UNKNOWN_EMOTION,
};
pub use geometry::{mesh, FaceBox, PixelLandmarks, FACE_BOX_PADDING};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classifier::{EmotionClassifier, FrameDecoder, LandmarkDetector};
use crate::modality::{Band, ModalityStatus};

/// Errors that can occur while reading face media
#[derive(Debug, Error)]
pub enum FaceError {
    #[error("Failed to decode frames: {0}")]
    Decode(String),

    #[error("Unsupported media: {0}")]
    Unsupported(String),
}

/// Tunable face thresholds. Defaults are empirical, kept for compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    /// Frames decoded per clip at most
    pub max_frames: usize,

    /// EAR below this is "closed"
    pub ear_closed: f32,
    /// EAR below this is "partially closed"
    pub ear_partial: f32,
    pub fatigue_closed: f32,
    pub fatigue_partial: f32,
    pub fatigue_open: f32,

    /// Brow-to-eye gap (fraction of frame height) below this is high tension
    pub brow_gap_high: f32,
    /// Gap below this is moderate tension
    pub brow_gap_moderate: f32,
    pub tension_high: f32,
    pub tension_moderate: f32,
    pub tension_low: f32,

    /// Mean luma (0-255) below this is low light
    pub low_light_luminance: f32,
    /// Face narrower or shorter than this fraction of the frame is too far
    pub min_face_fraction: f32,

    /// Fatigue reported when frames decoded but no face was found
    pub no_face_fatigue: f32,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            max_frames: 12,
            ear_closed: 0.18,
            ear_partial: 0.24,
            fatigue_closed: 95.0,
            fatigue_partial: 60.0,
            fatigue_open: 10.0,
            brow_gap_high: 0.035,
            brow_gap_moderate: 0.05,
            tension_high: 90.0,
            tension_moderate: 60.0,
            tension_low: 20.0,
            low_light_luminance: 40.0,
            min_face_fraction: 0.30,
            no_face_fatigue: 10.0,
        }
    }
}

impl FaceConfig {
    /// EAR table, evaluated top to bottom
    pub fn ear_bands(&self) -> [Band<(EyelidState, f32)>; 2] {
        [
            Band {
                below: self.ear_closed,
                value: (EyelidState::Closed, self.fatigue_closed),
            },
            Band {
                below: self.ear_partial,
                value: (EyelidState::PartiallyClosed, self.fatigue_partial),
            },
        ]
    }

    /// Brow gap table, evaluated top to bottom
    pub fn brow_bands(&self) -> [Band<f32>; 2] {
        [
            Band {
                below: self.brow_gap_high,
                value: self.tension_high,
            },
            Band {
                below: self.brow_gap_moderate,
                value: self.tension_moderate,
            },
        ]
    }
}

/// Face modality result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceAssessment {
    pub status: ModalityStatus,
    /// Mean per-frame fatigue, rounded; this is the face score fed to fusion
    pub fatigue_level: f32,
    /// Worst per-frame combined risk
    pub risk_score: f32,
    /// Emotion of the first analysed frame
    pub emotion: String,
    pub eyelid_state: Option<EyelidState>,
    pub brow_tension: Option<f32>,
    /// Mean eye aspect ratio
    pub ear: Option<f32>,
    pub signal_quality: SignalQuality,
    pub frames_decoded: usize,
    pub frames_analyzed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FaceAssessment {
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
        self.fatigue_level
    }
}

/// Face analyzer with injected decoding and vision collaborators
#[derive(Clone)]
pub struct FaceAnalyzer {
    decoder: Arc<dyn FrameDecoder>,
    detector: Option<Arc<dyn LandmarkDetector>>,
    emotion: Option<Arc<dyn EmotionClassifier>>,
    config: FaceConfig,
}

impl FaceAnalyzer {
    pub fn new(config: FaceConfig) -> Self {
        Self {
            decoder: Arc::new(StillImageDecoder),
            detector: None,
            emotion: None,
            config,
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn FrameDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn LandmarkDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_emotion_classifier(mut self, classifier: Arc<dyn EmotionClassifier>) -> Self {
        self.emotion = Some(classifier);
        self
    }

    pub fn config(&self) -> &FaceConfig {
        &self.config
    }

    /// Whether encoded media can be analysed (a landmark detector is present)
    pub fn is_ready(&self) -> bool {
        self.detector.is_some()
    }

    /// Decode a clip and analyse up to `max_frames` frames
    pub fn analyze_video(&self, bytes: &[u8]) -> FaceAssessment {
        let Some(detector) = self.detector.as_ref() else {
            debug!("No landmark detector configured");
            return FaceAssessment::with_error(ModalityStatus::Unavailable, "Landmark detector not loaded");
        };

        let mut frames = match self.decoder.decode(bytes, self.config.max_frames) {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Face clip could not be decoded: {}", e);
                return FaceAssessment::with_error(ModalityStatus::NoVideo, e.to_string());
            }
        };
        frames.truncate(self.config.max_frames);

        let mut observations = Vec::with_capacity(frames.len());
        let mut detector_failures = 0usize;
        for (idx, frame) in frames.iter().enumerate() {
            let landmarks = match detector.detect(frame) {
                Ok(landmarks) => landmarks,
                Err(e) => {
                    warn!("Landmark detection failed on frame {}: {}", idx, e);
                    detector_failures += 1;
                    None
                }
            };

            let emotion = match (&landmarks, &self.emotion) {
                (Some(points), Some(classifier)) => {
                    let face_box = PixelLandmarks::project(points, frame.width(), frame.height())
                        .map(|lm| lm.face_box(FACE_BOX_PADDING));
                    match face_box {
                        Some(face_box) => match classifier.classify(frame, face_box) {
                            Ok(label) => Some(label),
                            Err(e) => {
                                debug!("Emotion classification failed on frame {}: {}", idx, e);
                                None
                            }
                        },
                        None => None,
                    }
                }
                _ => None,
            };

            observations.push(FrameObservation {
                width: frame.width(),
                height: frame.height(),
                mean_luminance: mean_luminance(frame),
                landmarks,
                emotion,
            });
        }

        if !frames.is_empty() && detector_failures == frames.len() {
            return FaceAssessment::with_error(
                ModalityStatus::Unavailable,
                "Landmark detector failed on every frame",
            );
        }

        self.analyze_observations(&observations)
    }

    /// Aggregate collaborator output that was already extracted per frame
    pub fn analyze_observations(&self, observations: &[FrameObservation]) -> FaceAssessment {
        let considered = &observations[..observations.len().min(self.config.max_frames)];
        let samples: Vec<FrameSample> = considered
            .iter()
            .filter_map(|obs| analyze_frame(obs, &self.config))
            .collect();

        let result = aggregate_frames(&samples, considered.len(), &self.config);
        info!(
            "Face: {} ({} of {} frames with a face), fatigue={}, risk={}, quality={:?}",
            result.status,
            result.frames_analyzed,
            result.frames_decoded,
            result.fatigue_level,
            result.risk_score,
            result.signal_quality
        );
        result
    }
}
