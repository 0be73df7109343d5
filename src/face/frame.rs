//! Per-frame face metrics: fatigue from EAR, brow tension, emotion risk, quality tag.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::geometry::PixelLandmarks;
use super::FaceConfig;
use crate::modality::first_band;

/// What the landmark + emotion collaborators reported for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameObservation {
    pub width: u32,
    pub height: u32,
    /// Mean luma on a 0-255 scale
    pub mean_luminance: f32,
    /// Normalized 468-point mesh, `None` when no face was detected
    #[serde(default)]
    pub landmarks: Option<Vec<[f32; 2]>>,
    /// Emotion label, `None` when the classifier is unavailable
    #[serde(default)]
    pub emotion: Option<String>,
}

/// Per-frame capture quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalQuality {
    Good,
    LowLight,
    TooFar,
    NoFace,
    NoVideo,
}

/// Eyelid classification from EAR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyelidState {
    Closed,
    PartiallyClosed,
    Open,
}

/// Emotion label to risk contribution; unknown labels score 0
pub const EMOTION_RISK: [(&str, f32); 7] = [
    ("Fear", 80.0),
    ("Sad", 80.0),
    ("Angry", 80.0),
    ("Disgust", 80.0),
    ("Neutral", 10.0),
    ("Happy", 0.0),
    ("Surprise", 30.0),
];

/// Label used when no emotion classifier output exists
pub const UNKNOWN_EMOTION: &str = "Unknown";

pub fn emotion_risk(label: &str) -> f32 {
    EMOTION_RISK
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(label))
        .map(|&(_, risk)| risk)
        .unwrap_or(0.0)
}

/// Derived metrics for one frame in which a face was found
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSample {
    pub ear: f32,
    pub fatigue_score: f32,
    pub eyelid_state: EyelidState,
    pub brow_tension: f32,
    pub emotion: String,
    pub emotion_risk: f32,
    /// max(fatigue, emotion risk, brow tension)
    pub risk_score: f32,
    pub signal_quality: SignalQuality,
}

/// Quality tag for a frame; `NoFace` when the landmarks are missing
pub fn frame_quality(
    observation: &FrameObservation,
    landmarks: Option<&PixelLandmarks>,
    config: &FaceConfig,
) -> SignalQuality {
    let Some(landmarks) = landmarks else {
        return SignalQuality::NoFace;
    };
    if observation.mean_luminance < config.low_light_luminance {
        return SignalQuality::LowLight;
    }
    let (fw, fh) = landmarks.face_fraction();
    if fw < config.min_face_fraction || fh < config.min_face_fraction {
        return SignalQuality::TooFar;
    }
    SignalQuality::Good
}

/// Analyse one frame. `None` means no usable face (the frame is `no_face`).
pub fn analyze_frame(observation: &FrameObservation, config: &FaceConfig) -> Option<FrameSample> {
    let normalized = observation.landmarks.as_deref()?;
    let Some(landmarks) =
        PixelLandmarks::project(normalized, observation.width, observation.height)
    else {
        debug!(
            "Face mesh rejected ({} points, {}x{} frame); counting frame as no face",
            normalized.len(),
            observation.width,
            observation.height
        );
        return None;
    };
    let Some(ear) = landmarks.average_ear() else {
        debug!("Degenerate eye contour in detected face; counting frame as no face");
        return None;
    };

    let (eyelid_state, fatigue_score) = first_band(
        &config.ear_bands(),
        ear,
        (EyelidState::Open, config.fatigue_open),
    );
    let brow_tension = first_band(
        &config.brow_bands(),
        landmarks.brow_gap(),
        config.tension_low,
    );

    let emotion = observation
        .emotion
        .clone()
        .unwrap_or_else(|| UNKNOWN_EMOTION.to_string());
    let emotion_risk = emotion_risk(&emotion);

    let risk_score = fatigue_score.max(emotion_risk).max(brow_tension);
    let signal_quality = frame_quality(observation, Some(&landmarks), config);

    trace!(
        "Frame: ear={:.3} fatigue={} brow={} emotion={} risk={} quality={:?}",
        ear,
        fatigue_score,
        brow_tension,
        emotion,
        risk_score,
        signal_quality
    );

    Some(FrameSample {
        ear,
        fatigue_score,
        eyelid_state,
        brow_tension,
        emotion,
        emotion_risk,
        risk_score,
        signal_quality,
    })
}
