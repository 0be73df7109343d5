//! Shared per-modality vocabulary
//!
//! Every modality (vitals, face, voice) reports a bounded 0-100 score plus a
//! status explaining where that score came from. A score of 0 with a non-`Ok`
//! status means "no evidence", never "healthy".

use serde::{Deserialize, Serialize};

/// Lower and upper bound of every modality score
pub const SCORE_MIN: f32 = 0.0;
pub const SCORE_MAX: f32 = 100.0;

/// Where a modality result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalityStatus {
    /// Signal analysed and scored
    Ok,
    /// Audio decoded but contained no speech
    NoSpeech,
    /// Frames decoded but no face in any of them
    NoFace,
    /// No frame could be decoded
    NoVideo,
    /// Caller did not supply this modality
    NotProvided,
    /// Required collaborator (classifier / detector) missing
    Unavailable,
    /// Media could not be decoded or features could not be extracted
    DecodeFailed,
    /// Analysis exceeded the per-modality deadline
    TimedOut,
    /// Analysis task aborted unexpectedly
    Failed,
}

impl ModalityStatus {
    /// Whether the modality produced any evidence at all.
    ///
    /// `NoFace` counts: a decoded clip without a face is weak evidence of presence.
    pub fn is_detected(&self) -> bool {
        matches!(self, Self::Ok | Self::NoFace)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NoSpeech => "no_speech",
            Self::NoFace => "no_face",
            Self::NoVideo => "no_video",
            Self::NotProvided => "not_provided",
            Self::Unavailable => "unavailable",
            Self::DecodeFailed => "decode_failed",
            Self::TimedOut => "timed_out",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ModalityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three numbers fusion and triage consume
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalityScores {
    pub vitals: f32,
    pub face: f32,
    pub voice: f32,
}

impl ModalityScores {
    pub fn new(vitals: f32, face: f32, voice: f32) -> Self {
        Self {
            vitals: clamp_score(vitals),
            face: clamp_score(face),
            voice: clamp_score(voice),
        }
    }
}

/// Clamp a score into [0, 100]; NaN collapses to 0
pub fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        return SCORE_MIN;
    }
    score.clamp(SCORE_MIN, SCORE_MAX)
}

/// One row of an ordered threshold table: applies when `value < below`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band<T> {
    pub below: f32,
    pub value: T,
}

/// First-match-wins lookup over ascending bands, `fallback` when none match
pub fn first_band<T: Copy>(bands: &[Band<T>], x: f32, fallback: T) -> T {
    bands
        .iter()
        .find(|band| x < band.below)
        .map(|band| band.value)
        .unwrap_or(fallback)
}

/// Round to one decimal place
pub fn round1(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_score_bounds() {
        assert_eq!(clamp_score(-5.0), 0.0);
        assert_eq!(clamp_score(150.0), 100.0);
        assert_eq!(clamp_score(f32::NAN), 0.0);
        assert_eq!(clamp_score(f32::INFINITY), 100.0);
        assert_eq!(clamp_score(42.5), 42.5);
    }

    #[test]
    fn test_first_band() {
        let bands = [Band { below: 1.0, value: 'a' }, Band { below: 2.0, value: 'b' }];
        assert_eq!(first_band(&bands, 0.5, 'z'), 'a');
        assert_eq!(first_band(&bands, 1.0, 'z'), 'b');
        assert_eq!(first_band(&bands, 5.0, 'z'), 'z');
    }

    #[test]
    fn test_round1() {
        assert!((round1(57.04) - 57.0).abs() < 1e-4);
        assert!((round1(57.06) - 57.1).abs() < 1e-4);
    }

    #[test]
    fn test_status_detected() {
        assert!(ModalityStatus::Ok.is_detected());
        assert!(ModalityStatus::NoFace.is_detected());
        assert!(!ModalityStatus::NoVideo.is_detected());
        assert!(!ModalityStatus::NotProvided.is_detected());
        assert!(!ModalityStatus::NoSpeech.is_detected());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ModalityStatus::NotProvided).unwrap();
        assert_eq!(json, "\"not_provided\"");
        assert_eq!(ModalityStatus::TimedOut.to_string(), "timed_out");
    }
}
