//! Combine per-frame samples from one clip into a single face assessment.

use super::frame::{EyelidState, FrameSample, SignalQuality, UNKNOWN_EMOTION};
use super::{FaceAssessment, FaceConfig};
use crate::modality::{clamp_score, round1, ModalityStatus};

/// Aggregate the frames of one clip.
///
/// `frames_decoded` counts every decoded frame, including those without a face,
/// so a clip with frames but no face can be told apart from an undecodable one.
pub fn aggregate_frames(
    samples: &[FrameSample],
    frames_decoded: usize,
    config: &FaceConfig,
) -> FaceAssessment {
    if samples.is_empty() {
        return if frames_decoded > 0 {
            FaceAssessment {
                status: ModalityStatus::NoFace,
                fatigue_level: config.no_face_fatigue,
                risk_score: config.no_face_fatigue,
                signal_quality: SignalQuality::NoFace,
                frames_decoded,
                ..FaceAssessment::empty(ModalityStatus::NoFace)
            }
        } else {
            FaceAssessment::empty(ModalityStatus::NoVideo)
        };
    }

    let n = samples.len() as f32;
    let fatigue_level = (samples.iter().map(|s| s.fatigue_score).sum::<f32>() / n).round();
    let risk_score = samples
        .iter()
        .map(|s| s.risk_score)
        .fold(0.0f32, f32::max);
    let brow_tension = samples.iter().map(|s| s.brow_tension).sum::<f32>() / n;
    let ear = samples.iter().map(|s| s.ear).sum::<f32>() / n;

    FaceAssessment {
        status: ModalityStatus::Ok,
        fatigue_level: clamp_score(fatigue_level),
        risk_score: clamp_score(risk_score),
        emotion: samples[0].emotion.clone(),
        eyelid_state: majority_eyelid_state(samples),
        brow_tension: Some(round1(brow_tension)),
        ear: Some(ear),
        signal_quality: worst_quality(samples),
        frames_decoded,
        frames_analyzed: samples.len(),
        error: None,
    }
}

/// Most frequent eyelid state; ties go to the state seen first
fn majority_eyelid_state(samples: &[FrameSample]) -> Option<EyelidState> {
    let mut counts: Vec<(EyelidState, usize)> = Vec::with_capacity(3);
    for sample in samples {
        match counts.iter_mut().find(|(state, _)| *state == sample.eyelid_state) {
            Some((_, count)) => *count += 1,
            None => counts.push((sample.eyelid_state, 1)),
        }
    }
    // `counts` is in first-seen order; only a strictly larger count replaces the leader
    counts
        .into_iter()
        .fold(None, |best: Option<(EyelidState, usize)>, (state, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((state, count)),
        })
        .map(|(state, _)| state)
}

/// `low_light` anywhere taints the clip, then `too_far`, else `good`
fn worst_quality(samples: &[FrameSample]) -> SignalQuality {
    if samples
        .iter()
        .any(|s| s.signal_quality == SignalQuality::LowLight)
    {
        SignalQuality::LowLight
    } else if samples
        .iter()
        .any(|s| s.signal_quality == SignalQuality::TooFar)
    {
        SignalQuality::TooFar
    } else {
        SignalQuality::Good
    }
}

impl FaceAssessment {
    /// Result with no frame evidence
    pub fn empty(status: ModalityStatus) -> Self {
        let signal_quality = match status {
            ModalityStatus::NoFace => SignalQuality::NoFace,
            _ => SignalQuality::NoVideo,
        };
        Self {
            status,
            fatigue_level: 0.0,
            risk_score: 0.0,
            emotion: UNKNOWN_EMOTION.to_string(),
            eyelid_state: None,
            brow_tension: None,
            ear: None,
            signal_quality,
            frames_decoded: 0,
            frames_analyzed: 0,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(fatigue: f32, risk: f32, eyelid: EyelidState, quality: SignalQuality) -> FrameSample {
        FrameSample {
            ear: 0.3,
            fatigue_score: fatigue,
            eyelid_state: eyelid,
            brow_tension: 20.0,
            emotion: "Neutral".to_string(),
            emotion_risk: 10.0,
            risk_score: risk,
            signal_quality: quality,
        }
    }

    #[test]
    fn test_worst_frame_wins_but_fatigue_is_mean() {
        let config = FaceConfig::default();
        let samples = vec![
            sample(10.0, 10.0, EyelidState::Open, SignalQuality::Good),
            sample(95.0, 90.0, EyelidState::Closed, SignalQuality::Good),
            sample(10.0, 10.0, EyelidState::Open, SignalQuality::Good),
        ];
        let result = aggregate_frames(&samples, 3, &config);
        assert_eq!(result.status, ModalityStatus::Ok);
        assert_eq!(result.risk_score, 90.0);
        // (10 + 95 + 10) / 3 = 38.33 -> 38
        assert_eq!(result.fatigue_level, 38.0);
        assert_eq!(result.eyelid_state, Some(EyelidState::Open));
        assert_eq!(result.frames_analyzed, 3);
    }

    #[test]
    fn test_first_frame_emotion() {
        let config = FaceConfig::default();
        let mut first = sample(10.0, 80.0, EyelidState::Open, SignalQuality::Good);
        first.emotion = "Fear".to_string();
        let second = sample(10.0, 10.0, EyelidState::Open, SignalQuality::Good);
        let result = aggregate_frames(&[first, second], 2, &config);
        assert_eq!(result.emotion, "Fear");
    }

    #[test]
    fn test_eyelid_tie_goes_to_first_seen() {
        let samples = vec![
            sample(60.0, 60.0, EyelidState::PartiallyClosed, SignalQuality::Good),
            sample(10.0, 10.0, EyelidState::Open, SignalQuality::Good),
            sample(10.0, 10.0, EyelidState::Open, SignalQuality::Good),
            sample(60.0, 60.0, EyelidState::PartiallyClosed, SignalQuality::Good),
        ];
        assert_eq!(
            majority_eyelid_state(&samples),
            Some(EyelidState::PartiallyClosed)
        );
    }

    #[test]
    fn test_quality_precedence() {
        let config = FaceConfig::default();
        let samples = vec![
            sample(10.0, 10.0, EyelidState::Open, SignalQuality::TooFar),
            sample(10.0, 10.0, EyelidState::Open, SignalQuality::LowLight),
            sample(10.0, 10.0, EyelidState::Open, SignalQuality::Good),
        ];
        assert_eq!(
            aggregate_frames(&samples, 3, &config).signal_quality,
            SignalQuality::LowLight
        );
        assert_eq!(
            aggregate_frames(&samples[..1], 1, &config).signal_quality,
            SignalQuality::TooFar
        );
        assert_eq!(
            aggregate_frames(&samples[2..], 1, &config).signal_quality,
            SignalQuality::Good
        );
    }

    #[test]
    fn test_frames_without_face() {
        let config = FaceConfig::default();
        let result = aggregate_frames(&[], 5, &config);
        assert_eq!(result.status, ModalityStatus::NoFace);
        assert!(result.status.is_detected());
        assert_eq!(result.fatigue_level, 10.0);
        assert_eq!(result.signal_quality, SignalQuality::NoFace);
        assert_eq!(result.frames_decoded, 5);
    }

    #[test]
    fn test_nothing_decoded() {
        let config = FaceConfig::default();
        let result = aggregate_frames(&[], 0, &config);
        assert_eq!(result.status, ModalityStatus::NoVideo);
        assert!(!result.status.is_detected());
        assert_eq!(result.fatigue_level, 0.0);
        assert_eq!(result.signal_quality, SignalQuality::NoVideo);
    }
}
