//! Acoustic features: framewise RMS energy, zero-crossing rate, pitch track
//!
//! ## Algorithm
//! 1. Slice the waveform into 2048-sample frames with a 512-sample hop
//! 2. RMS and zero-crossing rate per frame, averaged over the clip
//! 3. McLeod pitch per frame, kept when inside C2..C7
//! 4. Voiced fraction = frames with a kept pitch / all frames

use pitch_detection::detector::mcleod::McLeodDetector;
use pitch_detection::detector::PitchDetector;

/// Samples per analysis frame
pub const FRAME_LENGTH: usize = 2048;

/// Hop between frames
pub const HOP_LENGTH: usize = 512;

/// C2
pub const MIN_PITCH_HZ: f32 = 65.41;

/// C7
pub const MAX_PITCH_HZ: f32 = 2093.0;

/// Minimum mean power per sample for a frame to be pitch-tracked (RMS 0.001).
/// pitch-detection compares its threshold to the frame's summed power, so the
/// frame threshold scales with `FRAME_LENGTH`; voicing is then decided by clarity.
const MIN_SAMPLE_POWER: f32 = 1e-6;

const POWER_THRESHOLD: f32 = MIN_SAMPLE_POWER * FRAME_LENGTH as f32;

/// Clarity threshold for pitch detection
const CLARITY_THRESHOLD: f32 = 0.5;

/// Clip-level acoustic summary
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AcousticFeatures {
    /// Mean framewise RMS
    pub energy: f32,
    /// Mean framewise zero-crossing rate (crossings per sample)
    pub zcr: f32,
    /// Fraction of frames with an in-range pitch
    pub voiced_fraction: f32,
    /// Mean pitch over voiced frames in Hz, 0 when none
    pub pitch_avg: f32,
}

impl AcousticFeatures {
    pub fn extract(samples: &[f32], sample_rate: u32) -> Self {
        let frames = frame_slices(samples, FRAME_LENGTH, HOP_LENGTH);
        if frames.is_empty() {
            return Self::default();
        }

        let n = frames.len() as f32;
        let energy = frames.iter().map(|f| rms(f)).sum::<f32>() / n;
        let zcr = frames.iter().map(|f| zero_crossing_rate(f)).sum::<f32>() / n;
        let (voiced_fraction, pitch_avg) = track_pitch(samples, sample_rate as usize);

        Self {
            energy,
            zcr,
            voiced_fraction,
            pitch_avg,
        }
    }
}

/// Frame boundaries; a clip shorter than one frame is a single short frame
pub fn frame_slices(samples: &[f32], frame: usize, hop: usize) -> Vec<&[f32]> {
    if samples.is_empty() || frame == 0 || hop == 0 {
        return Vec::new();
    }
    let n_frames = if samples.len() >= frame {
        1 + (samples.len() - frame) / hop
    } else {
        1
    };
    (0..n_frames)
        .map(|i| {
            let start = i * hop;
            &samples[start..(start + frame).min(samples.len())]
        })
        .collect()
}

pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

/// Sign changes per sample; zero counts as positive
pub fn zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / frame.len() as f32
}

/// Returns `(voiced_fraction, mean_pitch_hz)`; both 0 when the clip is shorter than a frame
pub fn track_pitch(samples: &[f32], sample_rate: usize) -> (f32, f32) {
    if samples.len() < FRAME_LENGTH || sample_rate == 0 {
        return (0.0, 0.0);
    }

    let mut detector = McLeodDetector::new(FRAME_LENGTH, FRAME_LENGTH / 2);
    let mut pitches = Vec::new();
    let mut total_frames = 0usize;

    let mut start = 0;
    while start + FRAME_LENGTH <= samples.len() {
        let frame = &samples[start..start + FRAME_LENGTH];
        total_frames += 1;

        if let Some(pitch) =
            detector.get_pitch(frame, sample_rate, POWER_THRESHOLD, CLARITY_THRESHOLD)
        {
            if (MIN_PITCH_HZ..=MAX_PITCH_HZ).contains(&pitch.frequency) {
                pitches.push(pitch.frequency);
            }
        }

        start += HOP_LENGTH;
    }

    if pitches.is_empty() {
        return (0.0, 0.0);
    }

    let voiced_fraction = pitches.len() as f32 / total_frames as f32;
    let mean = pitches.iter().sum::<f32>() / pitches.len() as f32;
    (voiced_fraction, mean)
}


#[cfg(test)]
mod tests {
    use super::fixtures::generate_sine;
    use super::*;

    #[test]
    fn test_frame_slices() {
        let samples = vec![0.0; 4096];
        let frames = frame_slices(&samples, FRAME_LENGTH, HOP_LENGTH);
        assert_eq!(frames.len(), 1 + (4096 - 2048) / 512);
        assert!(frames.iter().all(|f| f.len() == FRAME_LENGTH));

        let short = vec![0.0; 100];
        let frames = frame_slices(&short, FRAME_LENGTH, HOP_LENGTH);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 100);

        assert!(frame_slices(&[], FRAME_LENGTH, HOP_LENGTH).is_empty());
    }

    #[test]
    fn test_rms_of_sine() {
        let samples = generate_sine(200.0, 16000, 1000, 0.5);
        // 0.5 / sqrt(2)
        assert!((rms(&samples) - 0.3536).abs() < 0.01);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_zero_crossing_rate() {
        let alternating = [1.0, -1.0, 1.0, -1.0];
        assert!((zero_crossing_rate(&alternating) - 0.75).abs() < 1e-6);
        assert_eq!(zero_crossing_rate(&[0.0; 10]), 0.0);

        // Two crossings per period
        let samples = generate_sine(200.0, 16000, 1000, 0.5);
        let zcr = zero_crossing_rate(&samples);
        assert!((zcr - 0.025).abs() < 0.002, "zcr {}", zcr);
    }

    #[test]
    fn test_pitch_of_constant_tone() {
        let samples = generate_sine(220.0, 16000, 1000, 0.5);
        let (voiced, pitch) = track_pitch(&samples, 16000);
        assert!(voiced > 0.5, "voiced fraction {}", voiced);
        assert!((pitch - 220.0).abs() < 20.0, "pitch {}", pitch);
    }

    #[test]
    fn test_quiet_tone_is_voiced() {
        // RMS ~0.0071, well under typical speaking level
        let samples = generate_sine(200.0, 16000, 2000, 0.01);
        let features = AcousticFeatures::extract(&samples, 16000);
        assert!(features.energy < 0.008, "energy {}", features.energy);
        assert!(features.voiced_fraction > 0.5, "voiced fraction {}", features.voiced_fraction);
        assert!((features.pitch_avg - 200.0).abs() < 20.0, "pitch {}", features.pitch_avg);
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let samples = vec![0.0; 16000];
        let features = AcousticFeatures::extract(&samples, 16000);
        assert_eq!(features.energy, 0.0);
        assert_eq!(features.zcr, 0.0);
        assert_eq!(features.voiced_fraction, 0.0);
        assert_eq!(features.pitch_avg, 0.0);
    }

    #[test]
    fn test_too_short_for_pitch() {
        let samples = generate_sine(220.0, 16000, 50, 0.5);
        assert_eq!(track_pitch(&samples, 16000), (0.0, 0.0));
        // Energy still measured on the single short frame
        assert!(AcousticFeatures::extract(&samples, 16000).energy > 0.3);
    }
}
