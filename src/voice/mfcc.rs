//! Mean MFCC feature vector for the stress classifier.
//!
//! Hann-windowed power spectrum -> triangular mel filterbank -> dB (80 dB floor
//! below the clip peak) -> orthonormal DCT-II, averaged over frames.

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::f32::consts::PI;
use std::sync::Arc;

use super::features::{frame_slices, FRAME_LENGTH, HOP_LENGTH};
use super::VoiceError;

/// Mel bands before the DCT
pub const N_MELS: usize = 128;

/// Dynamic range kept below the loudest bin
const TOP_DB: f32 = 80.0;

/// Smallest power before the log
const AMIN: f32 = 1e-10;

/// MFCC extractor with a pre-computed filterbank and FFT plan
pub struct MfccExtractor {
    n_mfcc: usize,
    fft: Arc<dyn RealToComplex<f32>>,
    mel_filterbank: Vec<Vec<f32>>,
    dct: Vec<Vec<f32>>,
    window: Vec<f32>,
    fft_input: Vec<f32>,
    fft_output: Vec<Complex<f32>>,
}

impl MfccExtractor {
    pub fn new(sample_rate: u32, n_mfcc: usize) -> Result<Self, VoiceError> {
        if sample_rate == 0 {
            return Err(VoiceError::InvalidAudio("Sample rate is zero".to_string()));
        }
        if n_mfcc == 0 || n_mfcc > N_MELS {
            return Err(VoiceError::Features(format!(
                "n_mfcc must be in 1..={}, got {}",
                N_MELS, n_mfcc
            )));
        }

        let window: Vec<f32> = (0..FRAME_LENGTH)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / FRAME_LENGTH as f32).cos()))
            .collect();

        let mel_filterbank = create_mel_filterbank(
            N_MELS,
            FRAME_LENGTH / 2 + 1,
            sample_rate as f32,
            0.0,
            sample_rate as f32 / 2.0,
        );

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FRAME_LENGTH);

        Ok(Self {
            n_mfcc,
            fft,
            mel_filterbank,
            dct: dct_matrix(n_mfcc, N_MELS),
            window,
            fft_input: vec![0.0; FRAME_LENGTH],
            fft_output: vec![Complex::new(0.0, 0.0); FRAME_LENGTH / 2 + 1],
        })
    }

    /// Per-frame mel power spectrogram
    fn mel_power(&mut self, audio: &[f32]) -> Result<Vec<Vec<f32>>, VoiceError> {
        let frames = frame_slices(audio, FRAME_LENGTH, HOP_LENGTH);
        let mut mel_spec = Vec::with_capacity(frames.len());

        for frame in frames {
            self.fft_input.fill(0.0);
            for (i, &sample) in frame.iter().enumerate() {
                self.fft_input[i] = sample * self.window[i];
            }

            self.fft
                .process(&mut self.fft_input, &mut self.fft_output)
                .map_err(|e| VoiceError::Features(format!("FFT failed: {}", e)))?;

            let power: Vec<f32> = self
                .fft_output
                .iter()
                .map(|c| c.re * c.re + c.im * c.im)
                .collect();

            let mel_frame = self
                .mel_filterbank
                .iter()
                .map(|filter| filter.iter().zip(&power).map(|(w, p)| w * p).sum())
                .collect();
            mel_spec.push(mel_frame);
        }

        Ok(mel_spec)
    }

    /// Mean of the per-frame MFCC vectors, `n_mfcc` long
    pub fn mean_mfcc(&mut self, audio: &[f32]) -> Result<Vec<f32>, VoiceError> {
        if audio.is_empty() {
            return Err(VoiceError::InvalidAudio("Empty audio".to_string()));
        }

        let mut mel_spec = self.mel_power(audio)?;
        power_to_db(&mut mel_spec);

        let mut mean = vec![0.0f32; self.n_mfcc];
        for frame in &mel_spec {
            for (acc, basis) in mean.iter_mut().zip(&self.dct) {
                *acc += basis.iter().zip(frame).map(|(b, m)| b * m).sum::<f32>();
            }
        }
        let n = mel_spec.len().max(1) as f32;
        mean.iter_mut().for_each(|v| *v /= n);
        Ok(mean)
    }
}

/// In-place `10*log10(power)` with the floor at `peak - TOP_DB`
fn power_to_db(mel_spec: &mut [Vec<f32>]) {
    let mut peak = f32::NEG_INFINITY;
    for value in mel_spec.iter_mut().flat_map(|f| f.iter_mut()) {
        *value = 10.0 * value.max(AMIN).log10();
        peak = peak.max(*value);
    }
    let floor = peak - TOP_DB;
    for value in mel_spec.iter_mut().flat_map(|f| f.iter_mut()) {
        *value = value.max(floor);
    }
}

/// Orthonormal DCT-II basis, `n_out` rows of `n_in` weights
fn dct_matrix(n_out: usize, n_in: usize) -> Vec<Vec<f32>> {
    let n = n_in as f32;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_in)
                .map(|i| scale * (PI / n * (i as f32 + 0.5) * k as f32).cos())
                .collect()
        })
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular filters equally spaced on the mel scale
fn create_mel_filterbank(
    n_mels: usize,
    n_fft_bins: usize,
    sample_rate: f32,
    fmin: f32,
    fmax: f32,
) -> Vec<Vec<f32>> {
    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);

    let fft_bin_points: Vec<f32> = (0..=n_mels + 1)
        .map(|i| mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32)
        .map(|m| (n_fft_bins as f32 - 1.0) * mel_to_hz(m) / (sample_rate / 2.0))
        .collect();

    (0..n_mels)
        .map(|i| {
            let (left, center, right) =
                (fft_bin_points[i], fft_bin_points[i + 1], fft_bin_points[i + 2]);
            (0..n_fft_bins)
                .map(|bin| {
                    let b = bin as f32;
                    if b >= left && b < center {
                        (b - left) / (center - left)
                    } else if b >= center && b <= right {
                        (right - b) / (right - center)
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}
