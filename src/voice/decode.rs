//! WAV decoding to mono f32

use std::io::Cursor;

use hound::{SampleFormat, WavReader};
use tracing::debug;

use super::VoiceError;

/// Mono waveform in [-1, 1] with its sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode a RIFF/WAVE buffer. Multi-channel audio is averaged down to mono.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio, VoiceError> {
    if bytes.is_empty() {
        return Err(VoiceError::Decode("Empty audio data".to_string()));
    }

    let mut reader =
        WavReader::new(Cursor::new(bytes)).map_err(|e| VoiceError::Decode(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| VoiceError::Decode(e.to_string()))?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(VoiceError::Decode(format!(
                    "Unsupported bit depth: {}",
                    spec.bits_per_sample
                )));
            }
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| VoiceError::Decode(e.to_string()))?
        }
    };

    let samples: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    debug!(
        "Decoded WAV: {} Hz, {} channel(s), {} bits, {} mono samples",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        samples.len()
    );

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::io::Cursor;

    /// Encode mono f32 samples as 16-bit PCM WAV
    pub fn wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer
                    .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                    .unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::wav_bytes;
    use super::*;
    use hound::{WavSpec, WavWriter};

    #[test]
    fn test_decode_mono_pcm16() {
        let bytes = wav_bytes(&[0.0, 0.5, -0.5, 0.25], 16000);
        let audio = decode_wav(&bytes).unwrap();
        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.samples.len(), 4);
        assert!((audio.samples[1] - 0.5).abs() < 1e-3);
        assert!((audio.samples[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_stereo_float_downmix() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for (l, r) in [(1.0f32, 0.0f32), (0.5, 0.5), (-1.0, 1.0)] {
                writer.write_sample(l).unwrap();
                writer.write_sample(r).unwrap();
            }
            writer.finalize().unwrap();
        }
        let audio = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(audio.samples, vec![0.5, 0.5, 0.0]);
        assert_eq!(audio.sample_rate, 8000);
    }

    #[test]
    fn test_decode_rejects_non_wav() {
        assert!(matches!(decode_wav(b"ID3 mp3 bytes"), Err(VoiceError::Decode(_))));
        assert!(decode_wav(&[]).is_err());
    }

    #[test]
    fn test_duration() {
        let audio = DecodedAudio {
            samples: vec![0.0; 8000],
            sample_rate: 16000,
        };
        assert!((audio.duration_secs() - 0.5).abs() < 1e-6);
    }
}
