//! WAV analysis for voice clips: duration plus a compact waveform preview.

use std::io::Cursor;

use crate::error::{Error, Result};

/// Number of peak buckets in a waveform preview.
pub const WAVEFORM_BUCKETS: usize = 64;

/// Derived facts about a recorded voice clip.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceAnalysis {
    /// Clip duration in milliseconds.
    pub duration_ms: u64,
    /// Normalized peak amplitude per bucket, in `[0, 1]`.
    pub waveform: Vec<f32>,
}

/// Analyze a WAV payload: compute the clip duration and bucketed waveform
/// peaks for UI rendering.
///
/// Supports 16-bit integer and 32-bit float PCM, mono or interleaved.
pub fn analyze_wav(bytes: &[u8], buckets: usize) -> Result<VoiceAnalysis> {
    if buckets == 0 {
        return Err(Error::InvalidInput(
            "Waveform bucket count must be greater than zero".to_string(),
        ));
    }

    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|error| Error::InvalidInput(format!("Failed to read WAV data: {error}")))?;
    let spec = reader.spec();

    if spec.sample_rate == 0 || spec.channels == 0 {
        return Err(Error::InvalidInput(
            "WAV header has zero sample rate or channels".to_string(),
        ));
    }

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|sample| {
                sample
                    .map(|value| f32::from(value) / f32::from(i16::MAX))
                    .map_err(|error| {
                        Error::InvalidInput(format!("Failed to decode WAV sample: {error}"))
                    })
            })
            .collect::<Result<_>>()?,
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|sample| {
                sample.map_err(|error| {
                    Error::InvalidInput(format!("Failed to decode WAV sample: {error}"))
                })
            })
            .collect::<Result<_>>()?,
        (format, bits) => {
            return Err(Error::InvalidInput(format!(
                "Unsupported WAV encoding: {format:?} at {bits} bits"
            )));
        }
    };

    let channels = usize::from(spec.channels);
    let frame_count = samples.len() / channels;
    let duration_ms = (frame_count as u128)
        .saturating_mul(1_000)
        .saturating_div(u128::from(spec.sample_rate));
    let duration_ms = u64::try_from(duration_ms).unwrap_or(u64::MAX);

    Ok(VoiceAnalysis {
        duration_ms,
        waveform: bucket_peaks(&samples, channels, buckets.min(frame_count.max(1))),
    })
}

/// Reduce interleaved samples to per-bucket peak amplitudes, normalized so
/// the loudest bucket is 1.0 (all-silence clips stay at zero).
fn bucket_peaks(samples: &[f32], channels: usize, buckets: usize) -> Vec<f32> {
    let frame_count = samples.len() / channels;
    if frame_count == 0 {
        return Vec::new();
    }

    let frames_per_bucket = frame_count.div_ceil(buckets);
    let mut peaks = vec![0.0_f32; buckets];

    for (frame, chunk) in samples.chunks_exact(channels).enumerate() {
        let bucket = (frame / frames_per_bucket).min(buckets - 1);
        for &sample in chunk {
            peaks[bucket] = peaks[bucket].max(sample.abs());
        }
    }

    let loudest = peaks.iter().fold(0.0_f32, |max, &peak| max.max(peak));
    if loudest > 0.0 {
        for peak in &mut peaks {
            *peak /= loudest;
        }
    }
    peaks
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn wav_pcm16(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &sample in samples {
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn duration_covers_mono_and_stereo() {
        let mono = wav_pcm16(&vec![0; 16_000], 16_000, 1);
        assert_eq!(analyze_wav(&mono, 8).unwrap().duration_ms, 1_000);

        // 2 channels interleaved: 32_000 samples = 16_000 frames = 1 second
        let stereo = wav_pcm16(&vec![0; 32_000], 16_000, 2);
        assert_eq!(analyze_wav(&stereo, 8).unwrap().duration_ms, 1_000);
    }

    #[test]
    fn waveform_peaks_are_normalized() {
        let mut samples = vec![0_i16; 800];
        samples[100] = 8_000;
        samples[500] = 16_000;

        let analysis = analyze_wav(&wav_pcm16(&samples, 16_000, 1), 8).unwrap();
        assert_eq!(analysis.waveform.len(), 8);

        let loudest = analysis
            .waveform
            .iter()
            .fold(0.0_f32, |max, &peak| max.max(peak));
        assert!((loudest - 1.0).abs() < f32::EPSILON);
        assert!(analysis.waveform[1] > 0.4 && analysis.waveform[1] < 0.6);
    }

    #[test]
    fn silent_clip_keeps_zero_waveform() {
        let analysis = analyze_wav(&wav_pcm16(&vec![0; 400], 16_000, 1), 4).unwrap();
        assert!(analysis.waveform.iter().all(|&peak| peak == 0.0));
    }

    #[test]
    fn malformed_wav_is_rejected() {
        assert!(matches!(
            analyze_wav(b"not-a-wav", 8).unwrap_err(),
            Error::InvalidInput(_)
        ));
    }
}
