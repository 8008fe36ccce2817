//! Minimal PCM16 WAV framing.
//!
//! Audio crosses the module boundaries as encoded WAV bytes; this module is
//! the single place that knows the framing. Only canonical 44-byte-header
//! PCM files are produced, and decoding accepts the PCM subset (16-bit
//! samples, any rate/channel count).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WavError {
    #[error("not a RIFF/WAVE file")]
    NotWave,

    #[error("unsupported WAV encoding: only 16-bit PCM is accepted")]
    UnsupportedEncoding,

    #[error("truncated WAV data")]
    Truncated,
}

/// Decoded PCM audio: normalized `f32` samples plus the source format.
#[derive(Debug, Clone)]
pub struct DecodedWav {
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Encode mono `f32` samples as a 16-bit PCM WAV file.
pub fn encode_pcm16_mono(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let byte_rate = sample_rate * 2;
    let mut out = Vec::with_capacity(44 + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        out.extend_from_slice(&((clamped * i16::MAX as f32) as i16).to_le_bytes());
    }

    out
}

/// Decode a 16-bit PCM WAV file into normalized `f32` samples.
///
/// Walks the RIFF chunk list so files with extra chunks (LIST, fact) still
/// decode.
pub fn decode(bytes: &[u8]) -> Result<DecodedWav, WavError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(WavError::NotWave);
    }

    let mut sample_rate = None;
    let mut channels = None;
    let mut bits_per_sample = None;
    let mut data: Option<&[u8]> = None;

    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = u32::from_le_bytes([
            bytes[pos + 4],
            bytes[pos + 5],
            bytes[pos + 6],
            bytes[pos + 7],
        ]) as usize;
        let body_start = pos + 8;
        let body_end = body_start.checked_add(size).ok_or(WavError::Truncated)?;
        if body_end > bytes.len() {
            return Err(WavError::Truncated);
        }
        let body = &bytes[body_start..body_end];

        match id {
            b"fmt " => {
                if body.len() < 16 {
                    return Err(WavError::Truncated);
                }
                let format = u16::from_le_bytes([body[0], body[1]]);
                if format != 1 {
                    return Err(WavError::UnsupportedEncoding);
                }
                channels = Some(u16::from_le_bytes([body[2], body[3]]));
                sample_rate = Some(u32::from_le_bytes([body[4], body[5], body[6], body[7]]));
                bits_per_sample = Some(u16::from_le_bytes([body[14], body[15]]));
            }
            b"data" => data = Some(body),
            _ => {} // skip LIST, fact, etc.
        }

        // Chunks are word-aligned.
        pos = body_end + (size & 1);
    }

    let sample_rate = sample_rate.ok_or(WavError::NotWave)?;
    let channels = channels.ok_or(WavError::NotWave)?;
    let data = data.ok_or(WavError::Truncated)?;

    if bits_per_sample != Some(16) {
        return Err(WavError::UnsupportedEncoding);
    }

    let samples = data
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
        .collect();

    Ok(DecodedWav {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_header_fields() {
        let wav = encode_pcm16_mono(&[0.0; 160], 16_000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 320);
        // sample rate at offset 24
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 16_000);
    }

    #[test]
    fn decode_recovers_format_and_samples() {
        let samples: Vec<f32> = (0..64).map(|i| (i as f32 / 64.0) - 0.5).collect();
        let wav = encode_pcm16_mono(&samples, 16_000);
        let decoded = decode(&wav).expect("decode");
        assert_eq!(decoded.sample_rate, 16_000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.samples.iter()) {
            assert!((a - b).abs() < 1e-3, "sample drift: {a} vs {b}");
        }
    }

    #[test]
    fn decode_rejects_non_wave_bytes() {
        assert!(matches!(decode(b"hello world!"), Err(WavError::NotWave)));
        assert!(matches!(decode(&[]), Err(WavError::NotWave)));
    }

    #[test]
    fn decode_rejects_truncated_data_chunk() {
        let mut wav = encode_pcm16_mono(&[0.5; 100], 16_000);
        wav.truncate(60);
        assert!(matches!(decode(&wav), Err(WavError::Truncated)));
    }

    #[test]
    fn decode_rejects_non_pcm_encoding() {
        let mut wav = encode_pcm16_mono(&[0.5; 10], 16_000);
        // Flip the format tag at offset 20 to IEEE float (3).
        wav[20] = 3;
        assert!(matches!(decode(&wav), Err(WavError::UnsupportedEncoding)));
    }

    #[test]
    fn encode_clamps_out_of_range_samples() {
        let wav = encode_pcm16_mono(&[2.0, -2.0], 16_000);
        let decoded = decode(&wav).expect("decode");
        assert!((decoded.samples[0] - 1.0).abs() < 1e-3);
        assert!((decoded.samples[1] + 1.0).abs() < 1e-3);
    }
}
