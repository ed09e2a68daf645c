//! WAV encoding for captured audio.

use std::io::Cursor;

use crate::error::FormatConversionWarning;

/// 16-bit mono PCM WAV.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, FormatConversionWarning> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let warn = |err: hound::Error| FormatConversionWarning { reason: err.to_string() };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(warn)?;
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(value).map_err(warn)?;
        }
        writer.finalize().map_err(warn)?;
    }
    Ok(cursor.into_inner())
}

/// The bytes to upload for a take: a WAV file, or the raw little-endian
/// `f32` capture when encoding fails.
pub fn upload_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    match encode_wav(samples, sample_rate) {
        Ok(bytes) => bytes,
        Err(warning) => {
            log::warn!("{warning}");
            samples.iter().flat_map(|s| s.to_le_bytes()).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_wav_reads_back() {
        let samples = [0.0, 0.5, -0.5, 1.5];
        let bytes = encode_wav(&samples, 16_000).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded[3], i16::MAX);
        assert!((decoded[1] as f32 / i16::MAX as f32 - 0.5).abs() < 1e-3);
    }

    #[test]
    fn empty_take_is_a_header_only_file() {
        let bytes = upload_bytes(&[], 44_100);
        assert!(bytes.starts_with(b"RIFF"));
        assert_eq!(bytes.len(), 44);
    }
}
