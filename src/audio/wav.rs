//! WAV persistence for recording artifacts.

use crate::error::{Result, VoicegateError};
use std::path::Path;

/// Writes signed 16-bit PCM samples as a WAV file.
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32, channels: u16) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| VoicegateError::Artifact {
        message: format!("Failed to create WAV file {}: {}", path.display(), e),
    })?;

    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| VoicegateError::Artifact {
                message: format!("Failed to write WAV sample: {}", e),
            })?;
    }

    writer.finalize().map_err(|e| VoicegateError::Artifact {
        message: format!("Failed to finalize WAV file: {}", e),
    })?;
    Ok(())
}

/// Reads a 16-bit PCM WAV file, returning samples, sample rate and channels.
pub fn read_wav(path: &Path) -> Result<(Vec<i16>, u32, u16)> {
    let mut reader = hound::WavReader::open(path).map_err(|e| VoicegateError::Artifact {
        message: format!("Failed to open WAV file {}: {}", path.display(), e),
    })?;

    let spec = reader.spec();
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(VoicegateError::Artifact {
            message: format!(
                "Unsupported WAV format in {}: {} bits {:?}",
                path.display(),
                spec.bits_per_sample,
                spec.sample_format
            ),
        });
    }

    let samples: std::result::Result<Vec<i16>, _> = reader.samples::<i16>().collect();
    let samples = samples.map_err(|e| VoicegateError::Artifact {
        message: format!("Failed to decode WAV samples: {}", e),
    })?;

    Ok((samples, spec.sample_rate, spec.channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_read_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wav");
        let samples: Vec<i16> = (0..240).map(|i| (i * 100) as i16).collect();

        write_wav(&path, &samples, 24_000, 1).unwrap();
        let (read, rate, channels) = read_wav(&path).unwrap();

        assert_eq!(read, samples);
        assert_eq!(rate, 24_000);
        assert_eq!(channels, 1);
    }

    #[test]
    fn test_read_missing_file_fails() {
        let dir = tempdir().unwrap();
        let result = read_wav(&dir.path().join("missing.wav"));
        assert!(matches!(result, Err(VoicegateError::Artifact { .. })));
    }

    #[test]
    fn test_write_empty_samples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");

        write_wav(&path, &[], 16_000, 1).unwrap();
        let (read, _, _) = read_wav(&path).unwrap();
        assert!(read.is_empty());
    }
}
