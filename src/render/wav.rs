// WAV Export - Encode a rendered buffer as 16-bit mono PCM using hound

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::Path;

use super::mixer::{AudioBuffer, RenderError};

fn wav_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// Convert a buffer to WAV file bytes
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>, RenderError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, wav_spec(buffer.sample_rate()))?;
        for &sample in buffer.samples() {
            writer.write_sample(to_i16(sample))?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Write a buffer to a WAV file on disk
pub fn write_wav(buffer: &AudioBuffer, path: &Path) -> Result<(), RenderError> {
    let mut writer = WavWriter::create(path, wav_spec(buffer.sample_rate()))?;
    for &sample in buffer.samples() {
        writer.write_sample(to_i16(sample))?;
    }
    writer.finalize()?;

    log::info!(
        "Wrote {:.2}s of audio to {}",
        buffer.duration_ms() / 1000.0,
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;
    use tempfile::TempDir;

    fn buffer_with(samples: &[f32]) -> AudioBuffer {
        let mut buffer = AudioBuffer::silent(samples.len() as f64, 1000);
        buffer.overlay(samples, 0.0);
        buffer
    }

    #[test]
    fn test_encode_wav_round_trip() {
        let buffer = buffer_with(&[0.0, 0.5, -0.5, 2.0]);
        let bytes = encode_wav(&buffer).unwrap();

        let mut reader = WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 1000);
        assert_eq!(spec.bits_per_sample, 16);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        // Out-of-range samples are clamped
        assert_eq!(samples, vec![0, 16383, -16383, 32767]);
    }

    #[test]
    fn test_write_wav_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.wav");

        let buffer = AudioBuffer::silent(250.0, 8000);
        write_wav(&buffer, &path).unwrap();

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 2000);
    }
}
