//! WAV Sink (spec §4.8): peak-normalized 16-bit PCM writer, grounded on
//! the teacher's `hound`-based `write_wav`.

use std::path::Path;

use sf_core::{SfError, SfResult};

/// Peak threshold above which the sink scales down to avoid clipping.
const PEAK_CEILING: f32 = 0.95;

/// Write planar float32 `[C][N]` channels to a canonical 16-bit PCM WAV
/// file, per spec §4.8's procedure.
pub fn write_wav<P: AsRef<Path>>(path: P, channels: &[Vec<f32>], sample_rate: u32) -> SfResult<()> {
    let num_channels = channels.len();
    if num_channels == 0 {
        return Err(SfError::Configuration("write_wav requires at least one channel".into()));
    }
    let num_frames = channels[0].len();

    let peak = channels
        .iter()
        .flat_map(|ch| ch.iter())
        .map(|s| s.abs())
        .fold(0.0f32, f32::max);

    let scale = if peak > PEAK_CEILING { PEAK_CEILING / peak } else { 1.0 };

    let spec = hound::WavSpec {
        channels: num_channels as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path.as_ref(), spec)
        .map_err(|e| SfError::Resource(format!("failed to create wav writer: {e}")))?;

    for i in 0..num_frames {
        for ch in channels {
            let scaled = (ch[i] * scale).clamp(-1.0, 1.0);
            let sample = (scaled * i16::MAX as f32) as i16;
            writer
                .write_sample(sample)
                .map_err(|e| SfError::Resource(format!("failed to write wav sample: {e}")))?;
        }
    }

    writer
        .finalize()
        .map_err(|e| SfError::Resource(format!("failed to finalize wav file: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_channel_list() {
        let result = write_wav("/tmp/stemforge_sink_test_empty.wav", &[], 44100);
        assert!(result.is_err());
    }

    #[test]
    fn writes_and_clips_a_quiet_file() {
        let left = vec![0.1f32, -0.1, 0.2, -0.2];
        let right = vec![0.1f32, -0.1, 0.2, -0.2];
        let path = "/tmp/stemforge_sink_test_quiet.wav";
        let result = write_wav(path, &[left, right], 44100);
        assert!(result.is_ok());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn scales_down_a_hot_signal() {
        let left = vec![1.5f32, -1.5, 0.0, 0.0];
        let right = vec![1.5f32, -1.5, 0.0, 0.0];
        let path = "/tmp/stemforge_sink_test_hot.wav";
        let result = write_wav(path, &[left, right], 44100);
        assert!(result.is_ok());

        let reader = hound::WavReader::open(path).unwrap();
        let max_sample = reader
            .into_samples::<i16>()
            .map(|s| s.unwrap().unsigned_abs())
            .max()
            .unwrap();
        // scale = 0.95 / 1.5, so the clamped peak should land near 0.95 * i16::MAX.
        let expected = (0.95 * i16::MAX as f32) as u16;
        assert!(max_sample.abs_diff(expected) <= 1);

        let _ = std::fs::remove_file(path);
    }
}
