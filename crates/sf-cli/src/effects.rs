//! Offline effect application over a whole WAV file: read, process block
//! by block through a preset, write (spec §4.9-§4.15 presets applied
//! outside the real-time graph). Grounded on the teacher's preset
//! constructor idiom (`from_preset`) for each effect.

use std::path::Path;
use std::str::FromStr;

use sf_core::SfResult;
use sf_dsp::dynamics::{Compressor, CompressorPreset};
use sf_dsp::reverb::{Reverb, ReverbPreset};
use sf_dsp::{MonoProcessor, StereoProcessor};

const SAMPLE_RATE_HZ: f64 = 44100.0;
const BLOCK_LEN: usize = 2048;

pub fn parse_reverb_preset(name: &str) -> Option<ReverbPreset> {
    Some(match name.to_ascii_lowercase().as_str() {
        "small_room" | "smallroom" => ReverbPreset::SmallRoom,
        "large_hall" | "largehall" => ReverbPreset::LargeHall,
        "cathedral" => ReverbPreset::Cathedral,
        "plate" => ReverbPreset::Plate,
        "spring" => ReverbPreset::Spring,
        "ambient_pad" | "ambientpad" => ReverbPreset::AmbientPad,
        "vocal_booth" | "vocalbooth" => ReverbPreset::VocalBooth,
        "drum_room" | "drumroom" => ReverbPreset::DrumRoom,
        "gated" => ReverbPreset::Gated,
        "subtle" => ReverbPreset::Subtle,
        _ => return None,
    })
}

pub fn parse_compressor_preset(name: &str) -> Option<CompressorPreset> {
    Some(match name.to_ascii_lowercase().as_str() {
        "vocal_gentle" | "vocalgentle" => CompressorPreset::VocalGentle,
        "vocal_aggressive" | "vocalaggressive" => CompressorPreset::VocalAggressive,
        "drums" => CompressorPreset::Drums,
        "bass" => CompressorPreset::Bass,
        "mastering_limiter" | "masteringlimiter" => CompressorPreset::MasteringLimiter,
        "vintage" => CompressorPreset::Vintage,
        _ => return None,
    })
}

/// Apply a reverb preset to the whole file at `input_path`, writing the
/// wet/dry mix to `output_path`.
pub fn apply_reverb(input_path: &Path, output_path: &Path, preset: ReverbPreset) -> SfResult<()> {
    let mut reverb = Reverb::from_preset(SAMPLE_RATE_HZ, preset);
    let stream = crate::read_whole_stream(input_path)?;

    let mut left = stream.left().to_vec();
    let mut right = stream.right().to_vec();
    for chunk_start in (0..left.len()).step_by(BLOCK_LEN) {
        let end = (chunk_start + BLOCK_LEN).min(left.len());
        reverb.process_block(&mut left[chunk_start..end], &mut right[chunk_start..end]);
    }

    sf_io::write_wav(output_path, &[left, right], SAMPLE_RATE_HZ as u32)
}

/// Apply a compressor preset independently to each channel.
pub fn apply_compressor(input_path: &Path, output_path: &Path, preset: CompressorPreset) -> SfResult<()> {
    let mut left_comp = Compressor::from_preset(SAMPLE_RATE_HZ, preset);
    let mut right_comp = Compressor::from_preset(SAMPLE_RATE_HZ, preset);
    let stream = crate::read_whole_stream(input_path)?;

    let mut left = stream.left().to_vec();
    let mut right = stream.right().to_vec();
    left_comp.process_block(&mut left);
    right_comp.process_block(&mut right);

    sf_io::write_wav(output_path, &[left, right], SAMPLE_RATE_HZ as u32)
}

/// Supported offline effect kinds, parsed from a CLI flag.
#[derive(Clone)]
pub enum EffectKind {
    Reverb(ReverbPreset),
    Compressor(CompressorPreset),
}

impl FromStr for EffectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((kind, preset)) = s.split_once(':') {
            if kind.eq_ignore_ascii_case("reverb") {
                return parse_reverb_preset(preset)
                    .map(EffectKind::Reverb)
                    .ok_or_else(|| format!("unknown reverb preset \"{preset}\""));
            }
            if kind.eq_ignore_ascii_case("compressor") {
                return parse_compressor_preset(preset)
                    .map(EffectKind::Compressor)
                    .ok_or_else(|| format!("unknown compressor preset \"{preset}\""));
            }
        }
        Err(format!("expected \"reverb:<preset>\" or \"compressor:<preset>\", got \"{s}\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_reverb_presets_case_insensitively() {
        assert_eq!(parse_reverb_preset("Cathedral"), Some(ReverbPreset::Cathedral));
        assert_eq!(parse_reverb_preset("vocal_booth"), Some(ReverbPreset::VocalBooth));
        assert_eq!(parse_reverb_preset("not_a_preset"), None);
    }

    #[test]
    fn parses_known_compressor_presets() {
        assert_eq!(parse_compressor_preset("Drums"), Some(CompressorPreset::Drums));
        assert_eq!(parse_compressor_preset("vocal_aggressive"), Some(CompressorPreset::VocalAggressive));
        assert_eq!(parse_compressor_preset("nope"), None);
    }

    #[test]
    fn effect_kind_parses_reverb_flag() {
        let kind: EffectKind = "reverb:plate".parse().unwrap();
        assert!(matches!(kind, EffectKind::Reverb(ReverbPreset::Plate)));
    }
}
