//! Overdrive and distortion (spec §4.12): asymmetric tanh saturation and
//! hard-drive soft clipping respectively.

use sf_core::Sample;

use crate::biquad::BiquadTdf2;
use crate::{MonoProcessor, Processor, ProcessorConfig};

#[inline]
fn overdrive_curve(x: Sample) -> Sample {
    if x >= 0.0 {
        (0.7 * x).tanh() * 1.2
    } else {
        (0.9 * x).tanh() * 0.9
    }
}

/// `sign(x)·(2 − 2/(|x|+1))` for `|x| > 1`, identity otherwise.
#[inline]
fn distortion_soft_clip(x: Sample) -> Sample {
    let ax = x.abs();
    if ax > 1.0 {
        x.signum() * (2.0 - 2.0 / (ax + 1.0))
    } else {
        x
    }
}

/// Asymmetric tanh overdrive with a two-pole (LP/HP-blend) tone control.
pub struct Overdrive {
    drive: Sample,
    tone: f64,
    mix: Sample,
    output_trim: Sample,
    tone_lp: BiquadTdf2,
    tone_hp: BiquadTdf2,
}

impl Overdrive {
    pub fn new(sample_rate: f64) -> Self {
        let mut tone_lp = BiquadTdf2::new(sample_rate);
        tone_lp.set_lowpass(3000.0, 0.707);
        let mut tone_hp = BiquadTdf2::new(sample_rate);
        tone_hp.set_highpass(3000.0, 0.707);
        Self {
            drive: 1.0,
            tone: 0.5,
            mix: 1.0,
            output_trim: 1.0,
            tone_lp,
            tone_hp,
        }
    }

    pub fn set_drive(&mut self, drive: f64) {
        self.drive = drive.clamp(0.1, 10.0) as Sample;
    }

    pub fn set_tone(&mut self, tone: f64) {
        self.tone = tone.clamp(0.0, 1.0);
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix.clamp(0.0, 1.0) as Sample;
    }

    pub fn set_output_trim_db(&mut self, db: f64) {
        self.output_trim = sf_core::db_to_linear(db) as Sample;
    }
}

impl Processor for Overdrive {
    fn reset(&mut self) {
        self.tone_lp.reset();
        self.tone_hp.reset();
    }
}

impl MonoProcessor for Overdrive {
    fn process_sample(&mut self, input: Sample) -> Sample {
        let driven = overdrive_curve(input * self.drive);
        let lp = self.tone_lp.process_sample(driven);
        let hp = self.tone_hp.process_sample(driven);
        let toned = lp * (1.0 - self.tone as Sample) + hp * self.tone as Sample;
        let wet = toned * self.output_trim;
        input * (1.0 - self.mix) + wet * self.mix
    }
}

impl ProcessorConfig for Overdrive {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.tone_lp.set_sample_rate(sample_rate);
        self.tone_hp.set_sample_rate(sample_rate);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistortionPreset {
    Crunch,
    Fuzz,
    Metal,
    Bitcrush,
}

struct DistortionSettings {
    drive: f64,
    mix: f64,
    output_gain_db: f64,
}

impl DistortionPreset {
    fn settings(self) -> DistortionSettings {
        match self {
            DistortionPreset::Crunch => DistortionSettings {
                drive: 2.0,
                mix: 0.6,
                output_gain_db: -3.0,
            },
            DistortionPreset::Fuzz => DistortionSettings {
                drive: 5.0,
                mix: 0.85,
                output_gain_db: -6.0,
            },
            DistortionPreset::Metal => DistortionSettings {
                drive: 8.0,
                mix: 1.0,
                output_gain_db: -8.0,
            },
            DistortionPreset::Bitcrush => DistortionSettings {
                drive: 3.5,
                mix: 0.7,
                output_gain_db: -4.0,
            },
        }
    }
}

/// Hard-drive then `distortion_soft_clip`.
pub struct Distortion {
    drive: Sample,
    mix: Sample,
    output_gain: Sample,
}

impl Distortion {
    pub fn new() -> Self {
        Self {
            drive: 2.0,
            mix: 0.7,
            output_gain: 1.0,
        }
    }

    pub fn from_preset(preset: DistortionPreset) -> Self {
        let s = preset.settings();
        Self {
            drive: s.drive as Sample,
            mix: s.mix as Sample,
            output_gain: sf_core::db_to_linear(s.output_gain_db) as Sample,
        }
    }

    pub fn set_drive(&mut self, drive: f64) {
        self.drive = drive.clamp(0.1, 20.0) as Sample;
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix.clamp(0.0, 1.0) as Sample;
    }

    pub fn set_output_gain_db(&mut self, db: f64) {
        self.output_gain = sf_core::db_to_linear(db) as Sample;
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Distortion {
    fn reset(&mut self) {}
}

impl MonoProcessor for Distortion {
    fn process_sample(&mut self, input: Sample) -> Sample {
        let driven = distortion_soft_clip(input * self.drive) * self.output_gain;
        input * (1.0 - self.mix) + driven * self.mix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distortion_clip_bounded() {
        for i in -50..=50 {
            let x = i as Sample / 5.0;
            let y = distortion_soft_clip(x);
            assert!(y.abs() <= 2.0);
        }
    }

    #[test]
    fn distortion_identity_below_unity() {
        assert_eq!(distortion_soft_clip(0.5), 0.5);
        assert_eq!(distortion_soft_clip(-0.9), -0.9);
    }

    #[test]
    fn overdrive_reset_is_idempotent() {
        let mut od = Overdrive::new(44100.0);
        let mut y1 = Vec::new();
        for i in 0..200 {
            y1.push(od.process_sample((i as Sample * 0.05).sin()));
        }
        od.reset();
        let mut y2 = Vec::new();
        for i in 0..200 {
            y2.push(od.process_sample((i as Sample * 0.05).sin()));
        }
        assert_eq!(y1, y2);
    }
}
