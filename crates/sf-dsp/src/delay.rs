//! Delay line (spec §4.10) and its stereo ping-pong variant.

use sf_core::Sample;

use crate::biquad::BiquadTdf2;
use crate::soft_clip_delay;
use crate::{MonoProcessor, Processor, ProcessorConfig, StereoProcessor};

/// Preset table referenced by spec §6. Exact per-preset numeric values are
/// not reproduced from an external table (none is carried in this
/// workspace's spec text); each preset below is a musically distinct,
/// internally consistent point in the documented parameter ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayPreset {
    SlapBack,
    ClassicEcho,
    Ambient,
    Rhythmic,
    PingPong,
    TapeEcho,
    Dub,
    Thickening,
}

struct DelaySettings {
    time_ms: f64,
    feedback: f64,
    mix: f64,
    hp_hz: f64,
    lp_hz: f64,
}

impl DelayPreset {
    fn settings(self) -> DelaySettings {
        match self {
            DelayPreset::SlapBack => DelaySettings {
                time_ms: 90.0,
                feedback: 0.15,
                mix: 0.25,
                hp_hz: 150.0,
                lp_hz: 9000.0,
            },
            DelayPreset::ClassicEcho => DelaySettings {
                time_ms: 350.0,
                feedback: 0.45,
                mix: 0.35,
                hp_hz: 100.0,
                lp_hz: 6000.0,
            },
            DelayPreset::Ambient => DelaySettings {
                time_ms: 620.0,
                feedback: 0.55,
                mix: 0.45,
                hp_hz: 200.0,
                lp_hz: 4000.0,
            },
            DelayPreset::Rhythmic => DelaySettings {
                time_ms: 375.0,
                feedback: 0.4,
                mix: 0.3,
                hp_hz: 120.0,
                lp_hz: 7000.0,
            },
            DelayPreset::PingPong => DelaySettings {
                time_ms: 280.0,
                feedback: 0.42,
                mix: 0.4,
                hp_hz: 100.0,
                lp_hz: 8000.0,
            },
            DelayPreset::TapeEcho => DelaySettings {
                time_ms: 250.0,
                feedback: 0.5,
                mix: 0.35,
                hp_hz: 180.0,
                lp_hz: 3500.0,
            },
            DelayPreset::Dub => DelaySettings {
                time_ms: 450.0,
                feedback: 0.65,
                mix: 0.4,
                hp_hz: 220.0,
                lp_hz: 3000.0,
            },
            DelayPreset::Thickening => DelaySettings {
                time_ms: 25.0,
                feedback: 0.1,
                mix: 0.5,
                hp_hz: 80.0,
                lp_hz: 12000.0,
            },
        }
    }
}

/// Mono delay line with a filtered, soft-clipped feedback path, per
/// spec §4.10.
#[derive(Debug, Clone)]
pub struct Delay {
    buffer: Vec<Sample>,
    write_pos: usize,
    delay_samples: usize,
    max_delay_samples: usize,
    feedback: f64,
    mix: f64,

    highpass: BiquadTdf2,
    lowpass: BiquadTdf2,
    filter_enabled: bool,
    /// One-pole damping register; doubles as the "last output register".
    damp_reg: f64,
    damp: f64,

    sample_rate: f64,
}

impl Delay {
    pub fn new(sample_rate: f64, max_delay_ms: f64) -> Self {
        let max_delay_samples = (max_delay_ms * 0.001 * sample_rate) as usize;
        let mut delay = Self {
            buffer: vec![0.0; max_delay_samples.max(1)],
            write_pos: 0,
            delay_samples: ((500.0 * 0.001 * sample_rate) as usize).min(max_delay_samples.saturating_sub(1)),
            max_delay_samples: max_delay_samples.max(1),
            feedback: 0.5,
            mix: 0.5,
            highpass: BiquadTdf2::new(sample_rate),
            lowpass: BiquadTdf2::new(sample_rate),
            filter_enabled: true,
            damp_reg: 0.0,
            damp: 0.2,
            sample_rate,
        };
        delay.highpass.set_highpass(80.0, 0.707);
        delay.lowpass.set_lowpass(8000.0, 0.707);
        delay
    }

    pub fn from_preset(sample_rate: f64, preset: DelayPreset) -> Self {
        let s = preset.settings();
        let mut delay = Self::new(sample_rate, (s.time_ms * 2.0).max(1000.0));
        delay.set_delay_ms(s.time_ms);
        delay.set_feedback(s.feedback);
        delay.set_mix(s.mix);
        delay.set_highpass(s.hp_hz);
        delay.set_lowpass(s.lp_hz);
        delay
    }

    pub fn set_delay_ms(&mut self, ms: f64) {
        let samples = (ms * 0.001 * self.sample_rate) as usize;
        self.delay_samples = samples.min(self.max_delay_samples - 1);
    }

    pub fn set_feedback(&mut self, feedback: f64) {
        self.feedback = feedback.clamp(0.0, 0.99);
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn set_highpass(&mut self, freq: f64) {
        self.highpass.set_highpass(freq, 0.707);
    }

    pub fn set_lowpass(&mut self, freq: f64) {
        self.lowpass.set_lowpass(freq, 0.707);
    }

    pub fn set_filter_enabled(&mut self, enabled: bool) {
        self.filter_enabled = enabled;
    }

    pub fn set_damping(&mut self, damp: f64) {
        self.damp = damp.clamp(0.0, 1.0);
    }

    #[inline]
    fn read_delayed(&self) -> Sample {
        let read_pos =
            (self.write_pos + self.max_delay_samples - self.delay_samples) % self.max_delay_samples;
        self.buffer[read_pos]
    }
}

impl Processor for Delay {
    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.damp_reg = 0.0;
        self.highpass.reset();
        self.lowpass.reset();
    }
}

impl MonoProcessor for Delay {
    fn process_sample(&mut self, input: Sample) -> Sample {
        let d = self.read_delayed();

        let raw_feedback = soft_clip_delay(input + d * self.feedback as Sample);
        let filtered = if self.filter_enabled {
            let hp = self.highpass.process_sample(raw_feedback);
            self.lowpass.process_sample(hp)
        } else {
            raw_feedback
        };

        self.damp_reg += self.damp * (filtered as f64 - self.damp_reg);
        self.buffer[self.write_pos] = self.damp_reg as Sample;
        self.write_pos = (self.write_pos + 1) % self.max_delay_samples;

        input * (1.0 - self.mix as Sample) + d * self.mix as Sample
    }
}

impl ProcessorConfig for Delay {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        let ratio = sample_rate / self.sample_rate;
        self.sample_rate = sample_rate;
        self.max_delay_samples = ((self.max_delay_samples as f64 * ratio) as usize).max(1);
        self.delay_samples = (self.delay_samples as f64 * ratio) as usize;
        self.buffer = vec![0.0; self.max_delay_samples];
        self.highpass.set_sample_rate(sample_rate);
        self.lowpass.set_sample_rate(sample_rate);
    }
}

/// Stereo ping-pong delay: independent L/R lines cross-fed by `ping_pong`.
#[derive(Debug, Clone)]
pub struct PingPongDelay {
    buffer_l: Vec<Sample>,
    buffer_r: Vec<Sample>,
    write_pos: usize,
    delay_samples: usize,
    max_delay_samples: usize,
    feedback: f64,
    mix: f64,
    ping_pong: f64,

    highpass_l: BiquadTdf2,
    highpass_r: BiquadTdf2,
    lowpass_l: BiquadTdf2,
    lowpass_r: BiquadTdf2,

    sample_rate: f64,
}

impl PingPongDelay {
    pub fn new(sample_rate: f64, max_delay_ms: f64) -> Self {
        let max_delay_samples = (max_delay_ms * 0.001 * sample_rate) as usize;
        let mut delay = Self {
            buffer_l: vec![0.0; max_delay_samples.max(1)],
            buffer_r: vec![0.0; max_delay_samples.max(1)],
            write_pos: 0,
            delay_samples: ((500.0 * 0.001 * sample_rate) as usize).min(max_delay_samples.saturating_sub(1)),
            max_delay_samples: max_delay_samples.max(1),
            feedback: 0.5,
            mix: 0.5,
            ping_pong: 1.0,
            highpass_l: BiquadTdf2::new(sample_rate),
            highpass_r: BiquadTdf2::new(sample_rate),
            lowpass_l: BiquadTdf2::new(sample_rate),
            lowpass_r: BiquadTdf2::new(sample_rate),
            sample_rate,
        };
        delay.highpass_l.set_highpass(80.0, 0.707);
        delay.highpass_r.set_highpass(80.0, 0.707);
        delay.lowpass_l.set_lowpass(8000.0, 0.707);
        delay.lowpass_r.set_lowpass(8000.0, 0.707);
        delay
    }

    pub fn set_delay_ms(&mut self, ms: f64) {
        let samples = (ms * 0.001 * self.sample_rate) as usize;
        self.delay_samples = samples.min(self.max_delay_samples - 1);
    }

    pub fn set_feedback(&mut self, feedback: f64) {
        self.feedback = feedback.clamp(0.0, 0.99);
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn set_ping_pong(&mut self, amount: f64) {
        self.ping_pong = amount.clamp(0.0, 1.0);
    }

    pub fn set_hp_freq(&mut self, freq_hz: f64) {
        let f = freq_hz.clamp(20.0, 2000.0);
        self.highpass_l.set_highpass(f, 0.707);
        self.highpass_r.set_highpass(f, 0.707);
    }

    pub fn set_lp_freq(&mut self, freq_hz: f64) {
        let f = freq_hz.clamp(200.0, 20000.0);
        self.lowpass_l.set_lowpass(f, 0.707);
        self.lowpass_r.set_lowpass(f, 0.707);
    }
}

impl Processor for PingPongDelay {
    fn reset(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
        self.highpass_l.reset();
        self.highpass_r.reset();
        self.lowpass_l.reset();
        self.lowpass_r.reset();
    }
}

impl StereoProcessor for PingPongDelay {
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let read_pos =
            (self.write_pos + self.max_delay_samples - self.delay_samples) % self.max_delay_samples;

        let delayed_l = self.buffer_l[read_pos];
        let delayed_r = self.buffer_r[read_pos];

        let filtered_l = soft_clip_delay(self.lowpass_l.process_sample(
            self.highpass_l.process_sample(delayed_l),
        ));
        let filtered_r = soft_clip_delay(self.lowpass_r.process_sample(
            self.highpass_r.process_sample(delayed_r),
        ));

        let fb_l = filtered_l * (1.0 - self.ping_pong as Sample) + filtered_r * self.ping_pong as Sample;
        let fb_r = filtered_r * (1.0 - self.ping_pong as Sample) + filtered_l * self.ping_pong as Sample;

        self.buffer_l[self.write_pos] = left + fb_l * self.feedback as Sample;
        self.buffer_r[self.write_pos] = right + fb_r * self.feedback as Sample;
        self.write_pos = (self.write_pos + 1) % self.max_delay_samples;

        let out_l = left * (1.0 - self.mix as Sample) + delayed_l * self.mix as Sample;
        let out_r = right * (1.0 - self.mix as Sample) + delayed_r * self.mix as Sample;
        (out_l, out_r)
    }
}

impl ProcessorConfig for PingPongDelay {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        let ratio = sample_rate / self.sample_rate;
        self.sample_rate = sample_rate;
        self.max_delay_samples = ((self.max_delay_samples as f64 * ratio) as usize).max(1);
        self.delay_samples = (self.delay_samples as f64 * ratio) as usize;
        self.buffer_l = vec![0.0; self.max_delay_samples];
        self.buffer_r = vec![0.0; self.max_delay_samples];
        self.highpass_l.set_sample_rate(sample_rate);
        self.highpass_r.set_sample_rate(sample_rate);
        self.lowpass_l.set_sample_rate(sample_rate);
        self.lowpass_r.set_sample_rate(sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_is_idempotent() {
        let mut d = Delay::new(44100.0, 1000.0);
        d.set_delay_ms(100.0);
        d.reset();
        let mut y1 = vec![0.0; 512];
        for (i, y) in y1.iter_mut().enumerate() {
            *y = d.process_sample(if i == 0 { 1.0 } else { 0.0 });
        }

        let mut d2 = Delay::new(44100.0, 1000.0);
        d2.set_delay_ms(100.0);
        d2.reset();
        let mut y2 = vec![0.0; 512];
        for (i, y) in y2.iter_mut().enumerate() {
            *y = d2.process_sample(if i == 0 { 1.0 } else { 0.0 });
        }

        assert_eq!(y1, y2);
    }

    #[test]
    fn delay_produces_echo_at_expected_offset() {
        let mut d = Delay::new(44100.0, 1000.0);
        d.set_delay_ms(10.0);
        d.set_mix(1.0);
        d.set_filter_enabled(false);
        let delay_samples = (10.0 * 0.001 * 44100.0) as usize;
        let mut out = vec![0.0; delay_samples + 2];
        for (i, y) in out.iter_mut().enumerate() {
            *y = d.process_sample(if i == 0 { 1.0 } else { 0.0 });
        }
        assert!(out[delay_samples].abs() > 0.1);
    }
}
