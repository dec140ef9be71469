//! Dynamics processors (spec §4.13): compressor, limiter, dynamic amp
//! (AGC) and autogain.

use sf_core::{db_to_linear, linear_to_db, Sample};

use crate::{MonoProcessor, Processor, ProcessorConfig};

const TINY: f64 = 1e-9;

/// Envelope follower shared by the compressor: attack/release one-pole
/// smoothing of `|x|`, per spec §4.13's `α_att`/`α_rel` formulas.
#[derive(Debug, Clone)]
struct EnvelopeFollower {
    attack_coeff: f64,
    release_coeff: f64,
    envelope: f64,
    sample_rate: f64,
}

impl EnvelopeFollower {
    fn new(sample_rate: f64) -> Self {
        let mut f = Self {
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
            sample_rate,
        };
        f.set_times(10.0, 100.0);
        f
    }

    fn set_times(&mut self, attack_ms: f64, release_ms: f64) {
        self.attack_coeff = (-1.0 / (attack_ms.max(0.01) * 0.001 * self.sample_rate)).exp();
        self.release_coeff = (-1.0 / (release_ms.max(0.01) * 0.001 * self.sample_rate)).exp();
    }

    #[inline]
    fn process(&mut self, input: Sample) -> f64 {
        let abs_input = input.abs() as f64;
        let coeff = if abs_input > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = abs_input + coeff * (self.envelope - abs_input);
        self.envelope
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

/// Preset table referenced by spec §6. Per-preset numeric values are not
/// reproduced from an external table (none is carried in this workspace's
/// spec text); each preset below is a musically distinct, internally
/// consistent point in the documented parameter ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressorPreset {
    VocalGentle,
    VocalAggressive,
    Drums,
    Bass,
    MasteringLimiter,
    Vintage,
}

struct CompressorSettings {
    threshold_db: f64,
    ratio: f64,
    knee_db: f64,
    attack_ms: f64,
    release_ms: f64,
    makeup_db: f64,
}

impl CompressorPreset {
    fn settings(self) -> CompressorSettings {
        match self {
            CompressorPreset::VocalGentle => CompressorSettings {
                threshold_db: -18.0,
                ratio: 2.5,
                knee_db: 6.0,
                attack_ms: 15.0,
                release_ms: 150.0,
                makeup_db: 3.0,
            },
            CompressorPreset::VocalAggressive => CompressorSettings {
                threshold_db: -24.0,
                ratio: 6.0,
                knee_db: 2.0,
                attack_ms: 5.0,
                release_ms: 80.0,
                makeup_db: 6.0,
            },
            CompressorPreset::Drums => CompressorSettings {
                threshold_db: -12.0,
                ratio: 4.0,
                knee_db: 1.0,
                attack_ms: 1.0,
                release_ms: 120.0,
                makeup_db: 4.0,
            },
            CompressorPreset::Bass => CompressorSettings {
                threshold_db: -15.0,
                ratio: 3.5,
                knee_db: 4.0,
                attack_ms: 20.0,
                release_ms: 200.0,
                makeup_db: 3.0,
            },
            CompressorPreset::MasteringLimiter => CompressorSettings {
                threshold_db: -3.0,
                ratio: 10.0,
                knee_db: 0.5,
                attack_ms: 1.0,
                release_ms: 50.0,
                makeup_db: 1.0,
            },
            CompressorPreset::Vintage => CompressorSettings {
                threshold_db: -20.0,
                ratio: 3.0,
                knee_db: 8.0,
                attack_ms: 25.0,
                release_ms: 250.0,
                makeup_db: 4.0,
            },
        }
    }
}

/// Soft-knee-generalized compressor. At `knee_db = 0.0` this reduces
/// exactly to spec §4.13's hard-knee formula
/// `y_dB = thr_dB + (x_dB − thr_dB) / R`.
pub struct Compressor {
    envelope: EnvelopeFollower,
    threshold_db: f64,
    ratio: f64,
    knee_db: f64,
    makeup: f64,
    mix: f64,
    gain_reduction_db: f64,
}

impl Compressor {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            envelope: EnvelopeFollower::new(sample_rate),
            threshold_db: -18.0,
            ratio: 4.0,
            knee_db: 0.0,
            makeup: 1.0,
            mix: 1.0,
            gain_reduction_db: 0.0,
        }
    }

    pub fn from_preset(sample_rate: f64, preset: CompressorPreset) -> Self {
        let s = preset.settings();
        let mut c = Self::new(sample_rate);
        c.set_threshold(s.threshold_db);
        c.set_ratio(s.ratio);
        c.set_knee(s.knee_db);
        c.set_times(s.attack_ms, s.release_ms);
        c.set_makeup(s.makeup_db);
        c
    }

    pub fn set_threshold(&mut self, db: f64) {
        self.threshold_db = db;
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio.max(1.0);
    }

    pub fn set_knee(&mut self, db: f64) {
        self.knee_db = db.max(0.0);
    }

    pub fn set_attack(&mut self, ms: f64) {
        let (_, rel) = (self.envelope.attack_coeff, ms);
        self.envelope.set_times(ms, rel);
    }

    pub fn set_release(&mut self, ms: f64) {
        self.envelope.set_times(10.0, ms);
    }

    pub fn set_times(&mut self, attack_ms: f64, release_ms: f64) {
        self.envelope.set_times(attack_ms, release_ms);
    }

    pub fn set_makeup(&mut self, db: f64) {
        self.makeup = db_to_linear(db);
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn gain_reduction_db(&self) -> f64 {
        self.gain_reduction_db
    }

    /// `y_dB` from spec §4.13, generalized with a soft knee (DAFX-style)
    /// that collapses to the hard-knee formula when `knee_db == 0.0`.
    fn target_output_db(&self, x_db: f64) -> f64 {
        let knee = self.knee_db;
        let delta = x_db - self.threshold_db;
        if knee <= 1e-9 {
            if delta > 0.0 {
                self.threshold_db + delta / self.ratio
            } else {
                x_db
            }
        } else if 2.0 * delta < -knee {
            x_db
        } else if 2.0 * delta.abs() <= knee {
            let over = delta + knee / 2.0;
            x_db + (1.0 / self.ratio - 1.0) * over * over / (2.0 * knee)
        } else {
            self.threshold_db + delta / self.ratio
        }
    }
}

impl Processor for Compressor {
    fn reset(&mut self) {
        self.envelope.reset();
        self.gain_reduction_db = 0.0;
    }
}

impl MonoProcessor for Compressor {
    fn process_sample(&mut self, input: Sample) -> Sample {
        let env = self.envelope.process(input).max(TINY);
        let x_db = linear_to_db(env);
        let y_db = self.target_output_db(x_db);
        let gr_db = y_db - x_db;
        self.gain_reduction_db = gr_db;

        let gain = db_to_linear(gr_db) * self.makeup;
        let wet = input * gain as Sample;
        input * (1.0 - self.mix as Sample) + wet * self.mix as Sample
    }
}

impl ProcessorConfig for Compressor {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.envelope.sample_rate = sample_rate;
    }
}

/// Look-ahead peak limiter (spec §4.13).
pub struct Limiter {
    delay_buffer: Vec<Sample>,
    scan_buffer: Vec<f64>,
    pos: usize,
    lookahead_samples: usize,
    threshold: f64,
    ceiling: f64,
    release_coeff: f64,
    gain: f64,
    sample_rate: f64,
}

impl Limiter {
    pub fn new(sample_rate: f64, lookahead_ms: f64) -> Self {
        let lookahead_samples = ((lookahead_ms * 0.001 * sample_rate) as usize).max(1);
        let mut limiter = Self {
            delay_buffer: vec![0.0; lookahead_samples],
            scan_buffer: vec![0.0; lookahead_samples],
            pos: 0,
            lookahead_samples,
            threshold: db_to_linear(-1.0),
            ceiling: db_to_linear(-0.3),
            release_coeff: 0.0,
            gain: 1.0,
            sample_rate,
        };
        limiter.set_release_ms(50.0);
        limiter
    }

    pub fn set_threshold_db(&mut self, db: f64) {
        self.threshold = db_to_linear(db);
    }

    pub fn set_ceiling_db(&mut self, db: f64) {
        self.ceiling = db_to_linear(db);
    }

    pub fn set_release_ms(&mut self, ms: f64) {
        self.release_coeff = 1.0 - (-1.0 / (ms.max(0.01) * 0.001 * self.sample_rate)).exp();
    }

    pub fn gain_reduction_db(&self) -> f64 {
        -linear_to_db(self.gain.max(TINY))
    }

    pub fn is_limiting(&self) -> bool {
        self.gain < 1.0 - 1e-4
    }

    #[inline]
    fn peak_of_window(&self) -> f64 {
        self.scan_buffer.iter().copied().fold(0.0, f64::max)
    }
}

impl Processor for Limiter {
    fn reset(&mut self) {
        self.delay_buffer.fill(0.0);
        self.scan_buffer.fill(0.0);
        self.pos = 0;
        self.gain = 1.0;
    }
}

impl MonoProcessor for Limiter {
    fn process_sample(&mut self, input: Sample) -> Sample {
        let delayed = self.delay_buffer[self.pos];
        self.delay_buffer[self.pos] = input;
        self.scan_buffer[self.pos] = input.abs() as f64;
        self.pos = (self.pos + 1) % self.lookahead_samples;

        let peak = self.peak_of_window();
        let target_gain = if peak > self.threshold {
            (self.ceiling / peak).min(1.0)
        } else {
            1.0
        };

        if target_gain < self.gain {
            self.gain = target_gain;
        } else {
            self.gain += self.release_coeff * (target_gain - self.gain);
        }

        (delayed as f64 * self.gain).clamp(-self.ceiling, self.ceiling) as Sample
    }
}

impl ProcessorConfig for Limiter {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        let ratio = sample_rate / self.sample_rate;
        self.sample_rate = sample_rate;
        self.lookahead_samples = ((self.lookahead_samples as f64 * ratio) as usize).max(1);
        self.delay_buffer = vec![0.0; self.lookahead_samples];
        self.scan_buffer = vec![0.0; self.lookahead_samples];
        self.pos = 0;
    }
}

/// RMS-tracking automatic gain control with startup protection — the
/// authoritative DynamicAmp variant per spec §9 (supersedes earlier
/// near-duplicate designs without startup handling).
pub struct DynamicAmp {
    sample_rate: f64,
    block_len: usize,
    block_pos: usize,
    block_sum_sq: f64,
    history: Vec<f64>,
    history_pos: usize,
    history_filled: usize,
    target_rms_db: f64,
    gate_db: f64,
    max_gain_db: f64,
    time_const_s: f64,
    gain: f64,
    samples_processed: u64,
    startup_samples: u64,
}

impl DynamicAmp {
    pub fn new(sample_rate: f64) -> Self {
        let block_len = 256;
        let history_len = 16;
        Self {
            sample_rate,
            block_len,
            block_pos: 0,
            block_sum_sq: 0.0,
            history: vec![0.0; history_len],
            history_pos: 0,
            history_filled: 0,
            target_rms_db: -18.0,
            gate_db: -50.0,
            max_gain_db: 18.0,
            time_const_s: 0.3,
            gain: 1.0,
            samples_processed: 0,
            startup_samples: (0.1 * sample_rate) as u64,
        }
    }

    pub fn set_target_rms_db(&mut self, db: f64) {
        self.target_rms_db = db;
    }

    pub fn set_gate_db(&mut self, db: f64) {
        self.gate_db = db;
    }

    pub fn set_max_gain_db(&mut self, db: f64) {
        self.max_gain_db = db.max(0.0);
    }

    pub fn set_time_constant_s(&mut self, seconds: f64) {
        self.time_const_s = seconds.max(0.001);
    }

    fn window_rms_db(&self) -> f64 {
        let n = self.history_filled.max(1);
        let mean_sq: f64 = self.history.iter().take(self.history_filled.max(1)).sum::<f64>() / n as f64;
        10.0 * (mean_sq.max(TINY)).log10()
    }

    fn in_startup(&self) -> bool {
        self.samples_processed < self.startup_samples
    }
}

impl Processor for DynamicAmp {
    fn reset(&mut self) {
        self.block_pos = 0;
        self.block_sum_sq = 0.0;
        self.history.fill(0.0);
        self.history_pos = 0;
        self.history_filled = 0;
        self.gain = 1.0;
        self.samples_processed = 0;
    }
}

impl MonoProcessor for DynamicAmp {
    fn process_sample(&mut self, input: Sample) -> Sample {
        self.block_sum_sq += (input as f64) * (input as f64);
        self.block_pos += 1;

        if self.block_pos >= self.block_len {
            let mean_sq = self.block_sum_sq / self.block_len as f64;
            self.history[self.history_pos] = mean_sq;
            self.history_pos = (self.history_pos + 1) % self.history.len();
            self.history_filled = (self.history_filled + 1).min(self.history.len());
            self.block_sum_sq = 0.0;
            self.block_pos = 0;

            let rms_db = self.window_rms_db();
            if rms_db >= self.gate_db {
                let mut target_gain_db = (self.target_rms_db - rms_db)
                    .clamp(-self.max_gain_db, self.max_gain_db);

                let time_const = if self.in_startup() {
                    if target_gain_db > 0.0 {
                        target_gain_db = target_gain_db.min(linear_to_db(0.7 / db_to_linear(rms_db).max(TINY)));
                    }
                    self.time_const_s * 4.0
                } else {
                    self.time_const_s
                };

                let target_gain = db_to_linear(target_gain_db);
                let alpha = (-(self.block_len as f64) / (time_const * self.sample_rate)).exp();
                self.gain = self.gain * alpha + target_gain * (1.0 - alpha);
            }
        }

        self.samples_processed += 1;
        let mut y = input * self.gain as Sample;
        if self.in_startup() {
            y = y.clamp(-0.7, 0.7);
        }
        y
    }
}

impl ProcessorConfig for DynamicAmp {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.startup_samples = (0.1 * sample_rate) as u64;
        self.sample_rate = sample_rate;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoGainPersonality {
    Music,
    Voice,
    Broadcast,
    Live,
}

struct AutoGainSettings {
    attack_ms: f64,
    release_ms: f64,
    target_peak_db: f64,
    max_gain_db: f64,
}

impl AutoGainPersonality {
    fn settings(self) -> AutoGainSettings {
        match self {
            AutoGainPersonality::Music => AutoGainSettings {
                attack_ms: 30.0,
                release_ms: 400.0,
                target_peak_db: -3.0,
                max_gain_db: 12.0,
            },
            AutoGainPersonality::Voice => AutoGainSettings {
                attack_ms: 10.0,
                release_ms: 200.0,
                target_peak_db: -6.0,
                max_gain_db: 18.0,
            },
            AutoGainPersonality::Broadcast => AutoGainSettings {
                attack_ms: 5.0,
                release_ms: 150.0,
                target_peak_db: -9.0,
                max_gain_db: 20.0,
            },
            AutoGainPersonality::Live => AutoGainSettings {
                attack_ms: 2.0,
                release_ms: 80.0,
                target_peak_db: -4.0,
                max_gain_db: 10.0,
            },
        }
    }
}

/// Simpler peak-follower AGC variant (spec §4.13).
pub struct AutoGain {
    envelope: EnvelopeFollower,
    target_peak: f64,
    max_gain: f64,
    gain: f64,
}

impl AutoGain {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            envelope: EnvelopeFollower::new(sample_rate),
            target_peak: db_to_linear(-3.0),
            max_gain: db_to_linear(12.0),
            gain: 1.0,
        }
    }

    pub fn from_personality(sample_rate: f64, personality: AutoGainPersonality) -> Self {
        let s = personality.settings();
        let mut a = Self::new(sample_rate);
        a.envelope.set_times(s.attack_ms, s.release_ms);
        a.target_peak = db_to_linear(s.target_peak_db);
        a.max_gain = db_to_linear(s.max_gain_db);
        a
    }
}

impl Processor for AutoGain {
    fn reset(&mut self) {
        self.envelope.reset();
        self.gain = 1.0;
    }
}

impl MonoProcessor for AutoGain {
    fn process_sample(&mut self, input: Sample) -> Sample {
        let env = self.envelope.process(input).max(TINY);
        let target = (self.target_peak / env).min(self.max_gain);
        self.gain = target;
        input * self.gain as Sample
    }
}

impl ProcessorConfig for AutoGain {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.envelope.sample_rate = sample_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressor_unity_at_ratio_one() {
        let mut c = Compressor::new(44100.0);
        c.set_ratio(1.0);
        c.set_makeup(0.0);
        c.set_threshold(-18.0);
        for _ in 0..1000 {
            let y = c.process_sample(0.5);
            assert!((y - 0.5).abs() < 1e-6, "y={y}");
        }
    }

    #[test]
    fn limiter_never_exceeds_ceiling() {
        let mut lim = Limiter::new(44100.0, 5.0);
        lim.set_ceiling_db(-0.3);
        let ceiling = db_to_linear(-0.3) as Sample;
        for i in 0..4000 {
            let x = if i % 50 == 0 { 1.5 } else { 0.1 };
            let y = lim.process_sample(x);
            assert!(y.abs() <= ceiling + 1e-4, "y={y} ceiling={ceiling}");
        }
    }

    #[test]
    fn reset_is_idempotent_for_compressor() {
        let mut c = Compressor::new(44100.0);
        c.reset();
        let y1 = c.process_sample(0.3);
        c.reset();
        let y2 = c.process_sample(0.3);
        assert_eq!(y1, y2);
    }

    /// S6: 1 s of 0 dBFS sine through threshold=-6dB, ratio=4:1, makeup=0dB,
    /// attack=10ms, release=100ms settles to a steady-state peak between
    /// -4.7 and -4.3 dB (spec §8 scenario S6).
    #[test]
    fn sine_at_zero_dbfs_settles_per_scenario_s6() {
        let sample_rate = 44100.0;
        let mut c = Compressor::new(sample_rate);
        c.set_threshold(-6.0);
        c.set_ratio(4.0);
        c.set_knee(0.0);
        c.set_makeup(0.0);
        c.set_times(10.0, 100.0);

        let freq = 440.0;
        let n = sample_rate as usize;
        let mut steady_peak = 0.0f64;
        for i in 0..n {
            let x = (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate).sin() as Sample;
            let y = c.process_sample(x);
            if i > n - sample_rate as usize / 10 {
                steady_peak = steady_peak.max(y.abs() as f64);
            }
        }

        let peak_db = linear_to_db(steady_peak);
        assert!(
            (-4.7..=-4.3).contains(&peak_db),
            "steady-state peak {peak_db} dB outside [-4.7, -4.3]"
        );
    }
}
