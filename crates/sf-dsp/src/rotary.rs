//! Rotary speaker simulation (spec §4.12): a crossover splits the signal
//! into a highpass "horn" band and a lowpass "rotor" band, each modulated
//! by its own LFO for pitch (delay) and amplitude.

use std::f64::consts::PI;

use sf_core::Sample;

use crate::{MonoProcessor, Processor, ProcessorConfig};

const CROSSOVER_HZ: f64 = 800.0;
const HORN_SLOW_HZ: f64 = 2.0;
const HORN_FAST_HZ: f64 = 7.0;
const ROTOR_SLOW_HZ: f64 = 0.7;
const ROTOR_FAST_HZ: f64 = 3.5;

struct ModulatedBand {
    buffer: Vec<Sample>,
    write_pos: usize,
    phase: f64,
    amp_depth: f64,
}

impl ModulatedBand {
    fn new(max_delay_samples: usize, amp_depth: f64) -> Self {
        Self {
            buffer: vec![0.0; max_delay_samples.max(4)],
            write_pos: 0,
            phase: 0.0,
            amp_depth,
        }
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.phase = 0.0;
    }

    #[inline]
    fn process(&mut self, input: Sample, lfo_rate_hz: f64, sample_rate: f64, intensity: f64) -> Sample {
        let lfo = self.phase.sin();
        let base_delay = self.buffer.len() as f64 * 0.4;
        let delay_samples = (base_delay + base_delay * 0.5 * lfo).clamp(1.0, self.buffer.len() as f64 - 1.0);

        let len = self.buffer.len() as f64;
        let read_pos = (self.write_pos as f64 - delay_samples).rem_euclid(len);
        let i0 = read_pos.floor() as usize % self.buffer.len();
        let i1 = (i0 + 1) % self.buffer.len();
        let frac = read_pos.fract() as Sample;
        let delayed = self.buffer[i0] * (1.0 - frac) + self.buffer[i1] * frac;

        self.buffer[self.write_pos] = input;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();

        self.phase += 2.0 * PI * lfo_rate_hz / sample_rate;
        if self.phase > 2.0 * PI {
            self.phase -= 2.0 * PI;
        }

        let amp = 1.0 + self.amp_depth * intensity * lfo;
        delayed * amp as Sample
    }
}

/// One-pole crossover state.
struct OnePole {
    y: f64,
    coeff: f64,
}

impl OnePole {
    fn new(cutoff_hz: f64, sample_rate: f64) -> Self {
        let coeff = (-2.0 * PI * cutoff_hz / sample_rate).exp();
        Self { y: 0.0, coeff }
    }

    #[inline]
    fn lowpass(&mut self, x: f64) -> f64 {
        self.y = x + self.coeff * (self.y - x);
        self.y
    }

    fn reset(&mut self) {
        self.y = 0.0;
    }
}

pub struct Rotary {
    crossover: OnePole,
    horn: ModulatedBand,
    rotor: ModulatedBand,
    fast: bool,
    intensity: f64,
    sample_rate: f64,
}

impl Rotary {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            crossover: OnePole::new(CROSSOVER_HZ, sample_rate),
            horn: ModulatedBand::new(((3.0 * 0.001 * sample_rate) as usize).max(8), 0.2),
            rotor: ModulatedBand::new(((6.0 * 0.001 * sample_rate) as usize).max(8), 0.1),
            fast: false,
            intensity: 0.7,
            sample_rate,
        }
    }

    pub fn set_fast(&mut self, fast: bool) {
        self.fast = fast;
    }

    pub fn set_intensity(&mut self, intensity: f64) {
        self.intensity = intensity.clamp(0.0, 1.0);
    }

    fn horn_rate_hz(&self) -> f64 {
        let base = HORN_SLOW_HZ + (HORN_FAST_HZ - HORN_SLOW_HZ) * self.intensity;
        if self.fast {
            base * 3.0
        } else {
            base
        }
    }

    fn rotor_rate_hz(&self) -> f64 {
        let base = ROTOR_SLOW_HZ + (ROTOR_FAST_HZ - ROTOR_SLOW_HZ) * self.intensity;
        if self.fast {
            base * 2.0
        } else {
            base
        }
    }
}

impl Processor for Rotary {
    fn reset(&mut self) {
        self.crossover.reset();
        self.horn.reset();
        self.rotor.reset();
    }
}

impl MonoProcessor for Rotary {
    fn process_sample(&mut self, input: Sample) -> Sample {
        let low = self.crossover.lowpass(input as f64) as Sample;
        let high = input - low;

        let horn_rate = self.horn_rate_hz();
        let rotor_rate = self.rotor_rate_hz();

        let horn_out = self.horn.process(high, horn_rate, self.sample_rate, self.intensity);
        let rotor_out = self.rotor.process(low, rotor_rate, self.sample_rate, self.intensity);

        horn_out + rotor_out
    }
}

impl ProcessorConfig for Rotary {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.crossover = OnePole::new(CROSSOVER_HZ, sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_is_idempotent() {
        let mut r = Rotary::new(44100.0);
        r.set_fast(true);
        let mut y1 = Vec::new();
        for i in 0..1000 {
            y1.push(r.process_sample((i as Sample * 0.02).sin()));
        }
        r.reset();
        let mut y2 = Vec::new();
        for i in 0..1000 {
            y2.push(r.process_sample((i as Sample * 0.02).sin()));
        }
        assert_eq!(y1, y2);
    }
}
