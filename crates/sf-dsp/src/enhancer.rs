//! Harmonic enhancer (spec §4.15): a highpass feeds a tanh saturator,
//! blended back in at a controllable amount.

use std::f64::consts::PI;

use sf_core::Sample;

use crate::{MonoProcessor, Processor, ProcessorConfig};

/// First-order RC-style highpass. State: previous input, previous output.
struct RcHighpass {
    cutoff_hz: f64,
    sample_rate: f64,
    coeff: f64,
    x_prev: f64,
    y_prev: f64,
}

impl RcHighpass {
    fn new(cutoff_hz: f64, sample_rate: f64) -> Self {
        let mut hp = Self {
            cutoff_hz,
            sample_rate,
            coeff: 0.0,
            x_prev: 0.0,
            y_prev: 0.0,
        };
        hp.recompute();
        hp
    }

    fn recompute(&mut self) {
        let dt = 1.0 / self.sample_rate;
        let rc = 1.0 / (2.0 * PI * self.cutoff_hz);
        self.coeff = rc / (rc + dt);
    }

    fn set_cutoff_hz(&mut self, hz: f64) {
        self.cutoff_hz = hz;
        self.recompute();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.recompute();
    }

    #[inline]
    fn process(&mut self, x: f64) -> f64 {
        let y = self.coeff * (self.y_prev + x - self.x_prev);
        self.x_prev = x;
        self.y_prev = y;
        y
    }

    fn reset(&mut self) {
        self.x_prev = 0.0;
        self.y_prev = 0.0;
    }
}

pub struct Enhancer {
    highpass: RcHighpass,
    drive: Sample,
    amount: Sample,
}

impl Enhancer {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            highpass: RcHighpass::new(3000.0, sample_rate),
            drive: 2.0,
            amount: 0.3,
        }
    }

    pub fn set_cutoff_hz(&mut self, hz: f64) {
        self.highpass.set_cutoff_hz(hz.clamp(500.0, 15_000.0));
    }

    pub fn set_drive(&mut self, drive: f64) {
        self.drive = drive.clamp(0.1, 10.0) as Sample;
    }

    pub fn set_amount(&mut self, amount: f64) {
        self.amount = amount.clamp(0.0, 1.0) as Sample;
    }
}

impl Processor for Enhancer {
    fn reset(&mut self) {
        self.highpass.reset();
    }
}

impl MonoProcessor for Enhancer {
    fn process_sample(&mut self, input: Sample) -> Sample {
        let high = self.highpass.process(input as f64) as Sample;
        let saturated = (high * self.drive).tanh();

        input + saturated * self.amount
    }
}

impl ProcessorConfig for Enhancer {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.highpass.set_sample_rate(sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_amount_is_transparent() {
        let mut e = Enhancer::new(44100.0);
        e.set_amount(0.0);
        for i in 0..1000 {
            let x = (i as Sample * 0.05).sin();
            let y = e.process_sample(x);
            assert!((y - x).abs() < 1e-6);
        }
    }

    #[test]
    fn reset_is_idempotent() {
        let mut e = Enhancer::new(44100.0);
        let mut y1 = Vec::new();
        for i in 0..500 {
            y1.push(e.process_sample((i as Sample * 0.05).sin()));
        }
        e.reset();
        let mut y2 = Vec::new();
        for i in 0..500 {
            y2.push(e.process_sample((i as Sample * 0.05).sin()));
        }
        assert_eq!(y1, y2);
    }
}
