//! Phaser (spec §4.12): 2–8 cascaded first-order allpass stages, center
//! frequency swept by a single LFO.

use std::f64::consts::PI;

use sf_core::Sample;

use crate::{MonoProcessor, Processor, ProcessorConfig};

const MIN_STAGES: usize = 2;
const MAX_STAGES: usize = 8;

#[derive(Default, Clone, Copy)]
struct AllpassStage {
    x1: f64,
    y1: f64,
}

impl AllpassStage {
    #[inline]
    fn process(&mut self, input: f64, a: f64) -> f64 {
        let output = a * input + self.x1 - a * self.y1;
        self.x1 = input;
        self.y1 = output;
        output
    }

    fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

pub struct Phaser {
    stages: Vec<AllpassStage>,
    phase: f64,
    lfo_rate_hz: f64,
    depth: f64,
    feedback: f64,
    mix: f64,
    sample_rate: f64,
}

impl Phaser {
    pub fn new(sample_rate: f64, num_stages: usize) -> Self {
        let num_stages = num_stages.clamp(MIN_STAGES, MAX_STAGES);
        Self {
            stages: vec![AllpassStage::default(); num_stages],
            phase: 0.0,
            lfo_rate_hz: 0.3,
            depth: 1.0,
            feedback: 0.3,
            mix: 0.5,
            sample_rate,
        }
    }

    pub fn set_rate_hz(&mut self, hz: f64) {
        self.lfo_rate_hz = hz.clamp(0.01, 10.0);
    }

    pub fn set_depth(&mut self, depth: f64) {
        self.depth = depth.clamp(0.0, 1.0);
    }

    pub fn set_feedback(&mut self, feedback: f64) {
        self.feedback = feedback.clamp(-0.95, 0.95);
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix.clamp(0.0, 1.0);
    }
}

impl Processor for Phaser {
    fn reset(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.reset();
        }
        self.phase = 0.0;
    }
}

impl MonoProcessor for Phaser {
    fn process_sample(&mut self, input: Sample) -> Sample {
        let lfo = self.phase.sin();
        let freq = 200.0 + 1800.0 * (0.5 + 0.5 * self.depth * lfo);
        let omega = 2.0 * PI * freq / self.sample_rate;
        let tan_half = (omega / 2.0).tan();
        let a = (tan_half - 1.0) / (tan_half + 1.0);

        let mut x = input as f64;
        for stage in self.stages.iter_mut() {
            x = stage.process(x, a);
        }

        let wet = x + input as f64 * self.feedback;

        self.phase += 2.0 * PI * self.lfo_rate_hz / self.sample_rate;
        if self.phase > 2.0 * PI {
            self.phase -= 2.0 * PI;
        }

        (input as f64 * (1.0 - self.mix) + wet * self.mix) as Sample
    }
}

impl ProcessorConfig for Phaser {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_is_idempotent() {
        let mut p = Phaser::new(44100.0, 4);
        let mut y1 = Vec::new();
        for i in 0..500 {
            y1.push(p.process_sample((i as Sample * 0.02).sin()));
        }
        p.reset();
        let mut y2 = Vec::new();
        for i in 0..500 {
            y2.push(p.process_sample((i as Sample * 0.02).sin()));
        }
        assert_eq!(y1, y2);
    }
}
