//! 10-band parametric equalizer (spec §4.14): each band is two cascaded
//! peaking biquads, bypassed when its gain is effectively zero.

use sf_core::Sample;

use crate::biquad::BiquadTdf2;
use crate::{MonoProcessor, Processor, ProcessorConfig};

pub const NUM_BANDS: usize = 10;
const GAIN_EPSILON_DB: f64 = 0.01;

const MIN_FREQ_HZ: f64 = 20.0;
const MAX_FREQ_HZ: f64 = 20_000.0;
const MIN_Q: f64 = 0.1;
const MAX_Q: f64 = 10.0;
const MIN_GAIN_DB: f64 = -12.0;
const MAX_GAIN_DB: f64 = 12.0;

/// Default center frequencies for a 10-band graphic-style layout.
pub const DEFAULT_FREQS_HZ: [f64; NUM_BANDS] = [
    31.0, 62.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

#[derive(Debug, Clone, Copy)]
pub struct BandParams {
    pub freq_hz: f64,
    pub q: f64,
    pub gain_db: f64,
}

impl BandParams {
    fn clamp(&mut self) {
        self.freq_hz = self.freq_hz.clamp(MIN_FREQ_HZ, MAX_FREQ_HZ);
        self.q = self.q.clamp(MIN_Q, MAX_Q);
        self.gain_db = self.gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
    }

    fn is_bypassed(&self) -> bool {
        self.gain_db.abs() < GAIN_EPSILON_DB
    }
}

struct Band {
    params: BandParams,
    stage_a: BiquadTdf2,
    stage_b: BiquadTdf2,
}

impl Band {
    fn new(sample_rate: f64, freq_hz: f64) -> Self {
        let params = BandParams {
            freq_hz,
            q: 0.707,
            gain_db: 0.0,
        };
        let mut band = Self {
            params,
            stage_a: BiquadTdf2::new(sample_rate),
            stage_b: BiquadTdf2::new(sample_rate),
        };
        band.apply();
        band
    }

    fn set_params(&mut self, mut params: BandParams) {
        params.clamp();
        self.params = params;
        self.apply();
    }

    fn apply(&mut self) {
        self.stage_a
            .set_peaking(self.params.freq_hz, self.params.q, self.params.gain_db);
        self.stage_b
            .set_peaking(self.params.freq_hz, self.params.q, self.params.gain_db);
    }

    #[inline]
    fn process(&mut self, input: Sample) -> Sample {
        if self.params.is_bypassed() {
            return input;
        }
        let a = self.stage_a.process_sample(input);
        self.stage_b.process_sample(a)
    }

    fn reset(&mut self) {
        self.stage_a.reset();
        self.stage_b.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.stage_a.set_sample_rate(sample_rate);
        self.stage_b.set_sample_rate(sample_rate);
        self.apply();
    }
}

pub struct Equalizer {
    bands: Vec<Band>,
}

impl Equalizer {
    pub fn new(sample_rate: f64) -> Self {
        let bands = DEFAULT_FREQS_HZ
            .iter()
            .map(|&freq| Band::new(sample_rate, freq))
            .collect();
        Self { bands }
    }

    pub fn set_band(&mut self, index: usize, params: BandParams) {
        if let Some(band) = self.bands.get_mut(index) {
            band.set_params(params);
        }
    }

    pub fn band_params(&self, index: usize) -> Option<BandParams> {
        self.bands.get(index).map(|b| b.params)
    }
}

impl Processor for Equalizer {
    fn reset(&mut self) {
        for band in self.bands.iter_mut() {
            band.reset();
        }
    }
}

impl MonoProcessor for Equalizer {
    fn process_sample(&mut self, input: Sample) -> Sample {
        self.bands.iter_mut().fold(input, |x, band| band.process(x))
    }
}

impl ProcessorConfig for Equalizer {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        for band in self.bands.iter_mut() {
            band.set_sample_rate(sample_rate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_gain_bands_are_transparent() {
        let mut eq = Equalizer::new(44100.0);
        for i in 0..2000 {
            let x = (i as Sample * 0.01).sin();
            let y = eq.process_sample(x);
            assert!((y - x).abs() < 1e-5);
        }
    }

    #[test]
    fn boosted_band_changes_output() {
        let mut eq = Equalizer::new(44100.0);
        eq.set_band(
            5,
            BandParams {
                freq_hz: 1000.0,
                q: 1.0,
                gain_db: 6.0,
            },
        );
        let mut differed = false;
        for i in 0..2000 {
            let x = (i as Sample * 0.142).sin();
            let y = eq.process_sample(x);
            if (y - x).abs() > 1e-4 {
                differed = true;
            }
        }
        assert!(differed);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut eq = Equalizer::new(44100.0);
        eq.set_band(
            2,
            BandParams {
                freq_hz: 125.0,
                q: 1.4,
                gain_db: -8.0,
            },
        );
        let mut y1 = Vec::new();
        for i in 0..500 {
            y1.push(eq.process_sample((i as Sample * 0.03).sin()));
        }
        eq.reset();
        let mut y2 = Vec::new();
        for i in 0..500 {
            y2.push(eq.process_sample((i as Sample * 0.03).sin()));
        }
        assert_eq!(y1, y2);
    }
}
