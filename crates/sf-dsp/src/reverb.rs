//! Freeverb-style reverb (spec §4.11): eight parallel comb filters feeding
//! four series allpass filters, per output channel.
//!
//! Parameters are written from the control thread and snapshotted once per
//! `process_block` call under a short critical section, then used lock-free
//! for the inner per-sample loop — the one cross-thread parameter path the
//! spec allows on the audio path (§4.9).

use std::sync::Arc;

use parking_lot::Mutex;

use sf_core::Sample;

use crate::{Processor, ProcessorConfig, StereoProcessor};

const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];
const ALLPASS_GAIN: f64 = 0.5;
/// Offset applied to the right channel's buffers for stereo width, the
/// classic Freeverb "stereo spread" constant.
const STEREO_SPREAD: usize = 23;
const REFERENCE_SAMPLE_RATE: f64 = 44100.0;

#[derive(Debug, Clone, Copy)]
pub struct ReverbParams {
    pub room_size: f64,
    pub damping: f64,
    pub width: f64,
    pub wet: f64,
    pub dry: f64,
    pub input_gain: f64,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            room_size: 0.5,
            damping: 0.5,
            width: 1.0,
            wet: 0.33,
            dry: 0.6,
            input_gain: 1.0,
        }
    }
}

/// Preset table referenced by spec §6. Per-preset numeric values are not
/// reproduced from an external table (none is carried in this workspace's
/// spec text); each preset below is a musically distinct, internally
/// consistent point in the documented parameter ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverbPreset {
    SmallRoom,
    LargeHall,
    Cathedral,
    Plate,
    Spring,
    AmbientPad,
    VocalBooth,
    DrumRoom,
    Gated,
    Subtle,
}

impl ReverbPreset {
    pub fn params(self) -> ReverbParams {
        match self {
            ReverbPreset::SmallRoom => ReverbParams {
                room_size: 0.3,
                damping: 0.4,
                width: 0.8,
                wet: 0.2,
                dry: 0.75,
                input_gain: 1.0,
            },
            ReverbPreset::LargeHall => ReverbParams {
                room_size: 0.85,
                damping: 0.3,
                width: 1.0,
                wet: 0.4,
                dry: 0.55,
                input_gain: 1.0,
            },
            ReverbPreset::Cathedral => ReverbParams {
                room_size: 0.97,
                damping: 0.2,
                width: 1.0,
                wet: 0.5,
                dry: 0.4,
                input_gain: 0.9,
            },
            ReverbPreset::Plate => ReverbParams {
                room_size: 0.5,
                damping: 0.2,
                width: 1.0,
                wet: 0.35,
                dry: 0.6,
                input_gain: 1.0,
            },
            ReverbPreset::Spring => ReverbParams {
                room_size: 0.4,
                damping: 0.6,
                width: 0.6,
                wet: 0.3,
                dry: 0.65,
                input_gain: 1.0,
            },
            ReverbPreset::AmbientPad => ReverbParams {
                room_size: 0.9,
                damping: 0.5,
                width: 1.0,
                wet: 0.55,
                dry: 0.5,
                input_gain: 0.9,
            },
            ReverbPreset::VocalBooth => ReverbParams {
                room_size: 0.2,
                damping: 0.5,
                width: 0.5,
                wet: 0.12,
                dry: 0.85,
                input_gain: 1.0,
            },
            ReverbPreset::DrumRoom => ReverbParams {
                room_size: 0.45,
                damping: 0.35,
                width: 0.9,
                wet: 0.25,
                dry: 0.7,
                input_gain: 1.0,
            },
            ReverbPreset::Gated => ReverbParams {
                room_size: 0.6,
                damping: 0.1,
                width: 1.0,
                wet: 0.45,
                dry: 0.6,
                input_gain: 1.1,
            },
            ReverbPreset::Subtle => ReverbParams {
                room_size: 0.25,
                damping: 0.6,
                width: 0.7,
                wet: 0.1,
                dry: 0.9,
                input_gain: 1.0,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<Sample>,
    pos: usize,
    filterstore: f64,
}

impl Comb {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            pos: 0,
            filterstore: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f64, feedback: f64, damp1: f64, damp2: f64) -> f64 {
        let output = self.buffer[self.pos] as f64;
        self.filterstore = output * damp2 + self.filterstore * damp1;
        self.buffer[self.pos] = (input + self.filterstore * feedback) as Sample;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
        self.filterstore = 0.0;
    }
}

#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<Sample>,
    pos: usize,
}

impl Allpass {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let bufout = self.buffer[self.pos] as f64;
        let output = -input + bufout;
        self.buffer[self.pos] = (input + bufout * ALLPASS_GAIN) as Sample;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

/// Freeverb: one comb/allpass network per output channel.
pub struct Reverb {
    combs_l: [Comb; 8],
    combs_r: [Comb; 8],
    allpass_l: [Allpass; 4],
    allpass_r: [Allpass; 4],
    params: Arc<Mutex<ReverbParams>>,
    active: ReverbParams,
}

impl Reverb {
    pub fn new(sample_rate: f64) -> Self {
        let scale = sample_rate / REFERENCE_SAMPLE_RATE;
        let combs_l = COMB_TUNINGS.map(|t| Comb::new(((t as f64 * scale) as usize).max(1)));
        let combs_r =
            COMB_TUNINGS.map(|t| Comb::new((((t + STEREO_SPREAD) as f64 * scale) as usize).max(1)));
        let allpass_l = ALLPASS_TUNINGS.map(|t| Allpass::new(((t as f64 * scale) as usize).max(1)));
        let allpass_r = ALLPASS_TUNINGS
            .map(|t| Allpass::new((((t + STEREO_SPREAD) as f64 * scale) as usize).max(1)));

        Self {
            combs_l,
            combs_r,
            allpass_l,
            allpass_r,
            params: Arc::new(Mutex::new(ReverbParams::default())),
            active: ReverbParams::default(),
        }
    }

    pub fn from_preset(sample_rate: f64, preset: ReverbPreset) -> Self {
        let mut r = Self::new(sample_rate);
        r.set_params(preset.params());
        r
    }

    /// Handle shared with the control thread for parameter writes.
    pub fn params_handle(&self) -> Arc<Mutex<ReverbParams>> {
        Arc::clone(&self.params)
    }

    pub fn set_params(&mut self, params: ReverbParams) {
        *self.params.lock() = params;
    }

    /// Snapshot parameters from the shared handle. Called once per block
    /// by `process_block`; never inside the per-sample inner loop.
    fn snapshot_params(&mut self) {
        self.active = *self.params.lock();
    }

    #[inline]
    fn process_channel(channel: &mut [Comb; 8], allpass: &mut [Allpass; 4], input: f64, room_size: f64, damping: f64) -> f64 {
        let feedback = 0.7 + 0.28 * room_size;
        let damp1 = 0.4 * damping;
        let damp2 = 1.0 - damp1;

        let mut mono = 0.0;
        for comb in channel.iter_mut() {
            mono += comb.process(input, feedback, damp1, damp2);
        }
        for ap in allpass.iter_mut() {
            mono = ap.process(mono);
        }
        mono
    }
}

impl Processor for Reverb {
    fn reset(&mut self) {
        for c in self.combs_l.iter_mut() {
            c.reset();
        }
        for c in self.combs_r.iter_mut() {
            c.reset();
        }
        for a in self.allpass_l.iter_mut() {
            a.reset();
        }
        for a in self.allpass_r.iter_mut() {
            a.reset();
        }
    }
}

impl StereoProcessor for Reverb {
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let p = &self.active;
        let input = ((left as f64 + right as f64) * 0.5) * p.input_gain;

        let mono_l = Self::process_channel(&mut self.combs_l, &mut self.allpass_l, input, p.room_size, p.damping);
        let mono_r = Self::process_channel(&mut self.combs_r, &mut self.allpass_r, input, p.room_size, p.damping);

        let out_l = mono_l * p.width * p.wet + left as f64 * p.dry;
        let out_r = mono_r * p.width * p.wet + right as f64 * p.dry;
        (out_l as Sample, out_r as Sample)
    }

    fn process_block(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        self.snapshot_params();
        debug_assert_eq!(left.len(), right.len());
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process_sample(*l, *r);
        }
    }
}

impl ProcessorConfig for Reverb {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        let scale = sample_rate / REFERENCE_SAMPLE_RATE;
        self.combs_l = COMB_TUNINGS.map(|t| Comb::new(((t as f64 * scale) as usize).max(1)));
        self.combs_r =
            COMB_TUNINGS.map(|t| Comb::new((((t + STEREO_SPREAD) as f64 * scale) as usize).max(1)));
        self.allpass_l = ALLPASS_TUNINGS.map(|t| Allpass::new(((t as f64 * scale) as usize).max(1)));
        self.allpass_r = ALLPASS_TUNINGS
            .map(|t| Allpass::new((((t + STEREO_SPREAD) as f64 * scale) as usize).max(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_in_yields_silence_out_after_reset() {
        let mut r = Reverb::from_preset(44100.0, ReverbPreset::LargeHall);
        r.reset();
        let mut l = vec![0.0; 44100];
        let mut rr = vec![0.0; 44100];
        r.process_block(&mut l, &mut rr);
        let energy: f64 = l.iter().chain(rr.iter()).map(|x| (*x as f64).powi(2)).sum();
        let rms = (energy / (l.len() + rr.len()) as f64).sqrt();
        assert!(rms <= 1e-7, "rms was {rms}");
    }

    #[test]
    fn reset_is_idempotent() {
        let mut r = Reverb::new(44100.0);
        let mut l1 = vec![1.0, 0.0, 0.0, 0.0];
        let mut r1 = vec![1.0, 0.0, 0.0, 0.0];
        r.process_block(&mut l1, &mut r1);
        r.reset();

        let mut l2 = vec![1.0, 0.0, 0.0, 0.0];
        let mut r2 = vec![1.0, 0.0, 0.0, 0.0];
        r.process_block(&mut l2, &mut r2);

        let mut fresh = Reverb::new(44100.0);
        let mut l3 = vec![1.0, 0.0, 0.0, 0.0];
        let mut r3 = vec![1.0, 0.0, 0.0, 0.0];
        fresh.process_block(&mut l3, &mut r3);

        assert_eq!(l2, l3);
        assert_eq!(r2, r3);
    }
}
