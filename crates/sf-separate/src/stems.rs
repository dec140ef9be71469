//! Stem types and output collection (spec §3 supplement: remix/karaoke/
//! acapella derived mixes), grounded near-verbatim on the teacher's stem
//! collection API shape.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StemType {
    Drums,
    Bass,
    Vocals,
    Other,
}

impl StemType {
    pub fn display_name(&self) -> &'static str {
        match self {
            StemType::Drums => "Drums",
            StemType::Bass => "Bass",
            StemType::Vocals => "Vocals",
            StemType::Other => "Other",
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            StemType::Drums => "drums",
            StemType::Bass => "bass",
            StemType::Vocals => "vocals",
            StemType::Other => "other",
        }
    }

    /// Fixed stem order produced by the hybrid separator (spec §4.5).
    pub fn fixed_order() -> [StemType; 4] {
        [StemType::Drums, StemType::Bass, StemType::Other, StemType::Vocals]
    }
}

/// A single separated stem: planar per-channel float32 audio.
#[derive(Debug, Clone)]
pub struct StemOutput {
    pub stem_type: StemType,
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl StemOutput {
    pub fn new(stem_type: StemType, channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            stem_type,
            channels,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|ch| ch.iter())
            .map(|s| s.abs())
            .fold(0.0f32, f32::max)
    }

    pub fn rms(&self) -> f32 {
        let total: usize = self.channels.iter().map(Vec::len).sum();
        if total == 0 {
            return 0.0;
        }
        let sum_sq: f32 = self.channels.iter().flat_map(|ch| ch.iter()).map(|s| s * s).sum();
        (sum_sq / total as f32).sqrt()
    }
}

/// Separation statistics, reported alongside the stem collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeparationStats {
    pub total_time_ms: u64,
    pub segments_processed: usize,
    pub gpu_utilized: bool,
    pub rtf: f32,
}

/// Collection of separated stems with remix/karaoke/acapella derived mixes.
#[derive(Debug, Clone)]
pub struct StemCollection {
    stems: HashMap<StemType, StemOutput>,
    pub sample_rate: u32,
    pub model_name: String,
    pub stats: SeparationStats,
}

impl StemCollection {
    pub fn new(sample_rate: u32, model_name: String) -> Self {
        Self {
            stems: HashMap::new(),
            sample_rate,
            model_name,
            stats: SeparationStats::default(),
        }
    }

    pub fn add(&mut self, stem: StemOutput) {
        self.stems.insert(stem.stem_type, stem);
    }

    pub fn get(&self, stem_type: StemType) -> Option<&StemOutput> {
        self.stems.get(&stem_type)
    }

    pub fn stem_types(&self) -> Vec<StemType> {
        self.stems.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    /// Per-channel weighted sum of all stems in this collection.
    pub fn remix(&self, gains: &HashMap<StemType, f32>) -> Vec<Vec<f32>> {
        let reference = match self.stems.values().next() {
            Some(stem) => stem,
            None => return Vec::new(),
        };

        let num_channels = reference.channels.len();
        let len = reference.len();
        let mut output = vec![vec![0.0f32; len]; num_channels];

        for (stem_type, stem) in &self.stems {
            let gain = gains.get(stem_type).copied().unwrap_or(1.0);
            for (ch, samples) in stem.channels.iter().enumerate() {
                for (i, &s) in samples.iter().enumerate() {
                    if i < output[ch].len() {
                        output[ch][i] += s * gain;
                    }
                }
            }
        }

        output
    }

    /// Everything except vocals.
    pub fn karaoke(&self) -> Vec<Vec<f32>> {
        let gains = self
            .stems
            .keys()
            .map(|&t| (t, if t == StemType::Vocals { 0.0 } else { 1.0 }))
            .collect();
        self.remix(&gains)
    }

    pub fn instrumental(&self) -> Vec<Vec<f32>> {
        self.karaoke()
    }

    /// Vocals only.
    pub fn acapella(&self) -> Vec<Vec<f32>> {
        let gains = self
            .stems
            .keys()
            .map(|&t| (t, if t == StemType::Vocals { 1.0 } else { 0.0 }))
            .collect();
        self.remix(&gains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remix_applies_per_stem_gain() {
        let mut collection = StemCollection::new(44100, "test".into());
        collection.add(StemOutput::new(StemType::Vocals, vec![vec![1.0; 4]], 44100));
        collection.add(StemOutput::new(StemType::Drums, vec![vec![0.5; 4]], 44100));

        let mut gains = HashMap::new();
        gains.insert(StemType::Vocals, 0.5);
        gains.insert(StemType::Drums, 1.0);

        let remixed = collection.remix(&gains);
        assert_eq!(remixed[0].len(), 4);
        assert!((remixed[0][0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn karaoke_zeroes_vocals() {
        let mut collection = StemCollection::new(44100, "test".into());
        collection.add(StemOutput::new(StemType::Vocals, vec![vec![1.0; 4]], 44100));
        collection.add(StemOutput::new(StemType::Drums, vec![vec![0.5; 4]], 44100));

        let mix = collection.karaoke();
        assert!((mix[0][0] - 0.5).abs() < 1e-6);
    }
}
