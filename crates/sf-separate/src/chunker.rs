//! Chunking & windowing policies (spec §4.6), grounded on the overlap/
//! fade segmenting logic in the teacher's separation pipeline.
//!
//! Two policies coexist: margin-residual (used by the single/multi
//! separators, §4.3/§4.4) and reflection-padded-with-crossfade (used by
//! the hybrid separator, §4.5).

use std::f64::consts::FRAC_PI_2;

use sf_core::Sample;
use sf_stft::reflect_index;

use crate::error::{SeparationError, SeparationResult};

/// Bounds for one margin-residual segment: an extended window fed to the
/// model, and the `[left_trim, left_trim + valid_len)` slice of its
/// output that is the segment's actual contribution to the stream.
#[derive(Debug, Clone, Copy)]
pub struct MarginSegment {
    pub source_start: usize,
    pub source_len: usize,
    pub left_trim: usize,
    pub right_trim: usize,
    pub valid_len: usize,
}

/// Per-chunk left/right trim of `margin` samples, no crossfade; the first
/// chunk keeps its left edge untrimmed, the last keeps its right edge
/// untrimmed (spec §4.6).
pub struct MarginResidualChunker {
    valid_size: usize,
    margin: usize,
}

impl MarginResidualChunker {
    pub fn new(valid_size: usize, margin: usize) -> SeparationResult<Self> {
        if margin == 0 {
            return Err(SeparationError::InvalidChunkConfig {
                reason: "margin must be nonzero".into(),
            });
        }
        let margin = margin.min(valid_size);
        Ok(Self { valid_size, margin })
    }

    pub fn segment_count(&self, total_len: usize) -> usize {
        if total_len == 0 {
            return 0;
        }
        total_len.div_ceil(self.valid_size)
    }

    pub fn segment(&self, index: usize, total_len: usize) -> MarginSegment {
        let total_segments = self.segment_count(total_len);
        let valid_start = index * self.valid_size;
        let valid_len = self.valid_size.min(total_len - valid_start);
        let is_first = index == 0;
        let is_last = index + 1 == total_segments;

        let left_trim = if is_first { 0 } else { self.margin };
        let right_trim = if is_last { 0 } else { self.margin };

        let source_start = valid_start - left_trim;
        let source_end = (valid_start + valid_len + right_trim).min(total_len);

        MarginSegment {
            source_start,
            source_len: source_end - source_start,
            left_trim,
            right_trim,
            valid_len,
        }
    }
}

/// Window size `valid + 2*margin` extracted from the in-memory stream
/// with reflection at both global boundaries (spec §4.6).
pub struct ReflectionCrossfadeChunker {
    valid: usize,
    margin: usize,
    crossfade: usize,
}

impl ReflectionCrossfadeChunker {
    pub fn new(valid: usize, margin: usize, crossfade: usize) -> SeparationResult<Self> {
        if crossfade > valid {
            return Err(SeparationError::InvalidChunkConfig {
                reason: format!("crossfade ({crossfade}) must not exceed valid ({valid})"),
            });
        }
        Ok(Self { valid, margin, crossfade })
    }

    pub fn window_len(&self) -> usize {
        self.valid + 2 * self.margin
    }

    pub fn valid(&self) -> usize {
        self.valid
    }

    pub fn margin(&self) -> usize {
        self.margin
    }

    pub fn crossfade(&self) -> usize {
        self.crossfade
    }

    /// `stride = valid - crossfade`; degenerates to `valid` when
    /// `crossfade == 0` (a butt join, per spec §9).
    pub fn stride(&self) -> usize {
        self.valid - self.crossfade
    }

    pub fn num_chunks(&self, total_len: usize) -> usize {
        if total_len == 0 {
            return 0;
        }
        total_len.div_ceil(self.stride())
    }

    /// Extract a reflection-padded window of [`Self::window_len`] samples
    /// centered on chunk `index`'s valid region.
    pub fn extract_window(&self, source: &[Sample], index: usize) -> Vec<Sample> {
        let center_start = index * self.stride();
        let window_start = center_start as isize - self.margin as isize;
        (0..self.window_len())
            .map(|j| source[reflect_index(window_start + j as isize, source.len())])
            .collect()
    }
}

/// Constant-power (cosine/sine) crossfade of `prev_tail` out and
/// `next_head` in, per spec §4.5. Fade coefficients are `cos²(θ)`/`sin²(θ)`
/// rather than raw `cos(θ)`/`sin(θ)`: the two always sum to 1, so two
/// chunks agreeing on a value hand off without a level bump (spec §8
/// invariant 4 / scenario S4).
pub fn constant_power_crossfade(prev_tail: &[Sample], next_head: &[Sample]) -> Vec<Sample> {
    let n = prev_tail.len().min(next_head.len());
    (0..n)
        .map(|i| {
            let t = (i as f64 + 0.5) / n as f64;
            let fade_out = (t * FRAC_PI_2).cos().powi(2);
            let fade_in = (t * FRAC_PI_2).sin().powi(2);
            (prev_tail[i] as f64 * fade_out + next_head[i] as f64 * fade_in) as Sample
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_segment_has_no_left_trim() {
        let chunker = MarginResidualChunker::new(1000, 100).unwrap();
        let seg = chunker.segment(0, 3500);
        assert_eq!(seg.left_trim, 0);
        assert_eq!(seg.source_start, 0);
    }

    #[test]
    fn last_segment_has_no_right_trim() {
        let chunker = MarginResidualChunker::new(1000, 100).unwrap();
        let count = chunker.segment_count(3500);
        let seg = chunker.segment(count - 1, 3500);
        assert_eq!(seg.right_trim, 0);
    }

    #[test]
    fn crossfade_preserves_energy_at_midpoint() {
        let prev = vec![1.0 as Sample; 100];
        let next = vec![1.0 as Sample; 100];
        let joined = constant_power_crossfade(&prev, &next);
        for y in joined {
            assert!((y - 1.0).abs() < 1e-3);
        }
    }

    /// S4: two adjacent chunks agreeing on a constant 0.5 value must hand
    /// off without drifting outside 0.5 ± 1e-4 anywhere in the crossfade
    /// (spec §8 scenario S4 / invariant 4).
    #[test]
    fn crossfade_of_agreeing_constant_chunks_stays_flat_per_scenario_s4() {
        let prev = vec![0.5 as Sample; 512];
        let next = vec![0.5 as Sample; 512];
        let joined = constant_power_crossfade(&prev, &next);
        for y in joined {
            assert!((y - 0.5).abs() < 1e-4, "expected 0.5, got {y}");
        }
    }

    #[test]
    fn zero_crossfade_is_degenerate_stride() {
        let chunker = ReflectionCrossfadeChunker::new(1000, 50, 0).unwrap();
        assert_eq!(chunker.stride(), 1000);
    }
}
