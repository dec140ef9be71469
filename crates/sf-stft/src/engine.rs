//! Per-chunk STFT/ISTFT, grounded on the windowed `realfft` analysis in
//! the separation model's internal transform and on the reflection
//! indexing used at stream-chunk boundaries.
//!
//! Hermitian symmetry (step 2 of ISTFT) is not imposed by hand: `realfft`'s
//! complex-to-real transform already assumes a Hermitian-symmetric input
//! spectrum and reconstructs the negative-frequency half internally, so
//! passing only bins `[0, n_bins)` is sufficient.

use std::f64::consts::PI;
use std::sync::Arc;

use ndarray::{Array3, ArrayView3};
use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use sf_core::{PlanarStereo, Sample};

/// Reflection formula shared by the STFT engine's own chunk padding and
/// the reflection-padded chunker: for source index `i`, `i < 0` reflects
/// to `-i`, `i >= n` reflects to `2n - i - 2`, both clamped into `[0, n)`.
pub fn reflect_index(i: isize, n: usize) -> usize {
    let n_signed = n as isize;
    let reflected = if i < 0 {
        -i
    } else if i >= n_signed {
        2 * n_signed - i - 2
    } else {
        i
    };
    reflected.clamp(0, n_signed - 1) as usize
}

/// Reflection-pad `x` by `pad` samples on each side using [`reflect_index`].
pub fn reflect_pad(x: &[Sample], pad: usize) -> Vec<Sample> {
    let n = x.len();
    (0..n + 2 * pad)
        .map(|j| x[reflect_index(j as isize - pad as isize, n)])
        .collect()
}

/// `w[i] = 0.5 * (1 - cos(2*pi*i/n_fft))`.
pub fn hann_window(n_fft: usize) -> Vec<f32> {
    (0..n_fft)
        .map(|i| (0.5 * (1.0 - (2.0 * PI * i as f64 / n_fft as f64).cos())) as f32)
        .collect()
}

/// Analysis/synthesis engine for a fixed `(n_fft, hop)` pair.
pub struct StftEngine {
    n_fft: usize,
    hop: usize,
    window: Vec<f32>,
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
}

impl StftEngine {
    pub fn new(n_fft: usize, hop: usize) -> Self {
        let mut planner = RealFftPlanner::new();
        Self {
            n_fft,
            hop,
            window: hann_window(n_fft),
            fft_forward: planner.plan_fft_forward(n_fft),
            fft_inverse: planner.plan_fft_inverse(n_fft),
        }
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of STFT frames a chunk of `chunk_size` samples yields once
    /// reflection-padded by `n_fft / 2` on each side.
    pub fn frame_count(&self, chunk_size: usize) -> usize {
        let padded_len = chunk_size + self.n_fft;
        (padded_len - self.n_fft) / self.hop + 1
    }

    /// Analyze one stereo chunk into tensor layout `[4][dim_f][dim_t]`
    /// (`{L_real, L_imag, R_real, R_imag}`), per spec §4.2.
    pub fn analyze(&self, chunk: &PlanarStereo, dim_f: usize) -> Array3<f32> {
        let pad = self.n_fft / 2;
        let padded_left = reflect_pad(chunk.left(), pad);
        let padded_right = reflect_pad(chunk.right(), pad);
        let dim_t = self.frame_count(chunk.len());

        let mut tensor = Array3::<f32>::zeros((4, dim_f, dim_t));
        self.analyze_channel(&padded_left, dim_f, dim_t, 0, 1, &mut tensor);
        self.analyze_channel(&padded_right, dim_f, dim_t, 2, 3, &mut tensor);
        tensor
    }

    fn analyze_channel(
        &self,
        padded: &[Sample],
        dim_f: usize,
        dim_t: usize,
        real_channel: usize,
        imag_channel: usize,
        tensor: &mut Array3<f32>,
    ) {
        let n_bins = self.n_bins();
        let bins = dim_f.min(n_bins);

        let mut input_buffer = vec![0f32; self.n_fft];
        let mut output_buffer = vec![Complex32::new(0.0, 0.0); n_bins];
        let mut scratch = vec![Complex32::new(0.0, 0.0); self.fft_forward.get_scratch_len()];

        for t in 0..dim_t {
            let start = t * self.hop;
            for i in 0..self.n_fft {
                input_buffer[i] = padded[start + i] * self.window[i];
            }

            self.fft_forward
                .process_with_scratch(&mut input_buffer, &mut output_buffer, &mut scratch)
                .expect("forward FFT plan mismatch");

            for f in 0..bins {
                tensor[[real_channel, f, t]] = output_buffer[f].re;
                tensor[[imag_channel, f, t]] = output_buffer[f].im;
            }
        }
    }

    /// Synthesize `[4][dim_f][dim_t]` back into a stereo chunk of
    /// `output_len` samples, per spec §4.2's ISTFT procedure.
    pub fn synthesize(&self, tensor: ArrayView3<f32>, output_len: usize) -> PlanarStereo {
        let dim_f = tensor.shape()[1];
        let dim_t = tensor.shape()[2];
        let pad = self.n_fft / 2;
        let padded_len = output_len + 2 * pad;

        let left = self.synthesize_channel(tensor.index_axis(ndarray::Axis(0), 0), tensor.index_axis(ndarray::Axis(0), 1), dim_f, dim_t, padded_len);
        let right = self.synthesize_channel(tensor.index_axis(ndarray::Axis(0), 2), tensor.index_axis(ndarray::Axis(0), 3), dim_f, dim_t, padded_len);

        let strip = |buf: Vec<f64>| -> Vec<Sample> {
            buf[pad..pad + output_len].iter().map(|&x| x as Sample).collect()
        };
        PlanarStereo::from_channels(strip(left), strip(right))
    }

    fn synthesize_channel(
        &self,
        real: ndarray::ArrayView2<f32>,
        imag: ndarray::ArrayView2<f32>,
        dim_f: usize,
        dim_t: usize,
        padded_len: usize,
    ) -> Vec<f64> {
        let n_bins = self.n_bins();

        let mut output = vec![0f64; padded_len];
        let mut window_sum = vec![0f64; padded_len];

        let mut freq_buffer = vec![Complex32::new(0.0, 0.0); n_bins];
        let mut time_buffer = vec![0f32; self.n_fft];
        let mut scratch = vec![Complex32::new(0.0, 0.0); self.fft_inverse.get_scratch_len()];

        for t in 0..dim_t {
            for f in 0..n_bins {
                freq_buffer[f] = if f < dim_f {
                    Complex32::new(real[[f, t]], imag[[f, t]])
                } else {
                    Complex32::new(0.0, 0.0)
                };
            }

            self.fft_inverse
                .process_with_scratch(&mut freq_buffer, &mut time_buffer, &mut scratch)
                .expect("inverse FFT plan mismatch");

            let start = t * self.hop;
            let norm = 1.0 / self.n_fft as f64;
            for i in 0..self.n_fft {
                let pos = start + i;
                if pos < padded_len {
                    let window = self.window[i] as f64;
                    output[pos] += time_buffer[i] as f64 * norm * window;
                    window_sum[pos] += window * window;
                }
            }
        }

        for i in 0..padded_len {
            if window_sum[i] > 1e-10 {
                output[i] /= window_sum[i];
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect_index_mirrors_without_repeating_edge() {
        assert_eq!(reflect_index(-1, 8), 1);
        assert_eq!(reflect_index(-2, 8), 2);
        assert_eq!(reflect_index(8, 8), 6);
        assert_eq!(reflect_index(9, 8), 5);
    }

    #[test]
    fn round_trip_reconstructs_within_noise_floor() {
        let n_fft = 256;
        let hop = n_fft / 2;
        let engine = StftEngine::new(n_fft, hop);
        let chunk_size = 2048;

        let left: Vec<Sample> = (0..chunk_size)
            .map(|i| (i as Sample * 0.05).sin() * 0.5)
            .collect();
        let right: Vec<Sample> = (0..chunk_size)
            .map(|i| (i as Sample * 0.031).sin() * 0.3)
            .collect();
        let chunk = PlanarStereo::from_channels(left.clone(), right.clone());

        let dim_f = engine.n_bins();
        let tensor = engine.analyze(&chunk, dim_f);
        let reconstructed = engine.synthesize(tensor.view(), chunk_size);

        // Skip the first/last window's worth of samples, where COLA
        // overlap-add has fewer contributing frames.
        let margin = n_fft;
        for i in margin..chunk_size - margin {
            assert!(
                (reconstructed.left()[i] - left[i]).abs() < 1e-3,
                "left[{i}]: {} vs {}",
                reconstructed.left()[i],
                left[i]
            );
            assert!(
                (reconstructed.right()[i] - right[i]).abs() < 1e-3,
                "right[{i}]: {} vs {}",
                reconstructed.right()[i],
                right[i]
            );
        }
    }
}
