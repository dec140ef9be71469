//! Hybrid (dual-branch) separator (spec §4.5): a waveform branch and an
//! internally-STFT'd spectrogram branch per stem, merged by sample-wise
//! addition, reassembled across chunks with reflection padding and
//! constant-power crossfade. Grounded on the teacher's HTDemucs dual-path
//! merge, generalized from a single vocals/instrumental split to the
//! fixed four-stem order.

use std::collections::HashMap;

use ndarray::{Array3, Array4, ArrayD, Axis};

use sf_core::{PlanarStereo, Sample};
use sf_stft::StftEngine;

use crate::chunker::{constant_power_crossfade, ReflectionCrossfadeChunker};
use crate::error::{SeparationError, SeparationResult};
use crate::inference::{InferenceBackend, TensorMap};
use crate::stems::{StemCollection, StemOutput, StemType};

/// Internal STFT used only for the spectrogram branch, fixed at
/// `n_fft=4096, hop=1024` per spec §4.5.
const HYBRID_N_FFT: usize = 4096;
const HYBRID_HOP: usize = 1024;

pub struct HybridSeparator {
    stft: StftEngine,
    dim_f: usize,
    waveform_input: String,
    spectrogram_input: String,
}

impl HybridSeparator {
    pub fn new(waveform_input: impl Into<String>, spectrogram_input: impl Into<String>, dim_f: usize) -> Self {
        Self {
            stft: StftEngine::new(HYBRID_N_FFT, HYBRID_HOP),
            dim_f,
            waveform_input: waveform_input.into(),
            spectrogram_input: spectrogram_input.into(),
        }
    }

    /// Run the dual-branch model over the whole stream and reassemble the
    /// selected stems, per spec §4.5 steps 1-5.
    pub fn separate_stream(
        &self,
        backend: &dyn InferenceBackend,
        stream: &PlanarStereo,
        chunker: &ReflectionCrossfadeChunker,
        selected: &[StemType],
        sample_rate: u32,
        model_name: impl Into<String>,
        mut on_progress: impl FnMut(usize, usize),
    ) -> SeparationResult<StemCollection> {
        let total_len = stream.len();
        let num_chunks = chunker.num_chunks(total_len);
        let crossfade = chunker.crossfade();
        let valid = chunker.valid();
        let margin = chunker.margin();

        let mut left_acc: HashMap<StemType, Vec<Sample>> = HashMap::new();
        let mut right_acc: HashMap<StemType, Vec<Sample>> = HashMap::new();
        for &stem in selected {
            left_acc.insert(stem, Vec::with_capacity(total_len));
            right_acc.insert(stem, Vec::with_capacity(total_len));
        }

        for idx in 0..num_chunks {
            let _chunk_span = tracing::trace_span!("hybrid_chunk", chunk_index = idx, num_chunks).entered();
            let window = PlanarStereo::from_channels(
                chunker.extract_window(stream.left(), idx),
                chunker.extract_window(stream.right(), idx),
            );

            let stem_outputs = self.process_window(backend, &window, selected)?;

            for &stem in selected {
                let (final_left, final_right) = &stem_outputs[&stem];
                let trimmed_left = &final_left[margin..margin + valid];
                let trimmed_right = &final_right[margin..margin + valid];

                let dst_left = left_acc.get_mut(&stem).unwrap();
                let dst_right = right_acc.get_mut(&stem).unwrap();

                if idx == 0 {
                    dst_left.extend_from_slice(trimmed_left);
                    dst_right.extend_from_slice(trimmed_right);
                } else {
                    join_with_crossfade(dst_left, trimmed_left, crossfade);
                    join_with_crossfade(dst_right, trimmed_right, crossfade);
                }
            }

            on_progress(idx, num_chunks);
        }

        let mut collection = StemCollection::new(sample_rate, model_name.into());
        for &stem in selected {
            let mut left = left_acc.remove(&stem).unwrap();
            let mut right = right_acc.remove(&stem).unwrap();
            left.truncate(total_len);
            right.truncate(total_len);
            collection.add(StemOutput::new(stem, vec![left, right], sample_rate));
        }
        Ok(collection)
    }

    /// Steps 1-3 for a single reflection-padded window: build both branch
    /// inputs, run inference, merge freq + time per selected stem.
    fn process_window(
        &self,
        backend: &dyn InferenceBackend,
        window: &PlanarStereo,
        selected: &[StemType],
    ) -> SeparationResult<HashMap<StemType, (Vec<Sample>, Vec<Sample>)>> {
        let w = window.len();
        let dim_t = self.stft.frame_count(w);

        let spectrogram = self.stft.analyze(window, self.dim_f);
        let spectrogram_complex_last = to_complex_last(&spectrogram, self.dim_f, dim_t);

        let mut waveform = Array3::<f32>::zeros((1, 2, w));
        for i in 0..w {
            waveform[[0, 0, i]] = window.left()[i];
            waveform[[0, 1, i]] = window.right()[i];
        }

        let mut inputs = TensorMap::new();
        inputs.insert(self.waveform_input.clone(), waveform.into_dyn());
        inputs.insert(
            self.spectrogram_input.clone(),
            spectrogram_complex_last.insert_axis(Axis(0)).into_dyn(),
        );

        let outputs = backend.run(&inputs)?;
        if outputs.len() < 2 {
            return Err(SeparationError::InvalidOutputShape {
                expected: "[freq_branch, time_branch]".into(),
                got: format!("{} output tensor(s)", outputs.len()),
            });
        }

        let freq_branch: ArrayD<f32> = outputs[0].clone();
        let time_branch: ArrayD<f32> = outputs[1].clone();

        let freq_branch = freq_branch
            .into_dimensionality::<ndarray::Ix5>()
            .map_err(|e| SeparationError::InvalidOutputShape {
                expected: "5D [1, S, 4, dim_f, dim_t]".into(),
                got: e.to_string(),
            })?;
        let time_branch = time_branch
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|e| SeparationError::InvalidOutputShape {
                expected: "4D [1, S, 2, W]".into(),
                got: e.to_string(),
            })?;

        let order = StemType::fixed_order();
        let mut result = HashMap::new();

        for &stem in selected {
            let s_idx = order.iter().position(|&s| s == stem).ok_or_else(|| SeparationError::InvalidOutputShape {
                expected: "stem within the fixed four-stem order".into(),
                got: format!("{stem:?}"),
            })?;

            let freq_slice = freq_branch.index_axis(Axis(0), 0).index_axis(Axis(0), s_idx).to_owned();
            let istft = self.stft.synthesize(freq_slice.view(), w);

            let time_slice = time_branch.index_axis(Axis(0), 0).index_axis(Axis(0), s_idx);
            let time_len = time_slice.shape()[1].min(w);

            let mut merged_left = vec![0.0 as Sample; w];
            let mut merged_right = vec![0.0 as Sample; w];
            for i in 0..w {
                let t_left = if i < time_len { time_slice[[0, i]] } else { 0.0 };
                let t_right = if i < time_len { time_slice[[1, i]] } else { 0.0 };
                merged_left[i] = istft.left()[i] + t_left;
                merged_right[i] = istft.right()[i] + t_right;
            }

            result.insert(stem, (merged_left, merged_right));
        }

        Ok(result)
    }
}

/// Reassemble `[4][dim_f][dim_t]` (channel-first real/imag) into
/// `[2][dim_f][dim_t][2]` (complex-last), the layout spec §4.5 expects
/// for the spectrogram input tensor.
fn to_complex_last(tensor: &Array3<f32>, dim_f: usize, dim_t: usize) -> Array4<f32> {
    let mut out = Array4::<f32>::zeros((2, dim_f, dim_t, 2));
    for f in 0..dim_f {
        for t in 0..dim_t {
            out[[0, f, t, 0]] = tensor[[0, f, t]];
            out[[0, f, t, 1]] = tensor[[1, f, t]];
            out[[1, f, t, 0]] = tensor[[2, f, t]];
            out[[1, f, t, 1]] = tensor[[3, f, t]];
        }
    }
    out
}

/// Merge `next` into `dst` by crossfading `dst`'s last `crossfade`
/// samples against `next`'s first `crossfade` samples, then appending the
/// rest of `next` directly (spec §4.5 step 5 / §4.6).
fn join_with_crossfade(dst: &mut Vec<Sample>, next: &[Sample], crossfade: usize) {
    let crossfade = crossfade.min(dst.len()).min(next.len());
    let tail_start = dst.len() - crossfade;
    let faded = constant_power_crossfade(&dst[tail_start..], &next[..crossfade]);

    dst.truncate(tail_start);
    dst.extend_from_slice(&faded);
    dst.extend_from_slice(&next[crossfade..]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ExecutionProvider;
    use ndarray::{Array4 as NdArray4, Array5};

    struct ZeroStubBackend {
        dim_f: usize,
        dim_t: usize,
        w: usize,
        num_stems: usize,
    }

    impl InferenceBackend for ZeroStubBackend {
        fn run(&self, _inputs: &TensorMap) -> SeparationResult<Vec<ArrayD<f32>>> {
            let freq = Array5::<f32>::zeros((1, self.num_stems, 4, self.dim_f, self.dim_t)).into_dyn();
            let time = NdArray4::<f32>::zeros((1, self.num_stems, 2, self.w)).into_dyn();
            Ok(vec![freq, time])
        }

        fn provider(&self) -> ExecutionProvider {
            ExecutionProvider::Cpu
        }
    }

    #[test]
    fn silent_model_produces_silence_of_correct_length() {
        let valid = 4096;
        let margin = 1024;
        let crossfade = 256;
        let chunker = ReflectionCrossfadeChunker::new(valid, margin, crossfade).unwrap();
        let w = chunker.window_len();

        let dim_f = 64;
        let sep = HybridSeparator::new("waveform", "spectrogram", dim_f);
        let dim_t = sep.stft.frame_count(w);

        let backend = ZeroStubBackend {
            dim_f,
            dim_t,
            w,
            num_stems: 4,
        };

        let n = valid * 3;
        let left = vec![0.3 as Sample; n];
        let right = vec![-0.2 as Sample; n];
        let stream = PlanarStereo::from_channels(left, right);

        let selected = [StemType::Vocals, StemType::Drums];
        let mut calls = 0;
        let collection = sep
            .separate_stream(&backend, &stream, &chunker, &selected, 44100, "test", |_, _| calls += 1)
            .unwrap();
        assert_eq!(calls, chunker.num_chunks(stream.len()));

        let vocals = collection.get(StemType::Vocals).unwrap();
        assert_eq!(vocals.len(), n);
        assert!(vocals.peak() < 1e-6);
    }
}
