//! N-model averaging separator (spec §4.4): run every model's §4.3
//! procedure on the same chunk, derive vocals_m/instr_m by swapping on
//! each model's own `output_kind`, and average both sums across models.

use sf_core::{PlanarStereo, Sample};

use crate::chunker::MarginResidualChunker;
use crate::error::SeparationResult;
use crate::inference::InferenceBackend;
use crate::model::OutputKind;
use crate::single::SingleModelSeparator;
use crate::SeparationProgress;

/// One model paired with the backend that runs it.
pub struct ModelSlot {
    pub separator: SingleModelSeparator,
    pub backend: Box<dyn InferenceBackend>,
}

pub struct MultiModelSeparator {
    slots: Vec<ModelSlot>,
}

impl MultiModelSeparator {
    pub fn new(slots: Vec<ModelSlot>) -> Self {
        Self { slots }
    }

    pub fn model_count(&self) -> usize {
        self.slots.len()
    }

    /// Run every model over the full stream and average `vocals_m`/
    /// `instr_m` across models, per spec §4.4 steps 1-4. Returns
    /// `(vocals_final, instr_final)`.
    pub fn separate_stream(
        &self,
        stream: &PlanarStereo,
        valid_size: usize,
        margin: usize,
        mut on_progress: impl FnMut(SeparationProgress),
    ) -> SeparationResult<(PlanarStereo, PlanarStereo)> {
        self.separate_stream_with_intermediates(stream, valid_size, margin, &mut on_progress, |_, _, _| {})
    }

    /// As [`Self::separate_stream`], additionally invoking `on_model_done`
    /// with each model's own `(vocals_m, instr_m)` pair as it finishes
    /// (spec §6 `save_all_intermediate_results`).
    pub fn separate_stream_with_intermediates(
        &self,
        stream: &PlanarStereo,
        valid_size: usize,
        margin: usize,
        mut on_progress: impl FnMut(SeparationProgress),
        mut on_model_done: impl FnMut(usize, &PlanarStereo, &PlanarStereo),
    ) -> SeparationResult<(PlanarStereo, PlanarStereo)> {
        let chunker = MarginResidualChunker::new(valid_size, margin)?;
        let total_len = stream.len();
        let chunk_count = chunker.segment_count(total_len);
        let model_count = self.slots.len().max(1);

        let mut vocals_sum_left = vec![0.0f64; total_len];
        let mut vocals_sum_right = vec![0.0f64; total_len];
        let mut instr_sum_left = vec![0.0f64; total_len];
        let mut instr_sum_right = vec![0.0f64; total_len];

        for (m, slot) in self.slots.iter().enumerate() {
            let _model_span = tracing::debug_span!("model", model_index = m, model_count).entered();
            let mut processed_left = Vec::with_capacity(total_len);
            let mut processed_right = Vec::with_capacity(total_len);

            for idx in 0..chunk_count {
                let _chunk_span = tracing::trace_span!("chunk", chunk_index = idx, chunk_count).entered();
                let seg = chunker.segment(idx, total_len);
                let source = PlanarStereo::from_channels(
                    stream.left()[seg.source_start..seg.source_start + seg.source_len].to_vec(),
                    stream.right()[seg.source_start..seg.source_start + seg.source_len].to_vec(),
                );

                let processed = slot.separator.process_chunk(slot.backend.as_ref(), &source)?;
                processed_left.extend_from_slice(&processed.left()[seg.left_trim..seg.left_trim + seg.valid_len]);
                processed_right.extend_from_slice(&processed.right()[seg.left_trim..seg.left_trim + seg.valid_len]);

                on_progress(SeparationProgress::new(m, model_count, idx, chunk_count));
            }

            // `processed` is already vocals_m or instr_m, per this model's
            // own output_kind (SingleModelSeparator::process_chunk); the
            // complement is `original - processed` (spec §4.4 step 2).
            let is_vocals = matches!(slot.separator.params().output_kind, OutputKind::Vocals);
            let mut model_vocals_left = vec![0.0 as Sample; total_len];
            let mut model_vocals_right = vec![0.0 as Sample; total_len];
            let mut model_instr_left = vec![0.0 as Sample; total_len];
            let mut model_instr_right = vec![0.0 as Sample; total_len];

            for i in 0..total_len {
                let original_l = stream.left()[i] as f64;
                let original_r = stream.right()[i] as f64;
                let p_l = processed_left[i] as f64;
                let p_r = processed_right[i] as f64;

                let (v_l, v_r, i_l, i_r) = if is_vocals {
                    (p_l, p_r, original_l - p_l, original_r - p_r)
                } else {
                    (original_l - p_l, original_r - p_r, p_l, p_r)
                };

                vocals_sum_left[i] += v_l;
                vocals_sum_right[i] += v_r;
                instr_sum_left[i] += i_l;
                instr_sum_right[i] += i_r;

                model_vocals_left[i] = v_l as Sample;
                model_vocals_right[i] = v_r as Sample;
                model_instr_left[i] = i_l as Sample;
                model_instr_right[i] = i_r as Sample;
            }

            let model_vocals = PlanarStereo::from_channels(model_vocals_left, model_vocals_right);
            let model_instr = PlanarStereo::from_channels(model_instr_left, model_instr_right);
            on_model_done(m, &model_vocals, &model_instr);
        }

        let n = model_count as f64;
        let avg = |acc: &[f64]| -> Vec<Sample> { acc.iter().map(|&v| (v / n) as Sample).collect() };

        let vocals_final = PlanarStereo::from_channels(avg(&vocals_sum_left), avg(&vocals_sum_right));
        let instr_final = PlanarStereo::from_channels(avg(&instr_sum_left), avg(&instr_sum_right));
        Ok((vocals_final, instr_final))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SeparationResult as Result;
    use crate::inference::{ExecutionProvider, TensorMap};
    use crate::model::ModelParams;
    use ndarray::ArrayD;

    /// Scales every input tensor by a fixed gain, simulating a model
    /// that predicts a constant fraction of the input as its stem.
    struct GainBackend {
        gain: f32,
    }

    impl InferenceBackend for GainBackend {
        fn run(&self, inputs: &TensorMap) -> Result<Vec<ArrayD<f32>>> {
            Ok(inputs.values().map(|t| t.mapv(|v| v * self.gain)).collect())
        }

        fn provider(&self) -> ExecutionProvider {
            ExecutionProvider::Cpu
        }
    }

    fn slot_with_gain(gain: f32) -> ModelSlot {
        let params = ModelParams::new(256, 128, 129, 4, 4096, 512, OutputKind::Instrumental).unwrap();
        ModelSlot {
            separator: SingleModelSeparator::new(params, "input", false),
            backend: Box::new(GainBackend { gain }),
        }
    }

    #[test]
    fn single_model_multi_matches_its_own_single_model_output() {
        let slots = vec![slot_with_gain(0.5)];
        let multi = MultiModelSeparator::new(slots);

        let n = 4096;
        let left: Vec<Sample> = (0..n).map(|i| (i as Sample * 0.01).sin() * 0.2).collect();
        let right = left.clone();
        let stream = PlanarStereo::from_channels(left, right);

        let (vocals, instr) = multi.separate_stream(&stream, 2048, 512, |_| {}).unwrap();
        assert_eq!(vocals.len(), n);
        assert_eq!(instr.len(), n);
    }

    /// S3: N=3 stub models returning 0.5/0.3/0.1 of the input with
    /// `output_kind=Instrumental` average to instrumental=0.3*input,
    /// vocals=0.7*input (spec §8 scenario S3).
    #[test]
    fn averages_three_instrumental_gain_models_per_scenario_s3() {
        let slots = vec![slot_with_gain(0.5), slot_with_gain(0.3), slot_with_gain(0.1)];
        let multi = MultiModelSeparator::new(slots);

        let n = 4096;
        let left: Vec<Sample> = (0..n).map(|i| (i as Sample * 0.01).sin() * 0.2).collect();
        let right = left.clone();
        let stream = PlanarStereo::from_channels(left.clone(), right);

        let (vocals, instr) = multi.separate_stream(&stream, 2048, 512, |_| {}).unwrap();
        assert_eq!(instr.len(), n);

        // Interior samples only: edges are affected by STFT trim/reflection.
        for i in 1024..3072 {
            assert!((instr.left()[i] - 0.3 * left[i]).abs() < 0.05, "instr mismatch at {i}");
            assert!((vocals.left()[i] - 0.7 * left[i]).abs() < 0.05, "vocals mismatch at {i}");
        }
    }

    #[test]
    fn vocals_and_instrumental_sum_to_original_residual_law() {
        let slots = vec![slot_with_gain(0.4)];
        let multi = MultiModelSeparator::new(slots);

        let n = 4096;
        let left: Vec<Sample> = (0..n).map(|i| (i as Sample * 0.01).sin() * 0.2).collect();
        let right = left.clone();
        let stream = PlanarStereo::from_channels(left.clone(), right);

        let (vocals, instr) = multi.separate_stream(&stream, 2048, 512, |_| {}).unwrap();
        for i in 1024..3072 {
            assert!((vocals.left()[i] + instr.left()[i] - left[i]).abs() < 0.05, "residual law violated at {i}");
        }
    }
}
