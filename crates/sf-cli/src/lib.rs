//! Separation orchestration (spec §6): wires `sf_io` (source + sink) and
//! `sf_separate` (single/multi/hybrid separators + the tract backend)
//! into the three CLI-facing entry points. Grounded on the teacher's
//! `SeparationConfig` preset shape, adapted to spec.md's own option set.

pub mod effects;
mod progress;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use sf_core::{PlanarStereo, SfError, SfResult};
use sf_separate::{
    detect_best_provider, ExecutionProvider, HybridSeparator, InferenceBackend, MarginResidualChunker,
    ModelParams, ModelSlot, MultiModelSeparator, OutputKind, ReflectionCrossfadeChunker, SeparationStats,
    SingleModelSeparator, StemType, TractBackend,
};

pub use progress::{ProgressEvent, ProgressSink};

const SAMPLE_RATE: u32 = 44100;

/// A separation model identified by a symbolic tag or an explicit path
/// (spec §6 "Model resources").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelRef {
    Default,
    Best,
    Karaoke,
    HTDemucs,
    Path(PathBuf),
}

impl ModelRef {
    /// Resolve to a filesystem path. Symbolic tags name a file expected
    /// alongside the binary's model directory; no bytes are embedded in
    /// this crate (spec §6 allows either resolution strategy).
    fn resolve(&self, model_dir: &Path) -> PathBuf {
        match self {
            ModelRef::Default => model_dir.join("default.onnx"),
            ModelRef::Best => model_dir.join("best.onnx"),
            ModelRef::Karaoke => model_dir.join("karaoke.onnx"),
            ModelRef::HTDemucs => model_dir.join("htdemucs.onnx"),
            ModelRef::Path(p) => p.clone(),
        }
    }

    fn tag_name(&self) -> String {
        match self {
            ModelRef::Default => "default".into(),
            ModelRef::Best => "best".into(),
            ModelRef::Karaoke => "karaoke".into(),
            ModelRef::HTDemucs => "htdemucs".into(),
            ModelRef::Path(p) => p
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "model".into()),
        }
    }
}

/// Per-model tensor-shape configuration (spec §6 "Per-model" options).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerModelOptions {
    pub n_fft: usize,
    pub dim_t_exp: u32,
    pub dim_f: usize,
    pub output_kind: OutputKind,
}

impl Default for PerModelOptions {
    fn default() -> Self {
        Self {
            n_fft: 6144,
            dim_t_exp: 8,
            dim_f: 2048,
            output_kind: OutputKind::Instrumental,
        }
    }
}

/// One entry of a multi-model separation list: which model, with which
/// per-model shape options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub model_ref: ModelRef,
    pub options: PerModelOptions,
}

/// Which stems a hybrid separation should emit (spec §6 `target_stems`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TargetStems {
    pub vocals: bool,
    pub drums: bool,
    pub bass: bool,
    pub other: bool,
}

impl Default for TargetStems {
    fn default() -> Self {
        Self {
            vocals: true,
            drums: true,
            bass: true,
            other: true,
        }
    }
}

impl TargetStems {
    fn selected(&self) -> Vec<StemType> {
        let mut out = Vec::new();
        if self.drums {
            out.push(StemType::Drums);
        }
        if self.bass {
            out.push(StemType::Bass);
        }
        if self.other {
            out.push(StemType::Other);
        }
        if self.vocals {
            out.push(StemType::Vocals);
        }
        out
    }
}

/// Separation options recognized across all three entry points (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeparationOptions {
    pub output_directory: PathBuf,
    pub enable_gpu: bool,
    pub margin_samples: usize,
    pub chunk_seconds: u32,
    pub disable_noise_reduction: bool,
    pub save_all_intermediate_results: bool,
    pub model_dir: PathBuf,

    /// Hybrid-only fields; ignored by single/multi.
    pub hybrid_chunk_seconds: f32,
    pub hybrid_margin_seconds: f32,
    pub hybrid_crossfade_seconds: f32,
    pub target_stems: TargetStems,
}

impl Default for SeparationOptions {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            enable_gpu: false,
            margin_samples: 44100,
            chunk_seconds: 0,
            disable_noise_reduction: false,
            save_all_intermediate_results: false,
            model_dir: PathBuf::from("models"),
            hybrid_chunk_seconds: 10.0,
            hybrid_margin_seconds: 0.5,
            hybrid_crossfade_seconds: 0.05,
            target_stems: TargetStems::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SingleResult {
    pub vocals_path: PathBuf,
    pub instr_path: PathBuf,
    pub stats: SeparationStats,
}

#[derive(Debug, Clone)]
pub struct MultiResult {
    pub vocals_path: PathBuf,
    pub instr_path: PathBuf,
    pub intermediate_paths: Vec<PathBuf>,
    pub stats: SeparationStats,
}

#[derive(Debug, Clone)]
pub struct HybridResult {
    pub stems_paths: Vec<PathBuf>,
    pub stats: SeparationStats,
}

/// Build the `rf-ml`-style processing stats (§3 supplement): wall-clock
/// time, segments processed, provider used, and real-time factor.
fn build_stats(started: Instant, samples_processed: usize, segments_processed: usize, provider: ExecutionProvider) -> SeparationStats {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let audio_ms = (samples_processed as f64 / SAMPLE_RATE as f64 * 1000.0).max(1.0);
    SeparationStats {
        total_time_ms: elapsed_ms,
        segments_processed,
        gpu_utilized: !matches!(provider, ExecutionProvider::Cpu),
        rtf: (elapsed_ms as f64 / audio_ms) as f32,
    }
}

fn ensure_output_dir(dir: &Path) -> SfResult<()> {
    fs::create_dir_all(dir).map_err(|e| SfError::Resource(format!("failed to create output directory: {e}")))
}

fn input_stem(input_path: &Path) -> String {
    input_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into())
}

fn read_whole_stream(input_path: &Path) -> SfResult<PlanarStereo> {
    use sf_io::AudioSource;

    let mut source = sf_io::SymphoniaSource::open(input_path, SAMPLE_RATE, 2)?;
    let mut left = Vec::new();
    let mut right = Vec::new();

    let mut interleaved = vec![0.0f32; 2 * 8192];
    loop {
        let result = source.read_frames(&mut interleaved);
        if !result.ok {
            return Err(SfError::TransientIo("audio decode read failed".into()));
        }
        for chunk in interleaved[..result.frames_read * 2].chunks_exact(2) {
            left.push(chunk[0]);
            right.push(chunk[1]);
        }
        if result.is_eof {
            break;
        }
    }

    Ok(PlanarStereo::from_channels(left, right))
}

fn build_model_params(opts: &PerModelOptions) -> SfResult<ModelParams> {
    let dim_t = 1usize << opts.dim_t_exp;
    let hop = opts.n_fft / 6;
    let chunk_size = hop * (dim_t - 1);
    let margin = (opts.n_fft / 2).min(chunk_size / 2).max(1);
    ModelParams::new(opts.n_fft, hop, opts.dim_f, opts.dim_t_exp, chunk_size, margin, opts.output_kind).map_err(SfError::from)
}

fn load_backend(model_ref: &ModelRef, model_dir: &Path, enable_gpu: bool, input_order: Vec<String>) -> SfResult<TractBackend> {
    let path = model_ref.resolve(model_dir);
    if enable_gpu {
        log::info!("gpu requested, best available provider: {:?}", detect_best_provider());
    }
    TractBackend::load(&path, input_order).map_err(SfError::from)
}

/// `SeparateSingle(model_ref, input_path, out_dir, opts) -> {vocals_path, instr_path}`.
pub fn separate_single(
    model_ref: &ModelRef,
    input_path: &Path,
    opts: &SeparationOptions,
    per_model: &PerModelOptions,
    mut progress: ProgressSink<'_>,
) -> SfResult<SingleResult> {
    ensure_output_dir(&opts.output_directory)?;

    let stream = read_whole_stream(input_path)?;
    let params = build_model_params(per_model)?;
    let margin = opts.margin_samples.min(params.chunk_size).max(1);
    let valid_size = if opts.chunk_seconds == 0 {
        stream.len().max(1)
    } else {
        opts.chunk_seconds as usize * SAMPLE_RATE as usize
    };

    let backend = load_backend(model_ref, &opts.model_dir, opts.enable_gpu, vec!["input".to_string()])?;
    let separator = SingleModelSeparator::new(params, "input", !opts.disable_noise_reduction);
    let chunker = MarginResidualChunker::new(valid_size, margin).map_err(SfError::from)?;
    let started = Instant::now();
    let provider = backend.provider();

    let processed = separator
        .separate_stream(&backend, &stream, &chunker, |idx, count| {
            progress(ProgressEvent::single_model(idx, count));
        })
        .map_err(SfError::from)?;
    let stats = build_stats(started, stream.len(), chunker.segment_count(stream.len()), provider);

    let (vocals, instrumental) = match per_model.output_kind {
        OutputKind::Vocals => (processed.clone(), residual(&stream, &processed)),
        OutputKind::Instrumental => (residual(&stream, &processed), processed.clone()),
    };

    let stem = input_stem(input_path);
    let vocals_path = opts.output_directory.join(format!("{stem}_vocals.wav"));
    let instr_path = opts.output_directory.join(format!("{stem}_instrumental.wav"));

    sf_io::write_wav(&vocals_path, &[vocals.left().to_vec(), vocals.right().to_vec()], SAMPLE_RATE)?;
    sf_io::write_wav(&instr_path, &[instrumental.left().to_vec(), instrumental.right().to_vec()], SAMPLE_RATE)?;

    Ok(SingleResult { vocals_path, instr_path, stats })
}

/// `SeparateMulti(models[], input_path, out_dir, opts) -> {vocals_path, instr_path, intermediate_paths}`.
pub fn separate_multi(
    models: &[ModelSpec],
    input_path: &Path,
    opts: &SeparationOptions,
    mut progress: ProgressSink<'_>,
) -> SfResult<MultiResult> {
    if models.is_empty() {
        return Err(SfError::Configuration("multi-model separation requires at least one model".into()));
    }
    ensure_output_dir(&opts.output_directory)?;

    let stream = read_whole_stream(input_path)?;
    let mut slots = Vec::with_capacity(models.len());
    let mut max_chunk_size = 0;
    let mut any_gpu = false;

    for spec in models {
        let params = build_model_params(&spec.options)?;
        max_chunk_size = max_chunk_size.max(params.chunk_size);
        let backend = load_backend(&spec.model_ref, &opts.model_dir, opts.enable_gpu, vec!["input".to_string()])?;
        any_gpu |= !matches!(backend.provider(), ExecutionProvider::Cpu);
        let separator = SingleModelSeparator::new(params, "input", !opts.disable_noise_reduction);
        slots.push(ModelSlot {
            separator,
            backend: Box::new(backend),
        });
    }

    let margin = opts.margin_samples.min(max_chunk_size).max(1);
    let valid_size = if opts.chunk_seconds == 0 {
        stream.len().max(1)
    } else {
        opts.chunk_seconds as usize * SAMPLE_RATE as usize
    };

    let stem = input_stem(input_path);
    let save_intermediate = opts.save_all_intermediate_results;
    let mut intermediate_paths = Vec::new();
    let mut intermediate_write_err = None;

    let started = Instant::now();
    let chunk_count = MarginResidualChunker::new(valid_size, margin)
        .map_err(SfError::from)?
        .segment_count(stream.len());
    let separator = MultiModelSeparator::new(slots);
    let (vocals, instrumental) = separator
        .separate_stream_with_intermediates(
            &stream,
            valid_size,
            margin,
            |p| progress(p.into()),
            |k, model_vocals, model_instr| {
                if !save_intermediate || intermediate_write_err.is_some() {
                    return;
                }
                let spec = &models[k];
                let name = spec.model_ref.tag_name();
                let (kind_name, payload) = match spec.options.output_kind {
                    OutputKind::Vocals => ("vocals", model_vocals),
                    OutputKind::Instrumental => ("instrumental", model_instr),
                };
                let path = opts
                    .output_directory
                    .join(format!("{stem}_model{}_{name}_{kind_name}.wav", k + 1));
                // Per-model intermediates are best-effort: a write failure
                // here never blocks writing the averaged output (spec §7).
                if let Err(e) = sf_io::write_wav(&path, &[payload.left().to_vec(), payload.right().to_vec()], SAMPLE_RATE) {
                    log::warn!("failed to write intermediate stem for model {}: {e}", k + 1);
                    intermediate_write_err = Some(e);
                } else {
                    intermediate_paths.push(path);
                }
            },
        )
        .map_err(SfError::from)?;

    let vocals_path = opts.output_directory.join(format!("{stem}_vocals.wav"));
    let instr_path = opts.output_directory.join(format!("{stem}_instrumental.wav"));
    sf_io::write_wav(&vocals_path, &[vocals.left().to_vec(), vocals.right().to_vec()], SAMPLE_RATE)?;
    sf_io::write_wav(&instr_path, &[instrumental.left().to_vec(), instrumental.right().to_vec()], SAMPLE_RATE)?;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let audio_ms = (stream.len() as f64 / SAMPLE_RATE as f64 * 1000.0).max(1.0);
    let stats = SeparationStats {
        total_time_ms: elapsed_ms,
        segments_processed: chunk_count,
        gpu_utilized: any_gpu,
        rtf: (elapsed_ms as f64 / audio_ms) as f32,
    };

    Ok(MultiResult {
        vocals_path,
        instr_path,
        intermediate_paths,
        stats,
    })
}

/// `SeparateHybrid(model_ref, input_path, out_dir, opts) -> {stems_paths[]}`.
pub fn separate_hybrid(
    model_ref: &ModelRef,
    input_path: &Path,
    opts: &SeparationOptions,
    mut progress: ProgressSink<'_>,
) -> SfResult<HybridResult> {
    ensure_output_dir(&opts.output_directory)?;

    let stream = read_whole_stream(input_path)?;
    let valid = (opts.hybrid_chunk_seconds * SAMPLE_RATE as f32) as usize;
    let margin = (opts.hybrid_margin_seconds * SAMPLE_RATE as f32) as usize;
    let crossfade = (opts.hybrid_crossfade_seconds * SAMPLE_RATE as f32) as usize;
    let chunker = ReflectionCrossfadeChunker::new(valid.max(1), margin, crossfade).map_err(SfError::from)?;

    let backend = load_backend(
        model_ref,
        &opts.model_dir,
        opts.enable_gpu,
        vec!["waveform".to_string(), "spectrogram".to_string()],
    )?;
    let separator = HybridSeparator::new("waveform", "spectrogram", 2048);
    let selected = opts.target_stems.selected();
    let model_name = model_ref.tag_name();
    let started = Instant::now();
    let provider = backend.provider();
    let chunk_count = chunker.num_chunks(stream.len());

    let collection = separator
        .separate_stream(&backend, &stream, &chunker, &selected, SAMPLE_RATE, model_name, |idx, count| {
            progress(ProgressEvent::single_model(idx, count));
        })
        .map_err(SfError::from)?;
    let stats = build_stats(started, stream.len(), chunk_count, provider);

    let stem = input_stem(input_path);
    let mut stems_paths = Vec::new();
    for &stem_type in &selected {
        let output = collection
            .get(stem_type)
            .ok_or_else(|| SfError::Runtime(format!("hybrid separation produced no {stem_type:?} stem")))?;
        let path = opts.output_directory.join(format!("{stem}_{}.wav", stem_type.short_name()));
        sf_io::write_wav(&path, &output.channels, SAMPLE_RATE)?;
        stems_paths.push(path);
    }

    Ok(HybridResult { stems_paths, stats })
}

fn residual(original: &PlanarStereo, processed: &PlanarStereo) -> PlanarStereo {
    PlanarStereo::from_channels(
        original.left().iter().zip(processed.left()).map(|(&a, &b)| a - b).collect(),
        original.right().iter().zip(processed.right()).map(|(&a, &b)| a - b).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_target_stems_selects_all_four() {
        let stems = TargetStems::default();
        assert_eq!(stems.selected().len(), 4);
    }

    #[test]
    fn model_ref_resolves_symbolic_tags_under_model_dir() {
        let dir = PathBuf::from("/models");
        assert_eq!(ModelRef::Default.resolve(&dir), dir.join("default.onnx"));
        assert_eq!(ModelRef::Karaoke.resolve(&dir), dir.join("karaoke.onnx"));
    }

    #[test]
    fn empty_model_list_is_a_configuration_error() {
        let opts = SeparationOptions::default();
        let mut sink = |_e: ProgressEvent| {};
        let result = separate_multi(&[], Path::new("in.wav"), &opts, &mut sink);
        assert!(matches!(result, Err(SfError::Configuration(_))));
    }
}
