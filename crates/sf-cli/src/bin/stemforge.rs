//! `stemforge` CLI front-end: clap-derived subcommands over the three
//! separation entry points (spec §6).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use sf_cli::effects::{apply_compressor, apply_reverb, EffectKind};
use sf_cli::{
    separate_hybrid, separate_multi, separate_single, ModelRef, ModelSpec, PerModelOptions,
    ProgressEvent, SeparationOptions, TargetStems,
};
use sf_separate::OutputKind;

#[derive(Parser)]
#[command(name = "stemforge", about = "Audio stem separation and effects DSP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Separate with a single model.
    Single {
        input: PathBuf,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[arg(long, default_value = "default")]
        model: String,
        #[arg(long, default_value = "instrumental")]
        output_kind: String,
        #[arg(long)]
        gpu: bool,
        #[arg(long, default_value_t = 44100)]
        margin_samples: usize,
        #[arg(long, default_value_t = 0)]
        chunk_seconds: u32,
        #[arg(long)]
        no_noise_reduction: bool,
        #[arg(long, default_value = "models")]
        model_dir: PathBuf,
    },
    /// Separate with N models and average the results.
    Multi {
        input: PathBuf,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Comma-separated model tags, e.g. "default,best,karaoke".
        #[arg(long)]
        models: String,
        #[arg(long)]
        gpu: bool,
        #[arg(long, default_value_t = 44100)]
        margin_samples: usize,
        #[arg(long, default_value_t = 0)]
        chunk_seconds: u32,
        #[arg(long)]
        no_noise_reduction: bool,
        #[arg(long)]
        save_intermediate: bool,
        #[arg(long, default_value = "models")]
        model_dir: PathBuf,
    },
    /// Separate with the hybrid dual-branch model into four stems.
    Hybrid {
        input: PathBuf,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[arg(long, default_value = "htdemucs")]
        model: String,
        #[arg(long)]
        gpu: bool,
        #[arg(long, default_value = "models")]
        model_dir: PathBuf,
    },
    /// Apply an offline reverb or compressor preset to a whole file.
    Effect {
        input: PathBuf,
        output: PathBuf,
        /// "reverb:<preset>" or "compressor:<preset>".
        #[arg(long)]
        preset: EffectKind,
    },
}

fn parse_model_ref(tag: &str) -> ModelRef {
    match tag.to_ascii_lowercase().as_str() {
        "default" => ModelRef::Default,
        "best" => ModelRef::Best,
        "karaoke" => ModelRef::Karaoke,
        "htdemucs" => ModelRef::HTDemucs,
        other => ModelRef::Path(PathBuf::from(other)),
    }
}

fn parse_output_kind(s: &str) -> Result<OutputKind> {
    match s.to_ascii_lowercase().as_str() {
        "vocals" => Ok(OutputKind::Vocals),
        "instrumental" => Ok(OutputKind::Instrumental),
        other => anyhow::bail!("unknown output_kind \"{other}\", expected vocals or instrumental"),
    }
}

fn log_progress(event: ProgressEvent) {
    log::info!(
        "progress: {:.1}% (model {}/{}, chunk {}/{})",
        event.ratio * 100.0,
        event.model_index + 1,
        event.model_count,
        event.chunk_index + 1,
        event.chunk_count
    );
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Single {
            input,
            out_dir,
            model,
            output_kind,
            gpu,
            margin_samples,
            chunk_seconds,
            no_noise_reduction,
            model_dir,
        } => {
            let opts = SeparationOptions {
                output_directory: out_dir,
                enable_gpu: gpu,
                margin_samples,
                chunk_seconds,
                disable_noise_reduction: no_noise_reduction,
                model_dir,
                ..SeparationOptions::default()
            };
            let per_model = PerModelOptions {
                output_kind: parse_output_kind(&output_kind)?,
                ..PerModelOptions::default()
            };
            let model_ref = parse_model_ref(&model);

            let result = separate_single(&model_ref, &input, &opts, &per_model, &mut log_progress)
                .context("single-model separation failed")?;
            println!("vocals:       {}", result.vocals_path.display());
            println!("instrumental: {}", result.instr_path.display());
            println!("rtf: {:.3} ({} ms, gpu={})", result.stats.rtf, result.stats.total_time_ms, result.stats.gpu_utilized);
        }

        Command::Multi {
            input,
            out_dir,
            models,
            gpu,
            margin_samples,
            chunk_seconds,
            no_noise_reduction,
            save_intermediate,
            model_dir,
        } => {
            let opts = SeparationOptions {
                output_directory: out_dir,
                enable_gpu: gpu,
                margin_samples,
                chunk_seconds,
                disable_noise_reduction: no_noise_reduction,
                save_all_intermediate_results: save_intermediate,
                model_dir,
                ..SeparationOptions::default()
            };
            let specs: Vec<ModelSpec> = models
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|tag| ModelSpec {
                    model_ref: parse_model_ref(tag),
                    options: PerModelOptions::default(),
                })
                .collect();

            let result =
                separate_multi(&specs, &input, &opts, &mut log_progress).context("multi-model separation failed")?;
            println!("vocals:       {}", result.vocals_path.display());
            println!("instrumental: {}", result.instr_path.display());
            for path in &result.intermediate_paths {
                println!("intermediate: {}", path.display());
            }
            println!("rtf: {:.3} ({} ms, gpu={})", result.stats.rtf, result.stats.total_time_ms, result.stats.gpu_utilized);
        }

        Command::Hybrid {
            input,
            out_dir,
            model,
            gpu,
            model_dir,
        } => {
            let opts = SeparationOptions {
                output_directory: out_dir,
                enable_gpu: gpu,
                model_dir,
                target_stems: TargetStems::default(),
                ..SeparationOptions::default()
            };
            let model_ref = parse_model_ref(&model);

            let result =
                separate_hybrid(&model_ref, &input, &opts, &mut log_progress).context("hybrid separation failed")?;
            for path in &result.stems_paths {
                println!("stem: {}", path.display());
            }
            println!("rtf: {:.3} ({} ms, gpu={})", result.stats.rtf, result.stats.total_time_ms, result.stats.gpu_utilized);
        }

        Command::Effect { input, output, preset } => {
            match preset {
                EffectKind::Reverb(p) => apply_reverb(&input, &output, p).context("reverb application failed")?,
                EffectKind::Compressor(p) => {
                    apply_compressor(&input, &output, p).context("compressor application failed")?
                }
            }
            println!("wrote: {}", output.display());
        }
    }

    Ok(())
}
