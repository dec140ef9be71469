//! Inference backend contract (spec §4.7): named-tensor inputs, ordered
//! tensor outputs, GPU-with-CPU-fallback execution provider selection.
//!
//! Grounded directly on the teacher's `InferenceEngine`/`ExecutionProvider`
//! /`detect_best_provider`. The teacher's `ort` backend path is disabled
//! there in favor of `tract-onnx`/`tract-core`, which is what this crate
//! uses as its only backend.

use std::collections::HashMap;
use std::path::Path;

use ndarray::ArrayD;

use crate::error::{SeparationError, SeparationResult};

/// Execution provider for inference, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
    TensorRT,
    CoreML,
    DirectML,
}

impl ExecutionProvider {
    /// No GPU SDK is linked in this workspace; only `Cpu` is available.
    pub fn is_available(&self) -> bool {
        matches!(self, ExecutionProvider::Cpu)
    }

    pub fn priority(&self) -> u32 {
        match self {
            ExecutionProvider::TensorRT => 100,
            ExecutionProvider::Cuda => 90,
            ExecutionProvider::CoreML => 85,
            ExecutionProvider::DirectML => 80,
            ExecutionProvider::Cpu => 10,
        }
    }
}

/// Try GPU acceleration in priority order, falling back to CPU.
pub fn detect_best_provider() -> ExecutionProvider {
    [
        ExecutionProvider::TensorRT,
        ExecutionProvider::Cuda,
        ExecutionProvider::CoreML,
        ExecutionProvider::DirectML,
        ExecutionProvider::Cpu,
    ]
    .into_iter()
    .filter(ExecutionProvider::is_available)
    .max_by_key(ExecutionProvider::priority)
    .unwrap_or(ExecutionProvider::Cpu)
}

/// A named map of input tensors, per spec §4.7.
pub type TensorMap = HashMap<String, ArrayD<f32>>;

/// Inference backend contract: no mutation of input tensors after return;
/// outputs are owned copies.
pub trait InferenceBackend: Send + Sync {
    fn run(&self, inputs: &TensorMap) -> SeparationResult<Vec<ArrayD<f32>>>;

    fn provider(&self) -> ExecutionProvider;
}

/// `tract-onnx` backed model, optimized and made runnable at load time.
pub struct TractBackend {
    model: tract_onnx::prelude::SimplePlan<
        tract_onnx::prelude::TypedFact,
        Box<dyn tract_onnx::prelude::TypedOp>,
        tract_onnx::prelude::Graph<tract_onnx::prelude::TypedFact, Box<dyn tract_onnx::prelude::TypedOp>>,
    >,
    input_order: Vec<String>,
    provider: ExecutionProvider,
}

impl TractBackend {
    pub fn load<P: AsRef<Path>>(model_path: P, input_order: Vec<String>) -> SeparationResult<Self> {
        use tract_onnx::prelude::*;

        let path = model_path.as_ref();
        if !path.exists() {
            return Err(SeparationError::ModelNotFound {
                path: path.display().to_string(),
            });
        }

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| SeparationError::ModelLoadFailed { reason: e.to_string() })?
            .into_optimized()
            .map_err(|e| SeparationError::ModelLoadFailed { reason: e.to_string() })?
            .into_runnable()
            .map_err(|e| SeparationError::ModelLoadFailed { reason: e.to_string() })?;

        log::info!(
            "loaded model {} with provider {:?}",
            path.display(),
            detect_best_provider()
        );

        Ok(Self {
            model,
            input_order,
            provider: detect_best_provider(),
        })
    }
}

impl InferenceBackend for TractBackend {
    fn run(&self, inputs: &TensorMap) -> SeparationResult<Vec<ArrayD<f32>>> {
        use tract_onnx::prelude::*;

        let tract_inputs: TVec<TValue> = self
            .input_order
            .iter()
            .map(|name| {
                let array = inputs.get(name).ok_or_else(|| SeparationError::InvalidInputShape {
                    expected: format!("input named \"{name}\""),
                    got: "missing".into(),
                })?;
                let tensor: Tensor = array.clone().into();
                Ok(tensor.into())
            })
            .collect::<SeparationResult<_>>()?;

        let outputs = self
            .model
            .run(tract_inputs)
            .map_err(|e| SeparationError::InferenceFailed { reason: e.to_string() })?;

        outputs
            .iter()
            .map(|output| {
                output
                    .to_array_view::<f32>()
                    .map(|view| view.to_owned())
                    .map_err(|e| SeparationError::InferenceFailed { reason: e.to_string() })
            })
            .collect()
    }

    fn provider(&self) -> ExecutionProvider {
        self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_is_always_available() {
        assert!(ExecutionProvider::Cpu.is_available());
        assert!(!ExecutionProvider::Cuda.is_available());
    }

    #[test]
    fn best_provider_falls_back_to_cpu() {
        assert_eq!(detect_best_provider(), ExecutionProvider::Cpu);
    }
}
