//! Progress reporting: the only suspension points the orchestrator
//! exposes are between chunks and at blocking decoder/inference calls
//! (spec §5); this wraps `sf_separate::SeparationProgress` into a
//! CLI-facing event type.

use sf_separate::SeparationProgress;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    pub ratio: f32,
    pub model_index: usize,
    pub model_count: usize,
    pub chunk_index: usize,
    pub chunk_count: usize,
}

impl From<SeparationProgress> for ProgressEvent {
    fn from(p: SeparationProgress) -> Self {
        Self {
            ratio: p.ratio,
            model_index: p.model_index,
            model_count: p.model_count,
            chunk_index: p.chunk_index,
            chunk_count: p.chunk_count,
        }
    }
}

impl ProgressEvent {
    pub fn single_model(chunk_index: usize, chunk_count: usize) -> Self {
        SeparationProgress::new(0, 1, chunk_index, chunk_count).into()
    }
}

pub type ProgressSink<'a> = &'a mut dyn FnMut(ProgressEvent);
