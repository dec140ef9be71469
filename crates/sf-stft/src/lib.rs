//! STFT/ISTFT engine (spec §4.2): the shared analysis/synthesis core used
//! by every separator variant.

mod engine;

pub use engine::{hann_window, reflect_index, reflect_pad, StftEngine};
