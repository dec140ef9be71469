//! Audio file I/O: the pull-based source adapter (spec §4.1) and the
//! peak-normalized WAV sink (spec §4.8).

mod sink;
mod source;

pub use sink::write_wav;
pub use source::{AudioSource, ReadResult, StreamInfo, SymphoniaSource};
