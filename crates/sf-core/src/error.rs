//! Crate-wide error taxonomy (spec §7).
//!
//! `NumericWarning` is deliberately not a variant here: the spec treats it
//! as a logged notice, never a returned error (a window-sum underflow is
//! handled by falling back to pass-through, not by failing the call).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SfError {
    /// Invalid options: margin=0, an out-of-range parameter, an empty
    /// model list. Surfaced synchronously before any processing begins.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing input file, missing model resource, decoder-open failure.
    #[error("resource error: {0}")]
    Resource(String),

    /// Inference backend failure, or a shape mismatch between configured
    /// and model-reported dimensions that cannot be auto-adjusted.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// A decoder read that failed transiently (not EOF). Callers should
    /// retry; this variant exists for code paths that give up after
    /// exhausting retries.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SfResult<T> = Result<T, SfError>;

/// Report a numeric warning (window-sum below `1e-10` at an output index,
/// etc.) without failing the current call, per spec §7.
#[inline]
pub fn numeric_warning(message: &str) {
    log::warn!("numeric warning: {message}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_message() {
        let err = SfError::Configuration("margin must be > 0".into());
        assert_eq!(err.to_string(), "configuration error: margin must be > 0");
    }
}
