//! Error taxonomy for the counting core.
//!
//! Per-frame failures are isolated to the frame that raised them; the
//! processor stays usable for the next frame. Configuration errors
//! (`UnsupportedMetric`, `UnsupportedMode`) are fatal at startup.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    /// Malformed box or other bad caller input. Aborts the current unit only.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Image dimensions the detectors cannot work with.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Unknown similarity metric name.
    #[error("unsupported matching metric: {0}")]
    UnsupportedMetric(String),

    /// Unknown counting mode name.
    #[error("unsupported counting mode: {0}")]
    UnsupportedMode(String),

    /// A computed metric left its legal range. Numerical guard, not an
    /// input error.
    #[error("metric invariant violated: {0}")]
    InvariantViolation(String),

    /// The matcher produced more than one match for the same index. This is
    /// a programming-contract failure and halts the frame.
    #[error("duplicate match left unchecked: {0}")]
    DuplicateMatchInvariant(String),

    /// A detector task returned an error the frame cannot recover from.
    #[error("detector failed: {0}")]
    DetectorFailed(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
