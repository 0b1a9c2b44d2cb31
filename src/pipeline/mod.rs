//! Per-frame orchestration: concurrent detector tasks, matching,
//! categorization and count aggregation.

pub mod processor;
pub mod task;

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::Serialize;

use crate::error::ScanError;

pub use processor::CountProcessor;
pub use task::{JoinOutcome, Task};

/// Which identifying detector runs alongside package detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
pub enum CountMode {
    /// Pair packages with barcode/QR boxes and their decoded content.
    Identifier,
    /// Pair packages with free-text boxes and categorized OCR strings.
    Text,
}

impl FromStr for CountMode {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, ScanError> {
        match s.to_ascii_lowercase().as_str() {
            "identifier" => Ok(CountMode::Identifier),
            "text" => Ok(CountMode::Text),
            other => Err(ScanError::UnsupportedMode(other.to_string())),
        }
    }
}

impl fmt::Display for CountMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountMode::Identifier => write!(f, "identifier"),
            CountMode::Text => write!(f, "text"),
        }
    }
}

/// Where a frame currently is in its one-directional flow. Each frame is
/// fully retired before the next begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameStage {
    Idle,
    DetectingConcurrently,
    Matching,
    Categorizing,
    Aggregating,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_mode_parsing() {
        assert_eq!("identifier".parse::<CountMode>().unwrap(), CountMode::Identifier);
        assert_eq!("Text".parse::<CountMode>().unwrap(), CountMode::Text);
        assert!(matches!(
            "lidar".parse::<CountMode>(),
            Err(ScanError::UnsupportedMode(_))
        ));
    }
}
