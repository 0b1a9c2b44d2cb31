//! Detection data model, similarity metrics and the box matcher.

pub mod detector;
pub mod matcher;
pub mod metrics;
pub mod types;

pub use detector::{Detector, Dictionary, IdentifierDetector, SpellingSource, TextDetector};
pub use matcher::{match_detections, MatchConfig, MatchOutcome};
pub use metrics::Metric;
pub use types::{BBox, CoordSpace, DecodedCode, Detection, DetectionSet};
