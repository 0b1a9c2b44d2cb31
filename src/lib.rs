//! Shelf package counting core.
//!
//! Takes camera frames and produces per-shelf package counts by running
//! independent detectors (packages, barcode/QR identifiers, free text)
//! concurrently on the same frame, reconciling their box sets into a 1:1
//! package-to-identifier matching, collapsing noisy OCR output into stable
//! labels, and folding the matches into per-label counts.
//!
//! Camera capture, model inference, decoding backends and report export are
//! external collaborators behind the traits in [`detection::detector`].

pub mod categorize; // OCR string -> stable label grouping
pub mod config; // pipeline parameters
pub mod count; // per-frame count statistics
pub mod detection; // box types, metrics, matcher, collaborator traits
pub mod error;
pub mod pipeline; // concurrent per-frame orchestration

pub use crate::categorize::{Categories, CategorizeMode, TextCategorizer};
pub use crate::config::{Args, Params};
pub use crate::count::{FrameReport, PackageCount};
pub use crate::detection::{
    match_detections, BBox, CoordSpace, DecodedCode, Detection, DetectionSet, Detector,
    Dictionary, IdentifierDetector, MatchConfig, MatchOutcome, Metric, SpellingSource,
    TextDetector,
};
pub use crate::error::{Result, ScanError};
pub use crate::pipeline::{CountMode, CountProcessor, FrameStage, JoinOutcome, Task};
