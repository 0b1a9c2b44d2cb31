//! Boundary traits for the external detector collaborators.
//!
//! Model loading, tensor preprocessing and the concrete neural / OCR /
//! barcode backends live behind these traits. The counting core only ever
//! sees box sets, scores and decoded strings.
//!
//! Implementations must declare the coordinate space of the boxes they
//! return via `DetectionSet::space` and be safe to call concurrently from
//! the per-frame detector tasks.

use image::RgbImage;

use crate::detection::types::{DecodedCode, DetectionSet};

/// Detects package boxes in a frame.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> anyhow::Result<DetectionSet>;
}

/// Detects barcode/QR boxes and decodes their content from a cropped view.
///
/// `decode` receives the crop of a single detected box; zero results is a
/// valid answer (no decodable code in the crop).
pub trait IdentifierDetector: Detector {
    fn decode(&self, crop: &RgbImage) -> anyhow::Result<Vec<DecodedCode>>;
}

/// Detected text regions plus their decoded strings, index-aligned.
#[derive(Debug, Clone)]
pub struct TextDetections {
    pub boxes: DetectionSet,
    pub texts: Vec<String>,
}

impl TextDetections {
    pub fn empty(space: crate::detection::types::CoordSpace) -> Self {
        Self {
            boxes: DetectionSet::empty(space),
            texts: Vec::new(),
        }
    }

    /// Drops box/text pairs scoring below `threshold`, keeping the two
    /// sequences index-aligned.
    pub fn filter_by_score(self, threshold: f32) -> Self {
        let space = self.boxes.space();
        let (detections, texts) = self
            .boxes
            .detections()
            .iter()
            .cloned()
            .zip(self.texts)
            .filter(|(d, _)| d.score >= threshold)
            .unzip();
        Self {
            boxes: DetectionSet::new(detections, space),
            texts,
        }
    }
}

/// Detects and reads free text in a frame.
pub trait TextDetector: Send + Sync {
    fn detect_text(&self, image: &RgbImage) -> anyhow::Result<TextDetections>;
}

/// Word lookup consumed by the categorizer's longest-match mode.
pub trait Dictionary: Send + Sync {
    fn is_valid_word(&self, word: &str) -> bool;
}

/// Spelling suggestions for words the dictionary does not recognize,
/// ordered best-first.
pub trait SpellingSource: Send + Sync {
    fn suggest(&self, word: &str) -> Vec<String>;
}
