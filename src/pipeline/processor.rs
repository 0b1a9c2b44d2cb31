//! The per-frame count processor.
//!
//! One frame flows one direction: detector tasks run concurrently, their box
//! sets are joined and normalized into a single coordinate space, matching
//! pairs packages with identifiers, categorization resolves labels, and
//! aggregation folds the pairs into per-label counts. The frame is fully
//! retired before the next begins.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use image::{imageops, RgbImage};
use tracing::{debug, info, warn};

use crate::categorize::{Categories, TextCategorizer};
use crate::config::Params;
use crate::count::{FrameReport, PackageCount};
use crate::detection::detector::{Detector, IdentifierDetector, TextDetector, TextDetections};
use crate::detection::matcher::{match_detections, MatchConfig, MatchOutcome};
use crate::detection::types::{CoordSpace, DecodedCode, DetectionSet};
use crate::error::{Result, ScanError};
use crate::pipeline::task::{JoinOutcome, Task};
use crate::pipeline::{CountMode, FrameStage};

/// Output of the identifier-or-text detector task, before labels are
/// resolved.
enum Predictions {
    /// Identifier boxes with the decode result of each box's crop.
    Codes(DetectionSet, Vec<Option<DecodedCode>>),
    /// Text boxes with their raw OCR strings.
    Texts(TextDetections),
}

/// Drives frames through detection, matching, categorization and
/// aggregation. The long-lived detector objects are shared with the
/// per-frame tasks and reused across frames.
pub struct CountProcessor {
    package_detector: Arc<dyn Detector>,
    identifier_detector: Option<Arc<dyn IdentifierDetector>>,
    text_detector: Option<Arc<dyn TextDetector>>,
    categorizer: Arc<TextCategorizer>,
    params: Params,
    stage: FrameStage,
    next_frame_id: u64,
}

impl CountProcessor {
    /// Builds a processor, checking that the configured mode has its
    /// detector and that the categorizer was built for the configured
    /// grouping. Both are startup configuration errors, not per-frame
    /// conditions.
    pub fn new(
        package_detector: Arc<dyn Detector>,
        identifier_detector: Option<Arc<dyn IdentifierDetector>>,
        text_detector: Option<Arc<dyn TextDetector>>,
        categorizer: TextCategorizer,
        params: Params,
    ) -> Result<Self> {
        match params.mode {
            CountMode::Identifier if identifier_detector.is_none() => {
                return Err(ScanError::UnsupportedMode(
                    "identifier mode configured without an identifier detector".to_string(),
                ));
            }
            CountMode::Text if text_detector.is_none() => {
                return Err(ScanError::UnsupportedMode(
                    "text mode configured without a text detector".to_string(),
                ));
            }
            _ => {}
        }
        if categorizer.mode() != params.categorize_mode {
            return Err(ScanError::UnsupportedMode(format!(
                "categorizer grouping {:?} disagrees with configured {:?}",
                categorizer.mode(),
                params.categorize_mode
            )));
        }
        Ok(Self {
            package_detector,
            identifier_detector,
            text_detector,
            categorizer: Arc::new(categorizer),
            params,
            stage: FrameStage::Idle,
            next_frame_id: 0,
        })
    }

    pub fn stage(&self) -> FrameStage {
        self.stage
    }

    /// Processes one frame into a count report.
    ///
    /// Detector trouble (timeouts, panics, backend errors) degrades to empty
    /// detections for that detector and is noted in the report diagnostics;
    /// the frame still completes. Only internal invariant violations and a
    /// malformed frame fail the frame, and a failed frame leaves the
    /// processor ready for the next one.
    pub fn process_frame(&mut self, image: &RgbImage) -> Result<FrameReport> {
        let frame_id = self.next_frame_id;
        self.next_frame_id += 1;

        match self.run_frame(frame_id, image) {
            Ok(report) => {
                self.stage = FrameStage::Done;
                info!(
                    frame_id,
                    labels = report.counts.len(),
                    total = report.total(),
                    "frame counted"
                );
                Ok(report)
            }
            Err(error) => {
                self.stage = FrameStage::Idle;
                warn!(frame_id, %error, "frame failed");
                Err(error)
            }
        }
    }

    fn run_frame(&mut self, frame_id: u64, image: &RgbImage) -> Result<FrameReport> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ScanError::InvalidImage(format!(
                "frame has no pixels ({width}x{height})"
            )));
        }

        let mut diagnostics = Vec::new();
        let timeout = self.params.join_timeout;

        // Each task gets its own read-only view of the frame.
        self.stage = FrameStage::DetectingConcurrently;
        let frame = Arc::new(image.clone());
        let package_task = self.spawn_package_task(frame.clone());
        let prediction_task = self.spawn_prediction_task(frame);

        let packages = match join_detector(package_task, timeout, "package", &mut diagnostics) {
            Some(set) => set.to_pixels(width, height)?,
            None => DetectionSet::empty(CoordSpace::Pixel),
        };
        let predictions = match join_detector(prediction_task, timeout, "prediction", &mut diagnostics)
        {
            Some(predictions) => predictions,
            None => match self.params.mode {
                CountMode::Identifier => {
                    Predictions::Codes(DetectionSet::empty(CoordSpace::Pixel), Vec::new())
                }
                CountMode::Text => Predictions::Texts(TextDetections::empty(CoordSpace::Pixel)),
            },
        };
        debug!(frame_id, packages = packages.len(), "detectors joined");

        // All matching happens in the frame's pixel space.
        self.stage = FrameStage::Matching;
        let match_config = MatchConfig {
            metric: self.params.metric,
            leniency_factor: self.params.leniency_factor,
            group_extras: self.params.group_extras,
        };

        let (outcome, labels) = match predictions {
            Predictions::Codes(boxes, codes) => {
                let boxes = boxes.to_pixels(width, height)?;
                let outcome = match_detections(&packages, &boxes, &match_config)?;
                (outcome, LabelSource::Codes(codes))
            }
            Predictions::Texts(texts) => {
                // Categorization only needs the strings, so it runs
                // concurrently with matching; the stage flips once the
                // matching work is done and only the join remains.
                let categorizer = self.categorizer.clone();
                let raw_texts = texts.texts.clone();
                let categorize_task = Task::spawn(move || categorizer.categorize(&raw_texts));

                let boxes = texts.boxes.to_pixels(width, height)?;
                let outcome = match_detections(&packages, &boxes, &match_config)?;

                self.stage = FrameStage::Categorizing;
                let categories = match categorize_task.join(timeout) {
                    JoinOutcome::Completed(categories) => categories,
                    JoinOutcome::TimedOut => {
                        warn!(frame_id, "categorizer timed out");
                        diagnostics.push("categorizer timed out".to_string());
                        Categories::default()
                    }
                    JoinOutcome::Panicked => {
                        warn!(frame_id, "categorizer panicked");
                        diagnostics.push("categorizer panicked".to_string());
                        Categories::default()
                    }
                };
                (outcome, LabelSource::Categories(categories, texts.texts))
            }
        };

        self.stage = FrameStage::Aggregating;
        Ok(aggregate(
            frame_id,
            &packages,
            &outcome,
            &labels,
            diagnostics,
        ))
    }

    fn spawn_package_task(&self, frame: Arc<RgbImage>) -> Task<anyhow::Result<DetectionSet>> {
        let detector = self.package_detector.clone();
        let threshold = self.params.acceptance_score;
        Task::spawn(move || {
            detector
                .detect(&frame)
                .map(|set| set.filter_by_score(threshold))
        })
    }

    fn spawn_prediction_task(&self, frame: Arc<RgbImage>) -> Task<anyhow::Result<Predictions>> {
        let threshold = self.params.acceptance_score;
        match self.params.mode {
            CountMode::Identifier => {
                let detector = self
                    .identifier_detector
                    .clone()
                    .expect("checked at construction");
                Task::spawn(move || {
                    // Crops are taken from the frame, so the boxes must be
                    // in its pixel space before decoding.
                    let (width, height) = frame.dimensions();
                    let boxes = detector
                        .detect(&frame)?
                        .filter_by_score(threshold)
                        .to_pixels(width, height)?;
                    let codes = decode_boxes(detector.as_ref(), &frame, &boxes)?;
                    Ok(Predictions::Codes(boxes, codes))
                })
            }
            CountMode::Text => {
                let detector = self
                    .text_detector
                    .clone()
                    .expect("checked at construction");
                Task::spawn(move || {
                    let texts = detector.detect_text(&frame)?.filter_by_score(threshold);
                    Ok(Predictions::Texts(texts))
                })
            }
        }
    }
}

/// Joins a detector task, degrading every failure shape to "no detections".
fn join_detector<T: Send + 'static>(
    task: Task<anyhow::Result<T>>,
    timeout: Duration,
    name: &str,
    diagnostics: &mut Vec<String>,
) -> Option<T> {
    match task.join(timeout) {
        JoinOutcome::Completed(Ok(value)) => Some(value),
        JoinOutcome::Completed(Err(error)) => {
            warn!(detector = name, %error, "detector failed");
            diagnostics.push(format!("{name} detector failed: {error}"));
            None
        }
        JoinOutcome::TimedOut => {
            warn!(detector = name, ?timeout, "detector timed out");
            diagnostics.push(format!("{name} detector timed out"));
            None
        }
        JoinOutcome::Panicked => {
            warn!(detector = name, "detector panicked");
            diagnostics.push(format!("{name} detector panicked"));
            None
        }
    }
}

/// Decodes the crop under each identifier box. Only the top decode of each
/// crop is kept, since a crop holds at most one code.
fn decode_boxes(
    detector: &dyn IdentifierDetector,
    frame: &RgbImage,
    boxes: &DetectionSet,
) -> anyhow::Result<Vec<Option<DecodedCode>>> {
    let (width, height) = frame.dimensions();
    let mut codes = Vec::with_capacity(boxes.len());
    for detection in boxes.detections() {
        let b = &detection.bbox;
        let x = (b.xmin().max(0.) as u32).min(width.saturating_sub(1));
        let y = (b.ymin().max(0.) as u32).min(height.saturating_sub(1));
        let w = (b.width().max(0.) as u32).min(width - x);
        let h = (b.height().max(0.) as u32).min(height - y);
        if w == 0 || h == 0 {
            codes.push(None);
            continue;
        }
        let crop = imageops::crop_imm(frame, x, y, w, h).to_image();
        codes.push(detector.decode(&crop)?.into_iter().next());
    }
    Ok(codes)
}

/// Where a matched prediction's label comes from.
enum LabelSource {
    Codes(Vec<Option<DecodedCode>>),
    Categories(Categories, Vec<String>),
}

impl LabelSource {
    /// Resolved label and raw descriptor for prediction `index`; `None`
    /// drops the match from the counts.
    fn label_of(&self, index: usize) -> Option<(&str, &str)> {
        match self {
            LabelSource::Codes(codes) => codes.get(index).and_then(|c| c.as_ref()).and_then(|c| {
                (!c.text.is_empty()).then_some((c.text.as_str(), c.text.as_str()))
            }),
            LabelSource::Categories(categories, texts) => categories
                .label_of(index)
                .map(|label| (label, texts[index].as_str())),
        }
    }
}

/// Folds match pairs into per-label counts. Matches whose prediction never
/// resolved to a label do not count as packages.
fn aggregate(
    frame_id: u64,
    packages: &DetectionSet,
    outcome: &MatchOutcome,
    labels: &LabelSource,
    diagnostics: Vec<String>,
) -> FrameReport {
    let mut counts: Vec<PackageCount> = Vec::new();
    for &(dti, gti) in &outcome.matches {
        let Some((label, descriptor)) = labels.label_of(dti) else {
            debug!(frame_id, prediction = dti, "match dropped: no label");
            continue;
        };
        let package_box = *packages.bbox(gti).expect("matched index in range");
        match counts.iter().position(|c| c.label() == label) {
            Some(at) => counts[at].record(package_box, descriptor),
            None => {
                let mut count = PackageCount::new(label);
                count.record(package_box, descriptor);
                counts.push(count);
            }
        }
    }

    let unmatched_packages = outcome
        .unmatched_ground_truths
        .iter()
        .filter_map(|&gti| packages.bbox(gti).copied())
        .collect();

    FrameReport {
        frame_id,
        timestamp: Utc::now(),
        counts,
        unmatched_packages,
        diagnostics,
    }
}
