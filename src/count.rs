//! Per-frame package count statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::detection::types::BBox;

/// Running count for one resolved label within a single frame.
///
/// Created once per distinct label during aggregation and only ever grows;
/// a fresh set is produced for every processed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageCount {
    label: String,
    count: u32,
    boxes: Vec<BBox>,
    /// Raw decoded strings that contributed to this label, kept for
    /// traceability.
    descriptors: Vec<String>,
}

impl PackageCount {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            count: 0,
            boxes: Vec::new(),
            descriptors: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn boxes(&self) -> &[BBox] {
        &self.boxes
    }

    pub fn descriptors(&self) -> &[String] {
        &self.descriptors
    }

    /// Records one counted package: its box and the string that identified it.
    pub fn record(&mut self, package_box: BBox, descriptor: impl Into<String>) {
        self.count += 1;
        self.boxes.push(package_box);
        self.descriptors.push(descriptor.into());
    }
}

/// Everything one frame produced, in the shape the export and visualization
/// collaborators consume.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub frame_id: u64,
    pub timestamp: DateTime<Utc>,
    pub counts: Vec<PackageCount>,
    /// Package boxes that no identifier or text could be paired with.
    pub unmatched_packages: Vec<BBox>,
    /// Degradations observed while producing this frame (detector timeouts,
    /// failed decodes). Empty for a clean frame.
    pub diagnostics: Vec<String>,
}

impl FrameReport {
    /// Total packages counted across all labels.
    pub fn total(&self) -> u32 {
        self.counts.iter().map(PackageCount::count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> BBox {
        BBox::new(xmin, ymin, xmax, ymax).unwrap()
    }

    #[test]
    fn test_record_increments_and_appends() {
        let mut count = PackageCount::new("widget");
        count.record(bbox(0., 0., 10., 10.), "widget");
        count.record(bbox(20., 20., 30., 30.), "widgit");
        assert_eq!(count.count(), 2);
        assert_eq!(count.boxes().len(), 2);
        assert_eq!(count.descriptors(), &["widget", "widgit"]);
    }

    #[test]
    fn test_report_total_sums_labels() {
        let mut a = PackageCount::new("a");
        a.record(bbox(0., 0., 1., 1.), "a");
        let mut b = PackageCount::new("b");
        b.record(bbox(1., 1., 2., 2.), "b");
        b.record(bbox(2., 2., 3., 3.), "b");
        let report = FrameReport {
            frame_id: 1,
            timestamp: Utc::now(),
            counts: vec![a, b],
            unmatched_packages: Vec::new(),
            diagnostics: Vec::new(),
        };
        assert_eq!(report.total(), 3);
    }

    #[test]
    fn test_report_serializes() {
        let report = FrameReport {
            frame_id: 7,
            timestamp: Utc::now(),
            counts: vec![PackageCount::new("widget")],
            unmatched_packages: vec![bbox(0., 0., 5., 5.)],
            diagnostics: vec!["identifier detector timed out".to_string()],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"widget\""));
        assert!(json.contains("\"frame_id\":7"));
    }
}
