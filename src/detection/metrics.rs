//! Box similarity metrics used by the detection matcher.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::Serialize;

use crate::detection::types::BBox;
use crate::error::{Result, ScanError};

/// Numerical guard for the IoU range check.
const IOU_EPS: f32 = 1e-6;

/// Sentinel meaning "too far apart to ever be a valid match".
const MAX_DISTANCE: f32 = 1.0;

/// How two box sets are compared during matching. Higher similarity is
/// always better regardless of the metric chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
pub enum Metric {
    /// Intersection-over-union of the two boxes.
    Iou,
    /// One minus the leniency-bounded distance between box centers.
    CenterPoint,
}

impl FromStr for Metric {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "iou" => Ok(Metric::Iou),
            "centerpoint" => Ok(Metric::CenterPoint),
            other => Err(ScanError::UnsupportedMetric(other.to_string())),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Iou => write!(f, "iou"),
            Metric::CenterPoint => write!(f, "centerpoint"),
        }
    }
}

/// Intersection-over-union of two boxes.
///
/// Degenerate boxes produce zero overlap. The result is range-checked as a
/// guard against numerical drift.
pub fn iou(a: &BBox, b: &BBox) -> Result<f32> {
    if a.is_degenerate() || b.is_degenerate() {
        return Ok(0.);
    }
    let inter = a.intersection_area(b);
    if inter == 0. {
        return Ok(0.);
    }
    let ratio = inter / (a.area() + b.area() - inter);
    if !(0. ..=1. + IOU_EPS).contains(&ratio) {
        return Err(ScanError::InvariantViolation(format!(
            "iou {ratio} is outside [0, 1]"
        )));
    }
    Ok(ratio)
}

/// Euclidean distance between box centers, bounded by leniency.
///
/// Let `diag` be the smaller of the two box diagonals. The raw distance is
/// returned only while `distance / diag <= leniency_factor`; beyond that the
/// boxes are too far apart to ever be a valid match and the sentinel maximum
/// distance of 1.0 comes back instead. This keeps large, spatially distant
/// boxes out of centerpoint-based matching regardless of absolute distances.
pub fn center_distance(a: &BBox, b: &BBox, leniency_factor: f32) -> f32 {
    let diag = a.diagonal().min(b.diagonal());
    if diag <= 0. {
        return MAX_DISTANCE;
    }
    let (ax, ay) = a.center();
    let (bx, by) = b.center();
    let distance = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();
    if distance / diag <= leniency_factor {
        distance
    } else {
        MAX_DISTANCE
    }
}

/// Similarity in `[0, 1]` between two boxes under the selected metric.
pub fn similarity(metric: Metric, a: &BBox, b: &BBox, leniency_factor: f32) -> Result<f32> {
    match metric {
        Metric::Iou => iou(a, b),
        Metric::CenterPoint => Ok((1. - center_distance(a, b, leniency_factor)).clamp(0., 1.)),
    }
}
