//! Core detection data types shared by the matcher and the pipeline.

use serde::Serialize;

use crate::error::{Result, ScanError};

/// Coordinate space a box set was produced in.
///
/// The detectors do not agree on a space (the identifier model emits pixel
/// boxes, the OCR backend emits unit-normalized boxes), so every set carries
/// its space and the matcher refuses mixed-space comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoordSpace {
    /// Pixel coordinates relative to the source frame.
    Pixel,
    /// Coordinates normalized to `[0, 1]` by the frame dimensions.
    Normalized,
}

/// An axis-aligned bounding box `[xmin, ymin, xmax, ymax]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BBox {
    xmin: f32,
    ymin: f32,
    xmax: f32,
    ymax: f32,
}

impl BBox {
    /// Builds a box, rejecting non-finite or inverted coordinates.
    ///
    /// Zero-width or zero-height boxes are representable but degenerate:
    /// they never overlap anything and never match.
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Result<Self> {
        let coords = [xmin, ymin, xmax, ymax];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(ScanError::InvalidInput(format!(
                "box coordinates must be finite, got {coords:?}"
            )));
        }
        if xmin > xmax || ymin > ymax {
            return Err(ScanError::InvalidInput(format!(
                "box corners are inverted: [{xmin}, {ymin}, {xmax}, {ymax}]"
            )));
        }
        Ok(Self {
            xmin,
            ymin,
            xmax,
            ymax,
        })
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmax
    }

    pub fn ymax(&self) -> f32 {
        self.ymax
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Center point `(cx, cy)`.
    pub fn center(&self) -> (f32, f32) {
        (
            self.xmin + self.width() / 2.,
            self.ymin + self.height() / 2.,
        )
    }

    /// Corner-to-corner diagonal length.
    pub fn diagonal(&self) -> f32 {
        (self.width() * self.width() + self.height() * self.height()).sqrt()
    }

    /// A degenerate box has no drawable area and is treated as having zero
    /// overlap with everything.
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0. || self.height() <= 0.
    }

    pub fn intersection_area(&self, other: &BBox) -> f32 {
        let l = self.xmin.max(other.xmin);
        let r = self.xmax.min(other.xmax);
        let t = self.ymin.max(other.ymin);
        let b = self.ymax.min(other.ymax);
        (r - l).max(0.) * (b - t).max(0.)
    }

    fn scale(&self, sx: f32, sy: f32) -> Self {
        Self {
            xmin: self.xmin * sx,
            ymin: self.ymin * sy,
            xmax: self.xmax * sx,
            ymax: self.ymax * sy,
        }
    }
}

/// One detector output: a box, its confidence and an opaque class label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BBox,
    pub score: f32,
    pub label: u32,
}

/// An ordered sequence of detections in one coordinate space.
///
/// Identity is positional: the matcher and the categorizer refer to
/// detections by index into this set, so order must stay stable once the
/// set leaves the detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSet {
    detections: Vec<Detection>,
    space: CoordSpace,
}

impl DetectionSet {
    pub fn new(detections: Vec<Detection>, space: CoordSpace) -> Self {
        Self { detections, space }
    }

    pub fn empty(space: CoordSpace) -> Self {
        Self {
            detections: Vec::new(),
            space,
        }
    }

    pub fn space(&self) -> CoordSpace {
        self.space
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn get(&self, index: usize) -> Option<&Detection> {
        self.detections.get(index)
    }

    pub fn bbox(&self, index: usize) -> Option<&BBox> {
        self.detections.get(index).map(|d| &d.bbox)
    }

    /// Drops detections scoring below `threshold`, preserving order.
    pub fn filter_by_score(self, threshold: f32) -> Self {
        Self {
            detections: self
                .detections
                .into_iter()
                .filter(|d| d.score >= threshold)
                .collect(),
            space: self.space,
        }
    }

    /// Converts a normalized set into pixel coordinates of a
    /// `width` x `height` frame. A pixel set passes through unchanged.
    pub fn to_pixels(self, width: u32, height: u32) -> Result<Self> {
        match self.space {
            CoordSpace::Pixel => Ok(self),
            CoordSpace::Normalized => {
                if width == 0 || height == 0 {
                    return Err(ScanError::InvalidImage(format!(
                        "cannot scale boxes to a {width}x{height} frame"
                    )));
                }
                Ok(Self {
                    detections: self
                        .detections
                        .into_iter()
                        .map(|d| Detection {
                            bbox: d.bbox.scale(width as f32, height as f32),
                            ..d
                        })
                        .collect(),
                    space: CoordSpace::Pixel,
                })
            }
        }
    }
}

/// A decoded barcode or QR code, mirroring the decoder backend's result
/// surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedCode {
    pub text: String,
    pub format: String,
    pub content_type: String,
}
