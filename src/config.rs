//! Runtime parameters for the counting pipeline.
//!
//! `Args` carries the command-line surface (the capture application owns the
//! rest of the CLI); `Params` is the resolved form the processor consumes.

use std::time::Duration;

use clap::Parser;

use crate::categorize::CategorizeMode;
use crate::detection::metrics::Metric;
use crate::pipeline::CountMode;

#[derive(Parser, Debug, Clone)]
#[command(about = "Shelf package counting core")]
pub struct Args {
    /// Score threshold below which detections are discarded.
    #[arg(long, default_value_t = 0.10)]
    pub acceptance_score: f32,

    /// Box similarity metric used by the matcher.
    #[arg(long, value_enum, default_value = "iou")]
    pub metric: Metric,

    /// Center-distance leniency in units of the smaller box diagonal.
    /// Only meaningful with the centerpoint metric.
    #[arg(long, default_value_t = 1.0)]
    pub leniency_factor: f32,

    /// Identifying detector to pair packages with.
    #[arg(long, value_enum, default_value = "identifier")]
    pub mode: CountMode,

    /// How OCR strings are grouped into labels (text mode).
    #[arg(long, value_enum, default_value = "common-text")]
    pub categorize_mode: CategorizeMode,

    /// Upper bound on waiting for a detector task, per join.
    #[arg(long, default_value_t = 700)]
    pub join_timeout_ms: u64,

    /// Also report unmatched predictions grouped under the ground truth
    /// they overlap.
    #[arg(long)]
    pub group_extras: bool,
}

impl Args {
    pub fn params(&self) -> Params {
        Params {
            acceptance_score: self.acceptance_score,
            metric: self.metric,
            leniency_factor: self.leniency_factor,
            mode: self.mode,
            categorize_mode: self.categorize_mode,
            join_timeout: Duration::from_millis(self.join_timeout_ms),
            group_extras: self.group_extras,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Params {
    pub acceptance_score: f32,
    pub metric: Metric,
    pub leniency_factor: f32,
    pub mode: CountMode,
    pub categorize_mode: CategorizeMode,
    pub join_timeout: Duration,
    pub group_extras: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            acceptance_score: 0.10,
            metric: Metric::Iou,
            leniency_factor: 1.0,
            mode: CountMode::Identifier,
            categorize_mode: CategorizeMode::CommonText,
            join_timeout: Duration::from_millis(700),
            group_extras: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_clap() {
        let args = Args::parse_from(["shelf-count"]);
        let params = args.params();
        assert_eq!(params.metric, Metric::Iou);
        assert_eq!(params.mode, CountMode::Identifier);
        assert_eq!(params.join_timeout, Duration::from_millis(700));
        assert!(!params.group_extras);
    }

    #[test]
    fn test_overrides_parse() {
        let args = Args::parse_from([
            "shelf-count",
            "--metric",
            "center-point",
            "--mode",
            "text",
            "--categorize-mode",
            "longest-match",
            "--join-timeout-ms",
            "250",
            "--group-extras",
        ]);
        let params = args.params();
        assert_eq!(params.metric, Metric::CenterPoint);
        assert_eq!(params.mode, CountMode::Text);
        assert_eq!(params.categorize_mode, CategorizeMode::LongestMatch);
        assert_eq!(params.join_timeout, Duration::from_millis(250));
        assert!(params.group_extras);
    }
}
