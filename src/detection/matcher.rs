//! Greedy bipartite matching of prediction boxes to ground-truth boxes.
//!
//! Ground truths are the package boxes; predictions are the identifier or
//! text boxes being paired with them. Each ground truth greedily claims its
//! best-scoring prediction, and duplicate claims are resolved by displacing
//! the weaker match to its next-best candidate. The result is a maximal 1:1
//! matching, not the globally optimal assignment: package boxes dominate
//! their identifiers in IoU without close ties, so a full Hungarian solve
//! buys nothing at per-frame rates.

use ndarray::Array2;
use tracing::trace;

use crate::detection::metrics::{similarity, Metric};
use crate::detection::types::DetectionSet;
use crate::error::{Result, ScanError};

/// Matching knobs. `leniency_factor` only applies to the centerpoint metric.
#[derive(Debug, Clone, Copy)]
pub struct MatchConfig {
    pub metric: Metric,
    pub leniency_factor: f32,
    /// When set, every prediction with nonzero similarity to a ground truth
    /// is reported under that ground truth's position, matched or not.
    pub group_extras: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            metric: Metric::Iou,
            leniency_factor: 1.,
            group_extras: false,
        }
    }
}

/// Result of one matching pass. Index pairs are `(prediction, ground_truth)`
/// and each index appears in at most one pair. The unmatched lists are
/// derived from the pairs, never maintained separately.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    pub matches: Vec<(usize, usize)>,
    /// Per-prediction similarity of the match it ended up in, zero if
    /// unmatched. Same length as the prediction set.
    pub matched_scores: Vec<f32>,
    pub unmatched_predictions: Vec<usize>,
    pub unmatched_ground_truths: Vec<usize>,
    /// Per-ground-truth predictions with nonzero similarity, populated only
    /// when `group_extras` is on.
    pub grouped_extras: Vec<Vec<usize>>,
}

impl MatchOutcome {
    fn empty(n_ground_truths: usize, n_predictions: usize) -> Self {
        Self {
            matches: Vec::new(),
            matched_scores: vec![0.; n_predictions],
            unmatched_predictions: (0..n_predictions).collect(),
            unmatched_ground_truths: (0..n_ground_truths).collect(),
            grouped_extras: Vec::new(),
        }
    }

    /// Ground truth matched to `prediction`, if any.
    pub fn ground_truth_of(&self, prediction: usize) -> Option<usize> {
        self.matches
            .iter()
            .find(|(p, _)| *p == prediction)
            .map(|&(_, g)| g)
    }
}

/// Matches `predictions` to `ground_truths` under `config`.
///
/// Both sets must live in the same coordinate space; comparing a pixel set
/// against a normalized set would silently match nothing and is refused
/// instead.
pub fn match_detections(
    ground_truths: &DetectionSet,
    predictions: &DetectionSet,
    config: &MatchConfig,
) -> Result<MatchOutcome> {
    if ground_truths.space() != predictions.space() {
        return Err(ScanError::InvalidInput(format!(
            "cannot match boxes across coordinate spaces ({:?} vs {:?})",
            ground_truths.space(),
            predictions.space()
        )));
    }

    let n = ground_truths.len();
    let m = predictions.len();
    if n == 0 || m == 0 {
        return Ok(MatchOutcome::empty(n, m));
    }

    let mut grid = Array2::<f32>::zeros((n, m));
    // claims[p] = (ground truth, similarity) of the match currently holding
    // prediction p. Keying by prediction makes a duplicate claim
    // unrepresentable while a match is being placed.
    let mut claims: Vec<Option<(usize, f32)>> = vec![None; m];
    let mut grouped_extras = Vec::new();

    for (gti, gt) in ground_truths.detections().iter().enumerate() {
        for (dti, dt) in predictions.detections().iter().enumerate() {
            grid[[gti, dti]] =
                similarity(config.metric, &gt.bbox, &dt.bbox, config.leniency_factor)?;
        }
        if config.group_extras {
            grouped_extras.push(
                (0..m)
                    .filter(|&dti| grid[[gti, dti]] != 0.)
                    .collect::<Vec<_>>(),
            );
        }
        resolve(&mut grid, &mut claims, gti);
    }

    build_outcome(claims, grouped_extras, n, m)
}

/// Assigns `gti` to its best remaining candidate, displacing weaker existing
/// claims. Runs the displacement chain as an explicit worklist instead of
/// recursing: every iteration either places one claim or zeroes one grid
/// cell, and zeroed cells are never revisited, so the loop is bounded by the
/// number of nonzero cells. Displaced ground truths are rematched in the
/// order they were displaced.
fn resolve(grid: &mut Array2<f32>, claims: &mut [Option<(usize, f32)>], gti: usize) {
    let mut pending = vec![gti];
    while let Some(gti) = pending.pop() {
        let Some((dti, score)) = best_candidate(grid, gti) else {
            continue;
        };
        match claims[dti] {
            None => {
                claims[dti] = Some((gti, score));
            }
            Some((held_by, held_score)) => {
                if score > held_score {
                    // The new claim wins; the previous holder goes back on
                    // the worklist to try its next-best candidate.
                    claims[dti] = Some((gti, score));
                    grid[[held_by, dti]] = 0.;
                    trace!(prediction = dti, from = held_by, to = gti, "match displaced");
                    pending.push(held_by);
                } else {
                    // The existing claim stands; this ground truth retries
                    // without the contested prediction.
                    grid[[gti, dti]] = 0.;
                    pending.push(gti);
                }
            }
        }
    }
}

/// Best nonzero candidate in row `gti`, as `(prediction, similarity)`.
/// Ties go to the lowest prediction index.
fn best_candidate(grid: &Array2<f32>, gti: usize) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (dti, &score) in grid.row(gti).iter().enumerate() {
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((dti, score));
        }
    }
    best.filter(|&(_, score)| score > 0.)
}

fn build_outcome(
    claims: Vec<Option<(usize, f32)>>,
    grouped_extras: Vec<Vec<usize>>,
    n: usize,
    m: usize,
) -> Result<MatchOutcome> {
    let mut matches = Vec::new();
    let mut matched_scores = vec![0.; m];
    let mut gt_seen = vec![false; n];

    for (dti, claim) in claims.iter().enumerate() {
        if let Some((gti, score)) = claim {
            // One claim slot per prediction rules out duplicate predictions;
            // a ground truth held by two predictions would be a bug in the
            // displacement chain and must not pass silently.
            if gt_seen[*gti] {
                return Err(ScanError::DuplicateMatchInvariant(format!(
                    "ground truth {gti} holds more than one prediction"
                )));
            }
            gt_seen[*gti] = true;
            matches.push((dti, *gti));
            matched_scores[dti] = *score;
        }
    }

    let unmatched_predictions = (0..m).filter(|&dti| claims[dti].is_none()).collect();
    let unmatched_ground_truths = (0..n).filter(|&gti| !gt_seen[gti]).collect();

    Ok(MatchOutcome {
        matches,
        matched_scores,
        unmatched_predictions,
        unmatched_ground_truths,
        grouped_extras,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::{BBox, CoordSpace, Detection, DetectionSet};

    fn boxes(coords: &[[f32; 4]]) -> DetectionSet {
        let detections = coords
            .iter()
            .map(|c| Detection {
                bbox: BBox::new(c[0], c[1], c[2], c[3]).unwrap(),
                score: 1.,
                label: 0,
            })
            .collect();
        DetectionSet::new(detections, CoordSpace::Pixel)
    }

    #[test]
    fn test_empty_inputs_yield_empty_outcome() {
        let gts = boxes(&[[0., 0., 10., 10.]]);
        let none = boxes(&[]);
        let outcome = match_detections(&gts, &none, &MatchConfig::default()).unwrap();
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.unmatched_ground_truths, vec![0]);

        let outcome = match_detections(&none, &gts, &MatchConfig::default()).unwrap();
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.unmatched_predictions, vec![0]);
    }

    #[test]
    fn test_single_clear_match() {
        let gts = boxes(&[[0., 0., 10., 10.], [20., 20., 30., 30.]]);
        let preds = boxes(&[[1., 1., 9., 9.]]);
        let outcome = match_detections(&gts, &preds, &MatchConfig::default()).unwrap();
        assert_eq!(outcome.matches, vec![(0, 0)]);
        assert_eq!(outcome.unmatched_ground_truths, vec![1]);
        assert!(outcome.unmatched_predictions.is_empty());
        assert!(outcome.matched_scores[0] > 0.);
    }

    #[test]
    fn test_no_repeated_indices_in_matches() {
        // Overlapping grid of boxes fighting over two predictions.
        let gts = boxes(&[
            [0., 0., 10., 10.],
            [2., 2., 12., 12.],
            [4., 4., 14., 14.],
        ]);
        let preds = boxes(&[[1., 1., 11., 11.], [3., 3., 13., 13.]]);
        let outcome = match_detections(&gts, &preds, &MatchConfig::default()).unwrap();

        let mut preds_seen: Vec<usize> = outcome.matches.iter().map(|&(p, _)| p).collect();
        let mut gts_seen: Vec<usize> = outcome.matches.iter().map(|&(_, g)| g).collect();
        preds_seen.sort_unstable();
        preds_seen.dedup();
        gts_seen.sort_unstable();
        gts_seen.dedup();
        assert_eq!(preds_seen.len(), outcome.matches.len());
        assert_eq!(gts_seen.len(), outcome.matches.len());
    }

    #[test]
    fn test_completeness_with_nonzero_candidates() {
        // Every ground truth overlaps at least one prediction and there are
        // enough predictions to go around; none may stay unmatched.
        let gts = boxes(&[[0., 0., 10., 10.], [20., 0., 30., 10.]]);
        let preds = boxes(&[[1., 1., 9., 9.], [21., 1., 29., 9.]]);
        let outcome = match_detections(&gts, &preds, &MatchConfig::default()).unwrap();
        assert!(outcome.unmatched_ground_truths.is_empty());
        assert_eq!(outcome.matches.len(), 2);
    }

    #[test]
    fn test_conflict_resolves_to_higher_similarity() {
        // Both ground truths overlap prediction 0 most, gt 0 more strongly.
        // gt 1 must be displaced onto its next-best candidate, prediction 1.
        let gts = boxes(&[[0., 0., 10., 10.], [4., 0., 14., 10.]]);
        let preds = boxes(&[[0., 0., 9., 10.], [11., 0., 15., 10.]]);
        let outcome = match_detections(&gts, &preds, &MatchConfig::default()).unwrap();
        assert_eq!(outcome.ground_truth_of(0), Some(0));
        assert_eq!(outcome.ground_truth_of(1), Some(1));
        assert!(outcome.unmatched_ground_truths.is_empty());
    }

    #[test]
    fn test_conflict_loser_without_candidates_stays_unmatched() {
        // One prediction, two claimants; the loser has nowhere else to go.
        let gts = boxes(&[[0., 0., 10., 10.], [5., 0., 15., 10.]]);
        let preds = boxes(&[[0., 0., 10., 10.]]);
        let outcome = match_detections(&gts, &preds, &MatchConfig::default()).unwrap();
        assert_eq!(outcome.matches, vec![(0, 0)]);
        assert_eq!(outcome.unmatched_ground_truths, vec![1]);
    }

    #[test]
    fn test_matching_is_idempotent() {
        let gts = boxes(&[
            [0., 0., 10., 10.],
            [2., 2., 12., 12.],
            [20., 20., 30., 30.],
        ]);
        let preds = boxes(&[[1., 1., 11., 11.], [22., 22., 28., 28.]]);
        let config = MatchConfig::default();
        let first = match_detections(&gts, &preds, &config).unwrap();
        let second = match_detections(&gts, &preds, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_group_extras_records_nonzero_rows() {
        let gts = boxes(&[[0., 0., 10., 10.]]);
        let preds = boxes(&[[1., 1., 9., 9.], [2., 2., 8., 8.], [50., 50., 60., 60.]]);
        let config = MatchConfig {
            group_extras: true,
            ..MatchConfig::default()
        };
        let outcome = match_detections(&gts, &preds, &config).unwrap();
        assert_eq!(outcome.grouped_extras, vec![vec![0, 1]]);
    }

    #[test]
    fn test_centerpoint_metric_matches_nearest() {
        let gts = boxes(&[[0., 0., 10., 10.]]);
        let preds = boxes(&[[2., 2., 8., 8.], [40., 40., 50., 50.]]);
        let config = MatchConfig {
            metric: Metric::CenterPoint,
            leniency_factor: 1.,
            group_extras: false,
        };
        let outcome = match_detections(&gts, &preds, &config).unwrap();
        assert_eq!(outcome.matches, vec![(0, 0)]);
    }

    #[test]
    fn test_mixed_coordinate_spaces_are_refused() {
        let gts = boxes(&[[0., 0., 10., 10.]]);
        let preds = DetectionSet::new(
            vec![Detection {
                bbox: BBox::new(0.1, 0.1, 0.9, 0.9).unwrap(),
                score: 1.,
                label: 0,
            }],
            CoordSpace::Normalized,
        );
        assert!(matches!(
            match_detections(&gts, &preds, &MatchConfig::default()),
            Err(ScanError::InvalidInput(_))
        ));
    }
}
