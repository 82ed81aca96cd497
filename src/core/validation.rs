//! Pixel-wise validation of a probability raster against an observed flood mask.

use crate::types::{FloodError, FloodResult, PROBABILITY_NODATA};
use ndarray::Array2;
use serde::Serialize;

/// Threshold used for the headline confusion matrix
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Percentiles reported for probabilities over observed flood pixels
pub const FLOOD_PERCENTILES: [f64; 5] = [20.0, 40.0, 50.0, 60.0, 80.0];

/// Binary confusion counts; a pixel is predicted flooded when `p > threshold`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConfusionMatrix {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl ConfusionMatrix {
    pub fn at_threshold(probabilities: &[f32], truth: &[u8], threshold: f64) -> Self {
        let mut matrix = Self::default();
        for (&p, &t) in probabilities.iter().zip(truth) {
            match (p as f64 > threshold, t == 1) {
                (true, true) => matrix.true_positive += 1,
                (true, false) => matrix.false_positive += 1,
                (false, false) => matrix.true_negative += 1,
                (false, true) => matrix.false_negative += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    /// Intersection over union of the flood class
    pub fn iou(&self) -> f64 {
        ratio(
            self.true_positive,
            self.true_positive + self.false_positive + self.false_negative,
        )
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn specificity(&self) -> f64 {
        ratio(self.true_negative, self.true_negative + self.false_positive)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// Youden's J: recall + specificity - 1
    pub fn youden_j(&self) -> f64 {
        self.recall() + self.specificity() - 1.0
    }
}

/// Scores at one sweep threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdScore {
    pub threshold: f64,
    pub f1: f64,
    pub youden_j: f64,
}

/// Validation outcome of one probability raster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid_pixels: usize,
    pub flood_pixels: usize,
    pub threshold: f64,
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub iou: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub specificity: f64,
    pub auc: f64,
    pub best_f1: ThresholdScore,
    pub best_youden: ThresholdScore,
    /// `(percentile, probability)` over observed flood pixels; empty without any
    pub flood_percentiles: Vec<(f64, f64)>,
}

/// Probabilities and binary truth of pixels usable on both rasters
///
/// A pixel counts when its probability is finite and not the no-data
/// sentinel, and its truth value is exactly 0 or 1.
pub fn paired_pixels(probability: &Array2<f32>, truth: &Array2<f32>) -> FloodResult<(Vec<f32>, Vec<u8>)> {
    if probability.dim() != truth.dim() {
        return Err(FloodError::GridMismatch(format!(
            "Probability raster {:?} and ground truth {:?} differ in shape",
            probability.dim(),
            truth.dim()
        )));
    }

    let mut probabilities = Vec::new();
    let mut labels = Vec::new();
    for (&p, &t) in probability.iter().zip(truth.iter()) {
        if p == PROBABILITY_NODATA || !p.is_finite() {
            continue;
        }
        let label = if t == 0.0 {
            0
        } else if t == 1.0 {
            1
        } else {
            continue;
        };
        probabilities.push(p);
        labels.push(label);
    }
    Ok((probabilities, labels))
}

/// Area under the ROC curve from the Mann-Whitney rank statistic
///
/// Tied probabilities share their average rank. Returns 0 when either class
/// is absent.
pub fn roc_auc(probabilities: &[f32], truth: &[u8]) -> f64 {
    let positives = truth.iter().filter(|&&t| t == 1).count();
    let negatives = truth.len() - positives;
    if positives == 0 || negatives == 0 {
        return 0.0;
    }

    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    order.sort_by(|&a, &b| probabilities[a].total_cmp(&probabilities[b]));

    let mut positive_rank_sum = 0.0f64;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && probabilities[order[end]] == probabilities[order[start]] {
            end += 1;
        }
        // ranks start + 1 ..= end share their mean
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let tied_positives = order[start..end].iter().filter(|&&i| truth[i] == 1).count();
        positive_rank_sum += average_rank * tied_positives as f64;
        start = end;
    }

    let n_pos = positives as f64;
    (positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * negatives as f64)
}

/// F1 and Youden's J at thresholds 0.00, 0.01, ..., 1.00
pub fn threshold_sweep(probabilities: &[f32], truth: &[u8]) -> Vec<ThresholdScore> {
    (0..=100)
        .map(|i| {
            let threshold = i as f64 / 100.0;
            let matrix = ConfusionMatrix::at_threshold(probabilities, truth, threshold);
            ThresholdScore {
                threshold,
                f1: matrix.f1(),
                youden_j: matrix.youden_j(),
            }
        })
        .collect()
}

/// First sweep entry with the maximal score
fn best_by(sweep: &[ThresholdScore], score: impl Fn(&ThresholdScore) -> f64) -> ThresholdScore {
    let mut best = sweep[0];
    for entry in &sweep[1..] {
        if score(entry) > score(&best) {
            best = *entry;
        }
    }
    best
}

/// Linearly interpolated percentile of sorted values
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Full validation of a probability raster against a 0/1 flood mask
pub fn evaluate(probability: &Array2<f32>, truth: &Array2<f32>) -> FloodResult<ValidationReport> {
    let (probabilities, labels) = paired_pixels(probability, truth)?;
    let flood_pixels = labels.iter().filter(|&&t| t == 1).count();
    log::info!(
        "Validating {} pixels ({} flooded)",
        probabilities.len(),
        flood_pixels
    );

    let confusion = ConfusionMatrix::at_threshold(&probabilities, &labels, DEFAULT_THRESHOLD);
    let auc = roc_auc(&probabilities, &labels);
    let sweep = threshold_sweep(&probabilities, &labels);
    let best_f1 = best_by(&sweep, |s| s.f1);
    let best_youden = best_by(&sweep, |s| s.youden_j);

    let mut flood_probabilities: Vec<f64> = probabilities
        .iter()
        .zip(&labels)
        .filter(|(_, t)| **t == 1)
        .map(|(&p, _)| p as f64)
        .collect();
    flood_probabilities.sort_by(|a, b| a.total_cmp(b));
    let flood_percentiles = FLOOD_PERCENTILES
        .iter()
        .filter_map(|&q| percentile(&flood_probabilities, q).map(|v| (q, v)))
        .collect();

    let report = ValidationReport {
        valid_pixels: probabilities.len(),
        flood_pixels,
        threshold: DEFAULT_THRESHOLD,
        confusion,
        accuracy: confusion.accuracy(),
        iou: confusion.iou(),
        precision: confusion.precision(),
        recall: confusion.recall(),
        f1: confusion.f1(),
        specificity: confusion.specificity(),
        auc,
        best_f1,
        best_youden,
        flood_percentiles,
    };

    log::info!(
        "Accuracy {:.4}, IoU {:.4}, F1 {:.4}, AUC {:.4}",
        report.accuracy,
        report.iou,
        report.f1,
        report.auc
    );
    log::info!(
        "Best F1 {:.4} at t={:.2}; best Youden J {:.4} at t={:.2}",
        best_f1.f1,
        best_f1.threshold,
        best_youden.youden_j,
        best_youden.threshold
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_perfect_prediction() {
        let probability = array![[0.9f32, 0.1], [0.8, 0.2]];
        let truth = array![[1.0f32, 0.0], [1.0, 0.0]];
        let report = evaluate(&probability, &truth).unwrap();

        assert_eq!(report.valid_pixels, 4);
        assert_relative_eq!(report.accuracy, 1.0);
        assert_relative_eq!(report.iou, 1.0);
        assert_relative_eq!(report.auc, 1.0);
        assert_relative_eq!(report.f1, 1.0);
        assert_relative_eq!(report.specificity, 1.0);
    }

    #[test]
    fn test_nodata_and_unlabelled_pixels_are_skipped() {
        let probability = array![[0.9f32, -1.0, 0.3], [f32::NAN, 0.7, 0.4]];
        let truth = array![[1.0f32, 1.0, 255.0], [0.0, 0.0, 1.0]];
        let (p, t) = paired_pixels(&probability, &truth).unwrap();
        assert_eq!(p, vec![0.9, 0.7, 0.4]);
        assert_eq!(t, vec![1, 0, 1]);
    }

    #[test]
    fn test_shape_mismatch() {
        let probability = Array2::<f32>::zeros((2, 2));
        let truth = Array2::<f32>::zeros((2, 3));
        assert!(matches!(
            evaluate(&probability, &truth),
            Err(FloodError::GridMismatch(_))
        ));
    }

    #[test]
    fn test_threshold_is_strict() {
        let matrix = ConfusionMatrix::at_threshold(&[0.5, 0.51], &[1, 1], 0.5);
        assert_eq!(matrix.false_negative, 1);
        assert_eq!(matrix.true_positive, 1);
    }

    #[test]
    fn test_zero_denominators() {
        let matrix = ConfusionMatrix::at_threshold(&[0.1, 0.2], &[0, 0], 0.5);
        assert_eq!(matrix.precision(), 0.0);
        assert_eq!(matrix.recall(), 0.0);
        assert_eq!(matrix.f1(), 0.0);
        assert_eq!(matrix.iou(), 0.0);
        assert_relative_eq!(matrix.accuracy(), 1.0);
        assert_eq!(ConfusionMatrix::default().accuracy(), 0.0);
    }

    #[test]
    fn test_auc_with_ties() {
        // one positive tied with one negative, one positive clearly above
        let auc = roc_auc(&[0.2, 0.5, 0.5, 0.9], &[0, 0, 1, 1]);
        assert_relative_eq!(auc, 0.875);
        assert_eq!(roc_auc(&[0.3, 0.4], &[1, 1]), 0.0);
    }

    #[test]
    fn test_sweep_picks_first_maximum() {
        let p = [0.1f32, 0.25, 0.75, 0.8];
        let t = [0u8, 0, 1, 1];
        let sweep = threshold_sweep(&p, &t);
        assert_eq!(sweep.len(), 101);

        let best = best_by(&sweep, |s| s.f1);
        // every t in [0.25, 0.74] separates perfectly; 0.25 comes first
        assert_relative_eq!(best.threshold, 0.25);
        assert_relative_eq!(best.f1, 1.0);
        let youden = best_by(&sweep, |s| s.youden_j);
        assert_relative_eq!(youden.threshold, 0.25);
    }

    #[test]
    fn test_percentile_interpolation() {
        let sorted = [0.1, 0.2, 0.3, 0.4, 0.5];
        assert_relative_eq!(percentile(&sorted, 50.0).unwrap(), 0.3);
        assert_relative_eq!(percentile(&sorted, 20.0).unwrap(), 0.18, epsilon = 1e-12);
        assert_eq!(percentile(&[], 50.0), None);
    }
}
