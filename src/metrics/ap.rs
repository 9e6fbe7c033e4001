//! Interpolated precision at fixed recall levels, the basis of COCO AP.

use crate::metrics::precision_recall::precision_envelope;

/// Sample the precision envelope (and the detection score) at fixed recall levels.
///
/// For each recall threshold the first curve point reaching it is used (a
/// left-side binary search over `recall`). Thresholds beyond the final recall keep
/// precision and score 0.
///
/// # Arguments
///
/// * `precision` - Precision after each ranked detection
/// * `recall` - Recall after each ranked detection (non-decreasing)
/// * `scores` - Score of each ranked detection
/// * `rec_thrs` - Recall levels to sample
///
/// # Returns
///
/// `(precision_at_levels, score_at_levels)`, both of length `rec_thrs.len()`.
pub fn sample_at_recall_thresholds(
    precision: &[f64],
    recall: &[f64],
    scores: &[f64],
    rec_thrs: &[f64],
) -> (Vec<f64>, Vec<f64>) {
    let mut envelope = precision.to_vec();
    precision_envelope(&mut envelope);

    let mut q = vec![0.0; rec_thrs.len()];
    let mut ss = vec![0.0; rec_thrs.len()];

    for (ri, &threshold) in rec_thrs.iter().enumerate() {
        let pi = recall.partition_point(|&r| r < threshold);
        if pi >= envelope.len() {
            break;
        }
        q[ri] = envelope[pi];
        ss[ri] = scores.get(pi).copied().unwrap_or(0.0);
    }

    (q, ss)
}
