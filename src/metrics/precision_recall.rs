//! Precision and recall curves over score-ranked detections.

/// Cumulative precision and recall after each ranked detection.
///
/// `tp[i]` / `fp[i]` flag detection `i` (in descending score order) as a true or
/// false positive; an ignored detection has both flags unset and only repeats the
/// previous point. `num_ground_truth` counts non-ignored ground truth.
///
/// Precision carries a machine-epsilon term in the denominator so a prefix of
/// ignored detections yields 0 instead of NaN.
///
/// # Example
///
/// ```
/// use coco_challenge_eval::metrics::precision_recall::precision_recall_curve;
///
/// let (precision, recall) = precision_recall_curve(&[true, false, true], &[false, true, false], 4);
/// assert!((precision[1] - 0.5).abs() < 1e-9);
/// assert_eq!(recall, vec![0.25, 0.25, 0.5]);
/// ```
pub fn precision_recall_curve(
    tp: &[bool],
    fp: &[bool],
    num_ground_truth: usize,
) -> (Vec<f64>, Vec<f64>) {
    let mut precision = Vec::with_capacity(tp.len());
    let mut recall = Vec::with_capacity(tp.len());

    let mut tp_sum = 0.0;
    let mut fp_sum = 0.0;

    for (&is_tp, &is_fp) in tp.iter().zip(fp) {
        if is_tp {
            tp_sum += 1.0;
        }
        if is_fp {
            fp_sum += 1.0;
        }

        recall.push(tp_sum / num_ground_truth as f64);
        precision.push(tp_sum / (tp_sum + fp_sum + f64::EPSILON));
    }

    (precision, recall)
}

/// Make precision monotonically non-increasing in recall (the upper envelope).
pub fn precision_envelope(precision: &mut [f64]) {
    for i in (1..precision.len()).rev() {
        if precision[i] > precision[i - 1] {
            precision[i - 1] = precision[i];
        }
    }
}
