//! Intersection over Union (IoU) calculation.

use crate::types::BoundingBox;

/// Calculate the Intersection over Union (IoU) between two bounding boxes.
///
/// IoU is defined as the area of intersection divided by the area of union.
///
/// # Arguments
///
/// * `bbox1` - First bounding box
/// * `bbox2` - Second bounding box
///
/// # Returns
///
/// Returns a value between 0.0 (no overlap) and 1.0 (perfect overlap).
///
/// # Example
///
/// ```
/// use coco_challenge_eval::metrics::iou::calculate_iou;
/// use coco_challenge_eval::types::BoundingBox;
///
/// let bbox1 = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
/// let bbox2 = BoundingBox::new(5.0, 5.0, 10.0, 10.0);
/// let iou = calculate_iou(&bbox1, &bbox2);
/// assert!(iou > 0.0 && iou < 1.0);
/// ```
pub fn calculate_iou(bbox1: &BoundingBox, bbox2: &BoundingBox) -> f64 {
    overlap(&bbox1.to_array(), &bbox2.to_array(), false)
}

fn overlap(dt: &[f64; 4], gt: &[f64; 4], crowd: bool) -> f64 {
    let w = (dt[0] + dt[2]).min(gt[0] + gt[2]) - dt[0].max(gt[0]);
    if w <= 0.0 {
        return 0.0;
    }
    let h = (dt[1] + dt[3]).min(gt[1] + gt[3]) - dt[1].max(gt[1]);
    if h <= 0.0 {
        return 0.0;
    }

    let intersection = w * h;
    let dt_area = dt[2] * dt[3];
    let union = if crowd {
        dt_area
    } else {
        dt_area + gt[2] * gt[3] - intersection
    };

    // Avoid division by zero
    if union <= 0.0 {
        return 0.0;
    }

    intersection / union
}

/// IoU matrix between detection boxes (rows) and ground-truth boxes (columns).
///
/// Boxes are `[x, y, width, height]`. Columns flagged in `iscrowd` use the crowd
/// variant (intersection over detection area).
///
/// # Example
///
/// ```
/// use coco_challenge_eval::metrics::iou::bbox_iou_matrix;
///
/// let dt = [[0.0, 0.0, 10.0, 10.0], [5.0, 5.0, 10.0, 10.0]];
/// let gt = [[0.0, 0.0, 10.0, 10.0]];
/// let ious = bbox_iou_matrix(&dt, &gt, &[false]);
/// assert_eq!(ious.len(), 2);
/// assert!((ious[0][0] - 1.0).abs() < 1e-10);
/// ```
pub fn bbox_iou_matrix(dt: &[[f64; 4]], gt: &[[f64; 4]], iscrowd: &[bool]) -> Vec<Vec<f64>> {
    dt.iter()
        .map(|d| {
            gt.iter()
                .enumerate()
                .map(|(j, g)| overlap(d, g, iscrowd.get(j).copied().unwrap_or(false)))
                .collect()
        })
        .collect()
}
