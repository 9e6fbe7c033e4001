//! Per-image matching of detections against ground truth.

use crate::params::AreaRange;

/// The fields of an annotation that matching looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalObject {
    pub id: u64,
    pub area: f64,
    pub iscrowd: bool,
    pub score: f64,
}

/// Matching outcome for one image, one category and one area range.
///
/// Matrices indexed `[threshold][detection]` / `[threshold][ground truth]`.
/// Ground truth is ordered non-ignored first; detections by descending score.
#[derive(Debug, Clone)]
pub struct EvalImage {
    pub image_id: u64,
    pub category_id: u64,
    pub max_det: usize,
    pub dt_ids: Vec<u64>,
    pub gt_ids: Vec<u64>,
    /// Ground-truth id matched by each detection.
    pub dt_matches: Vec<Vec<Option<u64>>>,
    /// Detection id matched by each ground truth.
    pub gt_matches: Vec<Vec<Option<u64>>>,
    pub dt_scores: Vec<f64>,
    pub gt_ignore: Vec<bool>,
    pub dt_ignore: Vec<Vec<bool>>,
}

/// Greedily match the detections of one image/category to its ground truth.
///
/// `dts` must already be sorted by descending score, and `ious[d][g]` must refer
/// to `dts[d]` and `gts[g]` in the order given. Each detection takes the
/// highest-IoU ground truth still free at each threshold. Crowd regions can
/// absorb any number of detections, and once a detection has a non-ignored
/// candidate it never switches to an ignored one.
///
/// Returns `None` when the image has neither ground truth nor detections.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_image(
    image_id: u64,
    category_id: u64,
    gts: &[EvalObject],
    dts: &[EvalObject],
    ious: &[Vec<f64>],
    area_range: &AreaRange,
    max_det: usize,
    iou_thrs: &[f64],
) -> Option<EvalImage> {
    if gts.is_empty() && dts.is_empty() {
        return None;
    }

    let ignored: Vec<bool> = gts
        .iter()
        .map(|g| g.iscrowd || !area_range.contains(g.area))
        .collect();

    // Stable: keeps ground-truth order inside each group
    let mut gt_order: Vec<usize> = (0..gts.len()).collect();
    gt_order.sort_by_key(|&i| ignored[i]);

    let gt_ignore: Vec<bool> = gt_order.iter().map(|&i| ignored[i]).collect();
    let iscrowd: Vec<bool> = gt_order.iter().map(|&i| gts[i].iscrowd).collect();
    let dts = &dts[..dts.len().min(max_det)];

    let t = iou_thrs.len();
    let mut gt_matches: Vec<Vec<Option<u64>>> = vec![vec![None; gts.len()]; t];
    let mut dt_matches: Vec<Vec<Option<u64>>> = vec![vec![None; dts.len()]; t];
    let mut dt_ignore: Vec<Vec<bool>> = vec![vec![false; dts.len()]; t];

    if !gts.is_empty() {
        for (tind, &threshold) in iou_thrs.iter().enumerate() {
            for (dind, dt) in dts.iter().enumerate() {
                let mut best = threshold.min(1.0 - 1e-10);
                let mut matched: Option<usize> = None;

                for (gind, &orig) in gt_order.iter().enumerate() {
                    // already taken, and not a crowd
                    if gt_matches[tind][gind].is_some() && !iscrowd[gind] {
                        continue;
                    }
                    // ignored ground truth sorts last; stop once a real match exists
                    if let Some(m) = matched {
                        if !gt_ignore[m] && gt_ignore[gind] {
                            break;
                        }
                    }
                    let iou = ious[dind][orig];
                    if iou < best {
                        continue;
                    }
                    best = iou;
                    matched = Some(gind);
                }

                if let Some(m) = matched {
                    dt_ignore[tind][dind] = gt_ignore[m];
                    dt_matches[tind][dind] = Some(gts[gt_order[m]].id);
                    gt_matches[tind][m] = Some(dt.id);
                }
            }
        }
    }

    // Unmatched detections outside the area range do not count against precision
    for (dind, dt) in dts.iter().enumerate() {
        if area_range.contains(dt.area) {
            continue;
        }
        for tind in 0..t {
            if dt_matches[tind][dind].is_none() {
                dt_ignore[tind][dind] = true;
            }
        }
    }

    Some(EvalImage {
        image_id,
        category_id,
        max_det,
        dt_ids: dts.iter().map(|d| d.id).collect(),
        gt_ids: gt_order.iter().map(|&i| gts[i].id).collect(),
        dt_matches,
        gt_matches,
        dt_scores: dts.iter().map(|d| d.score).collect(),
        gt_ignore,
        dt_ignore,
    })
}
