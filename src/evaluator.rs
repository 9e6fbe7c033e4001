//! COCO evaluation pipeline: evaluate, accumulate, summarize.

use crate::error::{CocoEvalError, Result};
use crate::index::CocoIndex;
use crate::mask;
use crate::matching::{evaluate_image, EvalImage, EvalObject};
use crate::metrics::ap::sample_at_recall_thresholds;
use crate::metrics::iou::bbox_iou_matrix;
use crate::metrics::precision_recall::precision_recall_curve;
use crate::params::{IouType, Params};
use crate::stats::{format_line, mean_valid, Stats, SummaryLine, STATS_LEN, SUMMARY_LINES};
use crate::types::{Annotation, Rle};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info};

/// Category key used for every annotation when categories are pooled.
pub const POOLED_CATEGORY: u64 = u64::MAX;

/// Geometry an IoU is computed on.
enum Region {
    Box([f64; 4]),
    Mask(Rle),
}

/// Ground truth, detections and their IoUs for one (image, category) pair.
#[derive(Default)]
struct Group {
    gts: Vec<EvalObject>,
    dts: Vec<EvalObject>,
    ious: Vec<Vec<f64>>,
}

/// Precision/recall tables filled by [`CocoEval::accumulate`].
///
/// Cells that had nothing to evaluate hold `-1`.
#[derive(Debug, Clone)]
pub struct Accumulation {
    /// `[T, R, K, A, M]`: IoU thresholds, recall thresholds, categories,
    /// area ranges, max-detection settings.
    pub dims: [usize; 5],
    precision: Vec<f64>,
    recall: Vec<f64>,
    scores: Vec<f64>,
}

impl Accumulation {
    fn new(dims: [usize; 5]) -> Self {
        let [t, r, k, a, m] = dims;
        Accumulation {
            dims,
            precision: vec![-1.0; t * r * k * a * m],
            recall: vec![-1.0; t * k * a * m],
            scores: vec![-1.0; t * r * k * a * m],
        }
    }

    fn pr_index(&self, t: usize, r: usize, k: usize, a: usize, m: usize) -> usize {
        let [_, nr, nk, na, nm] = self.dims;
        (((t * nr + r) * nk + k) * na + a) * nm + m
    }

    fn rc_index(&self, t: usize, k: usize, a: usize, m: usize) -> usize {
        let [_, _, nk, na, nm] = self.dims;
        ((t * nk + k) * na + a) * nm + m
    }

    /// Interpolated precision at one recall threshold.
    pub fn precision(&self, t: usize, r: usize, k: usize, a: usize, m: usize) -> f64 {
        self.precision[self.pr_index(t, r, k, a, m)]
    }

    /// Final recall.
    pub fn recall(&self, t: usize, k: usize, a: usize, m: usize) -> f64 {
        self.recall[self.rc_index(t, k, a, m)]
    }

    /// Score of the detection that reaches a recall threshold.
    pub fn score(&self, t: usize, r: usize, k: usize, a: usize, m: usize) -> f64 {
        self.scores[self.pr_index(t, r, k, a, m)]
    }
}

/// COCO evaluator bound to a ground truth and a set of detections.
///
/// The three steps must run in order; each consumes the state the previous one
/// leaves behind.
///
/// ```no_run
/// use coco_challenge_eval::{CocoEval, CocoIndex, IouType};
/// use coco_challenge_eval::loader::load_results_from_file;
///
/// # fn main() -> coco_challenge_eval::Result<()> {
/// let gt = CocoIndex::from_file("instances_val.json")?;
/// let dt = gt.load_res(load_results_from_file("detections.json")?)?;
///
/// let mut eval = CocoEval::new(&gt, &dt, IouType::Bbox);
/// eval.evaluate()?;
/// eval.accumulate()?;
/// let stats = eval.summarize()?;
/// println!("AP: {:.3}", stats.ap);
/// # Ok(())
/// # }
/// ```
pub struct CocoEval<'a> {
    gt: &'a CocoIndex,
    dt: &'a CocoIndex,
    params: Params,
    cat_keys: Vec<u64>,
    eval_imgs: Option<Vec<Option<EvalImage>>>,
    accumulation: Option<Accumulation>,
    stats: Option<Stats>,
}

impl<'a> CocoEval<'a> {
    /// Evaluator with default parameters over every ground-truth image and category.
    pub fn new(gt: &'a CocoIndex, dt: &'a CocoIndex, iou_type: IouType) -> Self {
        let mut params = Params::new(iou_type);
        params.img_ids = gt.img_ids().to_vec();
        params.cat_ids = gt.cat_ids();
        Self::with_params(gt, dt, params)
    }

    /// Evaluator with caller-supplied parameters.
    pub fn with_params(gt: &'a CocoIndex, dt: &'a CocoIndex, params: Params) -> Self {
        CocoEval {
            gt,
            dt,
            params,
            cat_keys: Vec::new(),
            eval_imgs: None,
            accumulation: None,
            stats: None,
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Per-image results, available after [`evaluate`](Self::evaluate).
    ///
    /// Ordered by category, then area range, then image.
    pub fn eval_imgs(&self) -> Option<&[Option<EvalImage>]> {
        self.eval_imgs.as_deref()
    }

    /// Tables produced by [`accumulate`](Self::accumulate).
    pub fn accumulation(&self) -> Option<&Accumulation> {
        self.accumulation.as_ref()
    }

    /// Match detections to ground truth for every image, category and area range.
    pub fn evaluate(&mut self) -> Result<()> {
        let start = Instant::now();
        info!(iou_type = %self.params.iou_type, "Running per image evaluation");

        self.params.img_ids.sort_unstable();
        self.params.img_ids.dedup();
        self.params.cat_ids.sort_unstable();
        self.params.cat_ids.dedup();
        self.cat_keys = if self.params.use_cats {
            self.params.cat_ids.clone()
        } else {
            vec![POOLED_CATEGORY]
        };

        let groups = self.prepare()?;
        let max_det = self.params.max_det();
        let empty = Group::default();

        let mut eval_imgs = Vec::with_capacity(
            self.cat_keys.len() * self.params.area_ranges.len() * self.params.img_ids.len(),
        );
        for &cat_id in &self.cat_keys {
            for area_range in &self.params.area_ranges {
                for &img_id in &self.params.img_ids {
                    let group = groups.get(&(img_id, cat_id)).unwrap_or(&empty);
                    eval_imgs.push(evaluate_image(
                        img_id,
                        cat_id,
                        &group.gts,
                        &group.dts,
                        &group.ious,
                        area_range,
                        max_det,
                        &self.params.iou_thrs,
                    ));
                }
            }
        }

        debug!(
            records = eval_imgs.iter().filter(|e| e.is_some()).count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "evaluate done"
        );
        self.eval_imgs = Some(eval_imgs);
        self.accumulation = None;
        self.stats = None;
        Ok(())
    }

    /// Group annotations by (image, category), rank detections and compute IoUs.
    fn prepare(&self) -> Result<HashMap<(u64, u64), Group>> {
        let img_ids: HashSet<u64> = self.params.img_ids.iter().copied().collect();
        let cat_ids: HashSet<u64> = self.params.cat_ids.iter().copied().collect();
        let selected = |ann: &Annotation| {
            img_ids.contains(&ann.image_id)
                && (!self.params.use_cats || cat_ids.contains(&ann.category_id))
        };

        let mut gt_groups: HashMap<(u64, u64), Vec<(EvalObject, Region)>> = HashMap::new();
        for ann in self.gt.annotations().iter().filter(|&a| selected(a)) {
            let region = self.region(self.gt, ann)?;
            let area = ann.area.unwrap_or_else(|| region_area(&region));
            let object = EvalObject {
                id: ann.id,
                area,
                iscrowd: ann.is_crowd(),
                score: ann.confidence(),
            };
            gt_groups
                .entry(self.group_key(ann))
                .or_default()
                .push((object, region));
        }

        let mut dt_groups: HashMap<(u64, u64), Vec<(EvalObject, Region)>> = HashMap::new();
        for ann in self.dt.annotations().iter().filter(|&a| selected(a)) {
            let region = self.region(self.dt, ann)?;
            let area = ann.area.unwrap_or_else(|| region_area(&region));
            let object = EvalObject {
                id: ann.id,
                area,
                iscrowd: false,
                score: ann.confidence(),
            };
            dt_groups
                .entry(self.group_key(ann))
                .or_default()
                .push((object, region));
        }

        let max_det = self.params.max_det();
        let keys: HashSet<(u64, u64)> = gt_groups.keys().chain(dt_groups.keys()).copied().collect();
        let mut groups = HashMap::with_capacity(keys.len());

        for key in keys {
            let gts = gt_groups.remove(&key).unwrap_or_default();
            let mut dts = dt_groups.remove(&key).unwrap_or_default();

            // Stable sort: equal scores keep submission order
            dts.sort_by(|a, b| {
                b.0.score
                    .partial_cmp(&a.0.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            dts.truncate(max_det);

            let ious = if gts.is_empty() || dts.is_empty() {
                Vec::new()
            } else {
                compute_ious(&gts, &dts)
            };

            groups.insert(
                key,
                Group {
                    gts: gts.into_iter().map(|(o, _)| o).collect(),
                    dts: dts.into_iter().map(|(o, _)| o).collect(),
                    ious,
                },
            );
        }

        Ok(groups)
    }

    fn group_key(&self, ann: &Annotation) -> (u64, u64) {
        if self.params.use_cats {
            (ann.image_id, ann.category_id)
        } else {
            (ann.image_id, POOLED_CATEGORY)
        }
    }

    fn region(&self, index: &CocoIndex, ann: &Annotation) -> Result<Region> {
        match self.params.iou_type {
            IouType::Bbox if ann.bbox.is_empty() => {
                Ok(Region::Box(mask::to_bbox(&index.annotation_rle(ann)?)))
            }
            IouType::Bbox => Ok(Region::Box(ann.to_bbox()?.to_array())),
            IouType::Segm => Ok(Region::Mask(index.annotation_rle(ann)?)),
        }
    }

    /// Build precision/recall tables from the per-image results.
    pub fn accumulate(&mut self) -> Result<()> {
        let start = Instant::now();
        let eval_imgs = self
            .eval_imgs
            .as_ref()
            .ok_or(CocoEvalError::PipelineOrder("accumulate() called before evaluate()"))?;
        info!("Accumulating evaluation results");

        let p = &self.params;
        let t_len = p.iou_thrs.len();
        let k_len = self.cat_keys.len();
        let a_len = p.area_ranges.len();
        let i_len = p.img_ids.len();
        let mut acc = Accumulation::new([t_len, p.rec_thrs.len(), k_len, a_len, p.max_dets.len()]);

        for k in 0..k_len {
            for a in 0..a_len {
                let offset = k * a_len * i_len + a * i_len;
                let records: Vec<&EvalImage> = eval_imgs[offset..offset + i_len]
                    .iter()
                    .flatten()
                    .collect();
                if records.is_empty() {
                    continue;
                }

                let npig = records
                    .iter()
                    .flat_map(|e| e.gt_ignore.iter())
                    .filter(|&&ignored| !ignored)
                    .count();
                if npig == 0 {
                    continue;
                }

                for (m, &max_det) in p.max_dets.iter().enumerate() {
                    // (record, detection) pairs ranked by score across images
                    let mut ranked: Vec<(usize, usize)> = records
                        .iter()
                        .enumerate()
                        .flat_map(|(ri, e)| (0..e.dt_scores.len().min(max_det)).map(move |d| (ri, d)))
                        .collect();
                    ranked.sort_by(|&(ra, da), &(rb, db)| {
                        records[rb].dt_scores[db]
                            .partial_cmp(&records[ra].dt_scores[da])
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                    let scores: Vec<f64> = ranked
                        .iter()
                        .map(|&(ri, d)| records[ri].dt_scores[d])
                        .collect();

                    for t in 0..t_len {
                        let mut tp = Vec::with_capacity(ranked.len());
                        let mut fp = Vec::with_capacity(ranked.len());
                        for &(ri, d) in &ranked {
                            let matched = records[ri].dt_matches[t][d].is_some();
                            let ignored = records[ri].dt_ignore[t][d];
                            tp.push(matched && !ignored);
                            fp.push(!matched && !ignored);
                        }

                        let (precision, recall) = precision_recall_curve(&tp, &fp, npig);
                        let idx = acc.rc_index(t, k, a, m);
                        acc.recall[idx] = recall.last().copied().unwrap_or(0.0);

                        let (q, ss) =
                            sample_at_recall_thresholds(&precision, &recall, &scores, &p.rec_thrs);
                        for (r, (qv, sv)) in q.into_iter().zip(ss).enumerate() {
                            let idx = acc.pr_index(t, r, k, a, m);
                            acc.precision[idx] = qv;
                            acc.scores[idx] = sv;
                        }
                    }
                }
            }
        }

        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "accumulate done");
        self.accumulation = Some(acc);
        self.stats = None;
        Ok(())
    }

    /// Reduce the accumulated tables to the 12 summary statistics.
    pub fn summarize(&mut self) -> Result<Stats> {
        let acc = self
            .accumulation
            .as_ref()
            .ok_or(CocoEvalError::PipelineOrder("summarize() called before accumulate()"))?;

        let p = &self.params;
        let iou_range = (
            p.iou_thrs.first().copied().unwrap_or(0.0),
            p.iou_thrs.last().copied().unwrap_or(0.0),
        );

        let mut values = [-1.0; STATS_LEN];
        for (value, line) in values.iter_mut().zip(SUMMARY_LINES.iter()) {
            *value = summarize_line(p, acc, line);
            let max_det = p.max_dets.get(line.max_det_index).copied().unwrap_or(0);
            info!("{}", format_line(line, iou_range, max_det, *value));
        }

        let stats = Stats::from_array(values);
        self.stats = Some(stats);
        Ok(stats)
    }

    /// Summary statistics from the last [`summarize`](Self::summarize).
    pub fn stats(&self) -> Result<Stats> {
        self.stats
            .ok_or(CocoEvalError::PipelineOrder("stats read before summarize()"))
    }
}

fn region_area(region: &Region) -> f64 {
    match region {
        Region::Box(b) => b[2] * b[3],
        Region::Mask(rle) => mask::area(rle) as f64,
    }
}

/// IoUs between ranked detections (rows) and ground truth (columns).
fn compute_ious(gts: &[(EvalObject, Region)], dts: &[(EvalObject, Region)]) -> Vec<Vec<f64>> {
    let iscrowd: Vec<bool> = gts.iter().map(|(o, _)| o.iscrowd).collect();

    let boxes = |items: &[(EvalObject, Region)]| -> Option<Vec<[f64; 4]>> {
        items
            .iter()
            .map(|(_, r)| match r {
                Region::Box(b) => Some(*b),
                Region::Mask(_) => None,
            })
            .collect()
    };
    if let (Some(d), Some(g)) = (boxes(dts), boxes(gts)) {
        return bbox_iou_matrix(&d, &g, &iscrowd);
    }

    let masks = |items: &[(EvalObject, Region)]| -> Vec<Rle> {
        items
            .iter()
            .filter_map(|(_, r)| match r {
                Region::Mask(m) => Some(m.clone()),
                Region::Box(_) => None,
            })
            .collect()
    };
    mask::iou(&masks(dts), &masks(gts), &iscrowd)
}

/// Average the cells selected by one summary line, skipping `-1` entries.
fn summarize_line(p: &Params, acc: &Accumulation, line: &SummaryLine) -> f64 {
    let (Some(a), Some(m)) = (
        p.area_index(line.area),
        p.max_dets.get(line.max_det_index).and_then(|&md| p.max_det_index(md)),
    ) else {
        return -1.0;
    };

    let thresholds: Vec<usize> = match line.iou_threshold {
        Some(thr) => match p.iou_index(thr) {
            Some(t) => vec![t],
            None => return -1.0,
        },
        None => (0..p.iou_thrs.len()).collect(),
    };

    let [_, r_len, k_len, _, _] = acc.dims;
    if line.average_precision {
        mean_valid(thresholds.iter().flat_map(|&t| {
            (0..r_len).flat_map(move |r| (0..k_len).map(move |k| acc.precision(t, r, k, a, m)))
        }))
    } else {
        mean_valid(
            thresholds
                .iter()
                .flat_map(|&t| (0..k_len).map(move |k| acc.recall(t, k, a, m))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ground_truth() -> CocoIndex {
        CocoIndex::from_json(
            r#"{
                "images": [{"id": 1, "file_name": "a.jpg", "height": 200, "width": 200}],
                "annotations": [
                    {"id": 1, "image_id": 1, "category_id": 1, "bbox": [10, 10, 50, 50], "area": 2500}
                ],
                "categories": [{"id": 1, "name": "person"}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_pipeline_order_enforced() {
        let gt = ground_truth();
        let dt = gt.load_res(Vec::new()).unwrap();
        let mut eval = CocoEval::new(&gt, &dt, IouType::Bbox);

        assert!(matches!(eval.accumulate(), Err(CocoEvalError::PipelineOrder(_))));
        assert!(matches!(eval.summarize(), Err(CocoEvalError::PipelineOrder(_))));
        assert!(matches!(eval.stats(), Err(CocoEvalError::PipelineOrder(_))));

        eval.evaluate().unwrap();
        assert!(matches!(eval.summarize(), Err(CocoEvalError::PipelineOrder(_))));
        eval.accumulate().unwrap();
        eval.summarize().unwrap();
        assert!(eval.stats().is_ok());

        // re-running evaluate invalidates later results
        eval.evaluate().unwrap();
        assert!(eval.accumulation().is_none());
        assert!(eval.stats().is_err());
    }

    #[test]
    fn test_eval_imgs_layout() {
        let gt = ground_truth();
        let dt = gt.load_res(Vec::new()).unwrap();
        let mut eval = CocoEval::new(&gt, &dt, IouType::Bbox);
        eval.evaluate().unwrap();

        // 1 category x 4 area ranges x 1 image
        let eval_imgs = eval.eval_imgs().unwrap();
        assert_eq!(eval_imgs.len(), 4);
        assert!(eval_imgs.iter().all(|e| e.is_some()));
    }

    #[test]
    fn test_accumulation_dims() {
        let gt = ground_truth();
        let dt = gt.load_res(Vec::new()).unwrap();
        let mut eval = CocoEval::new(&gt, &dt, IouType::Bbox);
        eval.evaluate().unwrap();
        eval.accumulate().unwrap();

        let acc = eval.accumulation().unwrap();
        assert_eq!(acc.dims, [10, 101, 1, 4, 3]);
        // "all" range had ground truth but no detections
        assert_eq!(acc.recall(0, 0, 0, 2), 0.0);
        assert_eq!(acc.precision(0, 0, 0, 0, 2), 0.0);
        // no small ground truth at all
        assert_eq!(acc.recall(0, 0, 1, 2), -1.0);
    }
}
