//! Evaluation parameters.

use crate::error::CocoEvalError;
use std::fmt;
use std::str::FromStr;

/// Region type the IoU is computed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum IouType {
    /// Axis-aligned bounding boxes.
    #[default]
    Bbox,
    /// Segmentation masks.
    Segm,
}

impl IouType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IouType::Bbox => "bbox",
            IouType::Segm => "segm",
        }
    }
}

impl fmt::Display for IouType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IouType {
    type Err = CocoEvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bbox" => Ok(IouType::Bbox),
            "segm" => Ok(IouType::Segm),
            other => Err(CocoEvalError::InvalidMetric(other.to_string())),
        }
    }
}

/// Object-size bucket used to restrict evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaRange {
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
}

impl AreaRange {
    pub fn contains(&self, area: f64) -> bool {
        area >= self.min && area <= self.max
    }
}

/// Parameters of a COCO evaluation run.
///
/// `img_ids` and `cat_ids` are filled from the ground truth when the evaluator is
/// built; the remaining fields carry the standard COCO defaults.
#[derive(Debug, Clone)]
pub struct Params {
    pub iou_type: IouType,
    pub img_ids: Vec<u64>,
    pub cat_ids: Vec<u64>,
    /// IoU thresholds, 0.50:0.05:0.95
    pub iou_thrs: Vec<f64>,
    /// Recall thresholds, 0:0.01:1
    pub rec_thrs: Vec<f64>,
    /// Maximum detections per image, ascending
    pub max_dets: Vec<usize>,
    pub area_ranges: Vec<AreaRange>,
    /// Evaluate per category; when false all categories are pooled.
    pub use_cats: bool,
}

impl Params {
    pub fn new(iou_type: IouType) -> Self {
        let iou_thrs: Vec<f64> = (0..10).map(|i| 0.5 + 0.05 * i as f64).collect();
        let rec_thrs: Vec<f64> = (0..=100).map(|i| i as f64 / 100.0).collect();

        Params {
            iou_type,
            img_ids: Vec::new(),
            cat_ids: Vec::new(),
            iou_thrs,
            rec_thrs,
            max_dets: vec![1, 10, 100],
            area_ranges: vec![
                AreaRange { label: "all", min: 0.0, max: 1e10 },
                AreaRange { label: "small", min: 0.0, max: 32_f64.powi(2) },
                AreaRange { label: "medium", min: 32_f64.powi(2), max: 96_f64.powi(2) },
                AreaRange { label: "large", min: 96_f64.powi(2), max: 1e10 },
            ],
            use_cats: true,
        }
    }

    /// Largest per-image detection budget.
    pub fn max_det(&self) -> usize {
        self.max_dets.last().copied().unwrap_or(0)
    }

    /// Index of an IoU threshold, tolerant of float noise.
    pub fn iou_index(&self, threshold: f64) -> Option<usize> {
        self.iou_thrs
            .iter()
            .position(|&x| (x - threshold).abs() < 1e-6)
    }

    /// Index of an area range by label.
    pub fn area_index(&self, label: &str) -> Option<usize> {
        self.area_ranges.iter().position(|a| a.label == label)
    }

    /// Index of a max-detections setting.
    pub fn max_det_index(&self, max_det: usize) -> Option<usize> {
        self.max_dets.iter().position(|&m| m == max_det)
    }
}

impl Default for Params {
    fn default() -> Self {
        Params::new(IouType::default())
    }
}
