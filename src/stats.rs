//! The summary statistics produced by a COCO evaluation.
//!
//! The conventional output is a 12-entry vector whose meaning is purely
//! positional. `Stats` names every entry so consumers never index by position;
//! `to_array` / `from_array` convert at the boundary.

use std::ops::Index;

/// Number of entries in the summary vector.
pub const STATS_LEN: usize = 12;

/// COCO summary statistics. A value of `-1.0` means "no data" (for example no
/// ground truth in that size bucket).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    /// AP averaged over IoU 0.50:0.95, all areas, 100 detections
    pub ap: f64,
    /// AP at IoU 0.50
    pub ap50: f64,
    /// AP at IoU 0.75
    pub ap75: f64,
    pub ap_small: f64,
    pub ap_medium: f64,
    pub ap_large: f64,
    /// AR with 1 detection per image
    pub ar1: f64,
    /// AR with 10 detections per image
    pub ar10: f64,
    /// AR with 100 detections per image
    pub ar100: f64,
    pub ar_small: f64,
    pub ar_medium: f64,
    pub ar_large: f64,
}

impl Stats {
    /// The statistics in conventional COCO order.
    pub fn to_array(&self) -> [f64; STATS_LEN] {
        [
            self.ap,
            self.ap50,
            self.ap75,
            self.ap_small,
            self.ap_medium,
            self.ap_large,
            self.ar1,
            self.ar10,
            self.ar100,
            self.ar_small,
            self.ar_medium,
            self.ar_large,
        ]
    }

    /// Build from a vector in conventional COCO order.
    pub fn from_array(values: [f64; STATS_LEN]) -> Self {
        let [ap, ap50, ap75, ap_small, ap_medium, ap_large, ar1, ar10, ar100, ar_small, ar_medium, ar_large] =
            values;
        Stats {
            ap,
            ap50,
            ap75,
            ap_small,
            ap_medium,
            ap_large,
            ar1,
            ar10,
            ar100,
            ar_small,
            ar_medium,
            ar_large,
        }
    }
}

impl Index<usize> for Stats {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        match index {
            0 => &self.ap,
            1 => &self.ap50,
            2 => &self.ap75,
            3 => &self.ap_small,
            4 => &self.ap_medium,
            5 => &self.ap_large,
            6 => &self.ar1,
            7 => &self.ar10,
            8 => &self.ar100,
            9 => &self.ar_small,
            10 => &self.ar_medium,
            11 => &self.ar_large,
            _ => panic!("stats index {} out of range (len {})", index, STATS_LEN),
        }
    }
}

/// Which slice of the accumulated results one summary entry averages.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SummaryLine {
    /// Precision when true, recall otherwise.
    pub average_precision: bool,
    pub iou_threshold: Option<f64>,
    pub area: &'static str,
    /// Position in `Params::max_dets`.
    pub max_det_index: usize,
}

const fn line(
    average_precision: bool,
    iou_threshold: Option<f64>,
    area: &'static str,
    max_det_index: usize,
) -> SummaryLine {
    SummaryLine {
        average_precision,
        iou_threshold,
        area,
        max_det_index,
    }
}

/// Summary entries in output order.
pub(crate) const SUMMARY_LINES: [SummaryLine; STATS_LEN] = [
    line(true, None, "all", 2),
    line(true, Some(0.5), "all", 2),
    line(true, Some(0.75), "all", 2),
    line(true, None, "small", 2),
    line(true, None, "medium", 2),
    line(true, None, "large", 2),
    line(false, None, "all", 0),
    line(false, None, "all", 1),
    line(false, None, "all", 2),
    line(false, None, "small", 2),
    line(false, None, "medium", 2),
    line(false, None, "large", 2),
];

/// Mean of the entries above -1, or -1 when there are none.
pub(crate) fn mean_valid<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values
        .into_iter()
        .filter(|&v| v > -1.0)
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        -1.0
    } else {
        sum / count as f64
    }
}

/// Render one summary entry the way COCO tooling prints it.
pub(crate) fn format_line(
    line: &SummaryLine,
    iou_range: (f64, f64),
    max_det: usize,
    value: f64,
) -> String {
    let (title, kind) = if line.average_precision {
        ("Average Precision", "(AP)")
    } else {
        ("Average Recall", "(AR)")
    };
    let iou = match line.iou_threshold {
        Some(t) => format!("{:0.2}", t),
        None => format!("{:0.2}:{:0.2}", iou_range.0, iou_range.1),
    };
    format!(
        " {:<18} {} @[ IoU={:<9} | area={:>6} | maxDets={:>3} ] = {:0.3}",
        title, kind, iou, line.area, max_det, value
    )
}
