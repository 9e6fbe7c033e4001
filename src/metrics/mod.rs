//! Metric primitives used by the COCO evaluator.

pub mod iou;
pub mod ap;
pub mod precision_recall;

pub use iou::{bbox_iou_matrix, calculate_iou};
pub use ap::sample_at_recall_thresholds;
pub use precision_recall::{precision_envelope, precision_recall_curve};
