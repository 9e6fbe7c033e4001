//! # coco-challenge-eval
//!
//! COCO object detection evaluation packaged as the scoring entry point of a
//! challenge host.
//!
//! A submission (a JSON array of detections) is scored against a ground-truth
//! annotation file with the standard COCO protocol, and the resulting statistics
//! are reported under the split of the phase being evaluated:
//! - **AP** averaged over IoU 0.50:0.95
//! - **AP50** / **AP75** at a single IoU threshold
//! - **AP_small** / **AP_medium** / **AP_large** per object size
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use coco_challenge_eval::challenge::evaluate;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let output = evaluate(
//!     "annotations/instances_val.json",
//!     "submission.json",
//!     "dev",
//!     &serde_json::json!({"team": "example"}),
//! )?;
//! println!("{}", serde_json::to_string_pretty(&output)?);
//! # Ok(())
//! # }
//! ```
//!
//! The evaluator itself is usable directly:
//!
//! ```rust,no_run
//! use coco_challenge_eval::{CocoEval, CocoIndex, IouType};
//! use coco_challenge_eval::loader::load_results_from_file;
//!
//! # fn main() -> coco_challenge_eval::Result<()> {
//! let gt = CocoIndex::from_file("instances_val.json")?;
//! let dt = gt.load_res(load_results_from_file("detections.json")?)?;
//! let mut eval = CocoEval::new(&gt, &dt, IouType::Segm);
//! eval.evaluate()?;
//! eval.accumulate()?;
//! let stats = eval.summarize()?;
//! println!("mask AP: {:.3}", stats.ap);
//! # Ok(())
//! # }
//! ```
//!
//! ## Submission format
//!
//! ```json
//! [
//!   {"image_id": 1, "category_id": 1, "bbox": [x, y, width, height], "score": 0.95},
//!   {"image_id": 1, "category_id": 2, "segmentation": {"size": [h, w], "counts": "..."}, "score": 0.5}
//! ]
//! ```

pub mod error;
pub mod types;
pub mod loader;
pub mod index;
pub mod params;
pub mod mask;
pub mod metrics;
pub mod matching;
pub mod evaluator;
pub mod stats;
pub mod precisions;
pub mod challenge;

// Re-export commonly used types and functions
pub use error::{CocoEvalError, Result};
pub use types::{
    Annotation, BoundingBox, Category, CocoDataset, DetectionRecord, Image, Rle, Segmentation,
};
pub use loader::{load_from_file, load_from_string, load_results_from_file};
pub use index::CocoIndex;
pub use params::{IouType, Params};
pub use evaluator::{Accumulation, CocoEval};
pub use stats::Stats;
pub use precisions::get_precisions;
pub use challenge::{EvaluationOutput, Phase, SplitMetrics};
