//! JSON loading utilities for COCO ground truth and result files.

use crate::error::{CocoEvalError, Result};
use crate::types::{CocoDataset, DetectionRecord};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Load a COCO dataset from a JSON file.
///
/// # Arguments
///
/// * `path` - Path to the COCO JSON file
///
/// # Returns
///
/// Returns a `CocoDataset` containing images, annotations, and categories.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
///
/// # Example
///
/// ```no_run
/// use coco_challenge_eval::loader::load_from_file;
///
/// let dataset = load_from_file("annotations.json").unwrap();
/// println!("Loaded {} annotations", dataset.annotations.len());
/// ```
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<CocoDataset> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let dataset: CocoDataset = serde_json::from_reader(reader)?;

    validate_dataset(&dataset)?;
    debug!(
        path = %path.as_ref().display(),
        annotations = dataset.annotations.len(),
        categories = dataset.categories.len(),
        "loaded ground truth"
    );

    Ok(dataset)
}

/// Load a COCO dataset from a JSON string.
///
/// # Example
///
/// ```
/// use coco_challenge_eval::loader::load_from_string;
///
/// let json = r#"{
///     "annotations": [],
///     "categories": [{"id": 1, "name": "person"}]
/// }"#;
/// let dataset = load_from_string(json).unwrap();
/// ```
pub fn load_from_string(json_str: &str) -> Result<CocoDataset> {
    let dataset: CocoDataset = serde_json::from_str(json_str)?;
    validate_dataset(&dataset)?;
    Ok(dataset)
}

/// Whether a submission path carries a `.json` extension (case-insensitive).
///
/// ```
/// use coco_challenge_eval::loader::is_json_submission;
///
/// assert!(is_json_submission("results/dets.json"));
/// assert!(!is_json_submission("results/dets.csv"));
/// assert!(!is_json_submission("result"));
/// ```
pub fn is_json_submission<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Load a COCO results file (a JSON array of detection records).
///
/// The path is checked for a `.json` extension before the file is opened.
///
/// # Errors
///
/// `UnsupportedSubmissionFormat` for non-JSON paths, otherwise I/O and parse errors.
pub fn load_results_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<DetectionRecord>> {
    let path = path.as_ref();
    if !is_json_submission(path) {
        return Err(CocoEvalError::UnsupportedSubmissionFormat(
            path.display().to_string(),
        ));
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let records: Vec<DetectionRecord> = serde_json::from_reader(reader)?;
    debug!(path = %path.display(), detections = records.len(), "loaded submission");

    Ok(records)
}

/// Parse a COCO results JSON string.
pub fn load_results_from_string(json_str: &str) -> Result<Vec<DetectionRecord>> {
    Ok(serde_json::from_str(json_str)?)
}

/// Validate that a COCO dataset has the required structure.
fn validate_dataset(dataset: &CocoDataset) -> Result<()> {
    if dataset.categories.is_empty() {
        return Err(CocoEvalError::EmptyDataset(
            "Dataset must contain at least one category".to_string(),
        ));
    }

    for annotation in &dataset.annotations {
        if annotation.bbox.is_empty() {
            if annotation.segmentation.is_none() {
                return Err(CocoEvalError::InvalidAnnotation(format!(
                    "Annotation {} has neither bbox nor segmentation",
                    annotation.id
                )));
            }
            continue;
        }

        if annotation.bbox.len() != 4 {
            return Err(CocoEvalError::InvalidAnnotation(format!(
                "Annotation {} has invalid bbox length: {}",
                annotation.id,
                annotation.bbox.len()
            )));
        }

        if !annotation.to_bbox()?.is_valid() {
            return Err(CocoEvalError::InvalidBoundingBox(format!(
                "Annotation {} has negative dimensions",
                annotation.id
            )));
        }
    }

    Ok(())
}
