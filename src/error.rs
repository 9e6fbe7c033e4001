//! Error types for the coco-challenge-eval library.

use thiserror::Error;

/// Result type for coco-challenge-eval operations.
pub type Result<T> = std::result::Result<T, CocoEvalError>;

/// Error types that can occur during COCO evaluation.
#[derive(Error, Debug)]
pub enum CocoEvalError {
    /// Error during JSON parsing or serialization.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error during I/O operations.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid annotation data.
    #[error("Invalid annotation: {0}")]
    InvalidAnnotation(String),

    /// Invalid bounding box coordinates.
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// Segmentation that cannot be turned into a mask.
    #[error("Invalid segmentation: {0}")]
    InvalidSegmentation(String),

    /// Empty dataset provided.
    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    /// Submission file is not a JSON file.
    #[error("Unsupported submission format: {0} (only json file submission is supported)")]
    UnsupportedSubmissionFormat(String),

    /// Detection record references an image that is not part of the ground truth.
    #[error("Unknown image: result references image id {0} which is not in the ground truth")]
    UnknownImage(u64),

    /// Unknown metric / IoU type name.
    #[error("Invalid metric: {0} (expected \"bbox\" or \"segm\")")]
    InvalidMetric(String),

    /// Evaluation step invoked before the step it depends on.
    #[error("Pipeline order: {0}")]
    PipelineOrder(&'static str),
}
