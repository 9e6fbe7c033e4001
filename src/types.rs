//! Core data types for COCO annotations, detection results and masks.

use serde::{Deserialize, Serialize};

/// Represents a bounding box in COCO format (x, y, width, height).
///
/// Coordinates are in LTWH (Left-Top-Width-Height) format where:
/// - x: Left coordinate
/// - y: Top coordinate
/// - width: Box width
/// - height: Box height
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Get the area of the bounding box.
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Whether width and height are non-negative. Zero-sized boxes are allowed.
    pub fn is_valid(&self) -> bool {
        self.width >= 0.0 && self.height >= 0.0
    }

    /// The box as a `[x, y, width, height]` array.
    pub fn to_array(&self) -> [f64; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

/// Represents a category in the COCO dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supercategory: Option<String>,
}

/// Represents an image in the COCO dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: u64,
    #[serde(default)]
    pub file_name: String,
    pub height: u32,
    pub width: u32,
}

/// Counts of a run-length encoded mask, either as a plain list or as the
/// compact COCO string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RleCounts {
    Uncompressed(Vec<u32>),
    Compressed(String),
}

/// RLE segmentation as it appears in COCO JSON. `size` is `[height, width]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RleObject {
    pub size: [u32; 2],
    pub counts: RleCounts,
}

/// Segmentation of an annotation or detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    /// One or more polygons, each a flat `[x0, y0, x1, y1, ...]` list.
    Polygons(Vec<Vec<f64>>),
    Rle(RleObject),
}

/// Decoded run-length encoding of a binary mask.
///
/// Runs are stored column-major and alternate background/foreground,
/// starting with background (the first run may be zero).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rle {
    pub h: u32,
    pub w: u32,
    pub counts: Vec<u32>,
}

/// Represents an annotation in COCO format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    /// Bounding box in [x, y, width, height] format
    #[serde(default)]
    pub bbox: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<Segmentation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iscrowd: Option<u8>,
    /// Confidence score (for predictions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Annotation {
    /// Convert the bbox array to a BoundingBox struct.
    pub fn to_bbox(&self) -> crate::error::Result<BoundingBox> {
        if self.bbox.len() != 4 {
            return Err(crate::error::CocoEvalError::InvalidBoundingBox(format!(
                "Annotation {}: expected 4 values, got {}",
                self.id,
                self.bbox.len()
            )));
        }
        Ok(BoundingBox::new(
            self.bbox[0],
            self.bbox[1],
            self.bbox[2],
            self.bbox[3],
        ))
    }

    /// Get the confidence score, defaulting to 1.0 if not present.
    pub fn confidence(&self) -> f64 {
        self.score.unwrap_or(1.0)
    }

    /// Whether this annotation is a crowd region.
    pub fn is_crowd(&self) -> bool {
        self.iscrowd.unwrap_or(0) != 0
    }
}

/// Represents a complete COCO dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocoDataset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Image>>,
    pub annotations: Vec<Annotation>,
    pub categories: Vec<Category>,
}

/// One entry of a COCO results file as submitted by a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub image_id: u64,
    pub category_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<Segmentation>,
    pub score: f64,
}
