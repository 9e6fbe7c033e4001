//! In-memory index over a COCO dataset, and conversion of submitted results into one.

use crate::error::{CocoEvalError, Result};
use crate::loader::{load_from_file, load_from_string};
use crate::mask;
use crate::types::{Annotation, Category, CocoDataset, DetectionRecord, Image, Rle, Segmentation};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// Ground truth or detections, indexed by image and category.
#[derive(Debug, Clone)]
pub struct CocoIndex {
    annotations: Vec<Annotation>,
    images: BTreeMap<u64, Image>,
    categories: BTreeMap<u64, Category>,
    img_ids: Vec<u64>,
}

impl CocoIndex {
    /// Build the index. Image ids come from the `images` list when present,
    /// otherwise from the annotations.
    pub fn new(dataset: CocoDataset) -> Self {
        let images: BTreeMap<u64, Image> = dataset
            .images
            .unwrap_or_default()
            .into_iter()
            .map(|img| (img.id, img))
            .collect();

        let img_ids: Vec<u64> = if images.is_empty() {
            dataset
                .annotations
                .iter()
                .map(|ann| ann.image_id)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        } else {
            images.keys().copied().collect()
        };

        let categories = dataset
            .categories
            .into_iter()
            .map(|cat| (cat.id, cat))
            .collect();

        CocoIndex {
            annotations: dataset.annotations,
            images,
            categories,
            img_ids,
        }
    }

    /// Load and index a ground-truth annotation file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(load_from_file(path)?))
    }

    /// Load and index a ground-truth annotation JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        Ok(Self::new(load_from_string(json_str)?))
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Sorted image ids.
    pub fn img_ids(&self) -> &[u64] {
        &self.img_ids
    }

    /// Sorted category ids.
    pub fn cat_ids(&self) -> Vec<u64> {
        self.categories.keys().copied().collect()
    }

    pub fn category(&self, id: u64) -> Option<&Category> {
        self.categories.get(&id)
    }

    pub fn image(&self, id: u64) -> Option<&Image> {
        self.images.get(&id)
    }

    pub fn contains_image(&self, id: u64) -> bool {
        self.img_ids.binary_search(&id).is_ok()
    }

    /// Turn submitted detection records into an index bound to this ground truth.
    ///
    /// Box records get `area = w * h`; mask-only records get the mask area and
    /// bounding box. Every detection gets `id = position + 1` and `iscrowd = 0`.
    /// Images and categories are shared with the ground truth.
    ///
    /// # Errors
    ///
    /// `UnknownImage` when a record points at an image the ground truth lacks.
    pub fn load_res(&self, records: Vec<DetectionRecord>) -> Result<CocoIndex> {
        let mut annotations = Vec::with_capacity(records.len());

        for (i, record) in records.into_iter().enumerate() {
            if !self.contains_image(record.image_id) {
                return Err(CocoEvalError::UnknownImage(record.image_id));
            }
            let id = i as u64 + 1;

            let (bbox, area) = match (&record.bbox, &record.segmentation) {
                (Some(bbox), _) if !bbox.is_empty() => {
                    if bbox.len() != 4 {
                        return Err(CocoEvalError::InvalidBoundingBox(format!(
                            "Detection {}: expected 4 values, got {}",
                            id,
                            bbox.len()
                        )));
                    }
                    (bbox.clone(), bbox[2] * bbox[3])
                }
                (_, Some(segmentation)) => {
                    let rle = self.segmentation_rle(record.image_id, segmentation)?;
                    (mask::to_bbox(&rle).to_vec(), mask::area(&rle) as f64)
                }
                _ => {
                    return Err(CocoEvalError::InvalidAnnotation(format!(
                        "Detection {} has neither bbox nor segmentation",
                        id
                    )))
                }
            };

            annotations.push(Annotation {
                id,
                image_id: record.image_id,
                category_id: record.category_id,
                bbox,
                segmentation: record.segmentation,
                area: Some(area),
                iscrowd: Some(0),
                score: Some(record.score),
            });
        }

        debug!(detections = annotations.len(), "loaded results into index");

        Ok(CocoIndex {
            annotations,
            images: self.images.clone(),
            categories: self.categories.clone(),
            img_ids: self.img_ids.clone(),
        })
    }

    /// Mask of an annotation: its segmentation, or its box rasterized at image size.
    pub fn annotation_rle(&self, ann: &Annotation) -> Result<Rle> {
        match &ann.segmentation {
            Some(segmentation) => self.segmentation_rle(ann.image_id, segmentation),
            None => {
                let bbox = ann.to_bbox()?;
                let (h, w) = self.image_size(ann.image_id)?;
                mask::fr_bbox(&bbox.to_array(), h, w)
            }
        }
    }

    fn segmentation_rle(&self, image_id: u64, segmentation: &Segmentation) -> Result<Rle> {
        match segmentation {
            Segmentation::Polygons(_) => {
                let (h, w) = self.image_size(image_id)?;
                mask::from_segmentation(segmentation, h, w)
            }
            Segmentation::Rle(obj) => mask::from_segmentation(segmentation, obj.size[0], obj.size[1]),
        }
    }

    fn image_size(&self, image_id: u64) -> Result<(u32, u32)> {
        self.images
            .get(&image_id)
            .map(|img| (img.height, img.width))
            .ok_or_else(|| {
                CocoEvalError::InvalidSegmentation(format!(
                    "image {} has no size information; polygons need image height and width",
                    image_id
                ))
            })
    }
}
