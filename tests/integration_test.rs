//! Integration tests for the complete COCO evaluation pipeline.

use coco_challenge_eval::evaluator::CocoEval;
use coco_challenge_eval::index::CocoIndex;
use coco_challenge_eval::params::{IouType, Params};
use coco_challenge_eval::types::{Annotation, Category, CocoDataset, DetectionRecord, Image};
use coco_challenge_eval::Stats;

fn create_annotation(id: u64, image_id: u64, category_id: u64, bbox: Vec<f64>) -> Annotation {
    let area = Some(bbox[2] * bbox[3]);
    Annotation {
        id,
        image_id,
        category_id,
        bbox,
        segmentation: None,
        area,
        iscrowd: Some(0),
        score: None,
    }
}

fn create_category(id: u64, name: &str) -> Category {
    Category {
        id,
        name: name.to_string(),
        supercategory: None,
    }
}

fn create_image(id: u64) -> Image {
    Image {
        id,
        file_name: format!("{:06}.jpg", id),
        height: 400,
        width: 400,
    }
}

fn detection(image_id: u64, category_id: u64, bbox: [f64; 4], score: f64) -> DetectionRecord {
    DetectionRecord {
        image_id,
        category_id,
        bbox: Some(bbox.to_vec()),
        segmentation: None,
        score,
    }
}

fn run(gt: &CocoIndex, detections: Vec<DetectionRecord>, params: Option<Params>) -> Stats {
    let dt = gt.load_res(detections).unwrap();
    let mut eval = match params {
        Some(params) => CocoEval::with_params(gt, &dt, params),
        None => CocoEval::new(gt, &dt, IouType::Bbox),
    };
    eval.evaluate().unwrap();
    eval.accumulate().unwrap();
    eval.summarize().unwrap()
}

fn two_object_ground_truth() -> CocoIndex {
    CocoIndex::new(CocoDataset {
        images: Some(vec![create_image(1)]),
        annotations: vec![
            create_annotation(1, 1, 1, vec![10.0, 10.0, 50.0, 50.0]),
            create_annotation(2, 1, 1, vec![100.0, 100.0, 50.0, 50.0]),
        ],
        categories: vec![create_category(1, "person")],
    })
}

fn assert_close(actual: f64, expected: f64, what: &str) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "{} should be {}, got {}",
        what,
        expected,
        actual
    );
}

#[test]
fn test_perfect_predictions() {
    let gt = two_object_ground_truth();
    let stats = run(
        &gt,
        vec![
            detection(1, 1, [10.0, 10.0, 50.0, 50.0], 0.95),
            detection(1, 1, [100.0, 100.0, 50.0, 50.0], 0.90),
        ],
        None,
    );

    assert_close(stats.ap, 1.0, "AP");
    assert_close(stats.ap50, 1.0, "AP50");
    assert_close(stats.ap75, 1.0, "AP75");
    assert_close(stats.ap_medium, 1.0, "AP_medium");
    // Both objects are 2500 px: no small or large ground truth
    assert_eq!(stats.ap_small, -1.0);
    assert_eq!(stats.ap_large, -1.0);

    // One detection per image can only recover one of the two objects
    assert_close(stats.ar1, 0.5, "AR@1");
    assert_close(stats.ar10, 1.0, "AR@10");
    assert_close(stats.ar100, 1.0, "AR@100");
    assert_eq!(stats.ar_small, -1.0);
    assert_close(stats.ar_medium, 1.0, "AR_medium");
    assert_eq!(stats.ar_large, -1.0);
}

#[test]
fn test_one_hit_one_false_positive() {
    let gt = two_object_ground_truth();
    let stats = run(
        &gt,
        vec![
            detection(1, 1, [10.0, 10.0, 50.0, 50.0], 0.9),
            detection(1, 1, [300.0, 300.0, 50.0, 50.0], 0.8),
        ],
        None,
    );

    // Precision 1 up to recall 0.5, nothing beyond: 51 of 101 recall levels
    let expected = 51.0 / 101.0;
    assert!((stats.ap - expected).abs() < 1e-6, "AP = {}", stats.ap);
    assert!((stats.ap50 - expected).abs() < 1e-6);
    assert!((stats.ap75 - expected).abs() < 1e-6);
    assert_close(stats.ar1, 0.5, "AR@1");
    assert_close(stats.ar100, 0.5, "AR@100");
}

#[test]
fn test_localization_quality_splits_thresholds() {
    let gt = CocoIndex::new(CocoDataset {
        images: Some(vec![create_image(1)]),
        annotations: vec![create_annotation(1, 1, 1, vec![0.0, 0.0, 100.0, 100.0])],
        categories: vec![create_category(1, "car")],
    });
    // IoU = 0.62: a hit for thresholds 0.50, 0.55 and 0.60 only
    let stats = run(&gt, vec![detection(1, 1, [0.0, 0.0, 62.0, 100.0], 0.7)], None);

    assert_close(stats.ap50, 1.0, "AP50");
    assert_close(stats.ap75, 0.0, "AP75");
    assert!((stats.ap - 0.3).abs() < 1e-6, "AP = {}", stats.ap);
    assert!((stats.ar100 - 0.3).abs() < 1e-9);
}

#[test]
fn test_crowd_region_absorbs_detections() {
    let mut crowd = create_annotation(2, 1, 1, vec![200.0, 200.0, 150.0, 150.0]);
    crowd.iscrowd = Some(1);
    let gt = CocoIndex::new(CocoDataset {
        images: Some(vec![create_image(1)]),
        annotations: vec![create_annotation(1, 1, 1, vec![10.0, 10.0, 50.0, 50.0]), crowd],
        categories: vec![create_category(1, "person")],
    });

    let stats = run(
        &gt,
        vec![
            detection(1, 1, [10.0, 10.0, 50.0, 50.0], 0.6),
            // Inside the crowd region: neither a hit nor a false positive
            detection(1, 1, [210.0, 210.0, 20.0, 20.0], 0.95),
            detection(1, 1, [250.0, 250.0, 30.0, 30.0], 0.9),
        ],
        None,
    );

    assert_close(stats.ap, 1.0, "AP");
    assert_close(stats.ar100, 1.0, "AR@100");
}

#[test]
fn test_unknown_category_is_never_scored() {
    let gt = two_object_ground_truth();
    let stats = run(
        &gt,
        vec![
            detection(1, 1, [10.0, 10.0, 50.0, 50.0], 0.95),
            detection(1, 1, [100.0, 100.0, 50.0, 50.0], 0.90),
            detection(1, 42, [300.0, 300.0, 50.0, 50.0], 0.99),
        ],
        None,
    );
    assert_close(stats.ap, 1.0, "AP");
}

#[test]
fn test_category_agnostic_evaluation() {
    let gt = CocoIndex::new(CocoDataset {
        images: Some(vec![create_image(1)]),
        annotations: vec![create_annotation(1, 1, 1, vec![10.0, 10.0, 50.0, 50.0])],
        categories: vec![create_category(1, "person"), create_category(2, "rider")],
    });
    let detections = vec![detection(1, 2, [10.0, 10.0, 50.0, 50.0], 0.9)];

    let stats = run(&gt, detections.clone(), None);
    assert_close(stats.ap, 0.0, "per-category AP");

    let mut params = Params::new(IouType::Bbox);
    params.img_ids = gt.img_ids().to_vec();
    params.cat_ids = gt.cat_ids();
    params.use_cats = false;
    let stats = run(&gt, detections, Some(params));
    assert_close(stats.ap, 1.0, "pooled AP");
}

#[test]
fn test_max_dets_keeps_highest_scores() {
    let gt = two_object_ground_truth();
    let stats = run(
        &gt,
        vec![
            detection(1, 1, [300.0, 300.0, 50.0, 50.0], 0.3),
            detection(1, 1, [100.0, 100.0, 50.0, 50.0], 0.99),
            detection(1, 1, [10.0, 10.0, 50.0, 50.0], 0.5),
        ],
        None,
    );

    // The top-scoring detection is a hit
    assert_close(stats.ar1, 0.5, "AR@1");
    assert_close(stats.ar10, 1.0, "AR@10");
    assert_close(stats.ap, 1.0, "AP");
}

#[test]
fn test_multiple_images_and_categories() {
    let gt = CocoIndex::new(CocoDataset {
        images: Some(vec![create_image(1), create_image(2)]),
        annotations: vec![
            create_annotation(1, 1, 1, vec![10.0, 10.0, 50.0, 50.0]),
            create_annotation(2, 2, 1, vec![10.0, 10.0, 50.0, 50.0]),
            create_annotation(3, 2, 2, vec![100.0, 100.0, 120.0, 120.0]),
        ],
        categories: vec![create_category(1, "person"), create_category(2, "bus")],
    });
    let stats = run(
        &gt,
        vec![
            detection(1, 1, [10.0, 10.0, 50.0, 50.0], 0.9),
            detection(2, 1, [10.0, 10.0, 50.0, 50.0], 0.8),
            detection(2, 2, [100.0, 100.0, 120.0, 120.0], 0.7),
        ],
        None,
    );

    assert_close(stats.ap, 1.0, "AP");
    assert_close(stats.ap_medium, 1.0, "AP_medium");
    assert_close(stats.ap_large, 1.0, "AP_large");
    assert_eq!(stats.ap_small, -1.0);
}

#[test]
fn test_no_detections() {
    let gt = two_object_ground_truth();
    let stats = run(&gt, Vec::new(), None);

    assert_eq!(stats.ap, 0.0);
    assert_eq!(stats.ar100, 0.0);
    assert_eq!(stats.ap_small, -1.0);
}

#[test]
fn test_accumulation_scores_follow_ranking() {
    let gt = two_object_ground_truth();
    let dt = gt
        .load_res(vec![
            detection(1, 1, [10.0, 10.0, 50.0, 50.0], 0.9),
            detection(1, 1, [100.0, 100.0, 50.0, 50.0], 0.4),
        ])
        .unwrap();
    let mut eval = CocoEval::new(&gt, &dt, IouType::Bbox);
    eval.evaluate().unwrap();
    eval.accumulate().unwrap();

    let acc = eval.accumulation().unwrap();
    // t=0, area=all, maxDets=100
    assert_eq!(acc.score(0, 0, 0, 0, 2), 0.9);
    assert_eq!(acc.score(0, 50, 0, 0, 2), 0.9);
    assert_eq!(acc.score(0, 51, 0, 0, 2), 0.4);
    assert_eq!(acc.score(0, 100, 0, 0, 2), 0.4);
}
