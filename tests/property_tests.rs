//! Property-based tests using proptest
//!
//! These tests verify mathematical properties and invariants that should
//! always hold regardless of the input values.

use coco_challenge_eval::challenge::SplitMetrics;
use coco_challenge_eval::evaluator::CocoEval;
use coco_challenge_eval::index::CocoIndex;
use coco_challenge_eval::mask;
use coco_challenge_eval::metrics::{calculate_iou, precision_envelope, precision_recall_curve};
use coco_challenge_eval::params::IouType;
use coco_challenge_eval::types::{
    Annotation, BoundingBox, Category, CocoDataset, DetectionRecord, Image, Rle,
};
use coco_challenge_eval::Stats;
use proptest::prelude::*;

fn bbox_strategy() -> impl Strategy<Value = BoundingBox> {
    (0.0f64..200.0, 0.0f64..200.0, 0.0f64..100.0, 0.0f64..100.0)
        .prop_map(|(x, y, w, h)| BoundingBox::new(x, y, w, h))
}

fn rle_strategy(h: u32, w: u32) -> impl Strategy<Value = Rle> {
    prop::collection::vec(any::<bool>(), (h * w) as usize).prop_map(move |bits| {
        let m: Vec<u8> = bits.into_iter().map(u8::from).collect();
        mask::encode(&m, h, w)
    })
}

// Property: IoU is symmetric and lies in [0, 1]
proptest! {
    #[test]
    fn prop_iou_symmetric_and_bounded(a in bbox_strategy(), b in bbox_strategy()) {
        let ab = calculate_iou(&a, &b);
        let ba = calculate_iou(&b, &a);
        prop_assert!((ab - ba).abs() < 1e-12);
        prop_assert!((0.0..=1.0).contains(&ab), "IoU out of range: {}", ab);
    }

    #[test]
    fn prop_iou_self_is_one(a in bbox_strategy()) {
        prop_assume!(a.width > 0.0 && a.height > 0.0);
        prop_assert!((calculate_iou(&a, &a) - 1.0).abs() < 1e-9);
    }
}

// Property: precision/recall curves stay in range and recall never decreases
proptest! {
    #[test]
    fn prop_precision_recall_curve(
        flags in prop::collection::vec(0u8..3, 0..60),
        extra_gt in 0usize..20,
    ) {
        let tp: Vec<bool> = flags.iter().map(|&f| f == 1).collect();
        let fp: Vec<bool> = flags.iter().map(|&f| f == 2).collect();
        let n_gt = tp.iter().filter(|&&t| t).count() + extra_gt;
        prop_assume!(n_gt > 0);

        let (precision, recall) = precision_recall_curve(&tp, &fp, n_gt);
        prop_assert_eq!(precision.len(), flags.len());
        for w in recall.windows(2) {
            prop_assert!(w[0] <= w[1]);
        }
        prop_assert!(precision.iter().all(|p| (0.0..=1.0).contains(p)));
        prop_assert!(recall.iter().all(|r| (0.0..=1.0).contains(r)));

        let mut envelope = precision.clone();
        precision_envelope(&mut envelope);
        for w in envelope.windows(2) {
            prop_assert!(w[0] >= w[1]);
        }
        for (e, p) in envelope.iter().zip(&precision) {
            prop_assert!(e >= p);
        }
    }
}

// Property: mask encodings agree with each other
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_rle_string_form_agrees(rle in rle_strategy(7, 9)) {
        let s = mask::rle_to_string(&rle);
        let decoded = mask::rle_from_string(&s, rle.h, rle.w).unwrap();
        prop_assert_eq!(&decoded, &rle);
        prop_assert_eq!(mask::decode(&decoded), mask::decode(&rle));
    }

    #[test]
    fn prop_mask_merge_areas(a in rle_strategy(6, 6), b in rle_strategy(6, 6)) {
        let union = mask::merge(&[a.clone(), b.clone()], false);
        let inter = mask::merge(&[a.clone(), b.clone()], true);
        prop_assert_eq!(
            mask::area(&union) + mask::area(&inter),
            mask::area(&a) + mask::area(&b)
        );

        let iou = mask::iou(&[a.clone()], &[b.clone()], &[false])[0][0];
        prop_assert!((-1.0..=1.0).contains(&iou));
        let back = mask::iou(&[b], &[a], &[false])[0][0];
        prop_assert!((iou - back).abs() < 1e-12);
    }

    #[test]
    fn prop_bbox_covers_mask(rle in rle_strategy(8, 5)) {
        let [x, y, w, h] = mask::to_bbox(&rle);
        let pixels = mask::decode(&rle);
        for (i, &v) in pixels.iter().enumerate() {
            if v == 1 {
                let px = (i / 8) as f64;
                let py = (i % 8) as f64;
                prop_assert!(px >= x && px < x + w);
                prop_assert!(py >= y && py < y + h);
            }
        }
    }
}

fn dataset(boxes: &[BoundingBox]) -> CocoIndex {
    CocoIndex::new(CocoDataset {
        images: Some(vec![Image {
            id: 1,
            file_name: "a.jpg".to_string(),
            height: 400,
            width: 400,
        }]),
        annotations: boxes
            .iter()
            .enumerate()
            .map(|(i, b)| Annotation {
                id: i as u64 + 1,
                image_id: 1,
                category_id: 1,
                bbox: b.to_array().to_vec(),
                segmentation: None,
                area: Some(b.area()),
                iscrowd: Some(0),
                score: None,
            })
            .collect(),
        categories: vec![Category {
            id: 1,
            name: "thing".to_string(),
            supercategory: None,
        }],
    })
}

fn evaluate(gt: &CocoIndex, records: Vec<DetectionRecord>) -> Stats {
    let dt = gt.load_res(records).unwrap();
    let mut eval = CocoEval::new(gt, &dt, IouType::Bbox);
    eval.evaluate().unwrap();
    eval.accumulate().unwrap();
    eval.summarize().unwrap()
}

// Property: summary statistics are either -1 or within [0, 1], and the
// leaderboard aliases always point at AP50
proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_stats_in_range(
        gt_boxes in prop::collection::vec(bbox_strategy(), 1..6),
        dt in prop::collection::vec((bbox_strategy(), 0.0f64..1.0), 0..10),
    ) {
        let gt = dataset(&gt_boxes);
        let records = dt
            .into_iter()
            .map(|(b, score)| DetectionRecord {
                image_id: 1,
                category_id: 1,
                bbox: Some(b.to_array().to_vec()),
                segmentation: None,
                score,
            })
            .collect();

        let stats = evaluate(&gt, records);
        for v in stats.to_array() {
            prop_assert!(v == -1.0 || (0.0..=1.0 + 1e-9).contains(&v), "stat {}", v);
        }
        // more detections per image never lowers recall
        prop_assert!(stats.ar1 <= stats.ar10 + 1e-12);
        prop_assert!(stats.ar10 <= stats.ar100 + 1e-12);

        let metrics = SplitMetrics::from(&stats);
        prop_assert_eq!(metrics.ap_easy, stats.ap50);
        prop_assert_eq!(metrics.ap_hard, stats.ap50);
        prop_assert_eq!(metrics.ar, stats.ap50);
    }

    #[test]
    fn prop_perfect_detections(gt_boxes in prop::collection::vec(bbox_strategy(), 1..6)) {
        prop_assume!(gt_boxes.iter().all(|b| b.width >= 1.0 && b.height >= 1.0));
        let gt = dataset(&gt_boxes);
        let records = gt_boxes
            .iter()
            .enumerate()
            .map(|(i, b)| DetectionRecord {
                image_id: 1,
                category_id: 1,
                bbox: Some(b.to_array().to_vec()),
                segmentation: None,
                score: 1.0 - i as f64 * 0.1,
            })
            .collect();

        let stats = evaluate(&gt, records);
        prop_assert!((stats.ap - 1.0).abs() < 1e-9, "AP = {}", stats.ap);
        prop_assert!((stats.ar100 - 1.0).abs() < 1e-9);
    }
}
