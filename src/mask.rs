//! Run-length encoded mask operations used for segmentation evaluation.
//!
//! Masks are column-major: pixel `(x, y)` lives at index `y + h * x`. Runs alternate
//! background/foreground and always start with a (possibly empty) background run.
//! Polygon rasterization and the compact string form follow the conventions of the
//! reference COCO mask API so areas and IoUs agree with published results.

use crate::error::{CocoEvalError, Result};
use crate::metrics::iou::bbox_iou_matrix;
use crate::types::{Rle, RleCounts, Segmentation};

impl Rle {
    /// An all-background mask of the given size.
    pub fn empty(h: u32, w: u32) -> Result<Self> {
        Ok(Rle {
            h,
            w,
            counts: vec![pixel_count(h, w)?],
        })
    }
}

/// Pixels in an `h x w` mask. Every run length is a `u32`, so the whole mask must fit one.
fn pixel_count(h: u32, w: u32) -> Result<u32> {
    h.checked_mul(w).ok_or_else(|| {
        CocoEvalError::InvalidSegmentation(format!(
            "mask size {}x{} exceeds {} pixels",
            h,
            w,
            u32::MAX
        ))
    })
}

/// Reject polygon points that are not finite or lie more than one image size
/// outside the image. The rasterizer walks every boundary pixel, so its cost
/// follows the coordinates.
fn check_polygon_bounds(xy: &[f64], h: u32, w: u32) -> Result<()> {
    let (fw, fh) = (w as f64, h as f64);
    for point in xy.chunks_exact(2) {
        let (x, y) = (point[0], point[1]);
        let inside = x.is_finite()
            && y.is_finite()
            && (-fw - 1.0..=2.0 * fw + 1.0).contains(&x)
            && (-fh - 1.0..=2.0 * fh + 1.0).contains(&y);
        if !inside {
            return Err(CocoEvalError::InvalidSegmentation(format!(
                "polygon point ({}, {}) lies far outside the {}x{} image",
                x, y, w, h
            )));
        }
    }
    Ok(())
}

/// Encode a column-major binary mask into RLE.
///
/// `mask.len()` must equal `h * w`.
pub fn encode(mask: &[u8], h: u32, w: u32) -> Rle {
    let mut counts = Vec::new();
    let mut p: u8 = 0;
    let mut c: u32 = 0;

    for &v in mask {
        let v = u8::from(v != 0);
        if v != p {
            counts.push(c);
            c = 0;
            p = v;
        }
        c += 1;
    }
    counts.push(c);

    Rle { h, w, counts }
}

/// Decode an RLE to a column-major binary mask of size `h * w`.
pub fn decode(rle: &Rle) -> Vec<u8> {
    let n = (rle.h as usize) * (rle.w as usize);
    let mut mask = vec![0u8; n];
    let mut idx = 0usize;
    let mut v = 0u8;
    for &c in &rle.counts {
        let end = (idx + c as usize).min(n);
        mask[idx..end].fill(v);
        idx = end;
        v = 1 - v;
    }
    mask
}

/// Number of foreground pixels (sum of the odd-indexed runs).
pub fn area(rle: &Rle) -> u64 {
    rle.counts
        .iter()
        .skip(1)
        .step_by(2)
        .map(|&c| c as u64)
        .sum()
}

/// Tight bounding box `[x, y, w, h]` of the foreground pixels.
pub fn to_bbox(rle: &Rle) -> [f64; 4] {
    let h = rle.h as u64;
    // A trailing background run carries no extent.
    let m = (rle.counts.len() / 2) * 2;
    if m == 0 || h == 0 {
        return [0.0; 4];
    }

    let (mut xs, mut ys) = (rle.w as u64, h);
    let (mut xe, mut ye) = (0u64, 0u64);
    let mut xp = 0u64;
    let mut cc = 0u64;

    for (j, &c) in rle.counts[..m].iter().enumerate() {
        cc += c as u64;
        let t = cc.saturating_sub((j % 2) as u64);
        let y = t % h;
        let x = (t - y) / h;
        if j % 2 == 0 {
            xp = x;
        } else if xp < x {
            // run wraps into a new column, so it spans the full height
            ys = 0;
            ye = h - 1;
        }
        xs = xs.min(x);
        xe = xe.max(x);
        ys = ys.min(y);
        ye = ye.max(y);
    }

    [
        xs as f64,
        ys as f64,
        (xe - xs + 1) as f64,
        (ye - ys + 1) as f64,
    ]
}

/// Cursor over the runs of one mask, used to walk two masks in lockstep.
struct RunCursor<'a> {
    counts: &'a [u32],
    next: usize,
    remaining: u64,
    foreground: bool,
}

impl<'a> RunCursor<'a> {
    fn new(rle: &'a Rle) -> Self {
        RunCursor {
            counts: &rle.counts,
            next: 1,
            remaining: rle.counts.first().copied().unwrap_or(0) as u64,
            foreground: false,
        }
    }

    fn is_done(&self) -> bool {
        self.remaining == 0 && self.next >= self.counts.len()
    }

    /// Consume `c` pixels, moving to the next run when the current one is exhausted.
    fn advance(&mut self, c: u64) {
        self.remaining = self.remaining.saturating_sub(c);
        if self.remaining == 0 {
            if self.next < self.counts.len() {
                self.remaining = self.counts[self.next] as u64;
                self.next += 1;
                self.foreground = !self.foreground;
            } else {
                self.foreground = false;
            }
        }
    }
}

/// Length of the next segment over which neither cursor changes value.
fn step(ca: &RunCursor<'_>, cb: &RunCursor<'_>) -> Option<u64> {
    match (ca.is_done(), cb.is_done()) {
        (true, true) => None,
        (true, false) => Some(cb.remaining),
        (false, true) => Some(ca.remaining),
        (false, false) => Some(ca.remaining.min(cb.remaining)),
    }
}

/// Merge two masks of identical size with union or intersection.
fn merge_two(a: &Rle, b: &Rle, intersect: bool) -> Vec<u32> {
    let mut counts = Vec::new();
    let mut ca = RunCursor::new(a);
    let mut cb = RunCursor::new(b);
    let mut v = false;
    let mut cc = 0u64;

    while let Some(c) = step(&ca, &cb) {
        cc += c;
        ca.advance(c);
        cb.advance(c);
        let vp = v;
        v = if intersect {
            ca.foreground && cb.foreground
        } else {
            ca.foreground || cb.foreground
        };
        if v != vp || (ca.is_done() && cb.is_done()) {
            counts.push(cc as u32);
            cc = 0;
        }
    }

    counts
}

/// Merge masks with union (`intersect == false`) or intersection.
///
/// Masks of differing sizes merge to an empty 0x0 mask.
pub fn merge(rles: &[Rle], intersect: bool) -> Rle {
    let Some(first) = rles.first() else {
        return Rle {
            h: 0,
            w: 0,
            counts: Vec::new(),
        };
    };

    let mut result = first.clone();
    for rle in &rles[1..] {
        if rle.h != result.h || rle.w != result.w {
            return Rle {
                h: 0,
                w: 0,
                counts: Vec::new(),
            };
        }
        result.counts = merge_two(&result, rle, intersect);
    }
    result
}

/// Intersection and union pixel counts of two masks of identical size.
fn intersection_union(a: &Rle, b: &Rle) -> (u64, u64) {
    let mut ca = RunCursor::new(a);
    let mut cb = RunCursor::new(b);
    let (mut inter, mut union) = (0u64, 0u64);

    while let Some(c) = step(&ca, &cb) {
        if ca.foreground || cb.foreground {
            union += c;
            if ca.foreground && cb.foreground {
                inter += c;
            }
        }
        ca.advance(c);
        cb.advance(c);
    }

    (inter, union)
}

/// IoU matrix between detection masks (rows) and ground-truth masks (columns).
///
/// For crowd ground truth the denominator is the detection area instead of the
/// union. Pairs with mismatched mask sizes get `-1`.
pub fn iou(dt: &[Rle], gt: &[Rle], iscrowd: &[bool]) -> Vec<Vec<f64>> {
    if dt.is_empty() || gt.is_empty() {
        return vec![Vec::new(); dt.len()];
    }

    let dt_boxes: Vec<[f64; 4]> = dt.iter().map(to_bbox).collect();
    let gt_boxes: Vec<[f64; 4]> = gt.iter().map(to_bbox).collect();
    let mut ious = bbox_iou_matrix(&dt_boxes, &gt_boxes, iscrowd);

    for (d, row) in ious.iter_mut().enumerate() {
        for (g, value) in row.iter_mut().enumerate() {
            if *value <= 0.0 {
                continue;
            }
            if dt[d].h != gt[g].h || dt[d].w != gt[g].w {
                *value = -1.0;
                continue;
            }
            let (inter, union) = intersection_union(&dt[d], &gt[g]);
            let denom = if inter == 0 {
                1
            } else if iscrowd.get(g).copied().unwrap_or(false) {
                area(&dt[d])
            } else {
                union
            };
            *value = inter as f64 / denom as f64;
        }
    }

    ious
}

/// Rasterize one polygon (flat `[x0, y0, x1, y1, ...]`) into an RLE mask.
///
/// # Errors
///
/// `InvalidSegmentation` for masks too large to encode and for points far
/// outside the image.
pub fn fr_poly(xy: &[f64], h: u32, w: u32) -> Result<Rle> {
    const SCALE: f64 = 5.0;
    pixel_count(h, w)?;
    let k = xy.len() / 2;
    if k == 0 {
        return Rle::empty(h, w);
    }
    check_polygon_bounds(xy, h, w)?;

    // upsample and get discrete points densely along the boundary
    let mut x: Vec<i64> = (0..k).map(|j| (SCALE * xy[j * 2] + 0.5) as i64).collect();
    let mut y: Vec<i64> = (0..k).map(|j| (SCALE * xy[j * 2 + 1] + 0.5) as i64).collect();
    x.push(x[0]);
    y.push(y[0]);

    let mut u: Vec<i64> = Vec::new();
    let mut v: Vec<i64> = Vec::new();
    for j in 0..k {
        let (mut xs, mut xe, mut ys, mut ye) = (x[j], x[j + 1], y[j], y[j + 1]);
        let dx = (xe - xs).abs();
        let dy = (ys - ye).abs();
        let flip = (dx >= dy && xs > xe) || (dx < dy && ys > ye);
        if flip {
            std::mem::swap(&mut xs, &mut xe);
            std::mem::swap(&mut ys, &mut ye);
        }
        if dx >= dy {
            let s = if dx == 0 { 0.0 } else { (ye - ys) as f64 / dx as f64 };
            for d in 0..=dx {
                let t = if flip { dx - d } else { d };
                u.push(t + xs);
                v.push((ys as f64 + s * t as f64 + 0.5) as i64);
            }
        } else {
            let s = (xe - xs) as f64 / dy as f64;
            for d in 0..=dy {
                let t = if flip { dy - d } else { d };
                v.push(t + ys);
                u.push((xs as f64 + s * t as f64 + 0.5) as i64);
            }
        }
    }

    // keep points where the boundary crosses a pixel column, then downsample
    let mut boundary: Vec<u64> = Vec::new();
    for j in 1..u.len() {
        if u[j] == u[j - 1] {
            continue;
        }
        let xd = if u[j] < u[j - 1] { u[j] } else { u[j] - 1 } as f64;
        let xd = (xd + 0.5) / SCALE - 0.5;
        if xd.floor() != xd || xd < 0.0 || xd > (w as f64 - 1.0) {
            continue;
        }
        let yd = if v[j] < v[j - 1] { v[j] } else { v[j - 1] } as f64;
        let yd = ((yd + 0.5) / SCALE - 0.5).clamp(0.0, h as f64).ceil();
        boundary.push(xd as u64 * h as u64 + yd as u64);
    }
    boundary.push(h as u64 * w as u64);
    boundary.sort_unstable();

    // differences between sorted boundary points are the runs; drop empty runs
    let mut prev = 0u64;
    let diffs: Vec<u64> = boundary
        .iter()
        .map(|&t| {
            let d = t - prev;
            prev = t;
            d
        })
        .collect();

    let mut counts: Vec<u32> = Vec::with_capacity(diffs.len());
    let mut j = 0;
    counts.push(diffs[j] as u32);
    j += 1;
    while j < diffs.len() {
        if diffs[j] > 0 {
            counts.push(diffs[j] as u32);
            j += 1;
        } else {
            j += 1;
            if j < diffs.len() {
                if let Some(last) = counts.last_mut() {
                    *last += diffs[j] as u32;
                }
                j += 1;
            }
        }
    }

    Ok(Rle { h, w, counts })
}

/// Rasterize all polygons of one object and merge them with union.
pub fn fr_polys(polygons: &[Vec<f64>], h: u32, w: u32) -> Result<Rle> {
    if polygons.is_empty() {
        return Rle::empty(h, w);
    }
    let rles = polygons
        .iter()
        .map(|p| fr_poly(p, h, w))
        .collect::<Result<Vec<_>>>()?;
    Ok(merge(&rles, false))
}

/// Rasterize a bounding box `[x, y, w, h]` the way polygon boxes are rasterized.
pub fn fr_bbox(bb: &[f64; 4], h: u32, w: u32) -> Result<Rle> {
    let (x1, y1) = (bb[0], bb[1]);
    let (x2, y2) = (bb[0] + bb[2], bb[1] + bb[3]);
    fr_poly(&[x1, y1, x1, y2, x2, y2, x2, y1], h, w)
}

/// Compress an RLE into the COCO string form.
///
/// Counts past index 2 are stored as deltas against the count two places earlier,
/// then written in 5-bit groups offset by 48.
pub fn rle_to_string(rle: &Rle) -> String {
    let mut s = String::new();
    for (i, &cnt) in rle.counts.iter().enumerate() {
        let mut x = cnt as i64;
        if i > 2 {
            x -= rle.counts[i - 2] as i64;
        }
        loop {
            let mut c = (x & 0x1f) as u8;
            x >>= 5;
            let more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
            if more {
                c |= 0x20;
            }
            s.push((c + 48) as char);
            if !more {
                break;
            }
        }
    }
    s
}

/// Decompress the COCO string form into an RLE.
pub fn rle_from_string(s: &str, h: u32, w: u32) -> Result<Rle> {
    // 12 five-bit groups plus sign extension still fit an i64
    const MAX_GROUPS: u32 = 12;

    let bytes = s.as_bytes();
    let mut counts: Vec<u32> = Vec::new();
    let mut p = 0;

    while p < bytes.len() {
        let mut x: i64 = 0;
        let mut k: u32 = 0;
        loop {
            if k >= MAX_GROUPS {
                return Err(CocoEvalError::InvalidSegmentation(
                    "compressed RLE count too long".to_string(),
                ));
            }
            let Some(&byte) = bytes.get(p) else {
                return Err(CocoEvalError::InvalidSegmentation(
                    "truncated compressed RLE counts".to_string(),
                ));
            };
            let c = byte
                .checked_sub(48)
                .filter(|c| *c < 64)
                .ok_or_else(|| {
                    CocoEvalError::InvalidSegmentation(format!(
                        "invalid character {:?} in compressed RLE counts",
                        byte as char
                    ))
                })? as i64;
            x |= (c & 0x1f) << (5 * k);
            p += 1;
            k += 1;
            if c & 0x20 == 0 {
                if c & 0x10 != 0 {
                    x |= -1i64 << (5 * k);
                }
                break;
            }
        }
        if counts.len() > 2 {
            x += counts[counts.len() - 2] as i64;
        }
        let count = u32::try_from(x).map_err(|_| {
            CocoEvalError::InvalidSegmentation(format!("run length {} out of range in RLE", x))
        })?;
        counts.push(count);
    }

    Ok(Rle { h, w, counts })
}

/// Convert any COCO segmentation into an RLE.
///
/// Polygons need the size of the image they belong to; RLE objects carry their own.
pub fn from_segmentation(segmentation: &Segmentation, h: u32, w: u32) -> Result<Rle> {
    match segmentation {
        Segmentation::Polygons(polygons) => {
            if let Some(bad) = polygons.iter().find(|p| p.len() % 2 != 0) {
                return Err(CocoEvalError::InvalidSegmentation(format!(
                    "polygon has an odd number of coordinates ({})",
                    bad.len()
                )));
            }
            fr_polys(polygons, h, w)
        }
        Segmentation::Rle(obj) => {
            let [rh, rw] = obj.size;
            pixel_count(rh, rw)?;
            let rle = match &obj.counts {
                RleCounts::Uncompressed(counts) => Rle {
                    h: rh,
                    w: rw,
                    counts: counts.clone(),
                },
                RleCounts::Compressed(s) => rle_from_string(s, rh, rw)?,
            };
            let total: u64 = rle.counts.iter().map(|&c| c as u64).sum();
            if total != rh as u64 * rw as u64 {
                return Err(CocoEvalError::InvalidSegmentation(format!(
                    "RLE counts cover {} pixels, expected {}x{}",
                    total, rh, rw
                )));
            }
            Ok(rle)
        }
    }
}
