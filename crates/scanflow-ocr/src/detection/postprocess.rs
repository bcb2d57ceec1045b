//! Heatmap → scored text boxes
//!
//! Steps, in order:
//! 1. Binarize the probability map at `threshold`
//! 2. Dilate asymmetrically so glyphs of one line join into one component
//! 3. Label connected components on the dilated mask
//! 4. Per component, measure the un-dilated box and the mean probability of its raw pixels
//! 5. Drop components below `min_area` or [`MIN_RAW_PIXELS`], or scoring below `box_threshold`
//! 6. Unclip the box outward by `area * unclip_ratio / perimeter`
//! 7. Scale to image coordinates and clip to the image

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use super::morphology::{binarize, dilate_asymmetric};
use crate::config::{Connectivity, DetectionParams};
use crate::error::{OcrError, Result};
use crate::geometry::{Point, Quad, Rect};
use geo::{Area, Coord, EuclideanLength, LineString, Polygon};
use geo_clipper::{ClipperInt, EndType, JoinType};
use image::Luma;
use imageproc::region_labelling::connected_components;
use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2};
use serde::{Deserialize, Serialize};

/// Components with fewer raw (pre-dilation) pixels are noise
pub const MIN_RAW_PIXELS: usize = 4;

/// One detected text box in original-image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedBox {
    /// Corners clockwise from top-left
    pub polygon: Quad,
    /// Axis-aligned bounds of `polygon`
    pub bounds: Rect,
    /// Mean probability of the component's raw pixels
    pub score: f32,
}

/// Factors mapping heatmap pixels to original-image pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapScale {
    pub x: f32,
    pub y: f32,
}

impl MapScale {
    #[inline]
    #[must_use = "scale is created but not used"]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Scale from a heatmap of `map_size` to an image of `image_size`, both `(width, height)`
    #[must_use = "scale is computed but not used"]
    pub fn between(map_size: (usize, usize), image_size: (u32, u32)) -> Self {
        let sx = if map_size.0 == 0 {
            1.0
        } else {
            image_size.0 as f32 / map_size.0 as f32
        };
        let sy = if map_size.1 == 0 {
            1.0
        } else {
            image_size.1 as f32 / map_size.1 as f32
        };
        Self::new(sx, sy)
    }
}

impl Default for MapScale {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

/// Borrow the 2-D probability map out of a `[H, W]` or `[N, 1, H, W]` tensor.
///
/// Batched tensors yield their first map.
///
/// # Errors
///
/// Returns [`OcrError::InvalidInput`] for any other shape.
pub fn heatmap_view<'a>(tensor: ArrayViewD<'a, f32>) -> Result<ArrayView2<'a, f32>> {
    let shape = tensor.shape().to_vec();
    let view = match shape.as_slice() {
        [_, _] => tensor,
        [n, 1, _, _] if *n >= 1 => tensor.index_axis_move(Axis(0), 0).index_axis_move(Axis(0), 0),
        _ => {
            return Err(OcrError::InvalidInput(format!(
                "expected heatmap of shape [H, W] or [N, 1, H, W], got {shape:?}"
            )))
        }
    };
    view.into_dimensionality::<Ix2>()
        .map_err(|e| OcrError::InvalidInput(format!("heatmap shape: {e}")))
}

#[derive(Debug, Clone, Copy)]
struct ComponentStats {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    raw_pixels: usize,
    prob_sum: f64,
}

impl ComponentStats {
    const fn new(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            raw_pixels: 0,
            prob_sum: 0.0,
        }
    }

    fn add(&mut self, x: u32, y: u32, prob: f32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.raw_pixels += 1;
        self.prob_sum += f64::from(prob);
    }

    fn bbox_area(&self) -> f32 {
        ((self.max_x - self.min_x + 1) * (self.max_y - self.min_y + 1)) as f32
    }

    fn score(&self) -> f32 {
        if self.raw_pixels == 0 {
            0.0
        } else {
            (self.prob_sum / self.raw_pixels as f64) as f32
        }
    }
}

/// Turn a probability map into scored boxes.
///
/// `scale` maps heatmap pixels to image pixels; results are clipped to
/// `image_size` (`(width, height)`). Zero boxes is a valid result. Output is
/// ordered by the (top, left) corner of each component.
#[must_use = "returns the detected boxes"]
pub fn postprocess_heatmap(
    heatmap: ArrayView2<'_, f32>,
    scale: MapScale,
    image_size: (u32, u32),
    params: &DetectionParams,
) -> Vec<DetectedBox> {
    let (height, width) = heatmap.dim();
    if height == 0 || width == 0 {
        return Vec::new();
    }

    let binary = binarize(heatmap, params.threshold);
    let dilated = dilate_asymmetric(&binary, params.dilation_x, params.dilation_y);
    let connectivity = match params.connectivity {
        Connectivity::Four => imageproc::region_labelling::Connectivity::Four,
        Connectivity::Eight => imageproc::region_labelling::Connectivity::Eight,
    };
    let labels = connected_components(&dilated, connectivity, Luma([0u8]));

    // Only raw pixels contribute to a component's box and score
    let mut stats: Vec<Option<ComponentStats>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0] as usize;
        if label == 0 || binary.get_pixel(x, y).0[0] == 0 {
            continue;
        }
        if stats.len() <= label {
            stats.resize(label + 1, None);
        }
        stats[label]
            .get_or_insert_with(|| ComponentStats::new(x, y))
            .add(x, y, heatmap[[y as usize, x as usize]]);
    }

    let mut candidates: Vec<ComponentStats> = stats
        .into_iter()
        .flatten()
        .filter(|s| s.bbox_area() >= params.min_area && s.raw_pixels >= MIN_RAW_PIXELS)
        .collect();
    candidates.sort_by_key(|s| (s.min_y, s.min_x, s.max_y, s.max_x));

    let total = candidates.len();
    let boxes: Vec<DetectedBox> = candidates
        .into_iter()
        .filter_map(|s| {
            let score = s.score();
            if score < params.box_threshold {
                return None;
            }
            let rect = Rect::from_edges(
                s.min_x as f32,
                s.min_y as f32,
                (s.max_x + 1) as f32,
                (s.max_y + 1) as f32,
            );
            let expanded = unclip_rect(&rect, params.unclip_ratio);
            scale_and_clip(&expanded, scale, image_size).map(|bounds| DetectedBox {
                polygon: bounds.to_quad(),
                bounds,
                score,
            })
        })
        .collect();

    log::debug!(
        "Detection: {} components passed size filters, {} boxes kept (map {}x{})",
        total,
        boxes.len(),
        width,
        height
    );
    boxes
}

/// Expand a box outward by `area * unclip_ratio / perimeter` with round joins.
///
/// Returns the axis-aligned bounds of the offset polygon.
#[must_use = "returns the expanded rectangle"]
pub fn unclip_rect(rect: &Rect, unclip_ratio: f32) -> Rect {
    let corners = rect.to_quad();
    let coords_float: Vec<Coord<f64>> = corners
        .iter()
        .map(|p| Coord {
            x: f64::from(p.x),
            y: f64::from(p.y),
        })
        .collect();
    let poly_float = Polygon::new(LineString::from(coords_float), vec![]);
    let perimeter = poly_float.exterior().euclidean_length();
    if perimeter <= 0.0 {
        return *rect;
    }
    let distance = poly_float.unsigned_area() * f64::from(unclip_ratio) / perimeter;

    // Component boxes have integer edges, so the integer clipper is exact here
    let coords_int: Vec<Coord<i64>> = corners
        .iter()
        .map(|p| Coord {
            x: p.x.round() as i64,
            y: p.y.round() as i64,
        })
        .collect();
    let poly_int = Polygon::new(LineString::from(coords_int), vec![]);
    let offset = poly_int.offset(distance, JoinType::Round(0.25), EndType::ClosedPolygon);

    let points: Vec<Point> = offset
        .0
        .first()
        .map(|p| {
            p.exterior()
                .coords()
                .map(|c| Point::new(c.x as f32, c.y as f32))
                .collect()
        })
        .unwrap_or_default();

    Rect::enclosing(&points).unwrap_or_else(|| {
        let d = distance as f32;
        Rect::from_edges(rect.x - d, rect.y - d, rect.right() + d, rect.bottom() + d)
    })
}

fn scale_and_clip(rect: &Rect, scale: MapScale, image_size: (u32, u32)) -> Option<Rect> {
    let (w, h) = (image_size.0 as f32, image_size.1 as f32);
    let left = (rect.x * scale.x).clamp(0.0, w);
    let top = (rect.y * scale.y).clamp(0.0, h);
    let right = (rect.right() * scale.x).clamp(0.0, w);
    let bottom = (rect.bottom() * scale.y).clamp(0.0, h);
    (right > left && bottom > top).then(|| Rect::from_edges(left, top, right, bottom))
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array4};

    fn paint(map: &mut Array2<f32>, x0: usize, y0: usize, x1: usize, y1: usize, v: f32) {
        for y in y0..y1 {
            for x in x0..x1 {
                map[[y, x]] = v;
            }
        }
    }

    #[test]
    fn test_empty_heatmap_yields_no_boxes() {
        let map = Array2::<f32>::zeros((32, 32));
        let boxes = postprocess_heatmap(map.view(), MapScale::default(), (32, 32), &DetectionParams::default());
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_single_component() {
        let mut map = Array2::<f32>::zeros((40, 80));
        paint(&mut map, 10, 10, 50, 20, 0.9);

        let boxes = postprocess_heatmap(map.view(), MapScale::default(), (80, 40), &DetectionParams::default());
        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        assert!((b.score - 0.9).abs() < 1e-5);
        // Unclipped outward on every side
        assert!(b.bounds.x < 10.0);
        assert!(b.bounds.y < 10.0);
        assert!(b.bounds.right() > 50.0);
        assert!(b.bounds.bottom() > 20.0);
        assert_eq!(b.polygon, b.bounds.to_quad());
    }

    #[test]
    fn test_score_uses_raw_pixels_only() {
        // Dilation bridges the two runs, but the zero-probability gap does not dilute the score
        let mut map = Array2::<f32>::zeros((20, 60));
        paint(&mut map, 10, 8, 20, 12, 0.8);
        paint(&mut map, 23, 8, 33, 12, 0.6);

        let boxes = postprocess_heatmap(map.view(), MapScale::default(), (60, 20), &DetectionParams::default());
        assert_eq!(boxes.len(), 1);
        assert!((boxes[0].score - 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_low_score_component_rejected() {
        let mut map = Array2::<f32>::zeros((20, 60));
        paint(&mut map, 10, 8, 30, 12, 0.4);
        let boxes = postprocess_heatmap(map.view(), MapScale::default(), (60, 20), &DetectionParams::default());
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_tiny_component_rejected() {
        let mut map = Array2::<f32>::zeros((20, 20));
        paint(&mut map, 5, 5, 7, 6, 0.95);
        let boxes = postprocess_heatmap(map.view(), MapScale::default(), (20, 20), &DetectionParams::default());
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_boxes_ordered_top_then_left() {
        let mut map = Array2::<f32>::zeros((60, 100));
        paint(&mut map, 60, 5, 90, 12, 0.9);
        paint(&mut map, 5, 5, 30, 12, 0.9);
        paint(&mut map, 5, 40, 30, 48, 0.9);

        let boxes = postprocess_heatmap(map.view(), MapScale::default(), (100, 60), &DetectionParams::default());
        assert_eq!(boxes.len(), 3);
        assert!(boxes[0].bounds.x < boxes[1].bounds.x);
        assert!(boxes[1].bounds.y < boxes[2].bounds.y);
    }

    #[test]
    fn test_scaled_and_clipped_to_image() {
        let mut map = Array2::<f32>::zeros((20, 40));
        paint(&mut map, 0, 0, 20, 8, 0.9);

        let boxes = postprocess_heatmap(map.view(), MapScale::new(2.0, 2.0), (80, 40), &DetectionParams::default());
        assert_eq!(boxes.len(), 1);
        let b = boxes[0].bounds;
        assert_eq!(b.x, 0.0);
        assert_eq!(b.y, 0.0);
        assert!(b.right() > 40.0 && b.right() <= 80.0);
        assert!(b.bottom() <= 40.0);
    }

    #[test]
    fn test_four_connectivity_splits_diagonal_runs() {
        let mut map = Array2::<f32>::zeros((30, 30));
        paint(&mut map, 2, 2, 8, 6, 0.9);
        paint(&mut map, 8, 6, 14, 10, 0.9);

        let four = DetectionParams {
            connectivity: Connectivity::Four,
            dilation_x: 0,
            dilation_y: 0,
            ..DetectionParams::default()
        };
        let eight = DetectionParams {
            connectivity: Connectivity::Eight,
            ..four
        };
        assert_eq!(postprocess_heatmap(map.view(), MapScale::default(), (30, 30), &four).len(), 2);
        assert_eq!(postprocess_heatmap(map.view(), MapScale::default(), (30, 30), &eight).len(), 1);
    }

    #[test]
    fn test_unclip_offset_matches_formula() {
        let rect = Rect::new(0.0, 0.0, 40.0, 10.0);
        // area 400, perimeter 100, ratio 1.5 -> offset 6
        let out = unclip_rect(&rect, 1.5);
        assert!((out.x + 6.0).abs() <= 1.0);
        assert!((out.right() - 46.0).abs() <= 1.0);
        assert!((out.height - 22.0).abs() <= 2.0);
    }

    #[test]
    fn test_heatmap_view_shapes() {
        let batched = Array4::<f32>::zeros((2, 1, 8, 16));
        let view = heatmap_view(batched.view().into_dyn()).unwrap();
        assert_eq!(view.dim(), (8, 16));

        let flat = Array2::<f32>::zeros((5, 7));
        assert_eq!(heatmap_view(flat.view().into_dyn()).unwrap().dim(), (5, 7));

        let bad = Array4::<f32>::zeros((1, 3, 8, 16));
        assert!(heatmap_view(bad.view().into_dyn()).is_err());
    }

    #[test]
    fn test_map_scale_between() {
        let s = MapScale::between((320, 160), (640, 480));
        assert_eq!(s.x, 2.0);
        assert_eq!(s.y, 3.0);
    }
}
