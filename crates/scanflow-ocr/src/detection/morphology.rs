//! Binarization and axis-aligned dilation on `GrayImage` masks
//!
//! Foreground is 255, background 0.

#![allow(clippy::cast_possible_truncation)]

use image::{GrayImage, Luma};
use ndarray::ArrayView2;

const FOREGROUND: u8 = 255;

/// Binarize a probability map: pixels strictly above `threshold` become foreground
#[must_use = "returns a new GrayImage; the heatmap is not modified"]
pub fn binarize(heatmap: ArrayView2<'_, f32>, threshold: f32) -> GrayImage {
    let (height, width) = heatmap.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        if heatmap[[y as usize, x as usize]] > threshold {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    })
}

/// One dilation pass with a 3x1 (horizontal) or 1x3 (vertical) structuring element
fn dilate_once(img: &GrayImage, horizontal: bool) -> GrayImage {
    let (width, height) = img.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let hit = |dx: i64, dy: i64| {
            let nx = i64::from(x) + dx;
            let ny = i64::from(y) + dy;
            nx >= 0
                && ny >= 0
                && nx < i64::from(width)
                && ny < i64::from(height)
                && img.get_pixel(nx as u32, ny as u32).0[0] > 0
        };
        let on = if horizontal {
            hit(-1, 0) || hit(0, 0) || hit(1, 0)
        } else {
            hit(0, -1) || hit(0, 0) || hit(0, 1)
        };
        Luma([if on { FOREGROUND } else { 0 }])
    })
}

/// Dilate `x_iterations` times along rows and `y_iterations` times along columns
///
/// Text lines are wider than tall, so bridging inter-glyph gaps needs more
/// horizontal growth than vertical; vertical growth is kept small so stacked
/// lines stay separate.
#[must_use = "returns a new dilated image"]
pub fn dilate_asymmetric(img: &GrayImage, x_iterations: u32, y_iterations: u32) -> GrayImage {
    let mut out = img.clone();
    for _ in 0..x_iterations {
        out = dilate_once(&out, true);
    }
    for _ in 0..y_iterations {
        out = dilate_once(&out, false);
    }
    out
}
