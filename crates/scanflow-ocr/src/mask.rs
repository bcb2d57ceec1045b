//! Binary masks of text regions, for inpainting and redaction downstream

use crate::geometry::{Point, Rect};
use crate::types::TextRegion;
use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;

/// Mask value for pixels covered by a region
pub const MASK_ON: u8 = 255;

/// Rasterize `regions` into a `width`x`height` mask
///
/// Each region's polygon is filled; a polygon with zero area falls back to the
/// region bounds. `padding` grows the mask by a disk of that radius in pixels,
/// which rounds the corners. Padding above 255 is clamped.
#[must_use = "mask is created but not used"]
pub fn region_mask(regions: &[TextRegion], width: u32, height: u32, padding: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    if width == 0 || height == 0 {
        return mask;
    }

    for region in regions {
        let polygon = if polygon_area(&region.polygon) > f32::EPSILON {
            region.polygon
        } else {
            region.bounds.to_quad()
        };
        fill_polygon(&mut mask, &polygon, MASK_ON);
    }

    if padding == 0 {
        return mask;
    }
    let radius = u8::try_from(padding).unwrap_or(u8::MAX);
    dilate(&mask, Norm::L2, radius)
}

/// Shoelace area, absolute
fn polygon_area(points: &[Point]) -> f32 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f32 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice.abs() / 2.0
}

/// Scanline fill sampled at pixel centers
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn fill_polygon(mask: &mut GrayImage, points: &[Point], value: u8) {
    let (width, height) = mask.dimensions();
    let Some(bounds) = Rect::enclosing(points) else {
        return;
    };
    if points.len() < 3 {
        return;
    }

    let min_y = (bounds.y.floor() as i64).max(0);
    let max_y = (bounds.bottom().ceil() as i64).min(i64::from(height) - 1);
    let mut crossings = Vec::with_capacity(points.len());

    for y in min_y..=max_y {
        let scan_y = y as f32 + 0.5;
        crossings.clear();
        for i in 0..points.len() {
            let (p1, p2) = (points[i], points[(i + 1) % points.len()]);
            if (p1.y <= scan_y && p2.y > scan_y) || (p2.y <= scan_y && p1.y > scan_y) {
                let t = (scan_y - p1.y) / (p2.y - p1.y);
                crossings.push(t.mul_add(p2.x - p1.x, p1.x));
            }
        }
        crossings.sort_by(f32::total_cmp);

        for pair in crossings.chunks_exact(2) {
            // Pixel x is inside when its center x + 0.5 lies in [pair[0], pair[1])
            let start = ((pair[0] - 0.5).ceil() as i64).max(0);
            let end = ((pair[1] - 0.5).ceil() as i64).min(i64::from(width));
            for x in start..end {
                mask.put_pixel(x as u32, y as u32, Luma([value]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_on(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p.0[0] == MASK_ON).count()
    }

    #[test]
    fn test_rect_region_fills_exact_pixels() {
        let region = TextRegion::new(Rect::new(2.0, 3.0, 4.0, 2.0), "ab", 90.0);
        let mask = region_mask(&[region], 10, 10, 0);
        assert_eq!(count_on(&mask), 8);
        assert_eq!(mask.get_pixel(2, 3).0[0], MASK_ON);
        assert_eq!(mask.get_pixel(5, 4).0[0], MASK_ON);
        assert_eq!(mask.get_pixel(6, 4).0[0], 0);
        assert_eq!(mask.get_pixel(2, 5).0[0], 0);
    }

    #[test]
    fn test_region_clipped_to_image() {
        let region = TextRegion::new(Rect::new(-5.0, -5.0, 8.0, 8.0), "x", 90.0);
        let mask = region_mask(&[region], 4, 4, 0);
        assert_eq!(count_on(&mask), 9);
    }

    #[test]
    fn test_degenerate_polygon_uses_bounds() {
        let mut region = TextRegion::new(Rect::new(1.0, 1.0, 2.0, 2.0), "x", 90.0);
        region.polygon = [Point::new(1.0, 1.0); 4];
        let mask = region_mask(&[region], 5, 5, 0);
        assert_eq!(count_on(&mask), 4);
    }

    #[test]
    fn test_padding_rounds_corners() {
        let region = TextRegion::new(Rect::new(10.0, 10.0, 1.0, 1.0), "x", 90.0);
        let mask = region_mask(&[region], 21, 21, 3);
        // Orthogonal reach is the full radius, the diagonal corner is cut
        assert_eq!(mask.get_pixel(13, 10).0[0], MASK_ON);
        assert_eq!(mask.get_pixel(10, 7).0[0], MASK_ON);
        assert_eq!(mask.get_pixel(13, 13).0[0], 0);
        assert_eq!(mask.get_pixel(14, 10).0[0], 0);
    }

    #[test]
    fn test_empty_image() {
        let region = TextRegion::new(Rect::new(0.0, 0.0, 2.0, 2.0), "x", 90.0);
        let mask = region_mask(&[region], 0, 0, 2);
        assert_eq!(mask.dimensions(), (0, 0));
    }
}
