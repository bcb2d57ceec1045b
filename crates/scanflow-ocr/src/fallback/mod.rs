//! Second-chance recognition for regions the neural path could not read
//!
//! [`resolve_failed_regions`] crops each failed region out of the source bitmap
//! (plus a small padding), hands it to a [`FallbackOcr`] implementation, and
//! accepts the answer only if its confidence clears [`min_fallback_confidence`].
//! Short strings and strings built from easily-confused glyphs need more
//! confidence than long prose, because a wrong short answer is both likelier and
//! harder to spot.

#[cfg(feature = "tesseract")]
mod tesseract;

#[cfg(feature = "tesseract")]
pub use tesseract::TesseractFallback;

use crate::error::Result;
use crate::geometry::Rect;
use crate::types::{RecognitionSource, TextRegion};
use image::{DynamicImage, RgbImage};

/// Glyphs that classical OCR commonly swaps for one another
pub const CONFUSABLE_GLYPHS: &[char] = &[
    '0', 'O', 'o', '1', 'l', 'I', '|', '5', 'S', '8', 'B', '2', 'Z',
];

/// Longest trimmed text that counts as short
pub const SHORT_TEXT_MAX_CHARS: usize = 3;

/// Upper bound for any fallback threshold
pub const MAX_FALLBACK_THRESHOLD: f32 = 80.0;

/// Text read by a fallback recognizer
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackText {
    pub text: String,
    /// Confidence in `[0, 100]`
    pub confidence: f32,
}

/// A dictionary-free recognizer used on crops of failed regions
pub trait FallbackOcr {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Read the text in `crop`
    ///
    /// # Errors
    ///
    /// Implementations return [`crate::OcrError::FallbackError`] when the
    /// underlying engine fails; the region then stays failed.
    fn recognize(&mut self, crop: &RgbImage) -> Result<FallbackText>;
}

/// Minimum confidence a fallback result needs to be accepted
#[must_use = "threshold is computed but not used"]
pub fn min_fallback_confidence(text: &str) -> f32 {
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    let mut threshold: f32 = match len {
        0..=SHORT_TEXT_MAX_CHARS => 65.0,
        4..=8 => 55.0,
        9..=15 => 45.0,
        _ => 35.0,
    };

    let non_ws = trimmed.chars().filter(|c| !c.is_whitespace()).count();
    let digits = trimmed.chars().filter(char::is_ascii_digit).count();
    if non_ws > 0 && digits * 2 > non_ws {
        threshold += 10.0;
    }
    if len <= SHORT_TEXT_MAX_CHARS && trimmed.chars().any(|c| CONFUSABLE_GLYPHS.contains(&c)) {
        threshold += 5.0;
    }
    threshold.min(MAX_FALLBACK_THRESHOLD)
}

/// Re-run recognition on failed regions with `engine`.
///
/// Returns a fresh collection in the same order. Regions that were not failed
/// are cloned unchanged; an accepted fallback result produces a new region with
/// [`RecognitionSource::Fallback`]. Rejections, engine errors and empty crops
/// leave the region failed.
pub fn resolve_failed_regions(
    image: &DynamicImage,
    regions: &[TextRegion],
    engine: &mut dyn FallbackOcr,
    padding: u32,
) -> Vec<TextRegion> {
    let mut attempted = 0_usize;
    let mut accepted = 0_usize;

    let resolved = regions
        .iter()
        .map(|region| {
            if !region.recognition_failed {
                return region.clone();
            }
            attempted += 1;
            match try_region(image, region, &mut *engine, padding) {
                Some(replacement) => {
                    accepted += 1;
                    replacement
                }
                None => region.clone(),
            }
        })
        .collect();

    if attempted > 0 {
        log::debug!(
            "Fallback ({}): accepted {}/{} failed regions",
            engine.name(),
            accepted,
            attempted
        );
    }
    resolved
}

fn try_region(
    image: &DynamicImage,
    region: &TextRegion,
    engine: &mut dyn FallbackOcr,
    padding: u32,
) -> Option<TextRegion> {
    let crop = padded_crop(image, &region.bounds, padding)?;
    let result = match engine.recognize(&crop) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("Fallback recognizer {} failed: {e}", engine.name());
            return None;
        }
    };

    let text = result.text.trim();
    if text.is_empty() {
        return None;
    }
    let threshold = min_fallback_confidence(text);
    if result.confidence < threshold {
        log::debug!(
            "Fallback rejected {:?}: confidence {:.1} < {:.1}",
            text,
            result.confidence,
            threshold
        );
        return None;
    }

    Some(TextRegion {
        text: text.to_string(),
        confidence: result.confidence.clamp(0.0, 100.0),
        recognition_failed: false,
        failure_reason: None,
        recognition_source: RecognitionSource::Fallback,
        ..region.clone()
    })
}

#[allow(clippy::cast_precision_loss)]
fn padded_crop(image: &DynamicImage, bounds: &Rect, padding: u32) -> Option<RgbImage> {
    let pad = padding as f32;
    let padded = Rect::from_edges(
        bounds.x - pad,
        bounds.y - pad,
        bounds.right() + pad,
        bounds.bottom() + pad,
    );
    let (x, y, w, h) = padded.to_pixels(image.width(), image.height());
    if w == 0 || h == 0 || bounds.width <= 0.0 || bounds.height <= 0.0 {
        return None;
    }
    Some(image.crop_imm(x, y, w, h).to_rgb8())
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::error::OcrError;
    use crate::types::FailureReason;

    struct Scripted {
        answer: Result<FallbackText>,
        seen: Vec<(u32, u32)>,
    }

    impl Scripted {
        fn answering(text: &str, confidence: f32) -> Self {
            Self {
                answer: Ok(FallbackText {
                    text: text.to_string(),
                    confidence,
                }),
                seen: Vec::new(),
            }
        }
    }

    impl FallbackOcr for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn recognize(&mut self, crop: &RgbImage) -> Result<FallbackText> {
            self.seen.push(crop.dimensions());
            match &self.answer {
                Ok(t) => Ok(t.clone()),
                Err(_) => Err(OcrError::FallbackError("engine down".to_string())),
            }
        }
    }

    fn failed_region(bounds: Rect) -> TextRegion {
        TextRegion::failed(bounds, bounds.to_quad(), 0.7, FailureReason::EmptyText)
    }

    #[test]
    fn test_threshold_buckets() {
        assert_eq!(min_fallback_confidence("abc"), 65.0);
        assert_eq!(min_fallback_confidence("abcdefgh"), 55.0);
        assert_eq!(min_fallback_confidence("abcdefghijk"), 45.0);
        assert_eq!(min_fallback_confidence("abcdefghijklmnopqrst"), 35.0);
    }

    #[test]
    fn test_threshold_numeric_and_confusable() {
        // 2 digits, short, '1' is confusable: 65 + 10 + 5
        assert_eq!(min_fallback_confidence("17"), 80.0);
        // 3 chars is still short: 65 + 5
        assert_eq!(min_fallback_confidence("SOB"), 70.0);
        // 4 and 5 chars take no confusable bonus
        assert_eq!(min_fallback_confidence("Bolt"), 55.0);
        assert_eq!(min_fallback_confidence("40960"), 65.0);
        assert!(min_fallback_confidence("42") > min_fallback_confidence("abcdefghijklmnopqrst"));
    }

    #[test]
    fn test_threshold_capped() {
        assert!(min_fallback_confidence("0") <= MAX_FALLBACK_THRESHOLD);
    }

    #[test]
    fn test_accepts_confident_result() {
        let image = DynamicImage::new_rgb8(100, 50);
        let regions = vec![
            TextRegion::new(Rect::new(0.0, 0.0, 20.0, 10.0), "ok", 90.0),
            failed_region(Rect::new(10.0, 10.0, 40.0, 20.0)),
        ];
        let mut engine = Scripted::answering("  recovered text ", 60.0);

        let out = resolve_failed_regions(&image, &regions, &mut engine, 4);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0], regions[0]);
        assert_eq!(out[1].text, "recovered text");
        assert!(!out[1].recognition_failed);
        assert_eq!(out[1].failure_reason, None);
        assert_eq!(out[1].recognition_source, RecognitionSource::Fallback);
        assert_eq!(out[1].bounds, regions[1].bounds);
        // Padding of 4 on every side
        assert_eq!(engine.seen, vec![(48, 28)]);
        // Input untouched
        assert!(regions[1].recognition_failed);
    }

    #[test]
    fn test_rejects_low_confidence() {
        let image = DynamicImage::new_rgb8(100, 50);
        let regions = vec![failed_region(Rect::new(10.0, 10.0, 40.0, 20.0))];
        let mut engine = Scripted::answering("7", 70.0);

        let out = resolve_failed_regions(&image, &regions, &mut engine, 4);
        assert!(out[0].recognition_failed);
        assert_eq!(out[0].recognition_source, RecognitionSource::Neural);
    }

    #[test]
    fn test_engine_error_leaves_region_failed() {
        let image = DynamicImage::new_rgb8(100, 50);
        let regions = vec![failed_region(Rect::new(10.0, 10.0, 40.0, 20.0))];
        let mut engine = Scripted {
            answer: Err(OcrError::FallbackError("x".to_string())),
            seen: Vec::new(),
        };
        let out = resolve_failed_regions(&image, &regions, &mut engine, 4);
        assert!(out[0].recognition_failed);
    }

    #[test]
    fn test_empty_crop_skips_engine() {
        let image = DynamicImage::new_rgb8(100, 50);
        let regions = vec![failed_region(Rect::new(10.0, 10.0, 0.0, 20.0))];
        let mut engine = Scripted::answering("text", 99.0);
        let out = resolve_failed_regions(&image, &regions, &mut engine, 4);
        assert!(out[0].recognition_failed);
        assert!(engine.seen.is_empty());
    }

    #[test]
    fn test_crop_clamped_at_image_edge() {
        let image = DynamicImage::new_rgb8(30, 30);
        let regions = vec![failed_region(Rect::new(0.0, 0.0, 10.0, 10.0))];
        let mut engine = Scripted::answering("text", 99.0);
        let _ = resolve_failed_regions(&image, &regions, &mut engine, 4);
        assert_eq!(engine.seen, vec![(14, 14)]);
    }
}
