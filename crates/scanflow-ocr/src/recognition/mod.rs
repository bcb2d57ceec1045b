//! Recognition decoding and per-region outcome classification

mod ctc;
mod dictionary;

pub use ctc::{ctc_greedy_decode, Decoded};
pub use dictionary::{SymbolDictionary, BLANK_TOKEN};

use crate::detection::DetectedBox;
use crate::types::{FailureReason, TextRegion};

/// What the recognizer produced for one detected box
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionOutcome {
    Decoded(Decoded),
    /// Crop collapsed to zero width or height; decoding never ran
    InvalidCrop,
    /// Crop could not be prepared for the model
    PreprocessingFailed,
}

/// True if the box rounds to a zero-width or zero-height crop inside the image
#[inline]
#[must_use = "crop check result is returned but not used"]
pub fn is_degenerate_crop(detected: &DetectedBox, image_width: u32, image_height: u32) -> bool {
    let (_, _, w, h) = detected.bounds.to_pixels(image_width, image_height);
    w == 0 || h == 0
}

/// Build the raw region for a detected box
///
/// Empty decoded text marks the region failed with [`FailureReason::EmptyText`].
#[must_use = "region is created but not used"]
pub fn region_from_outcome(detected: &DetectedBox, outcome: RecognitionOutcome) -> TextRegion {
    let failed = |reason| {
        TextRegion::failed(detected.bounds, detected.polygon, detected.score, reason)
    };
    match outcome {
        RecognitionOutcome::Decoded(decoded) if decoded.text.is_empty() => {
            failed(FailureReason::EmptyText)
        }
        RecognitionOutcome::Decoded(decoded) => TextRegion {
            polygon: detected.polygon,
            detection_score: detected.score,
            ..TextRegion::new(detected.bounds, decoded.text, decoded.confidence)
        },
        RecognitionOutcome::InvalidCrop => failed(FailureReason::InvalidCrop),
        RecognitionOutcome::PreprocessingFailed => failed(FailureReason::PreprocessingFailed),
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::types::RecognitionSource;

    fn detected(bounds: Rect) -> DetectedBox {
        DetectedBox {
            polygon: bounds.to_quad(),
            bounds,
            score: 0.8,
        }
    }

    #[test]
    fn test_decoded_text_becomes_region() {
        let det = detected(Rect::new(1.0, 2.0, 30.0, 10.0));
        let region = region_from_outcome(
            &det,
            RecognitionOutcome::Decoded(Decoded {
                text: " hi".to_string(),
                confidence: 91.0,
            }),
        );
        assert_eq!(region.text, " hi");
        assert_eq!(region.confidence, 91.0);
        assert_eq!(region.detection_score, 0.8);
        assert!(!region.recognition_failed);
        assert_eq!(region.recognition_source, RecognitionSource::Neural);
    }

    #[test]
    fn test_empty_text_fails_region() {
        let det = detected(Rect::new(1.0, 2.0, 30.0, 10.0));
        let region = region_from_outcome(
            &det,
            RecognitionOutcome::Decoded(Decoded {
                text: String::new(),
                confidence: 0.0,
            }),
        );
        assert!(region.recognition_failed);
        assert_eq!(region.failure_reason, Some(FailureReason::EmptyText));
    }

    #[test]
    fn test_invalid_crop_fails_region() {
        let det = detected(Rect::new(5.0, 5.0, 0.3, 10.0));
        assert!(is_degenerate_crop(&det, 100, 100));
        let region = region_from_outcome(&det, RecognitionOutcome::InvalidCrop);
        assert_eq!(region.failure_reason, Some(FailureReason::InvalidCrop));
        assert_eq!(region.confidence, 0.0);
    }

    #[test]
    fn test_box_outside_image_is_degenerate() {
        let det = detected(Rect::new(120.0, 5.0, 10.0, 10.0));
        assert!(is_degenerate_crop(&det, 100, 100));
        assert!(!is_degenerate_crop(&detected(Rect::new(0.0, 0.0, 10.0, 10.0)), 100, 100));
    }
}
