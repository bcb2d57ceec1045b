//! Per-image recognition: detection → decoding → fallback → layout
//!
//! [`OcrPipeline::recognize`] wraps detection and per-region recognition in a
//! single supervised call, so a backend downgrade re-runs both on the new
//! backend. Fallback and layout run afterwards on the host.
//!
//! # Examples
//!
//! ```no_run
//! use scanflow_ocr::engine::{EngineSupervisor, ModelLayout, OrtCapabilityProbe, OrtEngineFactory};
//! use scanflow_ocr::{CancelToken, OcrPipeline, OcrSettings, SymbolDictionary};
//!
//! # fn main() -> scanflow_ocr::Result<()> {
//! let settings = OcrSettings::default();
//! let layout = ModelLayout::new("models");
//! let dictionary = SymbolDictionary::from_file(&layout.dictionary(settings.model_variant), true)?;
//! let supervisor = EngineSupervisor::new(
//!     Box::new(OrtEngineFactory::new(layout)),
//!     Box::new(OrtCapabilityProbe::new()),
//!     settings.backend,
//!     settings.model_variant,
//! );
//! let mut pipeline = OcrPipeline::new(supervisor, dictionary);
//!
//! let image = image::open("page.png").map_err(|e| scanflow_ocr::OcrError::InvalidInput(e.to_string()))?;
//! let report = pipeline.recognize(&image, &[], &settings, &CancelToken::new())?;
//! println!("{}", report.output.text());
//! # Ok(())
//! # }
//! ```

use crate::config::{DetectionParams, OcrSettings};
use crate::detection::postprocess_heatmap;
use crate::engine::{Backend, Engine, EngineSupervisor};
use crate::error::{EngineError, OcrError, Result};
use crate::fallback::{resolve_failed_regions, FallbackOcr};
use crate::layout::merge_regions;
use crate::recognition::{
    ctc_greedy_decode, is_degenerate_crop, region_from_outcome, RecognitionOutcome,
    SymbolDictionary,
};
use crate::types::{OcrOutput, SeparatorLine, TextRegion};
use image::DynamicImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative cancellation flag, checked between pipeline stages
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use = "token is created but not used"]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`OcrError::Cancelled`] naming `stage` if cancelled
    ///
    /// # Errors
    ///
    /// Returns [`OcrError::Cancelled`] once [`cancel`](Self::cancel) was called.
    pub fn check(&self, stage: &'static str) -> Result<()> {
        if self.is_cancelled() {
            log::debug!("Recognition cancelled after {stage}");
            return Err(OcrError::Cancelled { stage });
        }
        Ok(())
    }
}

/// Stage timings for one recognition call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcrProfiling {
    /// Detection model plus heatmap post-processing
    pub detection_duration: Duration,
    /// Recognition model plus CTC decoding, all regions
    pub recognition_duration: Duration,
    pub fallback_duration: Duration,
    pub layout_duration: Duration,
}

impl OcrProfiling {
    #[inline]
    #[must_use = "returns the total duration sum"]
    pub fn total(&self) -> Duration {
        self.detection_duration
            + self.recognition_duration
            + self.fallback_duration
            + self.layout_duration
    }
}

/// Everything one recognition call produced
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionReport {
    pub output: OcrOutput,
    /// Backend the models ran on
    pub backend: Backend,
    /// True if the accelerated backend failed and the call was re-run on the portable one
    pub silent_fallback: bool,
    pub profiling: OcrProfiling,
}

/// Detection and recognition for one image on one engine
///
/// Returns the raw regions in detection order and the detection/recognition
/// timings.
///
/// # Errors
///
/// Engine failures other than per-crop preprocessing errors, and cancellation.
pub fn detect_and_recognize(
    engine: &mut dyn Engine,
    image: &DynamicImage,
    dictionary: &SymbolDictionary,
    params: &DetectionParams,
    cancel: &CancelToken,
) -> Result<(Vec<TextRegion>, Duration, Duration)> {
    let (width, height) = (image.width(), image.height());

    let detection_start = Instant::now();
    let detection = engine.detect(image)?;
    let boxes = postprocess_heatmap(detection.heatmap.view(), detection.scale, (width, height), params);
    let detection_duration = detection_start.elapsed();
    cancel.check("detection")?;

    let recognition_start = Instant::now();
    let mut regions = Vec::with_capacity(boxes.len());
    for detected in &boxes {
        let outcome = if is_degenerate_crop(detected, width, height) {
            RecognitionOutcome::InvalidCrop
        } else {
            let (x, y, w, h) = detected.bounds.to_pixels(width, height);
            let crop = image.crop_imm(x, y, w, h);
            match engine.recognize_region(&crop) {
                Ok(probs) => RecognitionOutcome::Decoded(ctc_greedy_decode(probs.view(), dictionary)),
                Err(EngineError::Preprocessing(reason)) => {
                    log::debug!("Recognition preprocessing failed for {:?}: {reason}", detected.bounds);
                    RecognitionOutcome::PreprocessingFailed
                }
                Err(e) => return Err(e.into()),
            }
        };
        regions.push(region_from_outcome(detected, outcome));
        cancel.check("recognition")?;
    }

    Ok((regions, detection_duration, recognition_start.elapsed()))
}

/// Full recognition pipeline around a supervised engine
pub struct OcrPipeline {
    supervisor: EngineSupervisor,
    dictionary: SymbolDictionary,
    fallback: Option<Box<dyn FallbackOcr>>,
}

impl std::fmt::Debug for OcrPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrPipeline")
            .field("supervisor", &self.supervisor)
            .field("dictionary_len", &self.dictionary.len())
            .field("fallback", &self.fallback.as_ref().map(|f| f.name().to_string()))
            .finish()
    }
}

impl OcrPipeline {
    #[must_use = "pipeline is created but not used"]
    pub fn new(supervisor: EngineSupervisor, dictionary: SymbolDictionary) -> Self {
        Self {
            supervisor,
            dictionary,
            fallback: None,
        }
    }

    /// Use `fallback` for regions the neural recognizer fails on
    #[must_use = "builder methods return a new pipeline"]
    pub fn with_fallback(mut self, fallback: Box<dyn FallbackOcr>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    #[must_use]
    pub const fn supervisor(&self) -> &EngineSupervisor {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut EngineSupervisor {
        &mut self.supervisor
    }

    /// Recognize one image
    ///
    /// A `backend` or `model_variant` different from the supervisor's is
    /// switched to before the call. The backend stays portable once memory
    /// exhaustion has forced a downgrade.
    ///
    /// # Errors
    ///
    /// Invalid settings, fatal engine errors (including
    /// [`EngineError::BufferLimitExceeded`]), and cancellation.
    pub fn recognize(
        &mut self,
        image: &DynamicImage,
        separators: &[SeparatorLine],
        settings: &OcrSettings,
        cancel: &CancelToken,
    ) -> Result<RecognitionReport> {
        settings.validate()?;
        if image.width() == 0 || image.height() == 0 {
            return Err(OcrError::InvalidInput(format!(
                "image must be non-empty (got {}x{})",
                image.width(),
                image.height()
            )));
        }
        if settings.backend != self.supervisor.preference() {
            self.supervisor.switch_preference(settings.backend)?;
        }
        if settings.model_variant != self.supervisor.variant() {
            self.supervisor.switch_variant(settings.model_variant)?;
        }

        let params = settings.detection_params();
        let dictionary = &self.dictionary;
        let run = self
            .supervisor
            .run(|engine| detect_and_recognize(engine, image, dictionary, &params, cancel))?;
        let (raw_regions, detection_duration, recognition_duration) = run.value;

        let fallback_start = Instant::now();
        let regions = match self.fallback.as_mut() {
            Some(fallback) if settings.fallback_enabled => resolve_failed_regions(
                image,
                &raw_regions,
                fallback.as_mut(),
                settings.fallback_padding,
            ),
            _ => raw_regions,
        };
        let fallback_duration = fallback_start.elapsed();
        cancel.check("fallback")?;

        let layout_start = Instant::now();
        let merged_blocks = merge_regions(&regions, separators, &settings.layout_params());
        let layout_duration = layout_start.elapsed();

        let profiling = OcrProfiling {
            detection_duration,
            recognition_duration,
            fallback_duration,
            layout_duration,
        };
        log::debug!(
            "OCR: {} regions, {} blocks on {} backend in {:?} (det {:?}, rec {:?}, fallback {:?}, layout {:?})",
            regions.len(),
            merged_blocks.len(),
            run.backend,
            profiling.total(),
            profiling.detection_duration,
            profiling.recognition_duration,
            profiling.fallback_duration,
            profiling.layout_duration
        );
        if run.silent_fallback {
            log::warn!("Recognition completed on the portable backend after the accelerated backend ran out of memory");
        }

        Ok(RecognitionReport {
            output: OcrOutput {
                merged_blocks,
                raw_regions: regions,
            },
            backend: run.backend,
            silent_fallback: run.silent_fallback,
            profiling,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check("detection").is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        let err = token.check("detection").unwrap_err();
        assert!(matches!(err, OcrError::Cancelled { stage: "detection" }));
    }

    #[test]
    fn test_profiling_total() {
        let p = OcrProfiling {
            detection_duration: Duration::from_millis(5),
            recognition_duration: Duration::from_millis(7),
            fallback_duration: Duration::from_millis(1),
            layout_duration: Duration::from_millis(2),
        };
        assert_eq!(p.total(), Duration::from_millis(15));
    }
}
