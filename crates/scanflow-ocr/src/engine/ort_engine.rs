//! ONNX Runtime engine for PaddleOCR-style detection and recognition models
//!
//! The accelerated backend registers CoreML and CUDA ahead of the CPU provider;
//! the portable backend registers the CPU provider only. Runtime errors are
//! classified into [`EngineError`] kinds from their messages so the supervisor
//! can tell memory exhaustion from other failures.

// Intentional ML conversions: image dimensions, tensor shapes
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use super::{
    Backend, Capabilities, CapabilityProbe, DetectionOutput, Engine, EngineFactory, ModelLayout,
    TensorTracker,
};
use crate::config::ModelVariant;
use crate::detection::{heatmap_view, MapScale};
use crate::error::EngineError;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use ndarray::{Array2, Array4, ArrayView2, Axis, Ix3};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider,
};
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::path::Path;

/// ImageNet normalization used by the detection model
const DET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const DET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Longest image side fed to the detection model
pub const DET_LIMIT_SIDE_LEN: u32 = 960;

/// Recognition input height
pub const REC_IMAGE_HEIGHT: u32 = 48;

/// Recognition input width ceiling
const REC_MAX_WIDTH: u32 = 3200;

const PIXEL_MAX: f32 = 255.0;

fn run_error(
    backend: Backend,
    model_name: &str,
    variant: ModelVariant,
    message: String,
    during_init: bool,
) -> EngineError {
    EngineError::classify(&backend.to_string(), model_name, variant, message, during_init)
}

/// ONNX Runtime engine for one backend and model variant
pub struct OrtEngine {
    backend: Backend,
    variant: ModelVariant,
    layout: ModelLayout,
    max_buffer_bytes: Option<u64>,
    det_session: Option<Session>,
    rec_session: Option<Session>,
    tracker: TensorTracker,
}

impl std::fmt::Debug for OrtEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtEngine")
            .field("backend", &self.backend)
            .field("variant", &self.variant)
            .field("models", &self.layout.root())
            .field("ready", &self.det_session.is_some())
            .finish()
    }
}

impl OrtEngine {
    #[must_use = "engine is created but not used"]
    pub fn new(
        backend: Backend,
        variant: ModelVariant,
        layout: ModelLayout,
        max_buffer_bytes: Option<u64>,
    ) -> Self {
        Self {
            backend,
            variant,
            layout,
            max_buffer_bytes,
            det_session: None,
            rec_session: None,
            tracker: TensorTracker::new(),
        }
    }

    /// Tensors allocated by this engine and not yet released
    #[must_use]
    pub fn live_tensors(&self) -> usize {
        self.tracker.live()
    }

    fn check_buffer_limit(&self, path: &Path) -> Result<(), EngineError> {
        let Some(limit) = self.max_buffer_bytes else {
            return Ok(());
        };
        if self.backend != Backend::Accelerated {
            return Ok(());
        }
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if size > limit {
            return Err(EngineError::BufferLimitExceeded {
                variant: self.variant,
                reason: format!(
                    "{} needs a {size}-byte buffer, device maximum is {limit} bytes",
                    path.display()
                ),
            });
        }
        Ok(())
    }

    fn build_session(&self, path: &Path, model_name: &str) -> Result<Session, EngineError> {
        if !path.exists() {
            return Err(EngineError::ModelLoad {
                model_name: model_name.to_string(),
                reason: format!("model file not found: {}", path.display()),
            });
        }
        self.check_buffer_limit(path)?;

        let (backend, variant) = (self.backend, self.variant);
        let fail = |e: String| run_error(backend, model_name, variant, e, true);
        let num_threads = num_cpus::get();

        let builder = Session::builder()
            .map_err(|e| fail(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| fail(e.to_string()))?
            .with_intra_threads(num_threads)
            .map_err(|e| fail(e.to_string()))?;

        let builder = match backend {
            Backend::Accelerated => {
                log::debug!("Creating {model_name} session with CoreML/CUDA execution providers");
                builder
                    .with_execution_providers([
                        CoreMLExecutionProvider::default().build(),
                        CUDAExecutionProvider::default().build(),
                        CPUExecutionProvider::default().build(),
                    ])
                    .map_err(|e| fail(e.to_string()))?
            }
            Backend::Portable => {
                log::debug!("Creating {model_name} session with CPU execution provider");
                builder
                    .with_execution_providers([CPUExecutionProvider::default().build()])
                    .map_err(|e| fail(e.to_string()))?
            }
        };

        builder.commit_from_file(path).map_err(|e| fail(e.to_string()))
    }
}

impl Engine for OrtEngine {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        if self.det_session.is_some() && self.rec_session.is_some() {
            return Ok(());
        }
        let det = self.build_session(&self.layout.detection_model(self.variant), "detection")?;
        let rec = self.build_session(&self.layout.recognition_model(self.variant), "recognition")?;
        self.det_session = Some(det);
        self.rec_session = Some(rec);
        log::info!(
            "ONNX Runtime engine ready ({} backend, {} models)",
            self.backend,
            self.variant
        );
        Ok(())
    }

    fn detect(&mut self, image: &DynamicImage) -> Result<DetectionOutput, EngineError> {
        let (backend, variant) = (self.backend, self.variant);
        let input = self
            .tracker
            .scope("det_input", preprocess_detection(image, DET_LIMIT_SIDE_LEN)?);
        let session = self
            .det_session
            .as_mut()
            .ok_or_else(|| EngineError::NotReady("detection model not loaded".to_string()))?;

        let output = {
            let input_ref: TensorRef<f32> = TensorRef::from_array_view(&*input)
                .map_err(|e| EngineError::Preprocessing(e.to_string()))?;
            let outputs = session
                .run(inputs![input_ref])
                .map_err(|e| run_error(backend, "detection", variant, e.to_string(), false))?;
            let tensor = outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| run_error(backend, "detection", variant, e.to_string(), false))?;
            tensor.into_owned()
        };
        let output = self.tracker.scope("det_output", output);

        let heatmap = heatmap_view(output.view())
            .map_err(|e| EngineError::Inference {
                model_name: "detection".to_string(),
                reason: e.to_string(),
            })?
            .to_owned();
        let (map_h, map_w) = heatmap.dim();
        Ok(DetectionOutput {
            scale: MapScale::between((map_w, map_h), image.dimensions()),
            heatmap,
        })
    }

    fn recognize_region(&mut self, crop: &DynamicImage) -> Result<Array2<f32>, EngineError> {
        let (backend, variant) = (self.backend, self.variant);
        let input = self.tracker.scope("rec_input", preprocess_recognition(crop)?);
        let session = self
            .rec_session
            .as_mut()
            .ok_or_else(|| EngineError::NotReady("recognition model not loaded".to_string()))?;

        let output = {
            let input_ref: TensorRef<f32> = TensorRef::from_array_view(&*input)
                .map_err(|e| EngineError::Preprocessing(e.to_string()))?;
            let outputs = session
                .run(inputs![input_ref])
                .map_err(|e| run_error(backend, "recognition", variant, e.to_string(), false))?;
            let tensor = outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| run_error(backend, "recognition", variant, e.to_string(), false))?;
            tensor.into_owned()
        };
        let output = self.tracker.scope("rec_output", output);

        // [1, seq_len, vocab_size]
        let probs = output
            .view()
            .into_dimensionality::<Ix3>()
            .map_err(|e| EngineError::Inference {
                model_name: "recognition".to_string(),
                reason: format!("unexpected output shape: {e}"),
            })?;
        Ok(softmax_to_log_probs(probs.index_axis(Axis(0), 0)))
    }

    fn terminate(&mut self) {
        let had_det = self.det_session.take().is_some();
        let had_rec = self.rec_session.take().is_some();
        if had_det || had_rec {
            log::debug!("Released {} backend sessions", self.backend);
        }
    }
}

impl Drop for OrtEngine {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Resize so the longest side is at most `limit_side_len`, both sides a multiple
/// of 32, then normalize with ImageNet statistics into `[1, 3, H, W]`.
///
/// # Errors
///
/// Returns [`EngineError::Preprocessing`] for an empty image.
pub fn preprocess_detection(
    image: &DynamicImage,
    limit_side_len: u32,
) -> Result<Array4<f32>, EngineError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(EngineError::Preprocessing(format!(
            "image must be non-empty (got {width}x{height})"
        )));
    }

    let (w, h) = (width as f32, height as f32);
    let ratio = if w.max(h) > limit_side_len as f32 {
        limit_side_len as f32 / w.max(h)
    } else {
        1.0
    };
    let resize_w = (((w * ratio) / 32.0).round() as u32).max(1) * 32;
    let resize_h = (((h * ratio) / 32.0).round() as u32).max(1) * 32;

    let rgb = image
        .resize_exact(resize_w, resize_h, FilterType::CatmullRom)
        .to_rgb8();
    let mut array = Array4::<f32>::zeros((1, 3, resize_h as usize, resize_w as usize));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            array[[0, c, y as usize, x as usize]] =
                (f32::from(pixel[c]) / PIXEL_MAX - DET_MEAN[c]) / DET_STD[c];
        }
    }
    Ok(array)
}

/// Resize to height [`REC_IMAGE_HEIGHT`] keeping the aspect ratio, normalize to
/// `[-1, 1]`, and lay out as `[1, 3, H, W]`.
///
/// # Errors
///
/// Returns [`EngineError::Preprocessing`] for an empty crop.
pub fn preprocess_recognition(crop: &DynamicImage) -> Result<Array4<f32>, EngineError> {
    let (width, height) = crop.dimensions();
    if width == 0 || height == 0 {
        return Err(EngineError::Preprocessing(format!(
            "crop must be non-empty (got {width}x{height})"
        )));
    }

    let target_w = ((REC_IMAGE_HEIGHT as f32 * width as f32 / height as f32).ceil() as u32)
        .clamp(1, REC_MAX_WIDTH);
    let rgb = crop
        .resize_exact(target_w, REC_IMAGE_HEIGHT, FilterType::CatmullRom)
        .to_rgb8();
    let mut array = Array4::<f32>::zeros((1, 3, REC_IMAGE_HEIGHT as usize, target_w as usize));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            array[[0, c, y as usize, x as usize]] = (f32::from(pixel[c]) / PIXEL_MAX - 0.5) / 0.5;
        }
    }
    Ok(array)
}

/// Natural log of per-timestep softmax output, floored at `f32::MIN_POSITIVE`
/// so zero probabilities stay finite.
#[must_use = "returns the converted matrix"]
pub fn softmax_to_log_probs(probs: ArrayView2<'_, f32>) -> Array2<f32> {
    probs.mapv(|p| p.max(f32::MIN_POSITIVE).ln())
}

/// Creates [`OrtEngine`]s over one models directory
///
/// Engines inherit the probed device buffer ceiling.
#[derive(Debug, Clone)]
pub struct OrtEngineFactory {
    layout: ModelLayout,
}

impl OrtEngineFactory {
    #[must_use = "factory is created but not used"]
    pub const fn new(layout: ModelLayout) -> Self {
        Self { layout }
    }
}

impl EngineFactory for OrtEngineFactory {
    fn create(
        &self,
        backend: Backend,
        variant: ModelVariant,
        capabilities: &Capabilities,
    ) -> Box<dyn Engine> {
        Box::new(OrtEngine::new(
            backend,
            variant,
            self.layout.clone(),
            capabilities.max_buffer_bytes,
        ))
    }
}

/// Checks which accelerated execution providers ONNX Runtime can use here
#[derive(Debug, Clone, Default)]
pub struct OrtCapabilityProbe {
    max_buffer_bytes: Option<u64>,
}

impl OrtCapabilityProbe {
    #[must_use = "probe is created but not used"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a fixed device buffer ceiling
    #[must_use = "builder methods return a new probe"]
    pub const fn with_max_buffer_bytes(mut self, bytes: u64) -> Self {
        self.max_buffer_bytes = Some(bytes);
        self
    }
}

impl CapabilityProbe for OrtCapabilityProbe {
    fn probe(&self) -> Capabilities {
        let accelerated_name = if cfg!(target_os = "macos")
            && CoreMLExecutionProvider::default().is_available().unwrap_or(false)
        {
            Some("coreml")
        } else if CUDAExecutionProvider::default().is_available().unwrap_or(false) {
            Some("cuda")
        } else {
            None
        };

        match accelerated_name {
            Some(name) => log::info!("Auto-detected {name} execution provider"),
            None => log::info!("No accelerated execution provider found, using CPU"),
        }

        Capabilities {
            accelerated_available: accelerated_name.is_some(),
            accelerated_name: accelerated_name.map(str::to_string),
            max_buffer_bytes: self.max_buffer_bytes,
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::recognition::{ctc_greedy_decode, SymbolDictionary};
    use image::{Rgb, RgbImage};
    use ndarray::array;

    #[test]
    fn test_detection_preprocess_multiple_of_32() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(100, 50));
        let t = preprocess_detection(&image, DET_LIMIT_SIDE_LEN).unwrap();
        assert_eq!(t.shape(), &[1, 3, 64, 96]);
    }

    #[test]
    fn test_detection_preprocess_limits_long_side() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(1920, 1080));
        let t = preprocess_detection(&image, 960).unwrap();
        assert_eq!(t.shape()[3], 960);
        assert_eq!(t.shape()[2] % 32, 0);
    }

    #[test]
    fn test_detection_preprocess_imagenet_normalization() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([255, 255, 255])));
        let t = preprocess_detection(&image, 960).unwrap();
        let expected = (1.0 - DET_MEAN[0]) / DET_STD[0];
        assert!((t[[0, 0, 5, 5]] - expected).abs() < 1e-4);
    }

    #[test]
    fn test_recognition_preprocess_shape_and_range() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 24, Rgb([0, 255, 0])));
        let t = preprocess_recognition(&image).unwrap();
        assert_eq!(t.shape(), &[1, 3, 48, 200]);
        assert!((t[[0, 0, 10, 10]] + 1.0).abs() < 1e-4);
        assert!((t[[0, 1, 10, 10]] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let empty = DynamicImage::new_rgb8(0, 10);
        assert!(matches!(
            preprocess_recognition(&empty),
            Err(EngineError::Preprocessing(_))
        ));
        assert!(preprocess_detection(&empty, 960).is_err());
    }

    #[test]
    fn test_missing_models_fail_as_model_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = OrtEngine::new(
            Backend::Portable,
            ModelVariant::Mobile,
            ModelLayout::new(dir.path()),
            None,
        );
        let err = engine.initialize().unwrap_err();
        assert!(matches!(err, EngineError::ModelLoad { .. }));
        assert!(matches!(
            engine.detect(&DynamicImage::new_rgb8(32, 32)),
            Err(EngineError::NotReady(_))
        ));
        assert_eq!(engine.live_tensors(), 0);
    }

    #[test]
    fn test_oversized_model_hits_buffer_limit() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ModelLayout::new(dir.path());
        let det = layout.detection_model(ModelVariant::Server);
        std::fs::create_dir_all(det.parent().unwrap()).unwrap();
        std::fs::write(&det, vec![0_u8; 4096]).unwrap();

        let mut engine = OrtEngine::new(Backend::Accelerated, ModelVariant::Server, layout, Some(1024));
        let err = engine.initialize().unwrap_err();
        assert!(err.is_buffer_limit());
    }

    #[test]
    fn test_softmax_output_decodes_to_real_confidence() {
        let dict = SymbolDictionary::from_lines(["a", "b"], false).unwrap();
        let softmax = array![[0.30_f32, 0.36, 0.34], [0.33, 0.32, 0.35]];

        let out = ctc_greedy_decode(softmax_to_log_probs(softmax.view()).view(), &dict);

        assert_eq!(out.text, "ab");
        assert!((out.confidence - 35.5).abs() < 1e-3);
    }

    #[test]
    fn test_log_probs_stay_finite_for_zero() {
        let logp = softmax_to_log_probs(array![[0.0_f32, 1.0]].view());
        assert!(logp.iter().all(|v| v.is_finite()));
        assert_eq!(logp[[0, 1]], 0.0);
    }
}
