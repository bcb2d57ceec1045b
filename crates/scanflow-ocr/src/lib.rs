//! Scanflow OCR engine core
//!
//! Turns model outputs into structured, reading-ordered text for a scanned page.
//!
//! # Architecture
//!
//! ```text
//! image ─▶ detection model ─▶ heatmap ─▶ detection::postprocess_heatmap ─▶ boxes
//!   boxes ─▶ crops ─▶ recognition model ─▶ recognition::ctc_greedy_decode ─▶ raw regions
//!   failed regions ─▶ fallback::resolve_failed_regions ─▶ raw regions
//!   raw regions + separators ─▶ layout::merge_regions ─▶ merged blocks
//! ```
//!
//! Models run behind the [`engine::Engine`] trait. [`engine::EngineSupervisor`]
//! picks the accelerated backend when the machine has one and silently
//! re-runs a call on the portable backend if the accelerated one runs out of
//! memory. [`OcrPipeline`] strings the stages together for one image and
//! [`OcrWorker`] runs a pipeline on its own thread.
//!
//! # Platform Support
//!
//! - **Linux/Windows**: ONNX Runtime with CUDA when available, CPU otherwise
//! - **macOS**: ONNX Runtime with the `CoreML` execution provider
//!
//! # Features
//!
//! - `tesseract`: classical fallback recognizer via `leptess`
//!
//! # Examples
//!
//! ```
//! use scanflow_ocr::{ModelVariant, OcrSettingsBuilder};
//!
//! let settings = OcrSettingsBuilder::new()
//!     .detection_threshold(0.25)
//!     .model_variant(ModelVariant::Mobile)
//!     .build()
//!     .unwrap();
//! assert_eq!(settings.layout_params().max_depth, 10);
//! ```

pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod geometry;
pub mod layout;
pub mod mask;
pub mod pipeline;
pub mod recognition;
pub mod types;
pub mod worker;

pub use config::{
    BackendPreference, Connectivity, DetectionParams, LayoutParams, ModelVariant, OcrSettings,
    OcrSettingsBuilder,
};
pub use detection::{postprocess_heatmap, DetectedBox, MapScale};
pub use engine::{Backend, EngineState, EngineSupervisor, ModelLayout};
pub use error::{EngineError, OcrError, Result};
pub use fallback::{FallbackOcr, FallbackText};
pub use geometry::{Point, Quad, Rect};
pub use layout::merge_regions;
pub use mask::region_mask;
pub use pipeline::{CancelToken, OcrPipeline, OcrProfiling, RecognitionReport};
pub use recognition::{ctc_greedy_decode, SymbolDictionary};
pub use types::{
    Alignment, FailureReason, MergedBlock, OcrOutput, RecognitionSource, SeparatorLine,
    TextRegion,
};
pub use worker::{OcrWorker, PendingRecognition};
