//! Execution backends and their supervisor
//!
//! An [`Engine`] runs the detection and recognition models on one backend.
//! [`EngineSupervisor`] owns exactly one active engine, picks its backend from
//! a one-time [`CapabilityProbe`], and swaps it for a portable one when the
//! accelerated backend runs out of memory.

mod ort_engine;
mod supervisor;
mod tensor;

pub use ort_engine::{OrtCapabilityProbe, OrtEngine, OrtEngineFactory};
pub use supervisor::{EngineState, EngineSupervisor, SupervisedRun};
pub use tensor::{ScopedTensor, TensorTracker};

use crate::config::ModelVariant;
use crate::detection::MapScale;
use crate::error::EngineError;
use image::DynamicImage;
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Which kind of backend an engine runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// GPU or neural accelerator
    Accelerated,
    /// CPU, always available
    Portable,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accelerated => write!(f, "accelerated"),
            Self::Portable => write!(f, "portable"),
        }
    }
}

/// Result of the one-time capability probe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub accelerated_available: bool,
    /// Name of the accelerated provider found (e.g. "cuda", "coreml")
    pub accelerated_name: Option<String>,
    /// Largest single buffer the accelerated device accepts, if it has a fixed limit
    pub max_buffer_bytes: Option<u64>,
}

/// Discovers which backends this machine offers
pub trait CapabilityProbe: Send {
    fn probe(&self) -> Capabilities;
}

/// Raw detection model output for one image
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOutput {
    /// Per-pixel text probability, `[H, W]`
    pub heatmap: Array2<f32>,
    /// Maps heatmap pixels to original-image pixels
    pub scale: MapScale,
}

/// One execution backend running the detection and recognition models
///
/// Calls other than `initialize` fail with [`EngineError::NotReady`] until
/// `initialize` has succeeded.
pub trait Engine: Send {
    fn backend(&self) -> Backend;

    /// Load models. Fails with [`EngineError::BufferLimitExceeded`] if a model
    /// does not fit the device's buffer ceiling.
    fn initialize(&mut self) -> Result<(), EngineError>;

    /// Run the detection model on the whole image
    fn detect(&mut self, image: &DynamicImage) -> Result<DetectionOutput, EngineError>;

    /// Run the recognition model on one crop, returning `[seq_len, vocab_size]`
    /// natural-log probabilities
    fn recognize_region(&mut self, crop: &DynamicImage) -> Result<Array2<f32>, EngineError>;

    /// Release models and device memory. Idempotent.
    fn terminate(&mut self);
}

/// Creates engines for the supervisor
pub trait EngineFactory: Send {
    /// `capabilities` is the supervisor's probe result
    fn create(
        &self,
        backend: Backend,
        variant: ModelVariant,
        capabilities: &Capabilities,
    ) -> Box<dyn Engine>;
}

/// Model files for each variant under a models directory:
///
/// ```text
/// <models_dir>/<variant>/det.onnx
/// <models_dir>/<variant>/rec.onnx
/// <models_dir>/<variant>/keys.txt
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLayout {
    root: PathBuf,
}

impl ModelLayout {
    #[must_use = "layout is created but not used"]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn detection_model(&self, variant: ModelVariant) -> PathBuf {
        self.root.join(variant.to_string()).join("det.onnx")
    }

    #[must_use]
    pub fn recognition_model(&self, variant: ModelVariant) -> PathBuf {
        self.root.join(variant.to_string()).join("rec.onnx")
    }

    #[must_use]
    pub fn dictionary(&self, variant: ModelVariant) -> PathBuf {
        self.root.join(variant.to_string()).join("keys.txt")
    }
}
