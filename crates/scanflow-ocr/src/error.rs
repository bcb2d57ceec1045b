//! Error types for the scanflow OCR engine
//!
//! Errors fall into three tiers:
//!
//! - **Per-region recoverable**: never surfaced as an error. A region that fails
//!   recognition carries a [`FailureReason`](crate::types::FailureReason), goes
//!   through the fallback recognizer, and is dropped from layout if it still fails.
//! - **Engine-level recoverable**: [`EngineError::ResourceExhausted`] on an
//!   accelerated backend. The supervisor downgrades to the portable backend and
//!   retries the call; callers only see it when the portable backend also runs out.
//! - **Fatal**: everything else that reaches the caller. [`EngineError::BufferLimitExceeded`]
//!   is fatal for the requested model variant but actionable: retry with a smaller one.
//!
//! # Examples
//!
//! ```no_run
//! use scanflow_ocr::{EngineError, OcrError};
//!
//! fn report(err: &OcrError) {
//!     match err {
//!         OcrError::Engine(EngineError::BufferLimitExceeded { variant, .. }) => {
//!             log::warn!("{variant} model does not fit on this device, try a smaller variant");
//!         }
//!         other => log::error!("OCR failed: {other}"),
//!     }
//! }
//! ```

use crate::config::ModelVariant;
use thiserror::Error;

/// Errors raised by an execution backend
///
/// The supervisor in [`crate::engine::EngineSupervisor`] inspects these to decide
/// between a transparent backend downgrade and a hard failure.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The backend ran out of memory while running a model.
    ///
    /// Recoverable on accelerated backends by switching to the portable one.
    #[error("Backend resources exhausted on {backend}: {reason}")]
    ResourceExhausted {
        /// Backend that raised the error (e.g. "cuda", "cpu")
        backend: String,
        /// Message reported by the runtime
        reason: String,
    },

    /// A model does not fit the device's fixed maximum buffer size.
    ///
    /// Raised during initialization. Retrying on the same variant cannot succeed;
    /// the caller should pick a smaller [`ModelVariant`].
    #[error("Model variant '{variant}' exceeds the device buffer limit: {reason}")]
    BufferLimitExceeded {
        /// Variant whose model did not fit
        variant: ModelVariant,
        /// Message describing the exceeded limit
        reason: String,
    },

    /// Model loading failed for a reason unrelated to resource limits
    #[error("Failed to load {model_name} model: {reason}")]
    ModelLoad {
        /// Model that failed to load ("detection", "recognition")
        model_name: String,
        /// Underlying reason
        reason: String,
    },

    /// Running a model failed for a reason unrelated to resource limits
    #[error("Inference failed for {model_name}: {reason}")]
    Inference {
        /// Model that failed ("detection", "recognition")
        model_name: String,
        /// Underlying reason
        reason: String,
    },

    /// Input could not be prepared for the model (resize, normalization)
    #[error("Preprocessing failed: {0}")]
    Preprocessing(String),

    /// The engine was used before `initialize` succeeded or after `terminate`
    #[error("Engine is not ready (state: {0})")]
    NotReady(String),
}

impl EngineError {
    /// Returns true if the error is memory exhaustion, which an accelerated
    /// backend recovers from by downgrading to the portable backend.
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_resource_exhausted(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }

    /// Returns true if the error is the hard device buffer ceiling.
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_buffer_limit(&self) -> bool {
        matches!(self, Self::BufferLimitExceeded { .. })
    }

    /// Classify a runtime error message from `backend`.
    ///
    /// ONNX Runtime reports allocation failures as plain strings, so the kind is
    /// recovered from the message text.
    #[must_use = "returns the classified error"]
    pub fn classify(
        backend: &str,
        model_name: &str,
        variant: ModelVariant,
        message: String,
        during_init: bool,
    ) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("buffer size")
            && (lower.contains("exceed") || lower.contains("limit") || lower.contains("max"))
        {
            return Self::BufferLimitExceeded {
                variant,
                reason: message,
            };
        }
        if lower.contains("out of memory")
            || lower.contains("failed to allocate")
            || lower.contains("allocation failed")
            || lower.contains("bad_alloc")
        {
            return Self::ResourceExhausted {
                backend: backend.to_string(),
                reason: message,
            };
        }
        if during_init {
            Self::ModelLoad {
                model_name: model_name.to_string(),
                reason: message,
            }
        } else {
            Self::Inference {
                model_name: model_name.to_string(),
                reason: message,
            }
        }
    }
}

/// Crate-level error type
#[derive(Error, Debug)]
pub enum OcrError {
    /// Invalid settings (user-fixable)
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Input tensor or image has an unusable shape
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Symbol dictionary could not be loaded or is unusable
    #[error("Invalid symbol dictionary: {0}")]
    DictionaryError(String),

    /// Error from the execution backend
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The fallback recognizer could not be created or run
    #[error("Fallback recognizer failed: {0}")]
    FallbackError(String),

    /// The call was cancelled between pipeline stages
    #[error("Recognition cancelled after {stage}")]
    Cancelled {
        /// Last stage that completed before cancellation was observed
        stage: &'static str,
    },

    /// Worker thread is gone
    #[error("OCR worker disconnected")]
    WorkerDisconnected,

    /// I/O error (dictionary, settings or model files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid JSON for [`crate::config::OcrSettings`]
    #[error("Failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),
}

impl OcrError {
    /// Returns true if the error is a configuration error
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError(_))
    }

    /// Returns true if the caller should retry with a smaller model variant
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_buffer_limit(&self) -> bool {
        matches!(self, Self::Engine(EngineError::BufferLimitExceeded { .. }))
    }

    /// Returns true if the call was cancelled
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, OcrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_out_of_memory() {
        let err = EngineError::classify(
            "cuda",
            "detection",
            ModelVariant::Server,
            "CUDA failure 2: out of memory".to_string(),
            false,
        );
        assert!(err.is_resource_exhausted());
        assert!(!err.is_buffer_limit());
    }

    #[test]
    fn test_classify_bfc_arena_allocation() {
        let err = EngineError::classify(
            "cuda",
            "recognition",
            ModelVariant::Server,
            "BFCArena::AllocateRawInternal Failed to allocate memory for requested buffer".to_string(),
            false,
        );
        assert!(err.is_resource_exhausted());
    }

    #[test]
    fn test_classify_buffer_limit() {
        let err = EngineError::classify(
            "webgpu",
            "detection",
            ModelVariant::Server,
            "Requested buffer size 268435460 exceeds the max buffer size limit".to_string(),
            true,
        );
        assert!(err.is_buffer_limit());
        assert!(matches!(
            err,
            EngineError::BufferLimitExceeded {
                variant: ModelVariant::Server,
                ..
            }
        ));
    }

    #[test]
    fn test_classify_generic_init_failure_is_model_load() {
        let err = EngineError::classify(
            "cpu",
            "detection",
            ModelVariant::Mobile,
            "Protobuf parsing failed".to_string(),
            true,
        );
        assert!(matches!(err, EngineError::ModelLoad { .. }));
        assert!(err.to_string().contains("Failed to load detection model"));
    }

    #[test]
    fn test_classify_generic_run_failure_is_inference() {
        let err = EngineError::classify(
            "cpu",
            "recognition",
            ModelVariant::Mobile,
            "Invalid rank for input".to_string(),
            false,
        );
        assert!(matches!(err, EngineError::Inference { .. }));
    }

    #[test]
    fn test_ocr_error_helpers() {
        let err: OcrError = EngineError::BufferLimitExceeded {
            variant: ModelVariant::Server,
            reason: "too big".to_string(),
        }
        .into();
        assert!(err.is_buffer_limit());
        assert!(!err.is_config_error());

        let err = OcrError::ConfigError("bad threshold".to_string());
        assert!(err.is_config_error());
        assert_eq!(err.to_string(), "Invalid configuration: bad threshold");

        let err = OcrError::Cancelled { stage: "detection" };
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "Recognition cancelled after detection");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: OcrError = io_err.into();
        assert!(matches!(err, OcrError::Io(_)));
        assert!(err.to_string().contains("missing"));
    }
}
