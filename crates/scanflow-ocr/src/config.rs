//! Per-call settings
//!
//! [`OcrSettings`] is the settings object injected into every recognition call.
//! Its keys are flat so it can be stored and exchanged as a small JSON object;
//! the algorithms receive the narrower parameter structs [`DetectionParams`]
//! and [`LayoutParams`] derived from it.
//!
//! The numeric defaults are empirically tuned values, not invariants.
//!
//! # Examples
//!
//! ```
//! use scanflow_ocr::{ModelVariant, OcrSettingsBuilder};
//!
//! # fn main() -> scanflow_ocr::Result<()> {
//! let settings = OcrSettingsBuilder::new()
//!     .detection_threshold(0.35)
//!     .paragraph_gap_ratio(0.5)
//!     .model_variant(ModelVariant::Mobile)
//!     .build()?;
//! assert_eq!(settings.model_variant, ModelVariant::Mobile);
//! # Ok(())
//! # }
//! ```

use crate::error::{OcrError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which model size to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// Larger, more accurate models
    #[default]
    Server,
    /// Smaller models for constrained devices
    Mobile,
}

impl ModelVariant {
    /// The next smaller variant, if any
    #[inline]
    #[must_use = "returns the smaller variant without changing this one"]
    pub const fn smaller(self) -> Option<Self> {
        match self {
            Self::Server => Some(Self::Mobile),
            Self::Mobile => None,
        }
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::Mobile => write!(f, "mobile"),
        }
    }
}

impl std::str::FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "server" | "large" => Ok(Self::Server),
            "mobile" | "small" => Ok(Self::Mobile),
            _ => Err(format!("Unknown model variant '{s}'. Expected: server, mobile")),
        }
    }
}

/// User preference for the execution backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// Use an accelerated backend when the capability probe finds one
    #[default]
    Auto,
    /// Require the accelerated backend if available, same as `Auto` otherwise
    Accelerated,
    /// Never use an accelerated backend
    Portable,
}

impl std::fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Accelerated => write!(f, "accelerated"),
            Self::Portable => write!(f, "portable"),
        }
    }
}

impl std::str::FromStr for BackendPreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "accelerated" | "gpu" => Ok(Self::Accelerated),
            "portable" | "cpu" => Ok(Self::Portable),
            _ => Err(format!(
                "Unknown backend '{s}'. Expected: auto, accelerated, portable"
            )),
        }
    }
}

/// Pixel adjacency used for connected-component labeling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Four,
    /// Also joins diagonal neighbours, catching diagonal glyph adjacency
    #[default]
    Eight,
}

/// Settings injected per recognition call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Binarization threshold applied to the heatmap (default: 0.3)
    pub detection_threshold: f32,
    /// Minimum mean probability of a box's raw pixels (default: 0.5)
    pub box_threshold: f32,
    /// Minimum component bounding-box area in heatmap pixels (default: 10)
    pub min_area: f32,
    /// Unclip expansion ratio (default: 1.5)
    pub unclip_ratio: f32,
    /// Two regions share a line if their vertical centers differ by less than
    /// this fraction of the smaller height (default: 0.7)
    pub same_line_height_ratio: f32,
    /// Minimum horizontal gap for a column cut, in median line heights (default: 1.5)
    pub column_gap_ratio: f32,
    /// Minimum vertical gap for a paragraph cut, in median line heights (default: 0.3)
    pub paragraph_gap_ratio: f32,
    pub model_variant: ModelVariant,
    pub backend: BackendPreference,
    /// Horizontal dilation iterations along the text-line axis (default: 2)
    pub dilation_x: u32,
    /// Vertical dilation iterations (default: 1)
    pub dilation_y: u32,
    pub connectivity: Connectivity,
    /// Recursion ceiling for the XY-cut (default: 10)
    pub max_split_depth: usize,
    /// Run the fallback recognizer on failed regions (default: true)
    pub fallback_enabled: bool,
    /// Padding added around a region before fallback recognition (default: 4)
    pub fallback_padding: u32,
}

impl Default for OcrSettings {
    #[inline]
    fn default() -> Self {
        Self {
            detection_threshold: 0.3,
            box_threshold: 0.5,
            min_area: 10.0,
            unclip_ratio: 1.5,
            same_line_height_ratio: 0.7,
            column_gap_ratio: 1.5,
            paragraph_gap_ratio: 0.3,
            model_variant: ModelVariant::Server,
            backend: BackendPreference::Auto,
            dilation_x: 2,
            dilation_y: 1,
            connectivity: Connectivity::Eight,
            max_split_depth: 10,
            fallback_enabled: true,
            fallback_padding: 4,
        }
    }
}

impl OcrSettings {
    /// Load settings from a JSON file; missing keys take their defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or holds
    /// out-of-range values.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`OcrError::ConfigError`] naming the first invalid key.
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(OcrError::ConfigError(format!(
                    "{name} must be within [0, 1], got {v}"
                )))
            }
        };
        let positive = |name: &str, v: f32| {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(OcrError::ConfigError(format!(
                    "{name} must be a positive number, got {v}"
                )))
            }
        };

        unit("detection_threshold", self.detection_threshold)?;
        unit("box_threshold", self.box_threshold)?;
        if !(self.min_area >= 0.0 && self.min_area.is_finite()) {
            return Err(OcrError::ConfigError(format!(
                "min_area must be non-negative, got {}",
                self.min_area
            )));
        }
        positive("unclip_ratio", self.unclip_ratio)?;
        positive("same_line_height_ratio", self.same_line_height_ratio)?;
        positive("column_gap_ratio", self.column_gap_ratio)?;
        positive("paragraph_gap_ratio", self.paragraph_gap_ratio)?;
        if self.dilation_x > 16 || self.dilation_y > 16 {
            return Err(OcrError::ConfigError(format!(
                "dilation iterations must be at most 16, got x={} y={}",
                self.dilation_x, self.dilation_y
            )));
        }
        if self.max_split_depth == 0 {
            return Err(OcrError::ConfigError(
                "max_split_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parameters for the detection post-processor
    #[inline]
    #[must_use = "returns the derived parameters"]
    pub const fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            threshold: self.detection_threshold,
            box_threshold: self.box_threshold,
            min_area: self.min_area,
            unclip_ratio: self.unclip_ratio,
            dilation_x: self.dilation_x,
            dilation_y: self.dilation_y,
            connectivity: self.connectivity,
        }
    }

    /// Parameters for the layout merger
    #[inline]
    #[must_use = "returns the derived parameters"]
    pub const fn layout_params(&self) -> LayoutParams {
        LayoutParams {
            same_line_height_ratio: self.same_line_height_ratio,
            column_gap_ratio: self.column_gap_ratio,
            paragraph_gap_ratio: self.paragraph_gap_ratio,
            max_depth: self.max_split_depth,
        }
    }
}

/// Detection post-processing parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    pub threshold: f32,
    pub box_threshold: f32,
    pub min_area: f32,
    pub unclip_ratio: f32,
    pub dilation_x: u32,
    pub dilation_y: u32,
    pub connectivity: Connectivity,
}

impl Default for DetectionParams {
    #[inline]
    fn default() -> Self {
        OcrSettings::default().detection_params()
    }
}

/// Layout merging parameters, threaded explicitly through the XY-cut recursion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    pub same_line_height_ratio: f32,
    pub column_gap_ratio: f32,
    pub paragraph_gap_ratio: f32,
    pub max_depth: usize,
}

impl Default for LayoutParams {
    #[inline]
    fn default() -> Self {
        OcrSettings::default().layout_params()
    }
}

/// Builder for [`OcrSettings`]
#[derive(Debug, Clone, Default)]
pub struct OcrSettingsBuilder {
    settings: OcrSettings,
}

impl OcrSettingsBuilder {
    #[inline]
    #[must_use = "returns a new builder with default settings"]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "builder methods return a new builder"]
    pub const fn detection_threshold(mut self, v: f32) -> Self {
        self.settings.detection_threshold = v;
        self
    }

    #[must_use = "builder methods return a new builder"]
    pub const fn box_threshold(mut self, v: f32) -> Self {
        self.settings.box_threshold = v;
        self
    }

    #[must_use = "builder methods return a new builder"]
    pub const fn min_area(mut self, v: f32) -> Self {
        self.settings.min_area = v;
        self
    }

    #[must_use = "builder methods return a new builder"]
    pub const fn unclip_ratio(mut self, v: f32) -> Self {
        self.settings.unclip_ratio = v;
        self
    }

    #[must_use = "builder methods return a new builder"]
    pub const fn same_line_height_ratio(mut self, v: f32) -> Self {
        self.settings.same_line_height_ratio = v;
        self
    }

    #[must_use = "builder methods return a new builder"]
    pub const fn column_gap_ratio(mut self, v: f32) -> Self {
        self.settings.column_gap_ratio = v;
        self
    }

    #[must_use = "builder methods return a new builder"]
    pub const fn paragraph_gap_ratio(mut self, v: f32) -> Self {
        self.settings.paragraph_gap_ratio = v;
        self
    }

    #[must_use = "builder methods return a new builder"]
    pub const fn model_variant(mut self, v: ModelVariant) -> Self {
        self.settings.model_variant = v;
        self
    }

    #[must_use = "builder methods return a new builder"]
    pub const fn backend(mut self, v: BackendPreference) -> Self {
        self.settings.backend = v;
        self
    }

    #[must_use = "builder methods return a new builder"]
    pub const fn dilation(mut self, x: u32, y: u32) -> Self {
        self.settings.dilation_x = x;
        self.settings.dilation_y = y;
        self
    }

    #[must_use = "builder methods return a new builder"]
    pub const fn connectivity(mut self, v: Connectivity) -> Self {
        self.settings.connectivity = v;
        self
    }

    #[must_use = "builder methods return a new builder"]
    pub const fn max_split_depth(mut self, v: usize) -> Self {
        self.settings.max_split_depth = v;
        self
    }

    #[must_use = "builder methods return a new builder"]
    pub const fn fallback_enabled(mut self, v: bool) -> Self {
        self.settings.fallback_enabled = v;
        self
    }

    #[must_use = "builder methods return a new builder"]
    pub const fn fallback_padding(mut self, v: u32) -> Self {
        self.settings.fallback_padding = v;
        self
    }

    /// Validate and return the settings
    ///
    /// # Errors
    ///
    /// Returns [`OcrError::ConfigError`] if any value is out of range.
    pub fn build(self) -> Result<OcrSettings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = OcrSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.unclip_ratio, 1.5);
        assert_eq!(settings.column_gap_ratio, 1.5);
        assert_eq!(settings.paragraph_gap_ratio, 0.3);
        assert_eq!(settings.same_line_height_ratio, 0.7);
    }

    #[test]
    fn test_builder_rejects_out_of_range() {
        let err = OcrSettingsBuilder::new()
            .detection_threshold(1.5)
            .build()
            .unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("detection_threshold"));

        assert!(OcrSettingsBuilder::new().unclip_ratio(0.0).build().is_err());
        assert!(OcrSettingsBuilder::new().max_split_depth(0).build().is_err());
        assert!(OcrSettingsBuilder::new().dilation(40, 1).build().is_err());
        assert!(OcrSettingsBuilder::new().min_area(f32::NAN).build().is_err());
    }

    #[test]
    fn test_params_follow_settings() {
        let settings = OcrSettingsBuilder::new()
            .box_threshold(0.6)
            .column_gap_ratio(2.0)
            .build()
            .unwrap();
        assert_eq!(settings.detection_params().box_threshold, 0.6);
        assert_eq!(settings.layout_params().column_gap_ratio, 2.0);
        assert_eq!(settings.layout_params().max_depth, 10);
    }

    #[test]
    fn test_variant_and_backend_parse() {
        assert_eq!("Mobile".parse::<ModelVariant>().unwrap(), ModelVariant::Mobile);
        assert_eq!("server".parse::<ModelVariant>().unwrap(), ModelVariant::Server);
        assert!("tiny".parse::<ModelVariant>().is_err());
        assert_eq!(ModelVariant::Server.smaller(), Some(ModelVariant::Mobile));
        assert_eq!(ModelVariant::Mobile.smaller(), None);

        assert_eq!("cpu".parse::<BackendPreference>().unwrap(), BackendPreference::Portable);
        assert_eq!("GPU".parse::<BackendPreference>().unwrap(), BackendPreference::Accelerated);
        for pref in [
            BackendPreference::Auto,
            BackendPreference::Accelerated,
            BackendPreference::Portable,
        ] {
            assert_eq!(pref.to_string().parse::<BackendPreference>().unwrap(), pref);
        }
    }

    #[test]
    fn test_from_json_file_partial_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"detection_threshold": 0.4, "model_variant": "mobile"}}"#
        )
        .unwrap();

        let settings = OcrSettings::from_json_file(file.path()).unwrap();
        assert_eq!(settings.detection_threshold, 0.4);
        assert_eq!(settings.model_variant, ModelVariant::Mobile);
        assert_eq!(settings.box_threshold, 0.5);
    }

    #[test]
    fn test_from_json_file_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"box_threshold": -1.0}}"#).unwrap();
        let err = OcrSettings::from_json_file(file.path()).unwrap_err();
        assert!(err.is_config_error());
    }
}
