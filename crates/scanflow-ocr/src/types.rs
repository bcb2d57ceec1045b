//! Region, block and separator data model

use crate::geometry::{Point, Quad, Rect};
use serde::{Deserialize, Serialize};

/// Why recognition produced no usable text for a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Decoding produced an empty string
    EmptyText,
    /// The crop collapsed to zero width or height after rounding
    InvalidCrop,
    /// The crop could not be resized/normalized for the recognition model
    PreprocessingFailed,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyText => write!(f, "empty_text"),
            Self::InvalidCrop => write!(f, "invalid_crop"),
            Self::PreprocessingFailed => write!(f, "preprocessing_failed"),
        }
    }
}

/// Which recognizer produced a region's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionSource {
    /// Primary neural recognizer with CTC decoding
    #[default]
    Neural,
    /// Classical fallback recognizer
    Fallback,
    /// Text typed in by a user
    Manual,
}

/// One detected text box and what was read from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    /// Axis-aligned bounds in image coordinates
    pub bounds: Rect,
    /// Detected quadrilateral, clockwise from top-left
    pub polygon: Quad,
    /// Recognized text. Not trimmed: leading/trailing spaces carry layout information.
    pub text: String,
    /// Recognition confidence in `[0, 100]`
    pub confidence: f32,
    /// Detection score in `[0, 1]`
    pub detection_score: f32,
    #[serde(default)]
    pub recognition_failed: bool,
    #[serde(default)]
    pub failure_reason: Option<FailureReason>,
    #[serde(default)]
    pub recognition_source: RecognitionSource,
}

impl TextRegion {
    /// A successfully recognized region whose polygon is its bounds
    #[must_use = "region is created but not used"]
    pub fn new(bounds: Rect, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            bounds,
            polygon: bounds.to_quad(),
            text: text.into(),
            confidence,
            detection_score: 1.0,
            recognition_failed: false,
            failure_reason: None,
            recognition_source: RecognitionSource::Neural,
        }
    }

    /// A region whose recognition failed
    #[must_use = "region is created but not used"]
    pub fn failed(bounds: Rect, polygon: Quad, detection_score: f32, reason: FailureReason) -> Self {
        Self {
            bounds,
            polygon,
            text: String::new(),
            confidence: 0.0,
            detection_score,
            recognition_failed: true,
            failure_reason: Some(reason),
            recognition_source: RecognitionSource::Neural,
        }
    }

    /// True if the region may take part in layout merging
    #[inline]
    #[must_use = "eligibility check result is returned but not used"]
    pub fn is_mergeable(&self) -> bool {
        !self.recognition_failed && !self.text.trim().is_empty()
    }
}

/// Horizontal alignment inferred for a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl std::fmt::Display for Alignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Center => write!(f, "center"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// A group of regions that read as one paragraph or column cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedBlock {
    /// Exact min/max union of the member bounds
    pub bounds: Rect,
    /// Rectangle of `bounds`
    pub polygon: Quad,
    /// Members joined by a space on the same visual line, newline otherwise
    pub text: String,
    /// Mean member confidence
    pub confidence: f32,
    /// Mean member height, used as a point-size proxy
    pub font_size: f32,
    pub alignment: Alignment,
    /// Members in reading order, kept for per-line styling downstream
    pub lines: Vec<TextRegion>,
}

/// A user-drawn cut: regions on either side never share a block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeparatorLine {
    pub start: Point,
    pub end: Point,
}

impl SeparatorLine {
    #[inline]
    #[must_use = "separator is created but not used"]
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    /// Vertical separator at `x` spanning `y0..y1`
    #[inline]
    #[must_use = "separator is created but not used"]
    pub const fn vertical(x: f32, y0: f32, y1: f32) -> Self {
        Self::new(Point::new(x, y0), Point::new(x, y1))
    }

    /// Horizontal separator at `y` spanning `x0..x1`
    #[inline]
    #[must_use = "separator is created but not used"]
    pub const fn horizontal(y: f32, x0: f32, x1: f32) -> Self {
        Self::new(Point::new(x0, y), Point::new(x1, y))
    }
}

/// Result of one per-image recognition call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OcrOutput {
    /// Blocks in reading order
    pub merged_blocks: Vec<MergedBlock>,
    /// Every detected region, including the ones that stayed failed
    pub raw_regions: Vec<TextRegion>,
}

impl OcrOutput {
    /// All block text joined with blank lines
    #[must_use = "concatenated text is returned but not used"]
    pub fn text(&self) -> String {
        self.merged_blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[inline]
    #[must_use = "emptiness check result is returned but not used"]
    pub fn is_empty(&self) -> bool {
        self.merged_blocks.is_empty()
    }
}
