//! Detection post-processing: probability heatmap → scored text boxes

pub mod morphology;
mod postprocess;

pub use postprocess::{
    heatmap_view, postprocess_heatmap, unclip_rect, DetectedBox, MapScale, MIN_RAW_PIXELS,
};
