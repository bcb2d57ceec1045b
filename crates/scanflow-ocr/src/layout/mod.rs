//! Layout reconstruction: regroup recognized lines into blocks in reading order
//!
//! # Examples
//!
//! ```
//! use scanflow_ocr::layout::merge_regions;
//! use scanflow_ocr::{LayoutParams, Rect, TextRegion};
//!
//! let regions = vec![
//!     TextRegion::new(Rect::new(10.0, 10.0, 50.0, 20.0), "Hello", 95.0),
//!     TextRegion::new(Rect::new(70.0, 10.0, 50.0, 20.0), "World", 91.0),
//! ];
//! let blocks = merge_regions(&regions, &[], &LayoutParams::default());
//! assert_eq!(blocks.len(), 1);
//! assert_eq!(blocks[0].text, "Hello World");
//! ```

mod assembly;
mod separators;
mod xycut;

pub use assembly::{assemble_block, group_lines, infer_alignment, join_text};
pub use separators::{find_violation, split_by_separator};
pub use xycut::{median_height, partition};

use crate::config::LayoutParams;
use crate::types::{MergedBlock, SeparatorLine, TextRegion};

/// Merge regions into blocks.
///
/// Failed regions and regions with blank text are dropped first. Every other
/// region appears in exactly one block, and no block holds two regions whose
/// center-to-center segment crosses a separator.
#[must_use = "returns the merged blocks"]
pub fn merge_regions(
    regions: &[TextRegion],
    separators: &[SeparatorLine],
    params: &LayoutParams,
) -> Vec<MergedBlock> {
    let members: Vec<&TextRegion> = regions.iter().filter(|r| r.is_mergeable()).collect();
    let eligible = members.len();
    let leaves = partition(members, separators, params);
    let blocks: Vec<MergedBlock> = leaves
        .iter()
        .filter_map(|leaf| assemble_block(leaf, params.same_line_height_ratio))
        .collect();
    log::debug!(
        "Layout: {} regions ({} eligible) -> {} blocks",
        regions.len(),
        eligible,
        blocks.len()
    );
    blocks
}
