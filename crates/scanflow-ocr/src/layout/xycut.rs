//! Recursive XY-cut over region bounds
//!
//! Each level projects the members onto the X axis and cuts at the widest gap
//! if it exceeds `column_gap_ratio` median line heights; otherwise it tries the
//! Y axis against `paragraph_gap_ratio`. Leaves that still hold a pair split by
//! a separator are cut along that separator regardless of depth.

use super::separators::{find_violation, split_by_separator};
use crate::config::LayoutParams;
use crate::types::{SeparatorLine, TextRegion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// Partition `members` into leaves in reading order.
///
/// Every input region lands in exactly one leaf.
#[must_use = "returns the leaves"]
pub fn partition<'a>(
    members: Vec<&'a TextRegion>,
    separators: &[SeparatorLine],
    params: &LayoutParams,
) -> Vec<Vec<&'a TextRegion>> {
    let mut leaves = Vec::new();
    cut(members, separators, params, 0, &mut leaves);
    leaves
}

fn cut<'a>(
    members: Vec<&'a TextRegion>,
    separators: &[SeparatorLine],
    params: &LayoutParams,
    depth: usize,
    leaves: &mut Vec<Vec<&'a TextRegion>>,
) {
    if members.is_empty() {
        return;
    }

    if members.len() >= 2 && depth < params.max_depth {
        let h = median_height(&members);
        let split = widest_gap(&members, Axis::X)
            .filter(|&(_, width)| width > params.column_gap_ratio * h)
            .map(|(at, _)| (Axis::X, at))
            .or_else(|| {
                widest_gap(&members, Axis::Y)
                    .filter(|&(_, width)| width > params.paragraph_gap_ratio * h)
                    .map(|(at, _)| (Axis::Y, at))
            });

        if let Some((axis, at)) = split {
            let (first, second): (Vec<_>, Vec<_>) =
                members.into_iter().partition(|r| center(r, axis) < at);
            cut(first, separators, params, depth + 1, leaves);
            cut(second, separators, params, depth + 1, leaves);
            return;
        }
    }

    // Separators are a hard constraint and ignore the depth ceiling
    if let Some(sep) = find_violation(&members, separators) {
        let (first, second) = split_by_separator(&members, sep);
        log::trace!(
            "Separator split at depth {depth}: {} | {} regions",
            first.len(),
            second.len()
        );
        cut(first, separators, params, depth + 1, leaves);
        cut(second, separators, params, depth + 1, leaves);
        return;
    }

    leaves.push(members);
}

fn center(r: &TextRegion, axis: Axis) -> f32 {
    match axis {
        Axis::X => r.bounds.center_x(),
        Axis::Y => r.bounds.center_y(),
    }
}

/// Median member height
#[must_use]
pub fn median_height(members: &[&TextRegion]) -> f32 {
    let mut heights: Vec<f32> = members.iter().map(|r| r.bounds.height).collect();
    if heights.is_empty() {
        return 0.0;
    }
    heights.sort_by(f32::total_cmp);
    let mid = heights.len() / 2;
    if heights.len() % 2 == 0 {
        (heights[mid - 1] + heights[mid]) / 2.0
    } else {
        heights[mid]
    }
}

/// Widest empty stretch in the projection of `members` onto `axis`
///
/// Returns `(midpoint, width)`, or `None` when the projection is one solid run.
fn widest_gap(members: &[&TextRegion], axis: Axis) -> Option<(f32, f32)> {
    let mut intervals: Vec<(f32, f32)> = members
        .iter()
        .map(|r| match axis {
            Axis::X => (r.bounds.x, r.bounds.right()),
            Axis::Y => (r.bounds.y, r.bounds.bottom()),
        })
        .collect();
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut best: Option<(f32, f32)> = None;
    let mut covered_to = intervals.first()?.1;
    for &(start, end) in &intervals[1..] {
        if start > covered_to {
            let width = start - covered_to;
            if best.map_or(true, |(_, w)| width > w) {
                best = Some(((covered_to + start) / 2.0, width));
            }
        }
        covered_to = covered_to.max(end);
    }
    best
}
