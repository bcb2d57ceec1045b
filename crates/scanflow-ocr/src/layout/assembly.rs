//! Leaf → `MergedBlock`: visual lines, reading-order text and alignment

#![allow(clippy::cast_precision_loss)]

use crate::geometry::Rect;
use crate::types::{Alignment, MergedBlock, TextRegion};

/// A deviation must be below this fraction of another to win alignment
const ALIGNMENT_DOMINANCE: f32 = 0.8;

/// Group members into visual lines, top-to-bottom, each sorted left-to-right.
///
/// Members are visited by vertical center; a member joins the current line if
/// its center is within `same_line_height_ratio * min(h, anchor_h)` of the
/// line's first member.
#[must_use = "returns the grouped lines"]
pub fn group_lines<'a>(
    members: &[&'a TextRegion],
    same_line_height_ratio: f32,
) -> Vec<Vec<&'a TextRegion>> {
    let mut sorted: Vec<&TextRegion> = members.to_vec();
    sorted.sort_by(|a, b| {
        a.bounds
            .center_y()
            .total_cmp(&b.bounds.center_y())
            .then(a.bounds.x.total_cmp(&b.bounds.x))
    });

    let mut lines: Vec<Vec<&TextRegion>> = Vec::new();
    for region in sorted {
        let joins = lines.last().and_then(|line| line.first()).is_some_and(|anchor| {
            let limit = same_line_height_ratio * anchor.bounds.height.min(region.bounds.height);
            (region.bounds.center_y() - anchor.bounds.center_y()).abs() < limit
        });
        match lines.last_mut() {
            Some(line) if joins => line.push(region),
            _ => lines.push(vec![region]),
        }
    }
    for line in &mut lines {
        line.sort_by(|a, b| a.bounds.x.total_cmp(&b.bounds.x));
    }
    lines
}

/// Join lines: members by a single space, lines by newline
///
/// The space is skipped when either side already has whitespace at the boundary.
#[must_use = "returns the joined text"]
pub fn join_text(lines: &[Vec<&TextRegion>]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        for (j, region) in line.iter().enumerate() {
            if j > 0
                && !out.ends_with(char::is_whitespace)
                && !region.text.starts_with(char::is_whitespace)
            {
                out.push(' ');
            }
            out.push_str(&region.text);
        }
    }
    out
}

fn std_dev(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n).sqrt()
}

/// Infer alignment from the horizontal extents of each visual line
#[must_use = "returns the inferred alignment"]
pub fn infer_alignment(lines: &[Vec<&TextRegion>]) -> Alignment {
    if lines.len() < 2 {
        return Alignment::Left;
    }
    let extents: Vec<Rect> = lines
        .iter()
        .filter_map(|line| Rect::union_all(line.iter().map(|r| &r.bounds)))
        .collect();
    let lefts: Vec<f32> = extents.iter().map(|r| r.x).collect();
    let centers: Vec<f32> = extents.iter().map(Rect::center_x).collect();
    let rights: Vec<f32> = extents.iter().map(Rect::right).collect();

    let (dl, dc, dr) = (std_dev(&lefts), std_dev(&centers), std_dev(&rights));
    if dc < ALIGNMENT_DOMINANCE * dl && dc < ALIGNMENT_DOMINANCE * dr {
        Alignment::Center
    } else if dr < ALIGNMENT_DOMINANCE * dl && dr <= dc {
        Alignment::Right
    } else {
        Alignment::Left
    }
}

/// Build the block for one leaf; `None` for an empty leaf
#[must_use = "returns the assembled block"]
pub fn assemble_block(members: &[&TextRegion], same_line_height_ratio: f32) -> Option<MergedBlock> {
    let bounds = Rect::union_all(members.iter().map(|r| &r.bounds))?;
    let lines = group_lines(members, same_line_height_ratio);
    let n = members.len() as f32;

    Some(MergedBlock {
        bounds,
        polygon: bounds.to_quad(),
        text: join_text(&lines),
        confidence: members.iter().map(|r| r.confidence).sum::<f32>() / n,
        font_size: members.iter().map(|r| r.bounds.height).sum::<f32>() / n,
        alignment: infer_alignment(&lines),
        lines: lines.into_iter().flatten().cloned().collect(),
    })
}
