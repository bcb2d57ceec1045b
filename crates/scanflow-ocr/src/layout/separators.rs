//! User-drawn separator constraints

use crate::geometry::{cross, segments_intersect, Point};
use crate::types::{SeparatorLine, TextRegion};

/// First separator crossed by the center-to-center segment of any member pair
///
/// Pairs whose centers both lie exactly on the separator's line are ignored:
/// no straight cut along that separator can tell them apart.
#[must_use = "violation check result is returned but not used"]
pub fn find_violation<'s>(
    members: &[&TextRegion],
    separators: &'s [SeparatorLine],
) -> Option<&'s SeparatorLine> {
    if separators.is_empty() || members.len() < 2 {
        return None;
    }
    let centers: Vec<Point> = members.iter().map(|r| r.bounds.center()).collect();
    separators.iter().find(|sep| {
        centers.iter().enumerate().any(|(i, &a)| {
            centers[i + 1..].iter().any(|&b| {
                let side_a = cross(sep.start, sep.end, a);
                let side_b = cross(sep.start, sep.end, b);
                !(side_a == 0.0 && side_b == 0.0)
                    && segments_intersect(a, b, sep.start, sep.end)
            })
        })
    })
}

/// Split members by which side of the separator's infinite line their center falls on.
///
/// Centers exactly on the line join an empty side if there is one, so both
/// parts are non-empty whenever [`find_violation`] reported this separator.
/// Parts come back in reading order: left before right for mostly-vertical
/// separators, top before bottom otherwise.
#[must_use = "split parts are returned but not used"]
pub fn split_by_separator<'a>(
    members: &[&'a TextRegion],
    sep: &SeparatorLine,
) -> (Vec<&'a TextRegion>, Vec<&'a TextRegion>) {
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    let mut on_line = Vec::new();
    for &r in members {
        let side = cross(sep.start, sep.end, r.bounds.center());
        if side > 0.0 {
            positive.push(r);
        } else if side < 0.0 {
            negative.push(r);
        } else {
            on_line.push(r);
        }
    }
    if negative.is_empty() {
        negative = on_line;
    } else {
        positive.extend(on_line);
    }

    let vertical = (sep.end.y - sep.start.y).abs() >= (sep.end.x - sep.start.x).abs();
    let key = |part: &[&TextRegion]| {
        let sum: f32 = part
            .iter()
            .map(|r| {
                if vertical {
                    r.bounds.center_x()
                } else {
                    r.bounds.center_y()
                }
            })
            .sum();
        #[allow(clippy::cast_precision_loss)]
        let n = part.len().max(1) as f32;
        sum / n
    };
    if key(negative.as_slice()) < key(positive.as_slice()) {
        (negative, positive)
    } else {
        (positive, negative)
    }
}
