//! Property-Based Tests
//!
//! Invariants checked over generated inputs:
//! - Layout keeps every eligible region exactly once
//! - Block bounds are the exact union of their members
//! - No block straddles a separator
//! - CTC decoding collapses repeats and keeps confidence in range
//!
//! Coordinates are small integers so center and cross-product arithmetic is exact.

use ndarray::Array2;
use proptest::prelude::*;
use scanflow_ocr::geometry::{cross, segments_intersect};
use scanflow_ocr::{
    ctc_greedy_decode, merge_regions, LayoutParams, Point, Rect, SeparatorLine,
    SymbolDictionary, TextRegion,
};

// ============================================================================
// Generators
// ============================================================================

fn region_strategy() -> impl Strategy<Value = TextRegion> {
    (0u16..400, 0u16..400, 1u16..120, 1u16..40, "[a-z]{1,6}").prop_map(|(x, y, w, h, text)| {
        TextRegion::new(
            Rect::new(f32::from(x), f32::from(y), f32::from(w), f32::from(h)),
            text,
            90.0,
        )
    })
}

fn separator_strategy() -> impl Strategy<Value = SeparatorLine> {
    (0u16..500, 0u16..500, 0u16..500, 0u16..500).prop_map(|(x0, y0, x1, y1)| {
        SeparatorLine::new(
            Point::new(f32::from(x0), f32::from(y0)),
            Point::new(f32::from(x1), f32::from(y1)),
        )
    })
}

fn key(r: &TextRegion) -> (i64, i64, i64, i64, String) {
    #[allow(clippy::cast_possible_truncation)]
    let q = |v: f32| (v * 2.0).round() as i64;
    (
        q(r.bounds.x),
        q(r.bounds.y),
        q(r.bounds.width),
        q(r.bounds.height),
        r.text.clone(),
    )
}

// ============================================================================
// Layout Properties
// ============================================================================

/// Property: every eligible region lands in exactly one block
#[test]
fn proptest_layout_no_loss() {
    proptest!(|(
        regions in prop::collection::vec(region_strategy(), 0..25),
        separators in prop::collection::vec(separator_strategy(), 0..3),
    )| {
        let blocks = merge_regions(&regions, &separators, &LayoutParams::default());

        let mut expected: Vec<_> = regions.iter().map(key).collect();
        let mut actual: Vec<_> = blocks.iter().flat_map(|b| b.lines.iter().map(key)).collect();
        expected.sort();
        actual.sort();
        prop_assert_eq!(expected, actual);
        prop_assert!(blocks.iter().all(|b| !b.lines.is_empty()));
    });
}

/// Property: block bounds are the min/max union of member bounds
#[test]
fn proptest_layout_bounds_are_union() {
    proptest!(|(regions in prop::collection::vec(region_strategy(), 1..25))| {
        let blocks = merge_regions(&regions, &[], &LayoutParams::default());
        for block in &blocks {
            let left = block.lines.iter().map(|r| r.bounds.x).fold(f32::INFINITY, f32::min);
            let top = block.lines.iter().map(|r| r.bounds.y).fold(f32::INFINITY, f32::min);
            let right = block.lines.iter().map(|r| r.bounds.right()).fold(f32::NEG_INFINITY, f32::max);
            let bottom = block.lines.iter().map(|r| r.bounds.bottom()).fold(f32::NEG_INFINITY, f32::max);
            prop_assert_eq!(block.bounds.x, left);
            prop_assert_eq!(block.bounds.y, top);
            prop_assert!((block.bounds.right() - right).abs() < 1e-3);
            prop_assert!((block.bounds.bottom() - bottom).abs() < 1e-3);
        }
    });
}

/// Property: no two members of a block are separated by a separator
#[test]
fn proptest_layout_respects_separators() {
    proptest!(|(
        regions in prop::collection::vec(region_strategy(), 2..20),
        separators in prop::collection::vec(separator_strategy(), 1..4),
    )| {
        let blocks = merge_regions(&regions, &separators, &LayoutParams::default());
        for block in &blocks {
            let centers: Vec<Point> = block.lines.iter().map(|r| r.bounds.center()).collect();
            for (i, &a) in centers.iter().enumerate() {
                for &b in &centers[i + 1..] {
                    for sep in &separators {
                        let both_on_line = cross(sep.start, sep.end, a) == 0.0
                            && cross(sep.start, sep.end, b) == 0.0;
                        prop_assert!(
                            both_on_line || !segments_intersect(a, b, sep.start, sep.end),
                            "block {:?} straddles separator {:?}", block.text, sep
                        );
                    }
                }
            }
        }
    });
}

/// Property: failed regions never reach a block
#[test]
fn proptest_layout_drops_failed_regions() {
    proptest!(|(regions in prop::collection::vec(region_strategy(), 1..15), mask in prop::collection::vec(any::<bool>(), 15))| {
        let regions: Vec<TextRegion> = regions
            .into_iter()
            .zip(mask)
            .map(|(mut r, failed)| {
                r.recognition_failed = failed;
                r
            })
            .collect();
        let blocks = merge_regions(&regions, &[], &LayoutParams::default());
        let kept: usize = blocks.iter().map(|b| b.lines.len()).sum();
        prop_assert_eq!(kept, regions.iter().filter(|r| !r.recognition_failed).count());
        prop_assert!(blocks.iter().flat_map(|b| &b.lines).all(|r| !r.recognition_failed));
    });
}

// ============================================================================
// CTC Properties
// ============================================================================

fn alphabet() -> SymbolDictionary {
    SymbolDictionary::from_lines(["a", "b", "c", "d", "e"], false).unwrap()
}

/// Property: decoding a one-hot path drops blanks, repeats and unknown classes
#[test]
fn proptest_ctc_collapses_path() {
    // Classes 1..=5 map to a..e, 6 is outside the dictionary
    proptest!(|(path in prop::collection::vec(0usize..7, 0..40))| {
        let mut probs = Array2::from_elem((path.len(), 7), -10.0_f32);
        for (t, &class) in path.iter().enumerate() {
            probs[[t, class]] = 0.0;
        }

        let mut expected = String::new();
        let mut prev = None;
        for &class in &path {
            if class != 0 && class != 6 && prev != Some(class) {
                expected.push(char::from(b'a' + u8::try_from(class - 1).unwrap()));
            }
            prev = Some(class);
        }

        let decoded = ctc_greedy_decode(probs.view(), &alphabet());
        prop_assert_eq!(&decoded.text, &expected);
        if expected.is_empty() {
            prop_assert_eq!(decoded.confidence, 0.0);
        } else {
            prop_assert!((decoded.confidence - 100.0).abs() < 1e-3);
        }
    });
}

/// Property: confidence stays in [0, 100] for arbitrary scores
#[test]
fn proptest_ctc_confidence_in_range() {
    proptest!(|(values in prop::collection::vec(-30.0f32..30.0, 7 * 12))| {
        let probs = Array2::from_shape_vec((12, 7), values).unwrap();
        let decoded = ctc_greedy_decode(probs.view(), &alphabet());
        prop_assert!((0.0..=100.0).contains(&decoded.confidence));
    });
}
