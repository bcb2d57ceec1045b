//! Axis-aligned rectangles, points and segment tests shared by every stage

use serde::{Deserialize, Serialize};

/// A point in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[inline]
    #[must_use = "point is created but not used"]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Four corners, clockwise from top-left
pub type Quad = [Point; 4];

/// Axis-aligned rectangle in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left coordinate
    pub x: f32,
    /// Top coordinate
    pub y: f32,
    /// Width
    #[serde(alias = "w")]
    pub width: f32,
    /// Height
    #[serde(alias = "h")]
    pub height: f32,
}

impl Rect {
    #[inline]
    #[must_use = "rectangle is created but not used"]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a rectangle from its min/max edges
    #[inline]
    #[must_use = "rectangle is created but not used"]
    pub fn from_edges(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    /// Smallest rectangle containing every point, `None` for an empty slice
    #[must_use = "bounding rectangle is computed but not used"]
    pub fn enclosing(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::from_edges(min_x, min_y, max_x, max_y))
    }

    #[inline]
    #[must_use = "right coordinate is computed but not used"]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    #[inline]
    #[must_use = "bottom coordinate is computed but not used"]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    #[inline]
    #[must_use = "center coordinate is computed but not used"]
    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    #[inline]
    #[must_use = "center coordinate is computed but not used"]
    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    #[inline]
    #[must_use = "center point is computed but not used"]
    pub fn center(&self) -> Point {
        Point::new(self.center_x(), self.center_y())
    }

    #[inline]
    #[must_use = "area is computed but not used"]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Exact coordinate-wise min/max union of two rectangles
    #[inline]
    #[must_use = "union is computed but not used"]
    pub fn union(&self, other: &Self) -> Self {
        Self::from_edges(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Union of all rectangles, `None` for an empty iterator
    ///
    /// Edges are accumulated first and the width/height derived once, so the
    /// result does not depend on iteration order.
    #[must_use = "union is computed but not used"]
    pub fn union_all<'a, I>(rects: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let mut iter = rects.into_iter();
        let first = iter.next()?;
        let (mut left, mut top, mut right, mut bottom) =
            (first.x, first.y, first.right(), first.bottom());
        for r in iter {
            left = left.min(r.x);
            top = top.min(r.y);
            right = right.max(r.right());
            bottom = bottom.max(r.bottom());
        }
        Some(Self::from_edges(left, top, right, bottom))
    }

    /// Corners clockwise from top-left
    #[inline]
    #[must_use = "polygon is computed but not used"]
    pub fn to_quad(&self) -> Quad {
        [
            Point::new(self.x, self.y),
            Point::new(self.right(), self.y),
            Point::new(self.right(), self.bottom()),
            Point::new(self.x, self.bottom()),
        ]
    }

    /// Integer pixel rectangle after rounding each edge, clamped to `(width, height)`.
    ///
    /// Returns `(x, y, w, h)`; `w` or `h` is zero when the rectangle collapses.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use = "pixel rectangle is computed but not used"]
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let clamp_x = |v: f32| v.round().clamp(0.0, image_width as f32) as u32;
        let clamp_y = |v: f32| v.round().clamp(0.0, image_height as f32) as u32;
        let left = clamp_x(self.x);
        let top = clamp_y(self.y);
        let right = clamp_x(self.right());
        let bottom = clamp_y(self.bottom());
        (
            left,
            top,
            right.saturating_sub(left),
            bottom.saturating_sub(top),
        )
    }
}

/// Cross product of OA and OB; sign gives the turn direction
#[inline]
#[must_use]
pub fn cross(o: Point, a: Point, b: Point) -> f32 {
    (a.x - o.x).mul_add(b.y - o.y, -(a.y - o.y) * (b.x - o.x))
}

#[inline]
fn on_segment(p: Point, q: Point, r: Point) -> bool {
    q.x <= p.x.max(r.x) && q.x >= p.x.min(r.x) && q.y <= p.y.max(r.y) && q.y >= p.y.min(r.y)
}

/// True if segment `p1–p2` and segment `q1–q2` share at least one point
#[must_use = "intersection test result is returned but not used"]
pub fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let d1 = cross(q1, q2, p1);
    let d2 = cross(q1, q2, p2);
    let d3 = cross(p1, p2, q1);
    let d4 = cross(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    // Collinear endpoints touching the other segment
    (d1 == 0.0 && on_segment(q1, p1, q2))
        || (d2 == 0.0 && on_segment(q1, p2, q2))
        || (d3 == 0.0 && on_segment(p1, q1, p2))
        || (d4 == 0.0 && on_segment(p1, q2, p2))
}
