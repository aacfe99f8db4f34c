//! Geometry primitives: the 4x4 transform matrix and 2D rectangle/region algebra (C1).
//!
//! Regions are kept as a list of pairwise non-overlapping [`Rectangle`]s so that damage
//! arithmetic (union/intersect/subtract) stays deterministic: callers never need to worry
//! about double-counting overlapping pieces when they iterate a [`Region`]'s rectangles.

use smallvec::SmallVec;
use std::ops::Mul;

/// An axis-aligned integer rectangle in some shared coordinate space (screen or
/// surface-local, depending on context — the core does not track space at the type level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rectangle { x, y, width, height }
    }

    pub fn from_loc_and_size((x, y): (i32, i32), (width, height): (i32, i32)) -> Self {
        Rectangle { x, y, width, height }
    }

    pub fn left(&self) -> i32 {
        self.x
    }
    pub fn right(&self) -> i32 {
        self.x + self.width
    }
    pub fn top(&self) -> i32 {
        self.y
    }
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.left() && x < self.right() && y >= self.top() && y < self.bottom()
    }

    /// Translate this rectangle by `(dx, dy)`.
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Rectangle::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// The overlap of `self` and `other`, or `None` if they don't overlap.
    pub fn intersection(&self, other: &Rectangle) -> Option<Rectangle> {
        let x1 = self.left().max(other.left());
        let y1 = self.top().max(other.top());
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        if x2 > x1 && y2 > y1 {
            Some(Rectangle::new(x1, y1, x2 - x1, y2 - y1))
        } else {
            None
        }
    }

    pub fn intersects(&self, other: &Rectangle) -> bool {
        self.intersection(other).is_some()
    }

    /// `self` minus `other`, expressed as up to four disjoint rectangles.
    fn subtract(&self, other: &Rectangle) -> SmallVec<[Rectangle; 4]> {
        let mut out = SmallVec::new();
        let overlap = match self.intersection(other) {
            Some(o) => o,
            None => {
                out.push(*self);
                return out;
            }
        };

        // Top strip.
        if overlap.top() > self.top() {
            out.push(Rectangle::new(self.x, self.top(), self.width, overlap.top() - self.top()));
        }
        // Bottom strip.
        if overlap.bottom() < self.bottom() {
            out.push(Rectangle::new(
                self.x,
                overlap.bottom(),
                self.width,
                self.bottom() - overlap.bottom(),
            ));
        }
        // Left strip, clipped vertically to the overlap band.
        if overlap.left() > self.left() {
            out.push(Rectangle::new(
                self.x,
                overlap.top(),
                overlap.left() - self.left(),
                overlap.height,
            ));
        }
        // Right strip, clipped vertically to the overlap band.
        if overlap.right() < self.right() {
            out.push(Rectangle::new(
                overlap.right(),
                overlap.top(),
                self.right() - overlap.right(),
                overlap.height,
            ));
        }
        out
    }
}

/// A 2D region: a set of pixels represented as a disjoint list of rectangles.
///
/// All mutating operations maintain the disjointness invariant, so `rectangles()` never
/// yields overlapping pieces and `area()`/pixel-count assertions in tests are exact.
#[derive(Debug, Clone, Default)]
pub struct Region {
    rects: SmallVec<[Rectangle; 4]>,
}

impl Region {
    pub fn empty() -> Self {
        Region { rects: SmallVec::new() }
    }

    pub fn from_rect(rect: Rectangle) -> Self {
        let mut region = Region::empty();
        region.union_rect(rect);
        region
    }

    pub fn is_empty(&self) -> bool {
        self.rects.iter().all(Rectangle::is_empty)
    }

    pub fn rectangles(&self) -> impl Iterator<Item = &Rectangle> {
        self.rects.iter().filter(|r| !r.is_empty())
    }

    pub fn len(&self) -> usize {
        self.rectangles().count()
    }

    pub fn area(&self) -> i64 {
        self.rectangles().map(Rectangle::area).sum()
    }

    /// Add `rect` to the region, splitting it against every rectangle already present so
    /// the result stays disjoint.
    pub fn union_rect(&mut self, rect: Rectangle) {
        if rect.is_empty() {
            return;
        }
        let mut fragments: SmallVec<[Rectangle; 4]> = SmallVec::new();
        fragments.push(rect);
        for existing in &self.rects {
            let mut next = SmallVec::new();
            for frag in fragments {
                next.extend(frag.subtract(existing));
            }
            fragments = next;
            if fragments.is_empty() {
                break;
            }
        }
        self.rects.extend(fragments);
    }

    pub fn union(&mut self, other: &Region) {
        for rect in other.rectangles() {
            self.union_rect(*rect);
        }
    }

    pub fn subtract_rect(&mut self, rect: Rectangle) {
        if rect.is_empty() {
            return;
        }
        let mut next = SmallVec::new();
        for existing in &self.rects {
            next.extend(existing.subtract(&rect));
        }
        self.rects = next;
    }

    pub fn subtract(&mut self, other: &Region) {
        for rect in other.rectangles() {
            self.subtract_rect(*rect);
        }
    }

    /// Intersect the whole region with a single rectangle, returning the (still disjoint)
    /// result.
    pub fn intersect_rect(&self, rect: Rectangle) -> Region {
        let mut out = Region::empty();
        for existing in self.rectangles() {
            if let Some(overlap) = existing.intersection(&rect) {
                out.rects.push(overlap);
            }
        }
        out
    }

    pub fn intersect(&self, other: &Region) -> Region {
        let mut out = Region::empty();
        for rect in other.rectangles() {
            out.rects.extend(self.intersect_rect(*rect).rects);
        }
        out
    }
}

/// A row-major 4x4 matrix of 32-bit floats, used for the per-output projection and the
/// per-surface forward/inverse transform (C1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4(pub [[f32; 4]; 4]);

impl Mat4 {
    pub fn identity() -> Self {
        let mut m = [[0.0; 4]; 4];
        for i in 0..4 {
            m[i][i] = 1.0;
        }
        Mat4(m)
    }

    pub fn translate(x: f32, y: f32, z: f32) -> Self {
        let mut m = Mat4::identity();
        m.0[0][3] = x;
        m.0[1][3] = y;
        m.0[2][3] = z;
        m
    }

    pub fn scale(x: f32, y: f32, z: f32) -> Self {
        let mut m = Mat4::identity();
        m.0[0][0] = x;
        m.0[1][1] = y;
        m.0[2][2] = z;
        m
    }

    /// Right-multiplies `self` by `other` in place: `self = self * other`.
    pub fn multiply(&mut self, other: &Mat4) {
        let mut result = [[0.0f32; 4]; 4];
        for row in 0..4 {
            for col in 0..4 {
                let mut acc = 0.0;
                for k in 0..4 {
                    acc += self.0[row][k] * other.0[k][col];
                }
                result[row][col] = acc;
            }
        }
        self.0 = result;
    }

    pub fn transform(&self, v: [f32; 4]) -> [f32; 4] {
        let mut out = [0.0f32; 4];
        for row in 0..4 {
            out[row] = self.0[row][0] * v[0] + self.0[row][1] * v[1] + self.0[row][2] * v[2] + self.0[row][3] * v[3];
        }
        out
    }

    /// Exact inverse of an affine transform built only from translate/scale — the only
    /// composition the surface/output transforms ever use, so a general-purpose inverse is
    /// unnecessary: just invert the scale and negate the translation.
    pub fn affine_inverse(&self) -> Mat4 {
        let sx = self.0[0][0];
        let sy = self.0[1][1];
        let sz = self.0[2][2];
        let tx = self.0[0][3];
        let ty = self.0[1][3];
        let tz = self.0[2][3];
        let mut inv = Mat4::identity();
        inv.0[0][0] = if sx != 0.0 { 1.0 / sx } else { 0.0 };
        inv.0[1][1] = if sy != 0.0 { 1.0 / sy } else { 0.0 };
        inv.0[2][2] = if sz != 0.0 { 1.0 / sz } else { 0.0 };
        inv.0[0][3] = if sx != 0.0 { -tx / sx } else { 0.0 };
        inv.0[1][3] = if sy != 0.0 { -ty / sy } else { 0.0 };
        inv.0[2][3] = if sz != 0.0 { -tz / sz } else { 0.0 };
        inv
    }
}

impl Mul for Mat4 {
    type Output = Mat4;
    fn mul(mut self, rhs: Mat4) -> Mat4 {
        self.multiply(&rhs);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_subtract_splits_into_disjoint_pieces() {
        let a = Rectangle::new(0, 0, 10, 10);
        let b = Rectangle::new(2, 2, 4, 4);
        let pieces = a.subtract(&b);
        let area: i64 = pieces.iter().map(Rectangle::area).sum();
        assert_eq!(area, a.area() - a.intersection(&b).unwrap().area());
        for p in &pieces {
            assert!(p.intersection(&b).is_none());
        }
    }

    #[test]
    fn region_union_stays_disjoint() {
        let mut region = Region::empty();
        region.union_rect(Rectangle::new(0, 0, 10, 10));
        region.union_rect(Rectangle::new(5, 5, 10, 10));
        let rects: Vec<_> = region.rectangles().collect();
        for (i, a) in rects.iter().enumerate() {
            for b in rects.iter().skip(i + 1) {
                assert!(a.intersection(b).is_none(), "{a:?} overlaps {b:?}");
            }
        }
        assert_eq!(region.area(), 175);
    }

    #[test]
    fn region_subtract_removes_exact_overlap() {
        let mut region = Region::from_rect(Rectangle::new(0, 0, 10, 10));
        region.subtract_rect(Rectangle::new(0, 0, 10, 10));
        assert!(region.is_empty());
    }

    #[test]
    fn region_intersect_matches_rectangle_intersection() {
        let region = Region::from_rect(Rectangle::new(0, 0, 10, 10));
        let other = Region::from_rect(Rectangle::new(5, 5, 10, 10));
        let intersected = region.intersect(&other);
        assert_eq!(intersected.area(), 25);
    }

    #[test]
    fn mat4_translate_scale_roundtrip_inverse() {
        let forward = Mat4::translate(3.0, 4.0, 0.0) * Mat4::scale(2.0, 5.0, 1.0);
        let inverse = forward.affine_inverse();
        let roundtrip = forward * inverse;
        let identity = Mat4::identity();
        for row in 0..4 {
            for col in 0..4 {
                assert!((roundtrip.0[row][col] - identity.0[row][col]).abs() <= 1e-5);
            }
        }
    }
}
