//! Axis-aligned bounding boxes in `xy`.

use bytemuck::{Pod, Zeroable};

/// Closed box `[min, max]`; an empty box has `min > max`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct BoundingBox {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    pub const fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 2],
            max: [f64::NEG_INFINITY; 2],
        }
    }

    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a [f64; 2]>,
    {
        let mut b = Self::empty();
        for p in points {
            b.extend(*p);
        }
        b
    }

    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0] || self.min[1] > self.max[1]
    }

    pub fn extend(&mut self, p: [f64; 2]) {
        for d in 0..2 {
            self.min[d] = self.min[d].min(p[d]);
            self.max[d] = self.max[d].max(p[d]);
        }
    }

    /// Grow by `tol` on every side.
    pub fn inflate(mut self, tol: f64) -> Self {
        if !self.is_empty() {
            for d in 0..2 {
                self.min[d] -= tol;
                self.max[d] += tol;
            }
        }
        self
    }

    /// Shift along x.
    pub fn translate_x(mut self, dx: f64) -> Self {
        self.min[0] += dx;
        self.max[0] += dx;
        self
    }

    /// Inclusive overlap test; empty boxes intersect nothing.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        (0..2).all(|d| self.min[d] <= other.max[d] && other.min[d] <= self.max[d])
    }
}
