//! Longitude-periodic transforms and the boundary selector for periodic passes.
//!
//! A periodic pass requests the images of its seam nodes shifted by a full
//! turn, and the responder ships its nodes shifted back by the same amount.
//! Shifts are defined on `(lon, lat)` and carried to `xy` through the mesh
//! projection.

use std::fmt;

use crate::geometry::{BoundingBox, Projection};
use crate::topology::flags::NodeFlags;

/// Shift by one full turn in longitude.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PeriodicTransform {
    /// +360°: maps the west seam onto the east seam.
    WestEast,
    /// -360°: maps the east seam onto the west seam.
    EastWest,
}

impl PeriodicTransform {
    pub const fn x_translation(self) -> f64 {
        match self {
            PeriodicTransform::WestEast => 360.0,
            PeriodicTransform::EastWest => -360.0,
        }
    }

    pub const fn inverse(self) -> Self {
        match self {
            PeriodicTransform::WestEast => PeriodicTransform::EastWest,
            PeriodicTransform::EastWest => PeriodicTransform::WestEast,
        }
    }

    /// Flags selecting the seam nodes a pass with this transform starts from.
    pub fn seam_flags(self) -> NodeFlags {
        match self {
            PeriodicTransform::WestEast => NodeFlags::PERIODIC | NodeFlags::WEST,
            PeriodicTransform::EastWest => NodeFlags::PERIODIC | NodeFlags::EAST,
        }
    }

    /// Flags forced onto nodes received in a pass with this transform.
    pub fn ghost_flags(self) -> NodeFlags {
        self.seam_flags() | NodeFlags::GHOST
    }

    #[inline]
    pub fn apply(self, lonlat: [f64; 2]) -> [f64; 2] {
        [lonlat[0] + self.x_translation(), lonlat[1]]
    }

    #[inline]
    pub fn unapply(self, lonlat: [f64; 2]) -> [f64; 2] {
        [lonlat[0] - self.x_translation(), lonlat[1]]
    }

    /// [`apply`](Self::apply) for planar coordinates.
    pub fn apply_xy(self, projection: &Projection, xy: [f64; 2]) -> [f64; 2] {
        projection.xy(self.apply(projection.lonlat(xy)))
    }

    /// [`unapply`](Self::unapply) for planar coordinates.
    pub fn unapply_xy(self, projection: &Projection, xy: [f64; 2]) -> [f64; 2] {
        projection.xy(self.unapply(projection.lonlat(xy)))
    }

    /// Image of an `xy` box; both supported projections map a longitude
    /// shift to a pure x translation.
    pub fn apply_bbox(self, projection: &Projection, bbox: &BoundingBox) -> BoundingBox {
        if bbox.is_empty() {
            return *bbox;
        }
        let dx = self.apply_xy(projection, bbox.min)[0] - bbox.min[0];
        bbox.translate_x(dx)
    }
}

/// Predicate over local node indices: carries `flag` and predates the
/// current halo level.
pub struct PeriodicPoints<'a> {
    flags: &'a [NodeFlags],
    flag: NodeFlags,
    n: usize,
}

impl<'a> PeriodicPoints<'a> {
    /// Only the first `n` nodes qualify; nodes appended during the current
    /// level are ignored.
    pub fn new(flags: &'a [NodeFlags], flag: NodeFlags, n: usize) -> Self {
        Self { flags, flag, n }
    }

    #[inline]
    pub fn contains(&self, j: usize) -> bool {
        j < self.n && j < self.flags.len() && self.flags[j].contains(self.flag)
    }

    pub fn filter(&self, nodes: &[usize]) -> Vec<usize> {
        nodes.iter().copied().filter(|&j| self.contains(j)).collect()
    }
}

impl fmt::Display for PeriodicPoints<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for j in (0..self.flags.len()).filter(|&j| self.contains(j)) {
            write!(f, " {j}")?;
        }
        f.write_str(" ]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn seam_flags_match_direction() {
        assert_eq!(
            PeriodicTransform::WestEast.ghost_flags(),
            NodeFlags::PERIODIC | NodeFlags::WEST | NodeFlags::GHOST
        );
        assert!(
            PeriodicTransform::EastWest
                .seam_flags()
                .contains(NodeFlags::EAST)
        );
        assert_eq!(PeriodicTransform::WestEast.apply([0.0, 10.0]), [360.0, 10.0]);
        assert_eq!(PeriodicTransform::WestEast.unapply([360.0, 10.0]), [0.0, 10.0]);
    }

    #[test]
    fn mercator_bbox_translates() {
        let p = Projection::mercator(0.0);
        let b = BoundingBox::from_points(&[p.xy([0.0, -10.0]), p.xy([10.0, 10.0])]);
        let moved = PeriodicTransform::WestEast.apply_bbox(&p, &b);
        let expect = p.xy([360.0, 0.0])[0];
        assert!((moved.min[0] - expect).abs() < 1e-6);
        assert_eq!(moved.min[1], b.min[1]);
    }

    #[test]
    fn periodic_points_ignore_new_nodes() {
        let w = NodeFlags::PERIODIC | NodeFlags::WEST;
        let flags = [w, NodeFlags::NONE, w | NodeFlags::GHOST, w];
        let pts = PeriodicPoints::new(&flags, w, 3);
        assert_eq!(pts.filter(&[0, 1, 2, 3]), vec![0, 2]);
        assert_eq!(pts.to_string(), "[ 0 2 ]");
    }

    proptest! {
        #[test]
        fn west_east_inverts_east_west(lon in -720.0f64..720.0, lat in -90.0f64..90.0) {
            let c = [lon, lat];
            let back = PeriodicTransform::WestEast.apply(PeriodicTransform::EastWest.apply(c));
            prop_assert!((back[0] - c[0]).abs() < 1e-9);
            prop_assert_eq!(back[1], c[1]);
            let inv = PeriodicTransform::WestEast.inverse().apply(PeriodicTransform::WestEast.apply(c));
            prop_assert!((inv[0] - c[0]).abs() < 1e-9);
        }
    }
}
