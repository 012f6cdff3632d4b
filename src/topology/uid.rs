//! Coordinate-derived unique ids.
//!
//! A node's uid is a pure function of its `(lon, lat)` rounded to whole
//! micro-degrees, so two ranks holding "the same" point compute the same id
//! regardless of local index, owner or insertion order. Rounding absorbs the
//! floating point noise of independently generated coordinates.
//!
//! Layout (node uids are always positive):
//!
//! ```text
//!  bit 63 | 62 ........ 31 | 30 ......... 0
//!    0    | lon µdeg + 1080° | lat µdeg + 1000°
//! ```
//!
//! Element uids are the negated node uid of the element centroid, so node and
//! element ids can share one key space with the sign as discriminator.

use crate::topology::Uid;
use crate::topology::nodes::Nodes;

const LON_OFFSET: i64 = 1_080_000_000;
const LAT_OFFSET: i64 = 1_000_000_000;
const LAT_BITS: u32 = 31;
const LAT_MASK: i64 = (1 << LAT_BITS) - 1;
const LON_MASK: i64 = (1 << 32) - 1;

/// Degrees to whole micro-degrees, rounded half away from zero.
#[inline]
pub fn microdeg(v: f64) -> i64 {
    (v * 1.0e6).round() as i64
}

/// Uid of a single `(lon, lat)` point in degrees.
///
/// Valid for `lon ∈ [-1080°, 1080°)` and `lat ∈ [-1000°, 1000°)`, which covers
/// every periodic image a halo of sensible depth can produce.
#[inline]
pub fn unique_lonlat(lonlat: [f64; 2]) -> Uid {
    let lon = microdeg(lonlat[0]);
    let lat = microdeg(lonlat[1]);
    debug_assert!((-LON_OFFSET..LON_OFFSET).contains(&lon), "lon {} out of range", lonlat[0]);
    debug_assert!((-LAT_OFFSET..LAT_OFFSET).contains(&lat), "lat {} out of range", lonlat[1]);
    (((lon + LON_OFFSET) & LON_MASK) << LAT_BITS) | ((lat + LAT_OFFSET) & LAT_MASK)
}

/// Centroid of a set of points, in degrees.
pub fn centroid(points: &[[f64; 2]]) -> [f64; 2] {
    let n = points.len().max(1) as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    [sx / n, sy / n]
}

/// Uid of an element given its node coordinates: `-uid(centroid)`.
#[inline]
pub fn element_uid(points: &[[f64; 2]]) -> Uid {
    -unique_lonlat(centroid(points))
}

/// Uid evaluator bound to a node collection.
#[derive(Clone, Copy)]
pub struct UniqueLonLat<'a> {
    nodes: &'a Nodes,
}

impl<'a> UniqueLonLat<'a> {
    pub fn new(nodes: &'a Nodes) -> Self {
        Self { nodes }
    }

    /// Uid of local node `i`.
    #[inline]
    pub fn node(&self, i: usize) -> Uid {
        unique_lonlat(self.nodes.lonlat()[i])
    }

    /// Uid of an element from its connectivity row.
    pub fn element(&self, row: &[usize]) -> Uid {
        let lonlat = self.nodes.lonlat();
        let pts: Vec<[f64; 2]> = row.iter().map(|&n| lonlat[n]).collect();
        element_uid(&pts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rounding_absorbs_noise() {
        let a = unique_lonlat([10.0, 45.0]);
        let b = unique_lonlat([10.0 + 2.0e-8, 45.0 - 3.0e-8]);
        assert_eq!(a, b);
        assert_ne!(a, unique_lonlat([10.000001, 45.0]));
    }

    #[test]
    fn periodic_images_differ() {
        assert_ne!(unique_lonlat([0.0, 10.0]), unique_lonlat([360.0, 10.0]));
        assert_ne!(unique_lonlat([-10.0, 10.0]), unique_lonlat([350.0, 10.0]));
    }

    #[test]
    fn element_ids_are_negative() {
        let pts = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let e = element_uid(&pts);
        assert!(e < 0);
        assert_eq!(e, -unique_lonlat([0.5, 0.5]));
    }

    proptest! {
        #[test]
        fn node_uids_positive_and_injective_on_grid(
            lon in -1000i64..1000, lat in -900i64..900, dlon in 1i64..1000
        ) {
            let p = [lon as f64 * 0.1, lat as f64 * 0.1];
            let q = [(lon + dlon) as f64 * 0.1, lat as f64 * 0.1];
            prop_assert!(unique_lonlat(p) > 0);
            prop_assert_ne!(unique_lonlat(p), unique_lonlat(q));
            prop_assert_eq!(unique_lonlat(p), unique_lonlat(p));
        }
    }
}
