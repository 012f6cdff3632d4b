//! Planar ↔ geographic coordinate mapping.
//!
//! Mesh nodes carry both `xy` (the coordinates the mesh was generated in) and
//! `lonlat`. Halo nodes arrive with `xy` only; their `lonlat` is recomputed
//! through the mesh projection on the receiving rank.

use serde::{Deserialize, Serialize};

/// Earth radius used by projections, in metres.
pub const EARTH_RADIUS: f64 = 6_371_229.0;

/// Supported projections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Projection {
    /// `xy` already is `(lon, lat)` in degrees.
    #[default]
    LonLat,
    /// Spherical Mercator; `xy` in metres, `lon0` the central meridian.
    Mercator { lon0: f64, radius: f64 },
}

impl Projection {
    pub fn mercator(lon0: f64) -> Self {
        Projection::Mercator {
            lon0,
            radius: EARTH_RADIUS,
        }
    }

    /// Map planar `xy` to `(lon, lat)` in degrees.
    pub fn lonlat(&self, xy: [f64; 2]) -> [f64; 2] {
        match *self {
            Projection::LonLat => xy,
            Projection::Mercator { lon0, radius } => {
                let lon = lon0 + (xy[0] / radius).to_degrees();
                let lat = (2.0 * (xy[1] / radius).exp().atan() - std::f64::consts::FRAC_PI_2)
                    .to_degrees();
                [lon, lat]
            }
        }
    }

    /// Map `(lon, lat)` in degrees to planar `xy`.
    pub fn xy(&self, lonlat: [f64; 2]) -> [f64; 2] {
        match *self {
            Projection::LonLat => lonlat,
            Projection::Mercator { lon0, radius } => {
                let x = radius * (lonlat[0] - lon0).to_radians();
                let phi = lonlat[1].to_radians();
                let y = radius * (std::f64::consts::FRAC_PI_4 + 0.5 * phi).tan().ln();
                [x, y]
            }
        }
    }
}
