//! Halo construction settings.
//!
//! `HaloConfig` is plain data with serde support so drivers can read it from
//! their own configuration files. Call [`HaloConfig::validate`] (done by
//! [`crate::algs::halo::BuildHalo::new`]) before any communication starts, so
//! a bad value fails on every rank instead of deadlocking a collective.

use serde::{Deserialize, Serialize};

use crate::mesh_error::MeshError;

/// How boundary uids are delivered to other ranks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStrategy {
    /// Every rank talks to every rank.
    Global,
    /// Only ranks whose bounding boxes touch exchange data.
    #[default]
    Neighbours,
}

/// How the partition boundary is found.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryStrategy {
    /// Facets with a single incident cell.
    #[default]
    Facets,
    /// Nodes of the cached boundary polygon.
    Polygon,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HaloConfig {
    pub exchange: ExchangeStrategy,
    pub boundary: BoundaryStrategy,
    /// Run the WEST/EAST periodic passes after each interior pass.
    pub periodic: bool,
    /// Renumber provisional global indices once all levels are built.
    pub renumber: bool,
    /// Inflation of partition bounding boxes, in `xy` units.
    pub bbox_tolerance: f64,
}

impl Default for HaloConfig {
    fn default() -> Self {
        Self {
            exchange: ExchangeStrategy::default(),
            boundary: BoundaryStrategy::default(),
            periodic: true,
            renumber: true,
            bbox_tolerance: 1.0e-5,
        }
    }
}

impl HaloConfig {
    pub fn validate(&self) -> Result<(), MeshError> {
        if !self.bbox_tolerance.is_finite() || self.bbox_tolerance < 0.0 {
            return Err(MeshError::InvalidConfig(format!(
                "bbox_tolerance must be a finite non-negative number, got {}",
                self.bbox_tolerance
            )));
        }
        Ok(())
    }

    pub fn with_exchange(mut self, exchange: ExchangeStrategy) -> Self {
        self.exchange = exchange;
        self
    }

    pub fn with_boundary(mut self, boundary: BoundaryStrategy) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_renumber(mut self, renumber: bool) -> Self {
        self.renumber = renumber;
        self
    }

    pub fn with_periodic(mut self, periodic: bool) -> Self {
        self.periodic = periodic;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = HaloConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.exchange, ExchangeStrategy::Neighbours);
        assert!(cfg.periodic && cfg.renumber);
    }

    #[test]
    fn bad_tolerance_is_rejected() {
        for tol in [-1.0, f64::NAN, f64::INFINITY] {
            let cfg = HaloConfig {
                bbox_tolerance: tol,
                ..HaloConfig::default()
            };
            assert!(matches!(cfg.validate(), Err(MeshError::InvalidConfig(_))));
        }
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: HaloConfig =
            serde_json::from_str(r#"{"exchange":"global","boundary":"polygon"}"#).unwrap();
        assert_eq!(cfg.exchange, ExchangeStrategy::Global);
        assert_eq!(cfg.boundary, BoundaryStrategy::Polygon);
        assert_eq!(cfg.bbox_tolerance, 1.0e-5);
        let back = serde_json::to_string(&cfg).unwrap();
        assert!(back.contains("\"renumber\":true"));
    }
}
