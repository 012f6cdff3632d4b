//! Geometry helpers for halo construction.
//!
//! Coordinate projections and the planar bounding boxes used to discover
//! which partitions can possibly exchange halo data.

pub mod bbox;
pub mod projection;

pub use bbox::BoundingBox;
pub use projection::Projection;
